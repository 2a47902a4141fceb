//! The genic-selection sweep phase.
//!
//! While a sweep is in progress the population is structured into two
//! labels: lineages linked to the beneficial allele at the selected
//! position (label 1) and wild-type lineages (label 0).  Time advances in
//! `dt`-generation steps along a precomputed allele-frequency trajectory;
//! within-label coalescence rates are scaled by the current frequency, and
//! recombination moves lineages between backgrounds.  When the trajectory
//! is exhausted every lineage returns to label 0 and the run continues
//! under neutral dynamics.
//!
//! The frequency path here is the deterministic logistic solution of the
//! model's `(alpha, dt)`; see
//! [`SimulationModel::SweepGenicSelection`](crate::SimulationModel::SweepGenicSelection).

use rand::Rng;

use crate::arena::SegmentIndex;
use crate::model::SimulationModel;
use crate::{ExitStatus, SimError, Simulator};

const BENEFICIAL: usize = 1;
const WILD_TYPE: usize = 0;

#[derive(Clone, Debug)]
pub(crate) struct SweepState {
    pub position: f64,
    /// Allele frequency per step, index 0 at the present
    /// (`end_frequency`), descending towards `start_frequency`.
    pub trajectory: Vec<f64>,
    pub dt: f64,
    pub step: usize,
    pub labels_assigned: bool,
    pub complete: bool,
}

impl SweepState {
    pub fn from_model(model: &SimulationModel) -> Self {
        let (reference_size, position, start_frequency, end_frequency, alpha, dt) = match model {
            SimulationModel::SweepGenicSelection {
                reference_size,
                position,
                start_frequency,
                end_frequency,
                alpha,
                dt,
            } => (
                *reference_size,
                *position,
                *start_frequency,
                *end_frequency,
                *alpha,
                *dt,
            ),
            _ => unreachable!("sweep state requires the sweep model"),
        };
        // Deterministic logistic path, integrated backwards in time with
        // per-generation selection intensity alpha / (2N).
        let s = alpha / (2.0 * reference_size);
        let mut trajectory = Vec::new();
        let mut x = end_frequency;
        trajectory.push(x);
        while x > start_frequency {
            x -= dt * s * x * (1.0 - x);
            if x <= start_frequency {
                break;
            }
            trajectory.push(x);
        }
        Self {
            position,
            trajectory,
            dt,
            step: 0,
            labels_assigned: false,
            complete: false,
        }
    }
}

impl Simulator {
    // Move a whole chain between labels, carrying its Fenwick masses.
    pub(crate) fn move_chain_label(&mut self, head: SegmentIndex, new_label: usize) {
        let (population, old_label) = {
            let s = self.arena.get(head);
            (s.population, s.label)
        };
        if old_label == new_label {
            return;
        }
        let list = &mut self.populations[population].lineages[old_label];
        let pos = list
            .iter()
            .position(|h| *h == head)
            .expect("chain head not in its label index");
        list.swap_remove(pos);
        let mut cur = Some(head);
        while let Some(id) = cur {
            let rm = self.recomb_mass[old_label].get_value(id);
            self.recomb_mass[old_label].set_value(id, 0.0);
            self.recomb_mass[new_label].set_value(id, rm);
            let gm = self.gc_mass[old_label].get_value(id);
            self.gc_mass[old_label].set_value(id, 0.0);
            self.gc_mass[new_label].set_value(id, gm);
            let seg = self.arena.get_mut(id);
            seg.label = new_label;
            cur = seg.next;
        }
        self.populations[population].lineages[new_label].push(head);
    }

    // Bernoulli(x0) assignment of extant lineages to the beneficial
    // background when the sweep phase begins.
    fn assign_sweep_labels(&mut self, x0: f64) {
        let heads: Vec<SegmentIndex> = self.populations[0].lineages[WILD_TYPE].clone();
        for head in heads {
            if self.rng.gen::<f64>() < x0 {
                self.move_chain_label(head, BENEFICIAL);
            }
        }
    }

    // Recombination during the sweep: the side not carrying the selected
    // position is re-assigned to the beneficial background with
    // probability x.
    fn sweep_recombination(&mut self, x: f64) -> Result<(), SimError> {
        let m0 = self.recomb_mass[WILD_TYPE].total();
        let m1 = self.recomb_mass[BENEFICIAL].total();
        let label = if self.rng.gen::<f64>() * (m0 + m1) < m0 {
            WILD_TYPE
        } else {
            BENEFICIAL
        };
        let position = self.sweep.as_ref().unwrap().position;
        let (lhs, rhs, breakpoint) = self.recombination_event(label)?;
        let non_carrier = if position >= breakpoint { lhs } else { rhs };
        let new_label = if self.rng.gen::<f64>() < x {
            BENEFICIAL
        } else {
            WILD_TYPE
        };
        self.move_chain_label(non_carrier, new_label);
        Ok(())
    }

    pub(crate) fn run_sweep(
        &mut self,
        end_time: f64,
        max_events: u64,
    ) -> Result<ExitStatus, SimError> {
        let mut events = 0u64;
        let complete = self.sweep.as_ref().map_or(true, |s| s.complete);
        if !complete {
            if !self.sweep.as_ref().unwrap().labels_assigned {
                let x0 = self.sweep.as_ref().unwrap().trajectory[0];
                self.assign_sweep_labels(x0);
                self.sweep.as_mut().unwrap().labels_assigned = true;
            }
            loop {
                if !self.lineages_remain() {
                    return Ok(ExitStatus::Coalesced);
                }
                if events >= max_events {
                    return Ok(ExitStatus::MaxEvents);
                }
                let (step, dt, num_steps) = {
                    let s = self.sweep.as_ref().unwrap();
                    (s.step, s.dt, s.trajectory.len())
                };
                if step >= num_steps {
                    break;
                }
                let t_next = self.time + dt;
                let (t_fixed, is_sampling) = self.next_fixed_event_time();
                if t_fixed <= t_next {
                    if t_fixed > end_time {
                        self.time = end_time;
                        return Ok(ExitStatus::MaxTime);
                    }
                    self.time = t_fixed;
                    self.apply_next_fixed_event(is_sampling)?;
                    events += 1;
                    continue;
                }
                if t_next > end_time {
                    self.time = end_time;
                    return Ok(ExitStatus::MaxTime);
                }
                let x = self.sweep.as_ref().unwrap().trajectory[step];
                let k1 = self.populations[0].lineages[BENEFICIAL].len();
                let k0 = self.populations[0].lineages[WILD_TYPE].len();
                let size = self.populations[0].params.size_at(self.time);
                let p_coal_b = if k1 >= 2 {
                    (k1 * (k1 - 1)) as f64 / (4.0 * size * x) * dt
                } else {
                    0.0
                };
                let p_coal_w = if k0 >= 2 {
                    (k0 * (k0 - 1)) as f64 / (4.0 * size * (1.0 - x)) * dt
                } else {
                    0.0
                };
                let p_re =
                    (self.recomb_mass[WILD_TYPE].total() + self.recomb_mass[BENEFICIAL].total()) * dt;
                let p_total = p_coal_b + p_coal_w + p_re;
                if p_total > 1.0 {
                    return Err(SimError::BadState(
                        "sweep dt too coarse: per-step event probability exceeds one".to_string(),
                    ));
                }
                self.time = t_next;
                self.sweep.as_mut().unwrap().step += 1;
                let u: f64 = self.rng.gen();
                if u < p_coal_b {
                    self.kingman_merge(0, BENEFICIAL)?;
                    events += 1;
                } else if u < p_coal_b + p_coal_w {
                    self.kingman_merge(0, WILD_TYPE)?;
                    events += 1;
                } else if u < p_total {
                    self.sweep_recombination(x)?;
                    events += 1;
                }
                #[cfg(debug_assertions)]
                self.verify_state();
            }
            // The sweep has fixed (backwards: been lost); everything
            // returns to the neutral background.
            let heads: Vec<SegmentIndex> = self.populations[0].lineages[BENEFICIAL].clone();
            for head in heads {
                self.move_chain_label(head, WILD_TYPE);
            }
            self.sweep.as_mut().unwrap().complete = true;
        }
        self.run_continuous(end_time, max_events.saturating_sub(events), WILD_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep_model() -> SimulationModel {
        SimulationModel::SweepGenicSelection {
            reference_size: 100.0,
            position: 0.5,
            start_frequency: 0.05,
            end_frequency: 0.95,
            alpha: 200.0,
            dt: 0.05,
        }
    }

    #[test]
    fn test_trajectory_is_monotone_decreasing() {
        let state = SweepState::from_model(&sweep_model());
        assert!(state.trajectory.len() > 1);
        assert_eq!(state.trajectory[0], 0.95);
        for w in state.trajectory.windows(2) {
            assert!(w[1] < w[0]);
        }
        assert!(*state.trajectory.last().unwrap() > 0.05);
    }

    #[test]
    fn test_trajectory_respects_endpoints() {
        let state = SweepState::from_model(&sweep_model());
        for x in &state.trajectory {
            assert!(*x > 0.0 && *x < 1.0);
        }
    }
}
