//! Discrete-generation drivers: the Wright-Fisher model and the
//! fixed-pedigree walk.
//!
//! Under `dtwf` the clock advances in unit generations.  Each generation
//! every lineage first resolves migration from the matrix row, then is
//! cut at Poisson-many crossovers and its alternating chunks each pick
//! one of the `N(t)` parents; lineages landing on the same parent merge
//! in one pass.  Under `wf_ped` the same segregation machinery walks a
//! fixed input pedigree instead of sampling parents.

use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::arena::SegmentIndex;
use crate::model::ModelKind;
use crate::{ExitStatus, IndividualId, NodeFlags, SimError, Simulator};

impl Simulator {
    pub(crate) fn run_dtwf(
        &mut self,
        end_time: f64,
        max_events: u64,
    ) -> Result<ExitStatus, SimError> {
        let mut events = 0u64;
        loop {
            if !self.lineages_remain() {
                return Ok(ExitStatus::Coalesced);
            }
            if events >= max_events {
                return Ok(ExitStatus::MaxEvents);
            }
            let t_gen = self.time.floor() + 1.0;
            let (t_fixed, is_sampling) = self.next_fixed_event_time();
            if t_fixed <= t_gen {
                if t_fixed > end_time {
                    self.time = end_time;
                    return Ok(ExitStatus::MaxTime);
                }
                self.time = t_fixed;
                self.apply_next_fixed_event(is_sampling)?;
                events += 1;
                continue;
            }
            if t_gen > end_time {
                self.time = end_time;
                return Ok(ExitStatus::MaxTime);
            }
            self.time = t_gen;
            self.dtwf_generation()?;
            events += 1;
            #[cfg(debug_assertions)]
            self.verify_state();
        }
    }

    // One Wright-Fisher generation, applied at the (integer) current time.
    fn dtwf_generation(&mut self) -> Result<(), SimError> {
        let label = 0;
        let num_populations = self.populations.len();

        // Migration pass: each lineage picks a destination from its
        // population's matrix row; the remaining mass stays put.  Moves
        // are decided for every lineage first so nothing migrates twice
        // in one generation.
        let mut moves: Vec<(usize, usize, usize)> = Vec::new();
        for source in 0..num_populations {
            let rates: Vec<f64> = (0..num_populations)
                .map(|dest| {
                    if dest == source {
                        0.0
                    } else {
                        self.migration_matrix[source * num_populations + dest]
                    }
                })
                .collect();
            let total: f64 = rates.iter().sum();
            if total == 0.0 {
                continue;
            }
            if total > 1.0 {
                return Err(SimError::BadState(
                    "per-generation migration probability exceeds one".to_string(),
                ));
            }
            let k = self.populations[source].lineages[label].len();
            for idx in (0..k).rev() {
                let u: f64 = self.rng.gen();
                if u >= total {
                    continue;
                }
                let mut acc = 0.0;
                let mut dest = source;
                for (d, rate) in rates.iter().enumerate() {
                    acc += rate;
                    if u < acc {
                        dest = d;
                        break;
                    }
                }
                moves.push((source, idx, dest));
            }
        }
        // Indices were recorded descending per source, so removal stays
        // positionally valid as destinations only ever append.
        for (source, idx, dest) in moves {
            let head = self.remove_lineage_at(source, label, idx);
            self.migrate_lineage(head, source, dest)?;
            self.counters.num_migration_events[source * num_populations + dest] += 1;
        }

        // Reproduction pass: crossover chunks pick parents; co-parented
        // chunks merge.
        for population in 0..num_populations {
            let size = self.populations[population].params.size_at(self.time).round();
            if size < 1.0 {
                return Err(SimError::BadState(format!(
                    "population {} has size below one at time {}",
                    population, self.time
                )));
            }
            let n = size as u64;
            let heads = std::mem::take(&mut self.populations[population].lineages[label]);
            let mut parent_buckets: BTreeMap<u64, Vec<SegmentIndex>> = BTreeMap::new();
            for head in heads {
                for piece in self.split_by_crossovers(head)? {
                    let parent = self.rng.gen_range(0..n);
                    parent_buckets.entry(parent).or_default().push(piece);
                }
            }
            for (_, chains) in parent_buckets {
                if chains.len() == 1 {
                    self.insert_lineage(chains[0]);
                } else {
                    self.counters.num_common_ancestor_events += 1;
                    let merged = self.merge_ancestors(
                        population,
                        label,
                        chains,
                        NodeFlags::default(),
                        IndividualId::NULL,
                    )?;
                    if let Some(head) = merged {
                        self.insert_lineage(head);
                    }
                }
            }
        }
        Ok(())
    }

    /// Cut the chain at Poisson-many crossover positions and regroup the
    /// alternating chunks into (at most) two chains.  A crossover in a
    /// gap between segments still flips parity without producing a
    /// chunk.  The returned heads are detached from every lineage index.
    pub(crate) fn split_by_crossovers(
        &mut self,
        head: SegmentIndex,
    ) -> Result<Vec<SegmentIndex>, SimError> {
        let lo = self.arena.get(head).left;
        let tail = self.chain_tail(head);
        let hi = self.arena.get(tail).right;
        let total = self
            .config
            .recombination_map
            .mass_between_left_exclusive(lo, hi);
        let num_crossovers = if total > 0.0 {
            Poisson::new(total)
                .expect("positive mass")
                .sample(&mut self.rng) as usize
        } else {
            0
        };
        if num_crossovers == 0 {
            return Ok(vec![head]);
        }
        let mut positions: Vec<f64> = (0..num_crossovers)
            .map(|_| {
                let offset = (1.0 - self.rng.gen::<f64>()) * total;
                self.config.recombination_map.shift_by_mass(hi, -offset)
            })
            .filter(|p| *p > lo && *p < hi)
            .collect();
        positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        positions.dedup();
        for p in &positions {
            self.breakpoints.insert(p.to_bits());
        }

        let mut group_heads: [Option<SegmentIndex>; 2] = [None, None];
        let mut group = 0usize;
        let mut current = Some(head);
        let mut attach = |sim: &mut Self, group: usize, chunk: SegmentIndex| {
            let existing = group_heads[group];
            match existing {
                Some(h) => sim.join_chains(h, chunk),
                None => group_heads[group] = Some(chunk),
            }
        };
        for pos in positions {
            let cur = match current {
                Some(c) => c,
                None => break,
            };
            match self.split_chain_at(cur, pos)? {
                Some(right) if right == cur => {
                    // Crossover before the chunk's material: parity flips,
                    // nothing to attach.
                }
                Some(right) => {
                    attach(self, group, cur);
                    current = Some(right);
                }
                None => {
                    attach(self, group, cur);
                    current = None;
                }
            }
            group ^= 1;
        }
        if let Some(cur) = current {
            attach(self, group, cur);
        }
        Ok(group_heads.into_iter().flatten().collect())
    }

    // ------------------------------------------------------------------
    // Pedigree climbing
    // ------------------------------------------------------------------

    // Create individual rows, sample nodes, and the per-individual
    // chromosome-slot queues.
    pub(crate) fn init_pedigree_state(&mut self) -> Result<(), SimError> {
        let ped = self.config.pedigree.clone().expect("validated pedigree");
        let n = ped.num_individuals();
        for _ in 0..n {
            self.tables.add_individual(0, &[]);
        }
        self.pedigree_slots = vec![vec![Vec::new(); ped.ploidy]; n];
        let sequence_length = self.sequence_length();
        for row in 0..n {
            if ped.is_sample[row] == 0 {
                continue;
            }
            for slot in 0..ped.ploidy {
                let node = self.tables.add_node(
                    NodeFlags::new_sample(),
                    ped.time[row],
                    crate::PopulationId::from(0),
                    IndividualId::try_from(row)?,
                )?;
                let seg = self.alloc_segment(0.0, sequence_length, node, 0, 0)?;
                self.set_segment_mass(seg);
                self.pedigree_slots[row][slot].push(seg);
            }
        }
        Ok(())
    }

    pub(crate) fn run_pedigree(
        &mut self,
        end_time: f64,
        max_events: u64,
    ) -> Result<ExitStatus, SimError> {
        debug_assert_eq!(self.config.model.kind(), ModelKind::Pedigree);
        let ped = self.config.pedigree.clone().expect("validated pedigree");
        let order = ped.rows_by_time();
        let mut events = 0u64;
        while self.pedigree_cursor < order.len() {
            if events >= max_events {
                return Ok(ExitStatus::MaxEvents);
            }
            let row = order[self.pedigree_cursor];
            let t = ped.time[row];
            if t > end_time {
                self.time = end_time;
                return Ok(ExitStatus::MaxTime);
            }
            self.time = self.time.max(t);
            for slot in 0..ped.ploidy {
                let chains = std::mem::take(&mut self.pedigree_slots[row][slot]);
                if chains.is_empty() {
                    continue;
                }
                let merged = if chains.len() >= 2 {
                    self.merge_ancestors(
                        0,
                        0,
                        chains,
                        NodeFlags::default(),
                        IndividualId::try_from(row)?,
                    )?
                } else {
                    Some(chains[0])
                };
                let head = match merged {
                    Some(h) => h,
                    None => continue,
                };
                let parent = ped.parents_of(row)[slot];
                if parent == -1 {
                    // Founder: the lineage stays extant.
                    self.insert_lineage(head);
                } else {
                    // Mendelian segregation: crossover chunks land on a
                    // uniformly chosen chromosome of this slot's parent.
                    for piece in self.split_by_crossovers(head)? {
                        let pslot = self.rng.gen_range(0..ped.ploidy);
                        self.pedigree_slots[parent as usize][pslot].push(piece);
                    }
                }
            }
            self.pedigree_cursor += 1;
            events += 1;
            #[cfg(debug_assertions)]
            self.verify_state();
        }
        if self.lineages_remain() {
            Ok(ExitStatus::MaxTime)
        } else {
            Ok(ExitStatus::Coalesced)
        }
    }
}
