//! The plug-in simulation models.
//!
//! A model contributes two things to the event loop: the rate of
//! common-ancestor events given the extant lineage count, and the outcome
//! of sampling one such event.  Everything else (recombination, gene
//! conversion, migration, demography) is model-agnostic.  Selecting a
//! model swaps the value held by the simulator; the scheduler dispatches
//! through [`SimulationModel::kind`].

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Which event-loop driver a model runs under.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModelKind {
    /// Exponential waiting times on a continuous clock.
    Continuous,
    /// Unit-generation discrete Wright-Fisher steps.
    Discrete,
    /// Discretised structured-coalescent sweep phase, then continuous.
    Sweep,
    /// Climbing a fixed input pedigree.
    Pedigree,
}

/// A simulation model object: a name, a reference population size, and
/// model-specific parameters.
///
/// Serialised tags match the external interface names (`"hudson"`,
/// `"smc_prime"`, `"wf_ped"`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum SimulationModel {
    /// The standard coalescent with recombination.
    Hudson { reference_size: f64 },
    /// Sequentially Markov coalescent: common-ancestor events between
    /// lineages with no overlapping material are rejected.
    Smc { reference_size: f64 },
    /// SMC': as [`SimulationModel::Smc`], but merges between contiguous
    /// (abutting) material are retained.
    SmcPrime { reference_size: f64 },
    /// Discrete-time Wright-Fisher: unit generations, one parent pick per
    /// lineage per generation.
    Dtwf { reference_size: f64 },
    /// Wright-Fisher conditioned on a fixed input pedigree.
    WfPed { reference_size: f64 },
    /// Dirac Λ-coalescent: Kingman rate plus a point-mass rate `c` at
    /// which a Binomial(k, ψ) subset of lineages merges simultaneously.
    Dirac {
        reference_size: f64,
        psi: f64,
        c: f64,
    },
    /// Beta Λ-coalescent with intensity Beta(2 - α, α) truncated at
    /// `truncation_point`.
    Beta {
        reference_size: f64,
        alpha: f64,
        truncation_point: f64,
    },
    /// A genic-selection sweep at `position`.
    ///
    /// The allele-frequency path between `start_frequency` and
    /// `end_frequency` is precomputed before the sweep phase runs.  This
    /// implementation uses the *deterministic logistic* trajectory stepped
    /// at `dt` generations; a conditioned-diffusion path is a valid
    /// alternative reading of the model and would slot into the same
    /// precomputed representation.
    SweepGenicSelection {
        reference_size: f64,
        position: f64,
        start_frequency: f64,
        end_frequency: f64,
        alpha: f64,
        dt: f64,
    },
}

impl SimulationModel {
    /// The Hudson coalescent at reference size `n`.
    pub fn hudson(reference_size: f64) -> Self {
        SimulationModel::Hudson { reference_size }
    }

    /// The model's external name.
    pub fn name(&self) -> &'static str {
        match self {
            SimulationModel::Hudson { .. } => "hudson",
            SimulationModel::Smc { .. } => "smc",
            SimulationModel::SmcPrime { .. } => "smc_prime",
            SimulationModel::Dtwf { .. } => "dtwf",
            SimulationModel::WfPed { .. } => "wf_ped",
            SimulationModel::Dirac { .. } => "dirac",
            SimulationModel::Beta { .. } => "beta",
            SimulationModel::SweepGenicSelection { .. } => "sweep_genic_selection",
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            SimulationModel::Hudson { .. }
            | SimulationModel::Smc { .. }
            | SimulationModel::SmcPrime { .. }
            | SimulationModel::Dirac { .. }
            | SimulationModel::Beta { .. } => ModelKind::Continuous,
            SimulationModel::Dtwf { .. } => ModelKind::Discrete,
            SimulationModel::WfPed { .. } => ModelKind::Pedigree,
            SimulationModel::SweepGenicSelection { .. } => ModelKind::Sweep,
        }
    }

    pub fn reference_size(&self) -> f64 {
        match self {
            SimulationModel::Hudson { reference_size }
            | SimulationModel::Smc { reference_size }
            | SimulationModel::SmcPrime { reference_size }
            | SimulationModel::Dtwf { reference_size }
            | SimulationModel::WfPed { reference_size }
            | SimulationModel::Dirac { reference_size, .. }
            | SimulationModel::Beta { reference_size, .. }
            | SimulationModel::SweepGenicSelection { reference_size, .. } => *reference_size,
        }
    }

    pub(crate) fn validate(&self, sequence_length: f64) -> Result<(), SimError> {
        let section = "simulation model";
        if !(self.reference_size() > 0.0) || !self.reference_size().is_finite() {
            return Err(input_error!(section, "reference size must be positive"));
        }
        match self {
            SimulationModel::Dirac { psi, c, .. } => {
                if !(*psi > 0.0 && *psi < 1.0) {
                    return Err(input_error!(section, "psi must lie in (0, 1)"));
                }
                if !(*c >= 0.0) {
                    return Err(input_error!(section, "c must be non-negative"));
                }
            }
            SimulationModel::Beta {
                alpha,
                truncation_point,
                ..
            } => {
                if !(*alpha > 1.0 && *alpha < 2.0) {
                    return Err(input_error!(section, "alpha must lie in (1, 2)"));
                }
                if !(*truncation_point > 0.0 && *truncation_point <= 1.0) {
                    return Err(input_error!(
                        section,
                        "truncation point must lie in (0, 1]"
                    ));
                }
            }
            SimulationModel::SweepGenicSelection {
                position,
                start_frequency,
                end_frequency,
                alpha,
                dt,
                ..
            } => {
                let section = "sweep genic selection";
                if !(*position >= 0.0 && *position < sequence_length) {
                    return Err(input_error!(
                        section,
                        "position must lie in [0, {})",
                        sequence_length
                    ));
                }
                if !(*start_frequency > 0.0 && *start_frequency < 1.0)
                    || !(*end_frequency > 0.0 && *end_frequency < 1.0)
                {
                    return Err(input_error!(section, "frequencies must lie in (0, 1)"));
                }
                if start_frequency >= end_frequency {
                    return Err(input_error!(
                        section,
                        "start frequency must be below end frequency"
                    ));
                }
                if !(*alpha > 0.0) {
                    return Err(input_error!(section, "alpha must be positive"));
                }
                if !(*dt > 0.0) {
                    return Err(input_error!(section, "dt must be positive"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_kinds() {
        assert_eq!(SimulationModel::hudson(1.0).name(), "hudson");
        assert_eq!(
            SimulationModel::SmcPrime { reference_size: 1.0 }.name(),
            "smc_prime"
        );
        assert_eq!(
            SimulationModel::Dtwf { reference_size: 10.0 }.kind(),
            ModelKind::Discrete
        );
        assert_eq!(
            SimulationModel::WfPed { reference_size: 10.0 }.kind(),
            ModelKind::Pedigree
        );
    }

    #[test]
    fn test_serialisation_tag() {
        let m = SimulationModel::Dirac {
            reference_size: 100.0,
            psi: 0.3,
            c: 1.0,
        };
        let s = serde_json::to_string(&m).unwrap();
        assert!(s.contains("\"name\":\"dirac\""));
        let back: SimulationModel = serde_json::from_str(&s).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_validation() {
        assert!(SimulationModel::hudson(0.0).validate(1.0).is_err());
        assert!(SimulationModel::Dirac {
            reference_size: 1.0,
            psi: 1.5,
            c: 0.0
        }
        .validate(1.0)
        .is_err());
        assert!(SimulationModel::Beta {
            reference_size: 1.0,
            alpha: 2.5,
            truncation_point: 1.0
        }
        .validate(1.0)
        .is_err());
        let sweep = SimulationModel::SweepGenicSelection {
            reference_size: 100.0,
            position: 50.0,
            start_frequency: 1.0 / 200.0,
            end_frequency: 0.99,
            alpha: 100.0,
            dt: 0.01,
        };
        assert!(sweep.validate(100.0).is_ok());
        assert!(sweep.validate(10.0).is_err());
    }
}
