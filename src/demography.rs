//! Population-parameter trajectories, the migration matrix, and the
//! time-ordered queue of demographic events.

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Initial state of one population.
///
/// The effective size at simulation time `t` is
/// `initial_size * exp(-growth_rate * (t - start_time_of_last_change))`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfiguration {
    pub initial_size: f64,
    #[serde(default)]
    pub growth_rate: f64,
}

impl PopulationConfiguration {
    pub fn new(initial_size: f64, growth_rate: f64) -> Self {
        Self {
            initial_size,
            growth_rate,
        }
    }
}

/// Runtime population parameters; `start_time` is the time of the last
/// parameter change.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PopulationParams {
    pub initial_size: f64,
    pub growth_rate: f64,
    pub start_time: f64,
}

impl PopulationParams {
    pub fn from_config(c: &PopulationConfiguration, start_time: f64) -> Self {
        Self {
            initial_size: c.initial_size,
            growth_rate: c.growth_rate,
            start_time,
        }
    }

    /// Effective size at time `t`.
    pub fn size_at(&self, t: f64) -> f64 {
        if self.growth_rate == 0.0 {
            self.initial_size
        } else {
            self.initial_size * (-self.growth_rate * (t - self.start_time)).exp()
        }
    }
}

/// The recognised demographic event kinds.
///
/// Serialised tags match the external interface names
/// (`"population_parameters_change"`, `"census_event"`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DemographicEventKind {
    /// Update `(initial_size, growth_rate)` of one population (or all,
    /// with `population == -1`); omitted fields keep their current value,
    /// with the size re-anchored at the event time.
    PopulationParametersChange {
        population: i32,
        #[serde(default)]
        initial_size: Option<f64>,
        #[serde(default)]
        growth_rate: Option<f64>,
    },
    /// Set one flattened matrix entry, or all off-diagonal entries with
    /// `matrix_index == -1`.
    MigrationRateChange {
        matrix_index: i32,
        migration_rate: f64,
    },
    /// Move each lineage in `source` to `dest` independently with
    /// probability `proportion`.
    MassMigration {
        source: i32,
        dest: i32,
        proportion: f64,
    },
    /// Each lineage in `population` joins a single merger with
    /// probability `proportion`.
    SimpleBottleneck { population: i32, proportion: f64 },
    /// Apply a zero-time burst of drift equivalent to `strength`
    /// generations.
    InstantaneousBottleneck { population: i32, strength: f64 },
    /// Snapshot every extant segment as a fresh census-flagged node.
    CensusEvent,
}

/// A demographic event scheduled at `time`.
///
/// Events at equal times are applied in insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemographicEvent {
    pub time: f64,
    #[serde(flatten)]
    pub kind: DemographicEventKind,
}

impl DemographicEvent {
    pub fn new(time: f64, kind: DemographicEventKind) -> Self {
        Self { time, kind }
    }
}

const SECTION_POPCONF: &str = "population configuration";
const SECTION_MIGRATION: &str = "migration matrix";
const SECTION_EVENTS: &str = "demographic events";

pub(crate) fn validate_population_configurations(
    configs: &[PopulationConfiguration],
) -> Result<(), SimError> {
    if configs.is_empty() {
        return Err(input_error!(
            SECTION_POPCONF,
            "at least one population required"
        ));
    }
    for (j, c) in configs.iter().enumerate() {
        if !(c.initial_size > 0.0) || !c.initial_size.is_finite() {
            return Err(input_error!(
                SECTION_POPCONF,
                "population {} must have a positive initial size",
                j
            ));
        }
        if !c.growth_rate.is_finite() {
            return Err(input_error!(
                SECTION_POPCONF,
                "population {} has a non-finite growth rate",
                j
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_migration_matrix(
    matrix: &[f64],
    num_populations: usize,
) -> Result<(), SimError> {
    if matrix.len() != num_populations * num_populations {
        return Err(input_error!(
            SECTION_MIGRATION,
            "expected a {0}x{0} matrix, got {1} entries",
            num_populations,
            matrix.len()
        ));
    }
    if matrix.iter().any(|m| !(*m >= 0.0) || !m.is_finite()) {
        return Err(input_error!(
            SECTION_MIGRATION,
            "rates must be finite and non-negative"
        ));
    }
    Ok(())
}

fn check_population(id: i32, num_populations: usize, allow_all: bool) -> Result<(), SimError> {
    let ok = (allow_all && id == -1) || (id >= 0 && (id as usize) < num_populations);
    if ok {
        Ok(())
    } else {
        Err(input_error!(
            SECTION_EVENTS,
            "population id {} out of range",
            id
        ))
    }
}

fn check_proportion(p: f64) -> Result<(), SimError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(input_error!(
            SECTION_EVENTS,
            "proportion {} must lie in [0, 1]",
            p
        ))
    }
}

/// Validate a time-sorted event list against the population count.
pub(crate) fn validate_demographic_events(
    events: &[DemographicEvent],
    num_populations: usize,
    start_time: f64,
) -> Result<(), SimError> {
    let mut last = f64::NEG_INFINITY;
    for e in events {
        if !e.time.is_finite() || e.time < 0.0 {
            return Err(input_error!(
                SECTION_EVENTS,
                "event time {} must be finite and non-negative",
                e.time
            ));
        }
        if e.time < last {
            return Err(input_error!(SECTION_EVENTS, "events must be time sorted"));
        }
        if e.time < start_time {
            return Err(input_error!(
                SECTION_EVENTS,
                "event at time {} predates the start time {}",
                e.time,
                start_time
            ));
        }
        last = e.time;
        match &e.kind {
            DemographicEventKind::PopulationParametersChange {
                population,
                initial_size,
                growth_rate,
            } => {
                check_population(*population, num_populations, true)?;
                if initial_size.is_none() && growth_rate.is_none() {
                    return Err(input_error!(
                        SECTION_EVENTS,
                        "parameter change must set a size or a growth rate"
                    ));
                }
                if let Some(s) = initial_size {
                    if !(*s > 0.0) {
                        return Err(input_error!(
                            SECTION_EVENTS,
                            "new population size must be positive"
                        ));
                    }
                }
            }
            DemographicEventKind::MigrationRateChange {
                matrix_index,
                migration_rate,
            } => {
                let n = (num_populations * num_populations) as i32;
                if *matrix_index != -1 && !(0..n).contains(matrix_index) {
                    return Err(input_error!(
                        SECTION_EVENTS,
                        "migration matrix index {} out of range",
                        matrix_index
                    ));
                }
                if *matrix_index >= 0 {
                    let (row, col) = (
                        *matrix_index as usize / num_populations,
                        *matrix_index as usize % num_populations,
                    );
                    if row == col {
                        return Err(input_error!(
                            SECTION_EVENTS,
                            "cannot set a diagonal migration matrix entry"
                        ));
                    }
                }
                if !(*migration_rate >= 0.0) {
                    return Err(input_error!(
                        SECTION_EVENTS,
                        "migration rate must be non-negative"
                    ));
                }
            }
            DemographicEventKind::MassMigration {
                source,
                dest,
                proportion,
            } => {
                check_population(*source, num_populations, false)?;
                check_population(*dest, num_populations, false)?;
                if source == dest {
                    return Err(input_error!(
                        SECTION_EVENTS,
                        "mass migration source and dest must differ"
                    ));
                }
                check_proportion(*proportion)?;
            }
            DemographicEventKind::SimpleBottleneck {
                population,
                proportion,
            } => {
                check_population(*population, num_populations, false)?;
                check_proportion(*proportion)?;
            }
            DemographicEventKind::InstantaneousBottleneck {
                population,
                strength,
            } => {
                check_population(*population, num_populations, false)?;
                if !(*strength >= 0.0) {
                    return Err(input_error!(
                        SECTION_EVENTS,
                        "bottleneck strength must be non-negative"
                    ));
                }
            }
            DemographicEventKind::CensusEvent => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_trajectory() {
        let p = PopulationParams {
            initial_size: 100.0,
            growth_rate: 0.0,
            start_time: 0.0,
        };
        assert_eq!(p.size_at(50.0), 100.0);
        let p = PopulationParams {
            initial_size: 100.0,
            growth_rate: 0.1,
            start_time: 10.0,
        };
        // Backwards in time the population shrinks under positive growth.
        assert!((p.size_at(10.0) - 100.0).abs() < 1e-12);
        assert!(p.size_at(20.0) < 100.0);
    }

    #[test]
    fn test_population_configuration_validation() {
        assert!(validate_population_configurations(&[]).is_err());
        assert!(
            validate_population_configurations(&[PopulationConfiguration::new(0.0, 0.0)]).is_err()
        );
        assert!(
            validate_population_configurations(&[PopulationConfiguration::new(10.0, -0.5)]).is_ok()
        );
    }

    #[test]
    fn test_migration_matrix_validation() {
        assert!(validate_migration_matrix(&[0.0, 1.0, 1.0, 0.0], 2).is_ok());
        assert!(validate_migration_matrix(&[0.0, 1.0], 2).is_err());
        let err = validate_migration_matrix(&[0.0, -1.0, 1.0, 0.0], 2).unwrap_err();
        assert!(format!("{}", err).starts_with("Input error in migration matrix"));
    }

    #[test]
    fn test_events_must_be_sorted() {
        let events = vec![
            DemographicEvent::new(2.0, DemographicEventKind::CensusEvent),
            DemographicEvent::new(1.0, DemographicEventKind::CensusEvent),
        ];
        assert!(validate_demographic_events(&events, 1, 0.0).is_err());
    }

    #[test]
    fn test_event_validation() {
        let bad = DemographicEvent::new(
            1.0,
            DemographicEventKind::MassMigration {
                source: 0,
                dest: 5,
                proportion: 0.5,
            },
        );
        assert!(validate_demographic_events(&[bad], 2, 0.0).is_err());
        let bad = DemographicEvent::new(
            1.0,
            DemographicEventKind::MigrationRateChange {
                matrix_index: 0,
                migration_rate: 0.1,
            },
        );
        // Index 0 is diagonal in a 2x2 matrix.
        assert!(validate_demographic_events(&[bad], 2, 0.0).is_err());
        let ok = DemographicEvent::new(
            1.0,
            DemographicEventKind::MigrationRateChange {
                matrix_index: 1,
                migration_rate: 0.1,
            },
        );
        assert!(validate_demographic_events(&[ok], 2, 0.0).is_ok());
    }

    #[test]
    fn test_event_kind_serialisation_tags() {
        let e = DemographicEvent::new(
            5.0,
            DemographicEventKind::MassMigration {
                source: 0,
                dest: 1,
                proportion: 1.0,
            },
        );
        let s = serde_json::to_string(&e).unwrap();
        assert!(s.contains("\"type\":\"mass_migration\""));
        let back: DemographicEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(back, e);
    }
}
