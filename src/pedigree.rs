//! Fixed input pedigrees for the `wf_ped` model.

use serde::{Deserialize, Serialize};

use crate::SimError;

const SECTION: &str = "pedigree";

/// A fixed pedigree: per individual, an external id, `ploidy` parent row
/// indices (`-1` for founders), a time, and a sample indicator.
///
/// Rows reference each other by index into these columns, not by external
/// id.  Only valid when the simulation model is
/// [`WfPed`](crate::SimulationModel::WfPed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pedigree {
    pub individual: Vec<i32>,
    /// Row-major `[N, ploidy]`.
    pub parents: Vec<i32>,
    pub time: Vec<f64>,
    pub is_sample: Vec<u32>,
    pub ploidy: usize,
}

impl Pedigree {
    pub fn new(
        individual: Vec<i32>,
        parents: Vec<i32>,
        time: Vec<f64>,
        is_sample: Vec<u32>,
        ploidy: usize,
    ) -> Result<Self, SimError> {
        let p = Self {
            individual,
            parents,
            time,
            is_sample,
            ploidy,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn num_individuals(&self) -> usize {
        self.individual.len()
    }

    pub fn num_samples(&self) -> usize {
        self.is_sample.iter().filter(|s| **s != 0).count()
    }

    /// Parent row indices of individual `j`.
    pub fn parents_of(&self, j: usize) -> &[i32] {
        &self.parents[j * self.ploidy..(j + 1) * self.ploidy]
    }

    /// Row indices sorted by `(time, row)`, youngest first.
    pub(crate) fn rows_by_time(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..self.num_individuals()).collect();
        rows.sort_by(|a, b| {
            self.time[*a]
                .partial_cmp(&self.time[*b])
                .unwrap()
                .then(a.cmp(b))
        });
        rows
    }

    fn validate(&self) -> Result<(), SimError> {
        let n = self.individual.len();
        if n == 0 {
            return Err(input_error!(SECTION, "at least one individual required"));
        }
        if self.ploidy == 0 {
            return Err(input_error!(SECTION, "ploidy must be positive"));
        }
        if self.parents.len() != n * self.ploidy {
            return Err(input_error!(
                SECTION,
                "expected {} parent entries, got {}",
                n * self.ploidy,
                self.parents.len()
            ));
        }
        if self.time.len() != n || self.is_sample.len() != n {
            return Err(input_error!(SECTION, "column lengths do not match"));
        }
        for (j, t) in self.time.iter().enumerate() {
            if !t.is_finite() || *t < 0.0 {
                return Err(input_error!(
                    SECTION,
                    "individual {} has invalid time {}",
                    j,
                    t
                ));
            }
        }
        for j in 0..n {
            for p in self.parents_of(j) {
                if *p != -1 {
                    if *p < 0 || (*p as usize) >= n {
                        return Err(input_error!(
                            SECTION,
                            "individual {} has parent index {} out of range",
                            j,
                            p
                        ));
                    }
                    if self.time[*p as usize] <= self.time[j] {
                        return Err(input_error!(
                            SECTION,
                            "individual {} is not younger than its parent {}",
                            j,
                            p
                        ));
                    }
                }
            }
        }
        if self.num_samples() == 0 {
            return Err(input_error!(SECTION, "no sample individuals"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trio() -> Pedigree {
        // One sampled child with two founder parents.
        Pedigree::new(
            vec![100, 101, 102],
            vec![1, 2, -1, -1, -1, -1],
            vec![0.0, 1.0, 1.0],
            vec![1, 0, 0],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_trio_is_valid() {
        let p = trio();
        assert_eq!(p.num_individuals(), 3);
        assert_eq!(p.num_samples(), 1);
        assert_eq!(p.parents_of(0), &[1, 2]);
        assert_eq!(p.rows_by_time(), vec![0, 1, 2]);
    }

    #[test]
    fn test_parent_must_be_older() {
        let r = Pedigree::new(
            vec![0, 1],
            vec![1, -1, -1, -1],
            vec![1.0, 1.0],
            vec![1, 0],
            2,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_parent_index_range() {
        let r = Pedigree::new(
            vec![0, 1],
            vec![7, -1, -1, -1],
            vec![0.0, 1.0],
            vec![1, 0],
            2,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_column_lengths() {
        let r = Pedigree::new(vec![0, 1], vec![-1, -1], vec![0.0, 1.0], vec![1, 0], 2);
        assert!(r.is_err());
    }
}
