//! The genetic coordinate system.

use crate::intervalmap::IntervalMap;
use crate::SimError;

/// A recombination map: an [`IntervalMap`] of local recombination rates,
/// specialised to convert between physical and genetic ("mass")
/// coordinates.
///
/// In the default continuous mode, breakpoints can fall anywhere and the
/// genetic distance between two physical positions is the integral of the
/// local rate between them.  In `discrete` mode, breakpoints are snapped to
/// integers: the recombinable mass between integer positions counts the
/// rate-weighted links between them, and inverting a mass floors to an
/// integer.
///
/// # Examples
///
/// ```
/// let m = coalsim::RecombinationMap::uniform(10.0, 0.1, false).unwrap();
/// assert_eq!(m.position_to_mass(5.0), 0.5);
/// assert_eq!(m.mass_to_position(0.5), 5.0);
///
/// let d = coalsim::RecombinationMap::uniform(10.0, 1.0, true).unwrap();
/// assert_eq!(d.mass_to_position(2.5), 2.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RecombinationMap {
    map: IntervalMap,
    discrete: bool,
}

impl RecombinationMap {
    /// Build a recombination map from an [`IntervalMap`] of rates.
    ///
    /// # Errors
    ///
    /// [`SimError::Input`] if `discrete` is set and any map position is
    /// not an integer.
    pub fn new(map: IntervalMap, discrete: bool) -> Result<Self, SimError> {
        if discrete {
            for p in map.positions() {
                if p.fract() != 0.0 {
                    return Err(input_error!(
                        "recombination map",
                        "positions must be integers in discrete mode"
                    ));
                }
            }
        }
        Ok(Self { map, discrete })
    }

    /// A single-rate map over `[0, sequence_length)`.
    pub fn uniform(sequence_length: f64, rate: f64, discrete: bool) -> Result<Self, SimError> {
        Self::new(IntervalMap::uniform(sequence_length, rate)?, discrete)
    }

    pub fn sequence_length(&self) -> f64 {
        self.map.sequence_length()
    }

    pub fn discrete(&self) -> bool {
        self.discrete
    }

    /// Total recombinable mass of the whole sequence.
    pub fn total_mass(&self) -> f64 {
        self.map.total_mass()
    }

    /// Genetic coordinate of physical position `x`.
    pub fn position_to_mass(&self, x: f64) -> f64 {
        if self.discrete {
            self.map.mass_to(x.floor())
        } else {
            self.map.mass_to(x)
        }
    }

    /// Physical position at genetic coordinate `mass`; floors to an
    /// integer in discrete mode.
    pub fn mass_to_position(&self, mass: f64) -> f64 {
        let x = self.map.mass_to_position(mass);
        if self.discrete {
            x.floor()
        } else {
            x
        }
    }

    /// Genetic distance between physical positions `a <= b`.
    pub fn mass_between(&self, a: f64, b: f64) -> f64 {
        self.position_to_mass(b) - self.position_to_mass(a)
    }

    /// Genetic distance between `a` and `b` excluding a breakpoint at `a`
    /// itself.  This is the recombinable mass of a chain's head segment:
    /// a breakpoint at the head's own left edge would detach nothing.
    pub fn mass_between_left_exclusive(&self, a: f64, b: f64) -> f64 {
        if self.discrete {
            self.mass_between(a + 1.0, b)
        } else {
            self.mass_between(a, b)
        }
    }

    /// The physical position whose genetic coordinate is
    /// `position_to_mass(pos) + delta`.
    pub fn shift_by_mass(&self, pos: f64, delta: f64) -> f64 {
        self.mass_to_position(self.position_to_mass(pos) + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_round_trip() {
        let m = RecombinationMap::new(
            IntervalMap::new(vec![0.0, 4.0, 10.0], vec![0.5, 2.0]).unwrap(),
            false,
        )
        .unwrap();
        assert_eq!(m.position_to_mass(4.0), 2.0);
        assert_eq!(m.position_to_mass(7.0), 8.0);
        assert_eq!(m.mass_to_position(8.0), 7.0);
        assert_eq!(m.mass_between(4.0, 7.0), 6.0);
        assert_eq!(m.total_mass(), 14.0);
    }

    #[test]
    fn test_discrete_requires_integer_positions() {
        let map = IntervalMap::new(vec![0.0, 4.5, 10.0], vec![1.0, 1.0]).unwrap();
        assert!(RecombinationMap::new(map.clone(), true).is_err());
        assert!(RecombinationMap::new(map, false).is_ok());
    }

    #[test]
    fn test_discrete_link_counting() {
        let m = RecombinationMap::uniform(10.0, 1.0, true).unwrap();
        // A head segment [2, 8) has candidate breakpoints {3, ..., 7}.
        assert_eq!(m.mass_between_left_exclusive(2.0, 8.0), 5.0);
        // A trailing segment with the previous segment ending at 2 adds
        // the gap links as well.
        assert_eq!(m.mass_between(2.0, 8.0), 6.0);
    }

    #[test]
    fn test_discrete_inversion_floors() {
        let m = RecombinationMap::uniform(10.0, 1.0, true).unwrap();
        assert_eq!(m.mass_to_position(2.5), 2.0);
        assert_eq!(m.shift_by_mass(8.0, -0.25), 7.0);
    }

    #[test]
    fn test_shift_by_mass_continuous() {
        let m = RecombinationMap::uniform(10.0, 2.0, false).unwrap();
        assert_eq!(m.shift_by_mass(8.0, -2.0), 7.0);
    }
}
