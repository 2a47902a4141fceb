//! Piecewise-constant functions over the sequence interval.

use crate::SimError;

/// A piecewise-constant function over `[0, L]`.
///
/// Represented by two sorted arrays: `position` of length `n + 1` with
/// `position[0] == 0` and `position[n] == L`, and `value` of length `n`
/// with `value[i] >= 0` holding the function's value on
/// `[position[i], position[i + 1])`.
///
/// Supports point lookup by binary search and integral queries through a
/// precomputed cumulative-mass array.
///
/// # Examples
///
/// ```
/// let m = coalsim::IntervalMap::new(vec![0.0, 5.0, 10.0], vec![1.0, 3.0]).unwrap();
/// assert_eq!(m.value_at(2.0), 1.0);
/// assert_eq!(m.value_at(5.0), 3.0);
/// assert_eq!(m.mass_between(4.0, 6.0), 4.0);
/// assert_eq!(m.total_mass(), 20.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalMap {
    position: Vec<f64>,
    value: Vec<f64>,
    cumulative: Vec<f64>,
}

impl IntervalMap {
    /// Create a map from `position` (length `n + 1`) and `value`
    /// (length `n`) arrays.
    ///
    /// # Errors
    ///
    /// [`SimError::Input`] if the arrays are malformed: mismatched
    /// lengths, fewer than two positions, `position[0] != 0`,
    /// non-increasing positions, or negative values.
    pub fn new(position: Vec<f64>, value: Vec<f64>) -> Result<Self, SimError> {
        let section = "interval map";
        if position.len() < 2 {
            return Err(input_error!(section, "at least two positions required"));
        }
        if value.len() + 1 != position.len() {
            return Err(input_error!(
                section,
                "expected {} values, got {}",
                position.len() - 1,
                value.len()
            ));
        }
        if position[0] != 0.0 {
            return Err(input_error!(section, "first position must be 0"));
        }
        for w in position.windows(2) {
            if !(w[1] > w[0]) {
                return Err(input_error!(section, "positions must be strictly increasing"));
            }
        }
        if value.iter().any(|v| !(*v >= 0.0)) {
            return Err(input_error!(section, "values must be non-negative"));
        }
        let mut cumulative = Vec::with_capacity(position.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for (i, v) in value.iter().enumerate() {
            total += v * (position[i + 1] - position[i]);
            cumulative.push(total);
        }
        Ok(Self {
            position,
            value,
            cumulative,
        })
    }

    /// A map holding a single value over `[0, sequence_length)`.
    pub fn uniform(sequence_length: f64, value: f64) -> Result<Self, SimError> {
        if !(sequence_length > 0.0) {
            return Err(input_error!(
                "interval map",
                "sequence length must be positive"
            ));
        }
        Self::new(vec![0.0, sequence_length], vec![value])
    }

    /// The right end of the mapped interval.
    pub fn sequence_length(&self) -> f64 {
        *self.position.last().unwrap()
    }

    /// Number of constant pieces.
    pub fn num_intervals(&self) -> usize {
        self.value.len()
    }

    pub fn positions(&self) -> &[f64] {
        &self.position
    }

    pub fn values(&self) -> &[f64] {
        &self.value
    }

    // Index of the piece containing x; x == L maps to the last piece.
    fn interval_index(&self, x: f64) -> usize {
        debug_assert!(x >= 0.0 && x <= self.sequence_length());
        match self
            .position
            .binary_search_by(|p| p.partial_cmp(&x).unwrap())
        {
            Ok(i) => i.min(self.value.len() - 1),
            Err(i) => i - 1,
        }
    }

    /// The function's value at `x`.
    pub fn value_at(&self, x: f64) -> f64 {
        self.value[self.interval_index(x)]
    }

    /// `∫_0^x` of the function.
    pub fn mass_to(&self, x: f64) -> f64 {
        let i = self.interval_index(x);
        self.cumulative[i] + (x - self.position[i]) * self.value[i]
    }

    /// `∫_a^b` of the function.
    pub fn mass_between(&self, a: f64, b: f64) -> f64 {
        debug_assert!(a <= b);
        self.mass_to(b) - self.mass_to(a)
    }

    /// `∫_0^L` of the function.
    pub fn total_mass(&self) -> f64 {
        *self.cumulative.last().unwrap()
    }

    /// Invert the cumulative mass: a position `x` with
    /// `mass_to(x) == mass`.  `mass` must lie in `[0, total_mass()]`.
    /// At piece boundaries (including zero-valued pieces) the rightmost
    /// admissible position is returned.
    pub fn mass_to_position(&self, mass: f64) -> f64 {
        debug_assert!(mass >= 0.0);
        let i = self
            .cumulative
            .partition_point(|c| *c <= mass)
            .saturating_sub(1)
            .min(self.value.len() - 1);
        if self.value[i] == 0.0 {
            self.position[i]
        } else {
            self.position[i] + (mass - self.cumulative[i]) / self.value[i]
        }
    }
}
