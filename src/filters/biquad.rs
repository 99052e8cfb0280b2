//! A biquad section: coefficients, wet/dry mix and delay state.

use crate::core::filter::{FilterCoefficients, FilterState};
use crate::core::reference;

/// One biquad section.
///
/// The mixed output is `y * wet + x * dry`, where `y` is the raw recurrence output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub coeffs: FilterCoefficients,
    /// Gain of the filtered signal (c0).
    pub wet: f64,
    /// Gain of the unfiltered signal (d0).
    pub dry: f64,
    pub state: FilterState,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::init()
    }
}

impl Biquad {
    /// Zero coefficients, full wet, no dry, empty delay line.
    pub fn init() -> Self {
        Self {
            coeffs: FilterCoefficients::default(),
            wet: 1.0,
            dry: 0.0,
            state: FilterState::default(),
        }
    }

    pub fn with_coefficients(coeffs: FilterCoefficients) -> Self {
        Self {
            coeffs,
            ..Self::init()
        }
    }

    pub fn flush_delays(&mut self) {
        self.state.clear();
    }

    /// Whether the mix passes the filtered signal through unchanged.
    pub fn is_fully_wet(&self) -> bool {
        self.wet == 1.0 && self.dry == 0.0
    }

    pub fn mix(&self, x: f64, y: f64) -> f64 {
        y * self.wet + x * self.dry
    }

    /// Raw recurrence output for `x` on the reference kernel.
    pub fn process(&mut self, x: f64) -> f64 {
        reference::process(&self.coeffs, &mut self.state, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_silent() {
        let mut bq = Biquad::init();
        assert!(bq.is_fully_wet());
        assert_eq!(bq.process(1.0), 0.0);
        assert_eq!(bq.state.x1, 1.0);
        bq.flush_delays();
        assert_eq!(bq.state, FilterState::default());
    }

    #[test]
    fn test_mix() {
        let bq = Biquad {
            wet: 0.5,
            dry: 0.25,
            ..Biquad::init()
        };
        assert_eq!(bq.mix(2.0, 4.0), 2.5);
    }
}
