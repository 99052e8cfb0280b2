// Coefficient designs of the filter tool, all derived through the bilinear transform with
// frequency prewarping:
//
// - high-pass: Butterworth, C = tan(pi f / fs)
// - low-pass: Butterworth, C = 1 / tan(pi f / fs)
// - parametric: constant-Q peaking EQ with K = tan(pi f / fs) and V0 = 10^(gain / 20),
//   using the boost form for gain >= 0 and the inverted (cut) form below.
//
// Every design is full wet, no dry.

//! Filter coefficient designs.

use crate::core::error::{JitError, JitResult};
use crate::core::filter::FilterCoefficients;
use std::f64::consts::{PI, SQRT_2};

/// A filter design and its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDesign {
    HighPass { frequency: f64 },
    LowPass { frequency: f64 },
    Parametric { frequency: f64, gain_db: f64, q: f64 },
}

impl FilterDesign {
    pub fn frequency(&self) -> f64 {
        match *self {
            FilterDesign::HighPass { frequency }
            | FilterDesign::LowPass { frequency }
            | FilterDesign::Parametric { frequency, .. } => frequency,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterDesign::HighPass { .. } => "high-pass",
            FilterDesign::LowPass { .. } => "low-pass",
            FilterDesign::Parametric { .. } => "parametric",
        }
    }

    /// Coefficients for `sample_rate`.
    pub fn coefficients(&self, sample_rate: f64) -> JitResult<FilterCoefficients> {
        let frequency = self.frequency();
        if !(sample_rate > 0.0) || !(frequency > 0.0 && frequency < sample_rate / 2.0) {
            return Err(JitError::InvalidArgument {
                reason: format!(
                    "{} frequency {} Hz is outside (0, {}) for a sample rate of {} Hz",
                    self.name(),
                    frequency,
                    sample_rate / 2.0,
                    sample_rate
                ),
            });
        }
        let coeffs = match *self {
            FilterDesign::HighPass { frequency } => high_pass(sample_rate, frequency),
            FilterDesign::LowPass { frequency } => low_pass(sample_rate, frequency),
            FilterDesign::Parametric { frequency, gain_db, q } => {
                if !(q > 0.0) {
                    return Err(JitError::InvalidArgument {
                        reason: format!("parametric Q must be positive, got {}", q),
                    });
                }
                parametric(sample_rate, frequency, gain_db, q)
            }
        };
        log::debug!("{} coefficients at {} Hz: {:?}", self.name(), sample_rate, coeffs);
        Ok(coeffs)
    }
}

fn high_pass(sample_rate: f64, frequency: f64) -> FilterCoefficients {
    let c = (PI * frequency / sample_rate).tan();
    let c2 = c * c;
    let a0 = 1.0 / (1.0 + SQRT_2 * c + c2);
    FilterCoefficients::new(
        a0,
        -2.0 * a0,
        a0,
        2.0 * a0 * (c2 - 1.0),
        a0 * (1.0 - SQRT_2 * c + c2),
    )
}

fn low_pass(sample_rate: f64, frequency: f64) -> FilterCoefficients {
    let c = 1.0 / (PI * frequency / sample_rate).tan();
    let c2 = c * c;
    let a0 = 1.0 / (1.0 + SQRT_2 * c + c2);
    FilterCoefficients::new(
        a0,
        2.0 * a0,
        a0,
        2.0 * a0 * (1.0 - c2),
        a0 * (1.0 - SQRT_2 * c + c2),
    )
}

fn parametric(sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> FilterCoefficients {
    let k = (PI * frequency / sample_rate).tan();
    let v0 = 10f64.powf(gain_db / 20.0);
    let k2 = k * k;

    let d0 = 1.0 + (1.0 / q) * k + k2;
    let e0 = 1.0 + (1.0 / (v0 * q)) * k + k2;
    let a = 1.0 + (v0 / q) * k + k2;
    let b = 2.0 * (k2 - 1.0);
    let g = 1.0 - (v0 / q) * k + k2;
    let d = 1.0 - (1.0 / q) * k + k2;
    let e = 1.0 - (1.0 / (v0 * q)) * k + k2;

    if gain_db >= 0.0 {
        FilterCoefficients::new(a / d0, b / d0, g / d0, b / d0, d / d0)
    } else {
        FilterCoefficients::new(d0 / e0, b / e0, d / e0, b / e0, e / e0)
    }
}
