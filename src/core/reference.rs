// The portable reference kernel: a plain interpreter of the biquad difference equation
// y = a0*x + a1*x[n-1] + a2*x[n-2] - b1*y[n-1] - b2*y[n-2]. It is the correctness oracle
// for the compiled kernels and the fallback whenever the JIT backend is unavailable or a
// session could not be created. Outputs whose magnitude lies below the smallest normal
// single-precision value are flushed to exactly zero before the delay line is shifted; the
// compiled scalar path reproduces this flush on the host side.

//! Reference biquad kernel.

use super::filter::{FilterCoefficients, FilterState};

/// Magnitude below which outputs are flushed to zero (smallest normal `f32`).
pub const DENORMAL_THRESHOLD: f64 = 1.175494351e-38;

/// Flush `y` to exactly `0.0` when `0 < |y| < DENORMAL_THRESHOLD`.
#[inline]
pub fn flush_denormal(y: f64) -> f64 {
    if (y > 0.0 && y < DENORMAL_THRESHOLD) || (y < 0.0 && y > -DENORMAL_THRESHOLD) {
        0.0
    } else {
        y
    }
}

/// Evaluate the recurrence without touching the state.
///
/// The evaluation order is fixed; the generated code uses the same order so both
/// produce bit-identical results.
#[inline]
pub fn evaluate(coeffs: &FilterCoefficients, state: &FilterState, x: f64) -> f64 {
    coeffs.a0 * x + coeffs.a1 * state.x1 + coeffs.a2 * state.x2
        - coeffs.b1 * state.y1
        - coeffs.b2 * state.y2
}

/// Process one sample: evaluate, flush, shift the delay line.
#[inline]
pub fn process(coeffs: &FilterCoefficients, state: &mut FilterState, x: f64) -> f64 {
    let y = flush_denormal(evaluate(coeffs, state, x));
    state.push(x, y);
    y
}

/// Process `input` into `output` sample by sample.
///
/// Processes `min(input.len(), output.len())` samples.
pub fn process_buffer(
    coeffs: &FilterCoefficients,
    state: &mut FilterState,
    input: &[f64],
    output: &mut [f64],
) {
    for (x, y) in input.iter().zip(output.iter_mut()) {
        *y = process(coeffs, state, *x);
    }
}

/// Process `data` in place.
pub fn process_in_place(coeffs: &FilterCoefficients, state: &mut FilterState, data: &mut [f64]) {
    for sample in data.iter_mut() {
        *sample = process(coeffs, state, *sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COEFFS: FilterCoefficients = FilterCoefficients::new(1.0, 0.5, 0.25, 0.1, 0.05);

    #[test]
    fn test_first_sample_from_zero_state() {
        let mut state = FilterState::default();
        let y = process(&COEFFS, &mut state, 0.5);
        assert_eq!(y, 0.5);
        assert_eq!(state, FilterState::new(0.5, 0.0, 0.5, 0.0));
    }

    #[test]
    fn test_delay_line_shift() {
        let mut state = FilterState::default();
        let y0 = process(&COEFFS, &mut state, 0.5);
        let y1 = process(&COEFFS, &mut state, -0.25);
        // 1*(-0.25) + 0.5*0.5 + 0.25*0 - 0.1*0.5 - 0.05*0
        assert!((y1 - (-0.05)).abs() < 1e-15);
        assert_eq!(state.x1, -0.25);
        assert_eq!(state.x2, 0.5);
        assert_eq!(state.y1, y1);
        assert_eq!(state.y2, y0);
    }

    #[test]
    fn test_flush_both_signs() {
        assert_eq!(flush_denormal(1e-39), 0.0);
        assert_eq!(flush_denormal(-1e-39), 0.0);
        assert_eq!(flush_denormal(1e-30), 1e-30);
        assert_eq!(flush_denormal(-1e-30), -1e-30);
        assert_eq!(flush_denormal(0.0), 0.0);
        assert!(flush_denormal(f64::NAN).is_nan());
    }

    #[test]
    fn test_flush_happens_before_shift() {
        let mut state = FilterState::default();
        let y = process(&FilterCoefficients::identity(), &mut state, 1e-39);
        assert_eq!(y, 0.0);
        assert_eq!(state.y1, 0.0);
        // The input history keeps the raw sample.
        assert_eq!(state.x1, 1e-39);
    }

    #[test]
    fn test_buffer_matches_per_sample() {
        let input: Vec<f64> = (0..32).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut output = vec![0.0; input.len()];
        let mut buffer_state = FilterState::default();
        process_buffer(&COEFFS, &mut buffer_state, &input, &mut output);

        let mut state = FilterState::default();
        for (x, y) in input.iter().zip(&output) {
            assert_eq!(process(&COEFFS, &mut state, *x), *y);
        }
        assert_eq!(state, buffer_state);

        let mut in_place = input.clone();
        let mut in_place_state = FilterState::default();
        process_in_place(&COEFFS, &mut in_place_state, &mut in_place);
        assert_eq!(in_place, output);
    }
}
