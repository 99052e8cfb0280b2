//! Tests for the filter designs and the stereo filter.
//!
//! Filters created with the default configuration use the JIT kernels when the backend
//! is available and the reference kernel otherwise; both must agree with a filter pinned
//! to the reference kernel.

use biquad_jit::filters::FilterChannel;
use biquad_jit::{Biquad, Channel, FilterCoefficients, FilterDesign, JitConfig, StereoFilter};

const SAMPLE_RATE: f64 = 48_000.0;
const TOLERANCE: f64 = 1e-10;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn reference_config() -> JitConfig {
    JitConfig::default().with_enabled(false)
}

fn dc_gain(c: &FilterCoefficients) -> f64 {
    (c.a0 + c.a1 + c.a2) / (1.0 + c.b1 + c.b2)
}

fn interleaved(frames: usize, channels: usize) -> Vec<f64> {
    (0..frames * channels)
        .map(|i| {
            let frame = (i / channels) as f64;
            let slot = (i % channels) as f64;
            (frame * 0.31 + slot).sin() * 0.5
        })
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= TOLERANCE, "sample {}: {} vs {}", i, a, e);
    }
}

#[test]
fn test_high_pass_blocks_dc() {
    let c = FilterDesign::HighPass { frequency: 200.0 }
        .coefficients(SAMPLE_RATE)
        .unwrap();
    assert_eq!(c.a1, -2.0 * c.a0);
    assert_eq!(c.a2, c.a0);
    assert!(dc_gain(&c).abs() < 1e-12);
}

#[test]
fn test_low_pass_passes_dc() {
    let c = FilterDesign::LowPass { frequency: 2_000.0 }
        .coefficients(SAMPLE_RATE)
        .unwrap();
    assert_eq!(c.a1, 2.0 * c.a0);
    assert!((dc_gain(&c) - 1.0).abs() < 1e-9);
}

#[test]
fn test_flat_parametric_is_identity() {
    let c = FilterDesign::Parametric {
        frequency: 1_000.0,
        gain_db: 0.0,
        q: 0.7,
    }
    .coefficients(SAMPLE_RATE)
    .unwrap();
    // With unit gain the numerator equals the denominator.
    assert!((c.a0 - 1.0).abs() < 1e-12);
    assert!((c.a1 - c.b1).abs() < 1e-12);
    assert!((c.a2 - c.b2).abs() < 1e-12);

    let mut biquad = Biquad::with_coefficients(c);
    for i in 0..64 {
        let x = (i as f64 * 0.2).sin();
        assert!((biquad.process(x) - x).abs() < 1e-9);
    }
}

#[test]
fn test_invalid_designs_are_rejected() {
    assert!(FilterDesign::HighPass { frequency: 0.0 }
        .coefficients(SAMPLE_RATE)
        .is_err());
    assert!(FilterDesign::LowPass { frequency: 1_000.0 }
        .coefficients(0.0)
        .is_err());
    assert!(FilterDesign::Parametric {
        frequency: 1_000.0,
        gain_db: 3.0,
        q: 0.0
    }
    .coefficients(SAMPLE_RATE)
    .is_err());
}

#[test]
fn test_fresh_biquad_is_silent() {
    let mut biquad = Biquad::default();
    assert_eq!(biquad.coeffs, FilterCoefficients::default());
    assert!(biquad.is_fully_wet());
    assert_eq!(biquad.process(0.75), 0.0);
}

#[test]
fn test_stereo_matches_reference_filter() {
    init_logging();
    let design = FilterDesign::LowPass { frequency: 3_000.0 };
    let mut filter = StereoFilter::new(design, SAMPLE_RATE, &JitConfig::default()).unwrap();
    let mut pinned = StereoFilter::new(design, SAMPLE_RATE, &reference_config()).unwrap();
    assert!(!pinned.channel(Channel::Left).kernel().is_jit());

    // Several blocks so the delay lines carry across calls.
    for _ in 0..3 {
        let mut data = interleaved(101, 2);
        let mut expected = data.clone();
        filter.process_interleaved(&mut data, 2).unwrap();
        pinned.process_interleaved(&mut expected, 2).unwrap();
        assert_close(&data, &expected);
    }
}

#[test]
fn test_stereo_channels_are_independent() {
    let design = FilterDesign::HighPass { frequency: 500.0 };
    let mut filter = StereoFilter::new(design, SAMPLE_RATE, &reference_config()).unwrap();
    let mut data = interleaved(50, 2);
    let left_in: Vec<f64> = data.iter().step_by(2).copied().collect();
    filter.process_interleaved(&mut data, 2).unwrap();

    let mut mono = StereoFilter::new(design, SAMPLE_RATE, &reference_config()).unwrap();
    let mut left = left_in.clone();
    mono.process_interleaved(&mut left, 1).unwrap();
    let left_out: Vec<f64> = data.iter().step_by(2).copied().collect();
    assert_eq!(left_out, left);
}

#[test]
fn test_wide_layout_alternates_channels() {
    init_logging();
    let design = FilterDesign::Parametric {
        frequency: 2_500.0,
        gain_db: -4.0,
        q: 1.5,
    };
    let mut filter = StereoFilter::new(design, SAMPLE_RATE, &JitConfig::default()).unwrap();
    let mut data = interleaved(40, 3);
    let input = data.clone();
    filter.process_interleaved(&mut data, 3).unwrap();

    // Slots 0 and 2 of every frame feed the left section; slot 1 feeds the right.
    let coeffs = design.coefficients(SAMPLE_RATE).unwrap();
    let mut left = Biquad::with_coefficients(coeffs);
    let mut right = Biquad::with_coefficients(coeffs);
    let expected: Vec<f64> = input
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            if (i % 3) % 2 == 0 {
                left.process(x)
            } else {
                right.process(x)
            }
        })
        .collect();
    assert_close(&data, &expected);
}

#[test]
fn test_update_resets_state_and_design() {
    let low = FilterDesign::LowPass { frequency: 1_000.0 };
    let high = FilterDesign::HighPass { frequency: 1_000.0 };
    let mut filter = StereoFilter::new(low, SAMPLE_RATE, &JitConfig::default()).unwrap();
    let mut data = interleaved(64, 2);
    filter.process_interleaved(&mut data, 2).unwrap();

    filter.update(high).unwrap();
    assert_eq!(filter.design(), high);
    assert_eq!(filter.sample_rate(), SAMPLE_RATE);
    let left = filter.channel(Channel::Left);
    assert_eq!(left.biquad.state.to_array(), [0.0; 4]);
    assert_eq!(left.biquad.coeffs, high.coefficients(SAMPLE_RATE).unwrap());

    // After the update the filter behaves like a freshly built high-pass.
    let mut fresh = StereoFilter::new(high, SAMPLE_RATE, &reference_config()).unwrap();
    let mut a = interleaved(32, 2);
    let mut b = a.clone();
    filter.process_interleaved(&mut a, 2).unwrap();
    fresh.process_interleaved(&mut b, 2).unwrap();
    assert_close(&a, &b);
}

#[test]
fn test_rejected_update_keeps_filter() {
    let low = FilterDesign::LowPass { frequency: 1_000.0 };
    let mut filter = StereoFilter::new(low, SAMPLE_RATE, &reference_config()).unwrap();
    assert!(filter
        .update(FilterDesign::HighPass {
            frequency: 40_000.0
        })
        .is_err());
    assert_eq!(filter.design(), low);
}

#[test]
fn test_partial_wet_mix() {
    let coeffs = FilterDesign::LowPass { frequency: 500.0 }
        .coefficients(SAMPLE_RATE)
        .unwrap();
    let mut biquad = Biquad::with_coefficients(coeffs);
    biquad.wet = 0.25;
    biquad.dry = 0.75;
    let mut channel = FilterChannel::new(biquad, &reference_config());

    let mut wet_only = Biquad::with_coefficients(coeffs);
    let mut data: Vec<f64> = (0..32).map(|i| (i as f64 * 0.4).cos()).collect();
    let input = data.clone();
    channel.process(&mut data).unwrap();
    for (i, (&x, &y)) in input.iter().zip(&data).enumerate() {
        let expected = wet_only.process(x) * 0.25 + x * 0.75;
        assert!((y - expected).abs() < 1e-12, "sample {}", i);
    }
}
