//! Tests for compiled kernel sessions.
//!
//! Tests that need native code return early when the availability probe reports the
//! backend as unavailable.

use biquad_jit::core::reference;
use biquad_jit::kernel::{probe, BiquadKernel, KernelSession};
use biquad_jit::{FilterCoefficients, FilterState, JitConfig, JitError};

const SCENARIO: FilterCoefficients = FilterCoefficients::new(1.0, 0.5, 0.25, 0.1, 0.05);
const TOLERANCE: f64 = 1e-10;

macro_rules! require_jit {
    () => {
        let _ = env_logger::builder().is_test(true).try_init();
        let availability = probe();
        if !availability.is_available() {
            eprintln!("skipping: JIT backend {}", availability);
            return;
        }
    };
}

fn sine(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 20.0).sin() * 0.5)
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= TOLERANCE,
            "sample {}: got {}, expected {}",
            i,
            a,
            e
        );
    }
}

fn assert_state_close(actual: &FilterState, expected: &FilterState) {
    assert_close(&actual.to_array(), &expected.to_array());
}

#[test]
fn test_single_sample_scenario() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();

    let mut jit_state = FilterState::default();
    let mut ref_state = FilterState::default();
    let y = session.process_one(&SCENARIO, &mut jit_state, 0.5);
    let expected = reference::process(&SCENARIO, &mut ref_state, 0.5);
    assert_eq!(y, 0.5);
    assert_eq!(expected, 0.5);
    assert_eq!(jit_state, ref_state);

    let mut buf_state = FilterState::default();
    let mut output = [0.0];
    session
        .process_buffer(&SCENARIO, &mut buf_state, &[0.5], &mut output)
        .unwrap();
    assert_eq!(output[0], 0.5);
    assert_eq!(buf_state, ref_state);
}

#[test]
fn test_process_one_matches_reference() {
    require_jit!();
    let coeffs = FilterCoefficients::new(0.8, -0.4, 0.2, -0.3, 0.15);
    let session = KernelSession::create(&coeffs).unwrap();

    let mut jit_state = FilterState::default();
    let mut ref_state = FilterState::default();
    for (i, x) in sine(257).into_iter().enumerate() {
        let y = session.process_one(&coeffs, &mut jit_state, x);
        let expected = reference::process(&coeffs, &mut ref_state, x);
        assert!((y - expected).abs() <= TOLERANCE, "sample {}", i);
        assert_state_close(&jit_state, &ref_state);
    }
}

#[test]
fn test_buffer_matches_sequential_process_one() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    assert!(session.has_buffer_kernel());
    let input = sine(100);

    let mut scalar_state = FilterState::default();
    let scalar: Vec<f64> = input
        .iter()
        .map(|&x| session.process_one(&SCENARIO, &mut scalar_state, x))
        .collect();

    let mut buffer_state = FilterState::default();
    let mut buffer = vec![0.0; input.len()];
    session
        .process_buffer(&SCENARIO, &mut buffer_state, &input, &mut buffer)
        .unwrap();

    assert_close(&buffer, &scalar);
    assert_state_close(&buffer_state, &scalar_state);
}

#[test]
fn test_buffer_handles_every_remainder() {
    require_jit!();
    let coeffs = FilterCoefficients::new(0.3, 0.2, 0.1, -0.5, 0.25);
    let session = KernelSession::create(&coeffs).unwrap();

    for len in 0..=13 {
        let input = sine(len);
        let mut state = FilterState::new(0.1, 0.2, -0.1, 0.05);
        let mut output = vec![0.0; len];
        session
            .process_buffer(&coeffs, &mut state, &input, &mut output)
            .unwrap();

        let mut ref_state = FilterState::new(0.1, 0.2, -0.1, 0.05);
        let mut expected = vec![0.0; len];
        reference::process_buffer(&coeffs, &mut ref_state, &input, &mut expected);
        assert_close(&output, &expected);
        assert_state_close(&state, &ref_state);
    }
}

#[test]
fn test_buffer_state_carries_across_calls() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    let input = sine(64);

    let mut state = FilterState::default();
    let mut output = vec![0.0; 64];
    let (head, tail) = input.split_at(27);
    let (out_head, out_tail) = output.split_at_mut(27);
    session.process_buffer(&SCENARIO, &mut state, head, out_head).unwrap();
    session.process_buffer(&SCENARIO, &mut state, tail, out_tail).unwrap();

    let mut ref_state = FilterState::default();
    let mut expected = vec![0.0; 64];
    reference::process_buffer(&SCENARIO, &mut ref_state, &input, &mut expected);
    assert_close(&output, &expected);
}

#[test]
fn test_in_place_matches_out_of_place() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    let input = sine(37);

    let mut state = FilterState::default();
    let mut output = vec![0.0; input.len()];
    session
        .process_buffer(&SCENARIO, &mut state, &input, &mut output)
        .unwrap();

    let mut in_place_state = FilterState::default();
    let mut data = input.clone();
    session
        .process_in_place(&SCENARIO, &mut in_place_state, &mut data)
        .unwrap();
    assert_eq!(data, output);
    assert_eq!(in_place_state, state);
}

#[test]
fn test_fallback_without_buffer_entry_point() {
    require_jit!();
    let config = JitConfig::default().with_buffer_entry(false);
    let fallback = KernelSession::create_with_config(&SCENARIO, &config).unwrap();
    let resolved = KernelSession::create(&SCENARIO).unwrap();
    assert!(!fallback.has_buffer_kernel());
    assert!(resolved.has_buffer_kernel());

    let input = sine(100);
    let mut fallback_state = FilterState::default();
    let mut fallback_out = vec![0.0; input.len()];
    fallback
        .process_buffer(&SCENARIO, &mut fallback_state, &input, &mut fallback_out)
        .unwrap();

    let mut resolved_state = FilterState::default();
    let mut resolved_out = vec![0.0; input.len()];
    resolved
        .process_buffer(&SCENARIO, &mut resolved_state, &input, &mut resolved_out)
        .unwrap();

    assert_eq!(fallback_out, resolved_out);
    assert_eq!(fallback_state, resolved_state);
}

#[test]
fn test_repeated_create_destroy_cycles() {
    require_jit!();
    let mut outputs = Vec::new();
    for _ in 0..3 {
        let session = KernelSession::create(&SCENARIO).unwrap();
        let mut state = FilterState::default();
        let mut output = vec![0.0; 16];
        session
            .process_buffer(&SCENARIO, &mut state, &sine(16), &mut output)
            .unwrap();
        outputs.push(output);
        session.destroy();
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[test]
fn test_probe_is_idempotent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let first = probe();
    for _ in 0..5 {
        assert_eq!(probe(), first);
    }
}

#[test]
fn test_short_output_is_rejected_without_side_effects() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    let mut state = FilterState::new(0.1, 0.2, 0.3, 0.4);
    let mut output = [7.0; 3];
    let err = session
        .process_buffer(&SCENARIO, &mut state, &[1.0; 4], &mut output)
        .unwrap_err();
    assert!(matches!(err, JitError::InvalidArgument { .. }));
    assert_eq!(state, FilterState::new(0.1, 0.2, 0.3, 0.4));
    assert_eq!(output, [7.0; 3]);
}

#[test]
fn test_empty_buffer_is_a_no_op() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    let mut state = FilterState::new(0.1, 0.2, 0.3, 0.4);
    session
        .process_buffer(&SCENARIO, &mut state, &[], &mut [])
        .unwrap();
    session.process_in_place(&SCENARIO, &mut state, &mut []).unwrap();
    assert_eq!(state, FilterState::new(0.1, 0.2, 0.3, 0.4));
}

#[test]
fn test_disabled_config_creates_no_session() {
    let config = JitConfig::default().with_enabled(false);
    let err = KernelSession::create_with_config(&SCENARIO, &config).unwrap_err();
    assert!(matches!(err, JitError::Disabled));
    assert!(!BiquadKernel::select(&SCENARIO, &config).is_jit());
}

#[test]
fn test_sessions_on_separate_threads() {
    require_jit!();
    let handles: Vec<_> = [0.25, -0.25]
        .into_iter()
        .map(|scale| {
            std::thread::spawn(move || {
                let session = KernelSession::create(&SCENARIO).unwrap();
                let input: Vec<f64> = sine(500).iter().map(|x| x * scale).collect();
                let mut state = FilterState::default();
                let mut output = vec![0.0; input.len()];
                session
                    .process_buffer(&SCENARIO, &mut state, &input, &mut output)
                    .unwrap();

                let mut ref_state = FilterState::default();
                let mut expected = vec![0.0; input.len()];
                reference::process_buffer(&SCENARIO, &mut ref_state, &input, &mut expected);
                (output, expected)
            })
        })
        .collect();
    for handle in handles {
        let (output, expected) = handle.join().unwrap();
        assert_close(&output, &expected);
    }
}

#[test]
fn test_buffer_path_flushes_only_final_history() {
    require_jit!();
    // Identity filter: every output equals its input.
    let coeffs = FilterCoefficients::identity();
    let session = KernelSession::create(&coeffs).unwrap();
    let tiny = 1e-39;

    let mut state = FilterState::default();
    let mut output = [0.0; 2];
    session
        .process_buffer(&coeffs, &mut state, &[tiny, tiny], &mut output)
        .unwrap();
    // Interior samples are not flushed; the y-history read back is.
    assert_eq!(output, [tiny, tiny]);
    assert_eq!(state.y1, 0.0);
    assert_eq!(state.y2, 0.0);
    assert_eq!(state.x1, tiny);

    let mut scalar_state = FilterState::default();
    assert_eq!(session.process_one(&coeffs, &mut scalar_state, tiny), 0.0);
    assert_eq!(scalar_state.y1, 0.0);
}

#[test]
fn test_llvm_ir_has_both_entry_points() {
    require_jit!();
    let session = KernelSession::create(&SCENARIO).unwrap();
    let ir = session.llvm_ir();
    assert!(ir.contains("biquad_process"));
    assert!(ir.contains("biquad_process_buffer"));
    assert!(session.program().function("biquad_process_buffer").is_some());
}
