// The acceleration strategy a filter channel holds. select() consults the configuration and
// the availability probe, then tries to create a kernel session; if any of that fails the
// channel runs on the reference kernel instead. Both variants expose the same numeric
// contract, so filters never need to know which one they got.

//! Kernel selection.

use super::availability::probe;
use super::session::KernelSession;
use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::core::filter::{FilterCoefficients, FilterState};
use crate::core::reference;

/// Per-channel biquad implementation.
#[derive(Debug)]
pub enum BiquadKernel {
    Jit(KernelSession),
    Reference,
}

impl BiquadKernel {
    /// JIT kernel if one can be created, the reference kernel otherwise.
    pub fn select(coeffs: &FilterCoefficients, config: &JitConfig) -> Self {
        if !config.enabled {
            log::debug!("JIT disabled, using the reference kernel");
            return BiquadKernel::Reference;
        }
        let availability = probe();
        if !availability.is_available() {
            log::warn!("JIT backend {}, using the reference kernel", availability);
            return BiquadKernel::Reference;
        }
        match KernelSession::create_with_config(coeffs, config) {
            Ok(session) => BiquadKernel::Jit(session),
            Err(err) => {
                log::warn!("kernel session creation failed ({}), using the reference kernel", err);
                BiquadKernel::Reference
            }
        }
    }

    pub fn is_jit(&self) -> bool {
        matches!(self, BiquadKernel::Jit(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            BiquadKernel::Jit(session) if session.has_buffer_kernel() => "jit",
            BiquadKernel::Jit(_) => "jit (per-sample)",
            BiquadKernel::Reference => "reference",
        }
    }

    pub fn process_one(&self, coeffs: &FilterCoefficients, state: &mut FilterState, x: f64) -> f64 {
        match self {
            BiquadKernel::Jit(session) => session.process_one(coeffs, state, x),
            BiquadKernel::Reference => reference::process(coeffs, state, x),
        }
    }

    pub fn process_buffer(
        &self,
        coeffs: &FilterCoefficients,
        state: &mut FilterState,
        input: &[f64],
        output: &mut [f64],
    ) -> JitResult<()> {
        match self {
            BiquadKernel::Jit(session) => session.process_buffer(coeffs, state, input, output),
            BiquadKernel::Reference => {
                if output.len() < input.len() {
                    return Err(JitError::InvalidArgument {
                        reason: format!(
                            "output holds {} samples, input has {}",
                            output.len(),
                            input.len()
                        ),
                    });
                }
                reference::process_buffer(coeffs, state, input, output);
                Ok(())
            }
        }
    }

    pub fn process_in_place(
        &self,
        coeffs: &FilterCoefficients,
        state: &mut FilterState,
        data: &mut [f64],
    ) -> JitResult<()> {
        match self {
            BiquadKernel::Jit(session) => session.process_in_place(coeffs, state, data),
            BiquadKernel::Reference => {
                reference::process_in_place(coeffs, state, data);
                Ok(())
            }
        }
    }
}
