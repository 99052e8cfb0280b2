// Process-wide native target setup. LLVM's target registries, code emitters and assembly
// printers are initialised exactly once, lazily, the first time a kernel session or the
// availability probe needs them, and are never torn down. The outcome is cached, so a host
// without a usable native target reports the same failure on every call without retrying.

//! Native target initialisation.

use crate::core::error::{JitError, JitResult};
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;
use std::sync::OnceLock;

static NATIVE_TARGET: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the host target for JIT compilation. Idempotent.
pub fn initialize_native_target() -> JitResult<()> {
    let outcome = NATIVE_TARGET.get_or_init(|| {
        let result = Target::initialize_native(&InitializationConfig::default());
        match &result {
            Ok(()) => {
                let (major, minor, patch) = backend_version();
                log::debug!(
                    "initialised native target {} (LLVM {}.{}.{})",
                    TargetMachine::get_default_triple().as_str().to_string_lossy(),
                    major,
                    minor,
                    patch
                );
            }
            Err(reason) => log::warn!("native target initialisation failed: {}", reason),
        }
        result
    });
    outcome.clone().map_err(|reason| JitError::Unavailable { reason })
}

/// Target machine for the host CPU, used to optimise modules before JIT compilation.
pub fn native_target_machine() -> JitResult<TargetMachine> {
    initialize_native_target()?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|e| JitError::Unavailable {
        reason: format!("no target for {}: {}", triple.as_str().to_string_lossy(), e),
    })?;
    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();
    target
        .create_target_machine(
            &triple,
            &cpu.to_string(),
            &features.to_string(),
            OptimizationLevel::Aggressive,
            RelocMode::Default,
            CodeModel::JITDefault,
        )
        .ok_or_else(|| JitError::Unavailable {
            reason: format!(
                "cannot create a target machine for {} ({})",
                triple.as_str().to_string_lossy(),
                cpu
            ),
        })
}

/// Version of the linked LLVM library.
pub fn backend_version() -> (u32, u32, u32) {
    let (mut major, mut minor, mut patch) = (0, 0, 0);
    unsafe { llvm_sys::core::LLVMGetVersion(&mut major, &mut minor, &mut patch) };
    (major, minor, patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialisation_is_idempotent() {
        let first = initialize_native_target().is_ok();
        let second = initialize_native_target().is_ok();
        assert_eq!(first, second);
    }

    #[test]
    fn test_backend_version_is_llvm_19() {
        assert_eq!(backend_version().0, 19);
    }
}
