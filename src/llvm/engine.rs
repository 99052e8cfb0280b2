// The JIT execution engine wrapper. compile() prepares an emitted module for the host
// (target triple and data layout), runs LLVM's O3 pipeline over it against the native
// target machine and hands it to an execution engine created at the aggressive
// optimisation level, which generates and loads machine code for every function in the
// module. Entry points are then looked up by symbol name and returned as typed function
// handles that stay valid for as long as the engine lives.

//! JIT execution engine.

use super::target::native_target_machine;
use crate::core::error::{JitError, JitResult};
use inkwell::execution_engine::{ExecutionEngine, JitFunction, UnsafeFunctionPointer};
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::OptimizationLevel;

/// Optimisation pipeline run over every module before code generation.
pub const OPT_PIPELINE: &str = "default<O3>";

/// A compiled module and the engine holding its machine code.
pub struct NativeEngine<'ctx> {
    engine: ExecutionEngine<'ctx>,
    module: Module<'ctx>,
}

impl<'ctx> NativeEngine<'ctx> {
    /// Optimise `module` for the host and compile it to native code.
    pub fn compile(module: Module<'ctx>) -> JitResult<Self> {
        let machine = native_target_machine()?;
        module.set_triple(&machine.get_triple());
        module.set_data_layout(&machine.get_target_data().get_data_layout());

        module
            .run_passes(OPT_PIPELINE, &machine, PassBuilderOptions::create())
            .map_err(|e| JitError::Compile {
                reason: format!("{} failed: {}", OPT_PIPELINE, e),
            })?;

        let engine = module
            .create_jit_execution_engine(OptimizationLevel::Aggressive)
            .map_err(|e| JitError::Compile {
                reason: e.to_string(),
            })?;
        log::debug!(
            "compiled module '{}' for {}",
            module.get_name().to_string_lossy(),
            machine.get_triple().as_str().to_string_lossy()
        );
        Ok(Self { engine, module })
    }

    /// Look up the entry point `name`.
    ///
    /// # Safety
    ///
    /// `F` must match the native signature of the compiled function.
    pub unsafe fn resolve<F: UnsafeFunctionPointer>(
        &self,
        name: &str,
    ) -> JitResult<JitFunction<'ctx, F>> {
        self.engine.get_function::<F>(name).map_err(|e| {
            log::debug!("symbol lookup for {} failed: {}", name, e);
            JitError::MissingSymbol {
                name: name.to_string(),
            }
        })
    }

    /// The optimised module.
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::JitConfig;
    use crate::ir::{build_biquad_program, SCALAR_ENTRY};
    use crate::llvm::{emit_program, initialize_native_target};
    use crate::passes::lower_program;
    use inkwell::context::Context;

    type Scalar = unsafe extern "C" fn(f64, f64, f64, f64, f64, f64, f64, f64, f64, f64) -> f64;

    #[test]
    fn test_compiles_and_resolves_entry_points() {
        if initialize_native_target().is_err() {
            return;
        }
        let mut program = build_biquad_program().unwrap();
        lower_program(&mut program, &JitConfig::default()).unwrap();
        let context = Context::create();
        let engine = NativeEngine::compile(emit_program(&context, &program).unwrap()).unwrap();

        let scalar = unsafe { engine.resolve::<Scalar>(SCALAR_ENTRY) }.unwrap();
        let y = unsafe { scalar.call(1.0, 0.5, 0.25, 0.1, 0.05, 0.5, 0.0, 0.0, 0.0, 0.0) };
        assert_eq!(y, 0.5);

        let missing = unsafe { engine.resolve::<Scalar>("biquad_missing") };
        assert!(matches!(missing, Err(JitError::MissingSymbol { .. })));
    }
}
