// A kernel session owns one compiled biquad program: the LLVM context, the optimised
// module inside its execution engine, the typed handles of the two entry points and the
// lowered IR they were generated from. Creation runs the whole chain (build, lower, emit,
// compile, resolve) and any failure along the way yields no session. The scalar entry
// point is required; the buffer entry point is optional and, when it cannot be resolved
// (or resolution is switched off in the configuration), buffers are processed by calling
// the scalar entry point once per sample.
//
// The compiled routines take the coefficients on every call, so one session serves any
// coefficient set. The host stays responsible for the delay line on the scalar path and
// for flushing denormal outputs: after every scalar call, and once on the y-history read
// back after a buffer call. Samples produced inside a buffer call are not flushed.
//
// The engine, the module and the function handles borrow from the context. The context is
// boxed so its address never changes and is the last field, so it is dropped after
// everything that refers to it. Dropping the session (or calling destroy) releases the
// machine code; the borrow checker keeps handles from escaping it.

//! Compiled kernel sessions.

use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::core::filter::{FilterCoefficients, FilterState};
use crate::core::reference::flush_denormal;
use crate::ir::{build_biquad_program, Program, BUFFER_ENTRY, SCALAR_ENTRY};
use crate::llvm::{emit_program, initialize_native_target, NativeEngine};
use crate::passes::lower_program;
use inkwell::context::Context;
use inkwell::execution_engine::JitFunction;
use std::fmt;

/// `(a0, a1, a2, b1, b2, x, x1, x2, y1, y2) -> y`
pub type ScalarKernelFn =
    unsafe extern "C" fn(f64, f64, f64, f64, f64, f64, f64, f64, f64, f64) -> f64;

/// `(input, output, length, a0, a1, a2, b1, b2, state)`
pub type BufferKernelFn =
    unsafe extern "C" fn(*const f64, *mut f64, i64, f64, f64, f64, f64, f64, *mut f64);

/// One compiled biquad program and the native resources behind it.
pub struct KernelSession {
    scalar: JitFunction<'static, ScalarKernelFn>,
    buffer: Option<JitFunction<'static, BufferKernelFn>>,
    engine: NativeEngine<'static>,
    program: Program,
    coefficients: FilterCoefficients,
    // Must stay the last field.
    context: Box<Context>,
}

impl KernelSession {
    /// Create a session with the default configuration.
    pub fn create(coeffs: &FilterCoefficients) -> JitResult<Self> {
        Self::create_with_config(coeffs, &JitConfig::default())
    }

    /// Build, lower, compile and resolve the biquad program.
    ///
    /// `coeffs` are the coefficients the caller starts with; the compiled code does
    /// not depend on them.
    pub fn create_with_config(coeffs: &FilterCoefficients, config: &JitConfig) -> JitResult<Self> {
        if !config.enabled {
            return Err(JitError::Disabled);
        }
        initialize_native_target()?;

        let mut program = build_biquad_program()?;
        if config.dump_ir {
            log::info!("biquad program before lowering:\n{}", program);
        }
        let stats = lower_program(&mut program, config)?;
        if config.dump_ir {
            log::info!("biquad program after lowering:\n{}", program);
        }

        let context = Box::new(Context::create());
        // SAFETY: the context lives on the heap and is owned by the session, so the
        // reference stays valid until the session is dropped. Everything created from it
        // is stored in fields declared before `context` and is dropped first, and no
        // 'static handle is ever returned to callers.
        let ctx: &'static Context = unsafe { &*(context.as_ref() as *const Context) };

        let module = emit_program(ctx, &program)?;
        let engine = NativeEngine::compile(module)?;
        if config.dump_ir {
            log::info!(
                "optimised LLVM module:\n{}",
                engine.module().print_to_string().to_string()
            );
        }

        // SAFETY: the signatures match the functions emitted for these symbols.
        let scalar = unsafe { engine.resolve::<ScalarKernelFn>(SCALAR_ENTRY)? };
        let buffer = if config.resolve_buffer_entry {
            match unsafe { engine.resolve::<BufferKernelFn>(BUFFER_ENTRY) } {
                Ok(kernel) => Some(kernel),
                Err(err) => {
                    log::warn!("{}; buffers will be processed sample by sample", err);
                    None
                }
            }
        } else {
            log::warn!("buffer entry point disabled; buffers will be processed sample by sample");
            None
        };

        log::info!(
            "created kernel session ({} pass runs, buffer kernel: {})",
            stats.pass_runs,
            if buffer.is_some() { "yes" } else { "no" }
        );
        Ok(Self {
            scalar,
            buffer,
            engine,
            program,
            coefficients: *coeffs,
            context,
        })
    }

    /// Process one sample, updating `state` exactly as the reference kernel does.
    pub fn process_one(&self, coeffs: &FilterCoefficients, state: &mut FilterState, x: f64) -> f64 {
        // SAFETY: the scalar kernel only reads its arguments.
        let y = unsafe {
            self.scalar.call(
                coeffs.a0, coeffs.a1, coeffs.a2, coeffs.b1, coeffs.b2, x, state.x1, state.x2,
                state.y1, state.y2,
            )
        };
        let y = flush_denormal(y);
        state.push(x, y);
        y
    }

    /// Process `input` into the first `input.len()` samples of `output`.
    pub fn process_buffer(
        &self,
        coeffs: &FilterCoefficients,
        state: &mut FilterState,
        input: &[f64],
        output: &mut [f64],
    ) -> JitResult<()> {
        if output.len() < input.len() {
            return Err(JitError::InvalidArgument {
                reason: format!(
                    "output holds {} samples, input has {}",
                    output.len(),
                    input.len()
                ),
            });
        }
        let length = checked_length(input.len())?;
        if length == 0 {
            return Ok(());
        }
        match &self.buffer {
            Some(kernel) => {
                // SAFETY: `input` and `output` hold at least `length` samples and the state
                // buffer has the four slots the kernel reads and writes.
                exchange_state(state, |slots| unsafe {
                    kernel.call(
                        input.as_ptr(),
                        output.as_mut_ptr(),
                        length,
                        coeffs.a0,
                        coeffs.a1,
                        coeffs.a2,
                        coeffs.b1,
                        coeffs.b2,
                        slots,
                    )
                });
            }
            None => {
                for (x, y) in input.iter().zip(output.iter_mut()) {
                    *y = self.process_one(coeffs, state, *x);
                }
            }
        }
        Ok(())
    }

    /// Process `data` in place.
    pub fn process_in_place(
        &self,
        coeffs: &FilterCoefficients,
        state: &mut FilterState,
        data: &mut [f64],
    ) -> JitResult<()> {
        let length = checked_length(data.len())?;
        if length == 0 {
            return Ok(());
        }
        match &self.buffer {
            Some(kernel) => {
                let ptr = data.as_mut_ptr();
                // SAFETY: each sample is read before it is overwritten, so input and output
                // may share the buffer.
                exchange_state(state, |slots| unsafe {
                    kernel.call(
                        ptr, ptr, length, coeffs.a0, coeffs.a1, coeffs.a2, coeffs.b1, coeffs.b2,
                        slots,
                    )
                });
            }
            None => {
                for sample in data.iter_mut() {
                    *sample = self.process_one(coeffs, state, *sample);
                }
            }
        }
        Ok(())
    }

    pub fn has_buffer_kernel(&self) -> bool {
        self.buffer.is_some()
    }

    /// Coefficients the session was created with.
    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coefficients
    }

    /// The lowered IR the native code was generated from.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Textual LLVM IR of the optimised module.
    pub fn llvm_ir(&self) -> String {
        self.engine.module().print_to_string().to_string()
    }

    /// Release the session and its machine code.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for KernelSession {
    fn drop(&mut self) {
        log::debug!(
            "destroying kernel session (context at {:p})",
            self.context.as_ref()
        );
    }
}

impl fmt::Debug for KernelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSession")
            .field("coefficients", &self.coefficients)
            .field("buffer_kernel", &self.buffer.is_some())
            .finish_non_exhaustive()
    }
}

/// Pack `state`, let the buffer kernel run on the packed slots, then read it back and
/// flush the y-history.
fn exchange_state(state: &mut FilterState, call: impl FnOnce(*mut f64)) {
    let mut slots = state.to_array();
    call(slots.as_mut_ptr());
    let mut next = FilterState::from_array(slots);
    next.y1 = flush_denormal(next.y1);
    next.y2 = flush_denormal(next.y2);
    *state = next;
}

fn checked_length(len: usize) -> JitResult<i64> {
    i64::try_from(len).map_err(|_| JitError::InvalidArgument {
        reason: format!("buffer of {} samples is too long", len),
    })
}
