// This module is the native backend. It owns everything that touches LLVM: the one-time
// initialisation of the host target, the translation of the lowered IR into an LLVM module
// and the JIT execution engine that optimises that module, generates machine code in
// process and hands out typed function pointers for the entry points. Nothing outside this
// module names an inkwell type except the kernel session that keeps the engine alive.

//! LLVM-based native code generation.
//!
//! ```ignore
//! use biquad_jit::llvm::{emit_program, initialize_native_target, NativeEngine};
//!
//! initialize_native_target()?;
//! let context = inkwell::context::Context::create();
//! let module = emit_program(&context, &lowered)?;
//! let engine = NativeEngine::compile(module)?;
//! ```

pub mod codegen;
pub mod engine;
pub mod target;

pub use codegen::emit_program;
pub use engine::NativeEngine;
pub use target::{backend_version, initialize_native_target, native_target_machine};
