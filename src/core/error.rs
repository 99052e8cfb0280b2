// This module defines error types for the biquad JIT backend using the thiserror crate for
// idiomatic Rust error handling. JitError is the single error enum covering every failure
// scenario of a kernel session: an unavailable or disabled backend, IR construction and
// verification failures, lowering pass failures, LLVM emission and native compilation
// failures, unresolved entry points and invocation misuse. Each variant carries enough
// context (pass names, stages, symbol names, reasons) to diagnose the failure from a log
// line. All failures are local to the session being created or invoked; callers recover by
// falling back to the reference kernel. JitResult<T> is the convenience alias used
// throughout the crate.

//! Error types for the biquad JIT backend.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for kernel construction and invocation.
#[derive(Error, Debug)]
pub enum JitError {
    #[error("JIT backend unavailable: {reason}")]
    Unavailable {
        reason: String,
    },

    #[error("JIT backend disabled by configuration")]
    Disabled,

    #[error("IR construction failed: {reason}")]
    Build {
        reason: String,
    },

    #[error("IR verification failed for @{function} at stage {stage}: {reason}")]
    Verify {
        function: String,
        stage: String,
        reason: String,
    },

    #[error("Lowering pass '{pass}' failed: {reason}")]
    Pass {
        pass: String,
        reason: String,
    },

    #[error("LLVM IR emission failed: {reason}")]
    Codegen {
        reason: String,
    },

    #[error("LLVM builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("Native compilation failed: {reason}")]
    Compile {
        reason: String,
    },

    #[error("Entry point not found: {name}")]
    MissingSymbol {
        name: String,
    },

    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        reason: String,
    },

    #[error("IR interpretation failed: {reason}")]
    Interpret {
        reason: String,
    },
}

impl JitError {
    /// Whether the error came out of session construction (build, lowering,
    /// compilation or symbol resolution) rather than invocation.
    pub fn is_construction_failure(&self) -> bool {
        !matches!(
            self,
            JitError::InvalidArgument { .. } | JitError::Interpret { .. }
        )
    }
}

/// Result type alias for JIT operations.
pub type JitResult<T> = Result<T, JitError>;
