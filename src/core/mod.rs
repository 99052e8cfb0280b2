// This module serves as the hub for the infrastructure shared by every other part of the
// crate: the error type, runtime configuration, the filter data model (coefficients and
// delay state) and the reference kernel that acts as both correctness oracle and fallback.
// Nothing in here depends on LLVM, so the reference path stays usable on hosts where the
// native backend cannot be initialised.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - `JitError` covering construction and invocation failures
//!
//! ## Configuration (`config`)
//! - `JitConfig`, built in code or from `BIQUAD_JIT_*` variables
//!
//! ## Data model (`filter`)
//! - `FilterCoefficients`, `FilterState`
//!
//! ## Reference kernel (`reference`)
//! - Interpreted recurrence with denormal flushing

pub mod config;
pub mod error;
pub mod filter;
pub mod reference;

pub use config::JitConfig;
pub use error::{JitError, JitResult};
pub use filter::{FilterCoefficients, FilterState};
