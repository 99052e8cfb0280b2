//! biquad-jit - JIT-compiled biquad filter kernels.
//!
//! The crate compiles the second-order recurrence
//! `y = a0*x + a1*x[n-1] + a2*x[n-2] - b1*y[n-1] - b2*y[n-2]` to native code at
//! runtime and exposes it through a single-sample and a whole-buffer entry point,
//! with results identical to the interpreted reference kernel.
//!
//! # Primary Usage
//!
//! ```ignore
//! use biquad_jit::{FilterCoefficients, FilterState, KernelSession};
//!
//! let coeffs = FilterCoefficients::new(1.0, 0.5, 0.25, 0.1, 0.05);
//! let session = KernelSession::create(&coeffs)?;
//! let mut state = FilterState::default();
//! let y = session.process_one(&coeffs, &mut state, 0.5);
//! session.process_in_place(&coeffs, &mut state, &mut samples)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, configuration, data model and the reference kernel
//! - [`ir`] - Program representation, builder, verifier and interpreter
//! - [`passes`] - Lowering pipeline
//! - [`llvm`] - Native target setup, LLVM IR emission and the JIT engine
//! - [`kernel`] - Kernel sessions, availability probe and kernel selection
//! - [`filters`] - High-pass, low-pass and parametric stereo filters

pub mod core;
pub mod filters;
pub mod ir;
pub mod kernel;
pub mod llvm;
pub mod passes;

pub use crate::core::{reference, FilterCoefficients, FilterState, JitConfig, JitError, JitResult};
pub use filters::{Biquad, Channel, FilterDesign, StereoFilter};
pub use kernel::{is_available, probe, Availability, BiquadKernel, KernelSession};
