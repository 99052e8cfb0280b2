// This module is the host-facing side of the JIT backend. KernelSession owns one compiled
// biquad program per filter channel and bridges the native calling convention to the
// host's coefficients and delay state. The availability probe reports whether sessions can
// be created at all, without creating one, and BiquadKernel is the acceleration strategy
// filters hold: a session when one could be built, the reference kernel otherwise.

//! Kernel sessions and acceleration strategy.

pub mod availability;
pub mod session;
pub mod strategy;

pub use availability::{is_available, probe, Availability};
pub use session::{BufferKernelFn, KernelSession, ScalarKernelFn};
pub use strategy::BiquadKernel;
