// Static capability probe. A session can only be created when the native target
// initialises; the probe triggers that process-wide initialisation (once) and reports its
// outcome together with the linked LLVM version. It never builds a program or allocates a
// session, and repeated calls return the same answer.

//! Availability gate.

use crate::llvm::{backend_version, initialize_native_target};
use std::fmt;

/// Outcome of the capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available { llvm_version: (u32, u32, u32) },
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available {
                llvm_version: (major, minor, patch),
            } => write!(f, "available (LLVM {}.{}.{})", major, minor, patch),
            Availability::Unavailable { reason } => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Probe whether the JIT backend can be used on this host.
pub fn probe() -> Availability {
    match initialize_native_target() {
        Ok(()) => Availability::Available {
            llvm_version: backend_version(),
        },
        Err(err) => Availability::Unavailable {
            reason: err.to_string(),
        },
    }
}

/// Shorthand for `probe().is_available()`.
pub fn is_available() -> bool {
    probe().is_available()
}
