// Runtime configuration for kernel sessions. JitConfig switches the JIT path on or off,
// controls whether the optional buffer entry point is resolved (turning it off forces the
// per-sample fallback, which is how the fallback equivalence is exercised), enables IR
// dumps after every stage and verification after every lowering pass. The configuration
// can be assembled in code with the with_* builder methods or read from BIQUAD_JIT_*
// environment variables, mirroring how the filter tool toggles acceleration at startup.

//! Kernel session configuration.

use std::env;

/// Environment variable that disables the JIT path entirely.
pub const ENV_DISABLE: &str = "BIQUAD_JIT_DISABLE";
/// Environment variable that skips resolution of the buffer entry point.
pub const ENV_NO_BUFFER: &str = "BIQUAD_JIT_NO_BUFFER";
/// Environment variable that dumps the IR after each stage.
pub const ENV_DUMP_IR: &str = "BIQUAD_JIT_DUMP_IR";
/// Environment variable that verifies the IR after every lowering pass.
pub const ENV_VERIFY_EACH: &str = "BIQUAD_JIT_VERIFY_EACH";

/// Configuration consulted when a kernel session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitConfig {
    /// Use the JIT path at all. When false, strategies select the reference kernel.
    pub enabled: bool,
    /// Resolve the optional buffer entry point after compilation.
    pub resolve_buffer_entry: bool,
    /// Log the program before and after lowering, and the emitted LLVM module.
    pub dump_ir: bool,
    /// Run the IR verifier after every pass instead of only at the pipeline boundaries.
    pub verify_each_pass: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolve_buffer_entry: true,
            dump_ir: false,
            verify_each_pass: cfg!(debug_assertions),
        }
    }
}

impl JitConfig {
    /// Build a configuration from the defaults overridden by `BIQUAD_JIT_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(disable) = env_flag(ENV_DISABLE) {
            config.enabled = !disable;
        }
        if let Some(no_buffer) = env_flag(ENV_NO_BUFFER) {
            config.resolve_buffer_entry = !no_buffer;
        }
        if let Some(dump) = env_flag(ENV_DUMP_IR) {
            config.dump_ir = dump;
        }
        if let Some(verify) = env_flag(ENV_VERIFY_EACH) {
            config.verify_each_pass = verify;
        }
        config
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_buffer_entry(mut self, resolve: bool) -> Self {
        self.resolve_buffer_entry = resolve;
        self
    }

    pub fn with_ir_dump(mut self, dump: bool) -> Self {
        self.dump_ir = dump;
        self
    }

    pub fn with_verify_each_pass(mut self, verify: bool) -> Self {
        self.verify_each_pass = verify;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    parse_flag(&raw).or_else(|| {
        log::warn!("ignoring {}={:?}: expected a boolean flag", name, raw);
        None
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_builder_methods() {
        let config = JitConfig::default()
            .with_buffer_entry(false)
            .with_ir_dump(true)
            .with_verify_each_pass(true);
        assert!(config.enabled);
        assert!(!config.resolve_buffer_entry);
        assert!(config.dump_ir);
        assert!(config.verify_each_pass);
        assert!(!config.with_enabled(false).enabled);
    }
}
