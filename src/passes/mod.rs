// This module holds the lowering pipeline that turns the builder's structured program into
// the flat form the LLVM emitter accepts. Each pass implements the Pass trait and is a
// behaviour-preserving rewrite of one function. PassManager runs the passes in order over
// every function of a program, logs which passes changed what, optionally re-verifies the
// IR after every pass and always verifies the final result. Any pass or verification error
// aborts the pipeline; the caller discards the program and no session is produced.
//
// Standard order:
// 1. canonicalize          - constant folding, constant dedup, cast folding, DCE
// 2. loop-unroll           - unroll counted loops by a fixed factor of 4 with a remainder loop
// 3. lower-control-flow    - structured loops to blocks with block arguments
// 4. lower-memory          - index to i64, indexed memory access to address arithmetic
// 5. reconcile-casts       - remove the identity casts left behind, reject any other

//! Lowering pipeline.

pub mod canonicalize;
pub mod lower_control_flow;
pub mod lower_memory;
pub mod reconcile;
pub mod unroll;

pub use canonicalize::Canonicalize;
pub use lower_control_flow::LowerControlFlow;
pub use lower_memory::LowerMemory;
pub use reconcile::ReconcileCasts;
pub use unroll::{LoopUnroll, UNROLL_FACTOR};

use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::ir::{verify_function, verify_program, Function, Program, Stage};
use hashbrown::HashMap;

/// A behaviour-preserving rewrite of one function.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Stage a function is in once this pass has run.
    fn output_stage(&self) -> Stage;

    /// Rewrite `func`; returns whether anything changed.
    fn run(&mut self, func: &mut Function) -> JitResult<bool>;
}

/// Statistics of one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Number of (pass, function) executions.
    pub pass_runs: usize,
    /// Functions changed, per pass.
    pub changed: HashMap<&'static str, usize>,
}

impl PipelineStats {
    pub fn changed_by(&self, pass: &str) -> usize {
        self.changed.get(pass).copied().unwrap_or(0)
    }
}

/// Ordered pass pipeline.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    verify_each: bool,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            verify_each: false,
        }
    }

    /// The five-pass pipeline used for every kernel session.
    pub fn standard(config: &JitConfig) -> Self {
        let mut pm = Self::new();
        pm.verify_each = config.verify_each_pass;
        pm.add(Canonicalize);
        pm.add(LoopUnroll::new(UNROLL_FACTOR));
        pm.add(LowerControlFlow);
        pm.add(LowerMemory);
        pm.add(ReconcileCasts);
        pm
    }

    pub fn add<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn set_verify_each(&mut self, verify: bool) {
        self.verify_each = verify;
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass over every function, then verify the final program.
    pub fn run(&mut self, program: &mut Program) -> JitResult<PipelineStats> {
        let mut stats = PipelineStats::default();
        let mut stage = Stage::Structured;
        for pass in &mut self.passes {
            let name = pass.name();
            for func in program.functions_mut() {
                let changed = pass.run(func).map_err(|err| wrap_error(name, err))?;
                stats.pass_runs += 1;
                if changed {
                    *stats.changed.entry(name).or_insert(0) += 1;
                    log::debug!("pass {} changed @{}", name, func.name);
                }
                if self.verify_each {
                    verify_function(func, pass.output_stage())
                        .map_err(|err| wrap_error(name, err))?;
                }
            }
            stage = pass.output_stage();
            log::trace!("after {}:\n{}", name, program);
        }
        verify_program(program, stage)?;
        Ok(stats)
    }
}

fn wrap_error(pass: &'static str, err: JitError) -> JitError {
    match err {
        JitError::Pass { .. } => err,
        other => JitError::Pass {
            pass: pass.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Error raised by a pass.
pub(crate) fn pass_error(pass: &str, reason: impl Into<String>) -> JitError {
    JitError::Pass {
        pass: pass.to_string(),
        reason: reason.into(),
    }
}

/// Run the standard pipeline over `program`.
pub fn lower_program(program: &mut Program, config: &JitConfig) -> JitResult<PipelineStats> {
    let mut pm = PassManager::standard(config);
    log::debug!("running lowering pipeline: {}", pm.pass_names().join(", "));
    pm.run(program)
}
