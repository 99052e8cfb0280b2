// Structural verifier for the IR. It checks that every block ends in exactly one
// terminator, that operand and result types agree with each operation, that branch
// arguments match the parameters of their targets, that loop bodies are well-formed regions
// ending in a yield, and that only operations legal at the current pipeline stage appear.
// Stages are ordered: structured code straight out of the builder, unstructured code after
// control-flow lowering, lowered code after memory/arithmetic lowering (no index type, no
// indexed memory access) and final code after cast reconciliation, which is what the LLVM
// emitter accepts.

//! IR verifier.

use super::{BlockId, Function, InstId, Op, Program, Type, ValueId};
use crate::core::error::{JitError, JitResult};
use std::fmt;

/// Pipeline stage a function is expected to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Builder output: structured loops, indexed memory access.
    Structured,
    /// No structured control flow left.
    Unstructured,
    /// No `index` values and no indexed memory access left.
    Lowered,
    /// No casts left; ready for emission.
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Structured => "structured",
            Stage::Unstructured => "unstructured",
            Stage::Lowered => "lowered",
            Stage::Final => "final",
        };
        f.write_str(name)
    }
}

pub fn verify_program(program: &Program, stage: Stage) -> JitResult<()> {
    for function in program.functions() {
        verify_function(function, stage)?;
    }
    Ok(())
}

pub fn verify_function(func: &Function, stage: Stage) -> JitResult<()> {
    Verifier { func, stage }.run()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Cfg,
    Region,
}

struct Verifier<'a> {
    func: &'a Function,
    stage: Stage,
}

impl<'a> Verifier<'a> {
    fn fail(&self, reason: impl Into<String>) -> JitError {
        JitError::Verify {
            function: self.func.name.clone(),
            stage: self.stage.to_string(),
            reason: reason.into(),
        }
    }

    fn run(&self) -> JitResult<()> {
        let func = self.func;
        if func.layout().is_empty() {
            return Err(self.fail("function has no blocks"));
        }
        let mut seen = vec![false; func.num_blocks()];
        for &block in func.layout() {
            if !func.is_valid_block(block) {
                return Err(self.fail(format!("layout references unknown block {}", block)));
            }
            if std::mem::replace(&mut seen[block.0 as usize], true) {
                return Err(self.fail(format!("block {} appears twice in the layout", block)));
            }
        }
        for &block in func.layout() {
            self.check_block(block, BlockKind::Cfg)?;
        }
        if self.stage >= Stage::Lowered {
            for block in func.all_blocks() {
                for &param in &func.block(block).params {
                    self.check_not_index(param)?;
                }
            }
        }
        Ok(())
    }

    fn check_block(&self, block: BlockId, kind: BlockKind) -> JitResult<()> {
        let func = self.func;
        let insts = &func.block(block).insts;
        let Some((&last, body)) = insts.split_last() else {
            return Err(self.fail(format!("block {} is empty", block)));
        };
        for &inst in body {
            if func.inst(inst).op.is_terminator() {
                return Err(self.fail(format!(
                    "terminator '{}' in the middle of block {}",
                    func.inst(inst).op.name(),
                    block
                )));
            }
            self.check_inst(inst)?;
        }
        let terminator = &func.inst(last).op;
        match (terminator, kind) {
            (Op::Yield(_), BlockKind::Region) => {}
            (Op::Return(_) | Op::Br { .. } | Op::CondBr { .. }, BlockKind::Cfg) => {}
            (op, _) if !op.is_terminator() => {
                return Err(self.fail(format!("block {} does not end in a terminator", block)));
            }
            (op, _) => {
                return Err(self.fail(format!(
                    "'{}' is not a valid terminator for block {}",
                    op.name(),
                    block
                )));
            }
        }
        self.check_inst(last)
    }

    fn check_inst(&self, inst: InstId) -> JitResult<()> {
        let func = self.func;
        let data = func.inst(inst);
        self.check_legal(&data.op)?;
        for operand in data.op.operands() {
            if !func.is_valid_value(operand) {
                return Err(self.fail(format!("'{}' uses unknown value {}", data.op.name(), operand)));
            }
            if self.stage >= Stage::Lowered {
                self.check_not_index(operand)?;
            }
        }
        let results = &data.results;
        if self.stage >= Stage::Lowered {
            for &result in results {
                self.check_not_index(result)?;
            }
        }
        let expect_results = |count: usize| -> JitResult<()> {
            if results.len() != count {
                return Err(self.fail(format!(
                    "'{}' has {} results, expected {}",
                    data.op.name(),
                    results.len(),
                    count
                )));
            }
            Ok(())
        };

        match &data.op {
            Op::ConstF64(_) => {
                expect_results(1)?;
                self.expect(results[0], Type::F64, "constant")?;
            }
            Op::ConstInt(_) => {
                expect_results(1)?;
                let ty = func.value_type(results[0]);
                if !ty.is_integer() && ty != Type::I1 {
                    return Err(self.fail(format!("integer constant of type {}", ty)));
                }
            }
            Op::FAdd(a, b) | Op::FSub(a, b) | Op::FMul(a, b) => {
                expect_results(1)?;
                self.expect(*a, Type::F64, data.op.name())?;
                self.expect(*b, Type::F64, data.op.name())?;
                self.expect(results[0], Type::F64, data.op.name())?;
            }
            Op::IAdd(a, b) | Op::ISub(a, b) | Op::IMul(a, b) | Op::IDiv(a, b) => {
                expect_results(1)?;
                let ty = self.integer(*a, data.op.name())?;
                self.expect(*b, ty, data.op.name())?;
                self.expect(results[0], ty, data.op.name())?;
            }
            Op::ICmpLt(a, b) => {
                expect_results(1)?;
                let ty = self.integer(*a, data.op.name())?;
                self.expect(*b, ty, data.op.name())?;
                self.expect(results[0], Type::I1, data.op.name())?;
            }
            Op::Cast(v) => {
                expect_results(1)?;
                self.integer(*v, "cast operand")?;
                self.integer(results[0], "cast result")?;
            }
            Op::Load { base, index } => {
                expect_results(1)?;
                self.expect(*base, Type::Ptr, "load base")?;
                self.integer(*index, "load index")?;
                self.expect(results[0], Type::F64, "load")?;
            }
            Op::Store { value, base, index } => {
                expect_results(0)?;
                self.expect(*value, Type::F64, "stored value")?;
                self.expect(*base, Type::Ptr, "store base")?;
                self.integer(*index, "store index")?;
            }
            Op::ElemAddr { base, index } => {
                expect_results(1)?;
                self.expect(*base, Type::Ptr, "elemaddr base")?;
                self.expect(*index, Type::I64, "elemaddr index")?;
                self.expect(results[0], Type::Ptr, "elemaddr")?;
            }
            Op::LoadPtr(addr) => {
                expect_results(1)?;
                self.expect(*addr, Type::Ptr, "load address")?;
                self.expect(results[0], Type::F64, "load")?;
            }
            Op::StorePtr { value, addr } => {
                expect_results(0)?;
                self.expect(*value, Type::F64, "stored value")?;
                self.expect(*addr, Type::Ptr, "store address")?;
            }
            Op::For { lower, upper, step, inits, body } => {
                expect_results(inits.len())?;
                let ty = self.integer(*lower, "loop lower bound")?;
                self.expect(*upper, ty, "loop upper bound")?;
                self.expect(*step, ty, "loop step")?;
                if !func.is_valid_block(*body) || func.layout().contains(body) {
                    return Err(self.fail(format!("loop body {} is not a detached block", body)));
                }
                let params = &func.block(*body).params;
                if params.len() != inits.len() + 1 {
                    return Err(self.fail(format!(
                        "loop body {} takes {} parameters, expected {}",
                        body,
                        params.len(),
                        inits.len() + 1
                    )));
                }
                self.expect(params[0], ty, "induction variable")?;
                for ((&init, &param), &result) in inits.iter().zip(&params[1..]).zip(results) {
                    let carried = func.value_type(init);
                    self.expect(param, carried, "loop-carried parameter")?;
                    self.expect(result, carried, "loop result")?;
                }
                self.check_block(*body, BlockKind::Region)?;
                let Some(terminator) = func.terminator(*body) else {
                    return Err(self.fail(format!("loop body {} has no terminator", body)));
                };
                if let Op::Yield(values) = &func.inst(terminator).op {
                    self.check_args(values, &params[1..], "yield")?;
                }
            }
            Op::Yield(_) => expect_results(0)?,
            Op::Return(values) => {
                expect_results(0)?;
                if values.len() != func.result_types.len() {
                    return Err(self.fail(format!(
                        "return of {} values from a function returning {}",
                        values.len(),
                        func.result_types.len()
                    )));
                }
                for (&value, &ty) in values.iter().zip(&func.result_types) {
                    self.expect(value, ty, "returned value")?;
                }
            }
            Op::Br { target, args } => {
                expect_results(0)?;
                self.check_branch(*target, args)?;
            }
            Op::CondBr { cond, then_dest, then_args, else_dest, else_args } => {
                expect_results(0)?;
                self.expect(*cond, Type::I1, "branch condition")?;
                if then_dest == else_dest {
                    return Err(self.fail(format!("conditional branch with identical targets {}", then_dest)));
                }
                self.check_branch(*then_dest, then_args)?;
                self.check_branch(*else_dest, else_args)?;
            }
        }
        Ok(())
    }

    fn check_legal(&self, op: &Op) -> JitResult<()> {
        let legal = match self.stage {
            Stage::Structured => !matches!(
                op,
                Op::Br { .. } | Op::CondBr { .. } | Op::ElemAddr { .. } | Op::LoadPtr(_) | Op::StorePtr { .. }
            ),
            Stage::Unstructured => !matches!(
                op,
                Op::For { .. } | Op::Yield(_) | Op::ElemAddr { .. } | Op::LoadPtr(_) | Op::StorePtr { .. }
            ),
            Stage::Lowered => !matches!(
                op,
                Op::For { .. } | Op::Yield(_) | Op::Load { .. } | Op::Store { .. }
            ),
            Stage::Final => !matches!(
                op,
                Op::For { .. } | Op::Yield(_) | Op::Load { .. } | Op::Store { .. } | Op::Cast(_)
            ),
        };
        if legal {
            Ok(())
        } else {
            Err(self.fail(format!("'{}' is not legal at this stage", op.name())))
        }
    }

    fn check_branch(&self, target: BlockId, args: &[ValueId]) -> JitResult<()> {
        let func = self.func;
        if !func.layout().contains(&target) {
            return Err(self.fail(format!("branch to {} which is not in the layout", target)));
        }
        if target == func.entry() {
            return Err(self.fail("branch to the entry block"));
        }
        self.check_args(args, &func.block(target).params, "branch")
    }

    fn check_args(&self, args: &[ValueId], params: &[ValueId], what: &str) -> JitResult<()> {
        if args.len() != params.len() {
            return Err(self.fail(format!(
                "{} passes {} values, target expects {}",
                what,
                args.len(),
                params.len()
            )));
        }
        for (&arg, &param) in args.iter().zip(params) {
            self.expect(arg, self.func.value_type(param), what)?;
        }
        Ok(())
    }

    fn expect(&self, value: ValueId, ty: Type, what: &str) -> JitResult<()> {
        let actual = self.func.value_type(value);
        if actual != ty {
            return Err(self.fail(format!("{}: {} has type {}, expected {}", what, value, actual, ty)));
        }
        Ok(())
    }

    fn integer(&self, value: ValueId, what: &str) -> JitResult<Type> {
        let ty = self.func.value_type(value);
        if !ty.is_integer() {
            return Err(self.fail(format!("{}: {} has type {}, expected an integer", what, value, ty)));
        }
        Ok(ty)
    }

    fn check_not_index(&self, value: ValueId) -> JitResult<()> {
        if self.func.value_type(value) == Type::Index {
            return Err(self.fail(format!("{} still has type index", value)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build_buffer_kernel;

    #[test]
    fn test_rejects_missing_terminator() {
        let mut func = Function::new("broken", &[Type::F64], &[Type::F64]);
        let entry = func.entry();
        let x = func.params()[0];
        func.append_inst(entry, Op::FAdd(x, x), &[Type::F64]);
        let err = verify_function(&func, Stage::Structured).unwrap_err();
        assert!(err.to_string().contains("does not end in a terminator"));
    }

    #[test]
    fn test_rejects_type_mismatch() {
        let mut func = Function::new("broken", &[Type::F64, Type::I64], &[Type::F64]);
        let entry = func.entry();
        let (x, n) = (func.params()[0], func.params()[1]);
        let sum = func.append_inst(entry, Op::FAdd(x, n), &[Type::F64]);
        let sum = func.result(sum);
        func.append_inst(entry, Op::Return(vec![sum]), &[]);
        let err = verify_function(&func, Stage::Structured).unwrap_err();
        assert!(matches!(err, JitError::Verify { .. }));
    }

    #[test]
    fn test_structured_loop_is_illegal_when_unstructured() {
        let func = build_buffer_kernel();
        verify_function(&func, Stage::Structured).unwrap();
        let err = verify_function(&func, Stage::Unstructured).unwrap_err();
        assert!(err.to_string().contains("'for' is not legal"));
    }
}
