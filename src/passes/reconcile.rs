// Cast reconciliation, the last pass of the pipeline. Once memory lowering has rewritten
// every `index` value to i64 the conversions inserted by the builder and by memory lowering
// all connect values of the same type; they are forwarded to their operand and dropped. A
// cast that still converts between two different types has no native counterpart and fails
// the pipeline.

//! Cast reconciliation pass.

use super::{pass_error, Pass};
use crate::core::error::JitResult;
use crate::ir::{Function, Op, Stage};

pub struct ReconcileCasts;

impl Pass for ReconcileCasts {
    fn name(&self) -> &'static str {
        "reconcile-casts"
    }

    fn output_stage(&self) -> Stage {
        Stage::Final
    }

    fn run(&mut self, func: &mut Function) -> JitResult<bool> {
        let mut changed = false;
        for block in func.all_blocks() {
            let mut pos = 0;
            while pos < func.block(block).insts.len() {
                let inst = func.block(block).insts[pos];
                if let Op::Cast(source) = func.inst(inst).op {
                    let result = func.result(inst);
                    let (from, to) = (func.value_type(source), func.value_type(result));
                    if from != to {
                        return Err(pass_error(
                            self.name(),
                            format!("unresolved conversion {} : {} -> {}", result, from, to),
                        ));
                    }
                    func.replace_all_uses(result, source);
                    func.block_mut(block).insts.remove(pos);
                    changed = true;
                    continue;
                }
                pos += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::JitError;
    use crate::ir::{verify_function, Type};

    #[test]
    fn test_removes_identity_casts() {
        let mut func = Function::new("identity", &[Type::I64], &[Type::I64]);
        let entry = func.entry();
        let n = func.params()[0];
        let cast = func.append_inst(entry, Op::Cast(n), &[Type::I64]);
        let cast = func.result(cast);
        func.append_inst(entry, Op::Return(vec![cast]), &[]);

        assert!(ReconcileCasts.run(&mut func).unwrap());
        verify_function(&func, Stage::Final).unwrap();
        assert_eq!(func.count_ops(|op| matches!(op, Op::Cast(_))), 0);
    }

    #[test]
    fn test_rejects_real_conversions() {
        let mut func = Function::new("convert", &[Type::I64], &[Type::Index]);
        let entry = func.entry();
        let n = func.params()[0];
        let cast = func.append_inst(entry, Op::Cast(n), &[Type::Index]);
        let cast = func.result(cast);
        func.append_inst(entry, Op::Return(vec![cast]), &[]);

        let err = ReconcileCasts.run(&mut func).unwrap_err();
        assert!(matches!(err, JitError::Pass { ref pass, .. } if pass == "reconcile-casts"));
    }
}
