// Loop unrolling by a fixed factor. A counted loop `for iv = lo to hi step s` whose step is
// a positive constant is split in two: a main loop from `lo` to
// `lo + ((hi - lo) / (s * F)) * (s * F)` stepping by `s * F`, whose body is F copies of the
// original body with the induction variable offset by `k * s` in copy k and the carried
// values threaded from one copy into the next, and the original loop rewritten in place
// into the remainder loop that starts where the main loop stopped and is seeded with the
// main loop's results. Any trip count, including zero and counts that are not a multiple
// of F, produces exactly the same sequence of body executions as before.
//
// Loops with a non-constant or non-positive step are left alone.

//! Loop unrolling pass.

use super::{pass_error, Pass};
use crate::core::error::JitResult;
use crate::ir::{BlockId, Function, InstId, Op, Stage, Type, ValueId};
use hashbrown::HashMap;

/// Unroll factor of the standard pipeline.
pub const UNROLL_FACTOR: i64 = 4;

pub struct LoopUnroll {
    factor: i64,
}

impl LoopUnroll {
    pub fn new(factor: i64) -> Self {
        Self { factor }
    }
}

impl Pass for LoopUnroll {
    fn name(&self) -> &'static str {
        "loop-unroll"
    }

    fn output_stage(&self) -> Stage {
        Stage::Structured
    }

    fn run(&mut self, func: &mut Function) -> JitResult<bool> {
        if self.factor <= 1 {
            return Ok(false);
        }
        // Snapshot first so the loops created here are not unrolled again.
        let loops: Vec<(BlockId, InstId)> = func
            .all_blocks()
            .into_iter()
            .flat_map(|block| {
                func.block(block)
                    .insts
                    .iter()
                    .filter(|&&inst| matches!(func.inst(inst).op, Op::For { .. }))
                    .map(move |&inst| (block, inst))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut changed = false;
        for (block, inst) in loops {
            changed |= self.unroll(func, block, inst)?;
        }
        Ok(changed)
    }
}

impl LoopUnroll {
    fn unroll(&self, func: &mut Function, block: BlockId, inst: InstId) -> JitResult<bool> {
        let Op::For { lower, upper, step, ref inits, body } = func.inst(inst).op else {
            return Ok(false);
        };
        let inits = inits.clone();
        let Some(step_value) = func.const_int_value(step).filter(|&s| s > 0) else {
            log::debug!("@{}: loop step is not a positive constant, not unrolling", func.name);
            return Ok(false);
        };
        let stride_value = step_value
            .checked_mul(self.factor)
            .ok_or_else(|| pass_error(self.name(), "unrolled stride overflows"))?;
        let mut pos = func
            .position_in_block(block, inst)
            .ok_or_else(|| pass_error(self.name(), "loop is not placed in its block"))?;

        let ty = func.value_type(lower);
        let mut before = |func: &mut Function, op: Op| -> ValueId {
            let new = func.insert_inst(block, pos, op, &[ty]);
            pos += 1;
            func.result(new)
        };

        // main_upper = lower + ((upper - lower) / stride) * stride
        let span = before(func, Op::ISub(upper, lower));
        let stride = before(func, Op::ConstInt(stride_value));
        let chunks = before(func, Op::IDiv(span, stride));
        let main_span = before(func, Op::IMul(chunks, stride));
        let main_upper = before(func, Op::IAdd(lower, main_span));
        let offsets: Vec<ValueId> = (1..self.factor)
            .map(|k| before(func, Op::ConstInt(k * step_value)))
            .collect();

        let main_body = self.unrolled_body(func, body, &offsets, ty);
        let carried_types: Vec<Type> = inits.iter().map(|&v| func.value_type(v)).collect();
        let main = func.insert_inst(
            block,
            pos,
            Op::For {
                lower,
                upper: main_upper,
                step: stride,
                inits,
                body: main_body,
            },
            &carried_types,
        );
        let main_results = func.inst(main).results.clone();

        // The original loop becomes the remainder.
        if let Op::For { lower, inits, .. } = &mut func.inst_mut(inst).op {
            *lower = main_upper;
            *inits = main_results;
        }
        log::debug!(
            "@{}: unrolled loop by {} with a remainder loop",
            func.name,
            self.factor
        );
        Ok(true)
    }

    /// Body of the main loop: `factor` copies of `body`, chained through the carried values.
    fn unrolled_body(
        &self,
        func: &mut Function,
        body: BlockId,
        offsets: &[ValueId],
        ty: Type,
    ) -> BlockId {
        let new_body = func.create_block();
        let iv = func.add_block_param(new_body, ty);
        let params = func.block(body).params.clone();
        let mut carried: Vec<ValueId> = params[1..]
            .iter()
            .map(|&p| {
                let ty = func.value_type(p);
                func.add_block_param(new_body, ty)
            })
            .collect();

        let insts = func.block(body).insts.clone();
        let Some((&terminator, copies)) = insts.split_last() else {
            return new_body;
        };
        let yielded = match &func.inst(terminator).op {
            Op::Yield(values) => values.clone(),
            _ => Vec::new(),
        };

        for k in 0..self.factor as usize {
            let iv_k = if k == 0 {
                iv
            } else {
                let add = func.append_inst(new_body, Op::IAdd(iv, offsets[k - 1]), &[ty]);
                func.result(add)
            };
            let mut map: HashMap<ValueId, ValueId> = HashMap::new();
            map.insert(params[0], iv_k);
            for (&param, &value) in params[1..].iter().zip(&carried) {
                map.insert(param, value);
            }
            for &inst in copies {
                func.clone_inst_into(inst, new_body, &mut map);
            }
            carried = yielded
                .iter()
                .map(|v| map.get(v).copied().unwrap_or(*v))
                .collect();
        }
        func.append_inst(new_body, Op::Yield(carried), &[]);
        new_body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build_buffer_kernel;
    use crate::ir::interp::{self, Scalar};
    use crate::ir::verify_function;

    fn run_buffer(func: &Function, input: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut memory = vec![input.to_vec(), vec![0.0; input.len()], vec![0.1, 0.2, 0.3, 0.4]];
        let mut args = vec![Scalar::ptr(0), Scalar::ptr(1), Scalar::Int(input.len() as i64)];
        args.extend([0.8, -0.4, 0.2, -0.3, 0.15].map(Scalar::F64));
        args.push(Scalar::ptr(2));
        interp::run(func, &args, &mut memory).unwrap();
        let state = memory.pop().unwrap();
        let output = memory.pop().unwrap();
        (output, state)
    }

    #[test]
    fn test_creates_main_and_remainder_loops() {
        let mut func = build_buffer_kernel();
        assert!(LoopUnroll::new(UNROLL_FACTOR).run(&mut func).unwrap());
        verify_function(&func, Stage::Structured).unwrap();
        assert_eq!(func.count_ops(|op| matches!(op, Op::For { .. })), 2);
        // 4 state loads, 4 in the main body, 1 in the remainder.
        assert_eq!(func.count_ops(|op| matches!(op, Op::Load { .. })), 9);
    }

    #[test]
    fn test_unrolled_loop_matches_original_for_every_tail() {
        let original = build_buffer_kernel();
        let mut unrolled = original.clone();
        LoopUnroll::new(UNROLL_FACTOR).run(&mut unrolled).unwrap();
        for len in 0..=11 {
            let input: Vec<f64> = (0..len).map(|i| (i as f64 * 0.37).sin()).collect();
            assert_eq!(run_buffer(&original, &input), run_buffer(&unrolled, &input), "len {}", len);
        }
    }

    #[test]
    fn test_factor_one_is_a_no_op() {
        let mut func = build_buffer_kernel();
        let before = func.clone();
        assert!(!LoopUnroll::new(1).run(&mut func).unwrap());
        assert_eq!(func, before);
    }
}
