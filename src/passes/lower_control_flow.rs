// Structured control flow to a block graph. A `for` in block B is replaced by
//
//   B:      ...; br header(lower, inits...)
//   header(iv, carried...):
//           %c = icmp.slt iv, upper
//           condbr %c, body(iv, carried...), exit(carried...)
//   body(iv, carried...):
//           ...; %next = iadd iv, step; br header(%next, yielded...)
//   exit(results...):
//           <the instructions that followed the loop in B>
//
// The loop body block is reused as the CFG body block, so its parameters are already the
// induction variable and the carried values. Uses of the loop's results are redirected to
// the exit block's parameters. Loops nested inside a body are lowered on a later round
// once their enclosing body is part of the layout.

//! Control-flow lowering pass.

use super::{pass_error, Pass};
use crate::core::error::JitResult;
use crate::ir::{BlockId, Function, InstId, Op, Stage, Type, ValueId};

pub struct LowerControlFlow;

impl Pass for LowerControlFlow {
    fn name(&self) -> &'static str {
        "lower-control-flow"
    }

    fn output_stage(&self) -> Stage {
        Stage::Unstructured
    }

    fn run(&mut self, func: &mut Function) -> JitResult<bool> {
        let mut changed = false;
        while let Some((index, inst)) = find_loop(func) {
            self.lower_loop(func, index, inst)?;
            changed = true;
        }
        Ok(changed)
    }
}

/// First `for` in a layout block, with the layout index of its block.
fn find_loop(func: &Function) -> Option<(usize, InstId)> {
    func.layout().iter().enumerate().find_map(|(index, &block)| {
        func.block(block)
            .insts
            .iter()
            .copied()
            .find(|&inst| matches!(func.inst(inst).op, Op::For { .. }))
            .map(|inst| (index, inst))
    })
}

impl LowerControlFlow {
    fn lower_loop(&self, func: &mut Function, index: usize, inst: InstId) -> JitResult<()> {
        let block = func.layout()[index];
        let Op::For { lower, upper, step, ref inits, body } = func.inst(inst).op else {
            return Err(pass_error(self.name(), "expected a loop"));
        };
        let inits = inits.clone();
        let results = func.inst(inst).results.clone();
        let pos = func
            .position_in_block(block, inst)
            .ok_or_else(|| pass_error(self.name(), "loop is not placed in its block"))?;
        let iv_type = func.value_type(lower);

        // exit(results...) takes over everything after the loop.
        let exit = func.create_block();
        for &result in &results {
            let ty = func.value_type(result);
            let param = func.add_block_param(exit, ty);
            func.replace_all_uses(result, param);
        }
        let tail = func.block_mut(block).insts.split_off(pos + 1);
        func.block_mut(block).insts.truncate(pos);
        func.block_mut(exit).insts = tail;

        let header = func.create_block();
        let header_iv = func.add_block_param(header, iv_type);
        let header_carried: Vec<_> = results
            .iter()
            .map(|&r| {
                let ty = func.value_type(r);
                func.add_block_param(header, ty)
            })
            .collect();

        let mut entry_args = vec![lower];
        entry_args.extend(inits);
        func.append_inst(
            block,
            Op::Br {
                target: header,
                args: entry_args,
            },
            &[],
        );

        let cond = func.append_inst(header, Op::ICmpLt(header_iv, upper), &[Type::I1]);
        let cond = func.result(cond);
        let mut then_args = vec![header_iv];
        then_args.extend_from_slice(&header_carried);
        func.append_inst(
            header,
            Op::CondBr {
                cond,
                then_dest: body,
                then_args,
                else_dest: exit,
                else_args: header_carried,
            },
            &[],
        );

        self.rewrite_yield(func, body, step, header)?;

        func.layout_mut().splice(index + 1..index + 1, [header, body, exit]);
        log::trace!(
            "@{}: lowered loop in {} to {} / {} / {}",
            func.name,
            block,
            header,
            body,
            exit
        );
        Ok(())
    }

    /// `yield values` becomes `%next = iadd iv, step; br header(%next, values...)`.
    fn rewrite_yield(
        &self,
        func: &mut Function,
        body: BlockId,
        step: ValueId,
        header: BlockId,
    ) -> JitResult<()> {
        let terminator = func
            .terminator(body)
            .ok_or_else(|| pass_error(self.name(), format!("loop body {} has no terminator", body)))?;
        let Op::Yield(yielded) = func.inst(terminator).op.clone() else {
            return Err(pass_error(
                self.name(),
                format!("loop body {} does not end in yield", body),
            ));
        };
        let iv = func.block(body).params[0];
        let iv_type = func.value_type(iv);
        let at = func.block(body).insts.len() - 1;
        let next = func.insert_inst(body, at, Op::IAdd(iv, step), &[iv_type]);
        let next = func.result(next);

        let mut args = vec![next];
        args.extend(yielded);
        func.inst_mut(terminator).op = Op::Br {
            target: header,
            args,
        };
        Ok(())
    }
}
