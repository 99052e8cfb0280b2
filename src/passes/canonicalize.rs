// Canonicalization: algebraic and structural simplification that runs to a fixed point.
// Integer arithmetic on constants is folded (with overflow left unfolded), additive and
// multiplicative identities are forwarded to their operand, casts between equal types and
// round-trip cast pairs are removed, casts of integer constants become constants of the
// target type, duplicate constants within a block are merged and side-effect-free
// instructions whose results are unused are deleted. Floating-point arithmetic is never
// touched, so the kernel's evaluation order is preserved bit for bit.

//! Canonicalization pass.

use super::Pass;
use crate::core::error::JitResult;
use crate::ir::{Function, InstId, Op, Stage, Type, ValueId};
use hashbrown::HashMap;

pub struct Canonicalize;

enum Rewrite {
    /// Replace every use of the result with this value and drop the instruction.
    Forward(ValueId),
    /// Turn the instruction into an integer constant.
    Constant(i64),
}

impl Pass for Canonicalize {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn output_stage(&self) -> Stage {
        Stage::Structured
    }

    fn run(&mut self, func: &mut Function) -> JitResult<bool> {
        let mut changed = false;
        loop {
            let mut round = simplify(func);
            round |= dedupe_constants(func);
            round |= eliminate_dead_code(func);
            if !round {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }
}

fn simplify(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.all_blocks() {
        let mut pos = 0;
        while pos < func.block(block).insts.len() {
            let inst = func.block(block).insts[pos];
            match rewrite(func, inst) {
                Some(Rewrite::Forward(value)) => {
                    let result = func.result(inst);
                    func.replace_all_uses(result, value);
                    func.block_mut(block).insts.remove(pos);
                    changed = true;
                    continue;
                }
                Some(Rewrite::Constant(c)) => {
                    func.inst_mut(inst).op = Op::ConstInt(c);
                    changed = true;
                }
                None => {}
            }
            pos += 1;
        }
    }
    changed
}

fn rewrite(func: &Function, inst: InstId) -> Option<Rewrite> {
    let op = &func.inst(inst).op;
    let konst = |v: ValueId| func.const_int_value(v);
    match *op {
        Op::IAdd(a, b) => match (konst(a), konst(b)) {
            (Some(x), Some(y)) => x.checked_add(y).map(Rewrite::Constant),
            (_, Some(0)) => Some(Rewrite::Forward(a)),
            (Some(0), _) => Some(Rewrite::Forward(b)),
            _ => None,
        },
        Op::ISub(a, b) => match (konst(a), konst(b)) {
            (Some(x), Some(y)) => x.checked_sub(y).map(Rewrite::Constant),
            (_, Some(0)) => Some(Rewrite::Forward(a)),
            _ => None,
        },
        Op::IMul(a, b) => match (konst(a), konst(b)) {
            (Some(x), Some(y)) => x.checked_mul(y).map(Rewrite::Constant),
            (_, Some(1)) => Some(Rewrite::Forward(a)),
            (Some(1), _) => Some(Rewrite::Forward(b)),
            _ => None,
        },
        Op::IDiv(a, b) => match (konst(a), konst(b)) {
            (Some(x), Some(y)) => x.checked_div(y).map(Rewrite::Constant),
            (_, Some(1)) => Some(Rewrite::Forward(a)),
            _ => None,
        },
        Op::Cast(source) => {
            let target = func.value_type(func.result(inst));
            if func.value_type(source) == target {
                return Some(Rewrite::Forward(source));
            }
            if let Some(c) = konst(source) {
                return Some(Rewrite::Constant(c));
            }
            // cast(cast(x : T -> U) : U -> T) == x
            let inner = func.defining_inst(source)?;
            match func.inst(inner).op {
                Op::Cast(original) if func.value_type(original) == target => {
                    Some(Rewrite::Forward(original))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[derive(Hash, PartialEq, Eq)]
enum ConstKey {
    Float(u64),
    Int(i64, Type),
}

fn dedupe_constants(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.all_blocks() {
        let mut seen: HashMap<ConstKey, ValueId> = HashMap::new();
        let mut pos = 0;
        while pos < func.block(block).insts.len() {
            let inst = func.block(block).insts[pos];
            let key = match func.inst(inst).op {
                Op::ConstF64(c) => Some(ConstKey::Float(c.to_bits())),
                Op::ConstInt(c) => Some(ConstKey::Int(c, func.value_type(func.result(inst)))),
                _ => None,
            };
            if let Some(key) = key {
                let result = func.result(inst);
                if let Some(&existing) = seen.get(&key) {
                    func.replace_all_uses(result, existing);
                    func.block_mut(block).insts.remove(pos);
                    changed = true;
                    continue;
                }
                seen.insert(key, result);
            }
            pos += 1;
        }
    }
    changed
}

fn eliminate_dead_code(func: &mut Function) -> bool {
    let uses = func.use_counts();
    let mut changed = false;
    for block in func.all_blocks() {
        let before = func.block(block).insts.len();
        let insts = std::mem::take(&mut func.block_mut(block).insts);
        let kept: Vec<InstId> = insts
            .into_iter()
            .filter(|&inst| {
                let data = func.inst(inst);
                data.op.has_side_effects()
                    || data.results.iter().any(|r| uses.get(r).copied().unwrap_or(0) > 0)
            })
            .collect();
        changed |= kept.len() != before;
        func.block_mut(block).insts = kept;
    }
    changed
}
