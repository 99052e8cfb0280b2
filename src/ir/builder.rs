// This module constructs the biquad program. FunctionBuilder is a thin cursor over a
// Function that appends typed instructions to the current block and builds structured
// loops through a closure that receives a builder positioned inside the loop body. The
// program contains two entry points sharing the same arithmetic: a scalar routine that is a
// pure function of the five coefficients, the input sample and the four delay values, and
// a buffer routine that loads the packed delay state once, threads it through a counted
// loop as loop-carried values, stores every output sample and writes the final carried
// values back to the state memory once after the loop. Neither routine flushes denormals;
// that stays on the host side. Coefficients are always parameters, never constants, so a
// compiled program serves any coefficient set.

//! IR builder and the biquad program.

use super::{verify_function, BlockId, Function, Op, Program, Stage, Type, ValueId};
use crate::core::error::JitResult;

/// Symbol of the scalar entry point.
pub const SCALAR_ENTRY: &str = "biquad_process";
/// Symbol of the buffer entry point.
pub const BUFFER_ENTRY: &str = "biquad_process_buffer";

/// Appends instructions to one block of a function.
pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
}

impl<'f> FunctionBuilder<'f> {
    /// Builder positioned at the end of the entry block.
    pub fn new(func: &'f mut Function) -> Self {
        let block = func.entry();
        Self { func, block }
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.func.params()[index]
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    fn emit(&mut self, op: Op, ty: Type) -> ValueId {
        let inst = self.func.append_inst(self.block, op, &[ty]);
        self.func.result(inst)
    }

    fn emit_void(&mut self, op: Op) {
        self.func.append_inst(self.block, op, &[]);
    }

    pub fn const_f64(&mut self, value: f64) -> ValueId {
        self.emit(Op::ConstF64(value), Type::F64)
    }

    pub fn const_i64(&mut self, value: i64) -> ValueId {
        self.emit(Op::ConstInt(value), Type::I64)
    }

    pub fn const_index(&mut self, value: i64) -> ValueId {
        self.emit(Op::ConstInt(value), Type::Index)
    }

    pub fn fadd(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(Op::FAdd(lhs, rhs), Type::F64)
    }

    pub fn fsub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(Op::FSub(lhs, rhs), Type::F64)
    }

    pub fn fmul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit(Op::FMul(lhs, rhs), Type::F64)
    }

    pub fn cast(&mut self, value: ValueId, to: Type) -> ValueId {
        self.emit(Op::Cast(value), to)
    }

    /// `base[index]` as `f64`.
    pub fn load(&mut self, base: ValueId, index: ValueId) -> ValueId {
        self.emit(Op::Load { base, index }, Type::F64)
    }

    pub fn store(&mut self, value: ValueId, base: ValueId, index: ValueId) {
        self.emit_void(Op::Store { value, base, index });
    }

    /// Build `for iv = lower to upper step step iter(inits)`.
    ///
    /// `body` receives a builder positioned in the loop body, the induction variable
    /// and the loop-carried values, and returns the values carried into the next
    /// iteration. Returns the values carried out of the loop.
    pub fn for_loop<F>(
        &mut self,
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        inits: &[ValueId],
        body: F,
    ) -> Vec<ValueId>
    where
        F: FnOnce(&mut FunctionBuilder<'_>, ValueId, &[ValueId]) -> Vec<ValueId>,
    {
        let iv_type = self.func.value_type(lower);
        let carried_types: Vec<Type> = inits.iter().map(|&v| self.func.value_type(v)).collect();

        let region = self.func.create_block();
        let iv = self.func.add_block_param(region, iv_type);
        let carried: Vec<ValueId> = carried_types
            .iter()
            .map(|&ty| self.func.add_block_param(region, ty))
            .collect();

        {
            let mut inner = FunctionBuilder {
                func: &mut *self.func,
                block: region,
            };
            let next = body(&mut inner, iv, &carried);
            inner.emit_void(Op::Yield(next));
        }

        let inst = self.func.append_inst(
            self.block,
            Op::For {
                lower,
                upper,
                step,
                inits: inits.to_vec(),
                body: region,
            },
            &carried_types,
        );
        self.func.inst(inst).results.clone()
    }

    pub fn ret(&mut self, values: &[ValueId]) {
        self.emit_void(Op::Return(values.to_vec()));
    }
}

/// Coefficient parameters of a kernel.
#[derive(Clone, Copy)]
struct Coefficients {
    a0: ValueId,
    a1: ValueId,
    a2: ValueId,
    b1: ValueId,
    b2: ValueId,
}

/// `((((a0*x + a1*x1) + a2*x2) - b1*y1) - b2*y2)`
fn emit_recurrence(
    b: &mut FunctionBuilder<'_>,
    c: Coefficients,
    x: ValueId,
    x1: ValueId,
    x2: ValueId,
    y1: ValueId,
    y2: ValueId,
) -> ValueId {
    let t0 = b.fmul(c.a0, x);
    let t1 = b.fmul(c.a1, x1);
    let t2 = b.fmul(c.a2, x2);
    let t3 = b.fmul(c.b1, y1);
    let t4 = b.fmul(c.b2, y2);
    let s0 = b.fadd(t0, t1);
    let s1 = b.fadd(s0, t2);
    let s2 = b.fsub(s1, t3);
    b.fsub(s2, t4)
}

/// `(a0, a1, a2, b1, b2, x, x1, x2, y1, y2) -> y`
pub fn build_scalar_kernel() -> Function {
    let mut func = Function::new(SCALAR_ENTRY, &[Type::F64; 10], &[Type::F64]);
    let mut b = FunctionBuilder::new(&mut func);
    let coeffs = Coefficients {
        a0: b.param(0),
        a1: b.param(1),
        a2: b.param(2),
        b1: b.param(3),
        b2: b.param(4),
    };
    let (x, x1, x2, y1, y2) = (b.param(5), b.param(6), b.param(7), b.param(8), b.param(9));
    let y = emit_recurrence(&mut b, coeffs, x, x1, x2, y1, y2);
    b.ret(&[y]);
    func
}

/// `(input, output, length, a0, a1, a2, b1, b2, state) -> ()`
pub fn build_buffer_kernel() -> Function {
    let params = [
        Type::Ptr,
        Type::Ptr,
        Type::I64,
        Type::F64,
        Type::F64,
        Type::F64,
        Type::F64,
        Type::F64,
        Type::Ptr,
    ];
    let mut func = Function::new(BUFFER_ENTRY, &params, &[]);
    let mut b = FunctionBuilder::new(&mut func);
    let (input, output, length) = (b.param(0), b.param(1), b.param(2));
    let coeffs = Coefficients {
        a0: b.param(3),
        a1: b.param(4),
        a2: b.param(5),
        b1: b.param(6),
        b2: b.param(7),
    };
    let state = b.param(8);

    let slots: Vec<ValueId> = (0..4).map(|slot| b.const_index(slot)).collect();
    let initial: Vec<ValueId> = slots.iter().map(|&slot| b.load(state, slot)).collect();

    let zero = b.const_index(0);
    let one = b.const_index(1);
    let upper = b.cast(length, Type::Index);
    let last = b.for_loop(zero, upper, one, &initial, |b, i, carried| {
        let (x1, x2, y1, y2) = (carried[0], carried[1], carried[2], carried[3]);
        let x = b.load(input, i);
        let y = emit_recurrence(b, coeffs, x, x1, x2, y1, y2);
        b.store(y, output, i);
        vec![x, x1, y, y1]
    });

    for (&value, &slot) in last.iter().zip(&slots) {
        b.store(value, state, slot);
    }
    b.ret(&[]);
    func
}

/// Build and verify the two-entry-point biquad program.
pub fn build_biquad_program() -> JitResult<Program> {
    let mut program = Program::new("biquad");
    program.add_function(build_scalar_kernel());
    program.add_function(build_buffer_kernel());
    for function in program.functions() {
        verify_function(function, Stage::Structured)?;
    }
    log::debug!(
        "built biquad program: {} functions",
        program.functions().len()
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_kernel_shape() {
        let func = build_scalar_kernel();
        assert_eq!(func.params().len(), 10);
        assert_eq!(func.result_types, vec![Type::F64]);
        assert_eq!(func.count_ops(|op| matches!(op, Op::FMul(..))), 5);
        assert_eq!(func.count_ops(|op| matches!(op, Op::FAdd(..))), 2);
        assert_eq!(func.count_ops(|op| matches!(op, Op::FSub(..))), 2);
        assert_eq!(func.count_ops(|op| matches!(op, Op::For { .. })), 0);
    }

    #[test]
    fn test_buffer_kernel_touches_state_once() {
        let func = build_buffer_kernel();
        assert_eq!(func.params().len(), 9);
        assert!(func.result_types.is_empty());
        assert_eq!(func.count_ops(|op| matches!(op, Op::For { .. })), 1);

        // Four state loads and four state stores live in the entry block, outside the loop.
        let entry = func.block(func.entry());
        let entry_loads = entry
            .insts
            .iter()
            .filter(|&&i| matches!(func.inst(i).op, Op::Load { .. }))
            .count();
        let entry_stores = entry
            .insts
            .iter()
            .filter(|&&i| matches!(func.inst(i).op, Op::Store { .. }))
            .count();
        assert_eq!(entry_loads, 4);
        assert_eq!(entry_stores, 4);

        // One input load and one output store per iteration.
        assert_eq!(func.count_ops(|op| matches!(op, Op::Load { .. })), 5);
        assert_eq!(func.count_ops(|op| matches!(op, Op::Store { .. })), 5);
    }

    #[test]
    fn test_program_verifies() {
        let program = build_biquad_program().unwrap();
        assert!(program.function(SCALAR_ENTRY).is_some());
        assert!(program.function(BUFFER_ENTRY).is_some());
        let text = program.to_string();
        assert!(text.contains("func @biquad_process_buffer"));
        assert!(text.contains("for "));
        assert!(text.contains("cast %2 : i64 -> index"));
    }
}
