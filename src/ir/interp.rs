// A direct interpreter for the IR at any pipeline stage. It evaluates structured loops as
// well as block-argument control flow, indexed and address-based memory access, and models
// pointers as (buffer, offset) pairs into caller-provided f64 buffers so out-of-bounds
// accesses surface as errors instead of undefined behaviour. The lowering passes are
// checked against it: running a function before and after a pass over the same inputs must
// produce bit-identical outputs and memory. It is also handy for inspecting a program when
// the native backend is not available.

//! IR interpreter.

use super::{BlockId, Function, Op, Type, ValueId};
use crate::core::error::{JitError, JitResult};
use hashbrown::HashMap;

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F64(f64),
    Int(i64),
    Bool(bool),
    /// Element `offset` of caller buffer `buffer`.
    Ptr { buffer: usize, offset: i64 },
}

impl Scalar {
    pub fn ptr(buffer: usize) -> Self {
        Scalar::Ptr { buffer, offset: 0 }
    }
}

enum Flow {
    Jump(BlockId, Vec<Scalar>),
    Yield(Vec<Scalar>),
    Return(Vec<Scalar>),
}

/// Run `func` with `args`, resolving pointers into `memory`.
pub fn run(func: &Function, args: &[Scalar], memory: &mut [Vec<f64>]) -> JitResult<Vec<Scalar>> {
    let mut interp = Interpreter {
        func,
        memory,
        values: HashMap::new(),
    };
    interp.run(args)
}

struct Interpreter<'a> {
    func: &'a Function,
    memory: &'a mut [Vec<f64>],
    values: HashMap<ValueId, Scalar>,
}

fn fail(reason: impl Into<String>) -> JitError {
    JitError::Interpret {
        reason: reason.into(),
    }
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, args: &[Scalar]) -> JitResult<Vec<Scalar>> {
        let mut block = self.func.entry();
        self.bind(block, args)?;
        loop {
            match self.exec_block(block)? {
                Flow::Jump(target, values) => {
                    self.bind(target, &values)?;
                    block = target;
                }
                Flow::Return(values) => return Ok(values),
                Flow::Yield(_) => return Err(fail("yield outside of a loop body")),
            }
        }
    }

    fn bind(&mut self, block: BlockId, values: &[Scalar]) -> JitResult<()> {
        let params = &self.func.block(block).params;
        if params.len() != values.len() {
            return Err(fail(format!(
                "{} expects {} arguments, got {}",
                block,
                params.len(),
                values.len()
            )));
        }
        for (&param, &value) in params.iter().zip(values) {
            self.values.insert(param, value);
        }
        Ok(())
    }

    fn get(&self, value: ValueId) -> JitResult<Scalar> {
        self.values
            .get(&value)
            .copied()
            .ok_or_else(|| fail(format!("{} used before definition", value)))
    }

    fn get_all(&self, values: &[ValueId]) -> JitResult<Vec<Scalar>> {
        values.iter().map(|&v| self.get(v)).collect()
    }

    fn float(&self, value: ValueId) -> JitResult<f64> {
        match self.get(value)? {
            Scalar::F64(f) => Ok(f),
            other => Err(fail(format!("{} is {:?}, expected f64", value, other))),
        }
    }

    fn int(&self, value: ValueId) -> JitResult<i64> {
        match self.get(value)? {
            Scalar::Int(i) => Ok(i),
            other => Err(fail(format!("{} is {:?}, expected an integer", value, other))),
        }
    }

    fn element(&self, base: ValueId, index: i64) -> JitResult<(usize, usize)> {
        match self.get(base)? {
            Scalar::Ptr { buffer, offset } => {
                let element = offset
                    .checked_add(index)
                    .and_then(|e| usize::try_from(e).ok())
                    .ok_or_else(|| fail(format!("negative address {}+{}", offset, index)))?;
                let len = self
                    .memory
                    .get(buffer)
                    .map(Vec::len)
                    .ok_or_else(|| fail(format!("unknown buffer {}", buffer)))?;
                if element >= len {
                    return Err(fail(format!(
                        "access to element {} of buffer {} with {} elements",
                        element, buffer, len
                    )));
                }
                Ok((buffer, element))
            }
            other => Err(fail(format!("{} is {:?}, expected a pointer", base, other))),
        }
    }

    fn read(&self, base: ValueId, index: i64) -> JitResult<f64> {
        let (buffer, element) = self.element(base, index)?;
        Ok(self.memory[buffer][element])
    }

    fn write(&mut self, base: ValueId, index: i64, value: f64) -> JitResult<()> {
        let (buffer, element) = self.element(base, index)?;
        self.memory[buffer][element] = value;
        Ok(())
    }

    fn exec_block(&mut self, block: BlockId) -> JitResult<Flow> {
        let func = self.func;
        for &inst in &func.block(block).insts {
            let data = func.inst(inst);
            let result = match &data.op {
                Op::ConstF64(c) => Some(Scalar::F64(*c)),
                Op::ConstInt(c) => Some(match func.value_type(data.results[0]) {
                    Type::I1 => Scalar::Bool(*c != 0),
                    _ => Scalar::Int(*c),
                }),
                Op::FAdd(a, b) => Some(Scalar::F64(self.float(*a)? + self.float(*b)?)),
                Op::FSub(a, b) => Some(Scalar::F64(self.float(*a)? - self.float(*b)?)),
                Op::FMul(a, b) => Some(Scalar::F64(self.float(*a)? * self.float(*b)?)),
                Op::IAdd(a, b) => Some(Scalar::Int(self.int(*a)?.wrapping_add(self.int(*b)?))),
                Op::ISub(a, b) => Some(Scalar::Int(self.int(*a)?.wrapping_sub(self.int(*b)?))),
                Op::IMul(a, b) => Some(Scalar::Int(self.int(*a)?.wrapping_mul(self.int(*b)?))),
                Op::IDiv(a, b) => {
                    let quotient = self
                        .int(*a)?
                        .checked_div(self.int(*b)?)
                        .ok_or_else(|| fail("integer division overflow or by zero"))?;
                    Some(Scalar::Int(quotient))
                }
                Op::ICmpLt(a, b) => Some(Scalar::Bool(self.int(*a)? < self.int(*b)?)),
                Op::Cast(v) => Some(Scalar::Int(self.int(*v)?)),
                Op::Load { base, index } => Some(Scalar::F64(self.read(*base, self.int(*index)?)?)),
                Op::Store { value, base, index } => {
                    let value = self.float(*value)?;
                    let index = self.int(*index)?;
                    self.write(*base, index, value)?;
                    None
                }
                Op::ElemAddr { base, index } => match self.get(*base)? {
                    Scalar::Ptr { buffer, offset } => Some(Scalar::Ptr {
                        buffer,
                        offset: offset.wrapping_add(self.int(*index)?),
                    }),
                    other => return Err(fail(format!("{} is {:?}, expected a pointer", base, other))),
                },
                Op::LoadPtr(addr) => Some(Scalar::F64(self.read(*addr, 0)?)),
                Op::StorePtr { value, addr } => {
                    let value = self.float(*value)?;
                    self.write(*addr, 0, value)?;
                    None
                }
                Op::For { lower, upper, step, inits, body } => {
                    let (lower, upper, step) = (self.int(*lower)?, self.int(*upper)?, self.int(*step)?);
                    if step <= 0 && lower < upper {
                        return Err(fail(format!("loop step {} never terminates", step)));
                    }
                    let mut carried = self.get_all(inits)?;
                    let mut iv = lower;
                    while iv < upper {
                        let mut args = Vec::with_capacity(carried.len() + 1);
                        args.push(Scalar::Int(iv));
                        args.extend_from_slice(&carried);
                        self.bind(*body, &args)?;
                        match self.exec_block(*body)? {
                            Flow::Yield(values) => carried = values,
                            _ => return Err(fail("loop body left without yield")),
                        }
                        iv += step;
                    }
                    for (&result, value) in data.results.iter().zip(carried) {
                        self.values.insert(result, value);
                    }
                    None
                }
                Op::Yield(values) => return Ok(Flow::Yield(self.get_all(values)?)),
                Op::Return(values) => return Ok(Flow::Return(self.get_all(values)?)),
                Op::Br { target, args } => return Ok(Flow::Jump(*target, self.get_all(args)?)),
                Op::CondBr { cond, then_dest, then_args, else_dest, else_args } => {
                    let taken = match self.get(*cond)? {
                        Scalar::Bool(b) => b,
                        other => return Err(fail(format!("branch on {:?}", other))),
                    };
                    return Ok(if taken {
                        Flow::Jump(*then_dest, self.get_all(then_args)?)
                    } else {
                        Flow::Jump(*else_dest, self.get_all(else_args)?)
                    });
                }
            };
            if let Some(value) = result {
                self.values.insert(data.results[0], value);
            }
        }
        Err(fail(format!("{} has no terminator", block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{FilterCoefficients, FilterState};
    use crate::core::reference;
    use crate::ir::builder::{build_buffer_kernel, build_scalar_kernel};

    #[test]
    fn test_scalar_kernel_matches_reference_arithmetic() {
        let coeffs = FilterCoefficients::new(0.8, -0.4, 0.2, -0.3, 0.15);
        let state = FilterState::new(0.1, -0.2, 0.3, -0.05);
        let func = build_scalar_kernel();
        let args: Vec<Scalar> = [
            coeffs.a0, coeffs.a1, coeffs.a2, coeffs.b1, coeffs.b2, 0.7, state.x1, state.x2,
            state.y1, state.y2,
        ]
        .into_iter()
        .map(Scalar::F64)
        .collect();
        let out = run(&func, &args, &mut []).unwrap();
        assert_eq!(out, vec![Scalar::F64(reference::evaluate(&coeffs, &state, 0.7))]);
    }

    #[test]
    fn test_buffer_kernel_out_of_bounds_is_reported() {
        let func = build_buffer_kernel();
        // Length 3 over a 2-element input buffer.
        let mut memory = vec![vec![0.0; 2], vec![0.0; 3], vec![0.0; 4]];
        let mut args = vec![Scalar::ptr(0), Scalar::ptr(1), Scalar::Int(3)];
        args.extend([1.0, 0.0, 0.0, 0.0, 0.0].map(Scalar::F64));
        args.push(Scalar::ptr(2));
        let err = run(&func, &args, &mut memory).unwrap_err();
        assert!(matches!(err, JitError::Interpret { .. }));
    }
}
