// Translation of lowered IR into an LLVM module. Every function becomes an LLVM function
// with the C calling convention and its entry-block parameters as arguments; every other
// layout block becomes a basic block whose block parameters are phi nodes. Phi incomings
// are collected while the branches are emitted and attached once every block has been
// visited, since a back edge can carry values defined later in layout order. The mapping is
// one LLVM instruction per IR operation. Floating-point instructions carry no fast-math
// flags, so LLVM may not reassociate or contract the recurrence and the compiled code
// computes exactly what the reference kernel computes.
//
// Only Final-stage IR is accepted: structured loops, indexed accesses and casts are
// reported as codegen errors. The finished module is checked with LLVM's own verifier.

//! LLVM IR emission.

use crate::core::error::{JitError, JitResult};
use crate::ir::{BlockId, Function, InstId, Op, Program, Type, ValueId};
use hashbrown::HashMap;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{
    BasicValue, BasicValueEnum, FloatValue, FunctionValue, IntValue, PhiValue, PointerValue,
};
use inkwell::{AddressSpace, IntPredicate};

/// Emit every function of `program` into a new module of `context`.
pub fn emit_program<'ctx>(context: &'ctx Context, program: &Program) -> JitResult<Module<'ctx>> {
    let module = context.create_module(&program.name);
    for func in program.functions() {
        FunctionEmitter::new(context, &module, func)?.emit()?;
    }
    module.verify().map_err(|e| JitError::Verify {
        function: program.name.clone(),
        stage: "llvm".to_string(),
        reason: e.to_string(),
    })?;
    log::debug!(
        "emitted LLVM module '{}' with {} functions",
        program.name,
        program.functions().len()
    );
    Ok(module)
}

fn codegen_error(reason: impl Into<String>) -> JitError {
    JitError::Codegen {
        reason: reason.into(),
    }
}

/// Branch arguments waiting for their target's phi nodes.
struct PendingIncoming<'ctx> {
    target: BlockId,
    args: Vec<ValueId>,
    source: BasicBlock<'ctx>,
}

struct FunctionEmitter<'a, 'ctx> {
    context: &'ctx Context,
    builder: Builder<'ctx>,
    func: &'a Function,
    function: FunctionValue<'ctx>,
    blocks: HashMap<BlockId, BasicBlock<'ctx>>,
    phis: HashMap<BlockId, Vec<PhiValue<'ctx>>>,
    values: HashMap<ValueId, BasicValueEnum<'ctx>>,
    pending: Vec<PendingIncoming<'ctx>>,
}

impl<'a, 'ctx> FunctionEmitter<'a, 'ctx> {
    fn new(context: &'ctx Context, module: &Module<'ctx>, func: &'a Function) -> JitResult<Self> {
        let params = func
            .param_types()
            .into_iter()
            .map(|ty| basic_type(context, ty).map(BasicMetadataTypeEnum::from))
            .collect::<JitResult<Vec<_>>>()?;
        let fn_type = match func.result_types.as_slice() {
            [] => context.void_type().fn_type(&params, false),
            [ty] => basic_type(context, *ty)?.fn_type(&params, false),
            _ => return Err(codegen_error(format!("@{} returns more than one value", func.name))),
        };
        let function = module.add_function(&func.name, fn_type, None);
        Ok(Self {
            context,
            builder: context.create_builder(),
            func,
            function,
            blocks: HashMap::new(),
            phis: HashMap::new(),
            values: HashMap::new(),
            pending: Vec::new(),
        })
    }

    fn emit(mut self) -> JitResult<()> {
        let func = self.func;
        for (index, &block) in func.layout().iter().enumerate() {
            let bb = self
                .context
                .append_basic_block(self.function, &format!("bb{}", block.0));
            self.blocks.insert(block, bb);
            if index == 0 {
                for (i, &param) in func.block(block).params.iter().enumerate() {
                    let arg = self
                        .function
                        .get_nth_param(i as u32)
                        .ok_or_else(|| codegen_error(format!("missing argument {}", i)))?;
                    self.values.insert(param, arg);
                }
                continue;
            }
            self.builder.position_at_end(bb);
            let mut phis = Vec::new();
            for &param in &func.block(block).params {
                let ty = basic_type(self.context, func.value_type(param))?;
                let phi = self.builder.build_phi(ty, &format!("v{}", param.0))?;
                self.values.insert(param, phi.as_basic_value());
                phis.push(phi);
            }
            self.phis.insert(block, phis);
        }

        for &block in func.layout() {
            let bb = self.blocks[&block];
            self.builder.position_at_end(bb);
            for &inst in &func.block(block).insts {
                self.emit_inst(inst, bb)?;
            }
        }
        self.resolve_phis()
    }

    fn value(&self, value: ValueId) -> JitResult<BasicValueEnum<'ctx>> {
        self.values
            .get(&value)
            .copied()
            .ok_or_else(|| codegen_error(format!("{} used before it is emitted", value)))
    }

    fn float(&self, value: ValueId) -> JitResult<FloatValue<'ctx>> {
        match self.value(value)? {
            BasicValueEnum::FloatValue(v) => Ok(v),
            other => Err(codegen_error(format!("{} is not a float: {:?}", value, other))),
        }
    }

    fn int(&self, value: ValueId) -> JitResult<IntValue<'ctx>> {
        match self.value(value)? {
            BasicValueEnum::IntValue(v) => Ok(v),
            other => Err(codegen_error(format!("{} is not an integer: {:?}", value, other))),
        }
    }

    fn ptr(&self, value: ValueId) -> JitResult<PointerValue<'ctx>> {
        match self.value(value)? {
            BasicValueEnum::PointerValue(v) => Ok(v),
            other => Err(codegen_error(format!("{} is not a pointer: {:?}", value, other))),
        }
    }

    fn block(&self, block: BlockId) -> JitResult<BasicBlock<'ctx>> {
        self.blocks
            .get(&block)
            .copied()
            .ok_or_else(|| codegen_error(format!("branch to {} outside the layout", block)))
    }

    fn emit_inst(&mut self, inst: InstId, bb: BasicBlock<'ctx>) -> JitResult<()> {
        let func = self.func;
        let data = func.inst(inst);
        let name = data
            .results
            .first()
            .map(|r| format!("v{}", r.0))
            .unwrap_or_default();
        let f64_type = self.context.f64_type();
        let b = &self.builder;

        let value: Option<BasicValueEnum<'ctx>> = match &data.op {
            Op::ConstF64(c) => Some(f64_type.const_float(*c).into()),
            Op::ConstInt(c) => {
                let ty = match func.value_type(data.results[0]) {
                    Type::I1 => self.context.bool_type(),
                    _ => self.context.i64_type(),
                };
                Some(ty.const_int(*c as u64, true).into())
            }
            Op::FAdd(x, y) => Some(b.build_float_add(self.float(*x)?, self.float(*y)?, &name)?.into()),
            Op::FSub(x, y) => Some(b.build_float_sub(self.float(*x)?, self.float(*y)?, &name)?.into()),
            Op::FMul(x, y) => Some(b.build_float_mul(self.float(*x)?, self.float(*y)?, &name)?.into()),
            Op::IAdd(x, y) => Some(b.build_int_add(self.int(*x)?, self.int(*y)?, &name)?.into()),
            Op::ISub(x, y) => Some(b.build_int_sub(self.int(*x)?, self.int(*y)?, &name)?.into()),
            Op::IMul(x, y) => Some(b.build_int_mul(self.int(*x)?, self.int(*y)?, &name)?.into()),
            Op::IDiv(x, y) => {
                Some(b.build_int_signed_div(self.int(*x)?, self.int(*y)?, &name)?.into())
            }
            Op::ICmpLt(x, y) => Some(
                b.build_int_compare(IntPredicate::SLT, self.int(*x)?, self.int(*y)?, &name)?
                    .into(),
            ),
            Op::ElemAddr { base, index } => {
                // SAFETY: the index stays within the caller's buffer for every access the
                // biquad program performs; LLVM only uses inbounds for optimisation.
                let addr = unsafe {
                    b.build_in_bounds_gep(f64_type, self.ptr(*base)?, &[self.int(*index)?], &name)?
                };
                Some(addr.into())
            }
            Op::LoadPtr(addr) => Some(b.build_load(f64_type, self.ptr(*addr)?, &name)?),
            Op::StorePtr { value, addr } => {
                b.build_store(self.ptr(*addr)?, self.float(*value)?)?;
                None
            }
            Op::Br { target, args } => {
                self.pending.push(PendingIncoming {
                    target: *target,
                    args: args.clone(),
                    source: bb,
                });
                self.builder.build_unconditional_branch(self.block(*target)?)?;
                None
            }
            Op::CondBr { cond, then_dest, then_args, else_dest, else_args } => {
                for (target, args) in [(then_dest, then_args), (else_dest, else_args)] {
                    self.pending.push(PendingIncoming {
                        target: *target,
                        args: args.clone(),
                        source: bb,
                    });
                }
                let cond = self.int(*cond)?;
                self.builder.build_conditional_branch(
                    cond,
                    self.block(*then_dest)?,
                    self.block(*else_dest)?,
                )?;
                None
            }
            Op::Return(values) => {
                match values.as_slice() {
                    [] => self.builder.build_return(None)?,
                    [v] => {
                        let v = self.value(*v)?;
                        self.builder.build_return(Some(&v as &dyn BasicValue))?
                    }
                    _ => return Err(codegen_error("multiple return values")),
                };
                None
            }
            op @ (Op::Cast(_)
            | Op::Load { .. }
            | Op::Store { .. }
            | Op::For { .. }
            | Op::Yield(_)) => {
                return Err(codegen_error(format!(
                    "'{}' in @{} must be lowered before code generation",
                    op.name(),
                    func.name
                )));
            }
        };
        if let (Some(value), Some(&result)) = (value, data.results.first()) {
            self.values.insert(result, value);
        }
        Ok(())
    }

    fn resolve_phis(self) -> JitResult<()> {
        for incoming in &self.pending {
            let phis = self
                .phis
                .get(&incoming.target)
                .ok_or_else(|| codegen_error(format!("no phi nodes for {}", incoming.target)))?;
            if phis.len() != incoming.args.len() {
                return Err(codegen_error(format!(
                    "{} expects {} arguments, branch passes {}",
                    incoming.target,
                    phis.len(),
                    incoming.args.len()
                )));
            }
            for (phi, &arg) in phis.iter().zip(&incoming.args) {
                let value = self.value(arg)?;
                phi.add_incoming(&[(&value as &dyn BasicValue, incoming.source)]);
            }
        }
        Ok(())
    }
}

fn basic_type(context: &Context, ty: Type) -> JitResult<BasicTypeEnum<'_>> {
    Ok(match ty {
        Type::F64 => context.f64_type().into(),
        Type::I64 => context.i64_type().into(),
        Type::I1 => context.bool_type().into(),
        Type::Ptr => context.ptr_type(AddressSpace::default()).into(),
        Type::Index => return Err(codegen_error("'index' values must be lowered to i64")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::JitConfig;
    use crate::ir::build_biquad_program;
    use crate::passes::lower_program;

    #[test]
    fn test_emits_verified_module() {
        let mut program = build_biquad_program().unwrap();
        lower_program(&mut program, &JitConfig::default()).unwrap();
        let context = Context::create();
        let module = emit_program(&context, &program).unwrap();
        assert!(module.get_function("biquad_process").is_some());
        assert!(module.get_function("biquad_process_buffer").is_some());
        let text = module.print_to_string().to_string();
        assert!(text.contains("phi double"));
        assert!(!text.contains("fast"));
    }

    #[test]
    fn test_rejects_structured_ir() {
        let program = build_biquad_program().unwrap();
        let context = Context::create();
        let err = emit_program(&context, &program).unwrap_err();
        assert!(matches!(err, JitError::Codegen { .. }));
    }
}
