// This module defines the in-memory program representation the kernels are built in. A
// Program holds Functions; each Function owns flat arenas of values, instructions and
// blocks, addressed by small copyable ids. Blocks carry block parameters (the SSA form used
// instead of phi nodes) and a list of instruction ids. The top-level control-flow graph is
// given by the function layout; structured `for` loops own a detached body block whose
// parameters are the induction variable followed by the loop-carried values. The same
// representation is used at every stage of the lowering pipeline: the builder produces
// structured, index-typed, memory-indexed code and the passes progressively rewrite it into
// flat blocks, i64 arithmetic and explicit address computation that maps 1:1 onto LLVM IR.

//! Intermediate representation for the biquad kernels.
//!
//! ```text
//! func @biquad_process_buffer(%0: ptr, %1: ptr, %2: i64, ...) {
//! ^bb0(...):
//!   %16 = cast %2 : i64 -> index
//!   %17, %18, %19, %20 = for %21 = %14 to %16 step %15 iter(%22 = %10, %23 = %11, %24 = %12, %25 = %13) {
//!     ...
//!     yield %26, %22, %31, %24
//!   }
//!   store %17, %8[%3]
//!   return
//! }
//! ```

use hashbrown::HashMap;
use std::fmt;

pub mod builder;
pub mod interp;
pub mod printer;
pub mod verify;

pub use builder::{build_biquad_program, FunctionBuilder, BUFFER_ENTRY, SCALAR_ENTRY};
pub use verify::{verify_function, verify_program, Stage};

/// SSA value id, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Block id, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Instruction id, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

/// Value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    F64,
    I64,
    I1,
    /// Target-independent integer used by loop bounds and memory indices.
    /// Rewritten to `I64` by memory lowering.
    Index,
    /// Opaque pointer to `f64` elements.
    Ptr,
}

impl Type {
    pub fn is_integer(self) -> bool {
        matches!(self, Type::I64 | Type::Index)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::F64 => "f64",
            Type::I64 => "i64",
            Type::I1 => "i1",
            Type::Index => "index",
            Type::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// Instruction operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    ConstF64(f64),
    /// Integer constant; the result type (`i64`, `index` or `i1`) lives in the value table.
    ConstInt(i64),
    FAdd(ValueId, ValueId),
    FSub(ValueId, ValueId),
    FMul(ValueId, ValueId),
    IAdd(ValueId, ValueId),
    ISub(ValueId, ValueId),
    IMul(ValueId, ValueId),
    /// Signed division, truncating toward zero.
    IDiv(ValueId, ValueId),
    /// Signed less-than.
    ICmpLt(ValueId, ValueId),
    /// Conversion between integer types; the target type is the result type.
    Cast(ValueId),
    /// `base[index]`, structured memory access.
    Load { base: ValueId, index: ValueId },
    Store { value: ValueId, base: ValueId, index: ValueId },
    /// Address of `base[index]`.
    ElemAddr { base: ValueId, index: ValueId },
    LoadPtr(ValueId),
    StorePtr { value: ValueId, addr: ValueId },
    /// Counted loop `lower..upper` by `step`, carrying `inits` through `body`.
    For {
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        inits: Vec<ValueId>,
        body: BlockId,
    },
    Yield(Vec<ValueId>),
    Br { target: BlockId, args: Vec<ValueId> },
    CondBr {
        cond: ValueId,
        then_dest: BlockId,
        then_args: Vec<ValueId>,
        else_dest: BlockId,
        else_args: Vec<ValueId>,
    },
    Return(Vec<ValueId>),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::ConstF64(_) | Op::ConstInt(_) => "const",
            Op::FAdd(..) => "fadd",
            Op::FSub(..) => "fsub",
            Op::FMul(..) => "fmul",
            Op::IAdd(..) => "iadd",
            Op::ISub(..) => "isub",
            Op::IMul(..) => "imul",
            Op::IDiv(..) => "idiv",
            Op::ICmpLt(..) => "icmp.slt",
            Op::Cast(_) => "cast",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::ElemAddr { .. } => "elemaddr",
            Op::LoadPtr(_) => "load.ptr",
            Op::StorePtr { .. } => "store.ptr",
            Op::For { .. } => "for",
            Op::Yield(_) => "yield",
            Op::Br { .. } => "br",
            Op::CondBr { .. } => "condbr",
            Op::Return(_) => "return",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Yield(_) | Op::Br { .. } | Op::CondBr { .. } | Op::Return(_)
        )
    }

    /// Ops that must be kept even when their results are unused.
    pub fn has_side_effects(&self) -> bool {
        self.is_terminator()
            || matches!(self, Op::Store { .. } | Op::StorePtr { .. } | Op::For { .. })
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::ConstF64(_) | Op::ConstInt(_) => Vec::new(),
            Op::FAdd(a, b)
            | Op::FSub(a, b)
            | Op::FMul(a, b)
            | Op::IAdd(a, b)
            | Op::ISub(a, b)
            | Op::IMul(a, b)
            | Op::IDiv(a, b)
            | Op::ICmpLt(a, b) => vec![*a, *b],
            Op::Cast(v) | Op::LoadPtr(v) => vec![*v],
            Op::Load { base, index } | Op::ElemAddr { base, index } => vec![*base, *index],
            Op::Store { value, base, index } => vec![*value, *base, *index],
            Op::StorePtr { value, addr } => vec![*value, *addr],
            Op::For { lower, upper, step, inits, .. } => {
                let mut operands = vec![*lower, *upper, *step];
                operands.extend_from_slice(inits);
                operands
            }
            Op::Yield(values) | Op::Return(values) => values.clone(),
            Op::Br { args, .. } => args.clone(),
            Op::CondBr { cond, then_args, else_args, .. } => {
                let mut operands = vec![*cond];
                operands.extend_from_slice(then_args);
                operands.extend_from_slice(else_args);
                operands
            }
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            Op::ConstF64(_) | Op::ConstInt(_) => Vec::new(),
            Op::FAdd(a, b)
            | Op::FSub(a, b)
            | Op::FMul(a, b)
            | Op::IAdd(a, b)
            | Op::ISub(a, b)
            | Op::IMul(a, b)
            | Op::IDiv(a, b)
            | Op::ICmpLt(a, b) => vec![a, b],
            Op::Cast(v) | Op::LoadPtr(v) => vec![v],
            Op::Load { base, index } | Op::ElemAddr { base, index } => vec![base, index],
            Op::Store { value, base, index } => vec![value, base, index],
            Op::StorePtr { value, addr } => vec![value, addr],
            Op::For { lower, upper, step, inits, .. } => {
                let mut operands = vec![lower, upper, step];
                operands.extend(inits.iter_mut());
                operands
            }
            Op::Yield(values) | Op::Return(values) => values.iter_mut().collect(),
            Op::Br { args, .. } => args.iter_mut().collect(),
            Op::CondBr { cond, then_args, else_args, .. } => {
                let mut operands = vec![cond];
                operands.extend(then_args.iter_mut());
                operands.extend(else_args.iter_mut());
                operands
            }
        }
    }

    /// CFG successors of a terminator.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Op::Br { target, .. } => vec![*target],
            Op::CondBr { then_dest, else_dest, .. } => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }

    /// Nested body block, for region-holding ops.
    pub fn region(&self) -> Option<BlockId> {
        match self {
            Op::For { body, .. } => Some(*body),
            _ => None,
        }
    }
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    Param { block: BlockId, index: u32 },
    Result { inst: InstId, index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub ty: Type,
    pub def: ValueDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub op: Op,
    pub results: Vec<ValueId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub params: Vec<ValueId>,
    pub insts: Vec<InstId>,
}

/// A function: value/instruction/block arenas plus the CFG layout.
///
/// Instructions removed from a block stay in the arena; only blocks reachable from
/// the layout (directly or through a region) are part of the function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub result_types: Vec<Type>,
    values: Vec<ValueData>,
    insts: Vec<Inst>,
    blocks: Vec<Block>,
    layout: Vec<BlockId>,
}

impl Function {
    /// Create a function whose entry block takes `params`.
    pub fn new(name: impl Into<String>, params: &[Type], results: &[Type]) -> Self {
        let mut func = Self {
            name: name.into(),
            result_types: results.to_vec(),
            values: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
        };
        let entry = func.create_block();
        for &ty in params {
            func.add_block_param(entry, ty);
        }
        func.layout.push(entry);
        func
    }

    pub fn entry(&self) -> BlockId {
        self.layout[0]
    }

    pub fn params(&self) -> &[ValueId] {
        &self.block(self.entry()).params
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params().iter().map(|&p| self.value_type(p)).collect()
    }

    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.layout
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.values[value.0 as usize].ty
    }

    pub fn set_value_type(&mut self, value: ValueId, ty: Type) {
        self.values[value.0 as usize].ty = ty;
    }

    pub fn value_def(&self, value: ValueId) -> ValueDef {
        self.values[value.0 as usize].def
    }

    pub fn is_valid_value(&self, value: ValueId) -> bool {
        (value.0 as usize) < self.values.len()
    }

    pub fn is_valid_block(&self, block: BlockId) -> bool {
        (block.0 as usize) < self.blocks.len()
    }

    pub fn block(&self, block: BlockId) -> &Block {
        &self.blocks[block.0 as usize]
    }

    pub fn block_mut(&mut self, block: BlockId) -> &mut Block {
        &mut self.blocks[block.0 as usize]
    }

    pub fn inst(&self, inst: InstId) -> &Inst {
        &self.insts[inst.0 as usize]
    }

    pub fn inst_mut(&mut self, inst: InstId) -> &mut Inst {
        &mut self.insts[inst.0 as usize]
    }

    /// Create a block that is not yet part of the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn add_block_param(&mut self, block: BlockId, ty: Type) -> ValueId {
        let index = self.block(block).params.len() as u32;
        let value = self.new_value(ty, ValueDef::Param { block, index });
        self.block_mut(block).params.push(value);
        value
    }

    /// Create an instruction (and its result values) without placing it.
    pub fn create_inst(&mut self, op: Op, result_types: &[Type]) -> InstId {
        let inst = InstId(self.insts.len() as u32);
        let results = result_types
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                self.new_value(ty, ValueDef::Result { inst, index: index as u32 })
            })
            .collect();
        self.insts.push(Inst { op, results });
        inst
    }

    pub fn append_inst(&mut self, block: BlockId, op: Op, result_types: &[Type]) -> InstId {
        let inst = self.create_inst(op, result_types);
        self.block_mut(block).insts.push(inst);
        inst
    }

    pub fn insert_inst(
        &mut self,
        block: BlockId,
        position: usize,
        op: Op,
        result_types: &[Type],
    ) -> InstId {
        let inst = self.create_inst(op, result_types);
        self.block_mut(block).insts.insert(position, inst);
        inst
    }

    /// First result of `inst`.
    pub fn result(&self, inst: InstId) -> ValueId {
        self.inst(inst).results[0]
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.block(block)
            .insts
            .last()
            .copied()
            .filter(|&inst| self.inst(inst).op.is_terminator())
    }

    /// Position of `inst` within `block`.
    pub fn position_in_block(&self, block: BlockId, inst: InstId) -> Option<usize> {
        self.block(block).insts.iter().position(|&i| i == inst)
    }

    /// Layout blocks followed by nested region blocks, in pre-order.
    pub fn all_blocks(&self) -> Vec<BlockId> {
        let mut blocks = Vec::new();
        for &block in &self.layout {
            self.collect_blocks(block, &mut blocks);
        }
        blocks
    }

    fn collect_blocks(&self, block: BlockId, out: &mut Vec<BlockId>) {
        out.push(block);
        for &inst in &self.block(block).insts {
            if let Some(body) = self.inst(inst).op.region() {
                self.collect_blocks(body, out);
            }
        }
    }

    /// Instructions placed in any reachable block, in pre-order.
    pub fn placed_insts(&self) -> Vec<InstId> {
        self.all_blocks()
            .into_iter()
            .flat_map(|block| self.block(block).insts.clone())
            .collect()
    }

    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) {
        for inst in &mut self.insts {
            for operand in inst.op.operands_mut() {
                if *operand == from {
                    *operand = to;
                }
            }
        }
    }

    /// Number of uses of every value by placed instructions.
    pub fn use_counts(&self) -> HashMap<ValueId, usize> {
        let mut counts = HashMap::new();
        for inst in self.placed_insts() {
            for operand in self.inst(inst).op.operands() {
                *counts.entry(operand).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Value of `value` if it is defined by an integer constant.
    pub fn const_int_value(&self, value: ValueId) -> Option<i64> {
        match self.value_def(value) {
            ValueDef::Result { inst, .. } => match self.inst(inst).op {
                Op::ConstInt(c) => Some(c),
                _ => None,
            },
            ValueDef::Param { .. } => None,
        }
    }

    /// Defining instruction of `value`, if it is an instruction result.
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value_def(value) {
            ValueDef::Result { inst, .. } => Some(inst),
            ValueDef::Param { .. } => None,
        }
    }

    /// Append a copy of `src` to `dst`, remapping operands through `map` and
    /// recording the copied results in it. Region bodies are copied recursively.
    pub fn clone_inst_into(
        &mut self,
        src: InstId,
        dst: BlockId,
        map: &mut HashMap<ValueId, ValueId>,
    ) -> InstId {
        let mut op = self.inst(src).op.clone();
        for operand in op.operands_mut() {
            if let Some(&mapped) = map.get(operand) {
                *operand = mapped;
            }
        }
        if let Op::For { body, .. } = &mut op {
            let new_body = self.create_block();
            for param in self.block(*body).params.clone() {
                let ty = self.value_type(param);
                let new_param = self.add_block_param(new_body, ty);
                map.insert(param, new_param);
            }
            for inst in self.block(*body).insts.clone() {
                self.clone_inst_into(inst, new_body, map);
            }
            *body = new_body;
        }

        let old_results = self.inst(src).results.clone();
        let result_types: Vec<Type> = old_results.iter().map(|&r| self.value_type(r)).collect();
        let inst = self.append_inst(dst, op, &result_types);
        let new_results = self.inst(inst).results.clone();
        for (old, new) in old_results.into_iter().zip(new_results) {
            map.insert(old, new);
        }
        inst
    }

    /// Count placed instructions matching `predicate`.
    pub fn count_ops(&self, predicate: impl Fn(&Op) -> bool) -> usize {
        self.placed_insts()
            .into_iter()
            .filter(|&inst| predicate(&self.inst(inst).op))
            .count()
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, def });
        id
    }
}

/// A compilation unit: the functions compiled together into one native module.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    functions: Vec<Function>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}
