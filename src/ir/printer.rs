//! Textual form of the IR, used by IR dumps and tests.

use super::{BlockId, Function, Inst, Op, Program, ValueId};
use std::fmt::{self, Write};

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module @{} {{", self.name)?;
        for function in self.functions() {
            write!(f, "{}", function)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        print_function(self, &mut out)?;
        f.write_str(&out)
    }
}

fn print_function(func: &Function, out: &mut String) -> fmt::Result {
    write!(out, "func @{}(", func.name)?;
    write_typed_list(func, func.params(), out)?;
    out.push(')');
    match func.result_types.as_slice() {
        [] => {}
        [ty] => write!(out, " -> {}", ty)?,
        types => {
            out.push_str(" -> (");
            for (i, ty) in types.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write!(out, "{}", ty)?;
            }
            out.push(')');
        }
    }
    out.push_str(" {\n");
    for &block in func.layout() {
        write!(out, "{}", block)?;
        if !func.block(block).params.is_empty() {
            out.push('(');
            write_typed_list(func, &func.block(block).params, out)?;
            out.push(')');
        }
        out.push_str(":\n");
        print_block_body(func, block, 1, out)?;
    }
    out.push_str("}\n");
    Ok(())
}

fn print_block_body(func: &Function, block: BlockId, depth: usize, out: &mut String) -> fmt::Result {
    for &inst in &func.block(block).insts {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        print_inst(func, func.inst(inst), depth, out)?;
        out.push('\n');
    }
    Ok(())
}

fn print_inst(func: &Function, inst: &Inst, depth: usize, out: &mut String) -> fmt::Result {
    if !inst.results.is_empty() {
        write_list(&inst.results, out)?;
        out.push_str(" = ");
    }
    match &inst.op {
        Op::ConstF64(c) => write!(out, "const {:?} : f64", c)?,
        Op::ConstInt(c) => write!(out, "const {} : {}", c, func.value_type(inst.results[0]))?,
        Op::Cast(v) => write!(
            out,
            "cast {} : {} -> {}",
            v,
            func.value_type(*v),
            func.value_type(inst.results[0])
        )?,
        Op::Load { base, index } => write!(out, "load {}[{}]", base, index)?,
        Op::Store { value, base, index } => write!(out, "store {}, {}[{}]", value, base, index)?,
        Op::ElemAddr { base, index } => write!(out, "elemaddr {}[{}]", base, index)?,
        Op::StorePtr { value, addr } => write!(out, "store.ptr {}, {}", value, addr)?,
        Op::For { lower, upper, step, inits, body } => {
            let params = &func.block(*body).params;
            let iv = params.first().map_or_else(|| "?".to_string(), |p| p.to_string());
            write!(out, "for {} = {} to {} step {}", iv, lower, upper, step)?;
            if !inits.is_empty() {
                out.push_str(" iter(");
                for (i, (param, init)) in params.iter().skip(1).zip(inits).enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(out, "{} = {}", param, init)?;
                }
                out.push(')');
            }
            out.push_str(" {\n");
            print_block_body(func, *body, depth + 1, out)?;
            out.push_str(&"  ".repeat(depth));
            out.push('}');
        }
        Op::Br { target, args } => {
            write!(out, "br {}", target)?;
            write_args(args, out)?;
        }
        Op::CondBr { cond, then_dest, then_args, else_dest, else_args } => {
            write!(out, "condbr {}, {}", cond, then_dest)?;
            write_args(then_args, out)?;
            write!(out, ", {}", else_dest)?;
            write_args(else_args, out)?;
        }
        Op::Yield(values) | Op::Return(values) => {
            out.push_str(inst.op.name());
            if !values.is_empty() {
                out.push(' ');
                write_list(values, out)?;
            }
        }
        other => {
            write!(out, "{} ", other.name())?;
            write_list(&other.operands(), out)?;
        }
    }
    Ok(())
}

fn write_list(values: &[ValueId], out: &mut String) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{}", value)?;
    }
    Ok(())
}

fn write_args(args: &[ValueId], out: &mut String) -> fmt::Result {
    if !args.is_empty() {
        out.push('(');
        write_list(args, out)?;
        out.push(')');
    }
    Ok(())
}

fn write_typed_list(func: &Function, values: &[ValueId], out: &mut String) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{}: {}", value, func.value_type(*value))?;
    }
    Ok(())
}
