//! Instruction and function pretty-printing.
//!
//! Each instruction formats on a single line; structural ops summarize
//! their bodies inline. `listing` expands nested bodies with indentation
//! and is the surface diagnostics render against.

use std::fmt;
use std::fmt::Write as _;

use super::{Function, Instr};

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::ConstInt {
                dest,
                value,
                scalar,
            } => write!(f, "{} = const.{} {}", dest, scalar, value),
            Instr::ConstFloat {
                dest,
                value,
                scalar,
            } => write!(f, "{} = const.{} {}", dest, scalar, value),
            Instr::BinOp { dest, op, lhs, rhs } => {
                write!(f, "{} = {} {}, {}", dest, op, lhs, rhs)
            }
            Instr::MakeAggregate { dest, ty, parts } => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{} = aggregate {} [{}]", dest, ty, parts.join(", "))
            }
            Instr::ExtractField { dest, value, index } => {
                write!(f, "{} = extract {}, {}", dest, value, index)
            }
            Instr::Output { value } => write!(f, "output {}", value),
            Instr::AllocFrame { frame, ty } => write!(f, "{} = alloc {}", frame, ty),
            Instr::FreeFrame { frame } => write!(f, "free {}", frame),
            Instr::StoreField { frame, path, value } => {
                write!(f, "store {}[{}] = {}", frame, path_str(path), value)
            }
            Instr::LoadField { dest, frame, path } => {
                write!(f, "{} = load {}[{}]", dest, frame, path_str(path))
            }
            Instr::GetStackPtr { dest } => write!(f, "{} = stack_ptr", dest),
            Instr::IfElse {
                cond,
                then_body,
                else_body,
            } => write!(
                f,
                "if_else {} (then={}, else={})",
                cond,
                then_body.len(),
                else_body.len()
            ),
            Instr::IfOnly { cond, then_body } => {
                write!(f, "if_only {} (then={})", cond, then_body.len())
            }
            Instr::Loop { count, body } => write!(f, "loop x{} (body={})", count, body.len()),
            Instr::AlignUp { dest, value, align } => {
                write!(f, "{} = align_up {}, {}", dest, value, align)
            }
            Instr::OffsetAdd { dest, base, amount } => {
                write!(f, "{} = offset {}, {}", dest, base, amount)
            }
            Instr::StackStore {
                addr,
                offset,
                elem,
                value,
            } => write!(f, "stack_store [{}+{}] {} = {}", addr, offset, elem, value),
            Instr::StackLoad {
                dest,
                addr,
                offset,
                elem,
            } => write!(f, "{} = stack_load [{}+{}] {}", dest, addr, offset, elem),
            Instr::Select {
                dest,
                cond,
                on_true,
                on_false,
            } => write!(f, "{} = select {} ? {} : {}", dest, cond, on_true, on_false),
        }
    }
}

fn path_str(path: &[u32]) -> String {
    path.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a function as an indented multi-line listing.
pub fn listing(function: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn {} (sp = {}):", function.name, function.stack_ptr);
    write_body(&mut out, &function.body, 1);
    out
}

fn write_body(out: &mut String, body: &[Instr], depth: usize) {
    let pad = "  ".repeat(depth);
    for instr in body {
        match instr {
            Instr::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let _ = writeln!(out, "{}if_else {}:", pad, cond);
                let _ = writeln!(out, "{}then:", pad);
                write_body(out, then_body, depth + 1);
                let _ = writeln!(out, "{}else:", pad);
                write_body(out, else_body, depth + 1);
            }
            Instr::IfOnly { cond, then_body } => {
                let _ = writeln!(out, "{}if_only {}:", pad, cond);
                write_body(out, then_body, depth + 1);
            }
            Instr::Loop { count, body } => {
                let _ = writeln!(out, "{}loop x{}:", pad, count);
                write_body(out, body, depth + 1);
            }
            other => {
                let _ = writeln!(out, "{}{}", pad, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FrameId, ValueId};
    use crate::types::TypeId;

    #[test]
    fn test_listing_indents_nested_bodies() {
        let f = Function {
            name: "probe".into(),
            stack_ptr: ValueId(0),
            next_value: 4,
            body: vec![
                Instr::AllocFrame {
                    frame: FrameId(0),
                    ty: TypeId(1),
                },
                Instr::IfOnly {
                    cond: ValueId(1),
                    then_body: vec![Instr::FreeFrame { frame: FrameId(0) }],
                },
            ],
        };
        let text = listing(&f);
        assert!(text.starts_with("fn probe (sp = v0):\n"));
        assert!(text.contains("  f0 = alloc t1\n"));
        assert!(text.contains("  if_only v1:\n"));
        assert!(text.contains("    free f0\n"));
    }
}
