//! Program representation consumed and produced by stack lowering.
//!
//! A function body is a list of instructions with structural control flow:
//! `IfElse`, `IfOnly`, and `Loop` carry nested bodies, so a single walk can
//! thread state through branches and reconcile it at joins.
//!
//! The instruction set has three layers:
//! - ordinary ops the lowering pass leaves untouched (constants,
//!   arithmetic, aggregate construction, output);
//! - abstract continuation-stack ops (`AllocFrame`, `FreeFrame`,
//!   `StoreField`, `LoadField`, `GetStackPtr`), the pass's input
//!   vocabulary, gone after lowering;
//! - addressed stack ops (`AlignUp`, `OffsetAdd`, `StackStore`,
//!   `StackLoad`, `Select`), the pass's output vocabulary.

pub mod builder;
pub mod display;

use std::fmt;

use crate::types::{Scalar, TypeId};

// ─── Identifiers ──────────────────────────────────────────────────

/// Identifier of a value produced by an instruction (or the function's
/// incoming stack pointer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

/// Identifier of a logical continuation-stack frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A storable primitive shape: one scalar or a vector of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Elem {
    pub scalar: Scalar,
    pub lanes: u32,
}

impl Elem {
    pub fn byte_size(&self) -> u32 {
        self.scalar.byte_size() * self.lanes
    }
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.scalar, self.lanes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Eq => "eq",
            BinOp::Lt => "lt",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{}", name)
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// A single instruction. Field paths are index sequences: struct member
/// indices and array element indices, outermost first. An empty path
/// refers to the whole frame value.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    // ── Ordinary ops (pass-through) ──
    ConstInt {
        dest: ValueId,
        value: i64,
        scalar: Scalar,
    },
    ConstFloat {
        dest: ValueId,
        value: f64,
        scalar: Scalar,
    },
    BinOp {
        dest: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Build an aggregate (struct, array, or vector) from parts.
    MakeAggregate {
        dest: ValueId,
        ty: TypeId,
        parts: Vec<ValueId>,
    },
    ExtractField {
        dest: ValueId,
        value: ValueId,
        index: u32,
    },
    /// Emit an observable result.
    Output {
        value: ValueId,
    },

    // ── Abstract continuation-stack ops (input vocabulary) ──
    AllocFrame {
        frame: FrameId,
        ty: TypeId,
    },
    FreeFrame {
        frame: FrameId,
    },
    StoreField {
        frame: FrameId,
        path: Vec<u32>,
        value: ValueId,
    },
    LoadField {
        dest: ValueId,
        frame: FrameId,
        path: Vec<u32>,
    },
    GetStackPtr {
        dest: ValueId,
    },

    // ── Control flow (structural) ──
    IfElse {
        cond: ValueId,
        then_body: Vec<Instr>,
        else_body: Vec<Instr>,
    },
    IfOnly {
        cond: ValueId,
        then_body: Vec<Instr>,
    },
    /// Counted loop with a compile-time trip count.
    Loop {
        count: u32,
        body: Vec<Instr>,
    },

    // ── Addressed stack ops (output vocabulary) ──
    AlignUp {
        dest: ValueId,
        value: ValueId,
        align: u32,
    },
    OffsetAdd {
        dest: ValueId,
        base: ValueId,
        amount: u32,
    },
    StackStore {
        addr: ValueId,
        offset: u32,
        elem: Elem,
        value: ValueId,
    },
    StackLoad {
        dest: ValueId,
        addr: ValueId,
        offset: u32,
        elem: Elem,
    },
    /// Path-conditioned merge: yields `on_true` when `cond` is nonzero,
    /// `on_false` otherwise. Only the selected operand is read.
    Select {
        dest: ValueId,
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    },
}

// ─── Functions and modules ────────────────────────────────────────

/// One lowering unit. `stack_ptr` is the incoming continuation-stack
/// pointer, a byte offset from the fixed stack base. `next_value` is the
/// watermark for allocating fresh value ids.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub stack_ptr: ValueId,
    pub body: Vec<Instr>,
    pub next_value: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub functions: Vec<Function>,
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_display() {
        assert_eq!(
            format!(
                "{}",
                Instr::ConstInt {
                    dest: ValueId(1),
                    value: 7,
                    scalar: Scalar::I32
                }
            ),
            "v1 = const.i32 7"
        );
        assert_eq!(
            format!(
                "{}",
                Instr::AllocFrame {
                    frame: FrameId(0),
                    ty: TypeId(2)
                }
            ),
            "f0 = alloc t2"
        );
        assert_eq!(
            format!("{}", Instr::FreeFrame { frame: FrameId(0) }),
            "free f0"
        );
        assert_eq!(
            format!(
                "{}",
                Instr::StoreField {
                    frame: FrameId(0),
                    path: vec![1, 0],
                    value: ValueId(3)
                }
            ),
            "store f0[1.0] = v3"
        );
        assert_eq!(
            format!(
                "{}",
                Instr::StackLoad {
                    dest: ValueId(9),
                    addr: ValueId(4),
                    offset: 16,
                    elem: Elem {
                        scalar: Scalar::F32,
                        lanes: 3
                    }
                }
            ),
            "v9 = stack_load [v4+16] f32x3"
        );
    }

    #[test]
    fn test_structural_display() {
        let op = Instr::IfElse {
            cond: ValueId(2),
            then_body: vec![Instr::GetStackPtr { dest: ValueId(3) }],
            else_body: vec![],
        };
        assert_eq!(format!("{}", op), "if_else v2 (then=1, else=0)");

        let op = Instr::Loop {
            count: 4,
            body: vec![Instr::FreeFrame { frame: FrameId(1) }],
        };
        assert_eq!(format!("{}", op), "loop x4 (body=1)");
    }

    #[test]
    fn test_select_display() {
        let op = Instr::Select {
            dest: ValueId(8),
            cond: ValueId(2),
            on_true: ValueId(6),
            on_false: ValueId(0),
        };
        assert_eq!(format!("{}", op), "v8 = select v2 ? v6 : v0");
    }
}
