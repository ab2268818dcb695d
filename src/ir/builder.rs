//! FuncBuilder: convenience construction of input functions.
//!
//! Allocates fresh value and frame ids, and scopes nested bodies through
//! closures so structural instructions are always well formed.

use super::{BinOp, FrameId, Function, Instr, ValueId};
use crate::types::{Scalar, TypeId};

pub struct FuncBuilder {
    name: String,
    stack_ptr: ValueId,
    next_value: u32,
    next_frame: u32,
    /// Scope stack; the last entry is the body currently being built.
    scopes: Vec<Vec<Instr>>,
}

impl FuncBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stack_ptr: ValueId(0),
            next_value: 1,
            next_frame: 0,
            scopes: vec![Vec::new()],
        }
    }

    /// The function's incoming stack-pointer value.
    pub fn stack_ptr(&self) -> ValueId {
        self.stack_ptr
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Append a raw instruction to the current body.
    pub fn push(&mut self, instr: Instr) {
        if let Some(body) = self.scopes.last_mut() {
            body.push(instr);
        }
    }

    // ── Ordinary ops ──

    pub fn const_int(&mut self, scalar: Scalar, value: i64) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::ConstInt {
            dest,
            value,
            scalar,
        });
        dest
    }

    pub fn const_float(&mut self, scalar: Scalar, value: f64) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::ConstFloat {
            dest,
            value,
            scalar,
        });
        dest
    }

    pub fn binop(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::BinOp { dest, op, lhs, rhs });
        dest
    }

    pub fn aggregate(&mut self, ty: TypeId, parts: Vec<ValueId>) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::MakeAggregate { dest, ty, parts });
        dest
    }

    pub fn extract(&mut self, value: ValueId, index: u32) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::ExtractField { dest, value, index });
        dest
    }

    pub fn output(&mut self, value: ValueId) {
        self.push(Instr::Output { value });
    }

    // ── Abstract stack ops ──

    pub fn alloc(&mut self, ty: TypeId) -> FrameId {
        let frame = FrameId(self.next_frame);
        self.next_frame += 1;
        self.push(Instr::AllocFrame { frame, ty });
        frame
    }

    pub fn free(&mut self, frame: FrameId) {
        self.push(Instr::FreeFrame { frame });
    }

    pub fn store(&mut self, frame: FrameId, path: &[u32], value: ValueId) {
        self.push(Instr::StoreField {
            frame,
            path: path.to_vec(),
            value,
        });
    }

    pub fn load(&mut self, frame: FrameId, path: &[u32]) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::LoadField {
            dest,
            frame,
            path: path.to_vec(),
        });
        dest
    }

    pub fn get_stack_ptr(&mut self) -> ValueId {
        let dest = self.fresh();
        self.push(Instr::GetStackPtr { dest });
        dest
    }

    // ── Structural control flow ──

    pub fn if_else(
        &mut self,
        cond: ValueId,
        then_f: impl FnOnce(&mut Self),
        else_f: impl FnOnce(&mut Self),
    ) {
        self.scopes.push(Vec::new());
        then_f(self);
        let then_body = self.scopes.pop().unwrap_or_default();
        self.scopes.push(Vec::new());
        else_f(self);
        let else_body = self.scopes.pop().unwrap_or_default();
        self.push(Instr::IfElse {
            cond,
            then_body,
            else_body,
        });
    }

    pub fn if_only(&mut self, cond: ValueId, then_f: impl FnOnce(&mut Self)) {
        self.scopes.push(Vec::new());
        then_f(self);
        let then_body = self.scopes.pop().unwrap_or_default();
        self.push(Instr::IfOnly { cond, then_body });
    }

    pub fn loop_(&mut self, count: u32, body_f: impl FnOnce(&mut Self)) {
        self.scopes.push(Vec::new());
        body_f(self);
        let body = self.scopes.pop().unwrap_or_default();
        self.push(Instr::Loop { count, body });
    }

    pub fn finish(mut self) -> Function {
        debug_assert_eq!(self.scopes.len(), 1, "unclosed nested body");
        let body = self.scopes.pop().unwrap_or_default();
        Function {
            name: self.name,
            stack_ptr: self.stack_ptr,
            body,
            next_value: self.next_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fresh_ids() {
        let mut b = FuncBuilder::new("main");
        let a = b.const_int(Scalar::I32, 1);
        let c = b.const_int(Scalar::I32, 2);
        assert_ne!(a, c);
        assert_ne!(a, b.stack_ptr());
        let f = b.finish();
        assert_eq!(f.body.len(), 2);
        assert_eq!(f.next_value, 3);
    }

    #[test]
    fn test_builder_nested_bodies() {
        let mut b = FuncBuilder::new("main");
        let cond = b.const_int(Scalar::Bool, 1);
        b.if_else(
            cond,
            |b| {
                b.const_int(Scalar::I32, 10);
            },
            |b| {
                b.const_int(Scalar::I32, 20);
                b.const_int(Scalar::I32, 30);
            },
        );
        let f = b.finish();
        assert_eq!(f.body.len(), 2);
        match &f.body[1] {
            Instr::IfElse {
                then_body,
                else_body,
                ..
            } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 2);
            }
            other => panic!("expected if_else, got {}", other),
        }
    }

    #[test]
    fn test_builder_frame_ids_sequential() {
        let mut b = FuncBuilder::new("main");
        let ty = TypeId(0);
        let f0 = b.alloc(ty);
        let f1 = b.alloc(ty);
        assert_eq!(f0, FrameId(0));
        assert_eq!(f1, FrameId(1));
    }
}
