//! Single-dispatch instruction walking.
//!
//! `walk_body` drives one sequential pass over an owned instruction
//! sequence, dispatching each abstract stack operation to the matching
//! `OpVisitor` handler and rebuilding the output sequence. The visitor
//! value is the walk's payload: all threaded state (stack-pointer value,
//! legalization cache, live frames) lives on it, borrowed exclusively for
//! the duration of the walk.
//!
//! Dispatch is closed over the abstract stack-op kinds plus structural
//! control flow; any other instruction kind falls through to
//! `visit_other`, which passes it along untouched by default — the walk
//! also traverses ordinary instructions it has no business transforming.

use crate::diagnostic::LowerError;
use crate::ir::{FrameId, Instr, ValueId};
use crate::types::TypeId;

pub trait OpVisitor {
    fn visit_alloc(
        &mut self,
        frame: FrameId,
        ty: TypeId,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>;

    fn visit_free(&mut self, frame: FrameId, out: &mut Vec<Instr>) -> Result<(), LowerError>;

    fn visit_store(
        &mut self,
        frame: FrameId,
        path: Vec<u32>,
        value: ValueId,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>;

    fn visit_load(
        &mut self,
        dest: ValueId,
        frame: FrameId,
        path: Vec<u32>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>;

    fn visit_get_stack_ptr(
        &mut self,
        dest: ValueId,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>;

    /// Branch with both arms. The default recurses into each body with no
    /// state forking; visitors that thread path-sensitive state override
    /// this to fork and re-join.
    fn visit_if_else(
        &mut self,
        cond: ValueId,
        then_body: Vec<Instr>,
        else_body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>
    where
        Self: Sized,
    {
        let then_body = walk_body(self, then_body)?;
        let else_body = walk_body(self, else_body)?;
        out.push(Instr::IfElse {
            cond,
            then_body,
            else_body,
        });
        Ok(())
    }

    fn visit_if_only(
        &mut self,
        cond: ValueId,
        then_body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>
    where
        Self: Sized,
    {
        let then_body = walk_body(self, then_body)?;
        out.push(Instr::IfOnly { cond, then_body });
        Ok(())
    }

    fn visit_loop(
        &mut self,
        count: u32,
        body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError>
    where
        Self: Sized,
    {
        let body = walk_body(self, body)?;
        out.push(Instr::Loop { count, body });
        Ok(())
    }

    /// Any instruction kind the dispatch table does not recognize.
    fn visit_other(&mut self, instr: Instr, out: &mut Vec<Instr>) -> Result<(), LowerError> {
        out.push(instr);
        Ok(())
    }
}

/// Walk one body, dispatching each instruction to its handler.
pub fn walk_body<V: OpVisitor>(
    visitor: &mut V,
    body: Vec<Instr>,
) -> Result<Vec<Instr>, LowerError> {
    let mut out = Vec::with_capacity(body.len());
    for instr in body {
        match instr {
            Instr::AllocFrame { frame, ty } => visitor.visit_alloc(frame, ty, &mut out)?,
            Instr::FreeFrame { frame } => visitor.visit_free(frame, &mut out)?,
            Instr::StoreField { frame, path, value } => {
                visitor.visit_store(frame, path, value, &mut out)?
            }
            Instr::LoadField { dest, frame, path } => {
                visitor.visit_load(dest, frame, path, &mut out)?
            }
            Instr::GetStackPtr { dest } => visitor.visit_get_stack_ptr(dest, &mut out)?,
            Instr::IfElse {
                cond,
                then_body,
                else_body,
            } => visitor.visit_if_else(cond, then_body, else_body, &mut out)?,
            Instr::IfOnly { cond, then_body } => {
                visitor.visit_if_only(cond, then_body, &mut out)?
            }
            Instr::Loop { count, body } => visitor.visit_loop(count, body, &mut out)?,
            other => visitor.visit_other(other, &mut out)?,
        }
    }
    Ok(out)
}
