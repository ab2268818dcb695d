//! Continuation-stack lowering.
//!
//! Rewrites abstract stack operations into explicit address arithmetic and
//! memory traffic against a flat stack region growing toward higher
//! addresses. The stack pointer is a byte offset from the fixed stack
//! base, threaded functionally: each operation consumes the current value
//! and produces the next, so divergent branches each see a locally
//! consistent pointer and joins reconcile with an explicit `Select`.
//!
//! Per operation:
//! - `AllocFrame` becomes `AlignUp` (frame base) + `OffsetAdd` (new stack
//!   pointer); the frame reference binds to the base value.
//! - `FreeFrame` restores the pointer value saved at the matching alloc.
//!   Strictly LIFO per path; no instructions are emitted.
//! - `StoreField`/`LoadField` become per-leaf `StackStore`/`StackLoad` at
//!   `frame base + member offset`, splitting and reassembling aggregates.
//! - `GetStackPtr` is replaced by the current pointer value outright.
//!
//! Lowering a function either completes or fails atomically: on error the
//! function is left untouched.

mod frame;
mod visit;

pub use frame::{plan_frame, plan_slot, FrameDescriptor};
pub use visit::{walk_body, OpVisitor};

use std::collections::HashMap;

use rayon::prelude::*;

use crate::diagnostic::{ErrorKind, LowerError};
use crate::ir::{Elem, FrameId, Function, Instr, Module, ValueId};
use crate::types::legalize::TypeLowering;
use crate::types::{Type, TypeId, TypeRegistry};

// ─── Pass state ───────────────────────────────────────────────────

/// A frame currently live on the walked path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LiveFrame {
    id: FrameId,
    ty: TypeId,
    /// Value holding the frame's base address.
    base: ValueId,
    /// Stack-pointer value to restore when this frame is freed.
    saved_sp: ValueId,
}

/// The lowering walk's payload: threaded stack-pointer value, live-frame
/// stack, legalization cache, and the value substitution map produced by
/// `GetStackPtr`/`LoadField` replacement. Exclusively owned by one walk.
pub struct StackLowering<'a> {
    registry: &'a TypeRegistry,
    types: TypeLowering,
    function: String,
    sp: ValueId,
    frames: Vec<LiveFrame>,
    subst: HashMap<ValueId, ValueId>,
    next_value: u32,
}

impl<'a> StackLowering<'a> {
    fn new(registry: &'a TypeRegistry, function: &Function) -> Self {
        Self {
            registry,
            types: TypeLowering::new(),
            function: function.name.clone(),
            sp: function.stack_ptr,
            frames: Vec::new(),
            subst: HashMap::new(),
            next_value: function.next_value,
        }
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Map a value through the substitution produced so far.
    fn resolve(&self, v: ValueId) -> ValueId {
        self.subst.get(&v).copied().unwrap_or(v)
    }

    fn err(&self, kind: ErrorKind, op: String) -> LowerError {
        LowerError {
            kind,
            function: self.function.clone(),
            op,
        }
    }

    fn live_frame(&self, frame: FrameId) -> Option<LiveFrame> {
        self.frames.iter().copied().find(|f| f.id == frame)
    }

    /// Rewrite every operand of a pass-through instruction.
    fn rewrite_operands(&self, instr: &mut Instr) {
        match instr {
            Instr::BinOp { lhs, rhs, .. } => {
                *lhs = self.resolve(*lhs);
                *rhs = self.resolve(*rhs);
            }
            Instr::MakeAggregate { parts, .. } => {
                for p in parts.iter_mut() {
                    *p = self.resolve(*p);
                }
            }
            Instr::ExtractField { value, .. } => *value = self.resolve(*value),
            Instr::Output { value } => *value = self.resolve(*value),
            Instr::AlignUp { value, .. } => *value = self.resolve(*value),
            Instr::OffsetAdd { base, .. } => *base = self.resolve(*base),
            Instr::StackStore { addr, value, .. } => {
                *addr = self.resolve(*addr);
                *value = self.resolve(*value);
            }
            Instr::StackLoad { addr, .. } => *addr = self.resolve(*addr),
            Instr::Select {
                cond,
                on_true,
                on_false,
                ..
            } => {
                *cond = self.resolve(*cond);
                *on_true = self.resolve(*on_true);
                *on_false = self.resolve(*on_false);
            }
            _ => {}
        }
    }

    /// Split `value` of type `ty` into leaf stores at `base + offset`.
    fn emit_store(
        &mut self,
        value: ValueId,
        ty: TypeId,
        base: ValueId,
        offset: u32,
        out: &mut Vec<Instr>,
    ) -> Result<(), ErrorKind> {
        let registry = self.registry;
        match registry.get(ty) {
            Type::Scalar(_) | Type::Vector { .. } => {
                let elem = leaf_elem(registry.get(ty));
                out.push(Instr::StackStore {
                    addr: base,
                    offset,
                    elem,
                    value,
                });
                Ok(())
            }
            Type::Struct { fields } => {
                let fields = fields.clone();
                let offsets = self.types.legalize(registry, ty)?.member_offsets.clone();
                for (i, field) in fields.into_iter().enumerate() {
                    let part = self.fresh();
                    out.push(Instr::ExtractField {
                        dest: part,
                        value,
                        index: i as u32,
                    });
                    self.emit_store(part, field, base, offset + offsets[i], out)?;
                }
                Ok(())
            }
            Type::Array { elem, len } => {
                let (elem, len) = (*elem, *len);
                let stride = self.types.legalize(registry, ty)?.stride;
                for i in 0..len {
                    let part = self.fresh();
                    out.push(Instr::ExtractField {
                        dest: part,
                        value,
                        index: i,
                    });
                    self.emit_store(part, elem, base, offset + i * stride, out)?;
                }
                Ok(())
            }
            Type::Handle(_) => Err(ErrorKind::UnsupportedTypeKind { ty }),
        }
    }

    /// Reassemble a value of type `ty` from leaf loads at `base + offset`.
    fn emit_load(
        &mut self,
        ty: TypeId,
        base: ValueId,
        offset: u32,
        out: &mut Vec<Instr>,
    ) -> Result<ValueId, ErrorKind> {
        let registry = self.registry;
        match registry.get(ty) {
            Type::Scalar(_) | Type::Vector { .. } => {
                let elem = leaf_elem(registry.get(ty));
                let dest = self.fresh();
                out.push(Instr::StackLoad {
                    dest,
                    addr: base,
                    offset,
                    elem,
                });
                Ok(dest)
            }
            Type::Struct { fields } => {
                let fields = fields.clone();
                let offsets = self.types.legalize(registry, ty)?.member_offsets.clone();
                let mut parts = Vec::with_capacity(fields.len());
                for (i, field) in fields.into_iter().enumerate() {
                    parts.push(self.emit_load(field, base, offset + offsets[i], out)?);
                }
                let dest = self.fresh();
                out.push(Instr::MakeAggregate { dest, ty, parts });
                Ok(dest)
            }
            Type::Array { elem, len } => {
                let (elem, len) = (*elem, *len);
                let stride = self.types.legalize(registry, ty)?.stride;
                let mut parts = Vec::with_capacity(len as usize);
                for i in 0..len {
                    parts.push(self.emit_load(elem, base, offset + i * stride, out)?);
                }
                let dest = self.fresh();
                out.push(Instr::MakeAggregate { dest, ty, parts });
                Ok(dest)
            }
            Type::Handle(_) => Err(ErrorKind::UnsupportedTypeKind { ty }),
        }
    }

    /// Reconcile live frames after a branch join: only frames identical
    /// on both paths stay addressable.
    fn join_frames(then_frames: Vec<LiveFrame>, else_frames: &[LiveFrame]) -> Vec<LiveFrame> {
        then_frames
            .into_iter()
            .zip(else_frames)
            .take_while(|(a, b)| a == *b)
            .map(|(a, _)| a)
            .collect()
    }

    /// Merge the two path stack pointers, inserting a `Select` keyed on
    /// the branch condition when they differ.
    fn join_sp(
        &mut self,
        cond: ValueId,
        then_sp: ValueId,
        else_sp: ValueId,
        out: &mut Vec<Instr>,
    ) {
        if then_sp == else_sp {
            self.sp = then_sp;
        } else {
            let merged = self.fresh();
            out.push(Instr::Select {
                dest: merged,
                cond,
                on_true: then_sp,
                on_false: else_sp,
            });
            self.sp = merged;
        }
    }
}

fn leaf_elem(ty: &Type) -> Elem {
    match ty {
        Type::Scalar(s) => Elem {
            scalar: *s,
            lanes: 1,
        },
        Type::Vector { elem, lanes } => Elem {
            scalar: *elem,
            lanes: *lanes,
        },
        // Callers only ask for leaves.
        _ => unreachable!("aggregate has no leaf element"),
    }
}

// ─── Handlers ─────────────────────────────────────────────────────

impl OpVisitor for StackLowering<'_> {
    fn visit_alloc(
        &mut self,
        frame: FrameId,
        ty: TypeId,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let desc = plan_frame(&mut self.types, self.registry, ty)
            .map_err(|kind| self.err(kind, Instr::AllocFrame { frame, ty }.to_string()))?;
        let base = self.fresh();
        out.push(Instr::AlignUp {
            dest: base,
            value: self.sp,
            align: desc.byte_align,
        });
        let new_sp = self.fresh();
        out.push(Instr::OffsetAdd {
            dest: new_sp,
            base,
            amount: desc.byte_size,
        });
        self.frames.push(LiveFrame {
            id: frame,
            ty,
            base,
            saved_sp: self.sp,
        });
        self.sp = new_sp;
        Ok(())
    }

    fn visit_free(&mut self, frame: FrameId, _out: &mut Vec<Instr>) -> Result<(), LowerError> {
        let on_top = self.frames.last().map(|f| f.id == frame).unwrap_or(false);
        if !on_top {
            return Err(self.err(
                ErrorKind::UnbalancedFrame { frame },
                Instr::FreeFrame { frame }.to_string(),
            ));
        }
        if let Some(freed) = self.frames.pop() {
            self.sp = freed.saved_sp;
        }
        Ok(())
    }

    fn visit_store(
        &mut self,
        frame: FrameId,
        path: Vec<u32>,
        value: ValueId,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let op = || {
            Instr::StoreField {
                frame,
                path: path.clone(),
                value,
            }
            .to_string()
        };
        let live = self
            .live_frame(frame)
            .ok_or_else(|| self.err(ErrorKind::UnbalancedFrame { frame }, op()))?;
        let (offset, slot_ty) = plan_slot(&mut self.types, self.registry, live.ty, &path)
            .map_err(|kind| self.err(kind, op()))?;
        let value = self.resolve(value);
        self.emit_store(value, slot_ty, live.base, offset, out)
            .map_err(|kind| self.err(kind, op()))
    }

    fn visit_load(
        &mut self,
        dest: ValueId,
        frame: FrameId,
        path: Vec<u32>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let op = || {
            Instr::LoadField {
                dest,
                frame,
                path: path.clone(),
            }
            .to_string()
        };
        let live = self
            .live_frame(frame)
            .ok_or_else(|| self.err(ErrorKind::UnbalancedFrame { frame }, op()))?;
        let (offset, slot_ty) = plan_slot(&mut self.types, self.registry, live.ty, &path)
            .map_err(|kind| self.err(kind, op()))?;
        let loaded = self
            .emit_load(slot_ty, live.base, offset, out)
            .map_err(|kind| self.err(kind, op()))?;
        self.subst.insert(dest, loaded);
        Ok(())
    }

    fn visit_get_stack_ptr(
        &mut self,
        dest: ValueId,
        _out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        // No instruction: uses of `dest` read the threaded pointer value.
        self.subst.insert(dest, self.sp);
        Ok(())
    }

    fn visit_if_else(
        &mut self,
        cond: ValueId,
        then_body: Vec<Instr>,
        else_body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let cond = self.resolve(cond);
        let entry_sp = self.sp;
        let entry_frames = self.frames.clone();

        let then_body = walk_body(self, then_body)?;
        let then_sp = self.sp;
        let then_frames = std::mem::replace(&mut self.frames, entry_frames);
        self.sp = entry_sp;

        let else_body = walk_body(self, else_body)?;
        let else_sp = self.sp;
        let else_frames = std::mem::take(&mut self.frames);

        out.push(Instr::IfElse {
            cond,
            then_body,
            else_body,
        });
        self.frames = Self::join_frames(then_frames, &else_frames);
        self.join_sp(cond, then_sp, else_sp, out);
        Ok(())
    }

    fn visit_if_only(
        &mut self,
        cond: ValueId,
        then_body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let cond = self.resolve(cond);
        let entry_sp = self.sp;
        let entry_frames = self.frames.clone();

        let then_body = walk_body(self, then_body)?;
        let then_sp = self.sp;
        let then_frames = std::mem::replace(&mut self.frames, entry_frames.clone());
        self.sp = entry_sp;

        out.push(Instr::IfOnly { cond, then_body });
        self.frames = Self::join_frames(then_frames, &entry_frames);
        self.join_sp(cond, then_sp, entry_sp, out);
        Ok(())
    }

    fn visit_loop(
        &mut self,
        count: u32,
        body: Vec<Instr>,
        out: &mut Vec<Instr>,
    ) -> Result<(), LowerError> {
        let entry_sp = self.sp;
        let entry_frames = self.frames.clone();

        let body = walk_body(self, body)?;

        // The back edge is a join with no merge point: the body must
        // leave the stack pointer and live frames exactly as it found
        // them, or offsets would differ between iterations.
        if self.sp != entry_sp || self.frames != entry_frames {
            return Err(self.err(
                ErrorKind::DivergentStackPointerUnmerged,
                format!("loop x{}", count),
            ));
        }
        out.push(Instr::Loop { count, body });
        Ok(())
    }

    fn visit_other(&mut self, mut instr: Instr, out: &mut Vec<Instr>) -> Result<(), LowerError> {
        self.rewrite_operands(&mut instr);
        out.push(instr);
        Ok(())
    }
}

// ─── Entry points ─────────────────────────────────────────────────

/// Lower one function in place. Atomic: on error the function is
/// unmodified and the error names the unit and offending operation.
pub fn lower_function(function: &mut Function, registry: &TypeRegistry) -> Result<(), LowerError> {
    let mut pass = StackLowering::new(registry, function);
    let lowered = walk_body(&mut pass, function.body.clone())?;
    function.body = lowered;
    function.next_value = pass.next_value;
    Ok(())
}

/// Lower every function of a module, one worker per function. Each worker
/// owns a private payload (stack pointer, caches); nothing mutable is
/// shared across units. Errors are reported in function order.
pub fn lower_module(module: &mut Module, registry: &TypeRegistry) -> Result<(), Vec<LowerError>> {
    let errors: Vec<LowerError> = module
        .functions
        .par_iter_mut()
        .filter_map(|f| lower_function(f, registry).err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
