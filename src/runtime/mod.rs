//! Reference interpreter for lowered functions.
//!
//! Executes the explicit form only: address arithmetic, stack memory
//! traffic, selects, and the pass-through vocabulary. Abstract stack
//! operations are a hard error here, which makes the interpreter a
//! check that lowering left none behind. Memory is a flat byte region
//! addressed by offsets from zero; the stack pointer enters as an
//! ordinary integer value bound to the function's pointer id.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;

use crate::ir::{BinOp, Elem, Function, Instr, ValueId};
use crate::types::{Scalar, Type, TypeRegistry};

const MEMORY_BYTES: usize = 1 << 16;

// ─── Values ───────────────────────────────────────────────────────

/// A runtime value. Vectors keep per-lane scalars; aggregates keep
/// their parts in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    Int(i64),
    Float(f64),
    Vector(Vec<Val>),
    Agg(Vec<Val>),
}

impl Val {
    fn as_int(&self) -> Result<i64, EvalError> {
        match self {
            Val::Int(v) => Ok(*v),
            other => Err(EvalError::TypeMismatch(format!(
                "expected integer, found {:?}",
                other
            ))),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    /// An abstract stack operation reached execution.
    Unlowered(String),
    UndefinedValue(ValueId),
    OutOfBounds { addr: i64, len: u32 },
    TypeMismatch(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Unlowered(op) => {
                write!(f, "abstract operation `{}` reached the interpreter", op)
            }
            EvalError::UndefinedValue(v) => write!(f, "value {} read before definition", v),
            EvalError::OutOfBounds { addr, len } => {
                write!(f, "access of {} bytes at address {} is out of bounds", len, addr)
            }
            EvalError::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

// ─── Machine ──────────────────────────────────────────────────────

pub struct Machine<'a> {
    registry: &'a TypeRegistry,
    memory: Vec<u8>,
    values: HashMap<ValueId, Val>,
    output: Vec<Val>,
}

impl<'a> Machine<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            memory: vec![0; MEMORY_BYTES],
            values: HashMap::new(),
            output: Vec::new(),
        }
    }

    /// Run a lowered function with the given incoming stack pointer and
    /// return everything it emitted through `Output`.
    pub fn run(&mut self, function: &Function, initial_sp: i64) -> Result<Vec<Val>, EvalError> {
        self.values.clear();
        self.output.clear();
        self.values.insert(function.stack_ptr, Val::Int(initial_sp));
        self.exec_body(&function.body)?;
        Ok(std::mem::take(&mut self.output))
    }

    /// The backing byte region, for inspecting frame contents.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn value(&self, id: ValueId) -> Result<Val, EvalError> {
        self.values
            .get(&id)
            .cloned()
            .ok_or(EvalError::UndefinedValue(id))
    }

    fn int(&self, id: ValueId) -> Result<i64, EvalError> {
        self.value(id)?.as_int()
    }

    fn exec_body(&mut self, body: &[Instr]) -> Result<(), EvalError> {
        for instr in body {
            self.exec(instr)?;
        }
        Ok(())
    }

    fn exec(&mut self, instr: &Instr) -> Result<(), EvalError> {
        match instr {
            Instr::ConstInt { dest, value, .. } => {
                self.values.insert(*dest, Val::Int(*value));
            }
            Instr::ConstFloat { dest, value, .. } => {
                self.values.insert(*dest, Val::Float(*value));
            }
            Instr::BinOp { dest, op, lhs, rhs } => {
                let result = self.binop(*op, *lhs, *rhs)?;
                self.values.insert(*dest, result);
            }
            Instr::MakeAggregate { dest, ty, parts } => {
                let parts = parts
                    .iter()
                    .map(|p| self.value(*p))
                    .collect::<Result<Vec<_>, _>>()?;
                let val = match self.registry.get(*ty) {
                    Type::Vector { .. } => Val::Vector(parts),
                    _ => Val::Agg(parts),
                };
                self.values.insert(*dest, val);
            }
            Instr::ExtractField { dest, value, index } => {
                let parts = match self.value(*value)? {
                    Val::Agg(parts) | Val::Vector(parts) => parts,
                    other => {
                        return Err(EvalError::TypeMismatch(format!(
                            "extract from non-aggregate {:?}",
                            other
                        )))
                    }
                };
                let part = parts.get(*index as usize).cloned().ok_or_else(|| {
                    EvalError::TypeMismatch(format!("extract index {} out of range", index))
                })?;
                self.values.insert(*dest, part);
            }
            Instr::Output { value } => {
                let v = self.value(*value)?;
                self.output.push(v);
            }
            Instr::AlignUp { dest, value, align } => {
                let v = self.int(*value)?;
                let a = *align as i64;
                self.values.insert(*dest, Val::Int((v + a - 1) & !(a - 1)));
            }
            Instr::OffsetAdd { dest, base, amount } => {
                let v = self.int(*base)?;
                self.values.insert(*dest, Val::Int(v + *amount as i64));
            }
            Instr::StackStore {
                addr,
                offset,
                elem,
                value,
            } => {
                let base = self.int(*addr)?;
                let v = self.value(*value)?;
                self.store_elem(base + *offset as i64, *elem, &v)?;
            }
            Instr::StackLoad {
                dest,
                addr,
                offset,
                elem,
            } => {
                let base = self.int(*addr)?;
                let v = self.load_elem(base + *offset as i64, *elem)?;
                self.values.insert(*dest, v);
            }
            Instr::Select {
                dest,
                cond,
                on_true,
                on_false,
            } => {
                // Only the taken operand is read.
                let chosen = if self.int(*cond)? != 0 {
                    *on_true
                } else {
                    *on_false
                };
                let v = self.value(chosen)?;
                self.values.insert(*dest, v);
            }
            Instr::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                if self.int(*cond)? != 0 {
                    self.exec_body(then_body)?;
                } else {
                    self.exec_body(else_body)?;
                }
            }
            Instr::IfOnly { cond, then_body } => {
                if self.int(*cond)? != 0 {
                    self.exec_body(then_body)?;
                }
            }
            Instr::Loop { count, body } => {
                for _ in 0..*count {
                    self.exec_body(body)?;
                }
            }
            Instr::AllocFrame { .. }
            | Instr::FreeFrame { .. }
            | Instr::StoreField { .. }
            | Instr::LoadField { .. }
            | Instr::GetStackPtr { .. } => {
                return Err(EvalError::Unlowered(instr.to_string()));
            }
        }
        Ok(())
    }

    fn binop(&self, op: BinOp, lhs: ValueId, rhs: ValueId) -> Result<Val, EvalError> {
        let (l, r) = (self.value(lhs)?, self.value(rhs)?);
        match (l, r) {
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Eq => (a == b) as i64,
                BinOp::Lt => (a < b) as i64,
                BinOp::And => ((a != 0) && (b != 0)) as i64,
                BinOp::Or => ((a != 0) || (b != 0)) as i64,
            })),
            (Val::Float(a), Val::Float(b)) => match op {
                BinOp::Add => Ok(Val::Float(a + b)),
                BinOp::Sub => Ok(Val::Float(a - b)),
                BinOp::Mul => Ok(Val::Float(a * b)),
                BinOp::Eq => Ok(Val::Int((a == b) as i64)),
                BinOp::Lt => Ok(Val::Int((a < b) as i64)),
                BinOp::And | BinOp::Or => Err(EvalError::TypeMismatch(
                    "logical operation on floats".into(),
                )),
            },
            (l, r) => Err(EvalError::TypeMismatch(format!(
                "operands {:?} and {:?} do not match",
                l, r
            ))),
        }
    }

    // ─── Memory ───────────────────────────────────────────────────

    fn span(&self, addr: i64, elem: Elem) -> Result<usize, EvalError> {
        let len = elem.scalar.byte_size() * elem.lanes;
        let end = addr.checked_add(len as i64);
        if addr < 0 || end.map(|e| e as usize > self.memory.len()).unwrap_or(true) {
            return Err(EvalError::OutOfBounds { addr, len });
        }
        Ok(addr as usize)
    }

    fn store_elem(&mut self, addr: i64, elem: Elem, value: &Val) -> Result<(), EvalError> {
        let start = self.span(addr, elem)?;
        let lane_size = elem.scalar.byte_size() as usize;
        let lanes: Vec<&Val> = match (elem.lanes, value) {
            (1, v) => vec![v],
            (n, Val::Vector(parts)) if parts.len() == n as usize => parts.iter().collect(),
            (n, other) => {
                return Err(EvalError::TypeMismatch(format!(
                    "store of {:?} into {} lanes",
                    other, n
                )))
            }
        };
        for (i, lane) in lanes.into_iter().enumerate() {
            let at = start + i * lane_size;
            encode_lane(&mut self.memory[at..at + lane_size], elem.scalar, lane)?;
        }
        Ok(())
    }

    fn load_elem(&self, addr: i64, elem: Elem) -> Result<Val, EvalError> {
        let start = self.span(addr, elem)?;
        let lane_size = elem.scalar.byte_size() as usize;
        let mut lanes = Vec::with_capacity(elem.lanes as usize);
        for i in 0..elem.lanes as usize {
            let at = start + i * lane_size;
            lanes.push(decode_lane(&self.memory[at..at + lane_size], elem.scalar));
        }
        if elem.lanes == 1 {
            Ok(lanes.pop().unwrap_or(Val::Int(0)))
        } else {
            Ok(Val::Vector(lanes))
        }
    }
}

fn encode_lane(buf: &mut [u8], scalar: Scalar, value: &Val) -> Result<(), EvalError> {
    match scalar {
        Scalar::F32 => {
            let v = match value {
                Val::Float(f) => *f as f32,
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "store of {:?} as f32",
                        other
                    )))
                }
            };
            buf.copy_from_slice(&v.to_le_bytes());
        }
        Scalar::F64 => {
            let v = match value {
                Val::Float(f) => *f,
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "store of {:?} as f64",
                        other
                    )))
                }
            };
            buf.copy_from_slice(&v.to_le_bytes());
        }
        _ => {
            let v = value.as_int()?;
            buf.copy_from_slice(&v.to_le_bytes()[..buf.len()]);
        }
    }
    Ok(())
}

fn decode_lane(buf: &[u8], scalar: Scalar) -> Val {
    match scalar {
        Scalar::F32 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(buf);
            Val::Float(f32::from_le_bytes(bytes) as f64)
        }
        Scalar::F64 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(buf);
            Val::Float(f64::from_le_bytes(bytes))
        }
        _ => {
            // Sign-extend through the top byte.
            let mut bytes = if !buf.is_empty() && buf[buf.len() - 1] & 0x80 != 0 {
                [0xff; 8]
            } else {
                [0u8; 8]
            };
            bytes[..buf.len()].copy_from_slice(buf);
            Val::Int(i64::from_le_bytes(bytes))
        }
    }
}
