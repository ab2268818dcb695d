//! Continuation-stack lowering for suspendable GPU shader pipelines.
//!
//! Shaders that suspend and resume keep their live state on a
//! continuation stack in scratch memory. Frontends describe that state
//! with abstract frame operations against source-level types; this
//! crate legalizes the types down to storable primitives, plans byte
//! layouts, and rewrites the abstract operations into explicit address
//! arithmetic and memory traffic. A small reference interpreter runs
//! the lowered form.
//!
//! The usual path: build functions with [`FuncBuilder`], intern types
//! in a [`TypeRegistry`], lower with [`lower_function`] or
//! [`lower_module`], and execute or print the result.

pub mod diagnostic;
pub mod ir;
pub mod lower;
pub mod runtime;
pub mod types;

pub use diagnostic::{render_errors, ErrorKind, LowerError};
pub use ir::builder::FuncBuilder;
pub use ir::display::listing;
pub use ir::{Function, Instr, Module, ValueId};
pub use lower::{lower_function, lower_module};
pub use runtime::{Machine, Val};
pub use types::{Scalar, Type, TypeId, TypeRegistry};
