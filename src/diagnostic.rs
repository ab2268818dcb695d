//! Lowering errors and their rendering.
//!
//! All four kinds are fatal to the unit being lowered: none are retried
//! and none are recovered mid-pass. The failing function is left exactly
//! as it was handed in.

use std::fmt;

use crate::ir::display::listing;
use crate::ir::{FrameId, Function};
use crate::types::TypeId;

/// What went wrong.
///
/// `UnsupportedTypeKind` and `UnknownField` surface from type
/// legalization and layout planning; `UnbalancedFrame` is malformed input
/// (a free with no matching live alloc on the path, or a reference to a
/// frame not live on the path); `DivergentStackPointerUnmerged` is a join
/// where no path-conditioned merge of the stack pointer can be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedTypeKind { ty: TypeId },
    UnknownField { ty: TypeId, path: Vec<u32> },
    UnbalancedFrame { frame: FrameId },
    DivergentStackPointerUnmerged,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnsupportedTypeKind { ty } => {
                write!(f, "type {} has no storable primitive decomposition", ty)
            }
            ErrorKind::UnknownField { ty, path } => {
                let path: Vec<String> = path.iter().map(|p| p.to_string()).collect();
                write!(
                    f,
                    "field path [{}] does not resolve against type {}",
                    path.join("."),
                    ty
                )
            }
            ErrorKind::UnbalancedFrame { frame } => {
                write!(f, "frame {} is not live on this path", frame)
            }
            ErrorKind::DivergentStackPointerUnmerged => {
                write!(
                    f,
                    "control-flow join reached with divergent stack pointers and no merge point"
                )
            }
        }
    }
}

/// A fatal lowering error, naming the unit and the offending operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerError {
    pub kind: ErrorKind,
    /// Name of the function being lowered.
    pub function: String,
    /// Rendered form of the offending instruction.
    pub op: String,
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lowering `{}` failed at `{}`: {}",
            self.function, self.op, self.kind
        )
    }
}

impl std::error::Error for LowerError {}

impl LowerError {
    /// Render the error to stderr using ariadne, laid over the function's
    /// IR listing with the offending instruction labeled.
    pub fn render(&self, function: &Function) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let source = listing(function);
        let span = find_op_span(&source, &self.op);
        let name = self.function.as_str();

        Report::build(ReportKind::Error, name, span.start)
            .with_message(self.kind.to_string())
            .with_label(
                Label::new((name, span))
                    .with_message(format!("while lowering `{}`", self.op))
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((name, Source::from(source.as_str())))
            .unwrap();
    }
}

/// Byte range of the first listing line matching the offending op.
fn find_op_span(source: &str, op: &str) -> std::ops::Range<usize> {
    let mut start = 0usize;
    for line in source.lines() {
        let text = line.trim();
        // Structural ops appear as headers ("loop x2:") in the listing.
        if text == op || text.strip_suffix(':') == Some(op) {
            return start..start + line.len();
        }
        start += line.len() + 1;
    }
    0..0
}

/// Render a list of lowering errors against their functions.
pub fn render_errors(errors: &[LowerError], functions: &[Function]) {
    for err in errors {
        if let Some(f) = functions.iter().find(|f| f.name == err.function) {
            err.render(f);
        } else {
            eprintln!("{}", err);
        }
    }
}
