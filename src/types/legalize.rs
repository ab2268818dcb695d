//! Type legalization: flattening aggregates into storable primitives.
//!
//! `TypeLowering` maps a type to the ordered sequence of scalar/vector
//! leaves the stack can actually read and write, together with a byte
//! layout (total size, alignment, per-member offsets). Results are
//! memoized per `TypeId`; queries are pure, so the cache only ever grows.

use std::collections::BTreeMap;

use super::{Scalar, Type, TypeId, TypeRegistry};
use crate::diagnostic::ErrorKind;

// ─── Layout descriptors ───────────────────────────────────────────

/// One flattened primitive leaf: a scalar or vector at a byte offset
/// relative to the start of the containing value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElemDesc {
    pub scalar: Scalar,
    pub lanes: u32,
    pub offset: u32,
}

impl ElemDesc {
    pub fn byte_size(&self) -> u32 {
        self.scalar.byte_size() * self.lanes
    }
}

/// Flattened layout of one legalized type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegalizedType {
    /// Primitive leaves in declaration order, ascending offsets.
    pub elements: Vec<ElemDesc>,
    pub byte_size: u32,
    pub byte_align: u32,
    /// Byte offset of each struct member; empty for non-structs.
    pub member_offsets: Vec<u32>,
    /// Element stride for arrays; zero otherwise.
    pub stride: u32,
}

impl LegalizedType {
    /// One-line layout summary, used by goldens and debugging.
    pub fn summary(&self) -> String {
        let elems: Vec<String> = self
            .elements
            .iter()
            .map(|e| format!("{}x{}@{}", e.scalar, e.lanes, e.offset))
            .collect();
        format!(
            "size={} align={} [{}]",
            self.byte_size,
            self.byte_align,
            elems.join(" ")
        )
    }
}

/// Round `offset` up to the next multiple of `align` (a power of two).
pub fn align_up(offset: u32, align: u32) -> u32 {
    (offset + align - 1) & !(align - 1)
}

// ─── Legalization cache ───────────────────────────────────────────

/// Memoized type flattening. One instance per lowering walk; never shared
/// across concurrently lowered units.
#[derive(Default)]
pub struct TypeLowering {
    cache: BTreeMap<TypeId, LegalizedType>,
}

impl TypeLowering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legalize `id`, computing and caching the layout on first query.
    ///
    /// Fails with `UnsupportedTypeKind` for a handle type (or an aggregate
    /// containing one): handles have no primitive decomposition.
    pub fn legalize(
        &mut self,
        registry: &TypeRegistry,
        id: TypeId,
    ) -> Result<&LegalizedType, ErrorKind> {
        self.ensure(registry, id)?;
        Ok(&self.cache[&id])
    }

    fn ensure(&mut self, registry: &TypeRegistry, id: TypeId) -> Result<(), ErrorKind> {
        if self.cache.contains_key(&id) {
            return Ok(());
        }
        let lowered = self.compute(registry, id)?;
        self.cache.insert(id, lowered);
        Ok(())
    }

    fn compute(&mut self, registry: &TypeRegistry, id: TypeId) -> Result<LegalizedType, ErrorKind> {
        match registry.get(id) {
            Type::Scalar(scalar) => {
                let size = scalar.byte_size();
                Ok(LegalizedType {
                    elements: vec![ElemDesc {
                        scalar: *scalar,
                        lanes: 1,
                        offset: 0,
                    }],
                    byte_size: size,
                    byte_align: size,
                    member_offsets: Vec::new(),
                    stride: 0,
                })
            }
            Type::Vector { elem, lanes } => {
                let size = elem.byte_size() * lanes;
                // Vectors align to the next power of two of their size, so
                // a vec3<f32> occupies 12 bytes but aligns to 16.
                Ok(LegalizedType {
                    elements: vec![ElemDesc {
                        scalar: *elem,
                        lanes: *lanes,
                        offset: 0,
                    }],
                    byte_size: size,
                    byte_align: size.next_power_of_two(),
                    member_offsets: Vec::new(),
                    stride: 0,
                })
            }
            Type::Struct { fields } => {
                let fields = fields.clone();
                let mut elements = Vec::new();
                let mut member_offsets = Vec::with_capacity(fields.len());
                let mut offset = 0u32;
                let mut align = 1u32;
                for field in fields {
                    self.ensure(registry, field)?;
                    let inner = &self.cache[&field];
                    let (size, falign) = (inner.byte_size, inner.byte_align);
                    offset = align_up(offset, falign);
                    member_offsets.push(offset);
                    for e in &inner.elements {
                        elements.push(ElemDesc {
                            offset: e.offset + offset,
                            ..*e
                        });
                    }
                    offset += size;
                    align = align.max(falign);
                }
                // Total size ends at the last member; no tail padding.
                Ok(LegalizedType {
                    elements,
                    byte_size: offset,
                    byte_align: align,
                    member_offsets,
                    stride: 0,
                })
            }
            Type::Array { elem, len } => {
                let (elem, len) = (*elem, *len);
                self.ensure(registry, elem)?;
                let inner = &self.cache[&elem];
                let stride = align_up(inner.byte_size, inner.byte_align);
                let byte_size = if len == 0 {
                    0
                } else {
                    stride * (len - 1) + inner.byte_size
                };
                let mut elements = Vec::with_capacity(inner.elements.len() * len as usize);
                for i in 0..len {
                    for e in &inner.elements {
                        elements.push(ElemDesc {
                            offset: e.offset + i * stride,
                            ..*e
                        });
                    }
                }
                Ok(LegalizedType {
                    elements,
                    byte_size,
                    byte_align: inner.byte_align,
                    member_offsets: Vec::new(),
                    stride,
                })
            }
            Type::Handle(_) => Err(ErrorKind::UnsupportedTypeKind { ty: id }),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
