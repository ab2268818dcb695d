//! Shader value types and the interning registry.
//!
//! Types are arena-allocated: a `TypeId` is an index into a `TypeRegistry`.
//! The registry deduplicates by content hash, so a structurally equal type
//! always resolves to the same id — layout queries keyed by `TypeId` are
//! therefore keyed by structural identity, not construction order.

pub mod legalize;

use std::collections::HashMap;
use std::fmt;

// ─── Scalars ──────────────────────────────────────────────────────

/// Primitive scalar kinds the storage layer can read and write directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Scalar {
    /// Natural byte size; alignment is the same.
    pub fn byte_size(self) -> u32 {
        match self {
            Scalar::Bool | Scalar::I8 => 1,
            Scalar::I16 => 2,
            Scalar::I32 | Scalar::F32 => 4,
            Scalar::I64 | Scalar::F64 => 8,
        }
    }

    pub fn bit_width(self) -> u32 {
        self.byte_size() * 8
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scalar::Bool => "bool",
            Scalar::I8 => "i8",
            Scalar::I16 => "i16",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

// ─── Types ────────────────────────────────────────────────────────

/// A source-level value type.
///
/// `Handle` is an opaque resource binding (texture, sampler, acceleration
/// structure). Handles have no primitive decomposition and can never be
/// spilled to the continuation stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Scalar(Scalar),
    Vector { elem: Scalar, lanes: u32 },
    Array { elem: TypeId, len: u32 },
    Struct { fields: Vec<TypeId> },
    Handle(String),
}

/// Arena index of an interned type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ─── Registry ─────────────────────────────────────────────────────

/// Interning arena for types.
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<Type>,
    interned: HashMap<[u8; 32], TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the id of the structurally equal entry if
    /// one already exists.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        let key = fingerprint(&ty);
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.interned.insert(key, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ── Construction helpers ──

    pub fn scalar(&mut self, scalar: Scalar) -> TypeId {
        self.intern(Type::Scalar(scalar))
    }

    pub fn vector(&mut self, elem: Scalar, lanes: u32) -> TypeId {
        self.intern(Type::Vector { elem, lanes })
    }

    pub fn array(&mut self, elem: TypeId, len: u32) -> TypeId {
        self.intern(Type::Array { elem, len })
    }

    pub fn struct_(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.intern(Type::Struct { fields })
    }

    pub fn handle(&mut self, name: &str) -> TypeId {
        self.intern(Type::Handle(name.to_string()))
    }

    /// Human-readable rendering, e.g. `{ i32, f32x3 }` or `[i8; 4]`.
    pub fn describe(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Scalar(s) => s.to_string(),
            Type::Vector { elem, lanes } => format!("{}x{}", elem, lanes),
            Type::Array { elem, len } => format!("[{}; {}]", self.describe(*elem), len),
            Type::Struct { fields } => {
                let parts: Vec<_> = fields.iter().map(|f| self.describe(*f)).collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Type::Handle(name) => format!("handle<{}>", name),
        }
    }
}

/// Content hash of a type's structure. Child types are identified by their
/// (already interned) arena ids, so equal structure means equal hash within
/// one registry.
fn fingerprint(ty: &Type) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    match ty {
        Type::Scalar(s) => {
            hasher.update(&[0, *s as u8]);
        }
        Type::Vector { elem, lanes } => {
            hasher.update(&[1, *elem as u8]);
            hasher.update(&lanes.to_le_bytes());
        }
        Type::Array { elem, len } => {
            hasher.update(&[2]);
            hasher.update(&elem.0.to_le_bytes());
            hasher.update(&len.to_le_bytes());
        }
        Type::Struct { fields } => {
            hasher.update(&[3]);
            hasher.update(&(fields.len() as u32).to_le_bytes());
            for f in fields {
                hasher.update(&f.0.to_le_bytes());
            }
        }
        Type::Handle(name) => {
            hasher.update(&[4]);
            hasher.update(name.as_bytes());
        }
    }
    *hasher.finalize().as_bytes()
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(Scalar::Bool.byte_size(), 1);
        assert_eq!(Scalar::I16.byte_size(), 2);
        assert_eq!(Scalar::I32.byte_size(), 4);
        assert_eq!(Scalar::F64.byte_size(), 8);
        assert_eq!(Scalar::I64.bit_width(), 64);
    }

    #[test]
    fn test_interning_dedup() {
        let mut reg = TypeRegistry::new();
        let a = reg.scalar(Scalar::I32);
        let b = reg.scalar(Scalar::I32);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);

        let v1 = reg.vector(Scalar::F32, 3);
        let v2 = reg.vector(Scalar::F32, 3);
        assert_eq!(v1, v2);
        assert_ne!(a, v1);
    }

    #[test]
    fn test_interning_nested() {
        let mut reg = TypeRegistry::new();
        let i32t = reg.scalar(Scalar::I32);
        let v3 = reg.vector(Scalar::F32, 3);
        let s1 = reg.struct_(vec![i32t, v3]);
        let s2 = reg.struct_(vec![i32t, v3]);
        assert_eq!(s1, s2);
        let s3 = reg.struct_(vec![v3, i32t]);
        assert_ne!(s1, s3);
    }

    #[test]
    fn test_describe() {
        let mut reg = TypeRegistry::new();
        let i32t = reg.scalar(Scalar::I32);
        let v3 = reg.vector(Scalar::F32, 3);
        let s = reg.struct_(vec![i32t, v3]);
        let a = reg.array(s, 2);
        let h = reg.handle("Texture2D");
        assert_eq!(reg.describe(s), "{ i32, f32x3 }");
        assert_eq!(reg.describe(a), "[{ i32, f32x3 }; 2]");
        assert_eq!(reg.describe(h), "handle<Texture2D>");
    }
}
