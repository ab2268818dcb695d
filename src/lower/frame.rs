//! Stack layout planning: frame sizes and field-path offsets.

use crate::diagnostic::ErrorKind;
use crate::types::legalize::TypeLowering;
use crate::types::{Type, TypeId, TypeRegistry};

/// Byte requirements of one logical continuation-stack frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub byte_size: u32,
    pub byte_align: u32,
}

/// Compute the byte size and alignment of a frame holding `ty`.
pub fn plan_frame(
    types: &mut TypeLowering,
    registry: &TypeRegistry,
    ty: TypeId,
) -> Result<FrameDescriptor, ErrorKind> {
    let lowered = types.legalize(registry, ty)?;
    Ok(FrameDescriptor {
        byte_size: lowered.byte_size,
        byte_align: lowered.byte_align,
    })
}

/// Resolve a field path against a frame type: byte offset from the frame
/// base plus the type stored at that slot. An empty path is the whole
/// frame. A path that does not resolve is `UnknownField` — always a
/// defect in the caller, never a runtime condition.
pub fn plan_slot(
    types: &mut TypeLowering,
    registry: &TypeRegistry,
    ty: TypeId,
    path: &[u32],
) -> Result<(u32, TypeId), ErrorKind> {
    let unknown = || ErrorKind::UnknownField {
        ty,
        path: path.to_vec(),
    };
    let mut cur = ty;
    let mut offset = 0u32;
    for &step in path {
        match registry.get(cur) {
            Type::Struct { fields } => {
                let field = *fields.get(step as usize).ok_or_else(unknown)?;
                let lowered = types.legalize(registry, cur)?;
                offset += lowered.member_offsets[step as usize];
                cur = field;
            }
            Type::Array { elem, len } => {
                if step >= *len {
                    return Err(unknown());
                }
                let elem = *elem;
                let lowered = types.legalize(registry, cur)?;
                offset += lowered.stride * step;
                cur = elem;
            }
            // Paths cannot descend into scalars, vectors, or handles.
            _ => return Err(unknown()),
        }
    }
    Ok((offset, cur))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;

    fn scene() -> (TypeRegistry, TypeId) {
        let mut reg = TypeRegistry::new();
        let i32t = reg.scalar(Scalar::I32);
        let v3 = reg.vector(Scalar::F32, 3);
        let hit = reg.struct_(vec![i32t, v3]);
        let payload = reg.array(hit, 2);
        let frame = reg.struct_(vec![i32t, payload]);
        (reg, frame)
    }

    #[test]
    fn test_plan_frame() {
        let (reg, frame) = scene();
        let mut types = TypeLowering::new();
        let fd = plan_frame(&mut types, &reg, frame).unwrap();
        // i32 @0, then [hit; 2] aligned to 16: stride 32 -> 60 bytes.
        assert_eq!(fd.byte_align, 16);
        assert_eq!(fd.byte_size, 16 + 60);
    }

    #[test]
    fn test_plan_slot_nested() {
        let (reg, frame) = scene();
        let mut types = TypeLowering::new();
        // frame.1[1].1 -> payload element 1, vec3 member.
        let (offset, ty) = plan_slot(&mut types, &reg, frame, &[1, 1, 1]).unwrap();
        assert_eq!(offset, 16 + 32 + 16);
        assert_eq!(reg.describe(ty), "f32x3");
    }

    #[test]
    fn test_plan_slot_root() {
        let (reg, frame) = scene();
        let mut types = TypeLowering::new();
        let (offset, ty) = plan_slot(&mut types, &reg, frame, &[]).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(ty, frame);
    }

    #[test]
    fn test_plan_slot_out_of_range() {
        let (reg, frame) = scene();
        let mut types = TypeLowering::new();
        let err = plan_slot(&mut types, &reg, frame, &[2]).unwrap_err();
        assert!(matches!(err, ErrorKind::UnknownField { .. }));
        // Array index past the end.
        let err = plan_slot(&mut types, &reg, frame, &[1, 2]).unwrap_err();
        assert!(matches!(err, ErrorKind::UnknownField { .. }));
    }

    #[test]
    fn test_plan_slot_descends_into_scalar() {
        let (reg, frame) = scene();
        let mut types = TypeLowering::new();
        let err = plan_slot(&mut types, &reg, frame, &[0, 0]).unwrap_err();
        assert!(matches!(err, ErrorKind::UnknownField { .. }));
    }
}
