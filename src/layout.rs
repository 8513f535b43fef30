//! Byte size/offset computation shared by `sizeof`/`offsetof` and by
//! the type checker's "fields must be sized" rule.
//!
//! Kept separate from [`crate::types::ty`] so the hash-consing store
//! itself stays ignorant of struct field layout — interned `Type`s and
//! backend-facing size/offset queries are deliberately separate
//! concerns.

use crate::scope::Struct;
use crate::types::ty::{Type, TypeId, TypeRegistry};

/// A read-only view over every struct declared so far, indexed by
/// [`crate::ids::StructId`].
pub struct StructLayouts<'a> { pub structs: &'a [Struct] }

impl<'a> StructLayouts<'a> {
  #[must_use] pub fn new(structs: &'a [Struct]) -> Self { StructLayouts { structs } }

  fn fields_of(&self, link: crate::ids::StructId) -> &crate::scope::indexmap_fields::FieldMap {
    &self.structs[link.index()].fields
  }
}

/// The size in bytes of `ty`. Pointers and references are pointer-sized
/// (8 bytes, chosen to match a typical native backend); `void` and empty
/// tuples are zero-sized.
#[must_use] pub fn size_of(ty: TypeId, types: &TypeRegistry, structs: &StructLayouts<'_>) -> u64 {
  match types.get(ty) {
    Type::Void => 0,
    Type::Int { bits, .. } => u64::from(*bits).div_ceil(8),
    Type::Float { bits } => u64::from(*bits) / 8,
    Type::Pointer { .. } | Type::Reference { .. } | Type::Function { .. } => 8,
    Type::Array { element, len } => size_of(*element, types, structs) * u64::from(*len),
    Type::Tuple { elements } => elements.iter().map(|&e| size_of(e, types, structs)).sum(),
    Type::Struct { link, .. } => {
      structs.fields_of(*link).iter().map(|f| size_of(f.ty, types, structs)).sum()
    }
    Type::Trait { .. } => 16, // fat pointer: {data, vtable}
  }
}

/// The byte offset of field `index` within `struct_ty`'s layout (fields
/// laid out in declaration order, matching the argument order
/// `Construct` lowers in).
#[must_use] pub fn field_offset(struct_ty: TypeId, field_index: u32, types: &TypeRegistry, structs: &StructLayouts<'_>) -> u64 {
  let Type::Struct { link, .. } = types.get(struct_ty) else { panic!("field_offset on a non-struct type") };
  structs.fields_of(*link).iter().take(field_index as usize)
    .map(|f| size_of(f.ty, types, structs)).sum()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn array_size_multiplies_element_size() {
    let mut types = TypeRegistry::new();
    let i32_ty = types.get_int(32, true);
    let arr = types.make_array(i32_ty, 3);
    let structs = StructLayouts::new(&[]);
    assert_eq!(size_of(arr, &types, &structs), 12);
  }

  #[test]
  fn pointer_is_eight_bytes_regardless_of_pointee() {
    let mut types = TypeRegistry::new();
    let i8_ty = types.get_int(8, false);
    let ptr = types.make_pointer(i8_ty, false);
    let structs = StructLayouts::new(&[]);
    assert_eq!(size_of(ptr, &types, &structs), 8);
  }
}
