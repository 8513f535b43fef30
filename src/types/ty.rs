//! Hash-consed types.
//!
//! Every [`Type`] lives in the [`TypeRegistry`] and is referred to
//! everywhere else by [`TypeId`], a small `Copy` index. Two structurally
//! equal types always share one `TypeId`: the registry hash-conses on
//! insertion, so `==` on `TypeId` is the one true type-equality check
//! used by the rest of the crate.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::ids::StructId;
use crate::symbol::Symbol;

/// A handle into the [`TypeRegistry`]. Equal ids denote equal types.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl std::fmt::Debug for TypeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "T{}", self.0) }
}

/// A qualified name, e.g. `a::b::Point`, stored as its interned segments.
pub type QualifiedName = SmallVec<[Symbol; 4]>;

/// A tagged, interned type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
  Void,
  Int { bits: u16, signed: bool },
  Float { bits: u16 },
  Pointer { pointee: TypeId, mutable: bool },
  Reference { referent: TypeId, mutable: bool },
  Array { element: TypeId, len: u32 },
  Tuple { elements: SmallVec<[TypeId; 4]> },
  Function { params: SmallVec<[TypeId; 4]>, ret: TypeId, c_variadic: bool },
  Struct { qualified_name: QualifiedName, fields: SmallVec<[TypeId; 8]>, link: StructId },
  Trait { qualified_name: QualifiedName, link: crate::ids::TraitId },
}

/// Hash-consed store of canonical [`Type`] values.
///
/// `make_struct` fields may be left empty and patched in later via
/// [`TypeRegistry::set_struct_fields`] to allow self-referential
/// pointer/reference fields (a struct field of type `&Self`, say) without
/// a chicken-and-egg problem at construction time.
#[derive(Default)]
pub struct TypeRegistry {
  types: Vec<Type>,
  interned: HashMap<Type, TypeId>,
  void: Option<TypeId>,
}

impl TypeRegistry {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn intern(&mut self, ty: Type) -> TypeId {
    if let Some(&id) = self.interned.get(&ty) { return id }
    let id = TypeId(u32::try_from(self.types.len()).expect("too many types"));
    self.interned.insert(ty.clone(), id);
    self.types.push(ty);
    id
  }

  #[must_use] pub fn get(&self, id: TypeId) -> &Type { &self.types[id.0 as usize] }

  pub fn get_void(&mut self) -> TypeId {
    if let Some(id) = self.void { return id }
    let id = self.intern(Type::Void);
    self.void = Some(id);
    id
  }

  pub fn get_int(&mut self, bits: u16, signed: bool) -> TypeId {
    self.intern(Type::Int { bits, signed })
  }

  /// Booleans are `i1`, i.e. `get_int(1, _)`; the `signed` bit is
  /// meaningless for a single-bit integer so it is normalized to `false`.
  pub fn get_bool(&mut self) -> TypeId { self.get_int(1, false) }

  pub fn get_float(&mut self, bits: u16) -> TypeId { self.intern(Type::Float { bits }) }

  pub fn make_pointer(&mut self, pointee: TypeId, mutable: bool) -> TypeId {
    self.intern(Type::Pointer { pointee, mutable })
  }

  pub fn make_reference(&mut self, referent: TypeId, mutable: bool) -> TypeId {
    self.intern(Type::Reference { referent, mutable })
  }

  pub fn make_array(&mut self, element: TypeId, len: u32) -> TypeId {
    self.intern(Type::Array { element, len })
  }

  pub fn make_tuple(&mut self, elements: impl Into<SmallVec<[TypeId; 4]>>) -> TypeId {
    self.intern(Type::Tuple { elements: elements.into() })
  }

  pub fn make_function(&mut self, params: impl Into<SmallVec<[TypeId; 4]>>, ret: TypeId, c_variadic: bool) -> TypeId {
    self.intern(Type::Function { params: params.into(), ret, c_variadic })
  }

  /// Create (or fetch, if already registered under this name) a struct
  /// type. Fields may be empty at this point; see [`Self::set_struct_fields`].
  pub fn make_struct(&mut self, qualified_name: QualifiedName, fields: impl Into<SmallVec<[TypeId; 8]>>, link: StructId) -> TypeId {
    self.intern(Type::Struct { qualified_name, fields: fields.into(), link })
  }

  /// Patch in a struct's field types after forward-declaring it, so that
  /// self-referential `&Self`/`*Self` fields can be constructed. Because
  /// mutating an interned value would break hash-consing if the edit
  /// changed its hash, the struct is re-interned at its existing id: the
  /// identity (`link`) is what later field/method lookups key on, not
  /// structural equality of two structs that happen to share a name.
  pub fn set_struct_fields(&mut self, id: TypeId, fields: impl Into<SmallVec<[TypeId; 8]>>) {
    if let Type::Struct { fields: slot, .. } = &mut self.types[id.0 as usize] {
      *slot = fields.into();
    } else {
      panic!("set_struct_fields called on a non-struct TypeId");
    }
  }

  pub fn make_trait(&mut self, qualified_name: QualifiedName, link: crate::ids::TraitId) -> TypeId {
    self.intern(Type::Trait { qualified_name, link })
  }
}

/// Resolve one of the fixed primitive type names (`i32`, `f64`, `bool`,
/// `void`, ...) to its interned [`TypeId`]. Shared by every pass that
/// resolves a bare named type (the constant evaluator's restricted
/// resolver and the full checker's) so the primitive vocabulary can't
/// drift between them.
pub fn resolve_builtin_type(name: &str, types: &mut TypeRegistry) -> Option<TypeId> {
  Some(match name {
    "void" => types.get_void(),
    "bool" => types.get_bool(),
    "i8" => types.get_int(8, true), "u8" => types.get_int(8, false),
    "i16" => types.get_int(16, true), "u16" => types.get_int(16, false),
    "i32" => types.get_int(32, true), "u32" => types.get_int(32, false),
    "i64" => types.get_int(64, true), "u64" => types.get_int(64, false),
    "i128" => types.get_int(128, true), "u128" => types.get_int(128, false),
    "isize" => types.get_int(64, true), "usize" => types.get_int(64, false),
    "f32" => types.get_float(32), "f64" => types.get_float(64),
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::StructId;

  #[test]
  fn hash_consing_is_pointer_equal() {
    let mut r = TypeRegistry::new();
    let i32_ty = r.get_int(32, true);
    let u8_ty = r.get_int(8, false);
    let a = r.make_tuple([i32_ty, u8_ty]);
    let b = r.make_tuple([i32_ty, u8_ty]);
    assert_eq!(a, b);
  }

  #[test]
  fn reference_mutability_is_part_of_the_key() {
    let mut r = TypeRegistry::new();
    let i32_ty = r.get_int(32, true);
    let imm = r.make_reference(i32_ty, false);
    let mut_ = r.make_reference(i32_ty, true);
    assert_ne!(imm, mut_);
  }

  #[test]
  fn struct_fields_can_be_patched_after_creation() {
    let mut r = TypeRegistry::new();
    let sid = StructId::new_for_test(0);
    let s = r.make_struct(QualifiedName::from_slice(&[]), [], sid);
    let self_ptr = r.make_pointer(s, true);
    r.set_struct_fields(s, [self_ptr]);
    match r.get(s) {
      Type::Struct { fields, .. } => assert_eq!(fields.as_slice(), &[self_ptr]),
      _ => panic!("expected struct"),
    }
  }
}
