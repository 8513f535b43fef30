//! Small `Copy` index newtypes shared across the scope tree, type
//! registry, and IR. Kept in one place so `State`'s various `Vec`-backed
//! tables all index
//! the same way.

macro_rules! index_newtype {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct $name(u32);

    impl $name {
      #[must_use] pub fn new(i: u32) -> Self { $name(i) }
      #[must_use] pub fn index(self) -> usize { self.0 as usize }
      /// Construct an id from a raw index, for use in tests that need a
      /// placeholder id without going through a real allocator.
      #[cfg(test)]
      #[must_use] pub fn new_for_test(i: u32) -> Self { $name(i) }
    }

    impl std::fmt::Debug for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", stringify!($name), self.0)
      }
    }
  };
}

index_newtype!(
  /// Identifies a [`crate::scope::Scope`] in the [`crate::scope::ScopeTree`].
  ScopeId
);
index_newtype!(
  /// Identifies a function [`crate::scope::Entity`] in `State::global_functions`.
  FunctionId
);
index_newtype!(
  /// Identifies a struct [`crate::scope::Entity`] in `State::global_structs`.
  StructId
);
index_newtype!(
  /// Identifies a trait [`crate::scope::Entity`] in `State::global_traits`.
  TraitId
);
index_newtype!(
  /// Identifies a module [`crate::scope::Entity`] in `State::global_modules`.
  ModuleId
);
index_newtype!(
  /// Identifies an `impl` block in `State::impls`/`State::generic_impls`.
  ImplId
);
index_newtype!(
  /// A virtual register in the generated IR; its type lives in
  /// `State::register_types`.
  Register
);
index_newtype!(
  /// A basic block within one [`crate::types::ir::Function`].
  BlockId
);
