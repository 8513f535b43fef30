//! Lexical scopes and the symbol table.
//!
//! What a name in scope resolves to is named [`Entity`] here, to avoid
//! clashing with the interned-identifier [`crate::symbol::Symbol`]:
//! `Symbol` is an interned name, `Entity` is a resolved declaration.

use hashbrown::HashMap;
use smallvec::SmallVec;

pub use crate::ids::{FunctionId, ImplId, ModuleId, ScopeId, StructId, TraitId};
use crate::span::Span;
use crate::symbol::Symbol;
use crate::types::ty::TypeId;

bitflags::bitflags! {
  /// Flags on a `Variable` entity.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct VariableFlags: u8 {
    const MUTABLE  = 1 << 0;
    const CONSTANT = 1 << 1;
    const PUBLIC   = 1 << 2;
    const REFERENCE = 1 << 3;
    const USED     = 1 << 4;
    const MUTATED  = 1 << 5;
    /// Backed by a module-scope storage slot (`State::alloc_global`,
    /// addressed by `GetGlobal`/`SetGlobal`) rather than a function-local
    /// slot (`State::alloc_local`, addressed by `GetLocal`/`SetLocal`).
    /// Unset for parameters, `let`-locals, and folded `const`s (the
    /// latter never reach the IR as loads at all — see `CONSTANT`).
    const GLOBAL   = 1 << 6;
  }
}

bitflags::bitflags! {
  /// Flags on a `Parameter`.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct ParameterFlags: u8 {
    const SELF_PARAM = 1 << 0;
    const MUTABLE    = 1 << 1;
    const VARIADIC   = 1 << 2;
    const KEYWORD    = 1 << 3;
    const REFERENCE  = 1 << 4;
  }
}

bitflags::bitflags! {
  /// Flags on a `StructField`.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct StructFieldFlags: u8 {
    const PRIVATE  = 1 << 0;
    const READONLY = 1 << 1;
    const MUTABLE  = 1 << 2;
  }
}

/// A function parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
  pub name: Symbol,
  pub ty: TypeId,
  pub flags: ParameterFlags,
  pub index: u32,
  pub span: Span,
}

impl Parameter {
  #[must_use] pub fn is_self(&self) -> bool { self.flags.contains(ParameterFlags::SELF_PARAM) }
  #[must_use] pub fn is_variadic(&self) -> bool { self.flags.contains(ParameterFlags::VARIADIC) }
}

/// A struct field.
#[derive(Clone, Debug)]
pub struct StructField {
  pub name: Symbol,
  pub ty: TypeId,
  pub index: u32,
  pub flags: StructFieldFlags,
}

/// The kind of value a generic `impl`'s condition matches against, used
/// to pick a generic impl for a concrete target type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImplConditionKind {
  Pointer,
  Reference,
  Array,
  Tuple,
  Any,
}

/// One condition a generic `impl<T>` places on the type it can match,
/// e.g. `impl<T> Foo for *T` has a single `Pointer` condition binding `T`
/// to the pointee.
#[derive(Clone, Debug)]
pub struct ImplCondition {
  pub parameter_name: Symbol,
  pub kind: ImplConditionKind,
}

impl ImplCondition {
  /// Does `ty` satisfy this condition, and if so, what concrete type does
  /// `parameter_name` bind to?
  #[must_use] pub fn matches(&self, registry: &crate::types::ty::TypeRegistry, ty: TypeId) -> Option<TypeId> {
    use crate::types::ty::Type;
    match (self.kind, registry.get(ty)) {
      (ImplConditionKind::Pointer, &Type::Pointer { pointee, .. }) => Some(pointee),
      (ImplConditionKind::Reference, &Type::Reference { referent, .. }) => Some(referent),
      (ImplConditionKind::Array, &Type::Array { element, .. }) => Some(element),
      (ImplConditionKind::Tuple, Type::Tuple { elements }) => elements.first().copied(),
      (ImplConditionKind::Any, _) => Some(ty),
      _ => None,
    }
  }
}

/// The kind of a lexical [`Scope`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScopeKind { Global, Function, Block, Struct, Trait, Impl, Module }

/// A lexical scope: a flat symbol table plus a parent link. Lookup walks
/// parents; insertion is always local to `self`.
pub struct Scope {
  pub name: Option<Symbol>,
  pub kind: ScopeKind,
  pub parent: Option<ScopeId>,
  pub children: Vec<ScopeId>,
  pub symbols: HashMap<Symbol, Entity>,
}

/// Owns every [`Scope`] created during a compilation, addressed by
/// [`ScopeId`]. Scopes never move once created (so `ScopeId`s stay
/// valid), and a child only ever borrows its parent's id, never the
/// parent itself.
pub struct ScopeTree {
  scopes: Vec<Scope>,
  root: ScopeId,
}

impl ScopeTree {
  #[must_use] pub fn new() -> Self {
    let root = Scope { name: None, kind: ScopeKind::Global, parent: None, children: Vec::new(), symbols: HashMap::new() };
    ScopeTree { scopes: vec![root], root: ScopeId::new(0) }
  }

  #[must_use] pub fn root(&self) -> ScopeId { self.root }

  pub fn push(&mut self, parent: ScopeId, kind: ScopeKind, name: Option<Symbol>) -> ScopeId {
    let id = ScopeId::new(u32::try_from(self.scopes.len()).expect("too many scopes"));
    self.scopes.push(Scope { name, kind, parent: Some(parent), children: Vec::new(), symbols: HashMap::new() });
    self.scopes[parent.index()].children.push(id);
    log::trace!("push scope {id:?} ({kind:?}) under {parent:?}");
    id
  }

  /// `root` and every scope nested inside it, in pre-order.
  #[must_use] pub fn descendants(&self, root: ScopeId) -> Vec<ScopeId> {
    let mut out = vec![root];
    let mut i = 0;
    while i < out.len() {
      out.extend(self.scopes[out[i].index()].children.iter().copied());
      i += 1;
    }
    out
  }

  /// Walk `from_scope` and its ancestors, marking the first `Variable`
  /// found under `name` as mutated. No-op if `name` doesn't resolve to a
  /// variable (shouldn't happen: callers only invoke this after
  /// resolving `name` as an assignable place).
  pub fn mark_mutated(&mut self, name: Symbol, from_scope: ScopeId) {
    let mut cur = Some(from_scope);
    while let Some(id) = cur {
      let scope = &mut self.scopes[id.index()];
      if let Some(Entity::Variable(v)) = scope.symbols.get_mut(&name) {
        v.flags |= VariableFlags::MUTATED;
        return;
      }
      cur = scope.parent;
    }
  }

  #[must_use] pub fn get(&self, id: ScopeId) -> &Scope { &self.scopes[id.index()] }
  pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope { &mut self.scopes[id.index()] }

  /// Insert `entity` under `name` into `scope`'s *local* table. Fails
  /// with `DuplicateSymbol` if the name already resolves locally
  /// (collisions across parent/child scopes, i.e. shadowing, are fine).
  pub fn insert(&mut self, scope: ScopeId, name: Symbol, entity: Entity, span: Span) -> crate::error::Result<()> {
    let s = &mut self.scopes[scope.index()];
    if let Some(existing) = s.symbols.get(&name) {
      let prev_span = existing.span();
      let mut err = crate::error::Error::new(span, crate::error::ErrorKind::DuplicateSymbol,
        "a symbol with this name already exists in this scope");
      if let Some(prev) = prev_span { err = err.with_note(prev, "previous definition here") }
      return Err(err);
    }
    s.symbols.insert(name, entity);
    Ok(())
  }

  /// Walk `from_scope` and its ancestors looking for `name`.
  #[must_use] pub fn resolve(&self, name: Symbol, from_scope: ScopeId) -> Option<&Entity> {
    let mut cur = Some(from_scope);
    while let Some(id) = cur {
      let scope = &self.scopes[id.index()];
      if let Some(e) = scope.symbols.get(&name) { return Some(e) }
      cur = scope.parent;
    }
    None
  }

  /// Resolve a dotted path `seg0::seg1::...::last`. Every segment except
  /// the last must denote a namespace-like entity (`Module` or `Struct`);
  /// the last segment returns whatever it resolves to.
  pub fn resolve_path(&self, span: Span, path: &[Symbol], from_scope: ScopeId) -> crate::error::Result<&Entity> {
    assert!(!path.is_empty(), "empty path");
    let mut cur_scope = from_scope;
    let mut entity = self.resolve(path[0], from_scope)
      .ok_or_else(|| crate::error::Error::new(span, crate::error::ErrorKind::UnknownIdentifier,
        "unknown identifier in path"))?;
    for &seg in &path[1..] {
      let namespace_scope = match entity {
        Entity::Module(m) => m.scope,
        Entity::Struct(s) => s.scope,
        _ => return Err(crate::error::Error::new(span, crate::error::ErrorKind::NotANamespace,
          "path segment does not resolve to a module or struct")),
      };
      cur_scope = namespace_scope;
      entity = self.get(cur_scope).symbols.get(&seg)
        .ok_or_else(|| crate::error::Error::new(span, crate::error::ErrorKind::UnknownIdentifier,
          "unknown identifier in path"))?;
    }
    Ok(entity)
  }
}

impl Default for ScopeTree {
  fn default() -> Self { Self::new() }
}

/// A variable binding (local or global slot).
#[derive(Clone, Debug)]
pub struct Variable {
  pub name: Symbol,
  pub index: u32,
  pub ty: TypeId,
  pub flags: VariableFlags,
  pub span: Span,
}

impl Variable {
  #[must_use] pub fn is_mutable(&self) -> bool { self.flags.contains(VariableFlags::MUTABLE) }
}

/// A `break`/`continue` target pair installed while lowering a loop body.
#[derive(Clone, Copy, Debug)]
pub struct LoopTarget {
  pub start: crate::ids::BlockId,
  pub end: crate::ids::BlockId,
}

/// A user function.
pub struct Function {
  pub name: Symbol,
  pub qualified_name: crate::types::ty::QualifiedName,
  pub params: Vec<Parameter>,
  pub ty: TypeId,
  pub return_type: TypeId,
  pub linkage: Linkage,
  pub span: Span,
  pub scope: ScopeId,
  pub module: Option<ModuleId>,
  /// The function's single body expression (always a `Block`, or `None`
  /// for an `extern` declaration with no definition).
  pub body: Option<crate::types::ast::ExprId>,
  /// Whether the declaration carried its own generic parameters (`func
  /// foo<T>(...)`). Such a body is only ever signature-checked, never
  /// type-checked (see DESIGN.md), so IR generation must skip it too —
  /// lowering a body the checker never visited would walk unresolved
  /// generic references.
  pub is_generic: bool,
  // Filled in during IR generation:
  pub entry_block: Option<crate::ids::BlockId>,
  pub basic_blocks: Vec<crate::types::ir::BasicBlock>,
  pub locals: Vec<TypeId>,
  pub current_loop: Option<LoopTarget>,
}

/// Linkage of a function, distinguishing ordinary definitions from
/// `extern "C"` declarations and attribute-driven link directives.
#[derive(Clone, Debug, Default)]
pub struct Linkage {
  pub extern_c: bool,
  pub link_name: Option<String>,
  pub no_mangle: bool,
  pub export_name: Option<String>,
}

/// A user struct.
pub struct Struct {
  pub name: Symbol,
  pub qualified_name: crate::types::ty::QualifiedName,
  pub ty: TypeId,
  pub fields: indexmap_fields::FieldMap,
  pub scope: ScopeId,
  pub module: Option<ModuleId>,
  pub public: bool,
  pub opaque: bool,
}

/// A small ordered name->field map: declaration order matters (it is the
/// order `Construct` lowers arguments in), so this isn't a plain
/// `HashMap`.
pub mod indexmap_fields {
  use hashbrown::HashMap;
  use crate::symbol::Symbol;
  use super::StructField;

  #[derive(Default)]
  pub struct FieldMap {
    order: Vec<Symbol>,
    map: HashMap<Symbol, StructField>,
  }

  impl FieldMap {
    #[must_use] pub fn new() -> Self { Self::default() }
    pub fn push(&mut self, field: StructField) {
      self.order.push(field.name);
      self.map.insert(field.name, field);
    }
    #[must_use] pub fn get(&self, name: Symbol) -> Option<&StructField> { self.map.get(&name) }
    #[must_use] pub fn len(&self) -> usize { self.order.len() }
    #[must_use] pub fn is_empty(&self) -> bool { self.order.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &StructField> { self.order.iter().map(move |n| &self.map[n]) }
  }
}

/// A user trait.
pub struct Trait {
  pub name: Symbol,
  pub ty: TypeId,
  pub scope: ScopeId,
  pub module: Option<ModuleId>,
}

/// A type alias, either fully concrete or generic.
pub enum AliasTarget {
  Concrete(TypeId),
  Generic(GenericAlias),
}

pub struct GenericAlias {
  pub params: Vec<Symbol>,
  pub body: crate::types::ast::TypeExprId,
  pub defined_in: ScopeId,
}

pub struct TypeAlias {
  pub name: Symbol,
  pub target: AliasTarget,
}

/// A module.
pub struct Module {
  pub name: Symbol,
  pub qualified_name: crate::types::ty::QualifiedName,
  pub path: std::path::PathBuf,
  pub scope: ScopeId,
  pub importing: bool,
}

/// A non-generic or generic `impl` block. Non-generic impls install
/// their methods directly into a scope keyed by the target type;
/// generic impls are matched lazily against a concrete type the first
/// time a method is looked up on it, and the resulting
/// specialised scope is cached in `instantiations` so repeated lookups
/// for the same concrete type share one scope.
pub struct Impl {
  pub target: Option<TypeId>,
  pub conditions: Vec<ImplCondition>,
  pub scope: ScopeId,
  pub instantiations: HashMap<TypeId, ScopeId>,
}

impl Impl {
  #[must_use] pub fn is_generic(&self) -> bool { self.target.is_none() }
}

/// The spec's `Symbol` tagged variant (renamed `Entity`, see module docs).
pub enum Entity {
  Variable(Variable),
  Function(FunctionId),
  Struct(StructId),
  Trait(TraitId),
  TypeAlias(Box<TypeAlias>),
  Module(ModuleRef),
  Impl(ImplId),
}

/// `Entity::Module` and `Entity::Struct` need the scope id inline (for
/// `resolve_path`'s namespace check) without a second table lookup, so we
/// carry a thin by-value view rather than just a `ModuleId`.
pub struct ModuleRef {
  pub id: ModuleId,
  pub scope: ScopeId,
}

impl Entity {
  /// The definition span, for "previous definition here" notes. `None`
  /// for entities that don't carry one directly (the span lives on the
  /// referenced `Function`/`Struct`/... instead; callers needing it look
  /// it up via `State`).
  #[must_use] pub fn span(&self) -> Option<Span> {
    match self {
      Entity::Variable(v) => Some(v.span),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{SourceMap, Span};

  fn dummy_span(sm: &mut SourceMap) -> Span {
    let id = sm.add("t.lang", "x");
    Span::new(id, 0, 1)
  }

  #[test]
  fn duplicate_symbol_in_same_scope_fails() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut types = crate::types::ty::TypeRegistry::new();
    let i32_ty = types.get_int(32, true);
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let name = Symbol::UNDER;
    let v = Variable { name, index: 0, ty: i32_ty, flags: VariableFlags::empty(), span: sp };
    tree.insert(root, name, Entity::Variable(v), sp).unwrap();
    let v2 = Variable { name, index: 1, ty: i32_ty, flags: VariableFlags::empty(), span: sp };
    let err = tree.insert(root, name, Entity::Variable(v2), sp).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::DuplicateSymbol);
  }

  #[test]
  fn lookup_walks_parent_chain() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut types = crate::types::ty::TypeRegistry::new();
    let i32_ty = types.get_int(32, true);
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let name = Symbol::UNDER;
    let v = Variable { name, index: 0, ty: i32_ty, flags: VariableFlags::empty(), span: sp };
    tree.insert(root, name, Entity::Variable(v), sp).unwrap();
    let child = tree.push(root, ScopeKind::Block, None);
    assert!(tree.resolve(name, child).is_some());
  }
}
