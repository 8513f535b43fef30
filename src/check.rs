//! The type checker.
//!
//! Walks the whole program in four sub-passes per lexical scope (struct
//! skeletons, then signatures, then struct field layout, then bodies) so
//! that forward references — a function calling one declared later in
//! the same module, a struct pointing at itself through `&Self` — resolve
//! without a separate name-resolution pass. Every expression-checking
//! method returns the [`TypeId`] it settles on; side effects (new scope
//! entries, cached generic-impl instantiations) land directly on
//! [`State`].

use hashbrown::HashMap;
use std::collections::HashSet;

use crate::attributes;
use crate::const_eval::{Constant, ConstantEvaluator};
use crate::error::{Error, ErrorKind, Result};
use crate::ids::StructId;
use crate::layout::StructLayouts;
use crate::scope::{
  AliasTarget, Entity, Function, GenericAlias, Impl, ImplCondition, ImplConditionKind, Module,
  ModuleRef, Parameter, ParameterFlags, ScopeId, ScopeKind, Struct, StructField, StructFieldFlags,
  Trait, TypeAlias, Variable, VariableFlags,
};
use crate::span::Span;
use crate::state::State;
use crate::symbol::Symbol;
use crate::types::ast::{
  Ast, BinOp, EnumDecl, Expr, ExprId, FuncDecl, ImplConditionSyntax, ImplDecl, ImportDecl,
  LetDecl, Literal, Path, StaticAssertDecl, Stmt, StmtId, StructDecl, TraitDecl, TypeAliasDecl,
  TypeExpr, TypeExprId, UnaryOp, UsingDecl,
};
use crate::types::ty::{resolve_builtin_type, Type, TypeId};

/// A resolved assignable location: the type a place holds, and whether
/// writing through it is currently allowed.
struct Place {
  ty: TypeId,
  mutable: bool,
}

/// What a named type path resolved to, captured by value so the borrow
/// of the scope tree that produced it ends before any further mutation
/// of `State` (generic alias instantiation pushes a new scope).
enum NamedTypeResolution {
  Concrete(TypeId),
  Generic { params: Vec<Symbol>, body: TypeExprId, defined_in: ScopeId },
}

pub struct TypeChecker<'a> {
  pub ast: &'a Ast,
  pub state: &'a mut State,
}

impl<'a> TypeChecker<'a> {
  #[must_use] pub fn new(ast: &'a Ast, state: &'a mut State) -> Self {
    TypeChecker { ast, state }
  }

  pub fn check_program(&mut self) -> Result<()> {
    let root = self.state.scopes.root();
    let items = self.ast.items.clone();
    self.check_block_items(root, None, &items)
  }

  /// Run every sub-pass for one lexical block (the top level, or a
  /// module body): structs first, then everything else's signature, then
  /// struct layouts, then bodies, recursing into nested modules last.
  fn check_block_items(&mut self, scope: ScopeId, module: Option<crate::ids::ModuleId>, items: &[StmtId]) -> Result<()> {
    let mut struct_decls = Vec::new();
    for &it in items {
      if let Stmt::Struct(decl) = self.ast.stmt(it).clone() {
        let sid = self.declare_struct_skeleton(scope, module, &decl)?;
        struct_decls.push((sid, decl));
      }
    }
    for &it in items {
      if let Stmt::Trait(decl) = self.ast.stmt(it).clone() {
        self.declare_trait(scope, module, &decl)?;
      }
    }
    let mut nested_modules = Vec::new();
    for &it in items {
      if let Stmt::Module(decl) = self.ast.stmt(it).clone() {
        let (mid, mscope) = self.declare_module(scope, &decl)?;
        nested_modules.push((mid, mscope, decl.body));
      }
    }
    for &it in items {
      if let Stmt::TypeAlias(decl) = self.ast.stmt(it).clone() {
        self.declare_type_alias(scope, &decl)?;
      }
    }
    for &it in items {
      match self.ast.stmt(it).clone() {
        Stmt::Import(decl) => self.check_import(scope, &decl)?,
        Stmt::Using(decl) => self.check_using(scope, &decl)?,
        _ => {}
      }
    }
    for &it in items {
      if let Stmt::Func(decl) = self.ast.stmt(it).clone() {
        self.declare_function(scope, module, &decl)?;
      }
    }
    let mut impls = Vec::new();
    for &it in items {
      if let Stmt::Impl(decl) = self.ast.stmt(it).clone() {
        let impl_scope = self.declare_impl(scope, module, &decl)?;
        impls.push((impl_scope, decl));
      }
    }
    for &it in items {
      if let Stmt::Enum(decl) = self.ast.stmt(it).clone() {
        self.declare_enum(scope, &decl)?;
      }
    }

    for (sid, decl) in &struct_decls {
      self.resolve_struct_fields(*sid, decl)?;
    }

    let mut impl_idx = 0;
    for &it in items {
      if let Stmt::Impl(_) = self.ast.stmt(it) {
        // Impl method bodies resolve within the impl's own scope, not the
        // scope the `impl` block itself appears in: methods are
        // declared into `impl_scope`, a child of `scope`, so `resolve`
        // walking up from `scope` would never see them.
        let (impl_scope, decl) = &impls[impl_idx];
        impl_idx += 1;
        self.check_impl_bodies(*impl_scope, decl)?;
      } else {
        self.check_item_body(scope, it)?;
      }
    }

    for (mid, mscope, body) in nested_modules {
      self.check_block_items(mscope, Some(mid), &body)?;
    }
    Ok(())
  }

  // ---------------------------------------------------------------- structs

  fn declare_struct_skeleton(&mut self, scope: ScopeId, module: Option<crate::ids::ModuleId>, decl: &StructDecl) -> Result<StructId> {
    let sid = StructId::new(u32::try_from(self.state.global_structs.len()).expect("too many structs"));
    let qualified_name = self.qualify(scope, decl.name);
    let ty = self.state.types.make_struct(qualified_name.clone(), [], sid);
    let struct_scope = self.state.scopes.push(scope, ScopeKind::Struct, Some(decl.name));
    self.state.global_structs.push(Struct {
      name: decl.name, qualified_name, ty, fields: crate::scope::indexmap_fields::FieldMap::new(),
      scope: struct_scope, module, public: decl.public, opaque: decl.opaque,
    });
    self.state.scopes.insert(scope, decl.name, Entity::Struct(sid), decl.span)?;
    Ok(sid)
  }

  /// Resolve a struct's field types and check for a by-value cycle
  /// a struct may only refer to itself through a pointer or
  /// reference field, never embed itself by value, directly or through
  /// another by-value field/array/tuple).
  fn resolve_struct_fields(&mut self, sid: StructId, decl: &StructDecl) -> Result<()> {
    let struct_scope = self.state.struct_(sid).scope;
    let mut fields = Vec::with_capacity(decl.fields.len());
    for (i, f) in decl.fields.iter().enumerate() {
      let ty = self.check_type_expr(struct_scope, f.ty)?;
      if self.type_contains_struct_by_value(ty, sid) {
        return Err(Error::new(f.span, ErrorKind::RecursiveStructByValue,
          "struct field creates an infinite-size by-value cycle; use a pointer or reference instead"));
      }
      let mut flags = StructFieldFlags::empty();
      if f.private { flags |= StructFieldFlags::PRIVATE }
      if f.readonly { flags |= StructFieldFlags::READONLY } else { flags |= StructFieldFlags::MUTABLE }
      fields.push(StructField { name: f.name, ty, index: u32::try_from(i).unwrap(), flags });
    }
    let field_types: smallvec::SmallVec<[TypeId; 8]> = fields.iter().map(|f| f.ty).collect();
    let struct_ty = self.state.struct_(sid).ty;
    self.state.types.set_struct_fields(struct_ty, field_types);
    for field in fields {
      self.state.struct_mut(sid).fields.push(field);
    }
    Ok(())
  }

  fn type_contains_struct_by_value(&self, ty: TypeId, target: StructId) -> bool {
    fn walk(types: &crate::types::ty::TypeRegistry, ty: TypeId, target: StructId, seen: &mut HashSet<TypeId>) -> bool {
      if !seen.insert(ty) { return false }
      match types.get(ty) {
        Type::Struct { link, fields, .. } => {
          if *link == target { return true }
          fields.iter().any(|&f| walk(types, f, target, seen))
        }
        Type::Array { element, .. } => walk(types, *element, target, seen),
        Type::Tuple { elements } => elements.iter().any(|&e| walk(types, e, target, seen)),
        _ => false,
      }
    }
    walk(&self.state.types, ty, target, &mut HashSet::new())
  }

  // ------------------------------------------------------------------ traits

  fn declare_trait(&mut self, scope: ScopeId, module: Option<crate::ids::ModuleId>, decl: &TraitDecl) -> Result<()> {
    let tid = crate::ids::TraitId::new(u32::try_from(self.state.global_traits.len()).expect("too many traits"));
    let qualified_name = self.qualify(scope, decl.name);
    let ty = self.state.types.make_trait(qualified_name, tid);
    let trait_scope = self.state.scopes.push(scope, ScopeKind::Trait, Some(decl.name));
    let prev_self = self.state.current_self_type.replace(ty);
    for method in &decl.methods {
      self.declare_function(trait_scope, module, method)?;
    }
    self.state.current_self_type = prev_self;
    self.state.global_traits.push(Trait { name: decl.name, ty, scope: trait_scope, module });
    self.state.scopes.insert(scope, decl.name, Entity::Trait(tid), decl.span)?;
    Ok(())
  }

  // ----------------------------------------------------------------- modules

  fn declare_module(&mut self, scope: ScopeId, decl: &crate::types::ast::ModuleDecl) -> Result<(crate::ids::ModuleId, ScopeId)> {
    let mid = crate::ids::ModuleId::new(u32::try_from(self.state.global_modules.len()).expect("too many modules"));
    let qualified_name = self.qualify(scope, decl.name);
    let mscope = self.state.scopes.push(scope, ScopeKind::Module, Some(decl.name));
    self.state.global_modules.push(Module {
      name: decl.name, qualified_name, path: std::path::PathBuf::new(), scope: mscope, importing: false,
    });
    self.state.scopes.insert(scope, decl.name, Entity::Module(ModuleRef { id: mid, scope: mscope }), decl.span)?;
    Ok((mid, mscope))
  }

  // ------------------------------------------------------------------- enums

  /// Enums desugar to typed integer constants in the declaring scope
  /// (there is no nominal `Type::Enum`): each variant becomes a
  /// `const` `Variable` of the underlying integer type, auto-incrementing
  /// from the previous variant's value when it has no explicit initializer.
  fn declare_enum(&mut self, scope: ScopeId, decl: &EnumDecl) -> Result<()> {
    let underlying = match decl.underlying {
      Some(te) => self.check_type_expr(scope, te)?,
      None => self.state.types.get_int(32, true),
    };
    let mut next_value: i128 = 0;
    for variant in &decl.variants {
      let value = if let Some(init) = variant.value {
        let c = self.eval_const(scope, init)?;
        c.as_int().ok_or_else(|| Error::new(self.ast.expr_span(init), ErrorKind::NotConstant, "enum variant initializer is not an integer constant"))?
      } else {
        next_value
      };
      next_value = value + 1;
      let idx = self.state.alloc_global();
      self.state.constants.insert(idx, Constant { kind: crate::const_eval::ConstantKind::Int(value), ty: underlying });
      let v = Variable { name: variant.name, index: idx, ty: underlying, flags: VariableFlags::CONSTANT | VariableFlags::PUBLIC, span: decl.span };
      self.state.scopes.insert(scope, variant.name, Entity::Variable(v), decl.span)?;
    }
    Ok(())
  }

  // -------------------------------------------------------------- functions

  fn declare_function(&mut self, scope: ScopeId, module: Option<crate::ids::ModuleId>, decl: &FuncDecl) -> Result<crate::ids::FunctionId> {
    let fn_scope = self.state.scopes.push(scope, ScopeKind::Function, Some(decl.name));

    // Reserve the id up front so parameters can claim the first slots of
    // the function's local-slot space (`State::alloc_local`) before the
    // `Function` itself is fully built: a parameter is just a local the
    // caller has already initialized, so `GetLocal`/`SetLocal` address
    // params and `let`-locals through the one slot space.
    let fid = crate::ids::FunctionId::new(u32::try_from(self.state.global_functions.len()).expect("too many functions"));
    let qualified_name = self.qualify(scope, decl.name);
    self.state.global_functions.push(Function {
      name: decl.name, qualified_name, params: Vec::new(), ty: self.state.types.get_void(), return_type: self.state.types.get_void(),
      linkage: crate::scope::Linkage::default(), span: decl.span, scope: fn_scope, module, body: decl.body,
      is_generic: !decl.generic_params.is_empty(),
      entry_block: None, basic_blocks: Vec::new(), locals: Vec::new(), current_loop: None,
    });

    let mut params = Vec::with_capacity(decl.params.len());
    let mut param_types = smallvec::SmallVec::<[TypeId; 4]>::new();
    for (i, p) in decl.params.iter().enumerate() {
      let base_ty = if p.is_self {
        self.state.current_self_type.ok_or_else(|| Error::new(p.span, ErrorKind::UnknownIdentifier, "`self` used outside an impl or trait"))?
      } else {
        let ty_expr = p.ty.expect("non-self parameter must carry a type");
        self.check_type_expr(scope, ty_expr)?
      };
      let ty = if p.is_reference { self.state.types.make_reference(base_ty, p.is_mutable) } else { base_ty };
      param_types.push(ty);
      let mut flags = ParameterFlags::empty();
      if p.is_self { flags |= ParameterFlags::SELF_PARAM }
      if p.is_mutable { flags |= ParameterFlags::MUTABLE }
      if p.is_variadic { flags |= ParameterFlags::VARIADIC }
      if p.is_keyword { flags |= ParameterFlags::KEYWORD }
      if p.is_reference { flags |= ParameterFlags::REFERENCE }
      let position = u32::try_from(i).unwrap();
      params.push(Parameter { name: p.name, ty, flags, index: position, span: p.span });
      let slot = self.state.alloc_local(fid);
      self.state.function_mut(fid).locals.push(ty);
      let var_flags = if p.is_mutable { VariableFlags::MUTABLE } else { VariableFlags::empty() };
      let var = Variable { name: p.name, index: slot, ty, flags: var_flags, span: p.span };
      self.state.scopes.insert(fn_scope, p.name, Entity::Variable(var), p.span)?;
    }

    let return_type = match decl.return_type {
      Some(te) => self.check_type_expr(scope, te)?,
      None => self.state.types.get_void(),
    };
    let c_variadic = decl.params.last().is_some_and(|p| p.is_variadic);
    let ty = self.state.types.make_function(param_types, return_type, c_variadic);

    attributes::validate_hint_attrs(&decl.attrs, &self.state.interner)?;
    let linkage = attributes::linkage_for(decl, &decl.attrs, &self.state.interner)?;

    {
      let f = self.state.function_mut(fid);
      f.params = params;
      f.ty = ty;
      f.return_type = return_type;
      f.linkage = linkage;
    }
    self.state.scopes.insert(scope, decl.name, Entity::Function(fid), decl.span)?;
    Ok(fid)
  }

  // ----------------------------------------------------------------- impls

  fn declare_impl(&mut self, scope: ScopeId, module: Option<crate::ids::ModuleId>, decl: &ImplDecl) -> Result<ScopeId> {
    let impl_scope = self.state.scopes.push(scope, ScopeKind::Impl, None);

    let is_generic = !decl.generic_params.is_empty();
    let conditions: Vec<ImplCondition> = decl.generic_params.iter().map(|(name, syntax)| {
      ImplCondition { parameter_name: *name, kind: match syntax {
        ImplConditionSyntax::Pointer => ImplConditionKind::Pointer,
        ImplConditionSyntax::Reference => ImplConditionKind::Reference,
        ImplConditionSyntax::Array => ImplConditionKind::Array,
        ImplConditionSyntax::Tuple => ImplConditionKind::Tuple,
      } }
    }).collect();

    let target = if is_generic {
      // The target type expression mentions the generic parameter(s); it
      // cannot be resolved until a concrete type is matched against the
      // conditions, so only the condition shapes are kept now.
      None
    } else {
      Some(self.check_type_expr(scope, decl.target)?)
    };

    let prev_self = self.state.current_self_type;
    self.state.current_self_type = target;
    for method in &decl.methods {
      self.declare_function(impl_scope, module, method)?;
    }
    self.state.current_self_type = prev_self;

    self.state.impls.push(Impl { target, conditions, scope: impl_scope, instantiations: HashMap::new() });

    if let Some(t) = target {
      if let Type::Struct { link, .. } = *self.state.types.get(t) {
        let struct_scope = self.state.struct_(link).scope;
        self.copy_functions(impl_scope, struct_scope)?;
      }
    }
    Ok(impl_scope)
  }

  /// Install every function bound directly in `from` under `to` too, so
  /// a (non-generic) method lookup on a struct's own scope finds methods
  /// declared in a separate `impl` block for it without a second table.
  fn copy_functions(&mut self, from: ScopeId, to: ScopeId) -> Result<()> {
    let funcs: Vec<(Symbol, crate::ids::FunctionId)> = self.state.scopes.get(from).symbols.iter()
      .filter_map(|(n, e)| if let Entity::Function(f) = e { Some((*n, *f)) } else { None })
      .collect();
    for (name, fid) in funcs {
      let span = self.state.function(fid).span;
      self.state.scopes.insert(to, name, Entity::Function(fid), span)?;
    }
    Ok(())
  }

  /// Resolve a method on `target_ty` by name: first a direct (possibly
  /// impl-installed) scope lookup, then lazy generic-impl matching
  /// (repeated lookups for the same concrete type share one scope).
  fn resolve_method(&mut self, target_ty: TypeId, name: Symbol, span: Span) -> Result<crate::ids::FunctionId> {
    if let Type::Struct { link, .. } = *self.state.types.get(target_ty) {
      let struct_scope = self.state.struct_(link).scope;
      if let Some(Entity::Function(fid)) = self.state.scopes.resolve(name, struct_scope) {
        return Ok(*fid);
      }
    }
    for idx in 0..self.state.impls.len() {
      let iid = crate::ids::ImplId::new(u32::try_from(idx).unwrap());
      if !self.state.impl_(iid).is_generic() { continue }
      let Some(bound) = self.state.impl_(iid).conditions.first().and_then(|c| c.matches(&self.state.types, target_ty)) else { continue };
      if let Some(&inst_scope) = self.state.impl_(iid).instantiations.get(&target_ty) {
        if let Some(Entity::Function(fid)) = self.state.scopes.resolve(name, inst_scope) {
          return Ok(*fid);
        }
        continue;
      }
      let param_name = self.state.impl_(iid).conditions[0].parameter_name;
      let base_scope = self.state.impl_(iid).scope;
      let inst_scope = self.state.scopes.push(base_scope, ScopeKind::Impl, None);
      let alias = TypeAlias { name: param_name, target: AliasTarget::Concrete(bound) };
      self.state.scopes.insert(inst_scope, param_name, Entity::TypeAlias(Box::new(alias)), span)?;
      self.copy_functions(base_scope, inst_scope)?;
      self.state.impl_mut(iid).instantiations.insert(target_ty, inst_scope);
      log::debug!("instantiated generic impl {iid:?} for {target_ty:?}");
      if let Some(Entity::Function(fid)) = self.state.scopes.resolve(name, inst_scope) {
        return Ok(*fid);
      }
    }
    Err(Error::new(span, ErrorKind::NotAMethod, "no method with this name on this type"))
  }

  // ------------------------------------------------------------ type aliases

  fn declare_type_alias(&mut self, scope: ScopeId, decl: &TypeAliasDecl) -> Result<()> {
    let alias = if decl.generic_params.is_empty() {
      TypeAlias { name: decl.name, target: AliasTarget::Concrete(self.check_type_expr(scope, decl.target)?) }
    } else {
      TypeAlias { name: decl.name, target: AliasTarget::Generic(GenericAlias {
        params: decl.generic_params.clone(), body: decl.target, defined_in: scope,
      }) }
    };
    self.state.scopes.insert(scope, decl.name, Entity::TypeAlias(Box::new(alias)), decl.span)
  }

  // ----------------------------------------------------------- import/using

  fn check_import(&mut self, scope: ScopeId, decl: &ImportDecl) -> Result<()> {
    let names: Vec<Symbol> = decl.path.segments.iter().map(|s| s.name).collect();
    let entity_scope = {
      match self.state.scopes.resolve_path(decl.span, &names, scope)? {
        Entity::Module(m) => m.scope,
        Entity::Struct(sid) => self.state.struct_(*sid).scope,
        _ => return Err(Error::new(decl.span, ErrorKind::NotANamespace, "import target is not a module or struct")),
      }
    };
    if decl.wildcard {
      let entries: Vec<(Symbol, crate::ids::FunctionId)> = self.state.scopes.get(entity_scope).symbols.iter()
        .filter_map(|(n, e)| if let Entity::Function(f) = e { Some((*n, *f)) } else { None })
        .collect();
      for (name, fid) in entries {
        self.state.scopes.insert(scope, name, Entity::Function(fid), decl.span)?;
      }
    } else {
      let last = *names.last().expect("non-empty import path");
      if let Some(Entity::Function(fid)) = self.state.scopes.get(entity_scope).symbols.get(&last) {
        let fid = *fid;
        self.state.scopes.insert(scope, last, Entity::Function(fid), decl.span)?;
      }
    }
    Ok(())
  }

  fn check_using(&mut self, scope: ScopeId, decl: &UsingDecl) -> Result<()> {
    let names: Vec<Symbol> = decl.base.segments.iter().map(|s| s.name).collect();
    let base_scope = {
      match self.state.scopes.resolve_path(decl.span, &names, scope)? {
        Entity::Module(m) => m.scope,
        Entity::Struct(sid) => self.state.struct_(*sid).scope,
        _ => return Err(Error::new(decl.span, ErrorKind::NotANamespace, "using base is not a module or struct")),
      }
    };
    for item in &decl.items {
      let local_name = item.alias.unwrap_or(item.name);
      let entity = match self.state.scopes.get(base_scope).symbols.get(&item.name) {
        Some(Entity::Function(f)) => Entity::Function(*f),
        Some(Entity::Struct(s)) => Entity::Struct(*s),
        Some(Entity::Trait(t)) => Entity::Trait(*t),
        Some(Entity::Module(m)) => Entity::Module(ModuleRef { id: m.id, scope: m.scope }),
        Some(Entity::TypeAlias(a)) => Entity::TypeAlias(Box::new(match &a.target {
          AliasTarget::Concrete(ty) => TypeAlias { name: a.name, target: AliasTarget::Concrete(*ty) },
          AliasTarget::Generic(ga) => TypeAlias { name: a.name, target: AliasTarget::Generic(GenericAlias {
            params: ga.params.clone(), body: ga.body, defined_in: ga.defined_in,
          }) },
        })),
        _ => return Err(Error::new(decl.span, ErrorKind::UnknownIdentifier, "unknown identifier in using")),
      };
      self.state.scopes.insert(scope, local_name, entity, decl.span)?;
    }
    Ok(())
  }

  // -------------------------------------------------------------- top-level

  fn check_item_body(&mut self, scope: ScopeId, item: StmtId) -> Result<()> {
    match self.ast.stmt(item).clone() {
      Stmt::Func(decl) => self.check_function_body(scope, &decl),
      Stmt::Trait(decl) => self.check_trait_bodies(scope, &decl),
      Stmt::Let(decl) => self.check_global_let(scope, &decl),
      Stmt::StaticAssert(decl) => self.check_static_assert(scope, &decl),
      Stmt::Expr(e) => { self.state.early_calls.push(e); Ok(()) }
      // Impl blocks are dispatched specially by `check_block_items`, which
      // has the impl's own scope on hand; they never reach this match.
      Stmt::Impl(_) | Stmt::Struct(_) | Stmt::Enum(_) | Stmt::TypeAlias(_) | Stmt::Module(_) | Stmt::Import(_) | Stmt::Using(_) => Ok(()),
    }
  }

  fn check_function_body(&mut self, outer_scope: ScopeId, decl: &FuncDecl) -> Result<()> {
    if !decl.generic_params.is_empty() { return Ok(()) } // generic free functions: signature only, see DESIGN.md
    let Some(body) = decl.body else { return Ok(()) };
    let fid = match self.state.scopes.resolve(decl.name, outer_scope) {
      Some(Entity::Function(fid)) => *fid,
      _ => return Err(Error::internal(decl.span, "check", "function not registered before body check")),
    };
    let fn_scope = self.state.function(fid).scope;
    let ret_ty = self.state.function(fid).return_type;
    let prev_fn = self.state.current_function.replace(fid);
    self.state.push_defer_frame();
    let body_ty = self.check_expr(fn_scope, body)?;
    self.state.pop_defer_frame();
    self.state.current_function = prev_fn;
    let void = self.state.types.get_void();
    if ret_ty != void && !self.can_safely_cast(body_ty, ret_ty) && !attributes::is_noreturn(&decl.attrs, &self.state.interner) {
      return Err(Error::new(self.ast.expr_span(body), ErrorKind::TypeMismatch, "function body does not produce its declared return type"));
    }
    self.warn_unused_mutability(fn_scope);
    Ok(())
  }

  /// Logs a non-fatal diagnostic for every parameter/local in `fn_scope`
  /// (and its nested block scopes) declared `mut` but never actually
  /// assigned through.
  fn warn_unused_mutability(&mut self, fn_scope: ScopeId) {
    for sid in self.state.scopes.descendants(fn_scope) {
      let unmutated: Vec<Symbol> = self.state.scopes.get(sid).symbols.values()
        .filter_map(|e| match e {
          Entity::Variable(v) if v.flags.contains(VariableFlags::MUTABLE) && !v.flags.contains(VariableFlags::MUTATED) => Some(v.name),
          _ => None,
        })
        .collect();
      for name in unmutated {
        log::warn!("`{}` declared mut but never mutated", self.state.interner.resolve(name));
      }
    }
  }

  fn check_impl_bodies(&mut self, scope: ScopeId, decl: &ImplDecl) -> Result<()> {
    for method in &decl.methods {
      self.check_function_body(scope, method)?;
    }
    Ok(())
  }

  fn check_trait_bodies(&mut self, scope: ScopeId, decl: &TraitDecl) -> Result<()> {
    // As with impls, a trait's methods are declared into its own child
    // scope, not `scope` itself, so `check_function_body`'s resolve must
    // start there.
    let trait_scope = match self.state.scopes.resolve(decl.name, scope) {
      Some(Entity::Trait(tid)) => self.state.trait_(*tid).scope,
      _ => return Err(Error::internal(decl.span, "check", "trait not registered before body check")),
    };
    for method in &decl.methods {
      if method.body.is_some() { self.check_function_body(trait_scope, method)?; }
    }
    Ok(())
  }

  fn check_global_let(&mut self, scope: ScopeId, decl: &LetDecl) -> Result<()> {
    let declared_ty = match decl.ty { Some(te) => Some(self.check_type_expr(scope, te)?), None => None };
    let idx = self.state.alloc_global();
    if decl.is_const {
      let init = decl.init.ok_or_else(|| Error::new(decl.span, ErrorKind::NotConstant, "const declaration requires an initializer"))?;
      let c = self.eval_const(scope, init)?;
      let ty = declared_ty.unwrap_or(c.ty);
      self.state.constants.insert(idx, c);
      let v = Variable { name: decl.name, index: idx, ty, flags: VariableFlags::CONSTANT, span: decl.span };
      self.state.scopes.insert(scope, decl.name, Entity::Variable(v), decl.span)?;
      return Ok(());
    }
    let init_ty = match decl.init { Some(e) => Some(self.check_expr_with_context(scope, e, declared_ty)?), None => None };
    let ty = match (declared_ty, init_ty) {
      (Some(t), Some(i)) => {
        if !self.can_safely_cast(i, t) {
          return Err(Error::new(decl.span, ErrorKind::TypeMismatch, "initializer does not match declared type"));
        }
        t
      }
      (Some(t), None) => t,
      (None, Some(i)) => i,
      (None, None) => return Err(Error::new(decl.span, ErrorKind::NotConstant, "global `let` needs a type or an initializer")),
    };
    let mut flags = VariableFlags::GLOBAL;
    if decl.mutable { flags |= VariableFlags::MUTABLE }
    let v = Variable { name: decl.name, index: idx, ty, flags, span: decl.span };
    self.state.global_variables.insert(idx, v.clone());
    self.state.scopes.insert(scope, decl.name, Entity::Variable(v), decl.span)
  }

  fn check_static_assert(&mut self, scope: ScopeId, decl: &StaticAssertDecl) -> Result<()> {
    let c = self.eval_const(scope, decl.cond)?;
    if c.as_bool().unwrap_or(false) { return Ok(()) }
    let msg = decl.message.clone().unwrap_or_else(|| "static_assert failed".to_string());
    Err(Error::new(decl.span, ErrorKind::InvalidContext, msg))
  }

  fn eval_const(&mut self, scope: ScopeId, expr: ExprId) -> Result<Constant> {
    let structs = StructLayouts::new(&self.state.global_structs);
    let mut ev = ConstantEvaluator::new(self.ast, &self.state.scopes, &mut self.state.types, &self.state.interner, &self.state.constants, structs);
    ev.eval(scope, expr)
  }

  // ------------------------------------------------------------ type exprs

  fn check_type_expr(&mut self, scope: ScopeId, id: TypeExprId) -> Result<TypeId> {
    let span = self.ast.type_expr_span(id);
    match self.ast.type_expr(id).clone() {
      TypeExpr::Named(path) => self.check_named_type(scope, &path, span),
      TypeExpr::Pointer { mutable, inner } => {
        let inner = self.check_type_expr(scope, inner)?;
        Ok(self.state.types.make_pointer(inner, mutable))
      }
      TypeExpr::Reference { mutable, inner } => {
        let inner = self.check_type_expr(scope, inner)?;
        Ok(self.state.types.make_reference(inner, mutable))
      }
      TypeExpr::Array { element, len } => {
        let element = self.check_type_expr(scope, element)?;
        let c = self.eval_const(scope, len)?;
        let n = u32::try_from(c.as_int().ok_or_else(|| Error::new(span, ErrorKind::NotConstant, "array length is not a constant"))?)
          .map_err(|_| Error::new(span, ErrorKind::InvalidLiteral, "array length out of range"))?;
        Ok(self.state.types.make_array(element, n))
      }
      TypeExpr::Tuple(elems) => {
        let mut tys = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in elems { tys.push(self.check_type_expr(scope, e)?) }
        Ok(self.state.types.make_tuple(tys))
      }
      TypeExpr::Function { params, ret, c_variadic } => {
        let mut p = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in params { p.push(self.check_type_expr(scope, e)?) }
        let ret = self.check_type_expr(scope, ret)?;
        Ok(self.state.types.make_function(p, ret, c_variadic))
      }
    }
  }

  fn check_named_type(&mut self, scope: ScopeId, path: &Path, span: Span) -> Result<TypeId> {
    let names: Vec<Symbol> = path.segments.iter().map(|s| s.name).collect();
    let last = path.segments.last().expect("non-empty path");
    if names.len() == 1 {
      let text = self.state.interner.resolve(last.name).to_string();
      if let Some(ty) = resolve_builtin_type(&text, &mut self.state.types) { return Ok(ty) }
    }
    let resolved = {
      match self.state.scopes.resolve_path(span, &names, scope)? {
        Entity::Struct(sid) => NamedTypeResolution::Concrete(self.state.struct_(*sid).ty),
        Entity::Trait(tid) => NamedTypeResolution::Concrete(self.state.trait_(*tid).ty),
        Entity::TypeAlias(alias) => match &alias.target {
          AliasTarget::Concrete(ty) => NamedTypeResolution::Concrete(*ty),
          AliasTarget::Generic(ga) => NamedTypeResolution::Generic {
            params: ga.params.clone(), body: ga.body, defined_in: ga.defined_in,
          },
        },
        _ => return Err(Error::new(span, ErrorKind::UnknownIdentifier, "path does not resolve to a type")),
      }
    };
    match resolved {
      NamedTypeResolution::Concrete(ty) => Ok(ty),
      NamedTypeResolution::Generic { params, body, defined_in } =>
        self.instantiate_generic_alias(scope, &params, body, defined_in, &last.generic_args, span),
    }
  }

  fn instantiate_generic_alias(&mut self, call_scope: ScopeId, params: &[Symbol], body: TypeExprId, defined_in: ScopeId, args: &[TypeExprId], span: Span) -> Result<TypeId> {
    if args.len() != params.len() {
      return Err(Error::new(span, ErrorKind::ArityMismatch, "wrong number of generic arguments for type alias"));
    }
    let mut bound_args = Vec::with_capacity(args.len());
    for &arg in args {
      bound_args.push(self.check_type_expr(call_scope, arg)?);
    }
    log::trace!("instantiating generic type alias with {} argument(s)", args.len());
    let bind_scope = self.state.scopes.push(defined_in, ScopeKind::Block, None);
    for (param, bound) in params.iter().zip(bound_args) {
      let alias = TypeAlias { name: *param, target: AliasTarget::Concrete(bound) };
      self.state.scopes.insert(bind_scope, *param, Entity::TypeAlias(Box::new(alias)), span)?;
    }
    self.check_type_expr(bind_scope, body)
  }

  // ------------------------------------------------------------- expressions

  fn check_expr(&mut self, scope: ScopeId, id: ExprId) -> Result<TypeId> {
    self.check_expr_with_context(scope, id, None)
  }

  /// Like [`Self::check_expr`], but a literal at the top of `id` is
  /// checked against `context` first (the declared/expected type at this
  /// position) instead of always defaulting on its own.
  fn check_expr_with_context(&mut self, scope: ScopeId, id: ExprId, context: Option<TypeId>) -> Result<TypeId> {
    let span = self.ast.expr_span(id);
    match self.ast.expr(id).clone() {
      Expr::Literal(lit) => self.check_literal(&lit, context),
      Expr::Identifier(name) => self.check_identifier(scope, name, span),
      Expr::Path(path) => {
        let names: Vec<Symbol> = path.segments.iter().map(|s| s.name).collect();
        match self.state.scopes.resolve_path(span, &names, scope)? {
          Entity::Variable(v) => Ok(v.ty),
          Entity::Function(fid) => Ok(self.state.function(*fid).ty),
          _ => Err(Error::new(span, ErrorKind::UnknownIdentifier, "path does not resolve to a value")),
        }
      }
      Expr::Tuple(elems) => {
        let mut tys = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in elems { tys.push(self.check_expr(scope, e)?) }
        Ok(self.state.types.make_tuple(tys))
      }
      Expr::Array(elems) => self.check_array_literal(scope, &elems, span),
      Expr::ArrayFill { value, len } => {
        let elem = self.check_expr(scope, value)?;
        let c = self.eval_const(scope, len)?;
        let n = u32::try_from(c.as_int().ok_or_else(|| Error::new(span, ErrorKind::NotConstant, "array length is not a constant"))?).unwrap_or(0);
        Ok(self.state.types.make_array(elem, n))
      }
      Expr::StructCtor { path, fields } => self.check_struct_ctor(scope, &path, &fields, span),
      Expr::Call { callee, args } => self.check_call(scope, callee, &args, span),
      Expr::Attribute { base, name } => self.check_attribute(scope, base, name, span).map(|p| p.ty),
      Expr::Index { base, index } => self.check_index(scope, base, index, span).map(|p| p.ty),
      Expr::Cast { expr, ty } => {
        let from = self.check_expr(scope, expr)?;
        let to = self.check_type_expr(scope, ty)?;
        if !self.can_explicitly_cast(from, to) {
          return Err(Error::new(span, ErrorKind::TypeMismatch, "invalid cast"));
        }
        Ok(to)
      }
      Expr::Ternary { cond, then_branch, else_branch } => {
        let cond_ty = self.check_expr(scope, cond)?;
        let bool_ty = self.state.types.get_bool();
        if !self.can_safely_cast(cond_ty, bool_ty) {
          return Err(Error::new(span, ErrorKind::TypeMismatch, "ternary condition must be a boolean"));
        }
        let then_ty = self.check_expr(scope, then_branch)?;
        let else_ty = self.check_expr(scope, else_branch)?;
        if !self.can_safely_cast(else_ty, then_ty) {
          return Err(Error::new(span, ErrorKind::TypeMismatch, "ternary branches have incompatible types"));
        }
        Ok(then_ty)
      }
      Expr::Unary { op, expr } => self.check_unary(scope, op, expr, span),
      Expr::Binary { op, lhs, rhs } => self.check_binary(scope, op, lhs, rhs, span),
      Expr::Assign { lhs, rhs } => {
        let place = self.resolve_place(scope, lhs)?;
        if !place.mutable {
          return Err(Error::new(span, ErrorKind::MutabilityMismatch, "cannot assign to an immutable place"));
        }
        let rhs_ty = self.check_expr_with_context(scope, rhs, Some(place.ty))?;
        if !self.can_safely_cast(rhs_ty, place.ty) {
          return Err(Error::new(span, ErrorKind::TypeMismatch, "assignment value does not match place type"));
        }
        self.mark_assigned_place_mutated(scope, lhs);
        Ok(place.ty)
      }
      Expr::CompoundAssign { op, lhs, rhs } => {
        let place = self.resolve_place(scope, lhs)?;
        if !place.mutable {
          return Err(Error::new(span, ErrorKind::MutabilityMismatch, "cannot assign to an immutable place"));
        }
        let rhs_ty = self.check_expr(scope, rhs)?;
        self.check_binary_types(op, place.ty, rhs_ty, span)?;
        self.mark_assigned_place_mutated(scope, lhs);
        Ok(place.ty)
      }
      Expr::Sizeof(inner) => { self.check_expr(scope, inner)?; Ok(self.state.types.get_int(32, true)) }
      Expr::SizeofType(ty) => { self.check_type_expr(scope, ty)?; Ok(self.state.types.get_int(32, true)) }
      Expr::Offsetof { ty, field } => {
        let sty = self.check_type_expr(scope, ty)?;
        self.field_index(sty, field, span)?;
        Ok(self.state.types.get_int(32, true))
      }
      Expr::Block(stmts) => self.check_block(scope, &stmts),
      Expr::If { cond, then_branch, else_branch } => self.check_if(scope, cond, then_branch, else_branch, span),
      Expr::While { cond, body } => self.check_while(scope, cond, body, span),
      Expr::ForIter { binding, iterable, body } => self.check_for_iter(scope, binding, iterable, body, span),
      Expr::ForRange { binding, start, end, inclusive: _, body } => self.check_for_range(scope, binding, start, end, body, span),
      Expr::Break { .. } | Expr::Continue { .. } => {
        if self.state.current_loop().is_none() {
          return Err(Error::new(span, ErrorKind::InvalidContext, "`break`/`continue` outside a loop"));
        }
        Ok(self.state.types.get_void())
      }
      Expr::Return(value) => self.check_return(scope, value, span),
      Expr::Defer(inner) => {
        self.check_expr(scope, inner)?;
        self.state.record_defer(scope, inner);
        Ok(self.state.types.get_void())
      }
      Expr::Match { scrutinee, arms } => self.check_match(scope, scrutinee, &arms, span),
      Expr::Closure { .. } => Err(Error::new(span, ErrorKind::NotConstant, "closures are not supported outside constant contexts")),
      Expr::TupleAssign { lhs, rhs } => self.check_tuple_assign(scope, &lhs, rhs, span),
    }
  }

  fn check_literal(&mut self, lit: &Literal, context: Option<TypeId>) -> Result<TypeId> {
    Ok(match lit {
      Literal::Int { suffix, .. } => {
        if let Some(ctx) = context {
          if matches!(self.state.types.get(ctx), Type::Int { .. }) { ctx }
          else if let Some(s) = suffix { self.state.types.get_int(s.bits, s.signed) }
          else { self.state.types.get_int(32, true) }
        } else if let Some(s) = suffix {
          self.state.types.get_int(s.bits, s.signed)
        } else {
          self.state.types.get_int(32, true)
        }
      }
      Literal::Float { suffix, .. } => {
        if let Some(ctx) = context {
          if matches!(self.state.types.get(ctx), Type::Float { .. }) { ctx }
          else {
            let is_f64 = matches!(suffix, Some(crate::types::ast::FloatSuffix::F64));
            self.state.types.get_float(if is_f64 { 64 } else { 32 })
          }
        } else {
          let is_f64 = matches!(suffix, Some(crate::types::ast::FloatSuffix::F64));
          self.state.types.get_float(if is_f64 { 64 } else { 32 })
        }
      }
      Literal::Char(_) => self.state.types.get_int(32, false),
      Literal::Str(_) => { let i8_ty = self.state.types.get_int(8, true); self.state.types.make_pointer(i8_ty, false) }
      Literal::Bool(_) => self.state.types.get_bool(),
      Literal::Null => {
        if let Some(ctx) = context {
          if matches!(self.state.types.get(ctx), Type::Pointer { .. }) { return Ok(ctx) }
        }
        let void = self.state.types.get_void();
        self.state.types.make_pointer(void, false)
      }
    })
  }

  fn check_identifier(&mut self, scope: ScopeId, name: Symbol, span: Span) -> Result<TypeId> {
    match self.state.scopes.resolve(name, scope) {
      Some(Entity::Variable(v)) => Ok(v.ty),
      Some(Entity::Function(fid)) => { let fid = *fid; Ok(self.state.function(fid).ty) }
      _ => Err(Error::new(span, ErrorKind::UnknownIdentifier, "unknown identifier")),
    }
  }

  fn check_array_literal(&mut self, scope: ScopeId, elems: &[ExprId], span: Span) -> Result<TypeId> {
    if elems.is_empty() {
      let void = self.state.types.get_void();
      return Ok(self.state.types.make_array(void, 0));
    }
    let elem_ty = self.check_expr(scope, elems[0])?;
    for &e in &elems[1..] {
      let ty = self.check_expr_with_context(scope, e, Some(elem_ty))?;
      if !self.can_safely_cast(ty, elem_ty) {
        return Err(Error::new(self.ast.expr_span(e), ErrorKind::TypeMismatch, "array elements must share a common type"));
      }
    }
    let n = u32::try_from(elems.len()).map_err(|_| Error::new(span, ErrorKind::InvalidLiteral, "array literal too large"))?;
    Ok(self.state.types.make_array(elem_ty, n))
  }

  fn check_struct_ctor(&mut self, scope: ScopeId, path: &Path, fields: &[crate::types::ast::FieldInit], span: Span) -> Result<TypeId> {
    let names: Vec<Symbol> = path.segments.iter().map(|s| s.name).collect();
    let sid = match self.state.scopes.resolve_path(span, &names, scope)? {
      Entity::Struct(sid) => *sid,
      _ => return Err(Error::new(span, ErrorKind::NotAField, "not a struct")),
    };
    for f in fields {
      let field = self.state.struct_(sid).fields.get(f.name).cloned()
        .ok_or_else(|| Error::new(span, ErrorKind::NotAField, "no such field"))?;
      let ty = self.check_expr_with_context(scope, f.value, Some(field.ty))?;
      if !self.can_safely_cast(ty, field.ty) {
        return Err(Error::new(self.ast.expr_span(f.value), ErrorKind::TypeMismatch, "field initializer has the wrong type"));
      }
    }
    Ok(self.state.struct_(sid).ty)
  }

  fn check_call(&mut self, scope: ScopeId, callee: ExprId, args: &[crate::types::ast::CallArg], span: Span) -> Result<TypeId> {
    // A call through an attribute access that resolves to a method gets
    // `self` injected automatically.
    if let Expr::Attribute { base, name } = self.ast.expr(callee).clone() {
      let callee_span = self.ast.expr_span(callee);
      let place = self.check_attribute(scope, base, name, callee_span)?;
      let is_method = matches!(self.state.types.get(place.ty), Type::Function { params, .. } if !params.is_empty());
      if is_method {
        let Type::Function { params, ret, c_variadic } = self.state.types.get(place.ty).clone() else { unreachable!() };
        self.check_arity(params.len(), args.len() + 1, c_variadic, span)?;
        for (p, a) in params.iter().skip(1).zip(args) {
          let ty = self.check_expr_with_context(scope, a.value, Some(*p))?;
          if !self.can_safely_cast(ty, *p) {
            return Err(Error::new(self.ast.expr_span(a.value), ErrorKind::TypeMismatch, "argument does not match parameter type"));
          }
        }
        return Ok(ret);
      }
    }

    let callee_ty = self.check_expr(scope, callee)?;
    let fn_ty = match self.state.types.get(callee_ty) {
      Type::Function { .. } => callee_ty,
      Type::Pointer { pointee, .. } if matches!(self.state.types.get(*pointee), Type::Function { .. }) => *pointee,
      _ => return Err(Error::new(span, ErrorKind::NotCallable, "callee is not a function or function pointer")),
    };
    let Type::Function { params, ret, c_variadic } = self.state.types.get(fn_ty).clone() else { unreachable!() };
    self.check_arity(params.len(), args.len(), c_variadic, span)?;
    for (p, a) in params.iter().zip(args) {
      let ty = self.check_expr_with_context(scope, a.value, Some(*p))?;
      if !self.can_safely_cast(ty, *p) {
        return Err(Error::new(self.ast.expr_span(a.value), ErrorKind::TypeMismatch, "argument does not match parameter type"));
      }
    }
    Ok(ret)
  }

  fn check_arity(&self, declared: usize, given: usize, c_variadic: bool, span: Span) -> Result<()> {
    let ok = if c_variadic { given >= declared.saturating_sub(1) } else { given == declared };
    if ok { Ok(()) } else {
      Err(Error::new(span, ErrorKind::ArityMismatch, "wrong number of arguments"))
    }
  }

  fn check_attribute(&mut self, scope: ScopeId, base: ExprId, name: Symbol, span: Span) -> Result<Place> {
    let base_ty = self.check_expr(scope, base)?;
    let resolved = match self.state.types.get(base_ty) {
      Type::Pointer { pointee, .. } => *pointee,
      Type::Reference { referent, .. } => *referent,
      _ => base_ty,
    };
    let field = if let Type::Struct { link, .. } = *self.state.types.get(resolved) {
      self.state.struct_(link).fields.get(name).cloned()
    } else {
      None
    };
    if let Some(field) = field {
      let mutable = field.flags.contains(StructFieldFlags::MUTABLE) && !field.flags.contains(StructFieldFlags::READONLY);
      return Ok(Place { ty: field.ty, mutable });
    }
    let fid = self.resolve_method(resolved, name, span)?;
    Ok(Place { ty: self.state.function(fid).ty, mutable: false })
  }

  fn field_index(&mut self, struct_ty: TypeId, field: Symbol, span: Span) -> Result<u32> {
    let link = match self.state.types.get(struct_ty) {
      Type::Struct { link, .. } => *link,
      _ => return Err(Error::new(span, ErrorKind::NotAField, "offsetof target is not a struct")),
    };
    self.state.struct_(link).fields.get(field).map(|f| f.index)
      .ok_or_else(|| Error::new(span, ErrorKind::NotAField, "no such field"))
  }

  fn check_index(&mut self, scope: ScopeId, base: ExprId, index: ExprId, span: Span) -> Result<Place> {
    let base_ty = self.check_expr(scope, base)?;
    let index_ty = self.check_expr(scope, index)?;
    if !matches!(self.state.types.get(index_ty), Type::Int { .. }) {
      return Err(Error::new(self.ast.expr_span(index), ErrorKind::TypeMismatch, "index must be an integer"));
    }
    match *self.state.types.get(base_ty) {
      Type::Array { element, .. } => {
        let mutable = self.resolve_place(scope, base).map(|p| p.mutable).unwrap_or(false);
        Ok(Place { ty: element, mutable })
      }
      Type::Pointer { pointee, mutable } => Ok(Place { ty: pointee, mutable }),
      _ => Err(Error::new(span, ErrorKind::NotIndexable, "not indexable")),
    }
  }

  fn check_unary(&mut self, scope: ScopeId, op: UnaryOp, expr: ExprId, span: Span) -> Result<TypeId> {
    match op {
      UnaryOp::Ref | UnaryOp::RefMut => {
        let place = self.resolve_place(scope, expr)?;
        if op == UnaryOp::RefMut && !place.mutable {
          return Err(Error::new(span, ErrorKind::MutabilityMismatch, "cannot take a mutable reference to an immutable place"));
        }
        Ok(self.state.types.make_reference(place.ty, op == UnaryOp::RefMut))
      }
      UnaryOp::Deref => {
        let ty = self.check_expr(scope, expr)?;
        match *self.state.types.get(ty) {
          Type::Pointer { pointee, .. } => Ok(pointee),
          Type::Reference { referent, .. } => Ok(referent),
          _ => Err(Error::new(span, ErrorKind::NotDereferenceable, "cannot dereference this type")),
        }
      }
      UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot => self.check_expr(scope, expr),
    }
  }

  fn check_binary(&mut self, scope: ScopeId, op: BinOp, lhs: ExprId, rhs: ExprId, span: Span) -> Result<TypeId> {
    let lhs_ty = self.check_expr(scope, lhs)?;
    let rhs_ty = self.check_expr(scope, rhs)?;
    self.check_binary_types(op, lhs_ty, rhs_ty, span)
  }

  fn check_binary_types(&mut self, op: BinOp, lhs_ty: TypeId, rhs_ty: TypeId, span: Span) -> Result<TypeId> {
    if !self.can_safely_cast(rhs_ty, lhs_ty) {
      return Err(Error::new(span, ErrorKind::TypeMismatch, "right-hand side does not match left-hand side's type"));
    }
    if op.is_comparison() { Ok(self.state.types.get_bool()) } else { Ok(lhs_ty) }
  }

  fn check_block(&mut self, scope: ScopeId, stmts: &[StmtId]) -> Result<TypeId> {
    let block_scope = self.state.scopes.push(scope, ScopeKind::Block, None);
    let mut last = self.state.types.get_void();
    for &s in stmts {
      last = self.check_stmt(block_scope, s)?;
    }
    Ok(last)
  }

  fn check_stmt(&mut self, scope: ScopeId, id: StmtId) -> Result<TypeId> {
    match self.ast.stmt(id).clone() {
      Stmt::Expr(e) => self.check_expr(scope, e),
      Stmt::Let(decl) => self.check_local_let(scope, &decl),
      Stmt::Struct(decl) => {
        let sid = self.declare_struct_skeleton(scope, None, &decl)?;
        self.resolve_struct_fields(sid, &decl)?;
        Ok(self.state.types.get_void())
      }
      Stmt::StaticAssert(decl) => { self.check_static_assert(scope, &decl)?; Ok(self.state.types.get_void()) }
      _ => Ok(self.state.types.get_void()),
    }
  }

  fn check_local_let(&mut self, scope: ScopeId, decl: &LetDecl) -> Result<TypeId> {
    let declared_ty = match decl.ty { Some(te) => Some(self.check_type_expr(scope, te)?), None => None };
    let init_ty = match decl.init { Some(e) => Some(self.check_expr_with_context(scope, e, declared_ty)?), None => None };
    let ty = match (declared_ty, init_ty) {
      (Some(t), Some(i)) => {
        if !self.can_safely_cast(i, t) {
          return Err(Error::new(decl.span, ErrorKind::TypeMismatch, "initializer does not match declared type"));
        }
        t
      }
      (Some(t), None) => t,
      (None, Some(i)) => i,
      (None, None) => return Err(Error::new(decl.span, ErrorKind::NotConstant, "`let` needs a type or an initializer")),
    };
    let fid = self.state.current_function.expect("local `let` outside a function");
    let idx = self.state.alloc_local(fid);
    let flags = if decl.mutable { VariableFlags::MUTABLE } else { VariableFlags::empty() };
    let v = Variable { name: decl.name, index: idx, ty, flags, span: decl.span };
    self.state.scopes.insert(scope, decl.name, Entity::Variable(v), decl.span)?;
    self.state.function_mut(fid).locals.push(ty);
    Ok(self.state.types.get_void())
  }

  fn check_if(&mut self, scope: ScopeId, cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId>, span: Span) -> Result<TypeId> {
    let cond_ty = self.check_expr(scope, cond)?;
    let bool_ty = self.state.types.get_bool();
    if !self.can_safely_cast(cond_ty, bool_ty) {
      return Err(Error::new(span, ErrorKind::TypeMismatch, "`if` condition must be a boolean"));
    }
    let then_ty = self.check_expr(scope, then_branch)?;
    match else_branch {
      Some(e) => self.check_expr(scope, e),
      None => Ok(then_ty),
    }
  }

  fn check_while(&mut self, scope: ScopeId, cond: ExprId, body: ExprId, span: Span) -> Result<TypeId> {
    let cond_ty = self.check_expr(scope, cond)?;
    let bool_ty = self.state.types.get_bool();
    if !self.can_safely_cast(cond_ty, bool_ty) {
      return Err(Error::new(span, ErrorKind::TypeMismatch, "`while` condition must be a boolean"));
    }
    self.with_loop(|this| this.check_expr(scope, body))?;
    Ok(self.state.types.get_void())
  }

  fn check_for_iter(&mut self, scope: ScopeId, binding: Symbol, iterable: ExprId, body: ExprId, span: Span) -> Result<TypeId> {
    let it_ty = self.check_expr(scope, iterable)?;
    let elem_ty = match *self.state.types.get(it_ty) {
      Type::Array { element, .. } => element,
      Type::Pointer { pointee, .. } => pointee,
      _ => return Err(Error::new(span, ErrorKind::NotIndexable, "`for ... in` target is not iterable")),
    };
    let loop_scope = self.state.scopes.push(scope, ScopeKind::Block, None);
    let fid = self.state.current_function.expect("`for` outside a function");
    let idx = self.state.alloc_local(fid);
    let v = Variable { name: binding, index: idx, ty: elem_ty, flags: VariableFlags::empty(), span };
    self.state.scopes.insert(loop_scope, binding, Entity::Variable(v), span)?;
    self.state.function_mut(fid).locals.push(elem_ty);
    self.with_loop(|this| this.check_expr(loop_scope, body))?;
    Ok(self.state.types.get_void())
  }

  fn check_for_range(&mut self, scope: ScopeId, binding: Symbol, start: ExprId, end: Option<ExprId>, body: ExprId, span: Span) -> Result<TypeId> {
    let start_ty = self.check_expr(scope, start)?;
    if !matches!(self.state.types.get(start_ty), Type::Int { .. }) {
      return Err(Error::new(span, ErrorKind::TypeMismatch, "`for` range bound must be an integer"));
    }
    if let Some(e) = end {
      let end_ty = self.check_expr(scope, e)?;
      if !self.can_safely_cast(end_ty, start_ty) {
        return Err(Error::new(self.ast.expr_span(e), ErrorKind::TypeMismatch, "`for` range bounds must share a type"));
      }
    }
    let loop_scope = self.state.scopes.push(scope, ScopeKind::Block, None);
    let fid = self.state.current_function.expect("`for` outside a function");
    let idx = self.state.alloc_local(fid);
    let v = Variable { name: binding, index: idx, ty: start_ty, flags: VariableFlags::MUTABLE, span };
    self.state.scopes.insert(loop_scope, binding, Entity::Variable(v), span)?;
    self.state.function_mut(fid).locals.push(start_ty);
    self.with_loop(|this| this.check_expr(loop_scope, body))?;
    Ok(self.state.types.get_void())
  }

  /// Install a placeholder loop target (actual block ids are assigned by
  /// the generator; the checker only needs `current_loop().is_some()` to
  /// validate `break`/`continue`) for the duration of `f`.
  fn with_loop<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    let target = crate::scope::LoopTarget { start: crate::ids::BlockId::new(0), end: crate::ids::BlockId::new(0) };
    self.state.push_loop(target);
    let result = f(self);
    self.state.pop_loop();
    result
  }

  fn check_return(&mut self, scope: ScopeId, value: Option<ExprId>, span: Span) -> Result<TypeId> {
    let fid = self.state.current_function.ok_or_else(|| Error::new(span, ErrorKind::InvalidContext, "`return` outside a function"))?;
    let ret_ty = self.state.function(fid).return_type;
    let void = self.state.types.get_void();
    match value {
      Some(v) => {
        let ty = self.check_expr_with_context(scope, v, Some(ret_ty))?;
        if !self.can_safely_cast(ty, ret_ty) {
          return Err(Error::new(self.ast.expr_span(v), ErrorKind::TypeMismatch, "return value does not match the function's return type"));
        }
      }
      None if ret_ty != void => {
        return Err(Error::new(span, ErrorKind::TypeMismatch, "`return;` is only valid in a function returning void"));
      }
      None => {}
    }
    Ok(void)
  }

  fn check_match(&mut self, scope: ScopeId, scrutinee: ExprId, arms: &[crate::types::ast::MatchArm], span: Span) -> Result<TypeId> {
    let scrutinee_ty = self.check_expr(scope, scrutinee)?;
    let mut has_wildcard = false;
    let mut result_ty = None;
    for arm in arms {
      if arm.is_wildcard { has_wildcard = true }
      let has_binding = arm.patterns.iter().any(|p| matches!(p, crate::types::ast::Pattern::Binding(_)));
      let arm_scope = if has_binding {
        has_wildcard = true;
        let s = self.state.scopes.push(scope, ScopeKind::Block, None);
        for p in &arm.patterns {
          if let crate::types::ast::Pattern::Binding(name) = p {
            let fid = self.state.current_function.expect("match outside a function");
            let idx = self.state.alloc_local(fid);
            let v = Variable { name: *name, index: idx, ty: scrutinee_ty, flags: VariableFlags::empty(), span: arm.span };
            self.state.scopes.insert(s, *name, Entity::Variable(v), arm.span)?;
            self.state.function_mut(fid).locals.push(scrutinee_ty);
          }
        }
        s
      } else {
        for pat in &arm.patterns {
          if let crate::types::ast::Pattern::Literal(lit) = pat {
            let pat_ty = self.check_literal(lit, Some(scrutinee_ty))?;
            if !self.can_safely_cast(pat_ty, scrutinee_ty) {
              return Err(Error::new(arm.span, ErrorKind::TypeMismatch, "match pattern does not match scrutinee type"));
            }
          }
        }
        scope
      };
      let arm_ty = self.check_expr(arm_scope, arm.body)?;
      result_ty.get_or_insert(arm_ty);
    }
    if !has_wildcard {
      return Err(Error::new(span, ErrorKind::NonExhaustiveMatch, "match is not exhaustive; add an `else` arm or a binding pattern"));
    }
    Ok(result_ty.unwrap_or_else(|| self.state.types.get_void()))
  }

  fn check_tuple_assign(&mut self, scope: ScopeId, lhs: &[ExprId], rhs: ExprId, span: Span) -> Result<TypeId> {
    let rhs_ty = self.check_expr(scope, rhs)?;
    let elements = match self.state.types.get(rhs_ty).clone() {
      Type::Tuple { elements } => elements,
      _ => return Err(Error::new(span, ErrorKind::TypeMismatch, "right-hand side of a tuple assignment must be a tuple")),
    };
    if elements.len() != lhs.len() {
      return Err(Error::new(span, ErrorKind::ArityMismatch, "tuple assignment arity mismatch"));
    }
    for (&l, &elem_ty) in lhs.iter().zip(elements.iter()) {
      let place = self.resolve_place(scope, l)?;
      if !place.mutable {
        return Err(Error::new(self.ast.expr_span(l), ErrorKind::MutabilityMismatch, "cannot assign to an immutable place"));
      }
      if !self.can_safely_cast(elem_ty, place.ty) {
        return Err(Error::new(self.ast.expr_span(l), ErrorKind::TypeMismatch, "tuple element does not match place type"));
      }
    }
    Ok(self.state.types.get_void())
  }

  // ------------------------------------------------------------------ places

  /// Marks the variable an assignment ultimately writes through as
  /// mutated (`s.x = 1` and `*p = 1` both count against whatever
  /// variable `s`/`p` themselves are bound to), for the "declared mut
  /// but never mutated" diagnostic in [`Self::warn_unused_mutability`].
  fn mark_assigned_place_mutated(&mut self, scope: ScopeId, lhs: ExprId) {
    let mut cur = lhs;
    loop {
      match self.ast.expr(cur).clone() {
        Expr::Identifier(name) => {
          self.state.scopes.mark_mutated(name, scope);
          return;
        }
        Expr::Attribute { base, .. } | Expr::Index { base, .. } | Expr::Unary { expr: base, .. } => cur = base,
        _ => return,
      }
    }
  }

  fn resolve_place(&mut self, scope: ScopeId, id: ExprId) -> Result<Place> {
    let span = self.ast.expr_span(id);
    match self.ast.expr(id).clone() {
      Expr::Identifier(name) => match self.state.scopes.resolve(name, scope) {
        Some(Entity::Variable(v)) => Ok(Place { ty: v.ty, mutable: v.is_mutable() }),
        _ => Err(Error::new(span, ErrorKind::UnknownIdentifier, "unknown identifier")),
      },
      Expr::Unary { op: UnaryOp::Deref, expr } => {
        let ty = self.check_expr(scope, expr)?;
        match *self.state.types.get(ty) {
          Type::Pointer { pointee, mutable } => Ok(Place { ty: pointee, mutable }),
          Type::Reference { referent, mutable } => Ok(Place { ty: referent, mutable }),
          _ => Err(Error::new(span, ErrorKind::NotDereferenceable, "cannot dereference this type")),
        }
      }
      Expr::Attribute { base, name } => self.check_attribute(scope, base, name, span),
      Expr::Index { base, index } => self.check_index(scope, base, index, span),
      _ => Err(Error::new(span, ErrorKind::MutabilityMismatch, "expression is not an assignable place")),
    }
  }

  // -------------------------------------------------------------- cast rules

  /// The safe-implicit-cast rule.
  #[must_use] pub fn can_safely_cast(&mut self, from: TypeId, to: TypeId) -> bool {
    if from == to { return true }
    match (self.state.types.get(from).clone(), self.state.types.get(to).clone()) {
      (Type::Int { bits: fb, signed: fs }, Type::Int { bits: tb, signed: ts }) => {
        tb >= fb && (fs == ts || (!fs && ts && tb > fb))
      }
      (Type::Float { bits: fb }, Type::Float { bits: tb }) => tb >= fb,
      (Type::Pointer { pointee: fp, mutable: fm }, Type::Pointer { pointee: tp, mutable: tm }) => fp == tp && (fm || !tm),
      (Type::Reference { referent: fr, mutable: fm }, Type::Reference { referent: tr, mutable: tm }) => fr == tr && (fm || !tm),
      (Type::Array { element: fe, .. }, Type::Pointer { pointee: tp, .. }) => fe == tp,
      (Type::Array { element: fe, .. }, Type::Reference { referent: tr, .. }) => fe == tr,
      _ => false,
    }
  }

  /// The explicit `as`-cast rule: strictly wider than the safe set, but
  /// mutability can never be strengthened even explicitly.
  #[must_use] pub fn can_explicitly_cast(&mut self, from: TypeId, to: TypeId) -> bool {
    if self.can_safely_cast(from, to) { return true }
    match (self.state.types.get(from).clone(), self.state.types.get(to).clone()) {
      (Type::Int { .. }, Type::Float { .. }) | (Type::Float { .. }, Type::Int { .. }) => true,
      (Type::Int { .. }, Type::Pointer { .. }) | (Type::Pointer { .. }, Type::Int { .. }) => true,
      (Type::Pointer { mutable: fm, .. }, Type::Pointer { mutable: tm, .. }) => fm || !tm,
      (Type::Reference { referent, mutable: fm }, Type::Pointer { pointee, mutable: tm }) => referent == pointee && (fm || !tm),
      (Type::Int { .. }, Type::Int { .. }) => true,
      _ => false,
    }
  }

  // ----------------------------------------------------------------- naming

  fn qualify(&self, scope: ScopeId, name: Symbol) -> crate::types::ty::QualifiedName {
    let mut rev = Vec::new();
    let mut cur = Some(scope);
    while let Some(id) = cur {
      let s = self.state.scopes.get(id);
      if let Some(n) = s.name { rev.push(n) }
      cur = s.parent;
    }
    let mut segs = crate::types::ty::QualifiedName::new();
    for n in rev.into_iter().rev() { segs.push(n) }
    segs.push(name);
    segs
  }
}
