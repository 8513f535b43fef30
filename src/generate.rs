//! Lowers the checked AST to the register-based IR.
//!
//! [`BytecodeGenerator`] walks the same [`Ast`] the type checker already
//! validated, re-deriving every expression's type as it goes (the AST
//! carries no persistent annotation map) and emitting
//! [`Instruction`]s into per-function [`crate::types::ir::BasicBlock`]s.
//! Because checking has already succeeded by the time this runs, most of
//! the error paths below are `Error::internal` rather than user-facing
//! diagnostics: a call site that couldn't resolve here would have failed
//! during checking first.
//!
//! Unlike the checker (one `TypeId` result per expression, nothing
//! persisted), the generator threads its "where am I emitting into"
//! state the same way `State` already tracks `current_function`: the
//! active basic block lives in `state.current_block`, flipped by
//! [`BytecodeGenerator::switch_to`] whenever control flow opens a new
//! block, rather than passed down as a parameter through every lowering
//! call.

use hashbrown::HashMap;

use crate::const_eval::{Constant, ConstantEvaluator};
use crate::error::{Error, Result};
use crate::ids::{BlockId, FunctionId, ImplId, ModuleId, Register, StructId};
use crate::layout::{self, StructLayouts};
use crate::scope::{AliasTarget, Entity, LoopTarget, ScopeId, ScopeKind, TypeAlias, Variable, VariableFlags};
use crate::span::Span;
use crate::state::State;
use crate::symbol::Symbol;
use crate::types::ast::{
  Ast, BinOp, Expr, ExprId, FieldInit, FuncDecl, ImplDecl, LetDecl, Literal, MatchArm, ModuleDecl, Path,
  Pattern, Stmt, StmtId, TraitDecl, TypeExpr, TypeExprId, UnaryOp,
};
use crate::types::ir::{BasicBlock, BinaryInstOp, Global, Instruction, Operand, Program};
use crate::types::ty::{resolve_builtin_type, Type, TypeId};

/// Where a lowered instruction lands: a function's own (block-structured)
/// body, or the flat sequence of top-level initializers/calls run before
/// `main`. `Program::global_instructions` has no block
/// structure at all, so control flow is simply unavailable while
/// lowering into it (see [`BytecodeGenerator::require_fn`]).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Sink {
  Fn(FunctionId),
  Global,
}

/// A resolved assignable address: a register holding a pointer/reference
/// to a value of type `ty`, ready for `Read`/`Write` (the IR-level
/// counterpart of the checker's own `Place`).
struct GenPlace {
  addr: Register,
  ty: TypeId,
}

/// What a named type path resolved to, mirroring the checker's own
/// `NamedTypeResolution`: captured by value so the scope-tree borrow that
/// produced it ends before any further mutation of `state`.
enum NamedTypeResolution {
  Concrete(TypeId),
  Generic { params: Vec<Symbol>, body: TypeExprId, defined_in: ScopeId },
}

pub struct BytecodeGenerator<'a> {
  ast: &'a Ast,
  state: &'a mut State,
  /// Per-parent-scope replay cursor into `ScopeTree::children`. The
  /// checker and the generator both walk the identical AST and both push
  /// exactly one child scope per block/arm in the identical order, so
  /// replaying that order here (rather than pushing fresh scopes of our
  /// own) hands every local back its checker-assigned binding for free.
  child_cursor: HashMap<ScopeId, usize>,
  global_instructions: Vec<Instruction>,
  /// How many `Stmt::Impl` items have been walked so far, in the same
  /// declaration order `declare_impl` populated `state.impls` in: impls
  /// have no name to resolve them back by, unlike functions/structs.
  impl_cursor: usize,
}

impl<'a> BytecodeGenerator<'a> {
  #[must_use] pub fn new(ast: &'a Ast, state: &'a mut State) -> Self {
    BytecodeGenerator { ast, state, child_cursor: HashMap::new(), global_instructions: Vec::new(), impl_cursor: 0 }
  }

  // --------------------------------------------------------------- blocks

  fn new_block(&mut self, fid: FunctionId, name: impl Into<String>) -> BlockId {
    let f = self.state.function_mut(fid);
    let id = BlockId::new(u32::try_from(f.basic_blocks.len()).expect("too many blocks"));
    f.basic_blocks.push(BasicBlock::new(name));
    id
  }

  /// Make `block` the active block for `sink`'s subsequent `emit` calls.
  fn switch_to(&mut self, sink: Sink, block: BlockId) {
    if let Sink::Fn(_) = sink { self.state.current_block = Some(block) }
  }

  fn current_block(&self, fid: FunctionId) -> BlockId {
    self.state.current_block.filter(|&b| b.index() < self.state.function(fid).basic_blocks.len())
      .expect("lowering into a function with no active block")
  }

  fn block_terminated(&self, fid: FunctionId, block: BlockId) -> bool {
    self.state.function(fid).basic_blocks[block.index()].terminated
  }

  fn emit(&mut self, sink: Sink, inst: Instruction) {
    match sink {
      Sink::Fn(fid) => {
        let block = self.current_block(fid);
        self.state.function_mut(fid).basic_blocks[block.index()].push(inst);
      }
      Sink::Global => self.global_instructions.push(inst),
    }
  }

  fn require_fn(&self, sink: Sink, span: Span) -> Result<FunctionId> {
    match sink {
      Sink::Fn(fid) => Ok(fid),
      Sink::Global => Err(Error::internal(span, "generate", "control flow is not available at top level")),
    }
  }

  /// Advance the replay cursor for `parent` one step, returning the next
  /// scope the checker pushed under it (see module docs). A cursor
  /// running past the checker's own children would be a generator bug,
  /// not a user-reachable error — checking already walked this same AST
  /// and pushed exactly these scopes — so this panics rather than
  /// threading a span through every caller.
  fn next_child_scope(&mut self, parent: ScopeId) -> ScopeId {
    let cursor = self.child_cursor.entry(parent).or_insert(0);
    let idx = *cursor;
    *cursor += 1;
    *self.state.scopes.get(parent).children.get(idx)
      .expect("scope cursor ran past the checker's own child scopes")
  }

  // ------------------------------------------------------------- operands

  fn operand_type(&self, op: Operand) -> TypeId {
    match op {
      Operand::Register(r) => self.state.register_type(r),
      Operand::Immediate { ty, .. } => ty,
    }
  }

  fn alloc(&mut self, ty: TypeId) -> Register {
    self.state.alloc_typed_register(ty)
  }

  fn to_register(&mut self, sink: Sink, op: Operand) -> Register {
    match op {
      Operand::Register(r) => r,
      Operand::Immediate { ty, .. } => {
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Move { dst, src: op });
        dst
      }
    }
  }

  /// Cast `op` to `to` if its current type differs, else pass it through
  /// unchanged. Only ever reached for conversions `TypeChecker::can_safely_cast`
  /// already approved at check time.
  fn safe_cast(&mut self, sink: Sink, op: Operand, to: TypeId) -> Operand {
    if self.operand_type(op) == to { return op }
    let dst = self.alloc(to);
    self.emit(sink, Instruction::Cast { dst, src: op, ty: to });
    Operand::Register(dst)
  }

  // -------------------------------------------------------------- zeroing

  /// Build a zero value of `ty`, used to fill any struct-constructor
  /// field the source left unspecified (a generation-time supplement:
  /// `TypeChecker::check_struct_ctor` never requires ctor fields to be
  /// exhaustive).
  fn zero_value(&mut self, sink: Sink, ty: TypeId, span: Span) -> Result<Operand> {
    match self.state.types.get(ty).clone() {
      Type::Void => Err(Error::internal(span, "generate", "zero value requested for void")),
      Type::Int { .. } | Type::Float { .. } => Ok(Operand::imm(0, ty)),
      Type::Pointer { .. } | Type::Reference { .. } => {
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Null { dst, ty });
        Ok(Operand::Register(dst))
      }
      Type::Array { element, len } => {
        let mut elements = smallvec::SmallVec::new();
        for _ in 0..len { elements.push(self.zero_value(sink, element, span)?) }
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewArray { dst, elements, ty });
        Ok(Operand::Register(dst))
      }
      Type::Tuple { elements: tys } => {
        let mut elements = smallvec::SmallVec::new();
        for t in tys { elements.push(self.zero_value(sink, t, span)?) }
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewTuple { dst, ty, elements });
        Ok(Operand::Register(dst))
      }
      Type::Struct { fields, .. } => {
        let mut args = smallvec::SmallVec::new();
        for f in fields { args.push(self.zero_value(sink, f, span)?) }
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Construct { dst, struct_ty: ty, args });
        Ok(Operand::Register(dst))
      }
      Type::Function { .. } | Type::Trait { .. } =>
        Err(Error::internal(span, "generate", "no zero value for a function/trait-typed field")),
    }
  }

  // ------------------------------------------------------------ constants

  fn eval_const(&mut self, scope: ScopeId, expr: ExprId) -> Result<Constant> {
    let structs = StructLayouts::new(&self.state.global_structs);
    let mut ev = ConstantEvaluator::new(self.ast, &self.state.scopes, &mut self.state.types, &self.state.interner, &self.state.constants, structs);
    ev.eval(scope, expr)
  }

  fn const_u32(&mut self, scope: ScopeId, expr: ExprId, span: Span) -> Result<u32> {
    let c = self.eval_const(scope, expr)?;
    let v = c.as_int().ok_or_else(|| Error::internal(span, "generate", "expected a constant integer"))?;
    u32::try_from(v).map_err(|_| Error::internal(span, "generate", "constant out of range"))
  }

  /// Fold a `CONSTANT`-flagged variable's already-evaluated value (an
  /// enum variant or a `const` global) into an `Operand`.
  fn lower_constant(&mut self, sink: Sink, c: &Constant) -> Result<Operand> {
    use crate::const_eval::ConstantKind;
    match &c.kind {
      ConstantKind::Int(v) => Ok(Operand::imm(*v as u64, c.ty)),
      ConstantKind::Float(f) => Ok(Operand::imm(f.to_bits(), c.ty)),
      ConstantKind::Str(s) => {
        let dst = self.alloc(c.ty);
        self.emit(sink, Instruction::NewString { dst, bytes: s.clone().into_bytes() });
        Ok(Operand::Register(dst))
      }
      ConstantKind::Array(elems) => {
        let mut ops = smallvec::SmallVec::new();
        for e in elems { ops.push(self.lower_constant(sink, e)?) }
        let dst = self.alloc(c.ty);
        self.emit(sink, Instruction::NewArray { dst, elements: ops, ty: c.ty });
        Ok(Operand::Register(dst))
      }
      ConstantKind::Tuple(elems) => {
        let mut ops = smallvec::SmallVec::new();
        for e in elems { ops.push(self.lower_constant(sink, e)?) }
        let dst = self.alloc(c.ty);
        self.emit(sink, Instruction::NewTuple { dst, ty: c.ty, elements: ops });
        Ok(Operand::Register(dst))
      }
      ConstantKind::Struct(fields) => {
        let mut args = smallvec::SmallVec::new();
        for f in fields { args.push(self.lower_constant(sink, f)?) }
        let dst = self.alloc(c.ty);
        self.emit(sink, Instruction::Construct { dst, struct_ty: c.ty, args });
        Ok(Operand::Register(dst))
      }
    }
  }

  // --------------------------------------------------------------- lookup

  fn field_lookup(&self, struct_ty: TypeId, field: Symbol, span: Span) -> Result<(u32, TypeId)> {
    let link = match self.state.types.get(struct_ty) {
      Type::Struct { link, .. } => *link,
      _ => return Err(Error::internal(span, "generate", "field access on a non-struct type")),
    };
    self.state.struct_(link).fields.get(field).map(|f| (f.index, f.ty))
      .ok_or_else(|| Error::internal(span, "generate", "no such field"))
  }

  fn resolve_variable(&self, scope: ScopeId, name: Symbol, span: Span) -> Result<Variable> {
    match self.state.scopes.resolve(name, scope) {
      Some(Entity::Variable(v)) => Ok(v.clone()),
      _ => Err(Error::internal(span, "generate", "identifier did not resolve to a variable")),
    }
  }

  /// Duplicate of `TypeChecker::resolve_method`'s exact matching
  /// algorithm. A cache-miss with no match across every generic impl is
  /// `Error::internal` here, never a fresh instantiation attempt: the
  /// checker already performed and cached this same resolution while
  /// walking the identical call site, so reaching it unresolved here
  /// would mean checking and generation disagree.
  fn resolve_method(&mut self, target_ty: TypeId, name: Symbol, span: Span) -> Result<FunctionId> {
    if let Type::Struct { link, .. } = *self.state.types.get(target_ty) {
      if let Some(Entity::Function(fid)) = self.state.scopes.get(self.state.struct_(link).scope).symbols.get(&name) {
        return Ok(*fid);
      }
    }
    for idx in 0..self.state.impls.len() {
      let iid = ImplId::new(u32::try_from(idx).unwrap());
      if !self.state.impl_(iid).is_generic() { continue }
      let Some(cond) = self.state.impl_(iid).conditions.first().cloned() else { continue };
      let Some(bound) = cond.matches(&self.state.types, target_ty) else { continue };
      if let Some(&inst_scope) = self.state.impl_(iid).instantiations.get(&bound) {
        if let Some(Entity::Function(fid)) = self.state.scopes.get(inst_scope).symbols.get(&name) {
          return Ok(*fid);
        }
        continue;
      }
      let base_scope = self.state.impl_(iid).scope;
      let inst_scope = self.state.scopes.push(base_scope, ScopeKind::Impl, None);
      let alias = TypeAlias { name: cond.parameter_name, target: AliasTarget::Concrete(bound) };
      self.state.scopes.insert(inst_scope, cond.parameter_name, Entity::TypeAlias(Box::new(alias)), span)?;
      self.copy_functions(base_scope, inst_scope)?;
      self.state.impl_mut(iid).instantiations.insert(bound, inst_scope);
      if let Some(Entity::Function(fid)) = self.state.scopes.get(inst_scope).symbols.get(&name) {
        return Ok(*fid);
      }
    }
    Err(Error::internal(span, "generate", "method resolved during checking is missing during generation"))
  }

  fn copy_functions(&mut self, from: ScopeId, to: ScopeId) -> Result<()> {
    let pairs: Vec<(Symbol, FunctionId)> = self.state.scopes.get(from).symbols.iter()
      .filter_map(|(&name, e)| if let Entity::Function(fid) = e { Some((name, *fid)) } else { None })
      .collect();
    for (name, fid) in pairs {
      let span = self.state.function(fid).span;
      self.state.scopes.insert(to, name, Entity::Function(fid), span)?;
    }
    Ok(())
  }

  /// The symbol a `Call`/`GetFunction` should carry for `fid`, honoring
  /// `![link]`/`![llvm_intrinsic]`/`![no_mangle]`/`extern "C"` in that
  /// priority order before falling back to a freshly interned qualified
  /// name.
  fn link_name(&mut self, fid: FunctionId) -> Symbol {
    let linkage = self.state.function(fid).linkage.clone();
    if let Some(name) = linkage.link_name { return self.state.interner.intern(&name) }
    if let Some(name) = linkage.export_name { return self.state.interner.intern(&name) }
    if linkage.no_mangle || linkage.extern_c { return self.state.function(fid).name }
    let qualified = self.state.function(fid).qualified_name.clone();
    let joined = qualified.iter().map(|s| self.state.interner.resolve(*s)).collect::<Vec<_>>().join("::");
    self.state.interner.intern(&joined)
  }

  // ------------------------------------------------------------ type exprs

  fn resolve_type_expr(&mut self, scope: ScopeId, id: TypeExprId) -> Result<TypeId> {
    let span = self.ast.type_expr_span(id);
    match self.ast.type_expr(id).clone() {
      TypeExpr::Named(path) => self.resolve_named_type(scope, &path, span),
      TypeExpr::Pointer { mutable, inner } => {
        let inner = self.resolve_type_expr(scope, inner)?;
        Ok(self.state.types.make_pointer(inner, mutable))
      }
      TypeExpr::Reference { mutable, inner } => {
        let inner = self.resolve_type_expr(scope, inner)?;
        Ok(self.state.types.make_reference(inner, mutable))
      }
      TypeExpr::Array { element, len } => {
        let element = self.resolve_type_expr(scope, element)?;
        let n = self.const_u32(scope, len, span)?;
        Ok(self.state.types.make_array(element, n))
      }
      TypeExpr::Tuple(elems) => {
        let mut tys = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in elems { tys.push(self.resolve_type_expr(scope, e)?) }
        Ok(self.state.types.make_tuple(tys))
      }
      TypeExpr::Function { params, ret, c_variadic } => {
        let mut p = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in params { p.push(self.resolve_type_expr(scope, e)?) }
        let ret = self.resolve_type_expr(scope, ret)?;
        Ok(self.state.types.make_function(p, ret, c_variadic))
      }
    }
  }

  fn resolve_named_type(&mut self, scope: ScopeId, path: &Path, span: Span) -> Result<TypeId> {
    let names: Vec<Symbol> = path.segments.iter().map(|s| s.name).collect();
    let last = path.segments.last().expect("non-empty path");
    if names.len() == 1 {
      let text = self.state.interner.resolve(last.name).to_string();
      if let Some(ty) = resolve_builtin_type(&text, &mut self.state.types) { return Ok(ty) }
    }
    let resolved = match self.state.scopes.resolve_path(span, &names, scope)? {
      Entity::Struct(sid) => NamedTypeResolution::Concrete(self.state.struct_(*sid).ty),
      Entity::Trait(tid) => NamedTypeResolution::Concrete(self.state.trait_(*tid).ty),
      Entity::TypeAlias(alias) => match &alias.target {
        AliasTarget::Concrete(ty) => NamedTypeResolution::Concrete(*ty),
        AliasTarget::Generic(ga) => NamedTypeResolution::Generic { params: ga.params.clone(), body: ga.body, defined_in: ga.defined_in },
      },
      _ => return Err(Error::internal(span, "generate", "path does not resolve to a type")),
    };
    match resolved {
      NamedTypeResolution::Concrete(ty) => Ok(ty),
      NamedTypeResolution::Generic { params, body, defined_in } =>
        self.instantiate_generic_alias(scope, &params, body, defined_in, &last.generic_args, span),
    }
  }

  fn instantiate_generic_alias(&mut self, call_scope: ScopeId, params: &[Symbol], body: TypeExprId, defined_in: ScopeId, args: &[TypeExprId], span: Span) -> Result<TypeId> {
    if args.len() != params.len() {
      return Err(Error::internal(span, "generate", "generic alias arity mismatch survived checking"));
    }
    let mut bound_args = Vec::with_capacity(args.len());
    for &arg in args { bound_args.push(self.resolve_type_expr(call_scope, arg)?) }
    let bind_scope = self.state.scopes.push(defined_in, ScopeKind::Block, None);
    for (param, bound) in params.iter().zip(bound_args) {
      let alias = TypeAlias { name: *param, target: AliasTarget::Concrete(bound) };
      self.state.scopes.insert(bind_scope, *param, Entity::TypeAlias(Box::new(alias)), span)?;
    }
    self.resolve_type_expr(bind_scope, body)
  }

  // --------------------------------------------------------------- places

  fn resolve_place(&mut self, scope: ScopeId, sink: Sink, id: ExprId) -> Result<GenPlace> {
    let span = self.ast.expr_span(id);
    match self.ast.expr(id).clone() {
      Expr::Identifier(name) => {
        let v = self.resolve_variable(scope, name, span)?;
        let ref_ty = self.state.types.make_reference(v.ty, v.is_mutable());
        let addr = self.alloc(ref_ty);
        if v.flags.contains(VariableFlags::GLOBAL) {
          self.emit(sink, Instruction::GetGlobalRef { dst: addr, index: v.index });
        } else {
          self.emit(sink, Instruction::GetLocalRef { dst: addr, index: v.index });
        }
        Ok(GenPlace { addr, ty: v.ty })
      }
      Expr::Unary { op: UnaryOp::Deref, expr } => {
        let op = self.lower_expr(scope, sink, expr)?
          .ok_or_else(|| Error::internal(span, "generate", "deref operand produced no value"))?;
        let ty = match self.state.types.get(self.operand_type(op)) {
          Type::Pointer { pointee, .. } => *pointee,
          Type::Reference { referent, .. } => *referent,
          _ => return Err(Error::internal(span, "generate", "deref of a non-pointer/reference survived checking")),
        };
        Ok(GenPlace { addr: self.to_register(sink, op), ty })
      }
      Expr::Attribute { base, name } => {
        let base_op = self.lower_expr(scope, sink, base)?
          .ok_or_else(|| Error::internal(span, "generate", "attribute base produced no value"))?;
        let base_ty = self.operand_type(base_op);
        let resolved = match self.state.types.get(base_ty) {
          Type::Pointer { pointee, .. } => *pointee,
          Type::Reference { referent, .. } => *referent,
          _ => base_ty,
        };
        let (index, field_ty) = self.field_lookup(resolved, name, span)?;
        let base_reg = self.to_register(sink, base_op);
        let idx_ty = self.state.types.get_int(32, false);
        let ref_ty = self.state.types.make_reference(field_ty, true);
        let addr = self.alloc(ref_ty);
        self.emit(sink, Instruction::GetMemberRef { dst: addr, base: base_reg, index: Operand::imm(u64::from(index), idx_ty) });
        Ok(GenPlace { addr, ty: field_ty })
      }
      Expr::Index { base, index } => {
        let base_op = self.lower_expr(scope, sink, base)?
          .ok_or_else(|| Error::internal(span, "generate", "index base produced no value"))?;
        let index_op = self.lower_expr(scope, sink, index)?
          .ok_or_else(|| Error::internal(span, "generate", "index value produced no value"))?;
        let base_ty = self.operand_type(base_op);
        let elem_ty = match self.state.types.get(base_ty) {
          Type::Array { element, .. } => *element,
          Type::Pointer { pointee, .. } => *pointee,
          _ => return Err(Error::internal(span, "generate", "index of a non-indexable type survived checking")),
        };
        let base_reg = self.to_register(sink, base_op);
        let ref_ty = self.state.types.make_reference(elem_ty, true);
        let addr = self.alloc(ref_ty);
        self.emit(sink, Instruction::GetMemberRef { dst: addr, base: base_reg, index: index_op });
        Ok(GenPlace { addr, ty: elem_ty })
      }
      _ => Err(Error::internal(span, "generate", "expression is not an assignable place")),
    }
  }

  // ------------------------------------------------------------ expressions

  fn lower_expr(&mut self, scope: ScopeId, sink: Sink, id: ExprId) -> Result<Option<Operand>> {
    let span = self.ast.expr_span(id);
    match self.ast.expr(id).clone() {
      Expr::Literal(lit) => self.lower_literal(sink, &lit, span).map(Some),
      Expr::Identifier(name) => self.lower_identifier(scope, sink, name, span).map(Some),
      Expr::Path(path) => self.lower_path(scope, sink, &path, span).map(Some),
      Expr::Tuple(elems) => {
        let mut ops = smallvec::SmallVec::new();
        let mut tys = smallvec::SmallVec::<[TypeId; 4]>::new();
        for e in elems {
          let op = self.lower_expr(scope, sink, e)?.ok_or_else(|| Error::internal(span, "generate", "tuple element produced no value"))?;
          tys.push(self.operand_type(op));
          ops.push(op);
        }
        let ty = self.state.types.make_tuple(tys);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewTuple { dst, ty, elements: ops });
        Ok(Some(Operand::Register(dst)))
      }
      Expr::Array(elems) => {
        let mut ops = smallvec::SmallVec::new();
        let mut elem_ty = None;
        for e in elems {
          let op = self.lower_expr(scope, sink, e)?.ok_or_else(|| Error::internal(span, "generate", "array element produced no value"))?;
          elem_ty.get_or_insert_with(|| self.operand_type(op));
          ops.push(op);
        }
        let len = u32::try_from(ops.len()).expect("array literal too long");
        let element = elem_ty.unwrap_or_else(|| self.state.types.get_void());
        let ty = self.state.types.make_array(element, len);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewArray { dst, elements: ops, ty });
        Ok(Some(Operand::Register(dst)))
      }
      Expr::ArrayFill { value, len } => {
        let val_op = self.lower_expr(scope, sink, value)?.ok_or_else(|| Error::internal(span, "generate", "array-fill value produced no value"))?;
        let n = self.const_u32(scope, len, span)?;
        let element = self.operand_type(val_op);
        let mut ops = smallvec::SmallVec::new();
        for _ in 0..n { ops.push(val_op) }
        let ty = self.state.types.make_array(element, n);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewArray { dst, elements: ops, ty });
        Ok(Some(Operand::Register(dst)))
      }
      Expr::StructCtor { path, fields } => self.lower_struct_ctor(scope, sink, &path, &fields, span).map(Some),
      Expr::Call { callee, args } => self.lower_call(scope, sink, callee, &args, span),
      Expr::Attribute { .. } | Expr::Index { .. } => {
        let place = self.resolve_place(scope, sink, id)?;
        let dst = self.alloc(place.ty);
        self.emit(sink, Instruction::Read { dst, src: Operand::Register(place.addr) });
        Ok(Some(Operand::Register(dst)))
      }
      Expr::Cast { expr, ty } => {
        let op = self.lower_expr(scope, sink, expr)?.ok_or_else(|| Error::internal(span, "generate", "cast operand produced no value"))?;
        let to = self.resolve_type_expr(scope, ty)?;
        let from = self.operand_type(op);
        if from == to { return Ok(Some(op)) }
        let dst = self.alloc(to);
        self.emit(sink, Instruction::Cast { dst, src: op, ty: to });
        Ok(Some(Operand::Register(dst)))
      }
      Expr::Ternary { cond, then_branch, else_branch } => self.lower_if_like(scope, sink, cond, then_branch, Some(else_branch), span),
      Expr::Unary { op, expr } => self.lower_unary(scope, sink, op, expr, span).map(Some),
      Expr::Binary { op, lhs, rhs } => self.lower_binary(scope, sink, op, lhs, rhs, span).map(Some),
      Expr::Assign { lhs, rhs } => {
        let place = self.resolve_place(scope, sink, lhs)?;
        let val = self.lower_expr(scope, sink, rhs)?.ok_or_else(|| Error::internal(span, "generate", "assignment rhs produced no value"))?;
        let val = self.safe_cast(sink, val, place.ty);
        self.emit(sink, Instruction::Write { dst: place.addr, src: val });
        Ok(None)
      }
      Expr::CompoundAssign { op, lhs, rhs } => {
        let place = self.resolve_place(scope, sink, lhs)?;
        let cur = self.alloc(place.ty);
        self.emit(sink, Instruction::Read { dst: cur, src: Operand::Register(place.addr) });
        let rhs_op = self.lower_expr(scope, sink, rhs)?.ok_or_else(|| Error::internal(span, "generate", "compound-assign rhs produced no value"))?;
        let rhs_op = self.safe_cast(sink, rhs_op, place.ty);
        let dst = self.alloc(place.ty);
        self.emit(sink, Instruction::Binary { op: binary_inst_op(op), dst, lhs: Operand::Register(cur), rhs: rhs_op });
        self.emit(sink, Instruction::Write { dst: place.addr, src: Operand::Register(dst) });
        Ok(None)
      }
      Expr::Sizeof(inner) => {
        // The operand is lowered for its side effects only; mirrors
        // `TypeChecker::check_expr`'s own `Sizeof` arm, which type-checks
        // (but never re-reads the value of) its operand.
        let op = self.lower_expr(scope, sink, inner)?
          .ok_or_else(|| Error::internal(span, "generate", "sizeof operand produced no value"))?;
        let ty = self.operand_type(op);
        let size = layout::size_of(ty, &self.state.types, &self.state.struct_layouts());
        let i32_ty = self.state.types.get_int(32, true);
        Ok(Some(Operand::imm(size, i32_ty)))
      }
      Expr::SizeofType(ty) => {
        let ty = self.resolve_type_expr(scope, ty)?;
        let size = layout::size_of(ty, &self.state.types, &self.state.struct_layouts());
        let i32_ty = self.state.types.get_int(32, true);
        Ok(Some(Operand::imm(size, i32_ty)))
      }
      Expr::Offsetof { ty, field } => {
        let struct_ty = self.resolve_type_expr(scope, ty)?;
        let (index, _) = self.field_lookup(struct_ty, field, span)?;
        let offset = layout::field_offset(struct_ty, index, &self.state.types, &self.state.struct_layouts());
        let i32_ty = self.state.types.get_int(32, true);
        Ok(Some(Operand::imm(offset, i32_ty)))
      }
      Expr::Block(stmts) => self.lower_block(scope, sink, &stmts),
      Expr::If { cond, then_branch, else_branch } => self.lower_if_like(scope, sink, cond, then_branch, else_branch, span),
      Expr::While { cond, body } => self.lower_while(scope, sink, cond, body, span).map(|()| None),
      Expr::ForIter { binding, iterable, body } => self.lower_for_iter(scope, sink, binding, iterable, body, span).map(|()| None),
      Expr::ForRange { binding, start, end, inclusive, body } => self.lower_for_range(scope, sink, binding, start, end, inclusive, body, span).map(|()| None),
      Expr::Break { value, .. } => {
        self.require_fn(sink, span)?;
        // A break's value is never type-checked or propagated as the
        // loop's result (loops are statements, not expressions, here);
        // it is still lowered for its side effects.
        if let Some(v) = value { self.lower_expr(scope, sink, v)?; }
        let target = self.state.current_loop().ok_or_else(|| Error::internal(span, "generate", "break outside a loop"))?;
        self.emit(sink, Instruction::Jump { target: target.end });
        Ok(None)
      }
      Expr::Continue { .. } => {
        self.require_fn(sink, span)?;
        let target = self.state.current_loop().ok_or_else(|| Error::internal(span, "generate", "continue outside a loop"))?;
        self.emit(sink, Instruction::Jump { target: target.start });
        Ok(None)
      }
      Expr::Return(value) => {
        let fid = self.require_fn(sink, span)?;
        let ret_ty = self.state.function(fid).return_type;
        let val = match value {
          Some(v) => {
            let op = self.lower_expr(scope, sink, v)?.ok_or_else(|| Error::internal(span, "generate", "return value produced no value"))?;
            Some(self.safe_cast(sink, op, ret_ty))
          }
          None => None,
        };
        self.lower_pending_defers(sink)?;
        self.emit(sink, Instruction::Return { value: val });
        Ok(None)
      }
      Expr::Defer(inner) => {
        self.state.record_defer(scope, inner);
        Ok(None)
      }
      Expr::Match { scrutinee, arms } => self.lower_match(scope, sink, scrutinee, &arms, span),
      Expr::Closure { .. } => Err(Error::internal(span, "generate", "closures are not constant and cannot reach generation")),
      Expr::TupleAssign { lhs, rhs } => self.lower_tuple_assign(scope, sink, &lhs, rhs, span).map(|()| None),
    }
  }

  fn lower_literal(&mut self, sink: Sink, lit: &Literal, span: Span) -> Result<Operand> {
    Ok(match *lit {
      Literal::Int { value, suffix } => {
        let ty = match suffix {
          Some(s) => self.state.types.get_int(s.bits, s.signed),
          None => self.state.types.get_int(32, true),
        };
        Operand::imm(value as u64, ty)
      }
      Literal::Float { value, suffix } => {
        let bits = match suffix { Some(crate::types::ast::FloatSuffix::F32) => 32, _ => 64 };
        let ty = self.state.types.get_float(bits);
        let raw = if bits == 32 { u64::from((value as f32).to_bits()) } else { value.to_bits() };
        Operand::imm(raw, ty)
      }
      Literal::Char(c) => {
        let ty = self.state.types.get_int(32, false);
        Operand::imm(u64::from(c as u32), ty)
      }
      Literal::Str(ref s) => {
        let i8_ty = self.state.types.get_int(8, false);
        let ty = self.state.types.make_pointer(i8_ty, false);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::NewString { dst, bytes: s.clone().into_bytes() });
        Operand::Register(dst)
      }
      Literal::Bool(b) => {
        let ty = self.state.types.get_bool();
        Operand::imm(u64::from(b), ty)
      }
      Literal::Null => {
        let i8_ty = self.state.types.get_int(8, false);
        let ty = self.state.types.make_pointer(i8_ty, true);
        Operand::imm(0, ty)
      }
    })
  }

  /// A `CONSTANT`-flagged variable (a folded `const` global or a desugared
  /// enum variant) never becomes a load: its value
  /// was already folded by the checker and lives in `state.constants`.
  /// Anything else is a real storage slot, global or local.
  fn lower_variable_read(&mut self, sink: Sink, v: &Variable) -> Result<Operand> {
    if v.flags.contains(VariableFlags::CONSTANT) {
      if let Some(c) = self.state.constants.get(&v.index).cloned() {
        return self.lower_constant(sink, &c);
      }
    }
    let dst = self.alloc(v.ty);
    if v.flags.contains(VariableFlags::GLOBAL) {
      self.emit(sink, Instruction::GetGlobal { dst, index: v.index });
    } else {
      self.emit(sink, Instruction::GetLocal { dst, index: v.index });
    }
    Ok(Operand::Register(dst))
  }

  fn lower_identifier(&mut self, scope: ScopeId, sink: Sink, name: Symbol, span: Span) -> Result<Operand> {
    enum Found { Var(Variable), Fn(FunctionId) }
    let found = match self.state.scopes.resolve(name, scope) {
      Some(Entity::Variable(v)) => Found::Var(v.clone()),
      Some(Entity::Function(fid)) => Found::Fn(*fid),
      _ => return Err(Error::internal(span, "generate", "identifier did not resolve during generation")),
    };
    match found {
      Found::Var(v) => self.lower_variable_read(sink, &v),
      Found::Fn(fid) => {
        let func = self.link_name(fid);
        let ty = self.state.function(fid).ty;
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::GetFunction { dst, func });
        Ok(Operand::Register(dst))
      }
    }
  }

  fn lower_path(&mut self, scope: ScopeId, sink: Sink, path: &Path, span: Span) -> Result<Operand> {
    let names: Vec<Symbol> = path.segments.iter().map(|s| s.name).collect();
    enum Found { Var(Variable), Fn(FunctionId) }
    let found = match self.state.scopes.resolve_path(span, &names, scope)? {
      Entity::Variable(v) => Found::Var(v.clone()),
      Entity::Function(fid) => Found::Fn(*fid),
      _ => return Err(Error::internal(span, "generate", "path does not resolve to a value")),
    };
    match found {
      Found::Var(v) => self.lower_variable_read(sink, &v),
      Found::Fn(fid) => {
        let func = self.link_name(fid);
        let ty = self.state.function(fid).ty;
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::GetFunction { dst, func });
        Ok(Operand::Register(dst))
      }
    }
  }

  fn lower_struct_ctor(&mut self, scope: ScopeId, sink: Sink, path: &Path, fields: &[crate::types::ast::FieldInit], span: Span) -> Result<Operand> {
    let ty = self.resolve_named_type(scope, path, span)?;
    let link = match self.state.types.get(ty) {
      Type::Struct { link, .. } => *link,
      _ => return Err(Error::internal(span, "generate", "struct constructor on a non-struct type")),
    };
    let field_count = self.state.struct_(link).fields.len();
    let mut args: Vec<Option<Operand>> = vec![None; field_count];
    for f in fields {
      let (index, field_ty) = self.field_lookup(ty, f.name, span)?;
      let op = self.lower_expr(scope, sink, f.value)?
        .ok_or_else(|| Error::internal(span, "generate", "struct field initializer produced no value"))?;
      args[index as usize] = Some(self.safe_cast(sink, op, field_ty));
    }
    let field_types: Vec<TypeId> = self.state.struct_(link).fields.iter().map(|f| f.ty).collect();
    let mut resolved = smallvec::SmallVec::new();
    for (slot, field_ty) in args.into_iter().zip(field_types) {
      resolved.push(match slot {
        Some(op) => op,
        None => self.zero_value(sink, field_ty, span)?,
      });
    }
    let dst = self.alloc(ty);
    self.emit(sink, Instruction::Construct { dst, struct_ty: ty, args: resolved });
    Ok(Operand::Register(dst))
  }

  /// Mirrors `TypeChecker::check_call`'s exact shape: a call through an
  /// attribute access that resolves to a method (not a function-pointer
  /// field) gets its receiver injected as the first argument.
  fn lower_call(&mut self, scope: ScopeId, sink: Sink, callee: ExprId, args: &[crate::types::ast::CallArg], span: Span) -> Result<Option<Operand>> {
    if let Expr::Attribute { base, name } = self.ast.expr(callee).clone() {
      let callee_span = self.ast.expr_span(callee);
      let base_op = self.lower_expr(scope, sink, base)?
        .ok_or_else(|| Error::internal(callee_span, "generate", "method receiver produced no value"))?;
      let base_ty = self.operand_type(base_op);
      let resolved_ty = match self.state.types.get(base_ty) {
        Type::Pointer { pointee, .. } => *pointee,
        Type::Reference { referent, .. } => *referent,
        _ => base_ty,
      };
      let field = if let Type::Struct { link, .. } = self.state.types.get(resolved_ty) {
        self.state.struct_(*link).fields.get(name).cloned()
      } else {
        None
      };
      if field.is_none() {
        let fid = self.resolve_method(resolved_ty, name, callee_span)?;
        let fn_ty = self.state.function(fid).ty;
        let func_reg = self.func_register(sink, fid);
        return self.emit_call(sink, Operand::Register(func_reg), fn_ty, Some(base_op), args, scope, span);
      }
    }
    let callee_op = self.lower_expr(scope, sink, callee)?
      .ok_or_else(|| Error::internal(span, "generate", "call target produced no value"))?;
    let callee_ty = self.operand_type(callee_op);
    let fn_ty = match self.state.types.get(callee_ty) {
      Type::Function { .. } => callee_ty,
      Type::Pointer { pointee, .. } if matches!(self.state.types.get(*pointee), Type::Function { .. }) => *pointee,
      _ => return Err(Error::internal(span, "generate", "callee is not callable")),
    };
    self.emit_call(sink, callee_op, fn_ty, None, args, scope, span)
  }

  fn func_register(&mut self, sink: Sink, fid: FunctionId) -> Register {
    let func = self.link_name(fid);
    let ty = self.state.function(fid).ty;
    let dst = self.alloc(ty);
    self.emit(sink, Instruction::GetFunction { dst, func });
    dst
  }

  fn emit_call(&mut self, sink: Sink, func: Operand, fn_ty: TypeId, receiver: Option<Operand>, args: &[crate::types::ast::CallArg], scope: ScopeId, span: Span) -> Result<Option<Operand>> {
    let (params, ret, c_variadic) = match self.state.types.get(fn_ty).clone() {
      Type::Function { params, ret, c_variadic } => (params, ret, c_variadic),
      _ => return Err(Error::internal(span, "generate", "call target is not function-typed")),
    };
    let mut call_args = smallvec::SmallVec::new();
    let mut params_iter = params.iter();
    if let Some(recv) = receiver {
      let self_ty = params_iter.next().copied().unwrap_or_else(|| self.operand_type(recv));
      call_args.push(self.safe_cast(sink, recv, self_ty));
    }
    for a in args {
      let op = self.lower_expr(scope, sink, a.value)?
        .ok_or_else(|| Error::internal(self.ast.expr_span(a.value), "generate", "call argument produced no value"))?;
      let op = match params_iter.next() {
        Some(&p) => self.safe_cast(sink, op, p),
        None => op,
      };
      let _ = c_variadic;
      call_args.push(op);
    }
    let void = self.state.types.get_void();
    if ret == void {
      let dst = self.alloc(void);
      self.emit(sink, Instruction::Call { dst, func, ty: ret, args: call_args });
      Ok(None)
    } else {
      let dst = self.alloc(ret);
      self.emit(sink, Instruction::Call { dst, func, ty: ret, args: call_args });
      Ok(Some(Operand::Register(dst)))
    }
  }

  fn lower_unary(&mut self, scope: ScopeId, sink: Sink, op: UnaryOp, expr: ExprId, span: Span) -> Result<Operand> {
    match op {
      UnaryOp::Ref | UnaryOp::RefMut => {
        let place = self.resolve_place(scope, sink, expr)?;
        Ok(Operand::Register(place.addr))
      }
      UnaryOp::Deref => {
        let op = self.lower_expr(scope, sink, expr)?
          .ok_or_else(|| Error::internal(span, "generate", "deref operand produced no value"))?;
        let ty = match self.state.types.get(self.operand_type(op)) {
          Type::Pointer { pointee, .. } => *pointee,
          Type::Reference { referent, .. } => *referent,
          _ => return Err(Error::internal(span, "generate", "deref of a non-pointer/reference survived checking")),
        };
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Read { dst, src: op });
        Ok(Operand::Register(dst))
      }
      UnaryOp::Neg => {
        let op = self.lower_expr(scope, sink, expr)?
          .ok_or_else(|| Error::internal(span, "generate", "negation operand produced no value"))?;
        let ty = self.operand_type(op);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Binary { op: BinaryInstOp::Sub, dst, lhs: Operand::imm(0, ty), rhs: op });
        Ok(Operand::Register(dst))
      }
      UnaryOp::Not => {
        let op = self.lower_expr(scope, sink, expr)?
          .ok_or_else(|| Error::internal(span, "generate", "logical-not operand produced no value"))?;
        let ty = self.operand_type(op);
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Not { dst, src: op });
        Ok(Operand::Register(dst))
      }
      UnaryOp::BitNot => {
        // No dedicated bitwise-not instruction: synthesized as `x ^ -1`.
        let op = self.lower_expr(scope, sink, expr)?
          .ok_or_else(|| Error::internal(span, "generate", "bitwise-not operand produced no value"))?;
        let ty = self.operand_type(op);
        let mask = match self.state.types.get(ty) {
          Type::Int { bits, .. } => if *bits >= 128 { u64::MAX } else { (1u128 << bits) as u64 - 1 },
          _ => return Err(Error::internal(span, "generate", "bitwise-not on a non-integer survived checking")),
        };
        let dst = self.alloc(ty);
        self.emit(sink, Instruction::Binary { op: BinaryInstOp::Xor, dst, lhs: op, rhs: Operand::imm(mask, ty) });
        Ok(Operand::Register(dst))
      }
    }
  }

  fn lower_binary(&mut self, scope: ScopeId, sink: Sink, op: BinOp, lhs: ExprId, rhs: ExprId, span: Span) -> Result<Operand> {
    let lhs_op = self.lower_expr(scope, sink, lhs)?
      .ok_or_else(|| Error::internal(span, "generate", "binary lhs produced no value"))?;
    let rhs_op = self.lower_expr(scope, sink, rhs)?
      .ok_or_else(|| Error::internal(span, "generate", "binary rhs produced no value"))?;
    let lhs_ty = self.operand_type(lhs_op);
    let rhs_op = self.safe_cast(sink, rhs_op, lhs_ty);
    let result_ty = if op.is_comparison() { self.state.types.get_bool() } else { lhs_ty };
    let dst = self.alloc(result_ty);
    self.emit(sink, Instruction::Binary { op: binary_inst_op(op), dst, lhs: lhs_op, rhs: rhs_op });
    Ok(Operand::Register(dst))
  }
}

fn binary_inst_op(op: BinOp) -> BinaryInstOp {
  match op {
    BinOp::Add => BinaryInstOp::Add,
    BinOp::Sub => BinaryInstOp::Sub,
    BinOp::Mul => BinaryInstOp::Mul,
    BinOp::Div => BinaryInstOp::Div,
    BinOp::Mod => BinaryInstOp::Mod,
    BinOp::BitOr => BinaryInstOp::Or,
    BinOp::BitAnd => BinaryInstOp::And,
    BinOp::BitXor => BinaryInstOp::Xor,
    BinOp::Shl => BinaryInstOp::Lsh,
    BinOp::Shr => BinaryInstOp::Rsh,
    BinOp::LogicalOr => BinaryInstOp::LogicalOr,
    BinOp::LogicalAnd => BinaryInstOp::LogicalAnd,
    BinOp::Eq => BinaryInstOp::Eq,
    BinOp::Neq => BinaryInstOp::Neq,
    BinOp::Gt => BinaryInstOp::Gt,
    BinOp::Lt => BinaryInstOp::Lt,
    BinOp::Gte => BinaryInstOp::Gte,
    BinOp::Lte => BinaryInstOp::Lte,
  }
}

impl<'a> BytecodeGenerator<'a> {
  /// Re-run every deferred expression recorded so far in the current
  /// function, in LIFO order, without removing them from the frame: a
  /// function can have several `return`s, each of which must replay the
  /// same accumulated defers from its own point in the body.
  fn lower_pending_defers(&mut self, sink: Sink) -> Result<()> {
    for (dscope, dexpr) in self.state.pending_defers() {
      self.lower_expr(dscope, sink, dexpr)?;
    }
    Ok(())
  }

  /// Shared lowering for `if`/`else` and `?:`: both branch, and unify
  /// whatever value each produces into one destination register (later
  /// branches safe-cast toward the first branch that produced a value).
  fn lower_if_like(&mut self, scope: ScopeId, sink: Sink, cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId>, span: Span) -> Result<Option<Operand>> {
    let fid = self.require_fn(sink, span)?;
    let cond_op = self.lower_expr(scope, sink, cond)?
      .ok_or_else(|| Error::internal(span, "generate", "condition produced no value"))?;
    let then_block = self.new_block(fid, "if.then");
    let else_block = self.new_block(fid, "if.else");
    let end_block = self.new_block(fid, "if.end");
    self.emit(sink, Instruction::JumpIf { cond: cond_op, then_block, else_block });

    self.switch_to(sink, then_block);
    let then_val = self.lower_expr(scope, sink, then_branch)?;
    let mut dst: Option<Register> = None;
    if !self.block_terminated(fid, self.current_block(fid)) {
      if let Some(op) = then_val {
        let ty = self.operand_type(op);
        let d = self.alloc(ty);
        self.emit(sink, Instruction::Move { dst: d, src: op });
        dst = Some(d);
      }
      self.emit(sink, Instruction::Jump { target: end_block });
    }

    self.switch_to(sink, else_block);
    let else_val = match else_branch {
      Some(e) => self.lower_expr(scope, sink, e)?,
      None => None,
    };
    if !self.block_terminated(fid, self.current_block(fid)) {
      if let Some(op) = else_val {
        match dst {
          Some(d) => {
            let ty = self.operand_type(Operand::Register(d));
            let casted = self.safe_cast(sink, op, ty);
            self.emit(sink, Instruction::Move { dst: d, src: casted });
          }
          None => {
            let ty = self.operand_type(op);
            let d = self.alloc(ty);
            self.emit(sink, Instruction::Move { dst: d, src: op });
            dst = Some(d);
          }
        }
      }
      self.emit(sink, Instruction::Jump { target: end_block });
    }

    self.switch_to(sink, end_block);
    Ok(dst.map(Operand::Register))
  }

  /// The condition is re-evaluated (and its instructions re-emitted) on
  /// every iteration: there is no phi/SSA-merge mechanism here to hoist a
  /// loop-invariant condition check out of the loop body.
  fn lower_while(&mut self, scope: ScopeId, sink: Sink, cond: ExprId, body: ExprId, span: Span) -> Result<()> {
    let fid = self.require_fn(sink, span)?;
    let cond_block = self.new_block(fid, "while.cond");
    let body_block = self.new_block(fid, "while.body");
    let end_block = self.new_block(fid, "while.end");
    self.emit(sink, Instruction::Jump { target: cond_block });

    self.switch_to(sink, cond_block);
    let cond_op = self.lower_expr(scope, sink, cond)?
      .ok_or_else(|| Error::internal(span, "generate", "condition produced no value"))?;
    self.emit(sink, Instruction::JumpIf { cond: cond_op, then_block: body_block, else_block: end_block });

    self.switch_to(sink, body_block);
    self.state.push_loop(LoopTarget { start: cond_block, end: end_block });
    self.lower_expr(scope, sink, body)?;
    if !self.block_terminated(fid, self.current_block(fid)) {
      self.emit(sink, Instruction::Jump { target: cond_block });
    }
    self.state.pop_loop();
    self.switch_to(sink, end_block);
    Ok(())
  }

  /// `for binding in iterable`: array-only (a raw pointer has no static
  /// length to count down from). The checker accepts a pointer target
  /// too (symmetric with `Index`), so this can still hit the internal
  /// error below on otherwise well-typed code — see DESIGN.md.
  fn lower_for_iter(&mut self, scope: ScopeId, sink: Sink, binding: Symbol, iterable: ExprId, body: ExprId, span: Span) -> Result<()> {
    let fid = self.require_fn(sink, span)?;
    let it_op = self.lower_expr(scope, sink, iterable)?
      .ok_or_else(|| Error::internal(span, "generate", "iterable produced no value"))?;
    let it_ty = self.operand_type(it_op);
    let (elem_ty, len) = match self.state.types.get(it_ty) {
      Type::Array { element, len } => (*element, *len),
      _ => return Err(Error::internal(span, "generate", "`for ... in` over a non-array has no statically known length")),
    };
    let loop_scope = self.next_child_scope(scope);
    let v = self.resolve_variable(loop_scope, binding, span)?;
    let it_reg = self.to_register(sink, it_op);

    let idx_ty = self.state.types.get_int(32, false);
    let idx_local = self.state.alloc_local(fid);
    self.state.function_mut(fid).locals.push(idx_ty);
    self.emit(sink, Instruction::SetLocal { index: idx_local, src: Some(Operand::imm(0, idx_ty)) });

    let cond_block = self.new_block(fid, "for.cond");
    let body_block = self.new_block(fid, "for.body");
    let end_block = self.new_block(fid, "for.end");
    self.emit(sink, Instruction::Jump { target: cond_block });

    self.switch_to(sink, cond_block);
    let idx_reg = self.alloc(idx_ty);
    self.emit(sink, Instruction::GetLocal { dst: idx_reg, index: idx_local });
    let bool_ty = self.state.types.get_bool();
    let cmp = self.alloc(bool_ty);
    self.emit(sink, Instruction::Binary { op: BinaryInstOp::Lt, dst: cmp, lhs: Operand::Register(idx_reg), rhs: Operand::imm(u64::from(len), idx_ty) });
    self.emit(sink, Instruction::JumpIf { cond: Operand::Register(cmp), then_block: body_block, else_block: end_block });

    self.switch_to(sink, body_block);
    let elem_reg = self.alloc(elem_ty);
    self.emit(sink, Instruction::GetMember { dst: elem_reg, base: it_reg, index: Operand::Register(idx_reg) });
    self.emit(sink, Instruction::SetLocal { index: v.index, src: Some(Operand::Register(elem_reg)) });
    self.state.push_loop(LoopTarget { start: cond_block, end: end_block });
    self.lower_expr(loop_scope, sink, body)?;
    if !self.block_terminated(fid, self.current_block(fid)) {
      let next_idx = self.alloc(idx_ty);
      self.emit(sink, Instruction::Binary { op: BinaryInstOp::Add, dst: next_idx, lhs: Operand::Register(idx_reg), rhs: Operand::imm(1, idx_ty) });
      self.emit(sink, Instruction::SetLocal { index: idx_local, src: Some(Operand::Register(next_idx)) });
      self.emit(sink, Instruction::Jump { target: cond_block });
    }
    self.state.pop_loop();
    self.switch_to(sink, end_block);
    Ok(())
  }

  fn lower_for_range(&mut self, scope: ScopeId, sink: Sink, binding: Symbol, start: ExprId, end: Option<ExprId>, inclusive: bool, body: ExprId, span: Span) -> Result<()> {
    let fid = self.require_fn(sink, span)?;
    let start_op = self.lower_expr(scope, sink, start)?
      .ok_or_else(|| Error::internal(span, "generate", "range start produced no value"))?;
    let start_ty = self.operand_type(start_op);
    let end_op = match end {
      Some(e) => {
        let op = self.lower_expr(scope, sink, e)?
          .ok_or_else(|| Error::internal(span, "generate", "range end produced no value"))?;
        Some(self.safe_cast(sink, op, start_ty))
      }
      None => None,
    };
    let loop_scope = self.next_child_scope(scope);
    let v = self.resolve_variable(loop_scope, binding, span)?;
    self.emit(sink, Instruction::SetLocal { index: v.index, src: Some(start_op) });

    let cond_block = self.new_block(fid, "for.cond");
    let body_block = self.new_block(fid, "for.body");
    let end_block = self.new_block(fid, "for.end");
    self.emit(sink, Instruction::Jump { target: cond_block });

    self.switch_to(sink, cond_block);
    let cur_reg = self.alloc(start_ty);
    self.emit(sink, Instruction::GetLocal { dst: cur_reg, index: v.index });
    match end_op {
      Some(end_val) => {
        let cmp_op = if inclusive { BinaryInstOp::Lte } else { BinaryInstOp::Lt };
        let bool_ty = self.state.types.get_bool();
        let cmp = self.alloc(bool_ty);
        self.emit(sink, Instruction::Binary { op: cmp_op, dst: cmp, lhs: Operand::Register(cur_reg), rhs: end_val });
        self.emit(sink, Instruction::JumpIf { cond: Operand::Register(cmp), then_block: body_block, else_block: end_block });
      }
      // An open-ended range (`for i in 0..`) only terminates via `break`.
      None => self.emit(sink, Instruction::Jump { target: body_block }),
    }

    self.switch_to(sink, body_block);
    self.state.push_loop(LoopTarget { start: cond_block, end: end_block });
    self.lower_expr(loop_scope, sink, body)?;
    if !self.block_terminated(fid, self.current_block(fid)) {
      let next = self.alloc(start_ty);
      self.emit(sink, Instruction::Binary { op: BinaryInstOp::Add, dst: next, lhs: Operand::Register(cur_reg), rhs: Operand::imm(1, start_ty) });
      self.emit(sink, Instruction::SetLocal { index: v.index, src: Some(Operand::Register(next)) });
      self.emit(sink, Instruction::Jump { target: cond_block });
    }
    self.state.pop_loop();
    self.switch_to(sink, end_block);
    Ok(())
  }

  /// Mirrors `TypeChecker::check_match`'s exact binding/wildcard rules: a
  /// literal-only arm compiles to an `==`-chain, OR-folded across its
  /// alternatives; an arm carrying a binding pattern (or the explicit
  /// `else`) matches unconditionally and ends the dispatch chain, since
  /// nothing after it could ever run. Arm results unify into one
  /// destination register, anchored on the first arm that produces a
  /// value — a generation-time-only reconciliation with no counterpart
  /// in checking (see DESIGN.md).
  fn lower_match(&mut self, scope: ScopeId, sink: Sink, scrutinee: ExprId, arms: &[MatchArm], span: Span) -> Result<Option<Operand>> {
    let fid = self.require_fn(sink, span)?;
    let scrutinee_op = self.lower_expr(scope, sink, scrutinee)?
      .ok_or_else(|| Error::internal(span, "generate", "match scrutinee produced no value"))?;
    let scrutinee_ty = self.operand_type(scrutinee_op);
    let end_block = self.new_block(fid, "match.end");
    let mut dst: Option<Register> = None;

    for arm in arms {
      let has_binding = arm.patterns.iter().any(|p| matches!(p, Pattern::Binding(_)));
      let body_block = self.new_block(fid, "match.arm");
      if has_binding || arm.is_wildcard {
        self.emit(sink, Instruction::Jump { target: body_block });
        self.switch_to(sink, body_block);
        let arm_scope = if has_binding { self.next_child_scope(scope) } else { scope };
        self.lower_match_arm_body(fid, sink, arm_scope, arm, end_block, &mut dst)?;
        self.switch_to(sink, end_block);
        return Ok(dst.map(Operand::Register));
      }
      let next_test_block = self.new_block(fid, "match.test");
      let mut cond: Option<Operand> = None;
      for pat in &arm.patterns {
        if let Pattern::Literal(lit) = pat {
          let lit_op = self.lower_literal(sink, lit, arm.span)?;
          let lit_op = self.safe_cast(sink, lit_op, scrutinee_ty);
          let bool_ty = self.state.types.get_bool();
          let eq_dst = self.alloc(bool_ty);
          self.emit(sink, Instruction::Binary { op: BinaryInstOp::Eq, dst: eq_dst, lhs: scrutinee_op, rhs: lit_op });
          cond = Some(match cond {
            None => Operand::Register(eq_dst),
            Some(prev) => {
              let or_dst = self.alloc(bool_ty);
              self.emit(sink, Instruction::Binary { op: BinaryInstOp::LogicalOr, dst: or_dst, lhs: prev, rhs: Operand::Register(eq_dst) });
              Operand::Register(or_dst)
            }
          });
        }
      }
      let cond = cond.ok_or_else(|| Error::internal(arm.span, "generate", "match arm has no literal patterns"))?;
      self.emit(sink, Instruction::JumpIf { cond, then_block: body_block, else_block: next_test_block });

      self.switch_to(sink, body_block);
      self.lower_match_arm_body(fid, sink, scope, arm, end_block, &mut dst)?;
      self.switch_to(sink, next_test_block);
    }
    Err(Error::internal(span, "generate", "match is not exhaustive (should have been rejected during checking)"))
  }

  fn lower_match_arm_body(&mut self, fid: FunctionId, sink: Sink, arm_scope: ScopeId, arm: &MatchArm, end_block: BlockId, dst: &mut Option<Register>) -> Result<()> {
    let val = self.lower_expr(arm_scope, sink, arm.body)?;
    if self.block_terminated(fid, self.current_block(fid)) { return Ok(()) }
    if let Some(op) = val {
      match *dst {
        Some(d) => {
          let ty = self.operand_type(Operand::Register(d));
          let casted = self.safe_cast(sink, op, ty);
          self.emit(sink, Instruction::Move { dst: d, src: casted });
        }
        None => {
          let ty = self.operand_type(op);
          let d = self.alloc(ty);
          self.emit(sink, Instruction::Move { dst: d, src: op });
          *dst = Some(d);
        }
      }
    }
    self.emit(sink, Instruction::Jump { target: end_block });
    Ok(())
  }

  fn lower_tuple_assign(&mut self, scope: ScopeId, sink: Sink, lhs: &[ExprId], rhs: ExprId, span: Span) -> Result<()> {
    let rhs_op = self.lower_expr(scope, sink, rhs)?
      .ok_or_else(|| Error::internal(span, "generate", "tuple-assignment rhs produced no value"))?;
    let rhs_ty = self.operand_type(rhs_op);
    let elements = match self.state.types.get(rhs_ty).clone() {
      Type::Tuple { elements } => elements,
      _ => return Err(Error::internal(span, "generate", "tuple-assignment rhs is not tuple-typed")),
    };
    let rhs_reg = self.to_register(sink, rhs_op);
    let idx_ty = self.state.types.get_int(32, false);
    for (i, &l) in lhs.iter().enumerate() {
      let elem_ty = elements[i];
      let place = self.resolve_place(scope, sink, l)?;
      let val_reg = self.alloc(elem_ty);
      self.emit(sink, Instruction::GetMember { dst: val_reg, base: rhs_reg, index: Operand::imm(i as u64, idx_ty) });
      let val = self.safe_cast(sink, Operand::Register(val_reg), place.ty);
      self.emit(sink, Instruction::Write { dst: place.addr, src: val });
    }
    Ok(())
  }

  /// Every statement's runtime effect; its value (if any) only matters to
  /// the enclosing block when it is the last statement.
  fn lower_stmt(&mut self, scope: ScopeId, sink: Sink, id: StmtId) -> Result<Option<Operand>> {
    match self.ast.stmt(id).clone() {
      Stmt::Expr(e) => self.lower_expr(scope, sink, e),
      Stmt::Let(decl) => { self.lower_local_let(scope, sink, &decl)?; Ok(None) }
      // Struct/enum/trait/impl/type-alias/module/import/using declarations
      // have no runtime effect of their own at statement position; impls
      // and function bodies are lowered by `lower_block_items` directly.
      Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Trait(_) | Stmt::Impl(_) | Stmt::TypeAlias(_)
        | Stmt::Module(_) | Stmt::Import(_) | Stmt::Using(_) | Stmt::Func(_) | Stmt::StaticAssert(_) => Ok(None),
    }
  }

  /// A local `let` only ever resolves a slot the checker already
  /// allocated (`check_local_let` inserted it); generation never
  /// calls `alloc_local`/`scopes.insert` for one of these.
  fn lower_local_let(&mut self, scope: ScopeId, sink: Sink, decl: &LetDecl) -> Result<()> {
    if decl.is_const { return Ok(()) } // folded into `state.constants`, nothing to emit
    let v = self.resolve_variable(scope, decl.name, decl.span)?;
    let src = match decl.init {
      Some(e) => {
        let op = self.lower_expr(scope, sink, e)?
          .ok_or_else(|| Error::internal(decl.span, "generate", "let initializer produced no value"))?;
        Some(self.safe_cast(sink, op, v.ty))
      }
      None => None,
    };
    self.emit(sink, Instruction::SetLocal { index: v.index, src });
    Ok(())
  }

  /// A block expression's own scope is one of the three genuinely
  /// anonymous ones `next_child_scope` exists for: recover it by
  /// cursor replay, then thread the last statement's value through as
  /// the block's own, mirroring `check_block`.
  fn lower_block(&mut self, scope: ScopeId, sink: Sink, stmts: &[StmtId]) -> Result<Option<Operand>> {
    let block_scope = self.next_child_scope(scope);
    let mut last = None;
    for &s in stmts {
      last = self.lower_stmt(block_scope, sink, s)?;
    }
    Ok(last)
  }

  /// Lower one function's body into its own fresh sequence of basic
  /// blocks. No-op for a generic function (signature only, instantiated
  /// on demand elsewhere) or a declaration with no body (extern).
  fn lower_function(&mut self, fid: FunctionId) -> Result<()> {
    if self.state.function(fid).is_generic { return Ok(()) }
    let Some(body) = self.state.function(fid).body else { return Ok(()) };
    let fn_scope = self.state.function(fid).scope;
    let return_type = self.state.function(fid).return_type;
    let span = self.state.function(fid).span;

    let entry = self.new_block(fid, "entry");
    self.state.function_mut(fid).entry_block = Some(entry);
    self.switch_to(Sink::Fn(fid), entry);
    self.state.push_defer_frame();

    let prev_fn = self.state.current_function.replace(fid);
    let body_val = self.lower_expr(fn_scope, Sink::Fn(fid), body)?;
    self.state.current_function = prev_fn;

    let cur = self.current_block(fid);
    if !self.block_terminated(fid, cur) {
      self.lower_pending_defers(Sink::Fn(fid))?;
      let void = self.state.types.get_void();
      let value = if return_type == void {
        None
      } else {
        let op = body_val.ok_or_else(|| Error::internal(span, "generate", "function body produced no value for a non-void return"))?;
        Some(self.safe_cast(Sink::Fn(fid), op, return_type))
      };
      self.emit(Sink::Fn(fid), Instruction::Return { value });
    }
    self.state.pop_defer_frame();
    Ok(())
  }

  fn lower_toplevel_function(&mut self, scope: ScopeId, decl: &FuncDecl) -> Result<()> {
    let fid = match self.state.scopes.resolve(decl.name, scope) {
      Some(Entity::Function(fid)) => *fid,
      _ => return Err(Error::internal(decl.span, "generate", "function not registered before body generation")),
    };
    self.lower_function(fid)
  }

  /// Impls carry no name of their own, so their position in `state.impls`
  /// is tracked by replaying the same item-order cursor `declare_impl`
  /// filled it in with, rather than a scope lookup.
  fn lower_impl_methods(&mut self, decl: &ImplDecl) -> Result<()> {
    let iid = ImplId::new(u32::try_from(self.impl_cursor).expect("too many impls"));
    self.impl_cursor += 1;
    if !decl.generic_params.is_empty() { return Ok(()) } // instantiated on demand by `resolve_method`
    let impl_scope = self.state.impl_(iid).scope;
    for method in &decl.methods {
      let fid = match self.state.scopes.get(impl_scope).symbols.get(&method.name) {
        Some(Entity::Function(fid)) => *fid,
        _ => return Err(Error::internal(method.span, "generate", "impl method not registered before body generation")),
      };
      self.lower_function(fid)?;
    }
    Ok(())
  }

  fn lower_trait_methods(&mut self, scope: ScopeId, decl: &TraitDecl) -> Result<()> {
    let trait_scope = match self.state.scopes.resolve(decl.name, scope) {
      Some(Entity::Trait(tid)) => self.state.trait_(*tid).scope,
      _ => return Err(Error::internal(decl.span, "generate", "trait not registered before body generation")),
    };
    for method in &decl.methods {
      if method.body.is_none() { continue }
      let fid = match self.state.scopes.get(trait_scope).symbols.get(&method.name) {
        Some(Entity::Function(fid)) => *fid,
        _ => return Err(Error::internal(method.span, "generate", "trait method not registered before body generation")),
      };
      self.lower_function(fid)?;
    }
    Ok(())
  }

  /// Module-scope `let`s: `const` ones are already folded into
  /// `state.constants` and need no runtime store; the rest get an
  /// initializer emitted into the top-level instruction stream.
  fn lower_global_let(&mut self, scope: ScopeId, decl: &LetDecl) -> Result<()> {
    if decl.is_const { return Ok(()) }
    let v = self.resolve_variable(scope, decl.name, decl.span)?;
    if let Some(e) = decl.init {
      let op = self.lower_expr(scope, Sink::Global, e)?
        .ok_or_else(|| Error::internal(decl.span, "generate", "global initializer produced no value"))?;
      let op = self.safe_cast(Sink::Global, op, v.ty);
      self.emit(Sink::Global, Instruction::SetGlobal { index: v.index, src: op });
    }
    Ok(())
  }

  /// Mirrors the generation-relevant subset of `check_block_items`'s
  /// shape: bodies are lowered in item order (impls tracked by the same
  /// cursor `declare_impl` advanced), then nested modules recurse last.
  fn lower_block_items(&mut self, scope: ScopeId, items: &[StmtId]) -> Result<()> {
    for &it in items {
      match self.ast.stmt(it).clone() {
        Stmt::Func(decl) => self.lower_toplevel_function(scope, &decl)?,
        Stmt::Let(decl) => self.lower_global_let(scope, &decl)?,
        Stmt::Trait(decl) => self.lower_trait_methods(scope, &decl)?,
        Stmt::Impl(decl) => self.lower_impl_methods(&decl)?,
        Stmt::Struct(_) | Stmt::Enum(_) | Stmt::TypeAlias(_) | Stmt::Module(_)
          | Stmt::Import(_) | Stmt::Using(_) | Stmt::Expr(_) | Stmt::StaticAssert(_) => {}
      }
    }
    for &it in items {
      if let Stmt::Module(decl) = self.ast.stmt(it).clone() {
        let mid = match self.state.scopes.get(scope).symbols.get(&decl.name) {
          Some(Entity::Module(m)) => m.id,
          _ => return Err(Error::internal(decl.span, "generate", "module not registered before body generation")),
        };
        let mscope = self.state.module(mid).scope;
        self.lower_block_items(mscope, &decl.body)?;
      }
    }
    Ok(())
  }

  /// Top-level entry point: lower every declared body, then the
  /// top-level bare-expression statements recorded as `early_calls`
  /// (root-scoped, since `early_calls` carries no scope of its own — see
  /// DESIGN.md), and hand back the finished program.
  pub fn generate_program(&mut self, items: &[StmtId]) -> Result<Program> {
    let root = self.state.scopes.root();
    self.lower_block_items(root, items)?;

    let early_calls = self.state.early_calls.clone();
    for e in early_calls {
      self.lower_expr(root, Sink::Global, e)?;
    }

    let functions = (0..self.state.global_functions.len()).map(|i| FunctionId::new(u32::try_from(i).expect("too many functions"))).collect();
    let structs = (0..self.state.global_structs.len()).map(|i| StructId::new(u32::try_from(i).expect("too many structs"))).collect();

    let mut globals = Vec::new();
    for v in self.state.global_variables.values() {
      globals.push(Global {
        name: v.name,
        ty: v.ty,
        init: None,
        public: v.flags.contains(VariableFlags::PUBLIC),
      });
    }

    Ok(Program {
      global_instructions: std::mem::take(&mut self.global_instructions),
      functions,
      structs,
      globals,
    })
  }
}
