//! The compile-time interpreter.
//!
//! A purely functional evaluator over a whitelisted subset of [`Expr`]
//! kinds. It never touches externally-visible state: it is handed
//! immutable views of the AST, scope tree, and struct layouts, plus a
//! mutable [`TypeRegistry`] reference only because evaluating a literal
//! may need to intern a fresh primitive type. Re-evaluating the same
//! expression in the same scope always yields the same [`Constant`]
//! because nothing here depends on evaluation
//! order or on register/local allocation counters.

use hashbrown::HashMap;
use im::HashMap as PersistentMap;
use smallvec::SmallVec;

use crate::error::{Error, ErrorKind, Result};
use crate::layout::{self, StructLayouts};
use crate::scope::{Entity, ScopeId, ScopeTree, VariableFlags};
use crate::span::Span;
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{Ast, BinOp, Expr, ExprId, FloatSuffix, Literal, TypeExpr, TypeExprId, UnaryOp};
use crate::types::ty::{Type, TypeId, TypeRegistry};

/// The bounded iteration cap for constant-evaluated `while` loops.
pub const MAX_CONST_ITERATIONS: u64 = 1_000_000;

/// A folded compile-time value, carrying the [`TypeId`] it was computed
/// at.
#[derive(Clone, Debug)]
pub struct Constant {
  pub kind: ConstantKind,
  pub ty: TypeId,
}

#[derive(Clone, Debug)]
pub enum ConstantKind {
  Int(i128),
  Float(f64),
  Str(String),
  Array(Vec<Constant>),
  Tuple(Vec<Constant>),
  Struct(Vec<Constant>),
}

impl Constant {
  #[must_use] pub fn as_int(&self) -> Option<i128> {
    match self.kind { ConstantKind::Int(v) => Some(v), _ => None }
  }

  #[must_use] pub fn as_bool(&self) -> Option<bool> { self.as_int().map(|v| v != 0) }
}

/// `break` is the only control-flow signal a constant-evaluated `while`
/// body can raise: no early `return`, no exceptions.
enum Flow { Normal, Break }

impl Flow {
  fn join(self, other: Flow) -> Flow {
    if matches!(self, Flow::Break) || matches!(other, Flow::Break) { Flow::Break } else { Flow::Normal }
  }
}

/// Bindings visible to a constant expression beyond globally-resolved
/// `const`s — currently unused by any whitelisted node but kept as a
/// persistent (cheap-to-fork) map so a future `let`-in-const extension
/// doesn't need to change the evaluator's threading, mirroring the
/// teacher's own persistent per-generation variable maps.
pub type ConstEnv = PersistentMap<Symbol, Constant>;

pub struct ConstantEvaluator<'a> {
  pub ast: &'a Ast,
  pub scopes: &'a ScopeTree,
  pub types: &'a mut TypeRegistry,
  pub interner: &'a Interner,
  /// Already-evaluated `const` globals, keyed by their global slot index
  /// (the `Variable::index` of a `CONSTANT`-flagged `Entity::Variable`).
  pub global_consts: &'a HashMap<u32, Constant>,
  pub structs: StructLayouts<'a>,
}

impl<'a> ConstantEvaluator<'a> {
  pub fn new(
    ast: &'a Ast, scopes: &'a ScopeTree, types: &'a mut TypeRegistry, interner: &'a Interner,
    global_consts: &'a HashMap<u32, Constant>, structs: StructLayouts<'a>,
  ) -> Self {
    ConstantEvaluator { ast, scopes, types, interner, global_consts, structs }
  }

  fn not_constant(&self, span: Span) -> Error {
    Error::new(span, ErrorKind::NotConstant, "expression is not a compile-time constant")
  }

  pub fn eval(&mut self, scope: ScopeId, expr: ExprId) -> Result<Constant> {
    log::trace!("const-eval entry: expr {expr:?} in scope {scope:?}");
    match self.eval_inner(scope, &ConstEnv::new(), expr)? {
      (c, Flow::Normal) => Ok(c),
      (_, Flow::Break) => Err(self.not_constant(self.ast.expr_span(expr))),
    }
  }

  fn eval_inner(&mut self, scope: ScopeId, env: &ConstEnv, id: ExprId) -> Result<(Constant, Flow)> {
    let span = self.ast.expr_span(id);
    let plain = |c: Constant| Ok((c, Flow::Normal));
    match self.ast.expr(id).clone() {
      Expr::Literal(lit) => plain(self.eval_literal(&lit)),
      Expr::Identifier(name) => plain(self.eval_identifier(scope, env, name, span)?),
      Expr::Path(path) => {
        let name = path.segments.last().expect("non-empty path").name;
        plain(self.eval_identifier(scope, env, name, span)?)
      }
      Expr::Unary { op, expr } => {
        let (v, flow) = self.eval_inner(scope, env, expr)?;
        Ok((self.eval_unary(op, v, span)?, flow))
      }
      Expr::Binary { op, lhs, rhs } => {
        let (l, fl) = self.eval_inner(scope, env, lhs)?;
        let (r, fr) = self.eval_inner(scope, env, rhs)?;
        Ok((self.eval_binary(op, l, r, span)?, fl.join(fr)))
      }
      Expr::Ternary { cond, then_branch, else_branch } => {
        let (c, _) = self.eval_inner(scope, env, cond)?;
        if c.as_bool().ok_or_else(|| self.not_constant(span))? {
          self.eval_inner(scope, env, then_branch)
        } else {
          self.eval_inner(scope, env, else_branch)
        }
      }
      Expr::If { cond, then_branch, else_branch } => {
        let (c, _) = self.eval_inner(scope, env, cond)?;
        if c.as_bool().ok_or_else(|| self.not_constant(span))? {
          self.eval_inner(scope, env, then_branch)
        } else if let Some(e) = else_branch {
          self.eval_inner(scope, env, e)
        } else {
          plain(Constant { kind: ConstantKind::Int(0), ty: self.types.get_void() })
        }
      }
      Expr::While { cond, body } => self.eval_while(scope, env, cond, body, span),
      Expr::Break { .. } => Ok((Constant { kind: ConstantKind::Int(0), ty: self.types.get_void() }, Flow::Break)),
      Expr::Block(stmts) => {
        let mut last = Constant { kind: ConstantKind::Int(0), ty: self.types.get_void() };
        for s in stmts {
          let crate::types::ast::Stmt::Expr(e) = self.ast.stmt(s) else {
            return Err(self.not_constant(self.ast.stmt_span(s)));
          };
          let (v, flow) = self.eval_inner(scope, env, *e)?;
          last = v;
          if matches!(flow, Flow::Break) { return Ok((last, Flow::Break)) }
        }
        Ok((last, Flow::Normal))
      }
      Expr::Tuple(elems) => {
        let mut vals = Vec::with_capacity(elems.len());
        let mut tys = SmallVec::<[TypeId; 4]>::new();
        for e in elems {
          let (v, _) = self.eval_inner(scope, env, e)?;
          tys.push(v.ty);
          vals.push(v);
        }
        let ty = self.types.make_tuple(tys);
        plain(Constant { kind: ConstantKind::Tuple(vals), ty })
      }
      Expr::Array(elems) => {
        let mut vals = Vec::with_capacity(elems.len());
        let mut elem_ty = None;
        for e in elems {
          let (v, _) = self.eval_inner(scope, env, e)?;
          elem_ty.get_or_insert(v.ty);
          vals.push(v);
        }
        let elem_ty = elem_ty.unwrap_or_else(|| self.types.get_int(32, true));
        let len = u32::try_from(vals.len()).expect("array too large");
        let ty = self.types.make_array(elem_ty, len);
        plain(Constant { kind: ConstantKind::Array(vals), ty })
      }
      Expr::StructCtor { path, fields } => self.eval_struct_ctor(scope, env, &path, &fields, span),
      Expr::Attribute { base, name } => {
        let (b, _) = self.eval_inner(scope, env, base)?;
        plain(self.eval_field_access(&b, name, span)?)
      }
      Expr::Index { base, index } => {
        let (b, _) = self.eval_inner(scope, env, base)?;
        let (i, _) = self.eval_inner(scope, env, index)?;
        plain(self.eval_index(&b, &i, span)?)
      }
      Expr::Sizeof(inner) => {
        let (v, _) = self.eval_inner(scope, env, inner)?;
        let i32_ty = self.types.get_int(32, true);
        plain(Constant { kind: ConstantKind::Int(i128::from(layout::size_of(v.ty, self.types, &self.structs))), ty: i32_ty })
      }
      Expr::SizeofType(ty_expr) => {
        let ty = self.resolve_type_expr(scope, ty_expr)?;
        let i32_ty = self.types.get_int(32, true);
        plain(Constant { kind: ConstantKind::Int(i128::from(layout::size_of(ty, self.types, &self.structs))), ty: i32_ty })
      }
      Expr::Offsetof { ty, field } => {
        let struct_ty = self.resolve_type_expr(scope, ty)?;
        let link = match self.types.get(struct_ty) {
          Type::Struct { link, .. } => *link,
          _ => return Err(Error::new(span, ErrorKind::NotAField, "offsetof target is not a struct")),
        };
        let idx = self.structs.structs[link.index()].fields.get(field)
          .ok_or_else(|| Error::new(span, ErrorKind::NotAField, "no such field"))?.index;
        let i32_ty = self.types.get_int(32, true);
        plain(Constant { kind: ConstantKind::Int(i128::from(layout::field_offset(struct_ty, idx, self.types, &self.structs))), ty: i32_ty })
      }
      _ => Err(self.not_constant(span)),
    }
  }

  fn eval_while(&mut self, scope: ScopeId, env: &ConstEnv, cond: ExprId, body: ExprId, span: Span) -> Result<(Constant, Flow)> {
    let void = self.types.get_void();
    let mut last = Constant { kind: ConstantKind::Int(0), ty: void };
    for _ in 0..MAX_CONST_ITERATIONS {
      let (c, _) = self.eval_inner(scope, env, cond)?;
      if !c.as_bool().ok_or_else(|| self.not_constant(span))? { return Ok((last, Flow::Normal)) }
      let (v, flow) = self.eval_inner(scope, env, body)?;
      last = v;
      if matches!(flow, Flow::Break) { return Ok((last, Flow::Normal)) }
    }
    Err(Error::new(span, ErrorKind::ConstLoopOverflow, "constant `while` loop exceeded the iteration cap"))
  }

  fn eval_literal(&mut self, lit: &Literal) -> Constant {
    match lit {
      &Literal::Int { value, suffix } => {
        let ty = suffix.map_or_else(|| self.types.get_int(32, true), |s| self.types.get_int(s.bits, s.signed));
        Constant { kind: ConstantKind::Int(value as i128), ty }
      }
      &Literal::Float { value, suffix } => {
        let bits = if matches!(suffix, Some(FloatSuffix::F64) | None) { 64 } else { 32 };
        Constant { kind: ConstantKind::Float(value), ty: self.types.get_float(bits) }
      }
      &Literal::Char(c) => Constant { kind: ConstantKind::Int(i128::from(c as u32)), ty: self.types.get_int(32, false) },
      Literal::Str(s) => {
        let i8_ty = self.types.get_int(8, true);
        let ty = self.types.make_pointer(i8_ty, false);
        Constant { kind: ConstantKind::Str(s.clone()), ty }
      }
      &Literal::Bool(b) => Constant { kind: ConstantKind::Int(i128::from(b)), ty: self.types.get_bool() },
      Literal::Null => {
        let void = self.types.get_void();
        let ty = self.types.make_pointer(void, false);
        Constant { kind: ConstantKind::Int(0), ty }
      }
    }
  }

  fn eval_identifier(&mut self, scope: ScopeId, env: &ConstEnv, name: Symbol, span: Span) -> Result<Constant> {
    if let Some(c) = env.get(&name) { return Ok(c.clone()) }
    match self.scopes.resolve(name, scope) {
      Some(Entity::Variable(v)) if v.flags.contains(VariableFlags::CONSTANT) => {
        self.global_consts.get(&v.index).cloned()
          .ok_or_else(|| self.not_constant(span))
      }
      _ => Err(Error::new(span, ErrorKind::NotConstant, "identifier does not resolve to a compile-time constant")),
    }
  }

  fn eval_unary(&mut self, op: UnaryOp, v: Constant, span: Span) -> Result<Constant> {
    match (op, &v.kind) {
      (UnaryOp::Neg, ConstantKind::Int(i)) => Ok(Constant { kind: ConstantKind::Int(-i), ty: v.ty }),
      (UnaryOp::Neg, ConstantKind::Float(f)) => Ok(Constant { kind: ConstantKind::Float(-f), ty: v.ty }),
      (UnaryOp::Not, ConstantKind::Int(i)) => Ok(Constant { kind: ConstantKind::Int(i128::from(*i == 0)), ty: v.ty }),
      (UnaryOp::BitNot, ConstantKind::Int(i)) => Ok(Constant { kind: ConstantKind::Int(!i), ty: v.ty }),
      _ => Err(self.not_constant(span)),
    }
  }

  fn eval_binary(&mut self, op: BinOp, l: Constant, r: Constant, span: Span) -> Result<Constant> {
    use BinOp::{Add, BitAnd, BitOr, BitXor, Div, Eq, Gt, Gte, Lt, Lte, Mod, Mul, Neq, LogicalAnd, LogicalOr, Shl, Shr, Sub};
    if op.is_comparison() {
      let ord = match (&l.kind, &r.kind) {
        (ConstantKind::Int(a), ConstantKind::Int(b)) => a.partial_cmp(b),
        (ConstantKind::Float(a), ConstantKind::Float(b)) => a.partial_cmp(b),
        _ => return Err(self.not_constant(span)),
      }.ok_or_else(|| self.not_constant(span))?;
      let result = match op {
        Eq => ord.is_eq(), Neq => ord.is_ne(), Gt => ord.is_gt(), Lt => ord.is_lt(), Gte => ord.is_ge(), Lte => ord.is_le(),
        _ => unreachable!("non-comparison BinOp reached comparison arm"),
      };
      return Ok(Constant { kind: ConstantKind::Int(i128::from(result)), ty: self.types.get_bool() });
    }
    match (&l.kind, &r.kind) {
      (ConstantKind::Int(a), ConstantKind::Int(b)) => {
        let (a, b) = (*a, *b);
        let v = match op {
          Add => a.wrapping_add(b), Sub => a.wrapping_sub(b), Mul => a.wrapping_mul(b),
          Div => { if b == 0 { return Err(Error::new(span, ErrorKind::DivisionByZero, "division by zero in constant expression")) } a.wrapping_div(b) }
          Mod => { if b == 0 { return Err(Error::new(span, ErrorKind::DivisionByZero, "division by zero in constant expression")) } a.wrapping_rem(b) }
          BitOr | LogicalOr => a | b,
          BitAnd | LogicalAnd => a & b,
          BitXor => a ^ b,
          Shl => a.wrapping_shl(u32::try_from(b).unwrap_or(0)),
          Shr => a.wrapping_shr(u32::try_from(b).unwrap_or(0)),
          _ => unreachable!("unexpected BinOp in constant integer arithmetic"),
        };
        Ok(Constant { kind: ConstantKind::Int(v), ty: l.ty })
      }
      (ConstantKind::Float(a), ConstantKind::Float(b)) => {
        let (a, b) = (*a, *b);
        let v = match op {
          Add => a + b, Sub => a - b, Mul => a * b, Div => a / b, Mod => a % b,
          _ => return Err(self.not_constant(span)),
        };
        Ok(Constant { kind: ConstantKind::Float(v), ty: l.ty })
      }
      _ => Err(self.not_constant(span)),
    }
  }

  fn eval_field_access(&mut self, base: &Constant, name: Symbol, span: Span) -> Result<Constant> {
    match (&base.kind, self.types.get(base.ty).clone()) {
      (ConstantKind::Struct(fields), Type::Struct { link, .. }) => {
        let idx = self.structs.structs[link.index()].fields.get(name)
          .ok_or_else(|| Error::new(span, ErrorKind::NotAField, "no such field"))?.index;
        Ok(fields[idx as usize].clone())
      }
      _ => Err(Error::new(span, ErrorKind::NotAField, "not a struct constant")),
    }
  }

  fn eval_index(&mut self, base: &Constant, index: &Constant, span: Span) -> Result<Constant> {
    let ConstantKind::Array(elems) = &base.kind else {
      return Err(Error::new(span, ErrorKind::NotIndexable, "not an array constant"));
    };
    let i = index.as_int().ok_or_else(|| self.not_constant(span))?;
    usize::try_from(i).ok().and_then(|i| elems.get(i)).cloned()
      .ok_or_else(|| Error::new(span, ErrorKind::IndexOutOfRange, "constant index out of range"))
  }

  fn eval_struct_ctor(&mut self, scope: ScopeId, env: &ConstEnv, path: &crate::types::ast::Path, fields: &[crate::types::ast::FieldInit], span: Span) -> Result<(Constant, Flow)> {
    let name = path.segments.last().expect("non-empty path").name;
    let Some(Entity::Struct(sid)) = self.scopes.resolve(name, scope) else {
      return Err(Error::new(span, ErrorKind::NotConstant, "not a struct"));
    };
    let sid = *sid;
    let ty = self.structs.structs[sid.index()].ty;
    let field_count = self.structs.structs[sid.index()].fields.len();
    let mut values: Vec<Option<Constant>> = vec![None; field_count];
    for f in fields {
      let idx = {
        let field = self.structs.structs[sid.index()].fields.get(f.name)
          .ok_or_else(|| Error::new(span, ErrorKind::NotAField, "no such field"))?;
        field.index as usize
      };
      let (v, _) = self.eval_inner(scope, env, f.value)?;
      values[idx] = Some(v);
    }
    let mut out = Vec::with_capacity(field_count);
    for (i, slot) in values.into_iter().enumerate() {
      out.push(match slot {
        Some(v) => v,
        None => {
          let field_ty = self.structs.structs[sid.index()].fields.iter().nth(i).expect("field index in range").ty;
          Constant { kind: ConstantKind::Int(0), ty: field_ty }
        }
      });
    }
    Ok((Constant { kind: ConstantKind::Struct(out), ty }, Flow::Normal))
  }

  /// Resolve a surface type expression to an interned [`TypeId`], for the
  /// `sizeof`/`offsetof` type-position operands. A small,
  /// self-contained subset of what the full checker's type resolution
  /// does: constant evaluation never needs generics or trait objects in
  /// type position.
  fn resolve_type_expr(&mut self, scope: ScopeId, id: TypeExprId) -> Result<TypeId> {
    let span = self.ast.type_expr_span(id);
    match self.ast.type_expr(id).clone() {
      TypeExpr::Named(path) => {
        let name = path.segments.last().expect("non-empty path").name;
        match self.scopes.resolve(name, scope) {
          Some(Entity::Struct(sid)) => Ok(self.structs.structs[sid.index()].ty),
          _ => self.resolve_builtin_named(name, span),
        }
      }
      TypeExpr::Pointer { mutable, inner } => {
        let inner = self.resolve_type_expr(scope, inner)?;
        Ok(self.types.make_pointer(inner, mutable))
      }
      TypeExpr::Reference { mutable, inner } => {
        let inner = self.resolve_type_expr(scope, inner)?;
        Ok(self.types.make_reference(inner, mutable))
      }
      TypeExpr::Array { element, len } => {
        let element = self.resolve_type_expr(scope, element)?;
        let len_const = self.eval(scope, len)?;
        let len = u32::try_from(len_const.as_int().ok_or_else(|| self.not_constant(span))?)
          .map_err(|_| Error::new(span, ErrorKind::InvalidLiteral, "array length out of range"))?;
        Ok(self.types.make_array(element, len))
      }
      TypeExpr::Tuple(elems) => {
        let mut tys = SmallVec::<[TypeId; 4]>::new();
        for e in elems { tys.push(self.resolve_type_expr(scope, e)?) }
        Ok(self.types.make_tuple(tys))
      }
      TypeExpr::Function { params, ret, c_variadic } => {
        let mut p = SmallVec::<[TypeId; 4]>::new();
        for e in params { p.push(self.resolve_type_expr(scope, e)?) }
        let ret = self.resolve_type_expr(scope, ret)?;
        Ok(self.types.make_function(p, ret, c_variadic))
      }
    }
  }

  fn resolve_builtin_named(&mut self, name: Symbol, span: Span) -> Result<TypeId> {
    let text = self.interner.resolve(name).to_string();
    crate::types::ty::resolve_builtin_type(&text, self.types)
      .ok_or_else(|| Error::new(span, ErrorKind::UnknownIdentifier, "unknown type name"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{SourceMap, Span};
  use crate::types::ast::{Ast, BinOp, Expr, Literal};

  fn dummy_span(sm: &mut SourceMap) -> Span {
    let id = sm.add("t.lang", "x");
    Span::new(id, 0, 1)
  }

  #[test]
  fn folds_arithmetic() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut ast = Ast::new();
    let two = ast.alloc_expr(Expr::Literal(Literal::Int { value: 2, suffix: None }), sp);
    let three = ast.alloc_expr(Expr::Literal(Literal::Int { value: 3, suffix: None }), sp);
    let mul = ast.alloc_expr(Expr::Binary { op: BinOp::Mul, lhs: two, rhs: three }, sp);
    let one = ast.alloc_expr(Expr::Literal(Literal::Int { value: 1, suffix: None }), sp);
    let sum = ast.alloc_expr(Expr::Binary { op: BinOp::Add, lhs: mul, rhs: one }, sp);

    let scopes = ScopeTree::new();
    let mut types = TypeRegistry::new();
    let interner = Interner::new();
    let consts = HashMap::new();
    let structs = StructLayouts::new(&[]);
    let mut ev = ConstantEvaluator::new(&ast, &scopes, &mut types, &interner, &consts, structs);
    let c = ev.eval(scopes.root(), sum).unwrap();
    assert_eq!(c.as_int(), Some(7));
  }

  #[test]
  fn division_by_zero_is_an_error() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut ast = Ast::new();
    let zero = ast.alloc_expr(Expr::Literal(Literal::Int { value: 0, suffix: None }), sp);
    let one = ast.alloc_expr(Expr::Literal(Literal::Int { value: 1, suffix: None }), sp);
    let div = ast.alloc_expr(Expr::Binary { op: BinOp::Div, lhs: one, rhs: zero }, sp);
    let scopes = ScopeTree::new();
    let mut types = TypeRegistry::new();
    let interner = Interner::new();
    let consts = HashMap::new();
    let structs = StructLayouts::new(&[]);
    let mut ev = ConstantEvaluator::new(&ast, &scopes, &mut types, &interner, &consts, structs);
    let err = ev.eval(scopes.root(), div).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
  }

  #[test]
  fn while_loop_over_the_cap_overflows() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut ast = Ast::new();
    let tru = ast.alloc_expr(Expr::Literal(Literal::Bool(true)), sp);
    let zero = ast.alloc_expr(Expr::Literal(Literal::Int { value: 0, suffix: None }), sp);
    let body_stmt = ast.alloc_stmt(crate::types::ast::Stmt::Expr(zero), sp);
    let block = ast.alloc_expr(Expr::Block(vec![body_stmt]), sp);
    let while_expr = ast.alloc_expr(Expr::While { cond: tru, body: block }, sp);
    let scopes = ScopeTree::new();
    let mut types = TypeRegistry::new();
    let interner = Interner::new();
    let consts = HashMap::new();
    let structs = StructLayouts::new(&[]);
    let mut ev = ConstantEvaluator::new(&ast, &scopes, &mut types, &interner, &consts, structs);
    let err = ev.eval(scopes.root(), while_expr).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstLoopOverflow);
  }

  #[test]
  fn is_pure_across_repeated_evaluation() {
    let mut sm = SourceMap::new();
    let sp = dummy_span(&mut sm);
    let mut ast = Ast::new();
    let two = ast.alloc_expr(Expr::Literal(Literal::Int { value: 2, suffix: None }), sp);
    let three = ast.alloc_expr(Expr::Literal(Literal::Int { value: 3, suffix: None }), sp);
    let add = ast.alloc_expr(Expr::Binary { op: BinOp::Add, lhs: two, rhs: three }, sp);
    let scopes = ScopeTree::new();
    let mut types = TypeRegistry::new();
    let interner = Interner::new();
    let consts = HashMap::new();
    let structs = StructLayouts::new(&[]);
    let mut ev = ConstantEvaluator::new(&ast, &scopes, &mut types, &interner, &consts, structs);
    let a = ev.eval(scopes.root(), add).unwrap();
    let b = ev.eval(scopes.root(), add).unwrap();
    assert_eq!(a.as_int(), b.as_int());
  }
}
