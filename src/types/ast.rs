//! The attributed abstract syntax tree produced by the parser.
//!
//! Every node lives in a flat arena owned by [`Ast`] and is referred to
//! elsewhere by a small `Copy` id (`ExprId`/`StmtId`/`TypeExprId`). This
//! is a closed tagged variant, a deliberate alternative to an open
//! virtual-dispatch expression hierarchy: every pass
//! (checker, generator) is an exhaustive `match` over one of these enums,
//! so adding a new node kind without updating every pass is a compile
//! error rather than a silent no-op.

use smallvec::SmallVec;

use crate::span::Span;
use crate::symbol::Symbol;

macro_rules! arena_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct $name(u32);
    impl $name {
      #[must_use] fn new(i: usize) -> Self { $name(u32::try_from(i).expect("AST arena overflow")) }
      #[must_use] pub fn index(self) -> usize { self.0 as usize }
    }
  };
}

arena_id!(
  /// Indexes `Ast::exprs`.
  ExprId
);
arena_id!(
  /// Indexes `Ast::stmts`.
  StmtId
);
arena_id!(
  /// Indexes `Ast::type_exprs`.
  TypeExprId
);

/// A literal integer's optional explicit width/signedness suffix
/// (`i8`..`i128`, `u8`..`u128`, `usize`, `isize`); `None` means the
/// literal is unsuffixed and its type is inferred from context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IntSuffix { pub bits: u16, pub signed: bool }

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FloatSuffix { F32, F64 }

#[derive(Clone, Debug)]
pub enum Literal {
  Int { value: u128, suffix: Option<IntSuffix> },
  Float { value: f64, suffix: Option<FloatSuffix> },
  Char(char),
  Str(String),
  Bool(bool),
  Null,
}

/// One segment of a qualified path `A::B<T>::C`, with optional generic
/// arguments. Generic arguments are only legal on a segment when the
/// caller allows it.
#[derive(Clone, Debug)]
pub struct PathSegment {
  pub name: Symbol,
  pub generic_args: Vec<TypeExprId>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Path { pub segments: SmallVec<[PathSegment; 2]> }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp { Neg, Not, BitNot, Deref, Ref, RefMut }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
  Add, Sub, Mul, Div, Mod,
  BitOr, BitAnd, BitXor, Shl, Shr,
  LogicalOr, LogicalAnd,
  Eq, Neq, Gt, Lt, Gte, Lte,
}

impl BinOp {
  #[must_use] pub fn is_comparison(self) -> bool {
    matches!(self, BinOp::Eq | BinOp::Neq | BinOp::Gt | BinOp::Lt | BinOp::Gte | BinOp::Lte)
  }
}

/// Binding precedence, tight to loose. Higher binds tighter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Precedence(pub u8);

impl BinOp {
  #[must_use] pub fn precedence(self) -> Precedence {
    use BinOp::*;
    Precedence(match self {
      Mul | Div | Mod => 9,
      Add | Sub => 8,
      Shl | Shr => 7,
      BitAnd => 6,
      BitXor => 5,
      BitOr => 4,
      Eq | Neq | Gt | Lt | Gte | Lte => 3,
      LogicalAnd => 2,
      LogicalOr => 1,
    })
  }
}

#[derive(Clone, Debug)]
pub struct CallArg { pub keyword: Option<Symbol>, pub value: ExprId }

#[derive(Clone, Debug)]
pub struct FieldInit { pub name: Symbol, pub value: ExprId }

/// One alternative of a `match` arm: `pat | pat | ... => body`, or the
/// wildcard `else => body`.
#[derive(Clone, Debug)]
pub struct MatchArm {
  pub patterns: Vec<Pattern>,
  pub is_wildcard: bool,
  pub body: ExprId,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Pattern {
  Literal(Literal),
  Binding(Symbol),
}

#[derive(Clone, Debug)]
pub struct ClosureParam { pub name: Symbol, pub ty: Option<TypeExprId> }

/// A surface-syntax expression node. See module docs for the arena
/// rationale.
#[derive(Clone, Debug)]
pub enum Expr {
  Literal(Literal),
  Identifier(Symbol),
  Path(Path),
  Tuple(Vec<ExprId>),
  Array(Vec<ExprId>),
  ArrayFill { value: ExprId, len: ExprId },
  StructCtor { path: Path, fields: Vec<FieldInit> },
  Call { callee: ExprId, args: Vec<CallArg> },
  Attribute { base: ExprId, name: Symbol },
  Index { base: ExprId, index: ExprId },
  Cast { expr: ExprId, ty: TypeExprId },
  Ternary { cond: ExprId, then_branch: ExprId, else_branch: ExprId },
  Unary { op: UnaryOp, expr: ExprId },
  Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
  Assign { lhs: ExprId, rhs: ExprId },
  CompoundAssign { op: BinOp, lhs: ExprId, rhs: ExprId },
  Sizeof(ExprId),
  SizeofType(TypeExprId),
  Offsetof { ty: TypeExprId, field: Symbol },
  Block(Vec<StmtId>),
  If { cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId> },
  While { cond: ExprId, body: ExprId },
  ForIter { binding: Symbol, iterable: ExprId, body: ExprId },
  ForRange { binding: Symbol, start: ExprId, end: Option<ExprId>, inclusive: bool, body: ExprId },
  Break { label: Option<Symbol>, value: Option<ExprId> },
  Continue { label: Option<Symbol> },
  Return(Option<ExprId>),
  Defer(ExprId),
  Match { scrutinee: ExprId, arms: Vec<MatchArm> },
  Closure { params: Vec<ClosureParam>, body: ExprId },
  TupleAssign { lhs: Vec<ExprId>, rhs: ExprId },
}

/// A surface-syntax type expression, before checking resolves it to an
/// interned [`crate::types::ty::TypeId`].
#[derive(Clone, Debug)]
pub enum TypeExpr {
  Named(Path),
  Pointer { mutable: bool, inner: TypeExprId },
  Reference { mutable: bool, inner: TypeExprId },
  Array { element: TypeExprId, len: ExprId },
  Tuple(Vec<TypeExprId>),
  Function { params: Vec<TypeExprId>, ret: TypeExprId, c_variadic: bool },
}

#[derive(Clone, Debug)]
pub struct AttrArg { pub value: Literal, pub keyword: Option<Symbol> }

/// `![name(args)]` metadata attached to a declaration.
#[derive(Clone, Debug, Default)]
pub struct Attributes { pub entries: Vec<(Symbol, Vec<AttrArg>, Span)> }

impl Attributes {
  #[must_use] pub fn is_empty(&self) -> bool { self.entries.is_empty() }
  #[must_use] pub fn get(&self, name: Symbol) -> Option<&[AttrArg]> {
    self.entries.iter().find(|(n, _, _)| *n == name).map(|(_, a, _)| a.as_slice())
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcKind { Func, Extern }

#[derive(Clone, Debug)]
pub struct ParamDecl {
  pub name: Symbol,
  pub ty: Option<TypeExprId>,
  pub is_self: bool,
  pub is_mutable: bool,
  pub is_variadic: bool,
  pub is_keyword: bool,
  pub is_reference: bool,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
  pub name: Symbol,
  pub generic_params: Vec<Symbol>,
  pub params: Vec<ParamDecl>,
  pub return_type: Option<TypeExprId>,
  pub body: Option<ExprId>,
  pub kind: ProcKind,
  pub public: bool,
  pub attrs: Attributes,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FieldDecl { pub name: Symbol, pub ty: TypeExprId, pub private: bool, pub readonly: bool, pub span: Span }

#[derive(Clone, Debug)]
pub struct StructDecl {
  pub name: Symbol,
  pub fields: Vec<FieldDecl>,
  pub opaque: bool,
  pub public: bool,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct EnumVariant { pub name: Symbol, pub value: Option<ExprId> }

#[derive(Clone, Debug)]
pub struct EnumDecl { pub name: Symbol, pub underlying: Option<TypeExprId>, pub variants: Vec<EnumVariant>, pub public: bool, pub span: Span }

#[derive(Clone, Debug)]
pub struct TraitDecl { pub name: Symbol, pub methods: Vec<FuncDecl>, pub span: Span }

#[derive(Clone, Copy, Debug)]
pub enum ImplConditionSyntax { Pointer, Reference, Array, Tuple }

#[derive(Clone, Debug)]
pub struct ImplDecl {
  pub generic_params: Vec<(Symbol, ImplConditionSyntax)>,
  pub target: TypeExprId,
  pub trait_name: Option<Path>,
  pub methods: Vec<FuncDecl>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeAliasDecl { pub name: Symbol, pub generic_params: Vec<Symbol>, pub target: TypeExprId, pub span: Span }

#[derive(Clone, Debug)]
pub struct ModuleDecl { pub name: Symbol, pub body: Vec<StmtId>, pub span: Span }

#[derive(Clone, Debug)]
pub struct ImportDecl { pub path: Path, pub wildcard: bool, pub span: Span }

#[derive(Clone, Debug)]
pub struct UsingItem { pub name: Symbol, pub alias: Option<Symbol> }

#[derive(Clone, Debug)]
pub struct UsingDecl { pub base: Path, pub items: Vec<UsingItem>, pub span: Span }

#[derive(Clone, Debug)]
pub struct LetDecl {
  pub name: Symbol,
  pub mutable: bool,
  pub is_const: bool,
  pub ty: Option<TypeExprId>,
  pub init: Option<ExprId>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct StaticAssertDecl { pub cond: ExprId, pub message: Option<String>, pub span: Span }

/// A statement: either a declaration, or a bare expression used for its
/// side effect.
#[derive(Clone, Debug)]
pub enum Stmt {
  Expr(ExprId),
  Let(LetDecl),
  Func(FuncDecl),
  Struct(StructDecl),
  Enum(EnumDecl),
  Trait(TraitDecl),
  Impl(ImplDecl),
  TypeAlias(TypeAliasDecl),
  Module(ModuleDecl),
  Import(ImportDecl),
  Using(UsingDecl),
  StaticAssert(StaticAssertDecl),
}

/// The attributed AST: a forest of owned nodes keyed by kind.
#[derive(Default)]
pub struct Ast {
  exprs: Vec<(Expr, Span)>,
  stmts: Vec<(Stmt, Span)>,
  type_exprs: Vec<(TypeExpr, Span)>,
  /// Top-level declarations, in source order.
  pub items: Vec<StmtId>,
}

impl Ast {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn alloc_expr(&mut self, expr: Expr, span: Span) -> ExprId {
    self.exprs.push((expr, span));
    ExprId::new(self.exprs.len() - 1)
  }

  pub fn alloc_stmt(&mut self, stmt: Stmt, span: Span) -> StmtId {
    self.stmts.push((stmt, span));
    StmtId::new(self.stmts.len() - 1)
  }

  pub fn alloc_type_expr(&mut self, ty: TypeExpr, span: Span) -> TypeExprId {
    self.type_exprs.push((ty, span));
    TypeExprId::new(self.type_exprs.len() - 1)
  }

  #[must_use] pub fn expr(&self, id: ExprId) -> &Expr { &self.exprs[id.index()].0 }
  #[must_use] pub fn expr_span(&self, id: ExprId) -> Span { self.exprs[id.index()].1 }
  #[must_use] pub fn stmt(&self, id: StmtId) -> &Stmt { &self.stmts[id.index()].0 }
  #[must_use] pub fn stmt_span(&self, id: StmtId) -> Span { self.stmts[id.index()].1 }
  #[must_use] pub fn type_expr(&self, id: TypeExprId) -> &TypeExpr { &self.type_exprs[id.index()].0 }
  #[must_use] pub fn type_expr_span(&self, id: TypeExprId) -> Span { self.type_exprs[id.index()].1 }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::SourceMap;

  #[test]
  fn arena_ids_are_stable() {
    let mut sm = SourceMap::new();
    let src = sm.add("t.lang", "1");
    let sp = Span::new(src, 0, 1);
    let mut ast = Ast::new();
    let a = ast.alloc_expr(Expr::Literal(Literal::Int { value: 1, suffix: None }), sp);
    let b = ast.alloc_expr(Expr::Literal(Literal::Int { value: 2, suffix: None }), sp);
    assert_ne!(a, b);
    assert!(matches!(ast.expr(a), Expr::Literal(Literal::Int { value: 1, .. })));
  }
}
