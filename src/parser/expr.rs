//! Expression parsing: precedence climbing over [`BinOp::precedence`],
//! plus the handful of expression-position keywords (`if`, `while`,
//! `for`, `match`, `defer`, closures) that are themselves complete
//! expressions in this grammar.

use crate::error::Result;
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};
use crate::types::ast::{
  BinOp, CallArg, ClosureParam, Expr, ExprId, FieldInit, Literal, MatchArm, Path, Pattern, UnaryOp,
};

use super::Parser;

const PRIMITIVE_TYPE_NAMES: &[&str] = &[
  "void", "bool", "i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "i128", "u128", "isize",
  "usize", "f32", "f64",
];

/// A finite buffer of already-lexed tokens, replayed as a [`TokenStream`].
/// Used to re-parse a parenthesized group two different ways (tuple vs.
/// closure parameter list) once the token after its closing `)` settles
/// which one it was.
pub(super) struct VecTokenStream {
  tokens: Vec<Token>,
  pos: usize,
  eof: Token,
}

impl VecTokenStream {
  fn new(tokens: Vec<Token>, eof_span: Span) -> Self {
    VecTokenStream { tokens, pos: 0, eof: Token { kind: TokenKind::Eof, span: eof_span, text: String::new() } }
  }
}

impl TokenStream for VecTokenStream {
  fn next(&mut self) -> Token {
    let tok = self.tokens.get(self.pos).cloned().unwrap_or_else(|| self.eof.clone());
    if self.pos < self.tokens.len() { self.pos += 1 }
    tok
  }
  fn peek(&mut self) -> &Token { self.tokens.get(self.pos).unwrap_or(&self.eof) }
}

impl<'a, T: TokenStream> Parser<'a, T> {
  pub(super) fn parse_block_stmts(&mut self) -> Result<Vec<crate::types::ast::StmtId>> {
    self.expect_punct(Punct::LBrace)?;
    let mut stmts = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      stmts.push(self.parse_block_stmt()?);
    }
    self.expect_punct(Punct::RBrace)?;
    Ok(stmts)
  }

  fn parse_block_stmt(&mut self) -> Result<crate::types::ast::StmtId> {
    use crate::types::ast::Stmt;
    let start = self.span();
    if self.check_kw(Keyword::Let) || self.check_kw(Keyword::Const) {
      let is_const = self.check_kw(Keyword::Const);
      self.bump();
      return self.parse_let_decl_stmt(start, is_const);
    }
    if self.check_kw(Keyword::Func) || self.check_kw(Keyword::Struct) || self.check_kw(Keyword::Enum)
      || self.check_kw(Keyword::Trait) || self.check_kw(Keyword::Impl) || self.check_kw(Keyword::Type)
      || self.check_kw(Keyword::Module) || self.check_kw(Keyword::Import) || self.check_kw(Keyword::Using)
      || self.check_kw(Keyword::StaticAssert) || self.check_punct(Punct::Bang)
    {
      let attrs = self.parse_attributes()?;
      return self.parse_item_body(attrs);
    }
    let e = self.parse_expr()?;
    // A block-form expression (`if`/`while`/`for`/`match`/bare `{ }`) used
    // for its side effect needs no trailing `;`, matching how those read
    // at block scope in the surface grammar.
    let needs_semi = !matches!(self.ast.expr(e), Expr::If { .. } | Expr::While { .. } | Expr::ForIter { .. }
      | Expr::ForRange { .. } | Expr::Match { .. } | Expr::Block(_));
    let end = if needs_semi { self.expect_punct(Punct::Semi)? } else { self.eat_punct(Punct::Semi); self.span() };
    Ok(self.ast.alloc_stmt(Stmt::Expr(e), start.to(end)))
  }

  fn parse_let_decl_stmt(&mut self, start: Span, is_const: bool) -> Result<crate::types::ast::StmtId> {
    self.parse_let_decl(start, is_const)
  }

  pub(super) fn parse_assign_expr(&mut self) -> Result<ExprId> {
    let lhs = self.parse_ternary_expr()?;
    let start = self.ast.expr_span(lhs);
    if self.eat_punct(Punct::Eq) {
      let rhs = self.parse_assign_expr()?;
      let end = self.ast.expr_span(rhs);
      if let Expr::Tuple(elements) = self.ast.expr(lhs).clone() {
        return Ok(self.ast.alloc_expr(Expr::TupleAssign { lhs: elements, rhs }, start.to(end)));
      }
      return Ok(self.ast.alloc_expr(Expr::Assign { lhs, rhs }, start.to(end)));
    }
    if let Some(op) = self.peek_compound_assign_op() {
      self.consume_compound_assign_op();
      let rhs = self.parse_assign_expr()?;
      let end = self.ast.expr_span(rhs);
      return Ok(self.ast.alloc_expr(Expr::CompoundAssign { op, lhs, rhs }, start.to(end)));
    }
    Ok(lhs)
  }

  fn peek_compound_assign_op(&mut self) -> Option<BinOp> {
    match self.current.kind {
      TokenKind::Punct(Punct::PlusEq) => Some(BinOp::Add),
      TokenKind::Punct(Punct::MinusEq) => Some(BinOp::Sub),
      TokenKind::Punct(Punct::StarEq) => Some(BinOp::Mul),
      TokenKind::Punct(Punct::SlashEq) => Some(BinOp::Div),
      TokenKind::Punct(Punct::PercentEq) => Some(BinOp::Mod),
      TokenKind::Punct(Punct::AmpEq) => Some(BinOp::BitAnd),
      TokenKind::Punct(Punct::PipeEq) => Some(BinOp::BitOr),
      TokenKind::Punct(Punct::CaretEq) => Some(BinOp::BitXor),
      TokenKind::Punct(Punct::ShlEq) => Some(BinOp::Shl),
      TokenKind::Punct(Punct::Gt) if matches!(self.tokens.peek().kind, TokenKind::Punct(Punct::Ge)) => Some(BinOp::Shr),
      _ => None,
    }
  }

  /// Consumes whichever compound-assign spelling `peek_compound_assign_op`
  /// just matched. `>>=` is the one case spanning two tokens (`Gt`, `Ge`)
  /// since the lexer never merges `>>`.
  fn consume_compound_assign_op(&mut self) {
    if self.check_punct(Punct::Gt) { self.bump(); self.bump(); } else { self.bump(); }
  }

  fn parse_ternary_expr(&mut self) -> Result<ExprId> {
    let then_branch = self.parse_binary_expr(1)?;
    if self.eat_kw(Keyword::If) {
      let start = self.ast.expr_span(then_branch);
      let cond = self.parse_binary_expr(1)?;
      self.expect_kw(Keyword::Else)?;
      let else_branch = self.parse_ternary_expr()?;
      let end = self.ast.expr_span(else_branch);
      return Ok(self.ast.alloc_expr(Expr::Ternary { cond, then_branch, else_branch }, start.to(end)));
    }
    Ok(then_branch)
  }

  /// Precedence climbing over [`BinOp::precedence`]: parses operands at
  /// [`Self::parse_cast_expr`] and folds in binary operators whose
  /// precedence is at least `min_prec`, recursing at `prec + 1` so equal
  /// precedence binds left-to-right.
  fn parse_binary_expr(&mut self, min_prec: u8) -> Result<ExprId> {
    let mut lhs = self.parse_cast_expr()?;
    while let Some(op) = self.peek_binop() {
      let prec = op.precedence().0;
      if prec < min_prec { break }
      self.consume_binop_tokens(op);
      let rhs = self.parse_binary_expr(prec + 1)?;
      let start = self.ast.expr_span(lhs);
      let end = self.ast.expr_span(rhs);
      lhs = self.ast.alloc_expr(Expr::Binary { op, lhs, rhs }, start.to(end));
    }
    Ok(lhs)
  }

  fn peek_binop(&mut self) -> Option<BinOp> {
    match self.current.kind {
      TokenKind::Punct(Punct::Plus) => Some(BinOp::Add),
      TokenKind::Punct(Punct::Minus) => Some(BinOp::Sub),
      TokenKind::Punct(Punct::Star) => Some(BinOp::Mul),
      TokenKind::Punct(Punct::Slash) => Some(BinOp::Div),
      TokenKind::Punct(Punct::Percent) => Some(BinOp::Mod),
      TokenKind::Punct(Punct::Pipe) => Some(BinOp::BitOr),
      TokenKind::Punct(Punct::Amp) => Some(BinOp::BitAnd),
      TokenKind::Punct(Punct::Caret) => Some(BinOp::BitXor),
      TokenKind::Punct(Punct::Shl) => Some(BinOp::Shl),
      TokenKind::Punct(Punct::AmpAmp) => Some(BinOp::LogicalAnd),
      TokenKind::Punct(Punct::PipePipe) => Some(BinOp::LogicalOr),
      TokenKind::Punct(Punct::EqEq) => Some(BinOp::Eq),
      TokenKind::Punct(Punct::NotEq) => Some(BinOp::Neq),
      TokenKind::Punct(Punct::Le) => Some(BinOp::Lte),
      TokenKind::Punct(Punct::Ge) => Some(BinOp::Gte),
      TokenKind::Punct(Punct::Lt) => Some(BinOp::Lt),
      // `>>` never arrives as one token; two adjacent `Gt`s mean a shift,
      // a lone one means the comparison.
      TokenKind::Punct(Punct::Gt) if matches!(self.tokens.peek().kind, TokenKind::Punct(Punct::Gt)) => Some(BinOp::Shr),
      TokenKind::Punct(Punct::Gt) => Some(BinOp::Gt),
      _ => None,
    }
  }

  fn consume_binop_tokens(&mut self, op: BinOp) {
    if op == BinOp::Shr { self.bump(); self.bump(); } else { self.bump(); }
  }

  fn parse_cast_expr(&mut self) -> Result<ExprId> {
    let mut e = self.parse_unary_expr()?;
    while self.eat_kw(Keyword::As) {
      let start = self.ast.expr_span(e);
      let ty = self.parse_type_expr()?;
      let end = self.ast.type_expr_span(ty);
      e = self.ast.alloc_expr(Expr::Cast { expr: e, ty }, start.to(end));
    }
    Ok(e)
  }

  fn parse_unary_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    let op = if self.eat_punct(Punct::Minus) { Some(UnaryOp::Neg) }
      else if self.eat_punct(Punct::Bang) { Some(UnaryOp::Not) }
      else if self.eat_punct(Punct::Tilde) { Some(UnaryOp::BitNot) }
      else if self.eat_punct(Punct::Star) { Some(UnaryOp::Deref) }
      else if self.eat_punct(Punct::Amp) {
        Some(if self.eat_kw(Keyword::Mut) { UnaryOp::RefMut } else { UnaryOp::Ref })
      }
      else { None };
    if let Some(op) = op {
      let inner = self.parse_unary_expr()?;
      let end = self.ast.expr_span(inner);
      return Ok(self.ast.alloc_expr(Expr::Unary { op, expr: inner }, start.to(end)));
    }
    if self.check_kw(Keyword::Sizeof) { return self.parse_sizeof() }
    if self.check_kw(Keyword::Offsetof) { return self.parse_offsetof() }
    self.parse_postfix_expr(!self.no_struct_ctor)
  }

  fn parse_sizeof(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::Sizeof)?;
    self.expect_punct(Punct::LParen)?;
    let is_type_form = self.check_punct(Punct::Star) || self.check_punct(Punct::Amp)
      || self.check_punct(Punct::LBracket) || self.check_kw(Keyword::Func)
      || (matches!(self.current.kind, TokenKind::Ident) && PRIMITIVE_TYPE_NAMES.contains(&self.current.text.as_str()));
    if is_type_form {
      let ty = self.parse_type_expr()?;
      let end = self.expect_punct(Punct::RParen)?;
      Ok(self.ast.alloc_expr(Expr::SizeofType(ty), start.to(end)))
    } else {
      let inner = self.parse_expr()?;
      let end = self.expect_punct(Punct::RParen)?;
      Ok(self.ast.alloc_expr(Expr::Sizeof(inner), start.to(end)))
    }
  }

  fn parse_offsetof(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::Offsetof)?;
    self.expect_punct(Punct::LParen)?;
    let ty = self.parse_type_expr()?;
    self.expect_punct(Punct::Comma)?;
    let field = self.expect_ident()?;
    let end = self.expect_punct(Punct::RParen)?;
    Ok(self.ast.alloc_expr(Expr::Offsetof { ty, field }, start.to(end)))
  }

  fn parse_postfix_expr(&mut self, allow_struct_ctor: bool) -> Result<ExprId> {
    let mut e = self.parse_primary_expr(allow_struct_ctor)?;
    loop {
      let start = self.ast.expr_span(e);
      if self.eat_punct(Punct::Dot) {
        let name = self.expect_ident()?;
        let end = self.span();
        e = self.ast.alloc_expr(Expr::Attribute { base: e, name }, start.to(end));
        continue;
      }
      if self.eat_punct(Punct::LBracket) {
        let index = self.parse_expr()?;
        let end = self.expect_punct(Punct::RBracket)?;
        e = self.ast.alloc_expr(Expr::Index { base: e, index }, start.to(end));
        continue;
      }
      if self.check_punct(Punct::LParen) {
        let args = self.parse_call_args()?;
        let end = self.span();
        e = self.ast.alloc_expr(Expr::Call { callee: e, args }, start.to(end));
        continue;
      }
      break;
    }
    Ok(e)
  }

  fn parse_call_args(&mut self) -> Result<Vec<CallArg>> {
    self.expect_punct(Punct::LParen)?;
    let mut args = Vec::new();
    while !self.check_punct(Punct::RParen) {
      args.push(self.parse_call_arg()?);
      if !self.eat_punct(Punct::Comma) { break }
    }
    self.expect_punct(Punct::RParen)?;
    Ok(args)
  }

  fn parse_call_arg(&mut self) -> Result<CallArg> {
    let keyword = if matches!(self.current.kind, TokenKind::Ident) && matches!(self.tokens.peek().kind, TokenKind::Punct(Punct::Colon)) {
      let name = self.expect_ident()?;
      self.expect_punct(Punct::Colon)?;
      Some(name)
    } else {
      None
    };
    let value = self.parse_expr()?;
    Ok(CallArg { keyword, value })
  }

  fn parse_primary_expr(&mut self, allow_struct_ctor: bool) -> Result<ExprId> {
    let start = self.span();
    match self.current.kind.clone() {
      TokenKind::Int | TokenKind::Float | TokenKind::Char | TokenKind::Str | TokenKind::RawStr
      | TokenKind::Keyword(Keyword::True) | TokenKind::Keyword(Keyword::False) | TokenKind::Keyword(Keyword::Null) => {
        let lit = self.parse_literal()?;
        let end = self.span();
        Ok(self.ast.alloc_expr(Expr::Literal(lit), start.to(end)))
      }
      TokenKind::Ident => self.parse_path_expr(allow_struct_ctor),
      TokenKind::Punct(Punct::LParen) => self.parse_paren_or_closure(),
      TokenKind::Punct(Punct::LBracket) => self.parse_array_expr(),
      TokenKind::Punct(Punct::LBrace) => self.parse_block_expr(),
      TokenKind::Keyword(Keyword::If) => self.parse_if_expr(),
      TokenKind::Keyword(Keyword::While) => self.parse_while_expr(),
      TokenKind::Keyword(Keyword::For) => self.parse_for_expr(),
      TokenKind::Keyword(Keyword::Match) => self.parse_match_expr(),
      TokenKind::Keyword(Keyword::Break) => {
        self.bump();
        let value = if self.check_punct(Punct::Semi) || self.check_punct(Punct::RBrace) { None } else { Some(self.parse_expr()?) };
        let end = value.map_or(start, |v| self.ast.expr_span(v));
        Ok(self.ast.alloc_expr(Expr::Break { label: None, value }, start.to(end)))
      }
      TokenKind::Keyword(Keyword::Continue) => {
        self.bump();
        Ok(self.ast.alloc_expr(Expr::Continue { label: None }, start))
      }
      TokenKind::Keyword(Keyword::Return) => {
        self.bump();
        let value = if self.check_punct(Punct::Semi) || self.check_punct(Punct::RBrace) { None } else { Some(self.parse_expr()?) };
        let end = value.map_or(start, |v| self.ast.expr_span(v));
        Ok(self.ast.alloc_expr(Expr::Return(value), start.to(end)))
      }
      TokenKind::Keyword(Keyword::Defer) => {
        self.bump();
        let inner = self.parse_expr()?;
        let end = self.ast.expr_span(inner);
        Ok(self.ast.alloc_expr(Expr::Defer(inner), start.to(end)))
      }
      _ => Err(self.unexpected("an expression")),
    }
  }

  fn parse_path_expr(&mut self, allow_struct_ctor: bool) -> Result<ExprId> {
    let start = self.span();
    let path = self.parse_path(false)?;
    let end = path.segments.last().map_or(start, |s| s.span);
    if allow_struct_ctor && self.check_punct(Punct::LBrace) {
      return self.parse_struct_ctor(start, path);
    }
    if path.segments.len() == 1 && path.segments[0].generic_args.is_empty() {
      return Ok(self.ast.alloc_expr(Expr::Identifier(path.segments[0].name), start.to(end)));
    }
    Ok(self.ast.alloc_expr(Expr::Path(path), start.to(end)))
  }

  fn parse_struct_ctor(&mut self, start: Span, path: Path) -> Result<ExprId> {
    self.expect_punct(Punct::LBrace)?;
    let mut fields = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      let name = self.expect_ident()?;
      self.expect_punct(Punct::Colon)?;
      let value = self.parse_expr()?;
      fields.push(FieldInit { name, value });
      if !self.eat_punct(Punct::Comma) { break }
    }
    let end = self.expect_punct(Punct::RBrace)?;
    Ok(self.ast.alloc_expr(Expr::StructCtor { path, fields }, start.to(end)))
  }

  fn parse_array_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_punct(Punct::LBracket)?;
    if self.check_punct(Punct::RBracket) {
      let end = self.expect_punct(Punct::RBracket)?;
      return Ok(self.ast.alloc_expr(Expr::Array(Vec::new()), start.to(end)));
    }
    let first = self.parse_expr()?;
    if self.eat_punct(Punct::Semi) {
      let len = self.parse_expr()?;
      let end = self.expect_punct(Punct::RBracket)?;
      return Ok(self.ast.alloc_expr(Expr::ArrayFill { value: first, len }, start.to(end)));
    }
    let mut elements = vec![first];
    while self.eat_punct(Punct::Comma) {
      if self.check_punct(Punct::RBracket) { break }
      elements.push(self.parse_expr()?);
    }
    let end = self.expect_punct(Punct::RBracket)?;
    Ok(self.ast.alloc_expr(Expr::Array(elements), start.to(end)))
  }

  pub(super) fn parse_block_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    let stmts = self.parse_block_stmts()?;
    let end = self.span();
    Ok(self.ast.alloc_expr(Expr::Block(stmts), start.to(end)))
  }

  fn parse_if_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::If)?;
    let cond = self.parse_no_struct_ctor(Self::parse_assign_expr)?;
    let then_branch = self.parse_block_expr()?;
    let else_branch = if self.eat_kw(Keyword::Else) {
      if self.check_kw(Keyword::If) { Some(self.parse_if_expr()?) } else { Some(self.parse_block_expr()?) }
    } else {
      None
    };
    let end = else_branch.map_or(self.ast.expr_span(then_branch), |e| self.ast.expr_span(e));
    Ok(self.ast.alloc_expr(Expr::If { cond, then_branch, else_branch }, start.to(end)))
  }

  fn parse_while_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::While)?;
    let cond = self.parse_no_struct_ctor(Self::parse_assign_expr)?;
    let body = self.parse_block_expr()?;
    let end = self.ast.expr_span(body);
    Ok(self.ast.alloc_expr(Expr::While { cond, body }, start.to(end)))
  }

  fn parse_for_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::For)?;
    let binding = self.expect_ident()?;
    self.expect_kw(Keyword::In)?;
    let first = self.parse_no_struct_ctor(Self::parse_binary_expr_top)?;
    let inclusive = if self.eat_punct(Punct::DotDotEq) { true } else if self.eat_punct(Punct::DotDot) { false } else {
      let body = self.parse_block_expr()?;
      let end = self.ast.expr_span(body);
      return Ok(self.ast.alloc_expr(Expr::ForIter { binding, iterable: first, body }, start.to(end)));
    };
    let end_bound = if self.check_punct(Punct::LBrace) { None } else { Some(self.parse_no_struct_ctor(Self::parse_binary_expr_top)?) };
    let body = self.parse_block_expr()?;
    let end = self.ast.expr_span(body);
    Ok(self.ast.alloc_expr(Expr::ForRange { binding, start: first, end: end_bound, inclusive, body }, start.to(end)))
  }

  fn parse_binary_expr_top(&mut self) -> Result<ExprId> { self.parse_binary_expr(1) }

  /// Runs `f` with struct-constructor syntax disabled, for condition/
  /// scrutinee positions where a bare `Path {` would otherwise be
  /// ambiguous with the block that follows it.
  fn parse_no_struct_ctor(&mut self, f: impl FnOnce(&mut Self) -> Result<ExprId>) -> Result<ExprId> {
    let saved = self.no_struct_ctor;
    self.no_struct_ctor = true;
    let result = f(self);
    self.no_struct_ctor = saved;
    result
  }

  fn parse_match_expr(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_kw(Keyword::Match)?;
    let scrutinee = self.parse_no_struct_ctor(Self::parse_assign_expr)?;
    self.expect_punct(Punct::LBrace)?;
    let mut arms = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      arms.push(self.parse_match_arm()?);
      if !self.eat_punct(Punct::Comma) { break }
    }
    let end = self.expect_punct(Punct::RBrace)?;
    Ok(self.ast.alloc_expr(Expr::Match { scrutinee, arms }, start.to(end)))
  }

  fn parse_match_arm(&mut self) -> Result<MatchArm> {
    let start = self.span();
    let mut is_wildcard = false;
    let mut patterns = Vec::new();
    if self.eat_kw(Keyword::Else) {
      is_wildcard = true;
    } else {
      loop {
        patterns.push(self.parse_pattern()?);
        if !self.eat_punct(Punct::Pipe) { break }
      }
    }
    self.expect_punct(Punct::FatArrow)?;
    let body = self.parse_expr()?;
    let end = self.ast.expr_span(body);
    Ok(MatchArm { patterns, is_wildcard, body, span: start.to(end) })
  }

  fn parse_pattern(&mut self) -> Result<Pattern> {
    if self.check_punct(Punct::Minus) || matches!(self.current.kind, TokenKind::Int | TokenKind::Float | TokenKind::Char
      | TokenKind::Str | TokenKind::RawStr | TokenKind::Keyword(Keyword::True) | TokenKind::Keyword(Keyword::False) | TokenKind::Keyword(Keyword::Null))
    {
      let neg = self.eat_punct(Punct::Minus);
      let lit = self.parse_literal()?;
      let lit = if neg {
        match lit {
          Literal::Int { value, suffix } => Literal::Int { value: value.wrapping_neg(), suffix },
          Literal::Float { value, suffix } => Literal::Float { value: -value, suffix },
          other => other,
        }
      } else {
        lit
      };
      return Ok(Pattern::Literal(lit));
    }
    let name = self.expect_ident()?;
    Ok(Pattern::Binding(name))
  }

  fn parse_paren_or_closure(&mut self) -> Result<ExprId> {
    let start = self.span();
    self.expect_punct(Punct::LParen)?;
    let mut buffered = Vec::new();
    let mut depth = 0u32;
    loop {
      if depth == 0 && self.check_punct(Punct::RParen) { break }
      if self.check_punct(Punct::LParen) { depth += 1 }
      if self.check_punct(Punct::RParen) { depth -= 1 }
      if self.at_eof() { return Err(self.unexpected("`)`")) }
      buffered.push(self.bump());
    }
    self.expect_punct(Punct::RParen)?;
    if self.eat_punct(Punct::FatArrow) {
      let params = self.parse_closure_params_from(buffered, start)?;
      let body = self.parse_expr()?;
      let end = self.ast.expr_span(body);
      return Ok(self.ast.alloc_expr(Expr::Closure { params, body }, start.to(end)));
    }
    self.parse_paren_tuple_from(buffered, start)
  }

  fn parse_closure_params_from(&mut self, tokens: Vec<Token>, span: Span) -> Result<Vec<ClosureParam>> {
    let stream = VecTokenStream::new(tokens, span);
    let mut sub = Parser::new(stream, &mut *self.ast, &mut *self.state, self.source_id);
    let mut params = Vec::new();
    while !sub.at_eof() {
      let name = sub.expect_ident()?;
      let ty = if sub.eat_punct(Punct::Colon) { Some(sub.parse_type_expr()?) } else { None };
      params.push(ClosureParam { name, ty });
      if !sub.eat_punct(Punct::Comma) { break }
    }
    Ok(params)
  }

  fn parse_paren_tuple_from(&mut self, tokens: Vec<Token>, span: Span) -> Result<ExprId> {
    if tokens.is_empty() {
      return Ok(self.ast.alloc_expr(Expr::Tuple(Vec::new()), span));
    }
    let stream = VecTokenStream::new(tokens, span);
    let mut sub = Parser::new(stream, &mut *self.ast, &mut *self.state, self.source_id);
    let mut elements = Vec::new();
    let mut saw_comma = false;
    while !sub.at_eof() {
      elements.push(sub.parse_expr()?);
      if sub.eat_punct(Punct::Comma) { saw_comma = true } else { break }
    }
    if !sub.at_eof() { return Err(sub.unexpected("`,` or end of group")) }
    if !saw_comma && elements.len() == 1 {
      // a plain parenthesized expression, not a one-element tuple
      return Ok(elements.remove(0));
    }
    Ok(self.ast.alloc_expr(Expr::Tuple(elements), span))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::Lexer;
  use crate::span::SourceMap;
  use crate::state::{CompileOptions, State};
  use crate::types::ast::Ast;
  use crate::types::ast::Stmt;

  fn parse_expr_src(src: &str) -> (Ast, State) {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", format!("func f() {{ let _x = {src}; }}"));
    let mut ast = Ast::new();
    let mut state = State::new(CompileOptions::default());
    let lexer = Lexer::new(id, sm.text(id));
    let mut parser = Parser::new(lexer, &mut ast, &mut state, id);
    parser.parse_program().unwrap();
    (ast, state)
  }

  #[test]
  fn precedence_climbs_multiplication_over_addition() {
    let (ast, _state) = parse_expr_src("1 + 2 * 3");
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!() };
    let Expr::Block(stmts) = ast.expr(decl.body.unwrap()) else { panic!() };
    let Stmt::Let(let_decl) = ast.stmt(stmts[0]) else { panic!() };
    let Expr::Binary { op: BinOp::Add, rhs, .. } = ast.expr(let_decl.init.unwrap()) else { panic!("expected top-level add") };
    assert!(matches!(ast.expr(*rhs), Expr::Binary { op: BinOp::Mul, .. }));
  }

  #[test]
  fn double_gt_parses_as_shift_right() {
    let (ast, _state) = parse_expr_src("8 >> 2");
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!() };
    let Expr::Block(stmts) = ast.expr(decl.body.unwrap()) else { panic!() };
    let Stmt::Let(let_decl) = ast.stmt(stmts[0]) else { panic!() };
    assert!(matches!(ast.expr(let_decl.init.unwrap()), Expr::Binary { op: BinOp::Shr, .. }));
  }

  #[test]
  fn ternary_reads_as_python_style_conditional() {
    let (ast, _state) = parse_expr_src("1 if true else 2");
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!() };
    let Expr::Block(stmts) = ast.expr(decl.body.unwrap()) else { panic!() };
    let Stmt::Let(let_decl) = ast.stmt(stmts[0]) else { panic!() };
    assert!(matches!(ast.expr(let_decl.init.unwrap()), Expr::Ternary { .. }));
  }

  #[test]
  fn closure_parses_params_and_body() {
    let (ast, _state) = parse_expr_src("(a: i32, b: i32) => a + b");
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!() };
    let Expr::Block(stmts) = ast.expr(decl.body.unwrap()) else { panic!() };
    let Stmt::Let(let_decl) = ast.stmt(stmts[0]) else { panic!() };
    let Expr::Closure { params, .. } = ast.expr(let_decl.init.unwrap()) else { panic!("expected a closure") };
    assert_eq!(params.len(), 2);
  }

  #[test]
  fn single_parenthesized_expr_is_not_a_one_tuple() {
    let (ast, _state) = parse_expr_src("(1 + 2)");
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!() };
    let Expr::Block(stmts) = ast.expr(decl.body.unwrap()) else { panic!() };
    let Stmt::Let(let_decl) = ast.stmt(stmts[0]) else { panic!() };
    assert!(matches!(ast.expr(let_decl.init.unwrap()), Expr::Binary { op: BinOp::Add, .. }));
  }
}
