//! Recursive-descent parser: tokens to the attributed tree.
//!
//! Built directly against [`crate::token::TokenStream`], never against
//! the concrete lexer, so any tokenizer that implements the trait can
//! drive it. Declarations and statements are handled here; operator
//! precedence climbing for expressions lives in [`expr`].

mod expr;

use crate::attributes::KNOWN_ATTRIBUTES;
use crate::error::{Error, ErrorKind, Result};
use crate::span::{SourceId, Span};
use crate::state::State;
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};
use crate::types::ast::{
  Ast, AttrArg, Attributes, EnumDecl, EnumVariant, FieldDecl, FuncDecl, ImplConditionSyntax,
  ImplDecl, ImportDecl, LetDecl, Literal, ParamDecl, Path, PathSegment, ProcKind, StaticAssertDecl,
  Stmt, StmtId, StructDecl, TraitDecl, TypeAliasDecl, TypeExpr, TypeExprId, UsingDecl, UsingItem,
};

/// Drives one [`TokenStream`] to completion, building an [`Ast`] and
/// interning every name into `state.interner`.
pub struct Parser<'a, T: TokenStream> {
  tokens: T,
  ast: &'a mut Ast,
  state: &'a mut State,
  source_id: SourceId,
  current: Token,
  /// Disabled inside `if`/`while`/`for`/`match` condition-like positions,
  /// where a bare `Path {` would otherwise be read as a struct
  /// constructor instead of the block that must follow.
  no_struct_ctor: bool,
}

impl<'a, T: TokenStream> Parser<'a, T> {
  pub fn new(mut tokens: T, ast: &'a mut Ast, state: &'a mut State, source_id: SourceId) -> Self {
    let current = tokens.next();
    Parser { tokens, ast, state, source_id, current, no_struct_ctor: false }
  }

  /// Parse a whole source file: a flat sequence of top-level items up to
  /// EOF, appended to `ast.items` in source order.
  pub fn parse_program(&mut self) -> Result<()> {
    while !self.at_eof() {
      let item = self.parse_top_level_item()?;
      self.ast.items.push(item);
    }
    Ok(())
  }

  // ---- token plumbing ----

  fn at_eof(&self) -> bool { matches!(self.current.kind, TokenKind::Eof) }

  fn bump(&mut self) -> Token { std::mem::replace(&mut self.current, self.tokens.next()) }

  fn span(&self) -> Span { self.current.span }

  fn check_punct(&self, p: Punct) -> bool { matches!(self.current.kind, TokenKind::Punct(q) if q == p) }
  fn check_kw(&self, k: Keyword) -> bool { matches!(self.current.kind, TokenKind::Keyword(kk) if kk == k) }

  fn eat_punct(&mut self, p: Punct) -> bool {
    if self.check_punct(p) { self.bump(); true } else { false }
  }
  fn eat_kw(&mut self, k: Keyword) -> bool {
    if self.check_kw(k) { self.bump(); true } else { false }
  }

  fn expect_punct(&mut self, p: Punct) -> Result<Span> {
    let span = self.span();
    if self.eat_punct(p) { Ok(span) } else { Err(self.unexpected(&format!("{p:?}"))) }
  }

  fn expect_kw(&mut self, k: Keyword) -> Result<Span> {
    let span = self.span();
    if self.eat_kw(k) { Ok(span) } else { Err(self.unexpected(&format!("{k:?}"))) }
  }

  fn unexpected(&self, wanted: &str) -> Error {
    if self.at_eof() {
      Error::new(self.span(), ErrorKind::UnexpectedEof, format!("expected {wanted}, found end of file"))
    } else {
      Error::new(self.span(), ErrorKind::UnexpectedToken, format!("expected {wanted}, found `{}`", self.current.text))
    }
  }

  fn expect_ident(&mut self) -> Result<crate::symbol::Symbol> {
    if !matches!(self.current.kind, TokenKind::Ident) { return Err(self.unexpected("an identifier")) }
    let tok = self.bump();
    Ok(self.state.interner.intern(&tok.text))
  }

  // ---- top-level / block items ----

  fn parse_top_level_item(&mut self) -> Result<StmtId> {
    let attrs = self.parse_attributes()?;
    self.parse_item_body(attrs)
  }

  /// `![name(arg, kw: arg, ...)]*`
  fn parse_attributes(&mut self) -> Result<Attributes> {
    let mut entries = Vec::new();
    while self.check_punct(Punct::Bang) {
      let start = self.span();
      self.bump();
      self.expect_punct(Punct::LBracket)?;
      let name_tok_span = self.span();
      let name = self.expect_ident()?;
      let text = self.state.interner.resolve(name).to_string();
      if !KNOWN_ATTRIBUTES.contains(&text.as_str()) {
        return Err(Error::new(name_tok_span, ErrorKind::UnknownAttribute, format!("unknown attribute `{text}`")));
      }
      let mut args = Vec::new();
      if self.eat_punct(Punct::LParen) {
        while !self.check_punct(Punct::RParen) {
          args.push(self.parse_attr_arg()?);
          if !self.eat_punct(Punct::Comma) { break }
        }
        self.expect_punct(Punct::RParen)?;
      }
      let end = self.span();
      self.expect_punct(Punct::RBracket)?;
      entries.push((name, args, start.to(end)));
    }
    Ok(Attributes { entries })
  }

  fn parse_attr_arg(&mut self) -> Result<AttrArg> {
    let keyword = if matches!(self.current.kind, TokenKind::Ident) && self.peek_is_colon_after_ident() {
      let name = self.expect_ident()?;
      self.expect_punct(Punct::Colon)?;
      Some(name)
    } else {
      None
    };
    let value = self.parse_literal()?;
    Ok(AttrArg { value, keyword })
  }

  /// Whether the current ident token is immediately followed by `:`
  /// (a keyword-argument name), without consuming anything.
  fn peek_is_colon_after_ident(&mut self) -> bool {
    // The token stream only exposes one token of lookahead (`peek`
    // reflects what `self.current` already holds), so this checks the
    // *next* token via the stream's own peek.
    matches!(self.tokens.peek().kind, TokenKind::Punct(Punct::Colon))
  }

  fn parse_literal(&mut self) -> Result<Literal> {
    let tok = self.current.clone();
    match &tok.kind {
      TokenKind::Int => { self.bump(); Ok(parse_int_literal(&tok.text)) }
      TokenKind::Float => { self.bump(); Ok(parse_float_literal(&tok.text)) }
      TokenKind::Char => { self.bump(); Ok(Literal::Char(parse_char_text(&tok.text))) }
      TokenKind::Str | TokenKind::RawStr => { self.bump(); Ok(Literal::Str(tok.text.clone())) }
      TokenKind::Keyword(Keyword::True) => { self.bump(); Ok(Literal::Bool(true)) }
      TokenKind::Keyword(Keyword::False) => { self.bump(); Ok(Literal::Bool(false)) }
      TokenKind::Keyword(Keyword::Null) => { self.bump(); Ok(Literal::Null) }
      _ => Err(self.unexpected("a literal")),
    }
  }

  /// Declarations are public by default; `private` opts a single
  /// declaration out, matching how struct fields mark themselves.
  fn parse_item_body(&mut self, attrs: Attributes) -> Result<StmtId> {
    let start = self.span();
    let public = !self.eat_kw(Keyword::Private);
    if self.check_kw(Keyword::Func) || self.check_kw(Keyword::Extern) {
      let mut decl = self.parse_func_decl(attrs)?;
      decl.public = public;
      let span = start.to(decl.span);
      return Ok(self.ast.alloc_stmt(Stmt::Func(decl), span));
    }
    if self.eat_kw(Keyword::Struct) { return self.parse_struct_decl(start, public) }
    if self.eat_kw(Keyword::Enum) { return self.parse_enum_decl(start, public) }
    if self.eat_kw(Keyword::Trait) { return self.parse_trait_decl(start) }
    if self.eat_kw(Keyword::Impl) { return self.parse_impl_decl(start) }
    if self.eat_kw(Keyword::Type) { return self.parse_type_alias_decl(start) }
    if self.eat_kw(Keyword::Module) { return self.parse_module_decl(start) }
    if self.eat_kw(Keyword::Import) { return self.parse_import_decl(start) }
    if self.eat_kw(Keyword::Using) { return self.parse_using_decl(start) }
    if self.check_kw(Keyword::Let) || self.check_kw(Keyword::Const) {
      let is_const = self.check_kw(Keyword::Const);
      self.bump();
      return self.parse_let_decl(start, is_const);
    }
    if self.eat_kw(Keyword::StaticAssert) { return self.parse_static_assert_decl(start) }
    // a bare expression statement is also a legal item at block scope
    let e = self.parse_expr()?;
    let semi_end = self.expect_punct(Punct::Semi)?;
    Ok(self.ast.alloc_stmt(Stmt::Expr(e), start.to(semi_end)))
  }

  fn parse_block_items(&mut self) -> Result<Vec<StmtId>> {
    self.expect_punct(Punct::LBrace)?;
    let mut items = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      let attrs = self.parse_attributes()?;
      items.push(self.parse_item_body(attrs)?);
    }
    self.expect_punct(Punct::RBrace)?;
    Ok(items)
  }

  // ---- declarations ----

  fn parse_func_decl(&mut self, attrs: Attributes) -> Result<FuncDecl> {
    let start = self.span();
    let kind = if self.eat_kw(Keyword::Extern) { ProcKind::Extern } else { ProcKind::Func };
    if matches!(kind, ProcKind::Extern) { self.expect_kw(Keyword::Func)?; }
    else { self.expect_kw(Keyword::Func)?; }
    let name = self.expect_ident()?;
    let generic_params = self.parse_optional_generic_params()?;
    self.expect_punct(Punct::LParen)?;
    let mut params = Vec::new();
    let mut is_variadic = false;
    while !self.check_punct(Punct::RParen) {
      if self.check_punct(Punct::DotDot) || self.check_punct(Punct::DotDotEq) {
        self.bump();
        is_variadic = true;
        break;
      }
      params.push(self.parse_param_decl()?);
      if !self.eat_punct(Punct::Comma) { break }
    }
    self.expect_punct(Punct::RParen)?;
    if is_variadic {
      if let Some(last) = params.last_mut() { last.is_variadic = true }
    }
    let return_type = if self.eat_punct(Punct::Arrow) { Some(self.parse_type_expr()?) } else { None };
    let body = if self.check_punct(Punct::LBrace) {
      Some(self.parse_block_expr()?)
    } else {
      self.expect_punct(Punct::Semi)?;
      None
    };
    let end = body.map_or(return_type.map_or(start, |t| self.ast.type_expr_span(t)), |b| self.ast.expr_span(b));
    Ok(FuncDecl { name, generic_params, params, return_type, body, kind, public: false, attrs, span: start.to(end) })
  }

  fn parse_param_decl(&mut self) -> Result<ParamDecl> {
    let start = self.span();
    let is_reference = self.eat_punct(Punct::Amp);
    let is_mutable = self.eat_kw(Keyword::Mut);
    let is_keyword = false;
    let name = self.expect_ident()?;
    let is_self = self.state.interner.resolve(name) == "self";
    let ty = if self.eat_punct(Punct::Colon) { Some(self.parse_type_expr()?) } else { None };
    let end = ty.map_or(start, |t| self.ast.type_expr_span(t));
    Ok(ParamDecl { name, ty, is_self, is_mutable, is_variadic: false, is_keyword, is_reference, span: start.to(end) })
  }

  fn parse_optional_generic_params(&mut self) -> Result<Vec<crate::symbol::Symbol>> {
    let mut params = Vec::new();
    if self.eat_punct(Punct::Lt) {
      while !self.check_punct(Punct::Gt) {
        params.push(self.expect_ident()?);
        if !self.eat_punct(Punct::Comma) { break }
      }
      self.expect_punct(Punct::Gt)?;
    }
    Ok(params)
  }

  fn parse_struct_decl(&mut self, start: Span, public: bool) -> Result<StmtId> {
    let name = self.expect_ident()?;
    if self.eat_punct(Punct::Semi) {
      let span = start.to(self.span());
      return Ok(self.ast.alloc_stmt(Stmt::Struct(StructDecl { name, fields: Vec::new(), opaque: true, public, span }), span));
    }
    self.expect_punct(Punct::LBrace)?;
    let mut fields = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      fields.push(self.parse_field_decl()?);
      if !self.eat_punct(Punct::Comma) { break }
    }
    let end = self.expect_punct(Punct::RBrace)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Struct(StructDecl { name, fields, opaque: false, public, span }), span))
  }

  fn parse_field_decl(&mut self) -> Result<FieldDecl> {
    let start = self.span();
    let private = self.eat_kw(Keyword::Private);
    let readonly = self.eat_kw(Keyword::Readonly);
    let name = self.expect_ident()?;
    self.expect_punct(Punct::Colon)?;
    let ty = self.parse_type_expr()?;
    let end = self.ast.type_expr_span(ty);
    Ok(FieldDecl { name, ty, private, readonly, span: start.to(end) })
  }

  fn parse_enum_decl(&mut self, start: Span, public: bool) -> Result<StmtId> {
    let name = self.expect_ident()?;
    let underlying = if self.eat_punct(Punct::Colon) { Some(self.parse_type_expr()?) } else { None };
    self.expect_punct(Punct::LBrace)?;
    let mut variants = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      let vname = self.expect_ident()?;
      let value = if self.eat_punct(Punct::Eq) { Some(self.parse_expr()?) } else { None };
      variants.push(EnumVariant { name: vname, value });
      if !self.eat_punct(Punct::Comma) { break }
    }
    let end = self.expect_punct(Punct::RBrace)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Enum(EnumDecl { name, underlying, variants, public, span }), span))
  }

  fn parse_trait_decl(&mut self, start: Span) -> Result<StmtId> {
    let name = self.expect_ident()?;
    self.expect_punct(Punct::LBrace)?;
    let mut methods = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      let attrs = self.parse_attributes()?;
      methods.push(self.parse_func_decl(attrs)?);
    }
    let end = self.expect_punct(Punct::RBrace)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Trait(TraitDecl { name, methods, span }), span))
  }

  fn parse_impl_decl(&mut self, start: Span) -> Result<StmtId> {
    let mut generic_params = Vec::new();
    if self.eat_punct(Punct::Lt) {
      while !self.check_punct(Punct::Gt) {
        let name = self.expect_ident()?;
        self.expect_punct(Punct::Colon)?;
        let cond = self.parse_impl_condition_syntax()?;
        generic_params.push((name, cond));
        if !self.eat_punct(Punct::Comma) { break }
      }
      self.expect_punct(Punct::Gt)?;
    }
    let target = self.parse_type_expr()?;
    let trait_name = if self.eat_kw(Keyword::For) { Some(self.parse_path(false)?) } else { None };
    self.expect_punct(Punct::LBrace)?;
    let mut methods = Vec::new();
    while !self.check_punct(Punct::RBrace) {
      let attrs = self.parse_attributes()?;
      methods.push(self.parse_func_decl(attrs)?);
    }
    let end = self.expect_punct(Punct::RBrace)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Impl(ImplDecl { generic_params, target, trait_name, methods, span }), span))
  }

  fn parse_impl_condition_syntax(&mut self) -> Result<ImplConditionSyntax> {
    if self.eat_punct(Punct::Star) { return Ok(ImplConditionSyntax::Pointer) }
    if self.eat_punct(Punct::Amp) { return Ok(ImplConditionSyntax::Reference) }
    if self.eat_punct(Punct::LBracket) { self.expect_punct(Punct::RBracket)?; return Ok(ImplConditionSyntax::Array) }
    if self.eat_punct(Punct::LParen) { self.expect_punct(Punct::RParen)?; return Ok(ImplConditionSyntax::Tuple) }
    Err(self.unexpected("one of `*`, `&`, `[]`, `()`"))
  }

  fn parse_type_alias_decl(&mut self, start: Span) -> Result<StmtId> {
    let name = self.expect_ident()?;
    let generic_params = self.parse_optional_generic_params()?;
    self.expect_punct(Punct::Eq)?;
    let target = self.parse_type_expr()?;
    let end = self.expect_punct(Punct::Semi)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::TypeAlias(TypeAliasDecl { name, generic_params, target, span }), span))
  }

  fn parse_module_decl(&mut self, start: Span) -> Result<StmtId> {
    let name = self.expect_ident()?;
    let body = self.parse_block_items()?;
    let end = self.span();
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Module(crate::types::ast::ModuleDecl { name, body, span }), span))
  }

  fn parse_import_decl(&mut self, start: Span) -> Result<StmtId> {
    let path = self.parse_path(false)?;
    let wildcard = self.eat_punct(Punct::ColonColon) && self.eat_punct(Punct::Star);
    let end = self.expect_punct(Punct::Semi)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Import(ImportDecl { path, wildcard, span }), span))
  }

  fn parse_using_decl(&mut self, start: Span) -> Result<StmtId> {
    let base = self.parse_path(false)?;
    self.expect_punct(Punct::ColonColon)?;
    let mut items = Vec::new();
    if self.eat_punct(Punct::LBrace) {
      while !self.check_punct(Punct::RBrace) {
        items.push(self.parse_using_item()?);
        if !self.eat_punct(Punct::Comma) { break }
      }
      self.expect_punct(Punct::RBrace)?;
    } else {
      items.push(self.parse_using_item()?);
    }
    let end = self.expect_punct(Punct::Semi)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Using(UsingDecl { base, items, span }), span))
  }

  fn parse_using_item(&mut self) -> Result<UsingItem> {
    let name = self.expect_ident()?;
    let alias = if self.eat_kw(Keyword::As) { Some(self.expect_ident()?) } else { None };
    Ok(UsingItem { name, alias })
  }

  fn parse_let_decl(&mut self, start: Span, is_const: bool) -> Result<StmtId> {
    let mutable = self.eat_kw(Keyword::Mut);
    let name = self.expect_ident()?;
    let ty = if self.eat_punct(Punct::Colon) { Some(self.parse_type_expr()?) } else { None };
    let init = if self.eat_punct(Punct::Eq) { Some(self.parse_expr()?) } else { None };
    let end = self.expect_punct(Punct::Semi)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::Let(LetDecl { name, mutable, is_const, ty, init, span }), span))
  }

  fn parse_static_assert_decl(&mut self, start: Span) -> Result<StmtId> {
    self.expect_punct(Punct::LParen)?;
    let cond = self.parse_expr()?;
    let message = if self.eat_punct(Punct::Comma) {
      match self.parse_literal()? {
        Literal::Str(s) => Some(s),
        _ => return Err(self.unexpected("a string literal")),
      }
    } else {
      None
    };
    self.expect_punct(Punct::RParen)?;
    let end = self.expect_punct(Punct::Semi)?;
    let span = start.to(end);
    Ok(self.ast.alloc_stmt(Stmt::StaticAssert(StaticAssertDecl { cond, message, span }), span))
  }

  // ---- paths and types ----

  fn parse_path(&mut self, allow_generics: bool) -> Result<Path> {
    let mut segments = smallvec::SmallVec::new();
    loop {
      let start = self.span();
      let name = self.expect_ident()?;
      let mut generic_args = Vec::new();
      if allow_generics && self.check_punct(Punct::Lt) {
        self.bump();
        while !self.at_generic_close() {
          generic_args.push(self.parse_type_expr()?);
          if !self.eat_punct(Punct::Comma) { break }
        }
        self.close_generic_list()?;
      }
      let end = self.span();
      segments.push(PathSegment { name, generic_args, span: start.to(end) });
      if self.check_punct(Punct::ColonColon) {
        // peek past `::` for another identifier segment; a trailing
        // `::*`/`::{` belongs to the caller (import/using), not the path.
        let save_current = self.current.clone();
        self.bump();
        if matches!(self.current.kind, TokenKind::Ident) { continue }
        self.current = save_current;
        break;
      }
      break;
    }
    Ok(Path { segments })
  }

  fn at_generic_close(&self) -> bool { self.check_punct(Punct::Gt) }

  /// Consumes a single `>` closing a generic argument list, splitting a
  /// `>>` token boundary if the lexer had no reason to merge it (it
  /// never does — see [`Self::eat_double_gt`]).
  fn close_generic_list(&mut self) -> Result<()> {
    self.expect_punct(Punct::Gt).map(|_| ())
  }

  fn parse_type_expr(&mut self) -> Result<TypeExprId> {
    let start = self.span();
    if self.eat_punct(Punct::Star) {
      let mutable = self.eat_kw(Keyword::Mut);
      let inner = self.parse_type_expr()?;
      let end = self.ast.type_expr_span(inner);
      return Ok(self.ast.alloc_type_expr(TypeExpr::Pointer { mutable, inner }, start.to(end)));
    }
    if self.eat_punct(Punct::Amp) {
      let mutable = self.eat_kw(Keyword::Mut);
      let inner = self.parse_type_expr()?;
      let end = self.ast.type_expr_span(inner);
      return Ok(self.ast.alloc_type_expr(TypeExpr::Reference { mutable, inner }, start.to(end)));
    }
    if self.eat_punct(Punct::LBracket) {
      let element = self.parse_type_expr()?;
      self.expect_punct(Punct::Semi)?;
      let len = self.parse_expr()?;
      let end = self.expect_punct(Punct::RBracket)?;
      return Ok(self.ast.alloc_type_expr(TypeExpr::Array { element, len }, start.to(end)));
    }
    if self.eat_punct(Punct::LParen) {
      let mut elements = Vec::new();
      while !self.check_punct(Punct::RParen) {
        elements.push(self.parse_type_expr()?);
        if !self.eat_punct(Punct::Comma) { break }
      }
      let end = self.expect_punct(Punct::RParen)?;
      return Ok(self.ast.alloc_type_expr(TypeExpr::Tuple(elements), start.to(end)));
    }
    if self.eat_kw(Keyword::Func) {
      self.expect_punct(Punct::LParen)?;
      let mut params = Vec::new();
      let mut c_variadic = false;
      while !self.check_punct(Punct::RParen) {
        if self.check_punct(Punct::DotDot) { self.bump(); c_variadic = true; break }
        params.push(self.parse_type_expr()?);
        if !self.eat_punct(Punct::Comma) { break }
      }
      self.expect_punct(Punct::RParen)?;
      self.expect_punct(Punct::Arrow)?;
      let ret = self.parse_type_expr()?;
      let end = self.ast.type_expr_span(ret);
      return Ok(self.ast.alloc_type_expr(TypeExpr::Function { params, ret, c_variadic }, start.to(end)));
    }
    let path = self.parse_path(true)?;
    let end = path.segments.last().map_or(start, |s| s.span);
    Ok(self.ast.alloc_type_expr(TypeExpr::Named(path), start.to(end)))
  }

  // ---- expression entry point used by declarations ----

  fn parse_expr(&mut self) -> Result<crate::types::ast::ExprId> { self.parse_assign_expr() }
}

fn parse_int_literal(text: &str) -> Literal {
  let (digits, suffix_str) = split_numeric_suffix(text);
  let value = parse_int_digits(digits);
  let suffix = parse_int_suffix(suffix_str);
  Literal::Int { value, suffix }
}

fn parse_int_digits(digits: &str) -> u128 {
  if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
    u128::from_str_radix(hex, 16).unwrap_or(0)
  } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
    u128::from_str_radix(bin, 2).unwrap_or(0)
  } else {
    digits.parse().unwrap_or(0)
  }
}

fn parse_int_suffix(s: &str) -> Option<crate::types::ast::IntSuffix> {
  if s.is_empty() { return None }
  let signed = s.starts_with('i');
  let bits: u16 = s[1..].parse().ok()?;
  Some(crate::types::ast::IntSuffix { bits, signed })
}

fn parse_float_literal(text: &str) -> Literal {
  let (digits, suffix_str) = split_numeric_suffix(text);
  let value = digits.parse().unwrap_or(0.0);
  let suffix = match suffix_str {
    "f32" => Some(crate::types::ast::FloatSuffix::F32),
    "f64" => Some(crate::types::ast::FloatSuffix::F64),
    _ => None,
  };
  Literal::Float { value, suffix }
}

/// Splits a trailing alphabetic width/signedness run off a numeric
/// literal's text, e.g. `"42i64"` -> `("42", "i64")`.
fn split_numeric_suffix(text: &str) -> (&str, &str) {
  let split = text.find(|c: char| c.is_ascii_alphabetic() && c != 'x' && c != 'X' && c != 'b' && c != 'B')
    .filter(|&i| i > 0);
  match split {
    Some(i) => (&text[..i], &text[i..]),
    None => (text, ""),
  }
}

fn parse_char_text(text: &str) -> char {
  text.chars().next().unwrap_or('\0')
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::Lexer;
  use crate::span::SourceMap;

  fn parse(src: &str) -> (Ast, State) {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", src);
    let mut ast = Ast::new();
    let mut state = State::new(crate::state::CompileOptions::default());
    let lexer = Lexer::new(id, sm.text(id));
    let mut parser = Parser::new(lexer, &mut ast, &mut state, id);
    parser.parse_program().unwrap();
    (ast, state)
  }

  #[test]
  fn parses_a_function_with_a_body() {
    let (ast, _state) = parse("func add(a: i32, b: i32) -> i32 { return a + b; }");
    assert_eq!(ast.items.len(), 1);
    let Stmt::Func(decl) = ast.stmt(ast.items[0]) else { panic!("expected a function") };
    assert_eq!(decl.params.len(), 2);
    assert!(decl.body.is_some());
  }

  #[test]
  fn parses_a_struct_with_fields() {
    let (ast, _state) = parse("struct Point { x: i32, y: i32 }");
    let Stmt::Struct(decl) = ast.stmt(ast.items[0]) else { panic!("expected a struct") };
    assert_eq!(decl.fields.len(), 2);
  }

  #[test]
  fn parses_a_let_with_initializer() {
    let (ast, _state) = parse("let x: i32 = 1 + 2;");
    let Stmt::Let(decl) = ast.stmt(ast.items[0]) else { panic!("expected a let") };
    assert!(decl.init.is_some());
  }
}
