//! A concrete lexer implementing the [`crate::token::TokenStream`]
//! contract.
//!
//! This is **not** part of the compiler's own front/mid-end: lexing is
//! explicitly an external collaborator. It exists so this
//! crate's own tests can drive the parser end-to-end without a second
//! crate in the loop, the same way a reference implementation keeps a
//! throwaway lexer around for its own test harness.

use crate::span::{SourceId, Span};
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};

pub struct Lexer<'a> {
  source_id: SourceId,
  bytes: &'a [u8],
  pos: u32,
  peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
  #[must_use] pub fn new(source_id: SourceId, text: &'a str) -> Self {
    Lexer { source_id, bytes: text.as_bytes(), pos: 0, peeked: None }
  }

  fn span(&self, start: u32) -> Span { Span::new(self.source_id, start, self.pos) }

  fn cur(&self) -> Option<u8> { self.bytes.get(self.pos as usize).copied() }
  fn at(&self, off: u32) -> Option<u8> { self.bytes.get((self.pos + off) as usize).copied() }
  fn bump(&mut self) -> Option<u8> { let c = self.cur(); if c.is_some() { self.pos += 1 } c }

  fn skip_trivia(&mut self) {
    loop {
      match self.cur() {
        Some(b) if b.is_ascii_whitespace() => { self.pos += 1 }
        Some(b'/') if self.at(1) == Some(b'/') => {
          while !matches!(self.cur(), None | Some(b'\n')) { self.pos += 1 }
        }
        Some(b'/') if self.at(1) == Some(b'*') => {
          self.pos += 2;
          while !(self.cur() == Some(b'*') && self.at(1) == Some(b'/')) && self.cur().is_some() { self.pos += 1 }
          self.pos = (self.pos + 2).min(u32::try_from(self.bytes.len()).unwrap());
        }
        _ => break,
      }
    }
  }

  fn text_from(&self, start: u32) -> String {
    String::from_utf8_lossy(&self.bytes[start as usize..self.pos as usize]).into_owned()
  }

  fn lex_one(&mut self) -> Token {
    self.skip_trivia();
    let start = self.pos;
    let Some(c) = self.cur() else {
      return Token { kind: TokenKind::Eof, span: self.span(start), text: String::new() };
    };

    if c.is_ascii_alphabetic() || c == b'_' {
      while matches!(self.cur(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') { self.pos += 1 }
      let text = self.text_from(start);
      let kind = Keyword::from_str(&text).map_or(TokenKind::Ident, TokenKind::Keyword);
      return Token { kind, span: self.span(start), text };
    }

    if c.is_ascii_digit() {
      return self.lex_number(start);
    }

    if c == b'\'' { return self.lex_char(start) }
    if c == b'"' { return self.lex_string(start, false) }
    if c == b'r' && self.at(1) == Some(b'"') { self.pos += 1; return self.lex_string(start, true) }

    self.lex_punct(start)
  }

  fn lex_number(&mut self, start: u32) -> Token {
    while matches!(self.cur(), Some(b) if b.is_ascii_digit() || b == b'_') { self.pos += 1 }
    let mut is_float = false;
    if self.cur() == Some(b'.') && matches!(self.at(1), Some(b) if b.is_ascii_digit()) {
      is_float = true;
      self.pos += 1;
      while matches!(self.cur(), Some(b) if b.is_ascii_digit() || b == b'_') { self.pos += 1 }
    }
    if matches!(self.cur(), Some(b'e' | b'E')) {
      is_float = true;
      self.pos += 1;
      if matches!(self.cur(), Some(b'+' | b'-')) { self.pos += 1 }
      while matches!(self.cur(), Some(b) if b.is_ascii_digit()) { self.pos += 1 }
    }
    // optional suffix: i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 usize isize f32 f64 d
    while matches!(self.cur(), Some(b) if b.is_ascii_alphanumeric()) { self.pos += 1 }
    let text = self.text_from(start);
    let kind = if is_float || text.ends_with("f32") || text.ends_with("f64") || text.ends_with('d') {
      TokenKind::Float
    } else {
      TokenKind::Int
    };
    Token { kind, span: self.span(start), text }
  }

  fn lex_char(&mut self, start: u32) -> Token {
    self.pos += 1; // opening quote
    if self.cur() == Some(b'\\') { self.pos += 1 }
    self.pos += 1; // the char (or escape letter) itself; single-byte approximation
    if self.cur() == Some(b'\'') { self.pos += 1 }
    Token { kind: TokenKind::Char, span: self.span(start), text: self.text_from(start) }
  }

  fn lex_string(&mut self, start: u32, raw: bool) -> Token {
    self.pos += 1; // opening quote
    loop {
      match self.cur() {
        None => break,
        Some(b'"') => { self.pos += 1; break }
        Some(b'\\') if !raw => { self.pos += 2 }
        Some(_) => { self.pos += 1 }
      }
    }
    Token { kind: if raw { TokenKind::RawStr } else { TokenKind::Str }, span: self.span(start), text: self.text_from(start) }
  }

  fn lex_punct(&mut self, start: u32) -> Token {
    macro_rules! two { ($p:ident) => {{ self.pos += 2; Punct::$p }} }
    macro_rules! one { ($p:ident) => {{ self.pos += 1; Punct::$p }} }
    let c0 = self.bump().unwrap();
    let c1 = self.cur();
    let punct = match (c0, c1) {
      (b'(', _) => one!(LParen), (b')', _) => one!(RParen),
      (b'{', _) => one!(LBrace), (b'}', _) => one!(RBrace),
      (b'[', _) => one!(LBracket), (b']', _) => one!(RBracket),
      (b',', _) => one!(Comma), (b';', _) => one!(Semi),
      (b'@', _) => one!(At), (b'?', _) => one!(Question), (b'~', _) => one!(Tilde),
      (b':', Some(b':')) => two!(ColonColon),
      (b':', _) => one!(Colon),
      (b'.', Some(b'.')) => {
        if self.at(1) == Some(b'=') { self.pos += 1; two!(DotDotEq) } else { two!(DotDot) }
      }
      (b'.', _) => one!(Dot),
      (b'-', Some(b'>')) => two!(Arrow),
      (b'-', Some(b'=')) => two!(MinusEq),
      (b'-', _) => one!(Minus),
      (b'=', Some(b'>')) => two!(FatArrow),
      (b'=', Some(b'=')) => two!(EqEq),
      (b'=', _) => one!(Eq),
      (b'!', Some(b'=')) => two!(NotEq),
      (b'!', _) => one!(Bang),
      (b'+', Some(b'=')) => two!(PlusEq),
      (b'+', _) => one!(Plus),
      (b'*', Some(b'=')) => two!(StarEq),
      (b'*', _) => one!(Star),
      (b'/', Some(b'=')) => two!(SlashEq),
      (b'/', _) => one!(Slash),
      (b'%', Some(b'=')) => two!(PercentEq),
      (b'%', _) => one!(Percent),
      (b'&', Some(b'&')) => two!(AmpAmp),
      (b'&', Some(b'=')) => two!(AmpEq),
      (b'&', _) => one!(Amp),
      (b'|', Some(b'|')) => two!(PipePipe),
      (b'|', Some(b'=')) => two!(PipeEq),
      (b'|', _) => one!(Pipe),
      (b'^', Some(b'=')) => two!(CaretEq),
      (b'^', _) => one!(Caret),
      (b'<', Some(b'<')) => {
        if self.at(1) == Some(b'=') { self.pos += 1; self.pos += 1; Punct::ShlEq } else { two!(Shl) }
      }
      (b'<', Some(b'=')) => two!(Le),
      (b'<', _) => one!(Lt),
      // `>>` is deliberately NOT combined here: the parser pairs two
      // adjacent `Gt` tokens itself, so that `A::B<T>>` (`>` closing a
      // generic then `>` of a shift) doesn't get eaten as one token.
      (b'>', Some(b'=')) => two!(Ge),
      (b'>', _) => one!(Gt),
      (other, _) => panic!("unrecognized character {:?} at byte {start}", other as char),
    };
    Token { kind: TokenKind::Punct(punct), span: self.span(start), text: self.text_from(start) }
  }
}

impl TokenStream for Lexer<'_> {
  fn next(&mut self) -> Token {
    if let Some(t) = self.peeked.take() { return t }
    self.lex_one()
  }

  fn peek(&mut self) -> &Token {
    if self.peeked.is_none() { self.peeked = Some(self.lex_one()) }
    self.peeked.as_ref().unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tokenize(text: &str) -> Vec<TokenKind> {
    let mut sm = crate::span::SourceMap::new();
    let id = sm.add("t.lang", text);
    let mut lx = Lexer::new(id, text);
    let mut out = Vec::new();
    loop {
      let t = lx.next();
      let is_eof = matches!(t.kind, TokenKind::Eof);
      out.push(t.kind);
      if is_eof { break }
    }
    out
  }

  #[test]
  fn keywords_and_idents() {
    let kinds = tokenize("let mut x");
    assert!(matches!(kinds[0], TokenKind::Keyword(Keyword::Let)));
    assert!(matches!(kinds[1], TokenKind::Keyword(Keyword::Mut)));
    assert!(matches!(kinds[2], TokenKind::Ident));
  }

  #[test]
  fn double_gt_stays_two_tokens() {
    let kinds = tokenize("A::B<T>>1");
    let gt_count = kinds.iter().filter(|k| matches!(k, TokenKind::Punct(Punct::Gt))).count();
    assert_eq!(gt_count, 2);
  }

  #[test]
  fn integer_suffix_is_part_of_the_token_text() {
    let mut sm = crate::span::SourceMap::new();
    let id = sm.add("t.lang", "42i64");
    let mut lx = Lexer::new(id, "42i64");
    let t = lx.next();
    assert_eq!(t.text, "42i64");
    assert!(matches!(t.kind, TokenKind::Int));
  }
}
