//! The error taxonomy shared by every pass.
//!
//! No pass panics on user error. Every fallible function in this crate
//! returns `Result<T, Error>`, and errors carry enough spans to render
//! a fixed block format: a kind tag, the primary snippet,
//! the message, then zero or more notes each with their own snippet.

use crate::span::{SourceMap, Span};

/// The taxonomy of user- and compiler-visible errors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
  // Lex/Parse
  UnexpectedToken,
  UnexpectedEof,
  InvalidLiteral,
  UnknownAttribute,
  InvalidContext,
  // Resolve
  UnknownIdentifier,
  DuplicateSymbol,
  NotANamespace,
  CircularImport,
  AmbiguousImport,
  PrivateAccess,
  // Type
  TypeMismatch,
  NotCallable,
  ArityMismatch,
  NotIndexable,
  NotDereferenceable,
  MutabilityMismatch,
  NonExhaustiveMatch,
  NotAField,
  NotAMethod,
  UnsizedField,
  RecursiveStructByValue,
  // Const
  NotConstant,
  ConstLoopOverflow,
  IndexOutOfRange,
  DivisionByZero,
  // IR
  InternalInvariant,
}

impl ErrorKind {
  /// Whether this kind always aborts the whole compilation (an
  /// `InternalInvariant` is a compiler bug, not a user-visible error, and
  /// is reported and exits with code 2 rather than 1).
  #[must_use] pub fn is_internal(self) -> bool { matches!(self, ErrorKind::InternalInvariant) }

  #[must_use] pub fn tag(self) -> &'static str {
    match self {
      ErrorKind::UnexpectedToken => "unexpected-token",
      ErrorKind::UnexpectedEof => "unexpected-eof",
      ErrorKind::InvalidLiteral => "invalid-literal",
      ErrorKind::UnknownAttribute => "unknown-attribute",
      ErrorKind::InvalidContext => "invalid-context",
      ErrorKind::UnknownIdentifier => "unknown-identifier",
      ErrorKind::DuplicateSymbol => "duplicate-symbol",
      ErrorKind::NotANamespace => "not-a-namespace",
      ErrorKind::CircularImport => "circular-import",
      ErrorKind::AmbiguousImport => "ambiguous-import",
      ErrorKind::PrivateAccess => "private-access",
      ErrorKind::TypeMismatch => "type-mismatch",
      ErrorKind::NotCallable => "not-callable",
      ErrorKind::ArityMismatch => "arity-mismatch",
      ErrorKind::NotIndexable => "not-indexable",
      ErrorKind::NotDereferenceable => "not-dereferenceable",
      ErrorKind::MutabilityMismatch => "mutability-mismatch",
      ErrorKind::NonExhaustiveMatch => "non-exhaustive-match",
      ErrorKind::NotAField => "not-a-field",
      ErrorKind::NotAMethod => "not-a-method",
      ErrorKind::UnsizedField => "unsized-field",
      ErrorKind::RecursiveStructByValue => "recursive-struct-by-value",
      ErrorKind::NotConstant => "not-constant",
      ErrorKind::ConstLoopOverflow => "const-loop-overflow",
      ErrorKind::IndexOutOfRange => "index-out-of-range",
      ErrorKind::DivisionByZero => "division-by-zero",
      ErrorKind::InternalInvariant => "internal-invariant",
    }
  }
}

/// A secondary span attached to an [`Error`], e.g. "previous definition
/// here".
#[derive(Clone, Debug)]
pub struct Note {
  pub span: Span,
  pub message: String,
}

/// A fully-formed diagnostic. The compiler never panics on user error;
/// every checker/generator function returns `Result<T, Error>`.
#[derive(Clone, Debug)]
pub struct Error {
  pub span: Span,
  pub kind: ErrorKind,
  pub message: String,
  pub notes: Vec<Note>,
}

impl Error {
  #[must_use] pub fn new(span: Span, kind: ErrorKind, message: impl Into<String>) -> Self {
    Error { span, kind, message: message.into(), notes: Vec::new() }
  }

  #[must_use] pub fn with_note(mut self, span: Span, message: impl Into<String>) -> Self {
    self.notes.push(Note { span, message: message.into() });
    self
  }

  /// A compiler-bug error: carries the pass name and a freeform message,
  /// used only for violated internal invariants (never for user error).
  #[must_use] pub fn internal(span: Span, pass: &str, message: impl std::fmt::Display) -> Self {
    Error::new(span, ErrorKind::InternalInvariant, format!("[{pass}] {message}"))
  }

  /// Render the diagnostic block: kind tag, primary snippet, message,
  /// then each note with its own snippet.
  #[must_use] pub fn render(&self, sources: &SourceMap) -> String {
    if self.kind.is_internal() {
      return format!("internal compiler error: {}", self.message);
    }
    let mut out = format!("error[{}]: {}\n  --> {}\n{}\n", self.kind.tag(), self.message,
      sources.location(self.span), indent(&sources.snippet(self.span)));
    for note in &self.notes {
      out.push_str(&format!("note: {}\n  --> {}\n{}\n", note.message,
        sources.location(note.span), indent(&sources.snippet(note.span))));
    }
    out
  }
}

fn indent(s: &str) -> String {
  s.lines().map(|l| format!("  {l}")).collect::<Vec<_>>().join("\n")
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "error[{}]: {}", self.kind.tag(), self.message)
  }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal diagnostic recorded alongside a successful result (today
/// only the `mut`-but-never-mutated warning).
#[derive(Clone, Debug)]
pub struct Warning {
  pub span: Span,
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn render_includes_tag_and_location() {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", "let x: T = y;");
    let span = Span::new(id, 11, 12);
    let err = Error::new(span, ErrorKind::MutabilityMismatch, "cannot assign to immutable place");
    let rendered = err.render(&sm);
    assert!(rendered.contains("mutability-mismatch"));
    assert!(rendered.contains("t.lang:1:12"));
  }
}
