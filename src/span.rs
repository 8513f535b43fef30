//! Source buffers and byte-offset spans.
//!
//! `SourceMap` owns every loaded source file and is the only thing that
//! can turn a [`Span`] into a human-readable `file:line:col` plus a
//! snippet; `Span` itself is a plain value so it can be stamped onto
//! every AST node and IR-adjacent diagnostic without borrowing anything.

use std::path::{Path, PathBuf};

/// A source file id, indexing into a [`SourceMap`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SourceId(u32);

/// A half-open byte range `[start, end)` within a single source file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
  pub start: u32,
  pub end: u32,
  pub source_id: u32,
}

impl std::fmt::Debug for Span {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}..{}@{}", self.start, self.end, self.source_id)
  }
}

impl Span {
  #[must_use] pub fn new(source_id: SourceId, start: u32, end: u32) -> Self {
    debug_assert!(start <= end);
    Span { start, end, source_id: source_id.0 }
  }

  #[must_use] pub fn source_id(self) -> SourceId { SourceId(self.source_id) }

  /// The smallest span enclosing both `self` and `other`. Both must come
  /// from the same source file.
  #[must_use] pub fn to(self, other: Span) -> Span {
    debug_assert_eq!(self.source_id, other.source_id);
    Span { start: self.start.min(other.start), end: self.end.max(other.end), source_id: self.source_id }
  }

  /// A zero-width span at `self`'s start, used for diagnostics that point
  /// just before a token (e.g. "expected `;` here").
  #[must_use] pub fn shrink_to_start(self) -> Span { Span { end: self.start, ..self } }
}

/// A resolved human-readable location: 1-based line and column.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LineCol { pub line: u32, pub col: u32 }

struct SourceFile {
  name: PathBuf,
  text: String,
  /// Byte offset of the start of each line, including line 0 at offset 0.
  line_starts: Vec<u32>,
}

impl SourceFile {
  fn new(name: PathBuf, text: String) -> Self {
    let mut line_starts = vec![0u32];
    for (i, b) in text.bytes().enumerate() {
      if b == b'\n' { line_starts.push(u32::try_from(i + 1).expect("source file too large")) }
    }
    SourceFile { name, text, line_starts }
  }

  fn line_col(&self, offset: u32) -> LineCol {
    let line = match self.line_starts.binary_search(&offset) {
      Ok(l) => l,
      Err(l) => l - 1,
    };
    let col = offset - self.line_starts[line];
    LineCol { line: u32::try_from(line).unwrap() + 1, col: col + 1 }
  }

  fn line_text(&self, line: u32) -> &str {
    let idx = (line - 1) as usize;
    let start = self.line_starts[idx] as usize;
    let end = self.line_starts.get(idx + 1).map_or(self.text.len(), |&e| e as usize);
    self.text[start..end].trim_end_matches(['\n', '\r'])
  }
}

/// Owns every loaded source buffer for one compilation.
#[derive(Default)]
pub struct SourceMap {
  files: Vec<SourceFile>,
}

impl SourceMap {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Load a new source buffer, returning its id.
  pub fn add(&mut self, name: impl Into<PathBuf>, text: impl Into<String>) -> SourceId {
    let id = SourceId(u32::try_from(self.files.len()).expect("too many source files"));
    self.files.push(SourceFile::new(name.into(), text.into()));
    id
  }

  /// Load a source buffer from disk.
  pub fn add_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<SourceId> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    Ok(self.add(path.to_path_buf(), text))
  }

  #[must_use] pub fn text(&self, id: SourceId) -> &str { &self.files[id.0 as usize].text }

  #[must_use] pub fn name(&self, id: SourceId) -> &Path { &self.files[id.0 as usize].name }

  #[must_use] pub fn span_text(&self, span: Span) -> &str {
    &self.files[span.source_id as usize].text[span.start as usize..span.end as usize]
  }

  #[must_use] pub fn line_col(&self, span: Span) -> LineCol {
    self.files[span.source_id as usize].line_col(span.start)
  }

  /// Render `file:line:col` for the start of `span`.
  #[must_use] pub fn location(&self, span: Span) -> String {
    let file = &self.files[span.source_id as usize];
    let lc = file.line_col(span.start);
    format!("{}:{}:{}", file.name.display(), lc.line, lc.col)
  }

  /// Render the source line containing `span` together with a `^^^`
  /// underline beneath the span's extent (clamped to that one line).
  #[must_use] pub fn snippet(&self, span: Span) -> String {
    let file = &self.files[span.source_id as usize];
    let start = file.line_col(span.start);
    let end_line_offset = file.line_starts.get(start.line as usize).copied().unwrap_or(u32::MAX);
    let underline_end = span.end.min(end_line_offset.saturating_sub(1)).max(span.start);
    let width = (underline_end - span.start).max(1);
    let line = file.line_text(start.line);
    let mut out = String::new();
    out.push_str(line);
    out.push('\n');
    for _ in 1..start.col { out.push(' ') }
    for _ in 0..width { out.push('^') }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn line_col_tracks_newlines() {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", "let x = 1;\nlet y = 2;\n");
    let span = Span::new(id, 15, 16); // the 'y' of 'let y'
    let lc = sm.line_col(span);
    assert_eq!(lc.line, 2);
  }

  #[test]
  fn snippet_underlines_the_span() {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", "let x = 1;");
    let span = Span::new(id, 4, 5);
    let snippet = sm.snippet(span);
    assert!(snippet.contains("let x = 1;"));
    assert!(snippet.lines().nth(1).unwrap().starts_with("    ^"));
  }
}
