//! Interned identifiers.
//!
//! Every name that appears in source text (variable, function, struct,
//! module segment, field, attribute...) is interned once into a `Symbol`,
//! a small `Copy` handle that is cheap to carry around in the AST, scope
//! tree, and IR. Equality and hashing on `Symbol` are `u32` comparisons;
//! the backing string only needs to be looked up for diagnostics.

use hashbrown::HashMap;

/// A handle to an interned string. Two symbols are equal iff their
/// underlying strings are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Symbol({})", self.0)
  }
}

impl Symbol {
  /// The symbol for `_`, used as the "discard" / wildcard binding name.
  pub const UNDER: Symbol = Symbol(0);

  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
}

/// Owns the backing strings for every [`Symbol`] produced so far.
#[derive(Default)]
pub struct Interner {
  strings: Vec<Box<str>>,
  map: HashMap<Box<str>, Symbol>,
}

impl Interner {
  #[must_use] pub fn new() -> Self {
    let mut this = Self::default();
    let under = this.intern_fresh("_");
    debug_assert_eq!(under, Symbol::UNDER);
    this
  }

  fn intern_fresh(&mut self, s: &str) -> Symbol {
    let id = Symbol(u32::try_from(self.strings.len()).expect("too many interned symbols"));
    self.strings.push(s.into());
    self.map.insert(s.into(), id);
    id
  }

  /// Intern `s`, reusing the existing symbol if already interned.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    self.intern_fresh(s)
  }

  /// Look up the string behind a symbol. Panics if `sym` was not produced
  /// by this interner.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str {
    &self.strings[sym.into_usize()]
  }
}

/// Build a dense lookup table from symbol index to `T`, for the common
/// pattern of mapping a handful of known keyword symbols to an enum tag.
///
/// Mirrors the dense-symbol-map helper used by hash-consed keyword tables
/// elsewhere in the pack: a `Vec` indexed by `Symbol`, with `None` holes
/// for every symbol that isn't one of `entries`.
pub fn init_dense_symbol_map<T: Copy>(len_hint: usize, entries: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let max = entries.iter().map(|(s, _)| s.into_usize()).max().map_or(0, |m| m + 1).max(len_hint);
  let mut table = vec![None; max];
  for &(s, v) in entries { table[s.into_usize()] = Some(v) }
  table.into_boxed_slice()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("foo");
    let c = i.intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(i.resolve(a), "foo");
  }

  #[test]
  fn under_is_first() {
    let i = Interner::new();
    assert_eq!(i.resolve(Symbol::UNDER), "_");
  }
}
