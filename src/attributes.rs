//! The `![name(args)]` attribute vocabulary.
//!
//! Attributes are parsed generically into [`crate::types::ast::Attributes`]
//! (a name plus a list of [`crate::types::ast::AttrArg`]) and only given
//! meaning here, where each known name is matched against the shape it
//! expects. An attribute name the parser didn't recognize at all fails at
//! parse time (`UnknownAttribute`); a recognized name used with the wrong
//! argument shape fails here, at the point its containing declaration is
//! checked.

use crate::error::{Error, ErrorKind, Result};
use crate::scope::Linkage;
use crate::span::Span;
use crate::symbol::Interner;
use crate::types::ast::{AttrArg, Attributes, FuncDecl, Literal, ProcKind};

/// The attribute names this crate gives meaning to. The parser accepts
/// exactly these (by string) and rejects anything else with
/// `UnknownAttribute` before the checker ever sees it.
pub const KNOWN_ATTRIBUTES: &[&str] = &[
  "link", "llvm_intrinsic", "no_mangle", "packed", "noreturn", "inline", "always_inline", "cold",
];

/// Find an attribute by name, resolving each entry's interned name back
/// to text for the comparison (the attribute vocabulary is small and
/// fixed, so a linear scan over a declaration's own attribute list is
/// cheap).
fn find<'a>(attrs: &'a Attributes, interner: &Interner, name: &str) -> Option<(&'a [AttrArg], Span)> {
  attrs.entries.iter()
    .find(|(n, _, _)| interner.resolve(*n) == name)
    .map(|(_, args, span)| (args.as_slice(), *span))
}

/// Derive a [`Linkage`] from a function's declared attributes and its
/// surface `extern` flag.
pub fn linkage_for(decl: &FuncDecl, attrs: &Attributes, interner: &Interner) -> Result<Linkage> {
  let mut linkage = Linkage { extern_c: matches!(decl.kind, ProcKind::Extern), ..Linkage::default() };

  if let Some((args, span)) = find(attrs, interner, "link") {
    let [AttrArg { value: Literal::Str(name), .. }] = args else {
      return Err(attr_shape_error("link", span));
    };
    linkage.link_name = Some(name.clone());
  }

  if find(attrs, interner, "no_mangle").is_some() {
    linkage.no_mangle = true;
  }

  if let Some((args, span)) = find(attrs, interner, "llvm_intrinsic") {
    let [AttrArg { value: Literal::Str(name), .. }] = args else {
      return Err(attr_shape_error("llvm_intrinsic", span));
    };
    linkage.export_name = Some(name.clone());
  }

  Ok(linkage)
}

/// Whether `attrs` carries `![noreturn]`: a function so marked never
/// needs a trailing `return`/fallthrough value, since control never
/// reaches the end of its body.
#[must_use] pub fn is_noreturn(attrs: &Attributes, interner: &Interner) -> bool {
  find(attrs, interner, "noreturn").is_some()
}

/// Whether `attrs` carries `![packed]`. This crate never emits native
/// code, so the only place this matters is that `sizeof`/`offsetof`
/// already assume no inter-field padding — the flag is accepted
/// and has no further effect on layout here, but an unpacked struct with
/// it present is still recorded for a hypothetical downstream backend.
#[must_use] pub fn is_packed(attrs: &Attributes, interner: &Interner) -> bool {
  find(attrs, interner, "packed").is_some()
}

/// `![inline]` / `![always_inline]` / `![cold]` are native-codegen hints
/// outside this crate's scope: accepted for shape (no arguments) and
/// otherwise inert.
pub fn validate_hint_attrs(attrs: &Attributes, interner: &Interner) -> Result<()> {
  for name in ["inline", "always_inline", "cold"] {
    if let Some((args, span)) = find(attrs, interner, name) {
      if !args.is_empty() {
        return Err(attr_shape_error(name, span));
      }
    }
  }
  Ok(())
}

fn attr_shape_error(name: &str, span: Span) -> Error {
  Error::new(span, ErrorKind::UnknownAttribute, format!("attribute `{name}` used with an unexpected argument shape"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::SourceMap;
  use crate::types::ast::AttrArg;

  fn attrs_with(interner: &mut Interner, name: &str, args: Vec<AttrArg>, span: Span) -> Attributes {
    let sym = interner.intern(name);
    Attributes { entries: vec![(sym, args, span)] }
  }

  #[test]
  fn link_attribute_sets_link_name() {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", "x");
    let span = Span::new(id, 0, 1);
    let mut interner = Interner::new();
    let attrs = attrs_with(&mut interner, "link", vec![AttrArg { value: Literal::Str("puts".into()), keyword: None }], span);
    let decl = FuncDecl {
      name: interner.intern("puts"), generic_params: vec![], params: vec![], return_type: None,
      body: None, kind: ProcKind::Extern, public: false, attrs: Attributes::default(), span,
    };
    let linkage = linkage_for(&decl, &attrs, &interner).unwrap();
    assert_eq!(linkage.link_name.as_deref(), Some("puts"));
    assert!(linkage.extern_c);
  }

  #[test]
  fn noreturn_is_detected() {
    let mut sm = SourceMap::new();
    let id = sm.add("t.lang", "x");
    let span = Span::new(id, 0, 1);
    let mut interner = Interner::new();
    let attrs = attrs_with(&mut interner, "noreturn", vec![], span);
    assert!(is_noreturn(&attrs, &interner));
    assert!(!is_packed(&attrs, &interner));
  }
}
