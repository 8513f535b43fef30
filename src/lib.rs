//! Ahead-of-time compiler front- and mid-end for a statically typed,
//! expression-oriented systems language.
//!
//! The pipeline is a straight line, each stage owning its own module:
//!
//! - [`lexer`] turns source text into a [`token::TokenStream`].
//! - [`parser`] drives a `TokenStream` into an attributed [`types::ast::Ast`].
//! - [`check`] walks the `Ast`, resolving names and types against the
//!   hash-consed [`types::ty::TypeRegistry`] and the lexical [`scope`] tree.
//! - [`generate`] lowers the checked `Ast` into the register-based
//!   [`types::ir::Program`].
//!
//! [`state::State`] is the mutable context threaded through the last two
//! stages; [`compile`] wires the whole thing together for a single
//! source file.

pub mod attributes;
pub mod check;
pub mod const_eval;
pub mod error;
pub mod generate;
pub mod ids;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod span;
pub mod state;
pub mod symbol;
pub mod token;
pub mod types;

use error::Result;
use lexer::Lexer;
use parser::Parser;
use span::SourceId;
use state::{CompileOptions, State};
use types::ast::Ast;
use types::ir::Program;

/// Everything a driver needs to turn diagnostics back into source
/// locations, plus the lowered program.
pub struct CompileOutput {
  pub program: Program,
  pub state: State,
  pub ast: Ast,
}

/// Parse, check, and lower one source file start to finish.
///
/// `name` is the display name recorded in the [`span::SourceMap`] (a
/// file path in a real driver, anything unique enough in a test). On
/// error, `state.source_map` is still populated, so callers can render
/// the failing [`error::Error`] with [`error::Error::render`].
pub fn compile(name: &str, source: &str, options: CompileOptions) -> std::result::Result<CompileOutput, (Error, State)> {
  let mut state = State::new(options);
  let source_id = state.source_map.add(name, source.to_string());
  let mut ast = Ast::new();

  if let Err(e) = parse(source_id, source, &mut ast, &mut state) {
    return Err((e, state));
  }
  if let Err(e) = check::TypeChecker::new(&ast, &mut state).check_program() {
    return Err((e, state));
  }
  let program = match generate::BytecodeGenerator::new(&ast, &mut state).generate_program(&ast.items) {
    Ok(p) => p,
    Err(e) => return Err((e, state)),
  };
  Ok(CompileOutput { program, state, ast })
}

fn parse(source_id: SourceId, source: &str, ast: &mut Ast, state: &mut State) -> Result<()> {
  let lexer = Lexer::new(source_id, source);
  let mut parser = Parser::new(lexer, ast, state, source_id);
  parser.parse_program()
}

pub use error::Error;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compiles_a_trivial_function() {
    let out = compile("t.lang", "func add(a: i32, b: i32) -> i32 { return a + b; }", CompileOptions::default());
    assert!(out.is_ok());
  }

  #[test]
  fn reports_a_type_error_with_a_renderable_span() {
    let result = compile("t.lang", "func f() -> i32 { return true; }", CompileOptions::default());
    let Err((err, state)) = result else { panic!("expected a type error") };
    let rendered = err.render(&state.source_map);
    assert!(rendered.contains("error["));
  }
}
