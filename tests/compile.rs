//! End-to-end pipeline tests: source text in, checked `Program` out (or
//! a rejected program, for the negative cases). Unlike the per-module
//! `#[cfg(test)]` suites, these exercise lexer, parser, checker, and
//! generator together through the public `compile` entry point.

use langc::state::CompileOptions;
use langc::{compile, CompileOutput};

fn compile_ok(src: &str) -> CompileOutput {
  match compile("t.lang", src, CompileOptions::default()) {
    Ok(out) => out,
    Err((err, state)) => panic!("expected success, got:\n{}", err.render(&state.source_map)),
  }
}

fn compile_err(src: &str) -> langc::Error {
  match compile("t.lang", src, CompileOptions::default()) {
    Ok(_) => panic!("expected a compile error, but `{src}` compiled cleanly"),
    Err((err, _state)) => err,
  }
}

#[test]
fn compiles_a_function_that_adds_its_arguments() {
  let out = compile_ok("func add(a: i32, b: i32) -> i32 { return a + b; }");
  assert_eq!(out.program.functions.len(), 1);
  let f = out.state.function(out.program.functions[0]);
  assert!(f.body.is_some());
  assert!(f.entry_block.is_some());
}

#[test]
fn compiles_a_struct_and_a_constructor() {
  let out = compile_ok(
    "struct Point { x: i32, y: i32 }\n\
     func origin() -> Point { return Point { x: 0, y: 0 }; }",
  );
  assert_eq!(out.program.structs.len(), 1);
  assert_eq!(out.program.functions.len(), 1);
}

#[test]
fn compiles_control_flow_and_loops() {
  compile_ok(
    "func sum_to(n: i32) -> i32 {\n\
       let mut total: i32 = 0;\n\
       let mut i: i32 = 0;\n\
       while i < n {\n\
         total = total + i;\n\
         i = i + 1;\n\
       }\n\
       return total;\n\
     }",
  );
}

#[test]
fn compiles_a_for_range_loop() {
  compile_ok(
    "func count(n: i32) -> i32 {\n\
       let mut total: i32 = 0;\n\
       for i in 0..n {\n\
         total = total + i;\n\
       }\n\
       return total;\n\
     }",
  );
}

#[test]
fn compiles_an_enum_declaration_and_variant_reference() {
  compile_ok(
    "enum Color { Red, Green, Blue }\n\
     func red() -> i32 { return Red; }",
  );
}

#[test]
fn compiles_a_match_over_integer_literals() {
  compile_ok(
    "func classify(n: i32) -> i32 {\n\
       return match n {\n\
         0 => 10,\n\
         1 | 2 => 20,\n\
         else => 0,\n\
       };\n\
     }",
  );
}

#[test]
fn compiles_an_if_expression_used_as_a_value() {
  compile_ok(
    "func abs(x: i32) -> i32 {\n\
       return x if x >= 0 else -x;\n\
     }",
  );
}

#[test]
fn compiles_pointer_arithmetic_and_dereference() {
  compile_ok(
    "func first(p: *i32) -> i32 {\n\
       return *p;\n\
     }",
  );
}

#[test]
fn compiles_integer_and_null_literals_narrowed_by_declared_type() {
  compile_ok(
    "func narrow() -> u8 {\n\
       let x: u8 = 200;\n\
       return x;\n\
     }\n\
     func pointee(p: *i32) -> i32 { return *p; }\n\
     func nil() -> i32 {\n\
       let p: *i32 = null;\n\
       return pointee(p);\n\
     }",
  );
}

#[test]
fn compiles_sizeof_and_a_static_assert() {
  compile_ok("static_assert(sizeof(i32) == 4, \"i32 must be four bytes\");");
}

#[test]
fn compiles_nested_struct_field_access_and_array_indexing() {
  compile_ok(
    "struct Vec3 { x: i32, y: i32, z: i32 }\n\
     func sum(v: Vec3) -> i32 { return v.x + v.y + v.z; }\n\
     func first_of(xs: [i32; 3]) -> i32 { return xs[0]; }",
  );
}

#[test]
fn rejects_a_return_type_mismatch() {
  let err = compile_err("func f() -> i32 { return true; }");
  assert_eq!(err.kind, langc::error::ErrorKind::TypeMismatch);
}

#[test]
fn rejects_a_call_with_the_wrong_arity() {
  let err = compile_err(
    "func add(a: i32, b: i32) -> i32 { return a + b; }\n\
     func wrong() -> i32 { return add(1); }",
  );
  assert_eq!(err.kind, langc::error::ErrorKind::ArityMismatch);
}

#[test]
fn rejects_an_unknown_identifier() {
  let err = compile_err("func f() -> i32 { return nonexistent; }");
  assert_eq!(err.kind, langc::error::ErrorKind::UnknownIdentifier);
}

#[test]
fn rejects_assignment_through_an_immutable_binding() {
  let err = compile_err(
    "func f() -> i32 {\n\
       let x: i32 = 1;\n\
       x = 2;\n\
       return x;\n\
     }",
  );
  assert_eq!(err.kind, langc::error::ErrorKind::MutabilityMismatch);
}

#[test]
fn rendered_errors_point_at_the_offending_source_line() {
  let (err, state) = match compile("t.lang", "func f() -> i32 { return true; }", CompileOptions::default()) {
    Err(pair) => pair,
    Ok(_) => unreachable!(),
  };
  let rendered = err.render(&state.source_map);
  assert!(rendered.contains("t.lang"));
}
