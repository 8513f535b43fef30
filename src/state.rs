//! The compilation-wide mutable context.
//!
//! Every compile-time singleton — the interner, the hash-consed type
//! store, the scope tree, the global function/struct/trait/module tables
//! — is constructed once here and threaded explicitly through
//! [`crate::check::TypeChecker`] and [`crate::generate::BytecodeGenerator`]
//! as a context parameter. Nothing in this crate reaches for thread-local
//! or process-wide state.

use std::collections::HashMap as StdHashMap;
use std::path::PathBuf;

use hashbrown::HashMap;

use crate::const_eval::Constant;
use crate::error::Warning;
use crate::ids::{BlockId, FunctionId, ImplId, ModuleId, Register, StructId, TraitId};
use crate::scope::{Function, Impl, LoopTarget, Module, ScopeId, ScopeTree, Struct, Trait, Variable};
use crate::span::SourceMap;
use crate::symbol::Interner;
use crate::types::ast::ExprId;
use crate::types::ty::{TypeId, TypeRegistry};

/// The knobs a CLI driver would plumb in (`-I`/`-D`/module-root
/// surface; the CLI itself stays external to this crate).
#[derive(Clone, Debug)]
pub struct CompileOptions {
  /// Search roots tried in order when resolving `import a::b::c`,
  /// including whatever the embedded standard-library root is.
  pub module_roots: Vec<PathBuf>,
  /// Source file extension (without the dot) used when resolving
  /// `a/b/c.<ext>`.
  pub source_extension: String,
  /// File name tried for the `a/b/c/<name>` directory-module form.
  pub module_root_file: String,
  /// `-D name[=value]` preprocessor-style defines.
  pub defines: StdHashMap<String, Option<String>>,
}

impl Default for CompileOptions {
  fn default() -> Self {
    CompileOptions {
      module_roots: Vec::new(),
      source_extension: "lang".to_string(),
      module_root_file: "module".to_string(),
      defines: StdHashMap::new(),
    }
  }
}

/// Every deferred expression recorded so far in the function currently
/// being generated, paired with the lexical scope it was written in (so
/// it can be re-lowered at each return point against the right
/// bindings), in declaration order: run in reverse at every `Return`.
type DeferStack = Vec<(ScopeId, ExprId)>;

/// The single mutable context threaded through checking and generation.
pub struct State {
  pub source_map: SourceMap,
  pub interner: Interner,
  pub types: TypeRegistry,
  pub scopes: ScopeTree,
  pub options: CompileOptions,

  pub global_functions: Vec<Function>,
  pub global_structs: Vec<Struct>,
  pub global_traits: Vec<Trait>,
  pub global_modules: Vec<Module>,
  pub impls: Vec<Impl>,

  /// Module-scope non-`const` `let` globals, keyed by `Variable::index`
  /// (shares its index space with `constants` and enum variants, so this
  /// is a map rather than a dense `Vec`).
  pub global_variables: HashMap<u32, Variable>,
  /// Folded values of every `const` global, keyed the same way, used by
  /// [`crate::const_eval::ConstantEvaluator`] to resolve `const` reads.
  pub constants: HashMap<u32, Constant>,

  /// Top-level calls that must run before `main`: currently
  /// populated by top-level `let`/`static_assert` initializers with
  /// side-effecting call expressions.
  pub early_calls: Vec<ExprId>,

  pub warnings: Vec<Warning>,

  next_register: u32,
  next_global: u32,
  next_local: HashMap<FunctionId, u32>,
  /// Type of every register allocated so far during IR generation, so
  /// later lowering steps (a binary op's safe-cast, a call's argument
  /// check) can recover an operand's type without re-inferring it.
  register_types: HashMap<Register, TypeId>,

  pub current_scope: ScopeId,
  pub current_function: Option<FunctionId>,
  pub current_struct: Option<StructId>,
  pub current_module: Option<ModuleId>,
  pub current_self_type: Option<TypeId>,
  pub current_block: Option<BlockId>,

  loop_stack: Vec<LoopTarget>,
  defer_stack: Vec<DeferStack>,
}

impl State {
  #[must_use] pub fn new(options: CompileOptions) -> Self {
    let scopes = ScopeTree::new();
    let root = scopes.root();
    State {
      source_map: SourceMap::new(),
      interner: Interner::new(),
      types: TypeRegistry::new(),
      scopes,
      options,
      global_functions: Vec::new(),
      global_structs: Vec::new(),
      global_traits: Vec::new(),
      global_modules: Vec::new(),
      impls: Vec::new(),
      global_variables: HashMap::new(),
      constants: HashMap::new(),
      early_calls: Vec::new(),
      warnings: Vec::new(),
      next_register: 0,
      next_global: 0,
      next_local: HashMap::new(),
      register_types: HashMap::new(),
      current_scope: root,
      current_function: None,
      current_struct: None,
      current_module: None,
      current_self_type: None,
      current_block: None,
      loop_stack: Vec::new(),
      defer_stack: Vec::new(),
    }
  }

  /// Allocate the next virtual register. Registers are monotonic and
  /// never reused.
  pub fn alloc_register(&mut self) -> Register {
    let r = Register::new(self.next_register);
    self.next_register += 1;
    r
  }

  /// Allocate a register and record its type, for later recovery by
  /// [`Self::register_type`].
  pub fn alloc_typed_register(&mut self, ty: TypeId) -> Register {
    let r = self.alloc_register();
    self.register_types.insert(r, ty);
    r
  }

  #[must_use] pub fn register_type(&self, r: Register) -> TypeId {
    *self.register_types.get(&r).expect("register used before its type was recorded")
  }

  /// Allocate the next global variable slot.
  pub fn alloc_global(&mut self) -> u32 {
    let g = self.next_global;
    self.next_global += 1;
    g
  }

  /// Allocate the next local-variable slot within `func` (reset per
  /// function: each `Function.locals` table is its own index space).
  pub fn alloc_local(&mut self, func: FunctionId) -> u32 {
    let counter = self.next_local.entry(func).or_insert(0);
    let idx = *counter;
    *counter += 1;
    idx
  }

  pub fn push_scope(&mut self, kind: crate::scope::ScopeKind, name: Option<crate::symbol::Symbol>) -> ScopeId {
    let child = self.scopes.push(self.current_scope, kind, name);
    self.current_scope = child;
    child
  }

  pub fn pop_scope_to(&mut self, scope: ScopeId) {
    self.current_scope = scope;
  }

  /// Install `target` as the active loop target, returning the previous
  /// one (if any, for nested loops) so the caller can restore it.
  pub fn push_loop(&mut self, target: LoopTarget) -> Option<LoopTarget> {
    let prev = self.loop_stack.last().copied();
    self.loop_stack.push(target);
    prev
  }

  pub fn pop_loop(&mut self) {
    self.loop_stack.pop();
  }

  #[must_use] pub fn current_loop(&self) -> Option<LoopTarget> {
    self.loop_stack.last().copied()
  }

  pub fn push_defer_frame(&mut self) {
    self.defer_stack.push(Vec::new());
  }

  pub fn pop_defer_frame(&mut self) -> DeferStack {
    self.defer_stack.pop().unwrap_or_default()
  }

  pub fn record_defer(&mut self, scope: ScopeId, expr: ExprId) {
    if let Some(frame) = self.defer_stack.last_mut() { frame.push((scope, expr)) }
  }

  /// Deferred expressions for the current function, in the LIFO order
  /// they must run at a `return`.
  #[must_use] pub fn pending_defers(&self) -> Vec<(ScopeId, ExprId)> {
    self.defer_stack.last().map(|f| f.iter().rev().copied().collect()).unwrap_or_default()
  }

  #[must_use] pub fn function(&self, id: FunctionId) -> &Function { &self.global_functions[id.index()] }
  pub fn function_mut(&mut self, id: FunctionId) -> &mut Function { &mut self.global_functions[id.index()] }
  #[must_use] pub fn struct_(&self, id: StructId) -> &Struct { &self.global_structs[id.index()] }
  pub fn struct_mut(&mut self, id: StructId) -> &mut Struct { &mut self.global_structs[id.index()] }
  #[must_use] pub fn trait_(&self, id: TraitId) -> &Trait { &self.global_traits[id.index()] }
  #[must_use] pub fn module(&self, id: ModuleId) -> &Module { &self.global_modules[id.index()] }
  pub fn module_mut(&mut self, id: ModuleId) -> &mut Module { &mut self.global_modules[id.index()] }
  #[must_use] pub fn impl_(&self, id: ImplId) -> &Impl { &self.impls[id.index()] }
  pub fn impl_mut(&mut self, id: ImplId) -> &mut Impl { &mut self.impls[id.index()] }

  #[must_use] pub fn struct_layouts(&self) -> crate::layout::StructLayouts<'_> {
    crate::layout::StructLayouts::new(&self.global_structs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn registers_are_monotonic_and_never_reused() {
    let mut state = State::new(CompileOptions::default());
    let a = state.alloc_register();
    let b = state.alloc_register();
    assert_ne!(a, b);
  }

  #[test]
  fn locals_are_scoped_per_function() {
    let mut state = State::new(CompileOptions::default());
    let f0 = FunctionId::new(0);
    let f1 = FunctionId::new(1);
    assert_eq!(state.alloc_local(f0), 0);
    assert_eq!(state.alloc_local(f0), 1);
    assert_eq!(state.alloc_local(f1), 0);
  }

  #[test]
  fn defer_frame_runs_lifo() {
    let mut state = State::new(CompileOptions::default());
    let mut ast = crate::types::ast::Ast::new();
    let mut sm = crate::span::SourceMap::new();
    let src = sm.add("t.lang", "0");
    let sp = crate::span::Span::new(src, 0, 1);
    let a = ast.alloc_expr(crate::types::ast::Expr::Literal(crate::types::ast::Literal::Int { value: 0, suffix: None }), sp);
    let b = ast.alloc_expr(crate::types::ast::Expr::Literal(crate::types::ast::Literal::Int { value: 1, suffix: None }), sp);
    let scope = state.scopes.root();
    state.push_defer_frame();
    state.record_defer(scope, a);
    state.record_defer(scope, b);
    let pending = state.pending_defers();
    assert_eq!(pending, vec![(scope, b), (scope, a)]);
  }
}
