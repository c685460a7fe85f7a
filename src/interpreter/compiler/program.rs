//! Compiled program and the program registry
//!
//! A [`Program`] moves through a small state machine:
//!
//! ```text
//! Uncompiled ──parse──▶ Parsed ──bytecode──▶ Valid ──invalidate──▶ InvalidBytecode
//!      │                  │
//!      └──────────────────┴──────▶ CompileError
//! ```
//!
//! Only `Valid` programs may be executed. Every program is recorded in the VM's
//! [`ProgramRegistry`] for its whole lifetime; execution contexts additionally hold an
//! [`ExecutionGuard`] so the VM can tell whether a program is currently running.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;

use super::ast::SyntaxTree;
use crate::interpreter::engine::CompilerMetadata;
use crate::interpreter::errors::Diagnostic;

/// Maximum number of Begin block parameters
pub const MAX_PARAMETERS: usize = 10;

/// Name reported for programs that never got past their first line
pub const UNNAMED_PROGRAM: &str = "<unnamed>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProgramId(pub u64);

/* ===================== State ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgramState {
    Uncompiled,
    Parsed,
    Valid,
    CompileError,
    InvalidBytecode,
}

/// A declared script variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    /// Lowercased name.
    pub name: String,
    /// Declaration text from the name onwards, e.g. `foo = 5`.
    pub initializer: Option<String>,
    pub line: u32,
}

/* ===================== Program ===================== */

#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    path: Option<PathBuf>,
    name: String,
    polling_interval: f64,
    variables: Vec<Variable>,
    parameters: Vec<usize>,
    tree: Option<SyntaxTree>,
    state: Cell<ProgramState>,
    diagnostics: Vec<Diagnostic>,
    metadata: Option<CompilerMetadata>,
    registry: ProgramRegistry,
}

impl Program {
    pub fn new(registry: &ProgramRegistry, path: Option<PathBuf>) -> Self {
        Self {
            id: registry.register(),
            path,
            name: UNNAMED_PROGRAM.to_string(),
            polling_interval: 0.0,
            variables: Vec::new(),
            parameters: Vec::new(),
            tree: None,
            state: Cell::new(ProgramState::Uncompiled),
            diagnostics: Vec::new(),
            metadata: None,
            registry: registry.clone(),
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seconds between background runs; 0 runs on every tick.
    pub fn polling_interval(&self) -> f64 {
        self.polling_interval
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Slot of the variable called `name` (case-insensitive).
    pub fn variable_slot(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable_slot(name).is_some()
    }

    /// Variable slots bound to Begin parameters, in declaration order.
    pub fn parameters(&self) -> &[usize] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_parameter(&self, slot: usize) -> bool {
        self.parameters.contains(&slot)
    }

    pub fn tree(&self) -> Option<&SyntaxTree> {
        self.tree.as_ref()
    }

    pub fn state(&self) -> ProgramState {
        self.state.get()
    }

    pub fn is_valid(&self) -> bool {
        self.state.get() == ProgramState::Valid
    }

    pub fn is_compiled(&self) -> bool {
        !matches!(
            self.state.get(),
            ProgramState::Uncompiled | ProgramState::CompileError
        )
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn metadata(&self) -> Option<&CompilerMetadata> {
        self.metadata.as_ref()
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// Marks the bytecode stale after a command or global it references went away.
    pub fn invalidate_bytecode(&self) {
        if self.state.get() == ProgramState::Valid {
            self.state.set(ProgramState::InvalidBytecode);
        }
    }

    /* ---------- compiler access ---------- */

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn set_polling_interval(&mut self, seconds: f64) {
        self.polling_interval = seconds;
    }

    pub(crate) fn add_variable(&mut self, variable: Variable) -> usize {
        self.variables.push(variable);
        self.variables.len() - 1
    }

    pub(crate) fn add_parameter(&mut self, slot: usize) {
        self.parameters.push(slot);
    }

    pub(crate) fn set_tree(&mut self, tree: Option<SyntaxTree>) {
        self.tree = tree;
    }

    pub(crate) fn take_tree(&mut self) -> Option<SyntaxTree> {
        self.tree.take()
    }

    pub(crate) fn set_state(&self, state: ProgramState) {
        self.state.set(state);
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn set_metadata(&mut self, metadata: Option<CompilerMetadata>) {
        self.metadata = metadata;
    }
}

impl Drop for Program {
    // Every execution context holds an `Rc<Program>`, so an executing program is never dropped.
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

/* ===================== Registry ===================== */

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    registered: HashSet<ProgramId>,
    executing: HashMap<ProgramId, usize>,
}

/// Tracks live programs and the number of execution contexts running each one.
#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    inner: Rc<RefCell<RegistryState>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> ProgramId {
        let mut state = self.inner.borrow_mut();
        state.next_id += 1;
        let id = ProgramId(state.next_id);
        state.registered.insert(id);
        id
    }

    fn deregister(&self, id: ProgramId) {
        self.inner.borrow_mut().registered.remove(&id);
    }

    pub fn is_registered(&self, id: ProgramId) -> bool {
        self.inner.borrow().registered.contains(&id)
    }

    pub fn registered_count(&self) -> usize {
        self.inner.borrow().registered.len()
    }

    pub fn is_executing(&self, id: ProgramId) -> bool {
        self.execution_count(id) > 0
    }

    pub fn execution_count(&self, id: ProgramId) -> usize {
        self.inner.borrow().executing.get(&id).copied().unwrap_or(0)
    }

    /// Records a live execution of `id` until the returned guard drops.
    pub fn begin_execution(&self, id: ProgramId) -> ExecutionGuard {
        *self.inner.borrow_mut().executing.entry(id).or_insert(0) += 1;
        ExecutionGuard {
            registry: self.clone(),
            id,
        }
    }
}

/// Live-execution marker held by an execution context
#[derive(Debug)]
pub struct ExecutionGuard {
    registry: ProgramRegistry,
    id: ProgramId,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        let mut state = self.registry.inner.borrow_mut();
        if let Some(count) = state.executing.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                state.executing.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programs_register_and_deregister() {
        let registry = ProgramRegistry::new();
        let first = Program::new(&registry, None);
        let second = Program::new(&registry, None);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.registered_count(), 2);

        let id = first.id();
        drop(first);
        assert!(!registry.is_registered(id));
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_execution_guards_count() {
        let registry = ProgramRegistry::new();
        let program = Program::new(&registry, None);
        let a = registry.begin_execution(program.id());
        let b = registry.begin_execution(program.id());
        assert_eq!(registry.execution_count(program.id()), 2);
        drop(a);
        assert!(registry.is_executing(program.id()));
        drop(b);
        assert!(!registry.is_executing(program.id()));
    }

    #[test]
    fn test_invalidate_only_affects_valid_programs() {
        let registry = ProgramRegistry::new();
        let program = Program::new(&registry, None);
        program.invalidate_bytecode();
        assert_eq!(program.state(), ProgramState::Uncompiled);

        program.set_state(ProgramState::Valid);
        assert!(program.is_valid());
        program.invalidate_bytecode();
        assert_eq!(program.state(), ProgramState::InvalidBytecode);
        assert!(!program.is_valid());
    }

    #[test]
    fn test_variable_lookup_is_case_insensitive() {
        let registry = ProgramRegistry::new();
        let mut program = Program::new(&registry, None);
        program.add_variable(Variable {
            name: "counter".into(),
            initializer: None,
            line: 2,
        });
        assert_eq!(program.variable_slot("COUNTER"), Some(0));
        assert!(!program.has_variable("other"));
    }
}
