//! Compiler driver
//!
//! Compilation runs in two stages:
//! 1. The structural parser turns preprocessed lines into a syntax tree (`Parsed`)
//! 2. The compile visitor hands every expression-bearing node to the expression engine and
//!    attaches the returned bytecode (`Valid`)
//!
//! Either stage leaves the program in `CompileError` with line-tagged diagnostics when the
//! script is at fault.

pub mod ast;
pub mod parser;
pub mod program;


use std::fs;
use std::path::{Path, PathBuf};

use self::ast::{NodeId, NodeKind, SyntaxTree};
use self::program::{Program, ProgramState};
use crate::interpreter::engine::{Compilation, CompileScope, CompilerMetadata};
use crate::interpreter::errors::{Diagnostic, EngineFault};
use crate::interpreter::preprocessor::preprocess;
use crate::interpreter::vm::Vm;

pub use self::ast::Node;
pub use self::program::{ProgramId, ProgramRegistry, Variable};

/* ===================== Public API ===================== */

/// Compile script text against the VM's globals, commands and expression engine.
pub fn compile_source(
    vm: &Vm,
    source: &str,
    path: Option<PathBuf>,
) -> Result<Program, EngineFault> {
    let mut program = Program::new(vm.registry(), path);
    let lines = preprocess(source);

    parser::generate_program(vm.globals(), &mut program, &lines)?;
    generate_bytecode(vm, &mut program)?;

    match program.state() {
        ProgramState::Valid => tracing::debug!(script = program.name(), "Program compiled"),
        state => tracing::debug!(
            script = program.name(),
            ?state,
            errors = program.diagnostics().len(),
            "Program failed to compile"
        ),
    }
    Ok(program)
}

/// Compile a script file. An unreadable file yields an `Uncompiled` program with a diagnostic.
pub fn compile_file(vm: &Vm, path: &Path) -> Result<Program, EngineFault> {
    match fs::read_to_string(path) {
        Ok(source) => compile_source(vm, &source, Some(path.to_path_buf())),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Couldn't read script: {}", e);
            let mut program = Program::new(vm.registry(), Some(path.to_path_buf()));
            program.push_diagnostic(Diagnostic::new(
                0,
                format!("couldn't read {}: {}", path.display(), e),
            ));
            Ok(program)
        }
    }
}

/// Second stage: compile every node of a `Parsed` program. Other states are left untouched.
pub fn generate_bytecode(vm: &Vm, program: &mut Program) -> Result<(), EngineFault> {
    if program.state() != ProgramState::Parsed {
        return Ok(());
    }

    let mut tree = program
        .take_tree()
        .ok_or_else(|| EngineFault::new("parsed program has no syntax tree"))?;
    let engine = vm.engine();
    let name = program.name().to_string();

    let (failed, diagnostics, metadata) = {
        let scope = CompileScope {
            program_name: &name,
            variables: program.variables(),
            globals: vm.globals(),
            commands: vm.commands(),
        };
        let mut visitor = CompileVisitor::new(engine.begin_compilation(scope), &name);
        visitor.visit_program(&mut tree)?;
        visitor.finish()
    };

    for diagnostic in diagnostics {
        program.push_diagnostic(diagnostic);
    }
    program.set_metadata(metadata);
    program.set_tree(Some(tree));
    program.set_state(if failed {
        ProgramState::CompileError
    } else {
        ProgramState::Valid
    });
    Ok(())
}

/* ===================== Compile Visitor ===================== */

/// Depth-first walk attaching bytecode to nodes.
///
/// A failing node is recorded and the walk goes on, so one pass reports every error.
pub struct CompileVisitor<'a> {
    compilation: Box<dyn Compilation + 'a>,
    program_name: &'a str,
    failed: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CompileVisitor<'a> {
    pub fn new(compilation: Box<dyn Compilation + 'a>, program_name: &'a str) -> Self {
        Self {
            compilation,
            program_name,
            failed: false,
            diagnostics: Vec::new(),
        }
    }

    /// Initializers first, then the Begin block.
    pub fn visit_program(&mut self, tree: &mut SyntaxTree) -> Result<(), EngineFault> {
        for id in tree.initializers.clone() {
            self.compile_node(tree, id)?;
        }
        let root = tree.root;
        self.visit(tree, root)
    }

    fn visit(&mut self, tree: &mut SyntaxTree, id: NodeId) -> Result<(), EngineFault> {
        match tree.node(id).kind.clone() {
            NodeKind::Begin | NodeKind::Else => self.visit_children(tree, id),
            NodeKind::Expression => self.compile_node(tree, id),
            NodeKind::While | NodeKind::ForEach { .. } | NodeKind::ElseIf => {
                self.compile_node(tree, id)?;
                self.visit_children(tree, id)
            }
            NodeKind::If {
                else_ifs,
                else_branch,
            } => {
                self.compile_node(tree, id)?;
                if let Some(branch) = else_branch {
                    self.visit(tree, branch)?;
                }
                for branch in else_ifs {
                    self.visit(tree, branch)?;
                }
                self.visit_children(tree, id)
            }
        }
    }

    fn visit_children(&mut self, tree: &mut SyntaxTree, id: NodeId) -> Result<(), EngineFault> {
        for child in tree.node(id).children.clone() {
            self.visit(tree, child)?;
        }
        Ok(())
    }

    fn compile_node(&mut self, tree: &mut SyntaxTree, id: NodeId) -> Result<(), EngineFault> {
        let node = tree.node(id);
        let line = node.line;
        let source = node.expression.clone().ok_or_else(|| {
            EngineFault::new(format!("line {}: node has no expression to compile", line))
        })?;

        match self.compilation.compile(line, &source) {
            Ok(bytecode) => tree.node_mut(id).bytecode = Some(bytecode),
            Err(e) => {
                tracing::error!(script = self.program_name, line, "Compiler error: {}", e);
                self.diagnostics.push(Diagnostic::new(line, e.message));
                self.failed = true;
            }
        }
        Ok(())
    }

    /// Ends the compilation: (failed, diagnostics, engine metadata).
    pub fn finish(self) -> (bool, Vec<Diagnostic>, Option<CompilerMetadata>) {
        (self.failed, self.diagnostics, self.compilation.finish())
    }
}
