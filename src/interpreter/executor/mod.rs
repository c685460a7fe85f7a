//! # Executor - Resumable Frame-Stack Interpreter
//!
//! Runs the syntax tree of a `Valid` program inside an [`ExecutionContext`].
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: all run state lives in the context's frame stack, so a run
//!    can stop after any step and resume on a later scheduler tick
//! 2. **Micro-steps**: each frame carries a phase; one step evaluates at most one expression
//! 3. **Centralized control flow**: Break/Continue/Return are requested by commands and
//!    applied by [`exec_loop::unwind`]
//! 4. **Engine-agnostic**: expression bytecode is always evaluated by the VM's engine through
//!    an [`ExecutionAgent`]

pub mod background;
pub mod context;
pub mod exec_loop;
pub mod statements;
pub mod types;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use crate::interpreter::commands;
use crate::interpreter::compiler::ast::Node;
use crate::interpreter::compiler::program::Program;
use crate::interpreter::errors::{EngineFault, RuntimeError, VmError};
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

pub use background::{BackgroundDaemon, RetireReason, TickReport};
pub use context::{ContextId, ExecutionContext};
pub use exec_loop::{run_until_done, run_with_budget, step, RunState};
pub use statements::Step;
pub use types::{Control, Frame, FrameKind};

/* ===================== Execution Agent ===================== */

/// What an expression engine and the commands it calls may touch while a statement runs:
/// the VM and the context executing the statement.
pub struct ExecutionAgent<'a> {
    vm: &'a mut Vm,
    context: &'a mut ExecutionContext,
}

impl<'a> ExecutionAgent<'a> {
    pub fn new(vm: &'a mut Vm, context: &'a mut ExecutionContext) -> Self {
        Self { vm, context }
    }

    pub fn vm(&self) -> &Vm {
        &*self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut *self.vm
    }

    pub fn context(&self) -> &ExecutionContext {
        &*self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut *self.context
    }

    pub fn program(&self) -> Rc<Program> {
        Rc::clone(self.context.program())
    }

    pub fn local(&self, slot: usize) -> Option<&Value> {
        self.context.local(slot)
    }

    pub fn local_mut(&mut self, slot: usize) -> Option<&mut Value> {
        self.context.local_mut(slot)
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.vm.globals().get(name)
    }

    /// Assigns an existing global. Returns false when it has been removed.
    pub fn set_global(&mut self, name: &str, value: Value) -> bool {
        self.vm.globals_mut().assign(name, value)
    }

    /// Invokes the command registered as `name`.
    pub fn invoke(
        &mut self,
        name: &str,
        arguments: Vec<Value>,
        line: u32,
    ) -> Result<Value, RuntimeError> {
        let command = self.vm.commands().lookup(name).ok_or_else(|| {
            RuntimeError::new(line, format!("command '{}' is no longer registered", name))
        })?;
        commands::invoke(command.as_ref(), arguments, self, line)
    }
}

/// Evaluate the bytecode attached to `node` in `ctx`.
pub(crate) fn evaluate_node(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    node: &Node,
) -> Result<Value, VmError> {
    let bytecode = node.bytecode.as_ref().ok_or_else(|| {
        EngineFault::new(format!("line {}: node was never compiled", node.line))
    })?;
    let engine = Rc::clone(vm.engine());

    let result = {
        let mut agent = ExecutionAgent::new(vm, ctx);
        engine.evaluate(bytecode, node.line, &mut agent)
    };

    result.map_err(|error| VmError::Runtime {
        program: ctx.program().name().to_string(),
        error,
    })
}
