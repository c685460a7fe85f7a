//! Execution context: the per-run state of one program instance
//!
//! Everything the interpreter needs to resume a run lives here (frame stack, pending control
//! request, locals), so a backgrounded context can be parked between scheduler ticks.

use std::rc::Rc;

use serde::Serialize;

use super::types::{Control, Frame, FrameKind};
use crate::interpreter::compiler::program::{ExecutionGuard, Program};
use crate::interpreter::errors::{EngineFault, VmError};
use crate::interpreter::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(pub u64);

#[derive(Debug)]
pub struct ExecutionContext {
    // Declared before `program` so it drops first: the registry must not see the program
    // freed while still counted as executing.
    _guard: ExecutionGuard,
    program: Rc<Program>,
    id: ContextId,

    pub(crate) locals: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) control: Control,

    return_value: Option<Value>,
    halt_requested: bool,
    backgrounded: bool,

    /// Seconds accumulated since the current (or last) run started.
    elapsed: f64,
    /// Value of `elapsed` when the current run started.
    seconds_passed: f64,
    runs: u64,
}

impl ExecutionContext {
    /// Creates a context with parameters bound positionally from `arguments`.
    ///
    /// Every other variable starts as Numeric 0; initializers are evaluated by the VM.
    pub(crate) fn new(
        id: ContextId,
        program: Rc<Program>,
        arguments: Vec<Value>,
    ) -> Result<Self, VmError> {
        if !program.is_valid() {
            return Err(VmError::InvalidProgram(program.name().to_string()));
        }
        if arguments.len() != program.parameter_count() {
            return Err(VmError::ParameterMismatch {
                name: program.name().to_string(),
                expected: program.parameter_count(),
                supplied: arguments.len(),
            });
        }

        let mut locals = vec![Value::Numeric(0.0); program.variables().len()];
        for (&slot, argument) in program.parameters().iter().zip(arguments) {
            let local = locals
                .get_mut(slot)
                .ok_or_else(|| EngineFault::new(format!("parameter slot {} out of range", slot)))?;
            *local = argument;
        }

        Ok(Self {
            _guard: program.registry().begin_execution(program.id()),
            program,
            id,
            locals,
            frames: Vec::new(),
            control: Control::None,
            return_value: None,
            halt_requested: false,
            backgrounded: false,
            elapsed: 0.0,
            seconds_passed: 0.0,
            runs: 0,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /* ---------- variables ---------- */

    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    pub fn local(&self, slot: usize) -> Option<&Value> {
        self.locals.get(slot)
    }

    pub fn local_mut(&mut self, slot: usize) -> Option<&mut Value> {
        self.locals.get_mut(slot)
    }

    /// Current value of the variable called `name`.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.program
            .variable_slot(name)
            .and_then(|slot| self.locals.get(slot))
    }

    /* ---------- run lifecycle ---------- */

    pub fn is_running(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Starts a new run at the top of the Begin block.
    pub(crate) fn begin_run(&mut self) -> Result<(), EngineFault> {
        let root = self
            .program
            .tree()
            .map(|tree| tree.root)
            .ok_or_else(|| EngineFault::new("program has no syntax tree"))?;

        self.frames.clear();
        self.frames.push(Frame {
            kind: FrameKind::Block { idx: 0 },
            node: root,
        });
        self.control = Control::None;
        self.return_value = None;
        self.seconds_passed = self.elapsed;
        self.elapsed = 0.0;
        self.runs += 1;
        Ok(())
    }

    pub(crate) fn finish_run(&mut self) {
        self.frames.clear();
        self.control = Control::None;
    }

    /// Drops the remainder of the current run.
    pub(crate) fn abort(&mut self) {
        self.frames.clear();
        self.control = Control::None;
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /* ---------- control requests ---------- */

    pub fn control(&self) -> Control {
        self.control
    }

    pub fn request_break(&mut self) {
        self.control = Control::Break;
    }

    pub fn request_continue(&mut self) {
        self.control = Control::Continue;
    }

    /// Stops the run. A `halt` request also retires a backgrounded context.
    pub fn request_return(&mut self, value: Option<Value>, halt: bool) {
        self.control = Control::Return;
        self.return_value = value;
        self.halt_requested |= halt;
    }

    pub fn take_return_value(&mut self) -> Option<Value> {
        self.return_value.take()
    }

    pub fn halt_requested(&self) -> bool {
        self.halt_requested
    }

    /* ---------- scheduling ---------- */

    pub fn is_backgrounded(&self) -> bool {
        self.backgrounded
    }

    pub(crate) fn set_backgrounded(&mut self, backgrounded: bool) {
        self.backgrounded = backgrounded;
    }

    pub(crate) fn accumulate(&mut self, seconds: f64) {
        self.elapsed += seconds;
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Seconds between the start of the previous run and the start of this one.
    pub fn seconds_passed(&self) -> f64 {
        self.seconds_passed
    }
}
