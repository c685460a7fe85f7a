//! Pluggable expression engine
//!
//! The compiler never interprets expression text itself. Each statement is handed to an
//! [`ExpressionEngine`] which returns opaque [`ByteCode`]; at run time the interpreter hands that
//! bytecode back to the same engine for evaluation.

pub mod standard;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::commands::CommandTable;
use crate::interpreter::compiler::program::Variable;
use crate::interpreter::errors::{ExpressionError, RuntimeError};
use crate::interpreter::executor::ExecutionAgent;
use crate::interpreter::globals::GlobalTable;
use crate::interpreter::value::Value;

pub use standard::StandardEngine;

/* ===================== Opaque Payloads ===================== */

/// Engine-specific compiled form of one statement
#[derive(Clone)]
pub struct ByteCode(Rc<dyn Any>);

impl ByteCode {
    pub fn new<T: Any>(code: T) -> Self {
        ByteCode(Rc::new(code))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteCode(..)")
    }
}

/// Per-program data produced at the end of a compilation
pub struct CompilerMetadata(Box<dyn Any>);

impl CompilerMetadata {
    pub fn new<T: Any>(metadata: T) -> Self {
        CompilerMetadata(Box::new(metadata))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for CompilerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompilerMetadata(..)")
    }
}

/* ===================== Engine Contract ===================== */

/// Symbols visible while compiling one program
#[derive(Clone, Copy)]
pub struct CompileScope<'a> {
    pub program_name: &'a str,
    pub variables: &'a [Variable],
    pub globals: &'a GlobalTable,
    pub commands: &'a CommandTable,
}

/// One in-progress program compilation.
pub trait Compilation {
    /// Compiles a single statement. `line` is the node's source line.
    fn compile(&mut self, line: u32, source: &str) -> Result<ByteCode, ExpressionError>;

    /// Ends the compilation, yielding metadata to attach to the program.
    fn finish(self: Box<Self>) -> Option<CompilerMetadata>;
}

pub trait ExpressionEngine {
    fn name(&self) -> &'static str;

    fn begin_compilation<'a>(&self, scope: CompileScope<'a>) -> Box<dyn Compilation + 'a>;

    fn evaluate(
        &self,
        bytecode: &ByteCode,
        line: u32,
        agent: &mut ExecutionAgent<'_>,
    ) -> Result<Value, RuntimeError>;

    /// Whether a program compiled with `metadata` references `symbol` (command or global).
    fn depends_on(&self, _metadata: &CompilerMetadata, _symbol: &str) -> bool {
        false
    }
}
