//! Lute interpreter
//!
//! Source text flows through the pipeline:
//! preprocessor → tokenizer → structural parser → compile visitor (+ expression engine)
//! → `Valid` program → execution context run by the [`Vm`].

pub mod commands;
pub mod compiler;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod globals;
pub mod preprocessor;
pub mod tokenizer;
pub mod value;
pub mod vm;

pub use commands::{Command, CommandCall, CommandInfo, CommandTable, ParameterType};
pub use compiler::program::{Program, ProgramState};
pub use engine::{ExpressionEngine, StandardEngine};
pub use errors::{Diagnostic, EngineFault, RuntimeError, VmError};
pub use executor::{ContextId, ExecutionContext, RetireReason, TickReport};
pub use globals::GlobalTable;
pub use value::{ArrayHandle, DataType, Value};
pub use vm::Vm;
