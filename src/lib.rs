pub mod cli;
pub mod config;
pub mod interpreter;

pub use config::Config;
pub use interpreter::{Program, ProgramState, Value, Vm, VmError};
