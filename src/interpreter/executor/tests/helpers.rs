//! Test helpers for executor tests
//!
//! Common utilities for compiling scripts and running them on a fresh VM

use std::rc::Rc;

use crate::config::Config;
use crate::interpreter::compiler::program::Program;
use crate::interpreter::errors::VmError;
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

/// Compile `source` on `vm`, panicking with the diagnostics if it isn't valid.
pub fn compile_valid(vm: &Vm, source: &str) -> Rc<Program> {
    let program = vm.compile(source).expect("Compile failed with an engine fault");
    assert!(
        program.is_valid(),
        "Program is not valid ({:?}): {:?}",
        program.state(),
        program.diagnostics()
    );
    program
}

/// Compile and run `source` synchronously on a default VM.
///
/// # Returns
/// The VM (for console/global inspection) and the script's return value
pub fn run_script(source: &str, args: Vec<Value>) -> (Vm, Option<Value>) {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(&vm, source);
    let result = vm.run_program(&program, args).expect("Script failed");
    (vm, result)
}

/// Like [`run_script`] but returns the run's error.
pub fn run_script_err(source: &str, args: Vec<Value>) -> (Vm, VmError) {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(&vm, source);
    let error = vm
        .run_program(&program, args)
        .expect_err("Script was expected to fail");
    (vm, error)
}

/// Return value as a number, panicking on anything else.
pub fn number(result: Option<Value>) -> f64 {
    match result {
        Some(Value::Numeric(n)) => n,
        other => panic!("Expected a numeric result, got {:?}", other),
    }
}
