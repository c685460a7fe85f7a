//! Tests for runtime errors, the global exception signal and program lifetime rules

use std::time::Duration;

use super::helpers::{compile_valid, run_script_err};
use crate::config::Config;
use crate::interpreter::compiler::program::ProgramState;
use crate::interpreter::errors::VmError;
use crate::interpreter::executor::RetireReason;
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

#[test]
fn test_error_command_aborts_the_run() {
    let source = r#"
        scriptname Abort
        begin
            Error("stop here")
            printc("unreachable")
        end
    "#;

    let (vm, err) = run_script_err(source, vec![]);
    assert!(matches!(err, VmError::GlobalException(ref name) if name == "Abort"));
    assert!(!vm.global_exception_raised());
    assert_eq!(vm.console(), ["Script Error [Abort:4] stop here".to_string()]);
}

#[test]
fn test_global_exception_unwinds_every_caller() {
    let source = r#"
        scriptname Chain
        variable n
        variable x
        begin n
            if n == 0
                Error("deep")
            endif
            x = Call("SELF", n - 1)
            printc("after")
        end
    "#;

    let mut vm = Vm::new(Config::default());
    let program = compile_valid(&vm, source);
    let err = vm.run_program(&program, vec![Value::from(2.0)]).unwrap_err();

    assert!(matches!(err, VmError::GlobalException(_)));
    assert_eq!(vm.console(), ["Script Error [Chain:7] deep".to_string()]);
    assert_eq!(vm.call_depth(), 0);
    assert!(!vm.global_exception_raised());

    // The VM recovers for the next run
    let ok = compile_valid(&vm, "scriptname Ok\nbegin\n  return 1\nend\n");
    assert!(vm.run_program(&ok, vec![]).is_ok());
}

#[test]
fn test_error_in_initializer_fails_context_creation() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname BadInit
        variable x = Error("init")
        begin
            return x
        end
    "#,
    );

    let err = vm.create_context(&program, vec![]).unwrap_err();
    assert!(matches!(err, VmError::GlobalException(_)));
}

#[test]
fn test_command_argument_types_are_checked() {
    let source = r#"
        scriptname WrongType
        variable n
        begin
            n = ArraySize(5)
        end
    "#;

    let (_, err) = run_script_err(source, vec![]);
    let VmError::Runtime { error, .. } = err else {
        panic!("Expected a runtime error, got {:?}", err);
    };
    assert!(error.message.contains("ArraySize"), "{}", error.message);
}

#[test]
fn test_array_command_out_of_range() {
    let source = r#"
        scriptname OutOfRange
        variable a = ArrayCreate(1)
        variable n
        begin
            n = ArrayAt(a, 3)
        end
    "#;

    let (_, err) = run_script_err(source, vec![]);
    assert!(matches!(err, VmError::Runtime { .. }), "got {:?}", err);
}

#[test]
fn test_invalid_program_cannot_run() {
    let mut vm = Vm::new(Config::default());
    let program = vm
        .compile("scriptname Broken\nbegin\n  x = 1\nend\n")
        .unwrap();
    assert_eq!(program.state(), ProgramState::CompileError);

    let err = vm.run_program(&program, vec![]).unwrap_err();
    assert!(matches!(err, VmError::InvalidProgram(_)));
}

#[test]
fn test_release_refused_while_executing() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(&vm, "scriptname Loop\nbegin\n  return 0\nend\n");
    let id = vm.background(&program, vec![]).unwrap();
    assert!(vm.registry().is_executing(program.id()));

    let err = vm.release_program(program.clone()).unwrap_err();
    assert!(matches!(err, VmError::ProgramExecuting(_)));

    vm.stop_background(id);
    assert!(vm.release_program(program).is_ok());
}

#[test]
fn test_removing_a_global_retires_dependent_background_scripts() {
    let mut vm = Vm::new(Config::default());
    vm.set_global("speed", Value::from(2.0));
    let program = compile_valid(
        &vm,
        r#"
        scriptname Mover
        begin
            return speed * 2
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();
    assert_eq!(vm.tick(Duration::from_millis(10)).completed.len(), 1);

    assert!(vm.remove_global("SPEED").is_some());
    assert_eq!(program.state(), ProgramState::InvalidBytecode);

    let report = vm.tick(Duration::from_millis(10));
    assert_eq!(report.retired.len(), 1);
    assert_eq!(report.retired[0].0, id);
    assert!(matches!(report.retired[0].1, RetireReason::Failed(_)));
}
