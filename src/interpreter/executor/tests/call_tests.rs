//! Tests for script-to-script calls

use std::fs;
use std::path::Path;
use std::rc::Rc;

use super::helpers::{compile_valid, number, run_script};
use crate::config::Config;
use crate::interpreter::compiler::program::ProgramState;
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

fn write_script(root: &Path, name: &str, source: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, source).unwrap();
}

fn vm_with_root(root: &Path) -> Vm {
    Vm::new(Config {
        script_root: root.to_path_buf(),
        ..Config::default()
    })
}

#[test]
fn test_self_recursion() {
    let source = r#"
        scriptname Factorial
        variable n
        begin n
            if n <= 1
                return 1
            endif
            return n * Call("SELF", n - 1)
        end
    "#;

    let (_, result) = run_script(source, vec![Value::from(5.0)]);
    assert_eq!(number(result), 120.0);
}

#[test]
fn test_named_call_and_shorthand() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "math/double.lute",
        "scriptname Double\nvariable x\nbegin x\n  return x * 2\nend\n",
    );

    let mut vm = vm_with_root(dir.path());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Caller
        variable a
        begin
            a = Call("math/double", 20)
            return a + @math.double(0.5)
        end
    "#,
    );

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(number(result), 41.0);
    assert_eq!(vm.cached_programs().count(), 1);
}

#[test]
fn test_callee_without_return_yields_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "noop.lute",
        "scriptname Noop\nvariable x\nbegin\n  x = 1\nend\n",
    );

    let mut vm = vm_with_root(dir.path());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Caller
        begin
            return Call("noop") + 1
        end
    "#,
    );

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(number(result), 1.0);
}

#[test]
fn test_failed_call_yields_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "broken.lute", "scriptname Broken\nbegin\n  while 1\nend\n");

    let mut vm = vm_with_root(dir.path());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Caller
        begin
            return Call("missing") + Call("broken") + 5
        end
    "#,
    );

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(number(result), 5.0);
    assert_eq!(vm.cached_programs().count(), 0);
}

#[test]
fn test_callee_does_not_touch_caller_variables() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "clobber.lute",
        "scriptname Clobber\nvariable x = 100\nbegin\n  x = 200\n  return x\nend\n",
    );

    let mut vm = vm_with_root(dir.path());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Caller
        variable x = 1
        variable y
        begin
            y = Call("clobber")
            return x + y
        end
    "#,
    );

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(number(result), 201.0);
}

#[test]
fn test_call_depth_is_limited() {
    let vm_config = Config {
        max_call_depth: 3,
        ..Config::default()
    };
    let mut vm = Vm::new(vm_config);
    let program = compile_valid(
        &vm,
        r#"
        scriptname Forever
        begin
            return Call("SELF") + 1
        end
    "#,
    );

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(number(result), 3.0);
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_unregistering_a_command_invalidates_cached_callers() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "talker.lute",
        "scriptname Talker\nbegin\n  printc(\"hi\")\nend\n",
    );

    let mut vm = vm_with_root(dir.path());
    let talker = vm.load_script("talker").unwrap();
    assert!(talker.is_valid());

    vm.unregister_command("PrintToConsole").unwrap();
    assert_eq!(talker.state(), ProgramState::InvalidBytecode);

    // Recompiling fails now that the command is gone
    assert!(vm.load_script("talker").is_err());
}

#[test]
fn test_cached_programs_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "one.lute", "scriptname One\nbegin\n  return 1\nend\n");

    let mut vm = vm_with_root(dir.path());
    let first = vm.load_script("one").unwrap();
    let second = vm.load_script("one.lute").unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}
