use std::rc::Rc;

use super::standard::SymbolReferences;
use crate::interpreter::compiler::program::{Program, ProgramState};
use crate::interpreter::value::{ArrayHandle, Value};
use crate::interpreter::vm::Vm;

/* ===================== Helpers ===================== */

fn script(body: &str) -> String {
    format!("scriptname Expr\nvariable a = 1\nbegin\n{}\nend\n", body)
}

fn compile(vm: &Vm, body: &str) -> Rc<Program> {
    vm.compile(&script(body)).unwrap()
}

/// Evaluates `expression` as the script's return value.
fn eval(expression: &str) -> Value {
    let mut vm = Vm::default();
    let program = compile(&vm, &format!("return {}", expression));
    assert!(program.is_valid(), "{:?}", program.diagnostics());
    vm.run_program(&program, vec![]).unwrap().unwrap()
}

fn compile_error(body: &str) -> String {
    let vm = Vm::default();
    let program = compile(&vm, body);
    assert_eq!(program.state(), ProgramState::CompileError);
    program.diagnostics()[0].message.clone()
}

/* ===================== Compilation ===================== */

#[test]
fn test_unknown_identifier_is_a_compile_error() {
    let message = compile_error("return missing + 1");
    assert_eq!(message, "unknown identifier 'missing'");
}

#[test]
fn test_unknown_command_is_a_compile_error() {
    let message = compile_error("Frobnicate(1)");
    assert_eq!(message, "unknown command 'Frobnicate'");
}

#[test]
fn test_fixed_arity_is_checked_at_compile_time() {
    let message = compile_error("a = ArraySize()");
    assert_eq!(message, "'ArraySize' expects 1 argument(s), found 0");
}

#[test]
fn test_syntax_error_reports_column() {
    let message = compile_error("a = 1 +");
    assert!(message.starts_with("syntax error at column"), "{}", message);
}

#[test]
fn test_diagnostic_carries_the_statement_line() {
    let vm = Vm::default();
    let program = compile(&vm, "a = 2\na = nope");
    assert_eq!(program.diagnostics().len(), 1);
    assert_eq!(program.diagnostics()[0].line, 5);
}

#[test]
fn test_metadata_records_commands_and_globals() {
    let mut vm = Vm::default();
    vm.set_global("Limit", Value::Numeric(3.0));
    let program = compile(&vm, "a = ArrayCreate(LIMIT)\nreturn ArraySize(a)");
    assert!(program.is_valid(), "{:?}", program.diagnostics());

    let metadata = program.metadata().unwrap();
    let references = metadata.downcast_ref::<SymbolReferences>().unwrap();
    assert!(references.commands.contains("arraycreate"));
    assert!(references.commands.contains("arraysize"));
    assert!(references.commands.contains("return"));
    assert!(references.globals.contains("limit"));

    let engine = vm.engine();
    assert!(engine.depends_on(metadata, "ARRAYCREATE"));
    assert!(engine.depends_on(metadata, "limit"));
    assert!(!engine.depends_on(metadata, "ArrayClear"));
    assert!(!engine.depends_on(metadata, "a"));
}

/* ===================== Operators ===================== */

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3"), Value::Numeric(7.0));
    assert_eq!(eval("(1 + 2) * 3"), Value::Numeric(9.0));
    assert_eq!(eval("10 - 4 - 3"), Value::Numeric(3.0));
    assert_eq!(eval("7 % 4"), Value::Numeric(3.0));
    assert_eq!(eval("-2 * -3"), Value::Numeric(6.0));
    assert_eq!(eval("-(a + 1)"), Value::Numeric(-2.0));
}

#[test]
fn test_logical_operators_yield_zero_or_one() {
    assert_eq!(eval("!0"), Value::Numeric(1.0));
    assert_eq!(eval("!!5"), Value::Numeric(1.0));
    assert_eq!(eval("2 && 3"), Value::Numeric(1.0));
    assert_eq!(eval("0 || 0"), Value::Numeric(0.0));
    assert_eq!(eval("2 + 3 == 5 && a"), Value::Numeric(1.0));
}

#[test]
fn test_logical_operators_short_circuit() {
    let mut vm = Vm::default();
    let program = compile(&vm, "a = 0 && Error(\"left\")\nreturn a || 1 || Error(\"right\")");
    assert!(program.is_valid(), "{:?}", program.diagnostics());

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(result, Some(Value::Numeric(1.0)));
    assert!(vm.console().is_empty());
}

#[test]
fn test_addition_casts_and_concatenation() {
    assert_eq!(eval("\"5\" + 1"), Value::Numeric(6.0));
    assert_eq!(eval("\"2\" + \"3\""), Value::from("23"));
    assert_eq!(eval("\"x\" + 1"), Value::from("x1"));
    assert_eq!(eval("#10 + 1"), Value::Numeric(17.0));
}

#[test]
fn test_comparisons() {
    assert_eq!(eval("10 < 9"), Value::Numeric(0.0));
    assert_eq!(eval("\"10\" < \"9\""), Value::Numeric(1.0));
    assert_eq!(eval("\"b\" >= \"a\""), Value::Numeric(1.0));
    assert_eq!(eval("1 == \"1\""), Value::Numeric(1.0));
    assert_eq!(eval("\"a\" == \"A\""), Value::Numeric(0.0));
    assert_eq!(eval("#1F != 31"), Value::Numeric(0.0));
}

#[test]
fn test_string_escapes() {
    assert_eq!(eval(r#""say \"hi\"""#), Value::from("say \"hi\""));
    assert_eq!(eval(r#""a\tb""#), Value::from("a\tb"));
}

#[test]
fn test_nested_indexing() {
    assert_eq!(
        eval("ArrayCreate(ArrayCreate(1, 2), 3)[0][1]"),
        Value::Numeric(2.0)
    );
}

/* ===================== Assignment ===================== */

#[test]
fn test_compound_assignment_on_locals() {
    let value = eval_body("a += 4\na *= 3\na -= 1\na /= 2\nreturn a");
    assert_eq!(value, Value::Numeric(7.0));
}

#[test]
fn test_assignment_is_an_expression() {
    let value = eval_body("return (a = 5) + a");
    assert_eq!(value, Value::Numeric(10.0));
}

#[test]
fn test_compound_assignment_on_elements() {
    let value = eval_body("a = ArrayCreate(1, ArrayCreate(2))\na[1][0] += 5\nreturn a[1][0]");
    assert_eq!(value, Value::Numeric(7.0));
}

#[test]
fn test_global_assignment_writes_the_table() {
    let mut vm = Vm::default();
    vm.set_global("limit", Value::Numeric(3.0));
    let program = compile(&vm, "Limit += 1\nreturn limit");
    assert!(program.is_valid(), "{:?}", program.diagnostics());

    let result = vm.run_program(&program, vec![]).unwrap();
    assert_eq!(result, Some(Value::Numeric(4.0)));
    assert_eq!(vm.global("LIMIT"), Some(&Value::Numeric(4.0)));
}

#[test]
fn test_array_arguments_share_storage() {
    let mut vm = Vm::default();
    let shared = ArrayHandle::from_values(vec![Value::Numeric(1.0)]);
    vm.set_global("list", Value::from(shared.clone()));
    let program = compile(&vm, "ArrayInsert(list, 2)\nlist[0] = 9");
    assert!(program.is_valid(), "{:?}", program.diagnostics());

    vm.run_program(&program, vec![]).unwrap();
    assert_eq!(
        shared.elements(),
        vec![Value::Numeric(9.0), Value::Numeric(2.0)]
    );
}

/* ===================== Runtime Errors ===================== */

#[test]
fn test_type_errors_are_runtime_errors() {
    let mut vm = Vm::default();
    let program = compile(&vm, "a = \"x\"\nreturn a * 2");
    assert!(program.is_valid());

    let error = vm.run_program(&program, vec![]).unwrap_err();
    let text = error.to_string();
    assert!(text.contains("operator '*' expects a number"), "{}", text);
}

#[test]
fn test_indexing_a_number_is_a_runtime_error() {
    let mut vm = Vm::default();
    let program = compile(&vm, "return a[0]");
    let error = vm.run_program(&program, vec![]).unwrap_err();
    assert!(error.to_string().contains("cannot index"), "{}", error);
}

fn eval_body(body: &str) -> Value {
    let mut vm = Vm::default();
    let program = compile(&vm, body);
    assert!(program.is_valid(), "{:?}", program.diagnostics());
    vm.run_program(&program, vec![]).unwrap().unwrap()
}
