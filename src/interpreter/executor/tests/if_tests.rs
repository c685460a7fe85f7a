//! Tests for If/ElseIf/Else statements

use super::helpers::{number, run_script, run_script_err};
use crate::interpreter::errors::VmError;
use crate::interpreter::value::Value;

const CLASSIFY: &str = r#"
    scriptname Classify
    variable n
    begin n
        if n < 0
            return -1
        elseif n == 0
            return 0
        elseif n < 10
            return 1
        else
            return 2
        endif
        return 99
    end
"#;

#[test]
fn test_if_takes_first_matching_branch() {
    let cases = [(-5.0, -1.0), (0.0, 0.0), (3.0, 1.0), (50.0, 2.0)];
    for (input, expected) in cases {
        let (_, result) = run_script(CLASSIFY, vec![Value::from(input)]);
        assert_eq!(number(result), expected, "input {}", input);
    }
}

#[test]
fn test_if_without_branches_falls_through() {
    let source = r#"
        scriptname Bare
        variable x = 1
        begin
            if x > 5
                x = 100
            endif
            return x
        end
    "#;

    let (_, result) = run_script(source, vec![]);
    assert_eq!(number(result), 1.0);
}

#[test]
fn test_nested_ifs() {
    let source = r#"
        scriptname Nested
        variable a = 1
        variable b = 2
        variable r
        begin
            if a == 1
                if b == 3
                    r = 1
                else
                    r = 2
                endif
                r += 10
            endif
            return r
        end
    "#;

    let (_, result) = run_script(source, vec![]);
    assert_eq!(number(result), 12.0);
}

#[test]
fn test_elseif_conditions_after_a_match_are_not_evaluated() {
    let source = r#"
        scriptname Lazy
        variable x = 1
        begin
            if x == 1
                printc("first")
            elseif printc("evaluated")
                printc("second")
            endif
        end
    "#;

    let (vm, _) = run_script(source, vec![]);
    assert_eq!(vm.console(), ["first".to_string()]);
}

#[test]
fn test_string_condition_is_a_runtime_error() {
    let source = r#"
        scriptname BadCondition
        variable s = "text"
        begin
            if s
                return 1
            endif
        end
    "#;

    let (_, err) = run_script_err(source, vec![]);
    assert!(matches!(err, VmError::Runtime { .. }), "got {:?}", err);
}
