//! Tests for the background scheduler

use std::time::Duration;

use super::helpers::{compile_valid, number, run_script};
use crate::config::Config;
use crate::interpreter::executor::RetireReason;
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_zero_interval_runs_every_tick_and_keeps_variables() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Ticker
        variable count
        begin
            count += 1
            return count
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    for expected in 1..=3 {
        let report = vm.tick(ms(16));
        assert_eq!(report.completed.len(), 1);
        let (ran, value) = &report.completed[0];
        assert_eq!(*ran, id);
        assert_eq!(value.clone(), Some(Value::from(expected as f64)));
    }
    assert_eq!(vm.background_count(), 1);
}

#[test]
fn test_polling_interval_delays_runs() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Slow (1.0)
        begin
            return 1
        end
    "#,
    );
    assert_eq!(program.polling_interval(), 1.0);
    vm.background(&program, vec![]).unwrap();

    let ran: Vec<bool> = (0..5)
        .map(|_| !vm.tick(ms(400)).completed.is_empty())
        .collect();
    // First run is immediate, the next once a full second has accumulated
    assert_eq!(ran, vec![true, false, false, true, false]);
}

#[test]
fn test_seconds_passed_reports_time_between_runs() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Clock
        begin
            return GetSecondsPassed()
        end
    "#,
    );
    vm.background(&program, vec![]).unwrap();

    for _ in 0..3 {
        let report = vm.tick(ms(250));
        let value = report.completed[0].1.clone();
        assert_eq!(number(value), 0.25);
    }
}

#[test]
fn test_step_budget_parks_and_resumes() {
    let mut vm = Vm::new(Config {
        step_budget: 3,
        ..Config::default()
    });
    let program = compile_valid(
        &vm,
        r#"
        scriptname Long
        variable x
        begin
            x = 1
            x = 2
            x = 3
            return x
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    let first = vm.tick(ms(10));
    assert_eq!(first.parked, vec![id]);
    let second = vm.tick(ms(10));
    assert_eq!(second.parked, vec![id]);

    let third = vm.tick(ms(10));
    assert!(third.parked.is_empty());
    assert_eq!(third.completed.len(), 1);
    assert_eq!(number(third.completed[0].1.clone()), 3.0);
}

#[test]
fn test_return_with_halt_retires_the_context() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Once
        begin
            Return(1, 1)
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    let report = vm.tick(ms(10));
    assert_eq!(report.retired, vec![(id, RetireReason::Halted)]);
    assert_eq!(vm.background_count(), 0);
    assert!(vm.tick(ms(10)).is_idle());
    assert!(!vm.registry().is_executing(program.id()));
}

#[test]
fn test_is_backgrounding() {
    let source = r#"
        scriptname Where
        begin
            return IsBackgrounding()
        end
    "#;

    let (mut vm, result) = run_script(source, vec![]);
    assert_eq!(number(result), 0.0);

    let program = compile_valid(&vm, source);
    vm.background(&program, vec![]).unwrap();
    let report = vm.tick(ms(10));
    assert_eq!(number(report.completed[0].1.clone()), 1.0);
}

#[test]
fn test_runtime_error_retires_only_the_failing_context() {
    let mut vm = Vm::new(Config::default());
    let failing = compile_valid(
        &vm,
        r#"
        scriptname Failing
        variable x
        begin
            x = 1 / 0
        end
    "#,
    );
    let healthy = compile_valid(
        &vm,
        r#"
        scriptname Healthy
        begin
            return 1
        end
    "#,
    );
    let bad = vm.background(&failing, vec![]).unwrap();
    let good = vm.background(&healthy, vec![]).unwrap();

    let report = vm.tick(ms(10));
    assert_eq!(report.retired.len(), 1);
    assert_eq!(report.retired[0].0, bad);
    assert!(matches!(report.retired[0].1, RetireReason::Failed(_)));
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].0, good);

    assert_eq!(vm.background_count(), 1);
    assert_eq!(vm.tick(ms(10)).completed.len(), 1);
}

#[test]
fn test_error_command_retires_context_and_clears_the_signal() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Failing
        begin
            Error("boom")
            printc("unreachable")
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    let report = vm.tick(ms(10));
    assert_eq!(report.retired.len(), 1);
    assert_eq!(report.retired[0].0, id);
    assert!(!vm.global_exception_raised());
    assert_eq!(vm.console(), ["Script Error [Failing:4] boom".to_string()]);
}

#[test]
fn test_stop_background() {
    let mut vm = Vm::new(Config::default());
    let program = compile_valid(
        &vm,
        r#"
        scriptname Forever
        begin
            return 0
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    assert!(vm.stop_background(id));
    assert!(!vm.stop_background(id));
    assert!(vm.tick(ms(10)).is_idle());
}

#[test]
fn test_parked_run_stops_once_its_program_is_invalidated() {
    let mut vm = Vm::new(Config {
        step_budget: 2,
        ..Config::default()
    });
    vm.set_global("g", Value::from(1.0));
    let program = compile_valid(
        &vm,
        r#"
        scriptname Parked
        begin
            PrintToConsole("a")
            PrintToConsole("b")
            PrintToConsole("c" + g)
        end
    "#,
    );
    let id = vm.background(&program, vec![]).unwrap();

    let first = vm.tick(ms(10));
    assert_eq!(first.parked, vec![id]);
    assert_eq!(vm.take_console(), vec!["a".to_string()]);

    vm.remove_global("g");
    assert!(!program.is_valid());

    let second = vm.tick(ms(10));
    assert!(second.parked.is_empty());
    assert!(matches!(
        second.retired.as_slice(),
        [(retired, RetireReason::Failed(_))] if *retired == id
    ));
    assert!(vm.console().is_empty());
    assert_eq!(vm.background_count(), 0);
    assert!(!vm.registry().is_executing(program.id()));
}
