//! Flow control, script calls, console output and utility commands

use std::rc::Rc;

use rand::Rng;

use super::format::format_printf;
use super::{Command, CommandCall, CommandInfo, ParameterInfo, ParameterType};
use crate::interpreter::compiler::program::MAX_PARAMETERS;
use crate::interpreter::errors::RuntimeError;

/// Reserved `Call` target naming the calling program itself
pub const SELF_TARGET: &str = "SELF";

pub fn commands() -> Vec<Rc<dyn Command>> {
    vec![
        Rc::new(Return),
        Rc::new(Call),
        Rc::new(Break),
        Rc::new(Continue),
        Rc::new(GetSecondsPassed),
        Rc::new(FormatNumber),
        Rc::new(PrintToConsole),
        Rc::new(RandomNumber),
        Rc::new(Error),
        Rc::new(IsBackgrounding),
    ]
}

/* ===================== Flow Control ===================== */

pub struct Return;

static RETURN_INFO: CommandInfo = CommandInfo {
    name: "Return",
    alias: None,
    description: "Stops the current script, optionally with a result",
    documentation: "Return([value[, halt]]). A non-zero halt also ends background execution.",
    parameters: &[
        ParameterInfo::new("value", ParameterType::Multi),
        ParameterInfo::new("halt", ParameterType::Numeric),
    ],
    result: ParameterType::Multi,
    variadic: true,
};

impl Command for Return {
    fn info(&self) -> &CommandInfo {
        &RETURN_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        if call.argument_count() > 2 {
            return Err(call.error("expects at most 2 arguments"));
        }

        let value = call.arguments.first().cloned();
        let halt = match call.argument_count() {
            2 => call.number(1)? != 0.0,
            _ => false,
        };
        call.agent.context_mut().request_return(value, halt);
        Ok(false)
    }
}

pub struct Break;

static BREAK_INFO: CommandInfo = CommandInfo {
    name: "Break",
    alias: None,
    description: "Exits the innermost loop",
    documentation: "",
    parameters: &[],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for Break {
    fn info(&self) -> &CommandInfo {
        &BREAK_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        call.agent.context_mut().request_break();
        Ok(true)
    }
}

pub struct Continue;

static CONTINUE_INFO: CommandInfo = CommandInfo {
    name: "Continue",
    alias: None,
    description: "Skips to the next iteration of the innermost loop",
    documentation: "",
    parameters: &[],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for Continue {
    fn info(&self) -> &CommandInfo {
        &CONTINUE_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        call.agent.context_mut().request_continue();
        Ok(true)
    }
}

/* ===================== Calls ===================== */

pub struct Call;

static CALL_INFO: CommandInfo = CommandInfo {
    name: "Call",
    alias: None,
    description: "Runs another script synchronously and returns its result",
    documentation: "Call(script[, args...]). `SELF` calls the current script. \
                    Evaluates to 0 when the callee fails or returns nothing.",
    parameters: &[ParameterInfo::new("script", ParameterType::String)],
    result: ParameterType::Multi,
    variadic: true,
};

impl Command for Call {
    fn info(&self) -> &CommandInfo {
        &CALL_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let target = call.string(0)?;
        let forwarded = call.arguments[1..].to_vec();
        if forwarded.len() > MAX_PARAMETERS {
            return Err(call.error(format!(
                "too many arguments ({}, max {})",
                forwarded.len(),
                MAX_PARAMETERS
            )));
        }

        let program = if target.eq_ignore_ascii_case(SELF_TARGET) {
            call.agent.program()
        } else {
            match call.agent.vm_mut().load_script(target) {
                Ok(program) => program,
                Err(e) => {
                    tracing::warn!(line = call.line, "Call to '{}' failed: {}", target, e);
                    return Ok(true);
                }
            }
        };

        match call.agent.vm_mut().run_program(&program, forwarded) {
            Ok(Some(value)) => *call.result = value,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = call.line, "Call to '{}' failed: {}", target, e);
            }
        }
        Ok(true)
    }
}

/* ===================== Context Queries ===================== */

pub struct GetSecondsPassed;

static GET_SECONDS_PASSED_INFO: CommandInfo = CommandInfo {
    name: "GetSecondsPassed",
    alias: None,
    description: "Seconds since the current context last ran",
    documentation: "",
    parameters: &[],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for GetSecondsPassed {
    fn info(&self) -> &CommandInfo {
        &GET_SECONDS_PASSED_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        call.result.set_number(call.agent.context().seconds_passed());
        Ok(true)
    }
}

pub struct IsBackgrounding;

static IS_BACKGROUNDING_INFO: CommandInfo = CommandInfo {
    name: "IsBackgrounding",
    alias: None,
    description: "1 when the current context runs under the background scheduler",
    documentation: "",
    parameters: &[],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for IsBackgrounding {
    fn info(&self) -> &CommandInfo {
        &IS_BACKGROUNDING_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let backgrounded = call.agent.context().is_backgrounded();
        call.result.set_number(if backgrounded { 1.0 } else { 0.0 });
        Ok(true)
    }
}

/* ===================== Utilities ===================== */

pub struct FormatNumber;

static FORMAT_NUMBER_INFO: CommandInfo = CommandInfo {
    name: "FormatNumber",
    alias: None,
    description: "Formats a number with a printf-style format string",
    documentation: "FormatNumber(format, number, unsigned). A non-zero `unsigned` reads the \
                    number as a 32-bit unsigned integer first.",
    parameters: &[
        ParameterInfo::new("format", ParameterType::String),
        ParameterInfo::new("number", ParameterType::Numeric),
        ParameterInfo::new("unsigned", ParameterType::Numeric),
    ],
    result: ParameterType::String,
    variadic: false,
};

impl Command for FormatNumber {
    fn info(&self) -> &CommandInfo {
        &FORMAT_NUMBER_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let format = call.string(0)?;
        let number = call.number(1)?;
        let unsigned = call.number(2)? != 0.0;

        let text = format_printf(format, number, unsigned).map_err(|e| call.error(e))?;
        call.result.set_string(text);
        Ok(true)
    }
}

pub struct PrintToConsole;

static PRINT_TO_CONSOLE_INFO: CommandInfo = CommandInfo {
    name: "PrintToConsole",
    alias: Some("printc"),
    description: "Writes a value to the console",
    documentation: "",
    parameters: &[ParameterInfo::new("message", ParameterType::Multi)],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for PrintToConsole {
    fn info(&self) -> &CommandInfo {
        &PRINT_TO_CONSOLE_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let message = call.argument(0)?.to_string();
        call.agent.vm_mut().log_console(message);
        Ok(true)
    }
}

pub struct RandomNumber;

static RANDOM_NUMBER_INFO: CommandInfo = CommandInfo {
    name: "RandomNumber",
    alias: Some("rand"),
    description: "Uniform random number in [min, max)",
    documentation: "Bounds may be given in either order.",
    parameters: &[
        ParameterInfo::new("min", ParameterType::Numeric),
        ParameterInfo::new("max", ParameterType::Numeric),
    ],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for RandomNumber {
    fn info(&self) -> &CommandInfo {
        &RANDOM_NUMBER_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let a = call.number(0)?;
        let b = call.number(1)?;
        if !a.is_finite() || !b.is_finite() {
            return Err(call.error("bounds must be finite numbers"));
        }
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        // Interpolating keeps the result finite even when `high - low` overflows
        let t: f64 = rand::thread_rng().gen();
        let n = low * (1.0 - t) + high * t;
        let n = if n < high { n.max(low) } else { low };
        call.result.set_number(n);
        Ok(true)
    }
}

pub struct Error;

static ERROR_INFO: CommandInfo = CommandInfo {
    name: "Error",
    alias: None,
    description: "Reports a script error and raises the global exception",
    documentation: "Aborts the running context and every caller up to the outermost run.",
    parameters: &[ParameterInfo::new("message", ParameterType::String)],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for Error {
    fn info(&self) -> &CommandInfo {
        &ERROR_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let message = call.string(0)?;
        let program = call.agent.program();
        tracing::error!(
            script = program.name(),
            line = call.line,
            "Script error: {}",
            message
        );

        let vm = call.agent.vm_mut();
        vm.log_console(format!(
            "Script Error [{}:{}] {}",
            program.name(),
            call.line,
            message
        ));
        vm.raise_global_exception();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::errors::VmError;
    use crate::interpreter::value::Value;
    use crate::interpreter::vm::Vm;

    fn run(body: &str) -> Result<Option<Value>, VmError> {
        let mut vm = Vm::default();
        let source = format!("scriptname Cmd\nvariable big = 1e308\nbegin\n{}\nend", body);
        let program = vm.compile(&source).unwrap();
        assert!(program.is_valid(), "{:?}", program.diagnostics());
        vm.run_program(&program, vec![])
    }

    fn number(body: &str) -> f64 {
        match run(body).unwrap() {
            Some(Value::Numeric(n)) => n,
            other => panic!("Expected a numeric result, got {:?}", other),
        }
    }

    #[test]
    fn test_random_number_stays_in_range() {
        for _ in 0..200 {
            let n = number("return RandomNumber(10, -5)");
            assert!((-5.0..10.0).contains(&n), "{}", n);
        }
        assert_eq!(number("return RandomNumber(3, 3)"), 3.0);
    }

    #[test]
    fn test_random_number_with_huge_span() {
        for _ in 0..50 {
            let n = number("return RandomNumber(-big, big)");
            assert!(n.is_finite());
            assert!((-1e308..1e308).contains(&n), "{}", n);
        }
    }

    #[test]
    fn test_random_number_rejects_infinite_bounds() {
        let error = run("return RandomNumber(0, big * 10)").unwrap_err();
        let text = error.to_string();
        assert!(text.contains("bounds must be finite"), "{}", text);
    }

    #[test]
    fn test_format_number_with_oversized_width() {
        let result = run("return FormatNumber(\"%99999999999999999999d\", 1, 0)")
            .unwrap()
            .unwrap();
        let text = result.string().unwrap();
        assert_eq!(text.len(), 79);
        assert!(text.ends_with('1'));
    }
}
