//! Command table and the command invocation contract
//!
//! A command is a named native operation callable from scripts. Each command publishes a
//! [`CommandInfo`] (name, optional alias, typed parameters, result type) and an `execute`
//! handler. Lookup is case-insensitive on both name and alias.
//!
//! Before `execute` runs, [`invoke`] checks arity and parameter types and presets the result to
//! Numeric 0. When `execute` returns `Ok(true)` the result is checked against the declared
//! result type; `Ok(false)` skips that check.

pub mod array;
pub mod format;
pub mod general;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::interpreter::errors::{CommandError, RuntimeError};
use crate::interpreter::executor::ExecutionAgent;
use crate::interpreter::value::{ArrayHandle, DataType, Value};

/* ===================== Signatures ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterType {
    Numeric,
    Reference,
    String,
    Array,
    /// Accepts any value.
    Multi,
}

impl ParameterType {
    pub fn code(self) -> char {
        match self {
            ParameterType::Numeric => DataType::Numeric.code(),
            ParameterType::Reference => DataType::Reference.code(),
            ParameterType::String => DataType::String.code(),
            ParameterType::Array => DataType::Array.code(),
            ParameterType::Multi => '!',
        }
    }

    /// Whether `value` satisfies this type. Numeric accepts implicitly castable values.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParameterType::Numeric => value.is_number(true),
            ParameterType::Reference => value.is_reference(),
            ParameterType::String => value.is_string(),
            ParameterType::Array => value.is_array(),
            ParameterType::Multi => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub kind: ParameterType,
}

impl ParameterInfo {
    pub const fn new(name: &'static str, kind: ParameterType) -> Self {
        Self { name, kind }
    }
}

/// Argument count a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// The handler validates the argument list itself.
    Variadic,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandInfo {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub description: &'static str,
    pub documentation: &'static str,
    pub parameters: &'static [ParameterInfo],
    pub result: ParameterType,
    pub variadic: bool,
}

impl CommandInfo {
    pub fn arity(&self) -> Arity {
        if self.variadic {
            Arity::Variadic
        } else {
            Arity::Fixed(self.parameters.len())
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.alias.is_some_and(|a| a.eq_ignore_ascii_case(name))
    }

    /// Compact signature, e.g. `FormatNumber(s, n, n) -> s`.
    pub fn signature(&self) -> String {
        let mut params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| p.kind.code().to_string())
            .collect();
        if self.variadic {
            params.push("...".to_string());
        }
        format!(
            "{}({}) -> {}",
            self.name,
            params.join(", "),
            self.result.code()
        )
    }
}

/* ===================== Commands ===================== */

pub trait Command {
    fn info(&self) -> &CommandInfo;

    /// Runs the command. `Ok(false)` skips result type validation.
    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError>;
}

/// Arguments, result slot and execution access for one invocation
pub struct CommandCall<'c, 'a> {
    pub arguments: &'c [Value],
    pub result: &'c mut Value,
    pub agent: &'c mut ExecutionAgent<'a>,
    pub line: u32,
    name: &'static str,
}

impl<'c, 'a> CommandCall<'c, 'a> {
    pub fn error(&self, message: impl fmt::Display) -> RuntimeError {
        RuntimeError::new(self.line, format!("{}: {}", self.name, message))
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    pub fn argument(&self, index: usize) -> Result<&'c Value, RuntimeError> {
        let arguments: &'c [Value] = self.arguments;
        arguments
            .get(index)
            .ok_or_else(|| self.error(format!("missing argument {}", index + 1)))
    }

    pub fn number(&self, index: usize) -> Result<f64, RuntimeError> {
        self.argument(index)?
            .number()
            .ok_or_else(|| self.error(format!("argument {} must be numeric", index + 1)))
    }

    pub fn string(&self, index: usize) -> Result<&'c str, RuntimeError> {
        self.argument(index)?
            .string()
            .ok_or_else(|| self.error(format!("argument {} must be a string", index + 1)))
    }

    pub fn array(&self, index: usize) -> Result<ArrayHandle, RuntimeError> {
        self.argument(index)?
            .array()
            .cloned()
            .ok_or_else(|| self.error(format!("argument {} must be an array", index + 1)))
    }

    /// Non-negative integral index argument.
    pub fn index(&self, index: usize) -> Result<usize, RuntimeError> {
        let n = self.number(index)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(self.error(format!("invalid index {}", n)));
        }
        Ok(n as usize)
    }
}

/// Runs `command` under the invocation contract.
pub fn invoke(
    command: &dyn Command,
    arguments: Vec<Value>,
    agent: &mut ExecutionAgent<'_>,
    line: u32,
) -> Result<Value, RuntimeError> {
    let info = command.info();

    if let Arity::Fixed(expected) = info.arity() {
        if arguments.len() != expected {
            return Err(RuntimeError::new(
                line,
                format!(
                    "{} expects {} argument(s), {} supplied",
                    info.name,
                    expected,
                    arguments.len()
                ),
            ));
        }
        for (param, arg) in info.parameters.iter().zip(&arguments) {
            if !param.kind.accepts(arg) {
                return Err(RuntimeError::new(
                    line,
                    format!(
                        "{}: parameter '{}' expects {}, found {}",
                        info.name,
                        param.name,
                        param.kind.code(),
                        arg.data_type()
                    ),
                ));
            }
        }
    }

    let mut result = Value::Numeric(0.0);
    let validate = {
        let mut call = CommandCall {
            arguments: &arguments,
            result: &mut result,
            agent,
            line,
            name: info.name,
        };
        command.execute(&mut call)?
    };

    if validate && !info.result.accepts(&result) {
        return Err(RuntimeError::new(
            line,
            format!(
                "{} returned {} where {} was declared",
                info.name,
                result.data_type(),
                info.result.code()
            ),
        ));
    }
    Ok(result)
}

/* ===================== Table ===================== */

/// Registered commands, keyed by lowercased name and alias
#[derive(Default, Clone)]
pub struct CommandTable {
    commands: Vec<Rc<dyn Command>>,
    index: HashMap<String, Rc<dyn Command>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in command.
    pub fn standard() -> Self {
        let mut table = CommandTable::new();
        let builtins = general::commands().into_iter().chain(array::commands());
        for command in builtins {
            if let Err(e) = table.register(command) {
                tracing::error!("Failed to register built-in command: {}", e);
            }
        }
        table
    }

    pub fn register(&mut self, command: Rc<dyn Command>) -> Result<(), CommandError> {
        let info = command.info();
        let keys: Vec<String> = std::iter::once(info.name)
            .chain(info.alias)
            .map(str::to_ascii_lowercase)
            .collect();

        if let Some(taken) = keys.iter().find(|k| self.index.contains_key(*k)) {
            return Err(CommandError::Duplicate(taken.clone()));
        }
        for key in keys {
            self.index.insert(key, Rc::clone(&command));
        }
        tracing::debug!(command = info.name, "Registered command");
        self.commands.push(command);
        Ok(())
    }

    /// Removes the command registered under `name` (or alias).
    pub fn unregister(&mut self, name: &str) -> Result<Rc<dyn Command>, CommandError> {
        let command = self
            .lookup(name)
            .ok_or_else(|| CommandError::NotRegistered(name.to_string()))?;
        self.commands.retain(|c| !same_command(c, &command));
        self.index.retain(|_, c| !same_command(c, &command));
        Ok(command)
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<dyn Command>> {
        self.index.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Command>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.commands.iter().map(|c| c.info().name))
            .finish()
    }
}

fn same_command(a: &Rc<dyn Command>, b: &Rc<dyn Command>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    static ECHO_INFO: CommandInfo = CommandInfo {
        name: "Echo",
        alias: Some("ec"),
        description: "Returns its argument",
        documentation: "",
        parameters: &[ParameterInfo::new("value", ParameterType::Multi)],
        result: ParameterType::Multi,
        variadic: false,
    };

    impl Command for Echo {
        fn info(&self) -> &CommandInfo {
            &ECHO_INFO
        }

        fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
            *call.result = call.argument(0)?.clone();
            Ok(true)
        }
    }

    #[test]
    fn test_lookup_by_name_and_alias_is_case_insensitive() {
        let mut table = CommandTable::new();
        table.register(Rc::new(Echo)).unwrap();
        assert!(table.lookup("ECHO").is_some());
        assert!(table.lookup("Ec").is_some());
        assert!(table.lookup("other").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut table = CommandTable::new();
        table.register(Rc::new(Echo)).unwrap();
        assert_eq!(
            table.register(Rc::new(Echo)),
            Err(CommandError::Duplicate("echo".to_string()))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unregister_removes_alias_too() {
        let mut table = CommandTable::new();
        table.register(Rc::new(Echo)).unwrap();
        table.unregister("ec").unwrap();
        assert!(!table.contains("echo"));
        assert!(!table.contains("ec"));
        assert!(table.is_empty());
        assert!(matches!(
            table.unregister("echo"),
            Err(CommandError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_signature_rendering() {
        assert_eq!(ECHO_INFO.signature(), "Echo(!) -> !");
        let table = CommandTable::standard();
        let format = table.lookup("formatnumber").unwrap();
        assert_eq!(format.info().signature(), "FormatNumber(s, n, n) -> s");
        let create = table.lookup("arraycreate").unwrap();
        assert_eq!(create.info().signature(), "ArrayCreate(...) -> a");
    }

    #[test]
    fn test_parameter_type_acceptance() {
        assert!(ParameterType::Numeric.accepts(&Value::from("12")));
        assert!(ParameterType::Numeric.accepts(&Value::reference(3)));
        assert!(!ParameterType::Numeric.accepts(&Value::from("abc")));
        assert!(ParameterType::Multi.accepts(&Value::Invalid));
        assert!(!ParameterType::String.accepts(&Value::from(1.0)));
    }
}
