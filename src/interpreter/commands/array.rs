//! Array commands. Arrays are shared, so every command mutates the caller's array in place.

use std::rc::Rc;

use super::{Command, CommandCall, CommandInfo, ParameterInfo, ParameterType};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::value::ArrayHandle;

pub fn commands() -> Vec<Rc<dyn Command>> {
    vec![
        Rc::new(ArrayCreate),
        Rc::new(ArrayInsert),
        Rc::new(ArrayErase),
        Rc::new(ArrayClear),
        Rc::new(ArraySize),
        Rc::new(ArrayAt),
    ]
}

pub struct ArrayCreate;

static ARRAY_CREATE_INFO: CommandInfo = CommandInfo {
    name: "ArrayCreate",
    alias: None,
    description: "Creates an array from its arguments",
    documentation: "ArrayCreate([values...])",
    parameters: &[],
    result: ParameterType::Array,
    variadic: true,
};

impl Command for ArrayCreate {
    fn info(&self) -> &CommandInfo {
        &ARRAY_CREATE_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        call.result
            .set_array(ArrayHandle::from_values(call.arguments.to_vec()));
        Ok(true)
    }
}

pub struct ArrayInsert;

static ARRAY_INSERT_INFO: CommandInfo = CommandInfo {
    name: "ArrayInsert",
    alias: None,
    description: "Inserts a value, appending when no index is given",
    documentation: "ArrayInsert(array, value[, index])",
    parameters: &[
        ParameterInfo::new("array", ParameterType::Array),
        ParameterInfo::new("value", ParameterType::Multi),
        ParameterInfo::new("index", ParameterType::Numeric),
    ],
    result: ParameterType::Numeric,
    variadic: true,
};

impl Command for ArrayInsert {
    fn info(&self) -> &CommandInfo {
        &ARRAY_INSERT_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        if !(2..=3).contains(&call.argument_count()) {
            return Err(call.error("expects 2 or 3 arguments"));
        }

        let array = call.array(0)?;
        let value = call.argument(1)?.clone();
        let index = match call.argument_count() {
            3 => Some(call.index(2)?),
            _ => None,
        };

        if !array.insert(value, index) {
            return Err(call.error(format!(
                "index {} out of range (size {})",
                index.unwrap_or_default(),
                array.size()
            )));
        }
        Ok(true)
    }
}

pub struct ArrayErase;

static ARRAY_ERASE_INFO: CommandInfo = CommandInfo {
    name: "ArrayErase",
    alias: None,
    description: "Removes the element at an index",
    documentation: "",
    parameters: &[
        ParameterInfo::new("array", ParameterType::Array),
        ParameterInfo::new("index", ParameterType::Numeric),
    ],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for ArrayErase {
    fn info(&self) -> &CommandInfo {
        &ARRAY_ERASE_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let array = call.array(0)?;
        let index = call.index(1)?;
        if !array.erase(index) {
            return Err(call.error(format!(
                "index {} out of range (size {})",
                index,
                array.size()
            )));
        }
        Ok(true)
    }
}

pub struct ArrayClear;

static ARRAY_CLEAR_INFO: CommandInfo = CommandInfo {
    name: "ArrayClear",
    alias: None,
    description: "Removes every element",
    documentation: "",
    parameters: &[ParameterInfo::new("array", ParameterType::Array)],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for ArrayClear {
    fn info(&self) -> &CommandInfo {
        &ARRAY_CLEAR_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        call.array(0)?.clear();
        Ok(true)
    }
}

pub struct ArraySize;

static ARRAY_SIZE_INFO: CommandInfo = CommandInfo {
    name: "ArraySize",
    alias: None,
    description: "Number of elements",
    documentation: "",
    parameters: &[ParameterInfo::new("array", ParameterType::Array)],
    result: ParameterType::Numeric,
    variadic: false,
};

impl Command for ArraySize {
    fn info(&self) -> &CommandInfo {
        &ARRAY_SIZE_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let size = call.array(0)?.size();
        call.result.set_number(size as f64);
        Ok(true)
    }
}

pub struct ArrayAt;

static ARRAY_AT_INFO: CommandInfo = CommandInfo {
    name: "ArrayAt",
    alias: None,
    description: "Element at an index",
    documentation: "",
    parameters: &[
        ParameterInfo::new("array", ParameterType::Array),
        ParameterInfo::new("index", ParameterType::Numeric),
    ],
    result: ParameterType::Multi,
    variadic: false,
};

impl Command for ArrayAt {
    fn info(&self) -> &CommandInfo {
        &ARRAY_AT_INFO
    }

    fn execute(&self, call: &mut CommandCall<'_, '_>) -> Result<bool, RuntimeError> {
        let array = call.array(0)?;
        let index = call.index(1)?;
        match array.at(index) {
            Some(value) => {
                *call.result = value;
                Ok(false)
            }
            None => Err(call.error(format!(
                "index {} out of range (size {})",
                index,
                array.size()
            ))),
        }
    }
}
