//! VM-wide global variables. Names are case-insensitive.

use std::collections::BTreeMap;

use crate::interpreter::value::Value;

#[derive(Debug, Clone)]
pub struct Global {
    /// Name as first declared.
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    entries: BTreeMap<String, Global>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|g| &g.value)
    }

    /// Declares or replaces a global. Returns the previous value.
    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(global) => Some(std::mem::replace(&mut global.value, value)),
            None => {
                self.entries.insert(
                    key,
                    Global {
                        name: name.to_string(),
                        value,
                    },
                );
                None
            }
        }
    }

    /// Assigns to an existing global only.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(global) => {
                global.value = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|g| g.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>> FromIterator<(K, Value)> for GlobalTable {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut table = GlobalTable::new();
        for (name, value) in iter {
            table.set(name.as_ref(), value);
        }
        table
    }
}
