//! Runtime value store
//!
//! Every piece of data a script touches is a [`Value`]. Scalars (numbers, references and
//! strings) are copied on assignment. Arrays are shared: cloning a `Value::Array` clones the
//! [`ArrayHandle`], so every holder observes mutations made through any other holder.
//! Replacing a holder's value swaps the handle it holds and never touches the shared contents.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Nesting depth after which arrays are rendered as `[...]`.
const MAX_RENDER_DEPTH: usize = 8;

/* ===================== Data Types ===================== */

/// Variant tag of a [`Value`], also used in command signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Invalid,
    Numeric,
    Reference,
    String,
    Array,
}

impl DataType {
    /// Single character code used in signatures and diagnostics.
    pub fn code(self) -> char {
        match self {
            DataType::Invalid => '?',
            DataType::Numeric => 'n',
            DataType::Reference => 'r',
            DataType::String => 's',
            DataType::Array => 'a',
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Invalid => "invalid",
            DataType::Numeric => "numeric",
            DataType::Reference => "reference",
            DataType::String => "string",
            DataType::Array => "array",
        };
        f.write_str(name)
    }
}

/* ===================== Values ===================== */

/// Tagged runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Invalid,
    Numeric(f64),
    /// Opaque handle into the host's object space. Never interpreted here.
    Reference(u32),
    String(String),
    Array(ArrayHandle),
}

impl Value {
    pub fn reference(handle: u32) -> Self {
        Value::Reference(handle)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Invalid => DataType::Invalid,
            Value::Numeric(_) => DataType::Numeric,
            Value::Reference(_) => DataType::Reference,
            Value::String(_) => DataType::String,
            Value::Array(_) => DataType::Array,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Value::Invalid)
    }

    /// Whether this value can be read as `target` without an exact variant match.
    ///
    /// Only numeric targets have implicit casts: references cast to their handle value and
    /// strings cast when their trimmed text parses as a finite decimal number.
    pub fn has_implicit_cast(&self, target: DataType) -> bool {
        if target != DataType::Numeric {
            return false;
        }

        match self {
            Value::Numeric(_) | Value::Reference(_) => true,
            Value::String(s) => parse_numeric(s).is_some(),
            Value::Invalid | Value::Array(_) => false,
        }
    }

    pub fn is_number(&self, allow_casting: bool) -> bool {
        matches!(self, Value::Numeric(_))
            || (allow_casting && self.has_implicit_cast(DataType::Numeric))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /* ---------- accessors ---------- */

    /// Numeric reading of this value, applying the implicit cast rules.
    pub fn number(&self) -> Option<f64> {
        match self {
            Value::Numeric(n) => Some(*n),
            Value::Reference(r) => Some(f64::from(*r)),
            Value::String(s) => parse_numeric(s),
            Value::Invalid | Value::Array(_) => None,
        }
    }

    pub fn form_id(&self) -> Option<u32> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn array(&self) -> Option<&ArrayHandle> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Condition reading: numerically castable values are true when non-zero.
    pub fn truth(&self) -> Option<bool> {
        self.number().map(|n| n != 0.0)
    }

    /* ---------- mutators ---------- */

    pub fn set_number(&mut self, number: f64) {
        *self = Value::Numeric(number);
    }

    pub fn set_form_id(&mut self, handle: u32) {
        *self = Value::Reference(handle);
    }

    pub fn set_string(&mut self, text: impl Into<String>) {
        *self = Value::String(text.into());
    }

    /// Points this holder at `array`. The previously held array (if any) is left untouched.
    pub fn set_array(&mut self, array: ArrayHandle) {
        *self = Value::Array(array);
    }

    /// Assignment: scalars are copied, arrays are shared.
    pub fn assign(&mut self, rhs: &Value) {
        *self = rhs.clone();
    }

    /* ---------- rendering ---------- */

    /// JSON rendering for tooling output. Deeply nested arrays are elided.
    pub fn to_json(&self) -> JsonValue {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> JsonValue {
        match self {
            Value::Invalid => JsonValue::Null,
            Value::Numeric(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Reference(r) => JsonValue::String(format!("#{:08X}", r)),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(_) if depth >= MAX_RENDER_DEPTH => JsonValue::String("[...]".to_string()),
            Value::Array(a) => JsonValue::Array(
                a.elements()
                    .iter()
                    .map(|v| v.to_json_at(depth + 1))
                    .collect(),
            ),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Value::Invalid => f.write_str("<invalid>"),
            Value::Numeric(n) => write!(f, "{}", format_number(*n)),
            Value::Reference(r) => write!(f, "#{:08X}", r),
            Value::String(s) => f.write_str(s),
            Value::Array(_) if depth >= MAX_RENDER_DEPTH => f.write_str("[...]"),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, element) in a.elements().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    element.render(f, depth + 1)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl PartialEq for Value {
    /// Same-variant comparison, except that a numeric operand compares numerically against
    /// any value with an implicit numeric cast.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Invalid, Value::Invalid) => true,
            (Value::Numeric(a), Value::Numeric(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Numeric(a), rhs) => rhs.number().is_some_and(|b| *a == b),
            (lhs, Value::Numeric(b)) => lhs.number().is_some_and(|a| a == *b),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Numeric(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Numeric(if b { 1.0 } else { 0.0 })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ArrayHandle> for Value {
    fn from(a: ArrayHandle) -> Self {
        Value::Array(a)
    }
}

/// Strict decimal parse used by the String → Numeric cast.
fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integral numbers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/* ===================== Arrays ===================== */

/// Reference-counted handle to a shared, ordered sequence of values.
///
/// Cloning the handle shares the sequence. All index operations are bounds-checked and
/// report failure instead of panicking.
///
/// Sharing is plain reference counting: an array that contains itself, directly or through
/// nested arrays, is never freed unless a script clears or erases the inner handle first.
#[derive(Clone, Default)]
pub struct ArrayHandle(Rc<RefCell<Vec<Value>>>);

impl ArrayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ArrayHandle(Rc::new(RefCell::new(Vec::with_capacity(capacity))))
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        ArrayHandle(Rc::new(RefCell::new(values)))
    }

    /// Inserts at `index`, or appends when `index` is `None`. `index == size()` appends.
    pub fn insert(&self, value: Value, index: Option<usize>) -> bool {
        let mut elements = self.0.borrow_mut();
        match index {
            None => {
                elements.push(value);
                true
            }
            Some(i) if i <= elements.len() => {
                elements.insert(i, value);
                true
            }
            Some(_) => false,
        }
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn erase(&self, index: usize) -> bool {
        let mut elements = self.0.borrow_mut();
        if index < elements.len() {
            elements.remove(index);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Element at `index`. Arrays nested inside are returned as shared handles.
    pub fn at(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Replaces the element at `index`.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of the current elements.
    pub fn elements(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Whether both handles share the same sequence.
    pub fn ptr_eq(&self, other: &ArrayHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of holders currently sharing this sequence.
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for ArrayHandle {
    // Arrays may contain themselves, so only the length is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("len", &self.size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_assignment_shares_contents() {
        let x = Value::Array(ArrayHandle::from_values(vec![Value::from(1.0)]));
        let mut y = Value::Invalid;
        y.assign(&x);

        x.array().unwrap().set(0, Value::from(5.0));

        assert_eq!(y.array().unwrap().at(0), Some(Value::Numeric(5.0)));
        assert_eq!(x.array().unwrap().holders(), 2);
    }

    #[test]
    fn test_array_replacement_detaches_holder() {
        let x = Value::Array(ArrayHandle::from_values(vec![Value::from(1.0)]));
        let mut y = x.clone();

        y.set_array(ArrayHandle::new());
        x.array().unwrap().push(Value::from(2.0));

        assert_eq!(x.array().unwrap().size(), 2);
        assert_eq!(y.array().unwrap().size(), 0);
    }

    #[test]
    fn test_array_bounds_are_checked() {
        let array = ArrayHandle::new();
        assert!(array.insert(Value::from(1.0), None));
        assert!(array.insert(Value::from(0.0), Some(0)));
        assert!(array.insert(Value::from(2.0), Some(2)));
        assert!(!array.insert(Value::from(9.0), Some(7)));

        assert_eq!(array.at(3), None);
        assert!(!array.erase(3));
        assert!(array.erase(0));
        assert_eq!(array.at(0), Some(Value::Numeric(1.0)));

        array.clear();
        assert!(array.is_empty());
    }

    #[test]
    fn test_nested_arrays_are_shared_handles() {
        let inner = ArrayHandle::from_values(vec![Value::from("a")]);
        let outer = ArrayHandle::from_values(vec![Value::Array(inner.clone())]);

        let fetched = outer.at(0).unwrap();
        fetched.array().unwrap().push(Value::from("b"));

        assert_eq!(inner.size(), 2);
    }

    #[test]
    fn test_self_containing_array_holds_itself_until_cleared() {
        let array = ArrayHandle::new();
        array.push(Value::from(array.clone()));
        assert_eq!(array.holders(), 2);

        let inner = ArrayHandle::from_values(vec![Value::from(array.clone())]);
        array.push(Value::from(inner.clone()));
        assert_eq!(array.holders(), 3);

        array.clear();
        assert_eq!(array.holders(), 2);
        assert_eq!(inner.holders(), 1);
        drop(inner);
        assert_eq!(array.holders(), 1);
    }

    #[test]
    fn test_only_numeric_targets_have_implicit_casts() {
        assert!(Value::reference(0x14).has_implicit_cast(DataType::Numeric));
        assert!(Value::from(" 3.5 ").has_implicit_cast(DataType::Numeric));
        assert!(!Value::from("3x").has_implicit_cast(DataType::Numeric));
        assert!(!Value::from("inf").has_implicit_cast(DataType::Numeric));
        assert!(!Value::from(1.0).has_implicit_cast(DataType::String));
        assert!(!Value::from(1.0).has_implicit_cast(DataType::Reference));
        assert!(!Value::Array(ArrayHandle::new()).is_number(true));
    }

    #[test]
    fn test_accessors_require_exact_variant() {
        assert_eq!(Value::from("12").number(), Some(12.0));
        assert_eq!(Value::reference(7).number(), Some(7.0));
        assert_eq!(Value::from(7.0).form_id(), None);
        assert_eq!(Value::from(7.0).string(), None);
        assert!(Value::from("x").array().is_none());
        assert!(!Value::from("12").is_number(false));
    }

    #[test]
    fn test_equality_rules() {
        assert_eq!(Value::from(5.0), Value::reference(5));
        assert_eq!(Value::from("5"), Value::from(5.0));
        assert_ne!(Value::from("5"), Value::reference(5));
        assert_ne!(Value::from("abc"), Value::from(0.0));

        let a = ArrayHandle::new();
        assert_eq!(Value::Array(a.clone()), Value::Array(a));
        assert_ne!(Value::Array(ArrayHandle::new()), Value::Array(ArrayHandle::new()));
    }

    #[test]
    fn test_display() {
        let array = ArrayHandle::from_values(vec![
            Value::from(1.0),
            Value::from(2.5),
            Value::from("x"),
            Value::reference(0xFF),
        ]);
        assert_eq!(Value::Array(array).to_string(), "[1, 2.5, x, #000000FF]");
    }

    #[test]
    fn test_self_containing_array_renders() {
        let array = ArrayHandle::new();
        array.push(Value::Array(array.clone()));
        let rendered = Value::Array(array.clone()).to_string();
        assert!(rendered.contains("[...]"));
        array.clear();
    }
}
