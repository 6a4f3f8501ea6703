//! Runtime values of the restricted interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::SandboxError;

/// Longest array the sandbox will build.
pub const MAX_ARRAY_LENGTH: usize = 1 << 16;

/// Longest string (in bytes) the sandbox will build.
pub const MAX_STRING_LENGTH: usize = 1 << 20;

/// A value produced while evaluating a script block.
///
/// Arrays and objects are shared by reference, like their JavaScript
/// counterparts. Functions carry their source text, which is exactly what
/// the entry snippet needs.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    /// Insertion-ordered properties.
    Object(Rc<RefCell<Vec<(String, Value)>>>),
    Function(Rc<ScriptFunction>),
}

/// A function defined by the script block.
#[derive(Debug)]
pub struct ScriptFunction {
    source: String,
    /// Start offset of the defining node; identifies its body.
    pub(crate) id: u32,
}

impl ScriptFunction {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: Vec<(String, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(props)))
    }

    pub(crate) fn function(source: String, id: u32) -> Self {
        Value::Function(Rc::new(ScriptFunction { source, id }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            other => other.type_name(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether the value is a primitive other than a string.
    pub(crate) fn is_numeric_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
        )
    }

    /// Read a named property; missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(props) => props
                .borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Undefined),
            Value::Array(items) if key == "length" => Value::Number(items.borrow().len() as f64),
            Value::Array(items) => array_index(key)
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined),
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            Value::String(s) => array_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(c.to_string()))
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// Write a property.
    ///
    /// Writes to other primitives are ignored, as in sloppy-mode JavaScript.
    /// Array writes may extend the array up to [`MAX_ARRAY_LENGTH`].
    pub fn set(&self, key: &str, value: Value) -> Result<(), SandboxError> {
        match self {
            Value::Object(props) => {
                set_property(&mut props.borrow_mut(), key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let length = value.to_number();
                    if length < 0.0 || length.fract() != 0.0 {
                        return Err(SandboxError::Range("Invalid array length".to_string()));
                    }
                    let length = checked_array_length(length)?;
                    items.borrow_mut().resize(length, Value::Undefined);
                    return Ok(());
                }
                let Some(index) = array_index(key) else {
                    return Err(SandboxError::Type(format!(
                        "cannot set property '{}' of array",
                        key
                    )));
                };
                if index >= MAX_ARRAY_LENGTH {
                    return Err(SandboxError::Range(format!(
                        "array index {} exceeds the limit of {}",
                        key, MAX_ARRAY_LENGTH
                    )));
                }
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                Ok(())
            }
            Value::Undefined | Value::Null => Err(SandboxError::Type(format!(
                "cannot set properties of {} (setting '{}')",
                self.type_name(),
                key
            ))),
            _ => Ok(()),
        }
    }

    /// Own enumerable keys, as `for...in` and `Object.keys` see them.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(props) => props.borrow().iter().map(|(k, _)| k.clone()).collect(),
            Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// `ToNumber` for the supported values.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(_) => parse_number(&self.to_js_string()),
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// `String(value)` for the supported values.
    ///
    /// Cyclic arrays print their repeated members as empty strings. Output
    /// stops growing shortly past [`MAX_STRING_LENGTH`]; callers that build
    /// strings check the limit themselves.
    pub fn to_js_string(&self) -> String {
        let mut out = String::new();
        self.write_js(&mut out, &mut Vec::new());
        out
    }

    fn write_js(&self, out: &mut String, seen: &mut Vec<*const RefCell<Vec<Value>>>) {
        match self {
            Value::Undefined => out.push_str("undefined"),
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::String(s) => out.push_str(s),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items);
                if seen.contains(&ptr) {
                    return;
                }
                seen.push(ptr);
                for (i, item) in items.borrow().iter().enumerate() {
                    if out.len() > MAX_STRING_LENGTH {
                        break;
                    }
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_js(out, seen);
                    }
                }
                seen.pop();
            }
            Value::Object(_) => out.push_str("[object Object]"),
            Value::Function(f) => out.push_str(&f.source),
        }
    }

    /// `===`.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) if a.is_numeric_primitive() && b.is_numeric_primitive() => {
                a.to_number() == b.to_number()
            }
            (Value::String(_), b) if b.is_numeric_primitive() => {
                self.to_number() == b.to_number()
            }
            (a, Value::String(_)) if a.is_numeric_primitive() => {
                a.to_number() == other.to_number()
            }
            (a @ (Value::Array(_) | Value::Object(_) | Value::Function(_)), b)
            | (b, a @ (Value::Array(_) | Value::Object(_) | Value::Function(_)))
                if !matches!(b, Value::Array(_) | Value::Object(_) | Value::Function(_)) =>
            {
                Value::string(a.to_js_string()).loose_equals(b)
            }
            (a, b) => a.strict_equals(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

/// Canonical array index for a property key, if it is one.
fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// Convert an integral array length, enforcing [`MAX_ARRAY_LENGTH`].
pub(crate) fn checked_array_length(length: f64) -> Result<usize, SandboxError> {
    if length > MAX_ARRAY_LENGTH as f64 {
        return Err(SandboxError::Range(format!(
            "array length {} exceeds the limit of {}",
            format_number(length),
            MAX_ARRAY_LENGTH
        )));
    }
    Ok(length as usize)
}

fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    match s {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) =>
        {
            s.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// `Number.prototype.toString()` for base 10.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    format!("{}", n)
}

/// Property key for computed member access.
pub(crate) fn property_key(value: &Value) -> String {
    value.to_js_string()
}

pub(crate) fn set_property(props: &mut Vec<(String, Value)>, key: String, value: Value) {
    match props.iter_mut().find(|(k, _)| *k == key) {
        Some((_, slot)) => *slot = value,
        None => props.push((key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(3.0).to_js_string(), "3");
        assert_eq!(Value::Number(1.5).to_js_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_js_string(), "0");
        assert_eq!(Value::Number(1e20).to_js_string(), "100000000000000000000");
        assert_eq!(Value::Number(1e21).to_js_string(), "1e+21");
        assert_eq!(Value::Number(1.5e-7).to_js_string(), "1.5e-7");
    }

    #[test]
    fn test_set_creates_property() {
        let obj = Value::object(vec![]);
        obj.set("include", Value::array(vec![])).unwrap();
        assert!(matches!(obj.get("include"), Value::Array(ref items) if items.borrow().is_empty()));
        assert!(matches!(Value::Null.set("x", Value::Null), Err(SandboxError::Type(_))));
    }

    #[test]
    fn test_array_length() {
        let arr = Value::array(vec![Value::Null, Value::Bool(true)]);
        assert_eq!(arr.get("length").to_number(), 2.0);
        assert!(arr.get("1").strict_equals(&Value::Bool(true)));
    }

    #[test]
    fn test_far_array_index_is_a_range_error() {
        let arr = Value::array(vec![]);
        let far = property_key(&Value::Number(1e9));
        assert!(matches!(arr.set(&far, Value::Null), Err(SandboxError::Range(_))));
        let huge = property_key(&Value::Number(1e20));
        assert!(arr.set(&huge, Value::Null).is_err());
        assert_eq!(arr.get("length").to_number(), 0.0);
    }

    #[test]
    fn test_cyclic_array_prints() {
        let arr = Value::array(vec![Value::Number(1.0)]);
        if let Value::Array(items) = &arr {
            items.borrow_mut().push(arr.clone());
        }
        assert_eq!(arr.to_js_string(), "1,");
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::string("2").loose_equals(&Value::Number(2.0)));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        let arr = Value::array(vec![]);
        assert!(arr.strict_equals(&arr.clone()));
        assert!(!arr.strict_equals(&Value::array(vec![])));
    }
}
