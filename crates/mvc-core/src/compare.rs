//! Equality predicates for schema `compare` rules.
//!
//! A compare rule reports whether two resolved attribute values should be
//! treated as equal; an attribute is considered changed when its rule returns
//! `false`. `None` is an undefined value.

use std::rc::Rc;

use serde_json::Value;

pub type CompareFn = Rc<dyn Fn(Option<&Value>, Option<&Value>) -> bool>;

/// Deep structural equality. Object key order is ignored.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use mvc_core::compare::recursive;
///
/// assert!(recursive(Some(&json!({"a": [1, 2]})), Some(&json!({"a": [1, 2]}))));
/// assert!(!recursive(Some(&json!([1, 2])), Some(&json!([2, 1]))));
/// assert!(recursive(None, None));
/// ```
pub fn recursive(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => deep_equal(a, b),
        _ => false,
    }
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => false,
    }
}

/// Compares the textual rendering of both values: strings by content,
/// everything else by its JSON text. Two undefined values are equal.
///
/// ```
/// use serde_json::json;
/// use mvc_core::compare::string;
///
/// assert!(string(Some(&json!("1")), Some(&json!(1))));
/// assert!(!string(Some(&json!("1")), None));
/// ```
pub fn string(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => render(a) == render(b),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Compares the serialized JSON text of both values, so object key order
/// matters.
pub fn serialize(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.to_string() == b.to_string(),
        _ => false,
    }
}
