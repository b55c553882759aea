//! Semantic equivalence of JSON configuration documents.
//!
//! Director configuration is stored and compared as text. Two revisions that
//! only differ in whitespace, key order or number formatting describe the
//! same configuration, and must not be reported as a change.

use serde_json::{Number, Value};

/// Returns true if both texts parse as JSON and describe the same value.
///
/// Formatting is ignored: object key order and whitespace do not matter, and
/// numbers compare by value (`1` equals `1.0`). Array order does matter.
/// Text that fails to parse is never equivalent to anything, including
/// itself.
///
/// # Examples
///
/// ```
/// use opsman_director::equivalence::json_equivalent;
///
/// assert!(json_equivalent(r#"{"a":1,"b":2}"#, "{\n  \"b\": 2,\n  \"a\": 1\n}"));
/// assert!(!json_equivalent("[1,2]", "[2,1]"));
/// assert!(!json_equivalent("", ""));
/// ```
#[must_use]
pub fn json_equivalent(old: &str, new: &str) -> bool {
    let Ok(old_value) = serde_json::from_str::<Value>(old) else {
        return false;
    };
    let Ok(new_value) = serde_json::from_str::<Value>(new) else {
        return false;
    };

    values_equivalent(&old_value, &new_value)
}

/// Deep equality over parsed JSON values, comparing numbers by value.
#[must_use]
pub fn values_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equivalent(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equivalent(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equivalent(x, y)))
        }
        _ => false,
    }
}

/// Integers compare exactly; anything involving a float compares as `f64`.
#[allow(clippy::float_cmp)]
fn numbers_equivalent(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
