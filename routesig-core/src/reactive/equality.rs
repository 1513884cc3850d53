//! Structural Equality
//!
//! Deep comparison used to suppress notifications when a resolution
//! produces a value equal to the one a cell already holds.
//!
//! `serde_json::Value` already implements `PartialEq`, but it treats `1` and
//! `1.0` as different numbers. Cells are fed from JSON decoders that do not
//! preserve that distinction, so numbers are compared by value here.

use serde_json::{Number, Value};

/// Compare two JSON values structurally.
///
/// Rules, in order:
///
/// 1. Values of different kinds are unequal.
/// 2. Scalars compare by value. Numbers compare numerically.
/// 3. Arrays are equal when they have the same length and equal elements
///    at every index.
/// 4. Objects are equal when they have the same number of keys and every
///    key of `a` is present in `b` with an equal value.
///
/// The comparison recurses without depth tracking, so extremely deep
/// documents are bounded only by the stack.
pub fn is_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| is_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| is_equal(x, y)))
        }
        _ => false,
    }
}

/// Compare optional values, where `None` is the unset state of a cell.
pub fn is_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => is_equal(a, b),
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    // Integers compare exactly so large ids do not collapse through f64.
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert!(is_equal(&json!(null), &json!(null)));
        assert!(is_equal(&json!(true), &json!(true)));
        assert!(!is_equal(&json!(true), &json!(false)));
        assert!(is_equal(&json!("a"), &json!("a")));
        assert!(!is_equal(&json!("a"), &json!("b")));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(is_equal(&json!(1), &json!(1.0)));
        assert!(is_equal(&json!(-3), &json!(-3)));
        assert!(!is_equal(&json!(1), &json!(2)));
        assert!(is_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!is_equal(&json!(u64::MAX), &json!(u64::MAX - 1)));
    }

    #[test]
    fn differing_kinds_are_unequal() {
        assert!(!is_equal(&json!(1), &json!("1")));
        assert!(!is_equal(&json!(null), &json!({})));
        assert!(!is_equal(&json!([]), &json!({})));
        assert!(!is_equal(&json!(0), &json!(false)));
    }

    #[test]
    fn arrays() {
        assert!(is_equal(&json!([1, [2, 3]]), &json!([1, [2, 3]])));
        assert!(!is_equal(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!is_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn objects() {
        let a = json!({ "id": 1, "nested": { "values": [1, 2, { "x": null }] } });
        let b = json!({ "nested": { "values": [1, 2, { "x": null }] }, "id": 1 });
        assert!(is_equal(&a, &b));

        assert!(!is_equal(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
        assert!(!is_equal(&json!({ "a": 1 }), &json!({ "b": 1 })));
        assert!(!is_equal(&json!({ "a": { "b": 1 } }), &json!({ "a": { "b": 2 } })));
    }

    #[test]
    fn optional_values() {
        assert!(is_equal_opt(None, None));
        assert!(!is_equal_opt(None, Some(&json!(null))));
        assert!(is_equal_opt(Some(&json!(5)), Some(&json!(5))));
    }
}
