//! Term normalization
//!
//! Constants are brought into canonical form before they are stored, so
//! that structurally equal values hash and compare equal. The same layer
//! decides whether two constants may legally be asserted equal.

use crate::datalog::types::Value;

/// Canonical form of a double: one zero, one NaN
pub fn canonical_double(d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else if d.is_nan() {
        f64::NAN
    } else {
        d
    }
}

/// Bit pattern of the canonical double, used for hashing and equality
pub fn double_bits(d: f64) -> u64 {
    canonical_double(d).to_bits()
}

/// Canonical representation of a constant
pub fn canonical(value: Value) -> Value {
    match value {
        Value::Double(d) => Value::Double(canonical_double(d)),
        Value::List(items) => Value::List(items.into_iter().map(canonical).collect()),
        other => other,
    }
}

/// Numeric view of a value, integers widened to doubles
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// Numeric equality across integer and double representations
pub fn numeric_eq(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x == y),
        _ => Some(as_f64(a)? == as_f64(b)?),
    }
}

/// Whether `a = b` may be recorded as an equivalence.
///
/// Two numbers may only be equated when they are numerically equal. Lists of
/// the same length are checked elementwise. Anything else may be equated.
pub fn may_be_equal(a: &Value, b: &Value) -> bool {
    if let Some(eq) = numeric_eq(a, b) {
        return eq;
    }
    match (a, b) {
        (Value::List(xs), Value::List(ys)) if xs.len() == ys.len() => {
            xs.iter().zip(ys).all(|(x, y)| may_be_equal(x, y))
        }
        _ => true,
    }
}
