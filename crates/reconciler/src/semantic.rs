//! Structural comparison of API objects.
//!
//! Objects are compared in their serialized JSON form, where an unset
//! optional field is simply absent.
//!
//! - [`deep_equal`] treats absent, `null` and empty collections as the same
//!   value. Otherwise the two trees must match exactly.
//! - [`deep_derivative`] asks whether `current` could be `desired` after the
//!   cluster filled in defaults. Every field set in `desired` must be present
//!   and derive in `current`; anything `desired` leaves unset is ignored.
//!   Lists derive element-wise, and `current` may append elements of its
//!   own.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Structural equality, ignoring unset fields.
///
/// # Errors
///
/// Returns an error if either value fails to serialize.
pub fn deep_equal<T: Serialize>(a: &T, b: &T) -> Result<bool> {
    let a = normalize(serde_json::to_value(a)?);
    let b = normalize(serde_json::to_value(b)?);
    Ok(a == b)
}

/// True when `current` carries everything `desired` sets.
///
/// # Errors
///
/// Returns an error if either value fails to serialize.
pub fn deep_derivative<T: Serialize>(desired: &T, current: &T) -> Result<bool> {
    let desired = serde_json::to_value(desired)?;
    let current = serde_json::to_value(current)?;
    Ok(derives(&desired, &current))
}

fn derives(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Null, _) => true,
        (Value::String(s), _) if s.is_empty() => true,
        (Value::Object(d), Value::Object(c)) => d
            .iter()
            .all(|(k, dv)| derives(dv, c.get(k).unwrap_or(&Value::Null))),
        (Value::Object(d), _) => d.values().all(|dv| derives(dv, &Value::Null)),
        (Value::Array(d), Value::Array(c)) => {
            d.is_empty() || (d.len() <= c.len() && d.iter().zip(c).all(|(dv, cv)| derives(dv, cv)))
        }
        (Value::Array(d), _) => d.is_empty(),
        (d, c) => d == c,
    }
}

/// Drop nulls and empty collections so that unset and empty compare equal.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_unset(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
