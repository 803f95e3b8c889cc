//! Lenient numeric coercion for values scraped out of embedded page state.
//!
//! The source site encodes numbers inconsistently: plain JSON numbers,
//! numeric strings, Swedish decimal commas, and occasionally booleans or
//! empty strings standing in for "no value". Every helper here is total and
//! degrades to `None` instead of failing.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a numeric string, accepting surrounding whitespace, thousands
/// separators written as spaces, and a decimal comma.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if compact.is_empty() {
        return None;
    }
    let normalized = if compact.contains('.') {
        compact
    } else {
        compact.replace(',', ".")
    };
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Coerces a JSON value to a finite `f64`.
#[must_use]
pub fn to_f64(value: &Value) -> Option<f64> {
    let out = match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_decimal(s),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    if out.is_none() && !matches!(value, Value::Null) {
        tracing::debug!(value = %value, "value is not coercible to a float");
    }
    out
}

/// Coerces a JSON value to an `i64`, truncating integral-looking floats.
#[must_use]
pub fn to_i64(value: &Value) -> Option<i64> {
    let out = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(f64_to_i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| parse_decimal(trimmed).and_then(f64_to_i64))
        }
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    if out.is_none() && !matches!(value, Value::Null) {
        tracing::debug!(value = %value, "value is not coercible to an integer");
    }
    out
}

/// Coerces a JSON value to an `i32`; values outside the `i32` range are `None`.
#[must_use]
pub fn to_i32(value: &Value) -> Option<i32> {
    to_i64(value).and_then(|n| i32::try_from(n).ok())
}

/// Converts a float to `i64` the way `int()` would: truncation toward zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
#[must_use]
pub fn f64_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

/// Serde adapter: any JSON value to `Option<f64>` via [`to_f64`].
///
/// # Errors
///
/// Only fails if the input is not valid JSON at all.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(to_f64))
}

/// Serde adapter: any JSON value to `Option<i64>` via [`to_i64`].
///
/// # Errors
///
/// Only fails if the input is not valid JSON at all.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(to_i64))
}

/// Serde adapter: any JSON value to `Option<i32>` via [`to_i32`].
///
/// # Errors
///
/// Only fails if the input is not valid JSON at all.
pub fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(to_i32))
}
