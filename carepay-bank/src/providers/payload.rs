use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// First non-empty string found at any of `paths`.
///
/// Numbers are accepted too, since providers are loose about account
/// numbers and ids.
pub fn first_str(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let node = path.iter().try_fold(value, |node, key| node.get(*key))?;
        match node {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// Reads a decimal from a JSON number or numeric string without going
/// through `f64`.
pub fn decimal_at(value: &Value, path: &[&str]) -> Option<Decimal> {
    let node = path.iter().try_fold(value, |node, key| node.get(*key))?;
    match node {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Paystack sometimes delivers `metadata` as a JSON-encoded string.
pub fn metadata_object(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::Null),
        Some(v) => v.clone(),
        None => Value::Null,
    }
}
