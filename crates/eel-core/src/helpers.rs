//! Value coercion, identifiers and tenant string conventions.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::settings::DEFAULT_PARTNER;

/// Renders a value as flat text.
///
/// Strings are returned verbatim, floats keep two fractional digits,
/// integers and booleans use their canonical form, null becomes the empty
/// string, and arrays and objects are rendered as compact JSON with sorted
/// keys.
pub fn to_flat_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_f64() => format!("{:.2}", n.as_f64().unwrap_or_default()),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Structural equality over JSON values.
///
/// Integers and floats are distinct shapes, so `1` and `1.0` compare unequal;
/// this keeps equal composites rendering to identical JSON.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equals(x, y))
        },
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(key, x)| ys.get(key).is_some_and(|y| deep_equals(x, y)))
        },
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// Equality for arbitrary serializable shapes via their JSON form.
///
/// Values that fail to serialize compare unequal.
pub fn deep_equals_json<A, B>(a: &A, b: &B) -> bool
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => deep_equals(&a, &b),
        _ => false,
    }
}

/// Mints a random RFC 4122 version 4 UUID in lowercase hyphenated form.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Application id portion of a tenant string.
pub fn extract_app_id(tenant: &str, allow_partner: bool) -> String {
    split_tenant(tenant, allow_partner, DEFAULT_PARTNER).0
}

/// Partner id portion of a tenant string.
///
/// Empty when partners are disabled; `"comcast"` when enabled but the tenant
/// carries no partner suffix.
pub fn extract_partner_id(tenant: &str, allow_partner: bool) -> String {
    split_tenant(tenant, allow_partner, DEFAULT_PARTNER).1
}

/// Splits `appId_partnerId` on the last underscore.
///
/// An underscore in the first or last position does not split. When
/// partners are disallowed the whole string is the app id and the partner is
/// empty.
pub fn split_tenant(tenant: &str, allow_partner: bool, default_partner: &str) -> (String, String) {
    if !allow_partner {
        return (tenant.to_string(), String::new());
    }
    match tenant.rfind('_') {
        Some(idx) if idx > 0 && idx < tenant.len() - 1 => {
            (tenant[..idx].to_string(), tenant[idx + 1..].to_string())
        },
        _ => (tenant.to_string(), default_partner.to_string()),
    }
}

/// Resolves a dot-separated path into a JSON document.
///
/// Numeric segments index arrays. An empty path resolves to the root.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
