use serde_json::{Map, Value};

pub const MASK: &str = "***";

const SENSITIVE_KEYS: &[&str] = &[
    "access_token",
    "api_key",
    "apikey",
    "authorization",
    "card_number",
    "client_secret",
    "cvc",
    "cvv",
    "password",
    "pin",
    "refresh_token",
    "secret",
    "signature",
    "token",
    "x_alert_secret",
    "x_internal_api_key",
    "x_signature",
];

/// Header names are matched case-insensitively with `-` and `_` treated alike.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEYS.contains(&normalized.as_str())
        || normalized.contains("password")
        || normalized.ends_with("_secret")
}

pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) {
                        (k.clone(), Value::String(MASK.to_string()))
                    } else {
                        (k.clone(), mask_sensitive(v))
                    }
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}

pub fn mask_headers<'a, I>(headers: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut map = Map::new();
    for (name, value) in headers {
        let stored = if is_sensitive_key(name) {
            MASK.to_string()
        } else {
            value.to_string()
        };
        map.insert(name.to_ascii_lowercase(), Value::String(stored));
    }
    Value::Object(map)
}
