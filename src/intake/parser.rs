use serde_json::Value;

pub const UNKNOWN_TOPIC: &str = "unknown";
pub const INVALID_JSON_TOPIC: &str = "invalid_json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNotification {
    pub topic: String,
    pub external_event_id: Option<String>,
    pub gateway_payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
}

pub fn parse_notification(raw: &[u8]) -> Result<ParsedNotification, ParseFailure> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| ParseFailure {
        message: format!("invalid JSON: {e}"),
    })?;

    if !value.is_object() {
        return Err(ParseFailure {
            message: "invalid JSON: payload is not an object".to_string(),
        });
    }

    let topic = value
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| value.get("topic").and_then(Value::as_str))
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(UNKNOWN_TOPIC)
        .to_string();

    Ok(ParsedNotification {
        topic,
        external_event_id: value.get("id").and_then(id_text),
        gateway_payment_id: gateway_payment_id(&value),
    })
}

/// `data.id`, sent either as a string or a number.
pub fn gateway_payment_id(payload: &Value) -> Option<String> {
    payload.get("data").and_then(|d| d.get("id")).and_then(id_text)
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
