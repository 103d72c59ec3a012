use rust_decimal::Decimal;
use std::str::FromStr;

pub const DEFAULT_AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub fn amounts_match(expected: Decimal, actual: Decimal, tolerance: Decimal) -> bool {
    (actual - expected).abs() <= tolerance
}

/// Reads a monetary amount from a JSON number or numeric string without
/// passing through `f64`.
pub fn amount_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => parse_amount(&n.to_string()),
        serde_json::Value::String(s) => parse_amount(s),
        _ => None,
    }
}

pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
