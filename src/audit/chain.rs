//! Hashing rules of the audit chain.
//!
//! Each record commits to its own fields and to the hash of the record
//! before it. Block 1 links to [`GENESIS_HASH`].

use crate::audit::masking::mask_sensitive;
use crate::domain::audit::{AuditRecord, NewAuditEntry};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn payload_checksum(canonical_payload: &str) -> String {
    sha256_hex(canonical_payload.as_bytes())
}

/// Postgres keeps microseconds, so anything finer would not survive a reload.
pub fn chain_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn block_hash(
    block_number: i64,
    previous_hash: &str,
    recorded_at: &DateTime<Utc>,
    action: &str,
    actor: &str,
    description: &str,
    payload_checksum: &str,
) -> String {
    let material = serde_json::json!({
        "action": action,
        "actor": actor,
        "block_number": block_number,
        "description": description,
        "payload_checksum": payload_checksum,
        "previous_hash": previous_hash,
        "timestamp": format_timestamp(recorded_at),
    });
    sha256_hex(canonical_json(&material).as_bytes())
}

pub fn record_hash(record: &AuditRecord) -> String {
    block_hash(
        record.block_number,
        &record.previous_hash,
        &record.recorded_at,
        &record.action,
        &record.actor,
        &record.description,
        &record.payload_checksum,
    )
}

/// Block number and previous hash for the record following `last`.
pub fn next_link(last: Option<(i64, String)>) -> (i64, String) {
    match last {
        Some((block_number, current_hash)) => (block_number + 1, current_hash),
        None => (1, GENESIS_HASH.to_string()),
    }
}

/// Builds the next record of the chain. The payload is masked before it is
/// checksummed or stored.
pub fn seal(
    entry: NewAuditEntry,
    block_number: i64,
    previous_hash: String,
    now: DateTime<Utc>,
) -> AuditRecord {
    let recorded_at = chain_timestamp(now);
    let payload = canonical_json(&mask_sensitive(&entry.payload));
    let checksum = payload_checksum(&payload);
    let action = entry.action.as_str().to_string();
    let current_hash = block_hash(
        block_number,
        &previous_hash,
        &recorded_at,
        &action,
        &entry.actor,
        &entry.description,
        &checksum,
    );

    AuditRecord {
        block_number,
        previous_hash,
        current_hash,
        action,
        actor: entry.actor,
        description: entry.description,
        payload,
        payload_checksum: checksum,
        payment_id: entry.payment_id,
        correlation_id: entry.correlation_id,
        recorded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let v = json!({"b": 1, "a": {"z": [1, {"y": true, "x": null}], "c": "s"}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"c":"s","z":[1,{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn genesis_is_sixty_four_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
        assert_eq!(next_link(None), (1, GENESIS_HASH.to_string()));
        assert_eq!(next_link(Some((7, "ab".into()))), (8, "ab".to_string()));
    }

    #[test]
    fn timestamp_is_truncated_to_micros() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&chain_timestamp(at)), "2024-05-01T10:00:00.123456Z");
    }
}
