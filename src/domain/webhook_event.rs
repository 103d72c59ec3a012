use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

pub const SETTLEMENT_TOPICS: [&str; 3] = ["payment", "payment.created", "payment.updated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Processed,
    Error,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Processed => "processed",
            EventStatus::Error => "error",
            EventStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(EventStatus::Pending),
            "processing" => Some(EventStatus::Processing),
            "processed" => Some(EventStatus::Processed),
            "error" => Some(EventStatus::Error),
            "failed" => Some(EventStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Processed | EventStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    Duplicate,
    IgnoredTopic,
    AlreadyFinal,
    AwaitingFinalStatus,
}

impl Annotation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Annotation::Duplicate => "duplicate",
            Annotation::IgnoredTopic => "ignored_topic",
            Annotation::AlreadyFinal => "already_final",
            Annotation::AwaitingFinalStatus => "awaiting_final_status",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub external_event_id: Option<String>,
    pub topic: String,
    #[serde(skip)]
    pub raw_payload: Vec<u8>,
    pub headers: serde_json::Value,
    pub source_ip: Option<String>,
    pub signature_valid: Option<bool>,
    pub status: EventStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub annotation: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn raw_payload_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_payload).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub external_event_id: Option<String>,
    pub topic: String,
    pub raw_payload: Vec<u8>,
    pub headers: serde_json::Value,
    pub source_ip: Option<String>,
    pub signature_valid: Option<bool>,
    pub status: EventStatus,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub gateway_payment_id: Option<String>,
}

pub fn is_settlement_topic(topic: &str) -> bool {
    SETTLEMENT_TOPICS.contains(&topic)
}

/// Status an event lands in after a failed attempt. `attempts` already
/// counts the attempt that just failed.
pub fn status_after_failure(attempts: i32, max_attempts: i32) -> EventStatus {
    if attempts >= max_attempts {
        EventStatus::Failed
    } else {
        EventStatus::Error
    }
}

pub fn can_retry(status: EventStatus, attempts: i32, max_attempts: i32) -> bool {
    status == EventStatus::Error && attempts < max_attempts
}

/// Delay before an `error` event is requeued: `base * 2^(attempts-1)`, capped.
pub fn retry_backoff(attempts: i32, base_secs: u64, cap_secs: u64) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 20) as u32;
    let secs = base_secs.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_secs(secs.min(cap_secs))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualRetryPlan {
    pub reset_attempts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualRetryRejection {
    NotRetryable(EventStatus),
    AttemptCapReached { attempts: i32, max_attempts: i32 },
}

impl std::fmt::Display for ManualRetryRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManualRetryRejection::NotRetryable(status) => {
                write!(f, "event in status {} cannot be retried", status.as_str())
            }
            ManualRetryRejection::AttemptCapReached { attempts, max_attempts } => write!(
                f,
                "event used {attempts}/{max_attempts} attempts; pass reset_attempts=true to retry"
            ),
        }
    }
}

/// Operator-initiated retry. Attempts are kept unless the operator resets
/// them, so a capped event stays capped without an explicit reset.
pub fn plan_manual_retry(
    status: EventStatus,
    attempts: i32,
    max_attempts: i32,
    reset_attempts: bool,
) -> Result<ManualRetryPlan, ManualRetryRejection> {
    match status {
        EventStatus::Error | EventStatus::Failed => {
            if attempts >= max_attempts && !reset_attempts {
                return Err(ManualRetryRejection::AttemptCapReached {
                    attempts,
                    max_attempts,
                });
            }
            Ok(ManualRetryPlan { reset_attempts })
        }
        other => Err(ManualRetryRejection::NotRetryable(other)),
    }
}

/// Health label for the webhook stats endpoint.
pub fn health_label(success_rate_percent: f64) -> &'static str {
    if success_rate_percent > 90.0 {
        "healthy"
    } else if success_rate_percent > 70.0 {
        "warning"
    } else {
        "critical"
    }
}
