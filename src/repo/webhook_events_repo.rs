use crate::domain::webhook_event::{Annotation, EventStatus, NewWebhookEvent, WebhookEvent};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, external_event_id, topic, raw_payload, headers, source_ip, \
    signature_valid, status, attempts, max_attempts, last_error, annotation, gateway_payment_id, \
    payment_id, created_at, updated_at, last_attempt_at, processed_at";

#[derive(Clone)]
pub struct WebhookEventsRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub status: Option<String>,
    pub topic: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountBy {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCounts {
    pub total: i64,
    pub by_status: Vec<CountBy>,
    pub by_topic: Vec<CountBy>,
    pub retry_queue: i64,
    pub invalid_signatures: i64,
}

#[derive(Debug, Clone)]
pub struct ExpiredClaim {
    pub id: i64,
    pub status: EventStatus,
    pub attempts: i32,
}

fn event_from_row(row: &PgRow) -> Result<WebhookEvent> {
    let status: String = row.try_get("status")?;
    Ok(WebhookEvent {
        id: row.try_get("id")?,
        external_event_id: row.try_get("external_event_id")?,
        topic: row.try_get("topic")?,
        raw_payload: row.try_get("raw_payload")?,
        headers: row.try_get("headers")?,
        source_ip: row.try_get("source_ip")?,
        signature_valid: row.try_get("signature_valid")?,
        status: EventStatus::parse(&status).ok_or_else(|| anyhow!("unknown event status {status}"))?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        last_error: row.try_get("last_error")?,
        annotation: row.try_get("annotation")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
        payment_id: row.try_get("payment_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

impl WebhookEventsRepo {
    pub async fn insert(&self, event: &NewWebhookEvent) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhook_events
                (external_event_id, topic, raw_payload, headers, source_ip, signature_valid,
                 status, attempts, max_attempts, last_error, gateway_payment_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&event.external_event_id)
        .bind(&event.topic)
        .bind(&event.raw_payload)
        .bind(&event.headers)
        .bind(&event.source_ip)
        .bind(event.signature_valid)
        .bind(event.status.as_str())
        .bind(event.max_attempts)
        .bind(&event.last_error)
        .bind(&event.gateway_payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Claims up to `batch_size` pending events for this worker. The attempt
    /// counter and timestamp move in the same statement as the status.
    pub async fn claim_pending(&self, batch_size: i64) -> Result<Vec<WebhookEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE webhook_events
            SET status = 'processing',
                attempts = attempts + 1,
                last_attempt_at = now(),
                updated_at = now()
            WHERE id IN (
                SELECT id
                FROM webhook_events
                WHERE status = 'pending' AND attempts < max_attempts
                ORDER BY id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows.iter().map(event_from_row).collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    /// Returns false when the claim is no longer held (the lease expired and
    /// the sweeper moved the event on).
    pub async fn mark_processed_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        annotation: Option<Annotation>,
        payment_id: Option<Uuid>,
        gateway_payment_id: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processed',
                last_error = NULL,
                annotation = $2,
                payment_id = COALESCE($3, payment_id),
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                processed_at = now(),
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(annotation.map(|a| a.as_str()))
        .bind(payment_id)
        .bind(gateway_payment_id)
        .execute(tx.as_mut())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn record_failure_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        status: EventStatus,
        last_error: &str,
        payment_id: Option<Uuid>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $2,
                last_error = $3,
                payment_id = COALESCE($4, payment_id),
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(last_error)
        .bind(payment_id)
        .execute(tx.as_mut())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Moves `error` events whose backoff has elapsed back to `pending`.
    pub async fn requeue_due(&self, base_secs: u64, cap_secs: u64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'pending', updated_at = now()
            WHERE status = 'error'
              AND attempts < max_attempts
              AND COALESCE(last_attempt_at, created_at)
                  <= now() - make_interval(secs => LEAST($2::float8, $1::float8 * power(2, GREATEST(attempts - 1, 0))))
            "#,
        )
        .bind(base_secs as f64)
        .bind(cap_secs as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Routes claims older than the lease through the failure transition.
    pub async fn expire_stale_claims(&self, lease_secs: u64) -> Result<Vec<ExpiredClaim>> {
        let rows = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'error' END,
                last_error = 'processing lease expired',
                updated_at = now()
            WHERE status = 'processing'
              AND last_attempt_at < now() - make_interval(secs => $1::float8)
            RETURNING id, status, attempts
            "#,
        )
        .bind(lease_secs as f64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let status: String = r.try_get("status")?;
                Ok(ExpiredClaim {
                    id: r.try_get("id")?,
                    status: EventStatus::parse(&status).unwrap_or(EventStatus::Error),
                    attempts: r.try_get("attempts")?,
                })
            })
            .collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<WebhookEvent>> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn lock_tx(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<WebhookEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(tx.as_mut())
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    /// Operator retry: back to `pending`, optionally with a fresh attempt budget.
    pub async fn requeue_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        reset_attempts: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'pending',
                attempts = CASE WHEN $2 THEN 0 ELSE attempts END,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reset_attempts)
        .execute(tx.as_mut())
        .await?;
        Ok(())
    }

    pub async fn list(&self, filter: &EventFilter) -> Result<Vec<WebhookEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM webhook_events
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR topic = $2)
            ORDER BY id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(&filter.status)
        .bind(&filter.topic)
        .bind(filter.limit.unwrap_or(50).clamp(1, 500))
        .bind(filter.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn counts(&self) -> Result<EventCounts> {
        let by_status = sqlx::query("SELECT status AS key, COUNT(*) AS count FROM webhook_events GROUP BY status ORDER BY status")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| CountBy {
                key: r.get("key"),
                count: r.get("count"),
            })
            .collect::<Vec<_>>();

        let by_topic = sqlx::query(
            "SELECT topic AS key, COUNT(*) AS count FROM webhook_events GROUP BY topic ORDER BY count DESC LIMIT 20",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| CountBy {
            key: r.get("key"),
            count: r.get("count"),
        })
        .collect::<Vec<_>>();

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'error' AND attempts < max_attempts) AS retry_queue,
                COUNT(*) FILTER (WHERE signature_valid = false) AS invalid_signatures
            FROM webhook_events
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(EventCounts {
            total: by_status.iter().map(|c| c.count).sum(),
            by_status,
            by_topic,
            retry_queue: row.get("retry_queue"),
            invalid_signatures: row.get("invalid_signatures"),
        })
    }
}
