use crate::domain::alert::{Alert, AlertType, StoredAlert};
use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

#[derive(Clone)]
pub struct AlertsRepo {
    pub pool: PgPool,
}

fn alert_from_row(row: &PgRow) -> Result<StoredAlert> {
    Ok(StoredAlert {
        id: row.try_get("id")?,
        alert_type: row.try_get("alert_type")?,
        severity: row.try_get("severity")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        expected_value: row.try_get("expected_value")?,
        actual_value: row.try_get("actual_value")?,
        source_ip: row.try_get("source_ip")?,
        payment_id: row.try_get("payment_id")?,
        data: row.try_get("data")?,
        is_resolved: row.try_get("is_resolved")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution_notes: row.try_get("resolution_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

impl AlertsRepo {
    pub async fn insert(&self, alert: &Alert) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO security_alerts
                (alert_type, severity, title, description, expected_value, actual_value, source_ip, payment_id, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.expected_value)
        .bind(&alert.actual_value)
        .bind(&alert.source_ip)
        .bind(alert.payment_id)
        .bind(&alert.data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    pub async fn list_unresolved(&self, severity: Option<&str>, limit: i64) -> Result<Vec<StoredAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, alert_type, severity, title, description, expected_value, actual_value,
                   source_ip, payment_id, data, is_resolved, resolved_by, resolved_at,
                   resolution_notes, created_at
            FROM security_alerts
            WHERE is_resolved = false AND ($1::text IS NULL OR severity = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(severity)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// True when an unresolved alert of `alert_type` already names `event_id`
    /// in its data.
    pub async fn has_open_for_event(&self, alert_type: AlertType, event_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM security_alerts
                WHERE alert_type = $1 AND is_resolved = false AND data->>'event_id' = $2
            ) AS open
            "#,
        )
        .bind(alert_type.as_str())
        .bind(event_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("open"))
    }

    /// Returns false when the alert does not exist or was already resolved.
    pub async fn resolve_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE security_alerts
            SET is_resolved = true, resolved_by = $2, resolved_at = now(), resolution_notes = $3
            WHERE id = $1 AND is_resolved = false
            "#,
        )
        .bind(id)
        .bind(resolved_by)
        .bind(notes)
        .execute(tx.as_mut())
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
