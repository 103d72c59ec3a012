use crate::domain::payment::{Payment, PaymentStatus, RegisterPaymentRequest, SettlementUpdate};
use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, gateway_payment_id, correlation_token, tenant_id, contact_ref, \
    expected_amount, currency, settled_amount, status, settlement_method, status_detail, \
    is_downstream_synced, settlement_attempts, created_at, updated_at, settled_at";

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: row.try_get("id")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
        correlation_token: row.try_get("correlation_token")?,
        tenant_id: row.try_get("tenant_id")?,
        contact_ref: row.try_get("contact_ref")?,
        expected_amount: row.try_get("expected_amount")?,
        currency: row.try_get("currency")?,
        settled_amount: row.try_get("settled_amount")?,
        status: PaymentStatus::parse(&status).ok_or_else(|| anyhow!("unknown payment status {status}"))?,
        settlement_method: row.try_get("settlement_method")?,
        status_detail: row.try_get("status_detail")?,
        is_downstream_synced: row.try_get("is_downstream_synced")?,
        settlement_attempts: row.try_get("settlement_attempts")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

impl PaymentsRepo {
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        req: &RegisterPaymentRequest,
    ) -> Result<Payment> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, correlation_token, tenant_id, contact_ref, expected_amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(id.to_string())
        .bind(&req.tenant_id)
        .bind(&req.contact_ref)
        .bind(req.expected_amount)
        .bind(&req.currency)
        .fetch_one(tx.as_mut())
        .await?;

        payment_from_row(&row)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    pub async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_payment_id = $1"
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    pub async fn find_by_correlation(&self, correlation_token: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE correlation_token = $1"
        ))
        .bind(correlation_token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    /// Locks the payment row for the rest of the transaction.
    pub async fn lock_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(tx.as_mut())
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    pub async fn gateway_id_taken_tx(
        tx: &mut Transaction<'_, Postgres>,
        gateway_payment_id: &str,
    ) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM payments WHERE gateway_payment_id = $1")
            .bind(gateway_payment_id)
            .fetch_optional(tx.as_mut())
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Applies a settlement only while the payment is still in
    /// `expected_status`. Returns false when another writer got there first.
    pub async fn apply_settlement_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        expected_status: PaymentStatus,
        update: &SettlementUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3,
                settled_amount = $4,
                settlement_method = COALESCE($5, settlement_method),
                status_detail = COALESCE($6, status_detail),
                gateway_payment_id = COALESCE($7, gateway_payment_id),
                settlement_attempts = settlement_attempts + 1,
                settled_at = CASE WHEN $3 IN ('approved', 'rejected', 'cancelled') THEN now() ELSE settled_at END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected_status.as_str())
        .bind(update.status.as_str())
        .bind(update.settled_amount)
        .bind(&update.settlement_method)
        .bind(&update.status_detail)
        .bind(&update.gateway_payment_id)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_synced_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments SET is_downstream_synced = true, updated_at = now() \
             WHERE id = $1 AND status = 'approved' AND is_downstream_synced = false",
        )
        .bind(id)
        .execute(tx.as_mut())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Payments the reconciler should look at: unconfirmed ones, and approved
    /// ones the downstream system has not heard about.
    pub async fn list_unconfirmed(&self, hours_back: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE created_at >= now() - make_interval(hours => $1)
              AND (status IN ('pending', 'in_process')
                   OR (status = 'approved' AND is_downstream_synced = false))
            ORDER BY created_at ASC
            "#
        ))
        .bind(hours_back as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}
