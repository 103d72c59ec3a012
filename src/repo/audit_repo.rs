use crate::audit::chain::{next_link, seal, GENESIS_HASH};
use crate::audit::verifier::{ChainReport, ChainVerifier};
use crate::domain::audit::{AuditRecord, NewAuditEntry};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Advisory lock key serializing appends to the chain.
pub const AUDIT_CHAIN_LOCK_KEY: i64 = 0x4155_4449_545f_4348;

const RECORD_COLUMNS: &str = "block_number, previous_hash, current_hash, action, actor, description, \
    payload, payload_checksum, payment_id, correlation_id, recorded_at";

const VERIFY_PAGE_SIZE: i64 = 1_000;

#[derive(Clone)]
pub struct AuditRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub total_records: i64,
    pub first_block: Option<i64>,
    pub first_hash: Option<String>,
    pub last_block: Option<i64>,
    pub last_hash: Option<String>,
    pub genesis_hash: &'static str,
}

fn record_from_row(row: &PgRow) -> Result<AuditRecord> {
    Ok(AuditRecord {
        block_number: row.try_get("block_number")?,
        previous_hash: row.try_get("previous_hash")?,
        current_hash: row.try_get("current_hash")?,
        action: row.try_get("action")?,
        actor: row.try_get("actor")?,
        description: row.try_get("description")?,
        payload: row.try_get("payload")?,
        payload_checksum: row.try_get("payload_checksum")?,
        payment_id: row.try_get("payment_id")?,
        correlation_id: row.try_get("correlation_id")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

impl AuditRepo {
    /// Appends one record inside the caller's transaction. The chain lock is
    /// held until that transaction ends, so call this last before commit.
    pub async fn append_tx(
        tx: &mut Transaction<'_, Postgres>,
        entry: NewAuditEntry,
    ) -> Result<AuditRecord> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK_KEY)
            .execute(tx.as_mut())
            .await?;

        let last = sqlx::query(
            "SELECT block_number, current_hash FROM audit_records ORDER BY block_number DESC LIMIT 1",
        )
        .fetch_optional(tx.as_mut())
        .await?
        .map(|r| (r.get::<i64, _>("block_number"), r.get::<String, _>("current_hash")));

        let (block_number, previous_hash) = next_link(last);
        let record = seal(entry, block_number, previous_hash, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO audit_records
                (block_number, previous_hash, current_hash, action, actor, description,
                 payload, payload_checksum, payment_id, correlation_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.block_number)
        .bind(&record.previous_hash)
        .bind(&record.current_hash)
        .bind(&record.action)
        .bind(&record.actor)
        .bind(&record.description)
        .bind(&record.payload)
        .bind(&record.payload_checksum)
        .bind(record.payment_id)
        .bind(&record.correlation_id)
        .bind(record.recorded_at)
        .execute(tx.as_mut())
        .await?;

        tracing::debug!(
            block_number = record.block_number,
            action = %record.action,
            "audit record appended"
        );
        Ok(record)
    }

    /// Appends in a transaction of its own.
    pub async fn append(&self, entry: NewAuditEntry) -> Result<AuditRecord> {
        let mut tx = self.pool.begin().await?;
        let record = Self::append_tx(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_block(&self, block_number: i64) -> Result<Option<AuditRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM audit_records WHERE block_number = $1"
        ))
        .bind(block_number)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn block_hash(&self, block_number: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT current_hash FROM audit_records WHERE block_number = $1")
            .bind(block_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("current_hash")))
    }

    async fn page(&self, after: i64, to: Option<i64>) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM audit_records
            WHERE block_number > $1 AND ($2::bigint IS NULL OR block_number <= $2)
            ORDER BY block_number ASC
            LIMIT $3
            "#
        ))
        .bind(after)
        .bind(to)
        .bind(VERIFY_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Verifies blocks `from..=to` (whole chain by default), reading in pages.
    pub async fn verify_chain(&self, from: Option<i64>, to: Option<i64>) -> Result<ChainReport> {
        let from = from.unwrap_or(1).max(1);
        let mut verifier = if from == 1 {
            ChainVerifier::from_genesis()
        } else {
            // A missing predecessor shows up as a broken link on `from`.
            let seed = self
                .block_hash(from - 1)
                .await?
                .unwrap_or_else(|| GENESIS_HASH.to_string());
            ChainVerifier::starting_at(from, seed)
        };

        let mut after = from - 1;
        loop {
            let page = self.page(after, to).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.block_number;
            for record in &page {
                verifier.check(record);
            }
            if (page.len() as i64) < VERIFY_PAGE_SIZE {
                break;
            }
        }

        Ok(verifier.finish())
    }

    pub async fn stats(&self) -> Result<ChainStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM audit_records) AS total,
                (SELECT block_number FROM audit_records ORDER BY block_number ASC LIMIT 1) AS first_block,
                (SELECT current_hash FROM audit_records ORDER BY block_number ASC LIMIT 1) AS first_hash,
                (SELECT block_number FROM audit_records ORDER BY block_number DESC LIMIT 1) AS last_block,
                (SELECT current_hash FROM audit_records ORDER BY block_number DESC LIMIT 1) AS last_hash
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ChainStats {
            total_records: row.try_get("total")?,
            first_block: row.try_get("first_block")?,
            first_hash: row.try_get::<Option<String>, _>("first_hash")?,
            last_block: row.try_get("last_block")?,
            last_hash: row.try_get::<Option<String>, _>("last_hash")?,
            genesis_hash: GENESIS_HASH,
        })
    }
}
