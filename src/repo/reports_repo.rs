use crate::reconciliation::report::ReconciliationReport;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct ReportsRepo {
    pub pool: PgPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportListing {
    pub run_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct StoredReport {
    pub run_id: String,
    pub report_json: serde_json::Value,
    pub report_csv: String,
}

impl ReportsRepo {
    pub async fn save(&self, report: &ReconciliationReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_reports (run_id, status, started_at, completed_at, summary, report_json, report_csv)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(&report.run_id)
        .bind(report.status.as_str())
        .bind(report.started_at)
        .bind(report.completed_at)
        .bind(serde_json::to_value(&report.summary)?)
        .bind(report.to_json()?)
        .bind(report.to_csv()?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Result<Option<StoredReport>> {
        let row = sqlx::query("SELECT run_id, report_json, report_csv FROM reconciliation_reports WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredReport {
            run_id: r.get("run_id"),
            report_json: r.get("report_json"),
            report_csv: r.get("report_csv"),
        }))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<ReportListing>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, status, started_at, completed_at, summary
            FROM reconciliation_reports
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReportListing {
                run_id: r.get("run_id"),
                status: r.get("status"),
                started_at: r.get("started_at"),
                completed_at: r.get("completed_at"),
                summary: r.get("summary"),
            })
            .collect())
    }
}
