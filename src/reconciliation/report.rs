use crate::domain::alert::Severity;
use crate::domain::discrepancy::Discrepancy;
use crate::reconciliation::settings::ReconciliationSettings;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CSV_HEADERS: [&str; 13] = [
    "payment_id",
    "gateway_payment_id",
    "tenant_id",
    "discrepancy_type",
    "expected_value",
    "actual_value",
    "expected_amount",
    "actual_amount",
    "description",
    "severity",
    "auto_correctable",
    "correction_applied",
    "error_message",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Warning,
    Error,
    Critical,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Warning => "warning",
            RunStatus::Error => "error",
            RunStatus::Critical => "critical",
        }
    }
}

pub fn run_status(discrepancies: &[Discrepancy]) -> RunStatus {
    match discrepancies.iter().map(|d| d.severity).max() {
        Some(Severity::Critical) => RunStatus::Critical,
        Some(Severity::High) => RunStatus::Error,
        Some(_) => RunStatus::Warning,
        None => RunStatus::Success,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub payments_checked: usize,
    pub total_discrepancies: usize,
    pub corrections_applied: usize,
    pub auto_correction_rate: f64,
    pub discrepancy_types: BTreeMap<String, usize>,
    pub severity_breakdown: BTreeMap<String, usize>,
}

pub fn summarize(payments_checked: usize, discrepancies: &[Discrepancy]) -> RunSummary {
    let mut discrepancy_types = BTreeMap::new();
    let mut severity_breakdown: BTreeMap<String, usize> = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ]
    .iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();

    for d in discrepancies {
        *discrepancy_types.entry(d.kind.as_str().to_string()).or_insert(0) += 1;
        *severity_breakdown.entry(d.severity.as_str().to_string()).or_insert(0) += 1;
    }

    let corrections_applied = discrepancies.iter().filter(|d| d.correction_applied).count();
    let auto_correction_rate = if discrepancies.is_empty() {
        0.0
    } else {
        let rate = corrections_applied as f64 / discrepancies.len() as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    };

    RunSummary {
        payments_checked,
        total_discrepancies: discrepancies.len(),
        corrections_applied,
        auto_correction_rate,
        discrepancy_types,
        severity_breakdown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub cancelled: bool,
    pub settings: ReconciliationSettings,
    pub summary: RunSummary,
    pub discrepancies: Vec<Discrepancy>,
}

pub fn new_run_id(started_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("recon_{}_{}", started_at.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

impl ReconciliationReport {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADERS)?;
        for d in &self.discrepancies {
            writer.write_record([
                d.payment_id.to_string(),
                d.gateway_payment_id.clone().unwrap_or_default(),
                d.tenant_id.clone(),
                d.kind.as_str().to_string(),
                d.expected_value.clone(),
                d.actual_value.clone(),
                d.expected_amount.map(|a| a.to_string()).unwrap_or_default(),
                d.actual_amount.map(|a| a.to_string()).unwrap_or_default(),
                d.description.clone(),
                d.severity.as_str().to_string(),
                d.auto_correctable.to_string(),
                d.correction_applied.to_string(),
                d.error_message.clone().unwrap_or_default(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Writes `reconciliation_<run_id>.json` and `.csv` under `dir`.
    pub async fn write_files(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        tokio::fs::create_dir_all(dir).await?;
        let json_path = dir.join(format!("reconciliation_{}.json", self.run_id));
        let csv_path = dir.join(format!("reconciliation_{}.csv", self.run_id));
        tokio::fs::write(&json_path, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::write(&csv_path, self.to_csv()?).await?;
        Ok((json_path, csv_path))
    }
}
