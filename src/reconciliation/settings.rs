use crate::config::AppConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    pub hours_back: i64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub auto_correct: bool,
    pub dry_run: bool,
    pub amount_tolerance: Decimal,
    pub gateway_timeout_ms: u64,
    pub sync_timeout_ms: u64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            hours_back: 24,
            batch_size: 50,
            batch_pause_ms: 1_000,
            max_retries: 3,
            retry_delay_ms: 5_000,
            auto_correct: true,
            dry_run: false,
            amount_tolerance: crate::domain::money::DEFAULT_AMOUNT_TOLERANCE,
            gateway_timeout_ms: 10_000,
            sync_timeout_ms: 10_000,
        }
    }
}

/// Per-run overrides accepted by the on-demand endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverride {
    pub hours_back: Option<i64>,
    pub dry_run: Option<bool>,
    pub auto_correct: Option<bool>,
}

impl ReconciliationSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            hours_back: cfg.recon_hours_back,
            batch_size: cfg.recon_batch_size,
            batch_pause_ms: cfg.recon_batch_pause_ms,
            max_retries: cfg.recon_max_retries,
            retry_delay_ms: cfg.recon_retry_delay_ms,
            auto_correct: cfg.recon_auto_correct,
            dry_run: cfg.recon_dry_run,
            amount_tolerance: cfg.amount_tolerance,
            gateway_timeout_ms: cfg.gateway_timeout_ms,
            sync_timeout_ms: cfg.crm_timeout_ms,
        }
    }

    pub fn with_override(mut self, o: &SettingsOverride) -> Self {
        if let Some(hours) = o.hours_back.filter(|h| *h > 0) {
            self.hours_back = hours;
        }
        if let Some(dry_run) = o.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(auto_correct) = o.auto_correct {
            self.auto_correct = auto_correct;
        }
        self
    }

    pub fn corrections_enabled(&self) -> bool {
        self.auto_correct && !self.dry_run
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}
