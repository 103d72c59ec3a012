use crate::audit::chain::{payload_checksum, record_hash, GENESIS_HASH};
use crate::domain::audit::AuditRecord;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFailureKind {
    Gap,
    BrokenLink,
    HashMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainFailure {
    pub block_number: i64,
    pub kind: ChainFailureKind,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub total_records: u64,
    pub verified: u64,
    pub first_diverging_block: Option<i64>,
    pub failures: Vec<ChainFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordCheck {
    pub block_number: i64,
    pub hash_valid: bool,
    pub checksum_valid: bool,
    pub link_valid: Option<bool>,
    pub stored_hash: String,
    pub computed_hash: String,
}

/// Walks records in ascending block order and collects every divergence
/// instead of stopping at the first one.
#[derive(Debug)]
pub struct ChainVerifier {
    expected_block: i64,
    expected_previous: String,
    report: ChainReport,
}

impl ChainVerifier {
    pub fn from_genesis() -> Self {
        Self::starting_at(1, GENESIS_HASH.to_string())
    }

    /// `previous_hash` is the stored `current_hash` of block `from_block - 1`
    /// (or the genesis hash when starting at block 1).
    pub fn starting_at(from_block: i64, previous_hash: String) -> Self {
        Self {
            expected_block: from_block,
            expected_previous: previous_hash,
            report: ChainReport {
                valid: true,
                total_records: 0,
                verified: 0,
                first_diverging_block: None,
                failures: Vec::new(),
            },
        }
    }

    pub fn check(&mut self, record: &AuditRecord) {
        self.report.total_records += 1;
        let failures_before = self.report.failures.len();

        if record.block_number != self.expected_block {
            self.fail(
                record.block_number,
                ChainFailureKind::Gap,
                self.expected_block.to_string(),
                record.block_number.to_string(),
            );
        }

        if record.previous_hash != self.expected_previous {
            self.fail(
                record.block_number,
                ChainFailureKind::BrokenLink,
                self.expected_previous.clone(),
                record.previous_hash.clone(),
            );
        }

        let computed = record_hash(record);
        if computed != record.current_hash {
            self.fail(
                record.block_number,
                ChainFailureKind::HashMismatch,
                computed,
                record.current_hash.clone(),
            );
        } else {
            let checksum = payload_checksum(&record.payload);
            if checksum != record.payload_checksum {
                self.fail(
                    record.block_number,
                    ChainFailureKind::HashMismatch,
                    checksum,
                    record.payload_checksum.clone(),
                );
            }
        }

        if self.report.failures.len() == failures_before {
            self.report.verified += 1;
        }

        // Continue from what is stored so a single tampered block is reported
        // once, not on every block after it.
        self.expected_block = record.block_number + 1;
        self.expected_previous = record.current_hash.clone();
    }

    fn fail(&mut self, block_number: i64, kind: ChainFailureKind, expected: String, actual: String) {
        self.report.valid = false;
        if self.report.first_diverging_block.is_none() {
            self.report.first_diverging_block = Some(block_number);
        }
        self.report.failures.push(ChainFailure {
            block_number,
            kind,
            expected,
            actual,
        });
    }

    pub fn finish(self) -> ChainReport {
        self.report
    }
}

pub fn verify_records(records: &[AuditRecord]) -> ChainReport {
    let mut verifier = ChainVerifier::from_genesis();
    for record in records {
        verifier.check(record);
    }
    verifier.finish()
}

/// Checks one record in isolation, plus its link when the predecessor's
/// stored hash is known.
pub fn verify_record(record: &AuditRecord, predecessor_hash: Option<&str>) -> RecordCheck {
    let computed = record_hash(record);
    let link_valid = if record.block_number == 1 {
        Some(record.previous_hash == GENESIS_HASH)
    } else {
        predecessor_hash.map(|h| h == record.previous_hash)
    };

    RecordCheck {
        block_number: record.block_number,
        hash_valid: computed == record.current_hash,
        checksum_valid: payload_checksum(&record.payload) == record.payload_checksum,
        link_valid,
        stored_hash: record.current_hash.clone(),
        computed_hash: computed,
    }
}
