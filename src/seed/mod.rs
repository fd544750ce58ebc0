//! Seed loader: upsert a batch of JSON records into a store.
//!
//! Each record is written independently and keyed by its `id`, so re-running
//! a seed is safe. A bad record (no id, or rejected by the store) is logged
//! and counted; the rest of the batch still goes through.

pub mod store;

pub use store::{HttpRecordStore, MemoryRecordStore, RecordStore};

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{DevhostError, Result};

/// One record that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedFailure {
    /// Position in the input batch.
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

/// Aggregate outcome of a seed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    /// Ids written, in input order.
    pub succeeded: Vec<String>,
    pub failures: Vec<SeedFailure>,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for SeedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} records seeded, {} failed",
            self.succeeded.len(),
            self.total(),
            self.failures.len()
        )
    }
}

/// Read a JSON array of records. Anything else aborts the whole load.
pub fn load_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DevhostError::Seed(format!("Cannot read records '{}': {}", path.display(), e))
    })?;
    match serde_json::from_str(&content)? {
        Value::Array(records) => Ok(records),
        _ => Err(DevhostError::Seed(format!(
            "Records file '{}' must contain a JSON array",
            path.display()
        ))),
    }
}

/// The record's `id`, if it is a non-empty string.
fn record_id(record: &Value) -> Option<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Upsert every record, continuing past per-record failures.
pub async fn seed_records(store: &dyn RecordStore, records: &[Value]) -> SeedReport {
    let mut report = SeedReport::default();
    info!(store = store.name(), records = records.len(), "Seeding records");

    for (index, record) in records.iter().enumerate() {
        let Some(id) = record_id(record) else {
            warn!(index, "Skipping record without an id");
            report.failures.push(SeedFailure {
                index,
                id: None,
                reason: "missing or empty 'id'".to_string(),
            });
            continue;
        };

        match store.upsert(id, record).await {
            Ok(()) => {
                info!(id, "Seeded record");
                report.succeeded.push(id.to_string());
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to seed record");
                report.failures.push(SeedFailure {
                    index,
                    id: Some(id.to_string()),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        "Seeding complete"
    );
    report
}
