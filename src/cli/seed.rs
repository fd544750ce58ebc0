//! `seed` command handler.

use std::path::Path;

use anyhow::{bail, Context, Result};

use devhost::seed::{self, HttpRecordStore, MemoryRecordStore, RecordStore};

pub(crate) async fn cmd_seed(
    records_path: &Path,
    endpoint: Option<String>,
    collection: String,
    strict: bool,
    dry_run: bool,
) -> Result<()> {
    let records = seed::load_records(records_path)
        .with_context(|| format!("Failed to load {}", records_path.display()))?;

    let store: Box<dyn RecordStore> = match (dry_run, endpoint) {
        (true, _) => Box::new(MemoryRecordStore::new()),
        (false, Some(endpoint)) => Box::new(HttpRecordStore::new(&endpoint, collection)?),
        (false, None) => bail!("--endpoint is required unless --dry-run is set"),
    };

    let report = seed::seed_records(store.as_ref(), &records).await;
    for failure in &report.failures {
        match &failure.id {
            Some(id) => println!("  [{}] {}: {}", failure.index, id, failure.reason),
            None => println!("  [{}] {}", failure.index, failure.reason),
        }
    }
    println!("{}", report);

    if strict && !report.is_clean() {
        bail!("{} record(s) failed", report.failures.len());
    }
    Ok(())
}
