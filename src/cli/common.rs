//! Shared CLI helpers used across multiple command handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use devhost::adapters::{AdapterSet, ScriptedAdapter};
use devhost::config::Config;
use devhost::orchestrator::Cancellation;

/// Load the config file, with a hint when it does not exist.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load_from_path(path).with_context(|| {
        format!(
            "Failed to load {} (pass --config or create devhost.toml)",
            path.display()
        )
    })
}

/// Process adapters, or a simulated set for `--dry-run`.
pub(crate) fn adapters(dry_run: bool) -> AdapterSet {
    if dry_run {
        AdapterSet::uniform(Arc::new(ScriptedAdapter::new()))
    } else {
        AdapterSet::processes()
    }
}

/// Cancel every given flag on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c(flags: Vec<Cancellation>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping...");
            for flag in &flags {
                flag.cancel();
            }
        }
    });
}
