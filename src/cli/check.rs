//! Config check command handler.

use std::path::Path;

use anyhow::{bail, Result};

use devhost::config::validate::{self, DiagnosticLevel};
use devhost::config::Config;

/// Validate the config file: unknown fields first, then the resource
/// declarations and their dependency graph.
pub(crate) fn cmd_check(config_path: &Path) -> Result<()> {
    println!("Config file: {}", config_path.display());

    if !config_path.exists() {
        bail!("Config file not found: {}", config_path.display());
    }

    let raw = match Config::load_raw(config_path) {
        Ok(v) => v,
        Err(e) => bail!("Cannot parse config: {}", e),
    };

    let mut diagnostics = validate::validate_config(&raw);
    match Config::load_from_path(config_path) {
        Ok(config) => diagnostics.extend(validate::validate_resources(&config)),
        Err(e) => bail!("Cannot load config: {}", e),
    }

    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    let warnings = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warn)
        .count();

    if errors == 0 && warnings == 0 {
        println!("\nConfiguration looks good!");
    } else {
        println!("\nFound {} error(s), {} warning(s)", errors, warnings);
    }
    if errors > 0 {
        bail!("Configuration has errors");
    }
    Ok(())
}
