//! Configuration management for devhost
//!
//! Configuration is loaded from `./devhost.toml` (or any `*.json` file) with
//! environment variable overrides. There is no global instance; the loaded
//! [`Config`] is handed to whatever needs it.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::ResourceConfig;
use crate::error::{DevhostError, Result};
use crate::orchestrator::SessionOptions;
use crate::resource::{ResourceRegistry, ResourceSpec};

/// On-disk syntax of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// JSON for `*.json`, TOML for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl Config {
    /// `./devhost.toml`
    pub fn default_path() -> PathBuf {
        PathBuf::from("devhost.toml")
    }

    /// Load configuration from a file with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DevhostError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content, ConfigFormat::from_path(path))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse config text without touching the environment.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        Ok(match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        })
    }

    /// The file as an untyped JSON value, for field-level validation.
    pub fn load_raw(path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => {
                let value: toml::Value = toml::from_str(&content)?;
                serde_json::to_value(value)?
            }
        })
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern `DEVHOST_<SECTION>_<KEY>`.
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DEVHOST_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("DEVHOST_LOG_FORMAT") {
            if let Ok(v) = val.parse() {
                self.logging.format = v;
            }
        }
        if let Ok(val) = std::env::var("DEVHOST_PROBE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.orchestrator.probe.timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("DEVHOST_PROBE_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.orchestrator.probe.interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("DEVHOST_LOGS_DIR") {
            self.orchestrator.logs_dir = PathBuf::from(val);
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Turn the declarations into a registry. Fails on a duplicate id;
    /// unknown dependencies are reported when the graph is built.
    pub fn registry(&self) -> Result<ResourceRegistry> {
        let mut registry = ResourceRegistry::new();
        for decl in &self.resources {
            registry.register_resource(self.resource_spec(decl))?;
        }
        Ok(registry)
    }

    fn resource_spec(&self, decl: &ResourceDecl) -> ResourceSpec {
        let config = ResourceConfig {
            command: decl.command.clone(),
            args: decl.args.clone(),
            working_dir: decl.working_dir.as_deref().map(|dir| self.resolve(dir)),
            env: decl.env.clone(),
            health: decl.health.clone(),
            exports: decl.exports.clone(),
        };
        let mut spec = ResourceSpec::new(decl.id.as_str(), decl.kind)
            .depends_on(decl.depends_on.iter().map(String::as_str))
            .with_config(config)
            .allow_failure(decl.allow_failure);
        if let Some(probe) = &decl.probe {
            spec = spec.with_probe(probe.apply(&self.orchestrator.probe).to_policy());
        }
        spec
    }

    /// Session options from the `[orchestrator]` section.
    pub fn session_options(&self) -> SessionOptions {
        let logs_dir = &self.orchestrator.logs_dir;
        SessionOptions {
            probe: self.orchestrator.probe.to_policy(),
            logs_dir: (!logs_dir.as_os_str().is_empty()).then(|| self.resolve(logs_dir)),
            stop_timeout: Duration::from_secs(self.orchestrator.stop_timeout_secs),
        }
    }
}
