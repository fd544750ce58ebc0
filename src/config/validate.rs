//! Configuration validation with unknown field detection.
//!
//! Two passes: [`validate_config`] checks field names on the raw document,
//! [`validate_resources`] checks the typed declarations (dependencies,
//! commands, health checks, cycles).

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::adapters::HealthCheck;
use crate::orchestrator::DependencyGraph;
use crate::resource::ResourceKind;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["logging", "orchestrator", "resources"];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

const KNOWN_ORCHESTRATOR: &[&str] = &["probe", "logs_dir", "stop_timeout_secs"];

const KNOWN_PROBE: &[&str] = &[
    "interval_ms",
    "max_interval_ms",
    "backoff",
    "factor",
    "timeout_secs",
];

const KNOWN_RESOURCE: &[&str] = &[
    "id",
    "kind",
    "depends_on",
    "command",
    "args",
    "working_dir",
    "env",
    "health",
    "exports",
    "probe",
    "allow_failure",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: message.into(),
        }
    }

    fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.into(),
            message: message.into(),
        }
    }

    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// True when any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Error)
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Suggest the closest known name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::error(path, message)
}

/// Report keys of `obj` that are not in `known`. Returns true if any were found.
fn check_keys(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found = false;
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            found = true;
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            diagnostics.push(unknown_field(path, key, known));
        }
    }
    found
}

/// Validate a raw config document against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::error("", "Config must be a table/object"));
        return diagnostics;
    };
    diagnostics.push(Diagnostic::ok("Config parsed"));

    let mut has_unknown = check_keys(obj, "", KNOWN_TOP_LEVEL, &mut diagnostics);

    if let Some(logging) = obj.get("logging").and_then(Value::as_object) {
        has_unknown |= check_keys(logging, "logging", KNOWN_LOGGING, &mut diagnostics);
    }

    if let Some(orch) = obj.get("orchestrator").and_then(Value::as_object) {
        has_unknown |= check_keys(orch, "orchestrator", KNOWN_ORCHESTRATOR, &mut diagnostics);
        if let Some(probe) = orch.get("probe").and_then(Value::as_object) {
            has_unknown |= check_keys(probe, "orchestrator.probe", KNOWN_PROBE, &mut diagnostics);
        }
    }

    if let Some(resources) = obj.get("resources").and_then(Value::as_array) {
        for (i, resource) in resources.iter().enumerate() {
            let Some(resource) = resource.as_object() else {
                diagnostics.push(Diagnostic::error(
                    format!("resources[{}]", i),
                    "Resource must be a table/object",
                ));
                continue;
            };
            let prefix = format!("resources[{}]", i);
            has_unknown |= check_keys(resource, &prefix, KNOWN_RESOURCE, &mut diagnostics);
            if let Some(probe) = resource.get("probe").and_then(Value::as_object) {
                has_unknown |= check_keys(
                    probe,
                    &format!("{}.probe", prefix),
                    KNOWN_PROBE,
                    &mut diagnostics,
                );
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::ok("All fields recognized"));
    }

    diagnostics
}

/// Validate the typed resource declarations.
pub fn validate_resources(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.resources.is_empty() {
        diagnostics.push(Diagnostic::warn("resources", "No resources declared"));
        return diagnostics;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, decl) in config.resources.iter().enumerate() {
        if let Some(first) = seen.insert(decl.id.as_str(), i) {
            diagnostics.push(Diagnostic::error(
                format!("resources[{}].id", i),
                format!("Duplicate id '{}' (first declared at resources[{}])", decl.id, first),
            ));
        }
    }
    let ids: Vec<&str> = config.resources.iter().map(|r| r.id.as_str()).collect();

    for (i, decl) in config.resources.iter().enumerate() {
        let path = format!("resources[{}]", i);

        if decl.id.trim().is_empty() {
            diagnostics.push(Diagnostic::error(format!("{}.id", path), "Id must not be empty"));
        }

        for dep in &decl.depends_on {
            if !seen.contains_key(dep.as_str()) {
                let message = match suggest_field(dep, &ids) {
                    Some(suggestion) => format!("Unknown dependency '{}' ({})", dep, suggestion),
                    None => format!("Unknown dependency '{}'", dep),
                };
                diagnostics.push(Diagnostic::error(format!("{}.depends_on", path), message));
            }
        }

        match decl.kind {
            ResourceKind::OneShotJob => {
                if decl.command.trim().is_empty() {
                    diagnostics.push(Diagnostic::error(
                        format!("{}.command", path),
                        format!("One-shot job '{}' needs a command", decl.id),
                    ));
                }
                if decl.health != HealthCheck::None {
                    diagnostics.push(Diagnostic::warn(
                        format!("{}.health", path),
                        "Ignored for one-shot jobs; a job is done when it exits",
                    ));
                }
                if !decl.exports.is_empty() {
                    diagnostics.push(Diagnostic::warn(
                        format!("{}.exports", path),
                        "One-shot jobs never become Ready; exports are not published",
                    ));
                }
            }
            ResourceKind::LongRunningService => {
                if decl.command.trim().is_empty() && decl.health == HealthCheck::None {
                    diagnostics.push(Diagnostic::warn(
                        format!("{}.health", path),
                        format!(
                            "Service '{}' has no command and no health check; it will be Ready immediately",
                            decl.id
                        ),
                    ));
                }
            }
        }

        if let Some(timeout) = decl.probe.as_ref().and_then(|p| p.timeout_secs) {
            if timeout == 0 {
                diagnostics.push(Diagnostic::warn(
                    format!("{}.probe.timeout_secs", path),
                    "A zero timeout fails the resource on its first poll",
                ));
            }
        }
    }

    // Cycles only make sense to report once the ids themselves are sound.
    if !has_errors(&diagnostics) {
        match config.registry().and_then(|r| DependencyGraph::build(&r)) {
            Ok(graph) => diagnostics.push(Diagnostic::ok(format!(
                "{} resources, {} startup waves",
                graph.len(),
                graph.waves().len()
            ))),
            Err(e) => diagnostics.push(Diagnostic::error("resources", e.to_string())),
        }
    }

    diagnostics
}
