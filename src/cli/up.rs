//! `up` and `plan` command handlers.

use std::path::Path;

use anyhow::{bail, Context, Result};

use devhost::orchestrator::{Cancellation, DependencyGraph, Session};
use devhost::resource::ResourceState;

use super::common::{adapters, cancel_on_ctrl_c, load_config};

/// Start the environment, print the outcome, then keep services running
/// until Ctrl-C (or exit right away with `--once`).
pub(crate) async fn cmd_up(config_path: &Path, dry_run: bool, once: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = config
        .registry()
        .context("Invalid resource declarations")?;
    let mut session = Session::new(registry, adapters(dry_run), config.session_options())
        .context("Cannot build the dependency graph")?;

    if dry_run {
        println!("Dry run: no processes will be started.");
    }
    println!(
        "Starting {} resource(s) in {} wave(s)...",
        session.registry().len(),
        session.graph().waves().len()
    );

    let stop = Cancellation::new();
    cancel_on_ctrl_c(vec![session.cancellation(), stop.clone()]);

    let result = session.run().await;
    println!();
    print!("{}", result.summary());
    print_exports(&session);

    if !result.is_success() {
        session.shutdown().await;
        let failed = result.failed().len();
        if result.cancelled {
            bail!("Startup cancelled");
        }
        bail!("{} resource(s) failed to start", failed);
    }

    let mut crashed = Vec::new();
    if !once && !session.live_services().is_empty() {
        println!();
        println!(
            "{} service(s) running. Press Ctrl-C to stop.",
            session.live_services().len()
        );
        crashed = session.supervise(&stop).await;
    }

    let stopped = session.shutdown().await;
    if !stopped.is_empty() {
        println!("Stopped {} service(s).", stopped.len());
    }
    if !crashed.is_empty() {
        let names: Vec<&str> = crashed.iter().map(|id| id.as_str()).collect();
        bail!("Service(s) exited while running: {}", names.join(", "));
    }
    Ok(())
}

fn print_exports(session: &Session) {
    let ready: Vec<_> = session
        .board()
        .snapshots()
        .into_iter()
        .filter(|s| s.state == ResourceState::Ready && !s.exports.is_empty())
        .collect();
    if ready.is_empty() {
        return;
    }
    println!();
    println!("Exports:");
    for snap in ready {
        for (key, value) in &snap.exports {
            println!("  {}.{} = {}", snap.id, key, value);
        }
    }
}

/// Print the startup waves.
pub(crate) fn cmd_plan(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = config
        .registry()
        .context("Invalid resource declarations")?;
    let graph = DependencyGraph::build(&registry).context("Cannot build the dependency graph")?;

    for (i, wave) in graph.waves().iter().enumerate() {
        println!("Wave {}:", i + 1);
        for id in wave {
            let Some(spec) = registry.get(id) else {
                continue;
            };
            let deps: Vec<&str> = graph.dependencies(id).iter().map(|d| d.as_str()).collect();
            if deps.is_empty() {
                println!("  {} ({})", id, spec.kind);
            } else {
                println!("  {} ({}) <- {}", id, spec.kind, deps.join(", "));
            }
        }
    }
    Ok(())
}
