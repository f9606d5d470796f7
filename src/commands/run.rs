//! `weave run`: execute a sprint

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::error::OrchestratorError;
use crate::orchestrator::{CancelToken, CommandWorker, Orchestrator};

use super::common::SprintContext;

/// Run the sprint; returns `false` when any issue ended Failed
pub fn execute(sprint_path: &Path, max_workers: Option<usize>, dry_run: bool) -> Result<bool> {
    if dry_run {
        super::plan::execute(sprint_path)?;
        return Ok(true);
    }

    let ctx = SprintContext::load(sprint_path)?;
    let Some(worker_config) = ctx.definition.worker.clone() else {
        return Err(OrchestratorError::InvalidConfig(vec![
            "[worker] command is required to run a sprint".to_string(),
        ])
        .into());
    };
    let worker = CommandWorker::new(worker_config.command).with_env(worker_config.env);

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    let config = ctx.orchestrator_config(max_workers);
    let mut orchestrator = Orchestrator::new(config, ctx.issues, Arc::new(worker), cancel)
        .context("Failed to start run")?;

    println!(
        "{} {} in {} wave(s)",
        "Running".bold(),
        ctx.definition.sprint.name.bold().blue(),
        orchestrator.plan().len()
    );

    let summary = orchestrator.run()?;
    summary.print();
    Ok(!summary.has_failures())
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            eprintln!(
                "\n{} finishing in-flight work (press again to keep waiting)",
                "Cancelling:".yellow().bold()
            );
        }
        token.cancel();
    });
    if let Err(e) = installed {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }
}
