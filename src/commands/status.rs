//! `weave status`: show the persisted run state

use anyhow::Result;
use colored::Colorize;

use crate::fs::{RunLock, StateStore, WorkDir};
use crate::orchestrator::report::format_status;

use super::common::current_repo_root;

pub fn execute() -> Result<()> {
    let repo_root = current_repo_root()?;
    let work_dir = WorkDir::new(&repo_root);
    let store = StateStore::new(work_dir.state_file());

    let Some(state) = store.load()? else {
        println!("{}", "No run state found. Start one with `weave run <sprint.toml>`.".dimmed());
        return Ok(());
    };

    let running = RunLock::is_held(&work_dir.run_lock_file());
    println!(
        "{} {} into {}{}",
        "Sprint:".bold(),
        state.sprint.bold().blue(),
        state.target_branch.cyan(),
        if running {
            format!(" {}", "(run in progress)".yellow())
        } else {
            String::new()
        }
    );
    println!(
        "  started {}, updated {}",
        state.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}", "=".repeat(50));

    let mut records: Vec<_> = state.records.values().collect();
    records.sort_by(|a, b| a.wave.cmp(&b.wave).then_with(|| a.issue_id.cmp(&b.issue_id)));

    for record in records {
        let wave = record
            .wave
            .map_or_else(|| "-".to_string(), |w| w.to_string());
        println!(
            "  {:<4} {:<24} {}",
            wave.dimmed(),
            record.issue_id,
            format_status(record.status)
        );
        if let Some(merge) = &record.merge_result {
            println!(
                "       merge {} ({} file(s), {} retr{})",
                merge.outcome,
                merge.files_changed.len(),
                merge.retry_count,
                if merge.retry_count == 1 { "y" } else { "ies" }
            );
        }
        if let Some(failure) = &record.failure {
            println!("       {}", failure.to_string().red());
        }
    }

    let counts = state.counts();
    println!(
        "\n  {} completed, {} failed, {} abandoned, {} in flight, {} pending",
        counts.completed.to_string().green(),
        counts.failed.to_string().red(),
        counts.abandoned.to_string().yellow(),
        counts.in_flight,
        counts.pending
    );
    Ok(())
}
