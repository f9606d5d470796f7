//! End-of-run summary

use colored::Colorize;
use std::time::Duration;

use crate::models::{FailureReason, RunState, RunStatus, StatusCounts};
use crate::plan::WavePlan;

/// One issue's line in the summary
#[derive(Debug, Clone)]
pub struct IssueSummary {
    pub issue_id: String,
    pub wave: Option<usize>,
    pub status: RunStatus,
    pub failure: Option<FailureReason>,
    pub files_changed: usize,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub sprint: String,
    pub waves: usize,
    pub counts: StatusCounts,
    pub issues: Vec<IssueSummary>,
    pub cancelled: bool,
    /// Worktree directories still on disk after cleanup
    pub leftover_worktrees: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_state(
        state: &RunState,
        plan: &WavePlan,
        cancelled: bool,
        leftover_worktrees: usize,
        elapsed: Duration,
    ) -> Self {
        let mut issues: Vec<IssueSummary> = state
            .records
            .values()
            .map(|record| IssueSummary {
                issue_id: record.issue_id.clone(),
                wave: record.wave.or_else(|| plan.wave_of(&record.issue_id)),
                status: record.status,
                failure: record.failure.clone(),
                files_changed: record
                    .merge_result
                    .as_ref()
                    .map_or(0, |m| m.files_changed.len()),
                retries: record.merge_result.as_ref().map_or(0, |m| m.retry_count),
            })
            .collect();
        issues.sort_by(|a, b| a.wave.cmp(&b.wave).then_with(|| a.issue_id.cmp(&b.issue_id)));

        Self {
            sprint: state.sprint.clone(),
            waves: plan.len(),
            counts: state.counts(),
            issues,
            cancelled,
            leftover_worktrees,
            elapsed,
        }
    }

    /// Any issue ended Failed
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn print(&self) {
        println!();
        println!("{} {}", "Run summary:".bold(), self.sprint.bold().blue());
        println!("{}", "=".repeat(50));

        for issue in &self.issues {
            let wave = issue
                .wave
                .map_or_else(|| "-".to_string(), |w| w.to_string());
            println!(
                "  {:<4} {:<24} {}{}",
                wave.dimmed(),
                issue.issue_id,
                format_status(issue.status),
                format_detail(issue)
            );
            if let Some(failure) = &issue.failure {
                println!("       {} {}", "↳".dimmed(), failure.to_string().dimmed());
            }
        }

        println!();
        println!(
            "  {} completed, {} failed, {} abandoned, {} not run ({} waves, {:.1}s)",
            self.counts.completed.to_string().green(),
            self.counts.failed.to_string().red(),
            self.counts.abandoned.to_string().yellow(),
            self.counts.pending + self.counts.in_flight,
            self.waves,
            self.elapsed.as_secs_f64()
        );
        if self.cancelled {
            println!("  {}", "Run was cancelled; rerun to resume.".yellow());
        }
        if self.leftover_worktrees > 0 {
            println!(
                "  {} {} worktree director{} left behind; run `weave sweep`",
                "Warning:".yellow().bold(),
                self.leftover_worktrees,
                if self.leftover_worktrees == 1 { "y" } else { "ies" }
            );
        }
    }
}

pub fn format_status(status: RunStatus) -> colored::ColoredString {
    let label = format!("{:<14}", status.to_string());
    match status {
        RunStatus::Completed => label.green(),
        RunStatus::Failed => label.red().bold(),
        RunStatus::Abandoned => label.yellow(),
        RunStatus::Running | RunStatus::AwaitingMerge | RunStatus::Merging => label.cyan(),
        RunStatus::Pending | RunStatus::Scheduled => label.normal(),
    }
}

fn format_detail(issue: &IssueSummary) -> String {
    if issue.status != RunStatus::Completed {
        return String::new();
    }
    match issue.retries {
        0 => format!(" {} file(s)", issue.files_changed),
        n => format!(" {} file(s), {n} retry(ies)", issue.files_changed),
    }
}
