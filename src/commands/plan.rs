//! `weave plan`: show waves and dependency edges without touching anything

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::models::Priority;
use crate::plan::{schedule, DependencyGraph, EdgeKind, WavePlan};

use super::common::SprintContext;

pub fn execute(sprint_path: &Path) -> Result<()> {
    let ctx = SprintContext::load(sprint_path)?;
    let options = &ctx.definition.options;

    let graph = DependencyGraph::build(&ctx.issues, options.conflict_threshold)?;
    let plan = schedule(&graph, options.p0_sequential);

    println!(
        "{} {} ({} issues into {})",
        "Sprint:".bold(),
        ctx.definition.sprint.name.bold().blue(),
        graph.len(),
        ctx.target_branch.cyan()
    );
    print_edges(&graph);
    print_waves(&graph, &plan);
    println!(
        "\n{}",
        format!(
            "Dry run: no worktrees created. Up to {} workers per wave.",
            options.max_workers
        )
        .dimmed()
    );
    Ok(())
}

fn print_edges(graph: &DependencyGraph) {
    println!("\n{}", "Dependencies".bold());
    if graph.edges().is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for edge in graph.edges() {
        match &edge.kind {
            EdgeKind::Declared => {
                println!("  {} waits on {}", edge.issue, edge.blocker);
            }
            EdgeKind::Inferred {
                score,
                shared_files,
            } => {
                println!(
                    "  {} waits on {} {}",
                    edge.issue,
                    edge.blocker,
                    format!("(inferred, score {score:.2}: {})", shared_files.join(", ")).yellow()
                );
            }
        }
    }
    for dropped in graph.dropped_blockers() {
        println!(
            "  {} {} names unknown blocker {}",
            "ignored:".yellow(),
            dropped.issue,
            dropped.blocker
        );
    }
}

fn print_waves(graph: &DependencyGraph, plan: &WavePlan) {
    println!("\n{}", "Waves".bold());
    for (index, wave) in plan.iter().enumerate() {
        let members: Vec<String> = wave
            .iter()
            .map(|id| match graph.priority(id) {
                Some(Priority::P0) => format!("{id} {}", "[P0]".red()),
                _ => id.clone(),
            })
            .collect();
        println!("  {} {}", format!("{index}:").dimmed(), members.join(", "));
    }
}
