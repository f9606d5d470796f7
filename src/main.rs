use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use weave::commands::{plan, run, status, sweep};

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Run a sprint of issues in parallel git worktrees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a sprint: work every issue and merge the results
    Run {
        /// Path to the sprint file
        sprint: PathBuf,

        /// Maximum concurrent workers (overrides the sprint file)
        #[arg(short = 'w', long, value_parser = clap::value_parser!(u32).range(1..))]
        max_workers: Option<u32>,

        /// Print the plan and exit without creating worktrees
        #[arg(long)]
        dry_run: bool,
    },

    /// Show waves and dependency edges for a sprint
    Plan {
        /// Path to the sprint file
        sprint: PathBuf,
    },

    /// Remove worktrees left behind by an interrupted run
    Sweep {
        /// Also remove worktrees of unfinished issues
        #[arg(short, long)]
        force: bool,

        /// Worktree root (default: .worktrees)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Show the saved run state
    Status,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("WEAVE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            sprint,
            max_workers,
            dry_run,
        } => run::execute(&sprint, max_workers.map(|n| n as usize), dry_run),
        Commands::Plan { sprint } => plan::execute(&sprint).map(|()| true),
        Commands::Sweep { force, root } => sweep::execute(force, root).map(|()| true),
        Commands::Status => status::execute().map(|()| true),
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match dispatch(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
