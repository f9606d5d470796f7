//! Main Orchestrator struct and the wave-by-wave control loop

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::fs::{RunLock, StateStore, WorkDir, WORK_DIR_NAME};
use crate::git::checkout_paths;
use crate::models::{FailureReason, IssueDescriptor, RunState, RunStatus, WorktreeState};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::merge_coordinator::{CoordinatorConfig, LeakDetector, MergeCoordinator};
use crate::orchestrator::report::RunSummary;
use crate::orchestrator::worker::{CancelToken, WorkerTask};
use crate::orchestrator::worktree_manager::WorktreeManager;
use crate::plan::{schedule, DependencyGraph, WavePlan};

use super::event_handler::EventHandler;
use super::events::IssueEvent;
use super::executor::{spawn_issue, IssueContext, LaunchMode};
use super::persistence::Persistence;
use super::recovery::load_or_init;

/// How long to keep collecting events after the merge lock goes idle
const DRAIN_WAIT: Duration = Duration::from_millis(250);

/// Drives one sprint run
pub struct Orchestrator {
    pub(super) config: OrchestratorConfig,
    pub(super) issues: BTreeMap<String, IssueDescriptor>,
    pub(super) graph: DependencyGraph,
    pub(super) plan: WavePlan,
    pub(super) state: RunState,
    pub(super) store: StateStore,
    pub(super) worktrees: WorktreeManager,
    pub(super) coordinator: Arc<MergeCoordinator>,
    pub(super) worker: Arc<dyn WorkerTask>,
    pub(super) cancel: CancelToken,
    /// Issues with a live thread, keyed by id, holding their cancel token
    pub(super) in_flight: BTreeMap<String, CancelToken>,
    _run_lock: RunLock,
}

impl Orchestrator {
    /// Build the graph, take the run lock, and load or create RunState.
    ///
    /// Fails before touching any worktree on a dependency cycle or when
    /// another run holds the lock.
    pub fn new(
        config: OrchestratorConfig,
        issues: Vec<IssueDescriptor>,
        worker: Arc<dyn WorkerTask>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let graph = DependencyGraph::build(&issues, config.conflict_threshold)?;
        let plan = schedule(&graph, config.p0_sequential);

        let work_dir = WorkDir::new(&config.repo_root);
        work_dir.ensure()?;
        let run_lock = RunLock::try_acquire(&work_dir.run_lock_file())?;

        let store = StateStore::new(work_dir.state_file());
        let state = load_or_init(
            &store,
            &config.repo_root,
            &config.sprint_name,
            &config.target_branch,
            &graph,
        )
        .context("Failed to load run state")?;

        let worktrees = WorktreeManager::new(
            &config.repo_root,
            &config.worktree_root_abs(),
            config.copy_files.clone(),
        );

        let baseline = checkout_paths(&config.repo_root)
            .context("Failed to snapshot main checkout status")?;
        let ignored = vec![
            relative_to_repo(&config, worktrees.root()),
            WORK_DIR_NAME.to_string(),
        ];
        let coordinator = MergeCoordinator::new(
            CoordinatorConfig {
                repo_root: config.repo_root.clone(),
                lock_path: work_dir.merge_lock_file(),
                target_branch: config.target_branch.clone(),
                style: config.merge_style,
                max_retries: config.max_merge_retries,
                retry_backoff: config.merge_retry_backoff,
            },
            LeakDetector::new(baseline, ignored),
        );

        Ok(Self {
            issues: issues.into_iter().map(|i| (i.id.clone(), i)).collect(),
            graph,
            plan,
            state,
            store,
            worktrees,
            coordinator: Arc::new(coordinator),
            worker,
            cancel,
            in_flight: BTreeMap::new(),
            _run_lock: run_lock,
            config,
        })
    }

    pub fn plan(&self) -> &WavePlan {
        &self.plan
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn coordinator(&self) -> &MergeCoordinator {
        &self.coordinator
    }

    /// Execute every wave, then release all worktrees.
    ///
    /// Worktrees are cleaned up even when the loop itself errors.
    pub fn run(&mut self) -> Result<RunSummary> {
        info!(
            sprint = %self.config.sprint_name,
            waves = self.plan.len(),
            issues = self.graph.len(),
            max_workers = self.config.max_workers,
            "Starting run"
        );
        self.persist()?;

        let started = Instant::now();
        let result = self.run_waves();
        let leftover = self.finish();

        result?;
        let summary = RunSummary::from_state(
            &self.state,
            &self.plan,
            self.cancel.is_cancelled(),
            leftover,
            started.elapsed(),
        );
        info!(
            completed = summary.counts.completed,
            failed = summary.counts.failed,
            abandoned = summary.counts.abandoned,
            "Run finished"
        );
        Ok(summary)
    }

    fn run_waves(&mut self) -> Result<()> {
        let waves = self.plan.waves.clone();
        for (index, wave) in waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(wave = index, "Cancelled; not starting remaining waves");
                break;
            }
            self.run_wave(index, wave)?;

            let pending = self.worktrees.reap();
            if pending > 0 {
                warn!(wave = index, pending, "Some worktree releases are still failing");
            }
        }
        Ok(())
    }

    /// Run one wave to completion: every member reaches a terminal state
    /// (or the run is cancelled) before this returns.
    fn run_wave(&mut self, index: usize, wave: &[String]) -> Result<()> {
        info!(wave = index, issues = ?wave, "Starting wave");

        let mut queue = VecDeque::new();
        for issue_id in wave {
            if let Some(mode) = self.prepare(index, issue_id)? {
                queue.push_back((issue_id.clone(), mode));
            }
        }

        let (tx, rx) = mpsc::channel();
        let mut cancel_deadline: Option<Instant> = None;

        loop {
            if cancel_deadline.is_none() && self.cancel.is_cancelled() {
                warn!(
                    wave = index,
                    in_flight = self.in_flight.len(),
                    grace_secs = self.config.cancel_grace.as_secs(),
                    "Cancellation requested; waiting for in-flight issues"
                );
                cancel_deadline = Some(Instant::now() + self.config.cancel_grace);
            }

            if cancel_deadline.is_none() {
                while self.in_flight.len() < self.config.max_workers {
                    let Some((issue_id, mode)) = queue.pop_front() else {
                        break;
                    };
                    self.launch(index, &issue_id, mode, &tx)?;
                }
            }

            if self.in_flight.is_empty() {
                break;
            }

            match rx.recv_timeout(self.config.poll_interval) {
                Ok(event) => self.handle_event(event)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if cancel_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.cancel_in_flight(&rx)?;
                break;
            }
        }

        debug!(wave = index, "Wave drained");
        Ok(())
    }

    /// Decide whether an issue launches in this wave
    fn prepare(&mut self, index: usize, issue_id: &str) -> Result<Option<LaunchMode>> {
        let Some(status) = self.state.status_of(issue_id) else {
            return Ok(None);
        };

        match status {
            RunStatus::Completed | RunStatus::Failed | RunStatus::Abandoned => {
                debug!(issue_id, %status, "Already terminal, skipping");
                Ok(None)
            }
            RunStatus::AwaitingMerge | RunStatus::Merging => {
                self.update_record(issue_id, |record| {
                    record.wave = Some(index);
                    if record.status == RunStatus::Merging {
                        record.transition_to(RunStatus::AwaitingMerge)?;
                    }
                    Ok(())
                })?;
                Ok(Some(LaunchMode::MergeOnly))
            }
            RunStatus::Pending | RunStatus::Scheduled | RunStatus::Running => {
                let blocker = self
                    .graph
                    .dependencies(issue_id)
                    .into_iter()
                    .find(|dep| self.state.status_of(dep) != Some(RunStatus::Completed))
                    .map(str::to_string);

                if let Some(dependency) = blocker {
                    info!(issue_id, dependency = %dependency, "Abandoned");
                    self.update_record(issue_id, |record| {
                        if record.status == RunStatus::Running {
                            record.reset_interrupted();
                        }
                        record.abandon(&dependency)
                    })?;
                    return Ok(None);
                }

                self.update_record(issue_id, |record| {
                    if record.status == RunStatus::Running {
                        record.reset_interrupted();
                    }
                    record.wave = Some(index);
                    if record.status == RunStatus::Pending {
                        record.transition_to(RunStatus::Scheduled)?;
                    }
                    Ok(())
                })?;
                Ok(Some(LaunchMode::Full))
            }
        }
    }

    /// Provision (or adopt) the worktree and start the issue thread
    fn launch(
        &mut self,
        index: usize,
        issue_id: &str,
        mode: LaunchMode,
        tx: &Sender<IssueEvent>,
    ) -> Result<()> {
        let Some(issue) = self.issues.get(issue_id).cloned() else {
            return Ok(());
        };

        let provisioned = match mode {
            LaunchMode::Full => self.worktrees.provision(issue_id, &self.config.target_branch),
            LaunchMode::MergeOnly => self.worktrees.adopt(issue_id),
        };
        let handle = match provisioned {
            Ok(handle) => handle,
            Err(e) => {
                error!(issue_id, wave = index, "{e}");
                return self.fail_issue(
                    issue_id,
                    FailureReason::WorktreeCreation {
                        message: e.to_string(),
                    },
                );
            }
        };

        let path = handle.path.clone();
        self.update_record(issue_id, |record| {
            if mode == LaunchMode::Full {
                record.transition_to(RunStatus::Running)?;
            }
            record.worktree = Some(path);
            Ok(())
        })?;
        self.worktrees.mark(issue_id, WorktreeState::InUse);

        let token = CancelToken::new();
        let ctx = IssueContext {
            issue,
            handle,
            mode,
            worker: Arc::clone(&self.worker),
            coordinator: Arc::clone(&self.coordinator),
            token: token.clone(),
            timeout: self.config.timeout_per_issue,
            commit_exclusions: self.config.copy_files.clone(),
            events: tx.clone(),
        };

        match spawn_issue(ctx) {
            Ok(_) => {
                info!(issue_id, wave = index, ?mode, "Launched");
                self.in_flight.insert(issue_id.to_string(), token);
                Ok(())
            }
            Err(e) => {
                self.worktrees.release(issue_id);
                self.fail_issue(
                    issue_id,
                    FailureReason::WorkerFailure {
                        reason: format!("failed to start issue thread: {e}"),
                    },
                )
            }
        }
    }

    /// Grace period expired: stop accepting merges, cancel every issue still
    /// in flight, let the current merge finish, collect what reported in,
    /// and fail the rest as cancelled.
    fn cancel_in_flight(&mut self, rx: &Receiver<IssueEvent>) -> Result<()> {
        warn!(in_flight = self.in_flight.len(), "Grace period over; cancelling workers");
        self.coordinator.begin_shutdown();
        for token in self.in_flight.values() {
            token.cancel();
        }
        self.coordinator.wait_idle();
        while let Ok(event) = rx.recv_timeout(DRAIN_WAIT) {
            self.handle_event(event)?;
            if self.in_flight.is_empty() {
                break;
            }
        }

        let remaining: Vec<String> = std::mem::take(&mut self.in_flight).into_keys().collect();
        for issue_id in remaining {
            self.fail_issue(&issue_id, FailureReason::Cancelled)?;
            self.worktrees.release(&issue_id);
        }
        Ok(())
    }

    /// Release everything and make sure no worktree outlives the run.
    ///
    /// Returns the number of worktree directories that could not be removed.
    fn finish(&mut self) -> usize {
        let pending = self.worktrees.release_all();
        if pending > 0 {
            warn!(pending, "Worktree releases still failing after reaping");
        }

        // Issues that may resume later keep their branches
        let release_branches: BTreeSet<String> = self
            .state
            .records
            .values()
            .filter(|r| !r.has_pending_merge())
            .map(|r| r.issue_id.clone())
            .collect();
        if let Err(e) = self.worktrees.sweep_directories(&release_branches) {
            error!(error = %format!("{e:#}"), "Final worktree sweep failed");
        }

        for record in self.state.records.values_mut() {
            record.worktree = None;
        }
        if let Err(e) = self.persist() {
            error!(error = %format!("{e:#}"), "Failed to persist final run state");
        }

        self.worktrees.directories_on_disk().map_or(0, |dirs| dirs.len())
    }
}

fn relative_to_repo(config: &OrchestratorConfig, path: &std::path::Path) -> String {
    path.strip_prefix(&config.repo_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
