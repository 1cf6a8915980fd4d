//! Batch runner for bounded parallel task execution.
//!
//! Drains the scheduler's ready set through a pool of at most
//! `max_concurrent_tasks` workers. Each claimed task runs in its own
//! workspace against one agent execution, gated by the hygiene verifier and
//! the drift detector at the start and the end of the implementation phase.
//! A failed task never fails the batch.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BatchRebaseReport, Config, ExecutionResult, RebaseThresholds, Task, TaskStatus, TimeoutConfig,
};
use crate::domain::ports::{transcript_text, AgentRuntime, ExecutionHandle, ExecutionStatus};
use crate::services::backlog_scheduler::BacklogScheduler;
use crate::services::drift_detector::DriftDetector;
use crate::services::hygiene_verifier::{HygieneVerifier, IMPLEMENTATION_PHASE};
use crate::services::rebase_engine;
use crate::services::shutdown::ShutdownCoordinator;
use crate::services::spec_store::SpecStore;
use crate::services::task_classifier;
use crate::services::workspace_manager::WorkspaceManager;

/// Phase name of the gate applied to the prompt before dispatch.
pub const START_PHASE: &str = "implementation:start";

/// Phase name of the gate applied to the finished transcript.
pub const END_PHASE: &str = "implementation:end";

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub attempts: u32,
    pub duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    /// Spec version written for a recommended rebase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebase_spec_version: Option<u32>,
}

/// Result of a whole batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<TaskOutcome>,
    pub rebase: BatchRebaseReport,
    /// Tasks that can never run because a dependency failed
    pub blocked: Vec<String>,
    /// Shutdown was requested before the ready set was drained
    pub interrupted: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

type Worker = BoxFuture<'static, (String, Result<(TaskOutcome, ExecutionResult), tokio::task::JoinError>)>;

/// Everything a worker needs, cloned into each spawned attempt.
#[derive(Clone)]
struct RunContext {
    scheduler: Arc<Mutex<BacklogScheduler>>,
    workspaces: Arc<WorkspaceManager>,
    runtime: Arc<dyn AgentRuntime>,
    verifier: Arc<HygieneVerifier>,
    drift: Arc<Mutex<DriftDetector>>,
    specs: Arc<SpecStore>,
    timeouts: TimeoutConfig,
    shutdown: Option<Arc<ShutdownCoordinator>>,
}

/// What an attempt observed, kept even when it fails part way.
#[derive(Debug, Default)]
struct AttemptTrace {
    context_size_bytes: usize,
    log: String,
    commit_count: u32,
    merge_commit: Option<String>,
}

/// Bounded-parallel executor over a backlog.
pub struct BatchRunner {
    ctx: RunContext,
    max_concurrent_tasks: usize,
    thresholds: RebaseThresholds,
}

impl BatchRunner {
    pub fn new(
        config: &Config,
        scheduler: Arc<Mutex<BacklogScheduler>>,
        workspaces: Arc<WorkspaceManager>,
        runtime: Arc<dyn AgentRuntime>,
        specs: Arc<SpecStore>,
    ) -> DomainResult<Self> {
        let ctx = RunContext {
            scheduler,
            workspaces,
            runtime,
            verifier: Arc::new(HygieneVerifier::new(&config.context)?),
            drift: Arc::new(Mutex::new(DriftDetector::new(&config.drift))),
            specs,
            timeouts: config.timeouts.clone(),
            shutdown: None,
        };
        Ok(Self {
            ctx,
            max_concurrent_tasks: config.max_concurrent_tasks.max(1),
            thresholds: config.rebase.clone(),
        })
    }

    /// Stop claiming new work once shutdown starts, and release live
    /// agent executions on shutdown.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.ctx.shutdown = Some(shutdown);
        self
    }

    /// Run until no task is ready and nothing is in flight.
    #[instrument(skip(self), fields(max_concurrent = self.max_concurrent_tasks))]
    pub async fn run(&self) -> DomainResult<BatchReport> {
        self.ctx.drift.lock().await.reset();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let mut in_flight: FuturesUnordered<Worker> = FuturesUnordered::new();
        let mut results: Vec<ExecutionResult> = Vec::new();
        let mut report = BatchReport::default();

        loop {
            if self.shutting_down() {
                report.interrupted = true;
            } else {
                self.dispatch_ready(&semaphore, &mut in_flight).await?;
            }

            let Some((task_id, joined)) = in_flight.next().await else {
                break;
            };
            match joined {
                Ok((outcome, result)) => {
                    report.outcomes.push(outcome);
                    results.push(result);
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task worker panicked");
                    self.ctx.workspaces.cleanup(&task_id).await;
                    self.mark(&task_id, TaskStatus::Failed).await;
                    report.outcomes.push(TaskOutcome {
                        task_id,
                        success: false,
                        attempts: 0,
                        duration_secs: 0,
                        error_kind: Some("panic".to_string()),
                        error: Some(e.to_string()),
                        merge_commit: None,
                        rebase_spec_version: None,
                    });
                }
            }
        }

        report.rebase = rebase_engine::analyze_batch(&results, &self.thresholds);
        self.record_rebases(&mut report).await;

        let scheduler = self.ctx.scheduler.lock().await;
        report.blocked = scheduler
            .blocked_tasks()
            .iter()
            .map(|t| t.id.clone())
            .collect();

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            blocked = report.blocked.len(),
            rebases = report.rebase.recommended,
            "Batch run finished"
        );
        Ok(report)
    }

    fn shutting_down(&self) -> bool {
        self.ctx
            .shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutting_down())
    }

    /// Claim ready tasks while permits are free and spawn a worker for each.
    async fn dispatch_ready(
        &self,
        semaphore: &Arc<Semaphore>,
        in_flight: &mut FuturesUnordered<Worker>,
    ) -> DomainResult<()> {
        let mut scheduler = self.ctx.scheduler.lock().await;
        let ready: Vec<Task> = scheduler.get_ready_tasks().into_iter().cloned().collect();

        for mut task in ready {
            let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
                break;
            };

            scheduler
                .update_task_status(&task.id, TaskStatus::InProgress)
                .await?;
            task.attempts = scheduler.increment_attempts(&task.id).await?;
            task.status = TaskStatus::InProgress;
            info!(task_id = %task.id, attempts = task.attempts, "Task claimed");

            let ctx = self.ctx.clone();
            let task_id = task.id.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                execute_task(ctx, task).await
            });
            in_flight.push(handle.map(move |joined| (task_id, joined)).boxed());
        }

        Ok(())
    }

    async fn mark(&self, task_id: &str, status: TaskStatus) {
        if let Err(e) = self
            .ctx
            .scheduler
            .lock()
            .await
            .update_task_status(task_id, status)
            .await
        {
            error!(task_id = %task_id, error = %e, "Failed to persist task status");
        }
    }

    /// Save a fresh-start spec version for every recommended rebase.
    async fn record_rebases(&self, report: &mut BatchReport) {
        for rec in report.rebase.recommendations.iter().filter(|r| r.should_rebase) {
            let task = self.ctx.scheduler.lock().await.get_task(&rec.task_id).cloned();
            let Some(task) = task else {
                continue;
            };
            let failure_kind = report
                .outcomes
                .iter()
                .find(|o| o.task_id == rec.task_id)
                .and_then(|o| o.error_kind.clone());

            let prompt = rebase_engine::generate_rebase_prompt(&task, rec, failure_kind.as_deref());
            // A version the start gate rejects could never run
            if let Err(e) = self
                .ctx
                .verifier
                .verify_clean(&task.render_prompt(Some(&prompt)), START_PHASE)
            {
                warn!(task_id = %task.id, error = %e, "Rebase prompt fails the start gate, not recorded");
                continue;
            }
            let reason = format!("rebase: {}", rec.reason);
            match self.ctx.specs.save_spec(&task.id, &prompt, &reason).await {
                Ok(version) => {
                    info!(task_id = %task.id, version, "Rebase recorded as new spec version");
                    if let Some(outcome) =
                        report.outcomes.iter_mut().find(|o| o.task_id == rec.task_id)
                    {
                        outcome.rebase_spec_version = Some(version);
                    }
                }
                Err(e) => warn!(task_id = %task.id, error = %e, "Failed to record rebase"),
            }
        }
    }
}

/// Run one claimed task to a terminal status. Cleanup always runs.
#[instrument(skip(ctx, task), fields(task_id = %task.id, attempt = task.attempts))]
async fn execute_task(ctx: RunContext, task: Task) -> (TaskOutcome, ExecutionResult) {
    let started = Instant::now();
    let mut trace = AttemptTrace::default();

    let result = run_attempt(&ctx, &task, &mut trace).await;
    ctx.workspaces.cleanup(&task.id).await;

    let status = if result.is_ok() {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    if let Err(e) = ctx
        .scheduler
        .lock()
        .await
        .update_task_status(&task.id, status)
        .await
    {
        error!(error = %e, "Failed to persist task status");
    }

    let duration_secs = started.elapsed().as_secs();
    let (error_kind, error) = match &result {
        Ok(()) => {
            info!(duration_secs, "Task completed");
            (None, None)
        }
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "Task failed");
            (Some(e.kind().to_string()), Some(e.to_string()))
        }
    };

    let execution = ExecutionResult {
        task_id: task.id.clone(),
        attempts: task.attempts,
        context_size_bytes: trace.context_size_bytes,
        duration_secs,
        log: trace.log,
        commit_count: trace.commit_count,
        failed: result.is_err(),
        failure_kind: error_kind.clone(),
        failure_reason: error.clone(),
    };
    let outcome = TaskOutcome {
        task_id: task.id,
        success: result.is_ok(),
        attempts: task.attempts,
        duration_secs,
        error_kind,
        error,
        merge_commit: trace.merge_commit,
        rebase_spec_version: None,
    };
    (outcome, execution)
}

async fn run_attempt(ctx: &RunContext, task: &Task, trace: &mut AttemptTrace) -> DomainResult<()> {
    ctx.workspaces.create(&task.id).await?;

    let spec = ctx
        .specs
        .load_latest_spec(&task.id)
        .await?
        .map(|v| v.content);
    let prompt = task.render_prompt(spec.as_deref());
    trace.context_size_bytes = prompt.len();

    let metrics = ctx.verifier.verify_clean(&prompt, START_PHASE)?;
    ctx.drift
        .lock()
        .await
        .check_drift(&task.id, START_PHASE, &metrics)?;

    let model = task_classifier::select_model(task);
    let handle = ctx
        .runtime
        .create(&format!("{}: {}", task.id, task.title), model)
        .await?;
    debug!(handle = %handle, model, "Agent execution created");

    let execution_key = format!("execution:{}", task.id);
    if let Some(shutdown) = &ctx.shutdown {
        let runtime = Arc::clone(&ctx.runtime);
        let handle = handle.clone();
        shutdown
            .register(execution_key.clone(), move || async move {
                runtime.delete(&handle).await
            })
            .await;
    }

    let driven = drive_execution(ctx, task, &prompt, &handle, trace).await;

    // The execution is deleted whether or not it succeeded
    if let Err(e) = ctx.runtime.delete(&handle).await {
        warn!(handle = %handle, error = %e, "Failed to delete agent execution");
    }
    if let Some(shutdown) = &ctx.shutdown {
        shutdown.release(&execution_key).await;
    }
    driven?;
    ctx.verifier.verify_deleted(ctx.runtime.as_ref(), &handle).await?;

    trace.commit_count = ctx.workspaces.commit_count(&task.id).await.unwrap_or_else(|e| {
        debug!(error = %e, "Commit count unavailable");
        0
    });
    trace.merge_commit = ctx.workspaces.merge(&task.id).await?;
    Ok(())
}

/// Prompt, wait for a terminal status, then gate the transcript.
async fn drive_execution(
    ctx: &RunContext,
    task: &Task,
    prompt: &str,
    handle: &ExecutionHandle,
    trace: &mut AttemptTrace,
) -> DomainResult<()> {
    ctx.runtime.prompt(handle, prompt).await?;

    let timeout_secs = ctx.timeouts.for_phase(IMPLEMENTATION_PHASE);
    let poll_interval = Duration::from_millis(ctx.timeouts.poll_interval_ms);
    let status = timeout(
        Duration::from_secs(timeout_secs),
        wait_for_terminal(ctx.runtime.as_ref(), handle, poll_interval),
    )
    .await
    .map_err(|_| DomainError::TaskExecutionTimeout {
        task_id: task.id.clone(),
        phase: IMPLEMENTATION_PHASE.to_string(),
        timeout_secs,
    })??;

    let messages = ctx.runtime.messages(handle).await?;
    trace.log = transcript_text(&messages);

    if status == ExecutionStatus::Failed {
        return Err(DomainError::AgentExecutionFailed(format!(
            "execution {handle} reported failure"
        )));
    }

    let metrics = ctx.verifier.verify_clean(&trace.log, END_PHASE)?;
    ctx.drift
        .lock()
        .await
        .check_drift(&task.id, END_PHASE, &metrics)?;
    Ok(())
}

async fn wait_for_terminal(
    runtime: &dyn AgentRuntime,
    handle: &ExecutionHandle,
    poll_interval: Duration,
) -> DomainResult<ExecutionStatus> {
    loop {
        match runtime.status(handle).await? {
            Some(status) if status.is_terminal() => return Ok(status),
            Some(_) => sleep(poll_interval).await,
            None => {
                return Err(DomainError::AgentExecutionFailed(format!(
                    "execution {handle} disappeared while running"
                )))
            }
        }
    }
}
