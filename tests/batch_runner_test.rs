//! End-to-end batch runs against in-memory agent and git fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{backlog, task, test_config, FakeRuntime, FakeVcs, Script};
use tempfile::TempDir;
use tokio::sync::Mutex;

use cleanroom::domain::models::{Config, TaskStatus};
use cleanroom::services::{
    BacklogScheduler, BatchReport, BatchRunner, ShutdownCoordinator, SpecStore, WorkspaceManager,
};

struct Harness {
    _dir: TempDir,
    config: Config,
    runtime: Arc<FakeRuntime>,
    vcs: Arc<FakeVcs>,
    scheduler: Arc<Mutex<BacklogScheduler>>,
    workspaces: Arc<WorkspaceManager>,
    specs: Arc<SpecStore>,
}

impl Harness {
    async fn new(tasks: Vec<cleanroom::Task>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let scheduler = BacklogScheduler::new(backlog(tasks), &config.storage.backlog_path);
        scheduler.save().await.unwrap();

        let vcs = Arc::new(FakeVcs::new());
        let workspaces = Arc::new(WorkspaceManager::new(vcs.clone(), config.workspace.clone()));
        Self {
            specs: Arc::new(SpecStore::new(&config.storage.specs_dir)),
            runtime: Arc::new(FakeRuntime::new()),
            scheduler: Arc::new(Mutex::new(scheduler)),
            workspaces,
            vcs,
            config,
            _dir: dir,
        }
    }

    fn runner(&self) -> BatchRunner {
        BatchRunner::new(
            &self.config,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.workspaces),
            self.runtime.clone(),
            Arc::clone(&self.specs),
        )
        .unwrap()
    }

    async fn run(&self) -> BatchReport {
        self.runner().run().await.unwrap()
    }

    async fn status(&self, id: &str) -> TaskStatus {
        self.scheduler.lock().await.get_task(id).unwrap().status
    }
}

#[tokio::test]
async fn test_runs_whole_backlog_in_dependency_order() {
    let h = Harness::new(vec![
        task("T01", "Parser", &[]),
        task("T02", "Printer", &["T01"]),
        task("T03", "Exporter", &[]),
    ])
    .await;

    let report = h.run().await;

    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 0);
    assert!(report.blocked.is_empty());
    assert!(!report.interrupted);
    for id in ["T01", "T02", "T03"] {
        assert_eq!(h.status(id).await, TaskStatus::Completed);
    }

    let merged = h.vcs.merged();
    let pos = |branch: &str| merged.iter().position(|b| b == branch).unwrap();
    assert!(pos("cleanroom/task/T01") < pos("cleanroom/task/T02"));

    // Workspaces and executions are all released
    assert_eq!(h.vcs.worktree_count(), 0);
    assert_eq!(h.vcs.branch_count(), 0);
    assert_eq!(h.runtime.remaining(), 0);
    assert!(report.outcomes.iter().all(|o| o.merge_commit.is_some()));

    // Statuses were persisted
    let reloaded = BacklogScheduler::load(&h.config.storage.backlog_path).await.unwrap();
    assert!(reloaded.is_complete());
}

#[tokio::test]
async fn test_timeout_fails_task_and_blocks_dependents() {
    let h = Harness::new(vec![task("T01", "Parser", &[]), task("T02", "Printer", &["T01"])]).await;
    h.runtime.script("T01", Script::Hang);

    let report = h.run().await;

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind.as_deref(), Some("task_execution_timeout"));
    assert_eq!(report.blocked, vec!["T02"]);
    assert_eq!(h.status("T01").await, TaskStatus::Failed);
    assert_eq!(h.status("T02").await, TaskStatus::Pending);

    assert_eq!(h.vcs.worktree_count(), 0);
    assert_eq!(h.runtime.remaining(), 0);
    assert!(h.vcs.merged().is_empty());
}

#[tokio::test]
async fn test_cross_task_transcript_fails_hygiene_gate() {
    let h = Harness::new(vec![task("T01", "Parser", &[]), task("T03", "Exporter", &[])]).await;
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "Done with T01, also started T03 while I was there.".to_string(),
            delay: Duration::ZERO,
        },
    );

    let report = h.run().await;

    let failed: Vec<_> = report.outcomes.iter().filter(|o| !o.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].task_id, "T01");
    assert_eq!(failed[0].error_kind.as_deref(), Some("cross_task_contamination"));
    // Hygiene failures never merge
    assert_eq!(h.vcs.merged(), vec!["cleanroom/task/T03"]);
}

#[tokio::test]
async fn test_residue_in_transcript_fails_task() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "T01: on second thought the lexer should be rewritten.".to_string(),
            delay: Duration::ZERO,
        },
    );

    let report = h.run().await;
    assert_eq!(
        report.outcomes[0].error_kind.as_deref(),
        Some("planning_residue_detected")
    );
}

#[tokio::test]
async fn test_leaked_execution_fails_task() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script("T01", Script::Leak);

    let report = h.run().await;

    assert_eq!(report.outcomes[0].error_kind.as_deref(), Some("session_leak"));
    assert_eq!(h.status("T01").await, TaskStatus::Failed);
    assert_eq!(h.vcs.worktree_count(), 0);
}

#[tokio::test]
async fn test_merge_conflict_fails_task_and_aborts() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.vcs.conflict_on("cleanroom/task/T01");

    let report = h.run().await;

    assert_eq!(report.outcomes[0].error_kind.as_deref(), Some("merge_conflict"));
    assert_eq!(h.vcs.aborts.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.vcs.worktree_count(), 0);
}

#[tokio::test]
async fn test_concurrency_never_exceeds_bound() {
    let tasks = (1..=6)
        .map(|i| task(&format!("T{i:02}"), "Widget", &[]))
        .collect();
    let h = Harness::new(tasks).await;
    for i in 1..=6 {
        h.runtime.script(
            &format!("T{i:02}"),
            Script::Reply {
                reply: format!("T{i:02} implemented."),
                delay: Duration::from_millis(80),
            },
        );
    }

    let report = h.run().await;

    assert_eq!(report.succeeded(), 6);
    assert_eq!(h.runtime.max_live(), h.config.max_concurrent_tasks);
}

#[tokio::test]
async fn test_messy_failure_records_rebase_spec_version() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script(
        "T01",
        Script::Fail {
            reply: "T01: error[E0308]: mismatched types".to_string(),
        },
    );

    let report = h.run().await;

    assert_eq!(report.rebase.recommended_task_ids(), vec!["T01"]);
    assert_eq!(report.outcomes[0].rebase_spec_version, Some(1));

    let spec = h.specs.load_latest_spec("T01").await.unwrap().unwrap();
    assert!(spec.reason.starts_with("rebase:"));
    assert!(spec.content.contains("(fresh start)"));
}

#[tokio::test]
async fn test_rebase_after_contamination_leads_to_clean_rerun() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "T01 borrowed T02 helper: error[E0308]: mismatched types".to_string(),
            delay: Duration::ZERO,
        },
    );

    let first = h.run().await;
    assert_eq!(
        first.outcomes[0].error_kind.as_deref(),
        Some("cross_task_contamination")
    );
    assert_eq!(first.outcomes[0].rebase_spec_version, Some(1));

    let spec = h.specs.load_latest_spec("T01").await.unwrap().unwrap();
    assert!(spec.content.contains("cross task contamination"));
    assert!(!spec.content.contains("T02"));

    h.scheduler
        .lock()
        .await
        .update_task_status("T01", TaskStatus::Pending)
        .await
        .unwrap();
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "T01 done.".to_string(),
            delay: Duration::ZERO,
        },
    );

    let rerun = h.run().await;
    assert!(rerun.outcomes[0].success, "rerun failed: {:?}", rerun.outcomes[0].error);
    assert_eq!(h.status("T01").await, TaskStatus::Completed);
}

#[tokio::test]
async fn test_simultaneous_finishers_merge_one_at_a_time() {
    let tasks = (1..=4)
        .map(|i| task(&format!("T{i:02}"), "Widget", &[]))
        .collect();
    let mut h = Harness::new(tasks).await;
    h.config.max_concurrent_tasks = 4;

    let report = h.run().await;

    assert_eq!(report.succeeded(), 4);
    assert_eq!(h.vcs.merged().len(), 4);
    assert_eq!(h.vcs.max_in_merge(), 1);
}

#[tokio::test]
async fn test_clean_failure_is_not_rebased() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script(
        "T01",
        Script::Fail {
            reply: "T01: gave up".to_string(),
        },
    );

    let report = h.run().await;

    assert_eq!(report.rebase.analyzed, 1);
    assert_eq!(report.rebase.recommended, 0);
    assert!(h.specs.list_versions("T01").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_spec_version_drives_the_prompt() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.specs
        .save_spec("T01", "Rewrite the parser as a Pratt parser.", "manual edit")
        .await
        .unwrap();

    let report = h.run().await;
    assert_eq!(report.succeeded(), 1);
}

#[tokio::test]
async fn test_retry_escalates_model() {
    let h = Harness::new(vec![task("T01", "Parser", &[])]).await;
    h.runtime.script("T01", Script::Fail { reply: "T01: no".into() });
    h.run().await;

    // Reset to pending for a second attempt
    h.scheduler
        .lock()
        .await
        .update_task_status("T01", TaskStatus::Pending)
        .await
        .unwrap();
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "T01 done.".into(),
            delay: Duration::ZERO,
        },
    );
    let report = h.run().await;

    assert_eq!(report.outcomes[0].attempts, 2);
    let models = h.runtime.models();
    assert_eq!(models[0].1, "sonnet");
    assert_eq!(models[1].1, "opus");
}

#[tokio::test]
async fn test_shutdown_stops_dispatch_and_releases_workspaces() {
    let h = Harness::new(vec![task("T01", "Parser", &[]), task("T02", "Printer", &["T01"])]).await;
    h.runtime.script(
        "T01",
        Script::Reply {
            reply: "T01 done.".into(),
            delay: Duration::from_millis(300),
        },
    );

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let workspaces = Arc::new(
        WorkspaceManager::new(h.vcs.clone(), h.config.workspace.clone())
            .with_shutdown(Arc::clone(&shutdown)),
    );
    let runner = BatchRunner::new(
        &h.config,
        Arc::clone(&h.scheduler),
        workspaces,
        h.runtime.clone(),
        Arc::clone(&h.specs),
    )
    .unwrap()
    .with_shutdown(Arc::clone(&shutdown));

    let trigger = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.shutdown().await
        })
    };

    let report = runner.run().await.unwrap();
    let summary = trigger.await.unwrap();

    assert!(report.interrupted);
    assert!(summary.released >= 1);
    assert_eq!(h.vcs.worktree_count(), 0);
    // T02 was never claimed
    assert_eq!(h.status("T02").await, TaskStatus::Pending);
}
