//! `ready` and `status` commands.

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::output::{output, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{Config, Task, TaskStatus};
use crate::services::{BacklogProgress, BacklogScheduler};

#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub attempts: u32,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            depends_on: task.depends_on.clone(),
            attempts: task.attempts,
        }
    }
}

fn task_table(rows: &[TaskRow]) -> String {
    let mut t = table(["ID", "Title", "Status", "Depends On", "Attempts"]);
    for row in rows {
        t.add_row(vec![
            Cell::new(&row.id),
            Cell::new(truncate(&row.title, 48)),
            status_cell(row.status),
            Cell::new(if row.depends_on.is_empty() {
                "-".to_string()
            } else {
                row.depends_on.join(", ")
            }),
            Cell::new(row.attempts),
        ]);
    }
    t.to_string()
}

#[derive(Debug, Serialize)]
pub struct ReadyOutput {
    pub tasks: Vec<TaskRow>,
}

impl CommandOutput for ReadyOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks are ready.".to_string();
        }
        format!("{} ready task(s):\n{}", self.tasks.len(), task_table(&self.tasks))
    }
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub track_id: String,
    pub progress: BacklogProgress,
    pub percent_complete: f64,
    pub blocked: Vec<String>,
    pub tasks: Vec<TaskRow>,
}

impl StatusOutput {
    pub fn from_scheduler(scheduler: &BacklogScheduler) -> Self {
        let progress = scheduler.progress();
        Self {
            track_id: scheduler.backlog().track_id.clone(),
            percent_complete: progress.percent_complete(),
            progress,
            blocked: scheduler.blocked_tasks().iter().map(|t| t.id.clone()).collect(),
            tasks: scheduler.tasks().iter().map(TaskRow::from).collect(),
        }
    }
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let p = &self.progress;
        let mut lines = vec![
            format!("Track: {}", self.track_id),
            format!(
                "Progress: {:.0}% ({} completed, {} failed, {} in progress, {} pending of {})",
                self.percent_complete, p.completed, p.failed, p.in_progress, p.pending + p.ready, p.total
            ),
        ];
        if !self.blocked.is_empty() {
            lines.push(format!("Blocked by failed dependencies: {}", self.blocked.join(", ")));
        }
        lines.push(task_table(&self.tasks));
        lines.join("\n")
    }
}

pub async fn ready(config: &Config, json_mode: bool) -> Result<()> {
    let scheduler = super::load_scheduler(config).await?;
    let out = ReadyOutput {
        tasks: scheduler.get_ready_tasks().into_iter().map(TaskRow::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn status(config: &Config, json_mode: bool) -> Result<()> {
    let scheduler = super::load_scheduler(config).await?;
    output(&StatusOutput::from_scheduler(&scheduler), json_mode);
    Ok(())
}
