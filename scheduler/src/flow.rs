//! Orchestration of one scheduler run.
//!
//! Pulls pending and resumable tasks from the store and processes them
//! strictly sequentially: mark running, re-check quota, create a
//! workspace, render the prompt, execute the assistant, and apply the
//! state-machine transition. Quota exhaustion halts the run; ordinary
//! task failures do not.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::core::task::{Task, TaskStatus};
use crate::core::transition::{Disposition, disposition_after_execution};
use crate::io::assistant::{Assistant, check_availability};
use crate::io::config::SchedulerConfig;
use crate::io::executor::{ExecRequest, execute};
use crate::io::prompt::PromptRenderer;
use crate::io::quota::QuotaMonitor;
use crate::io::task_store::TaskStore;
use crate::io::workspace::WorkspaceManager;

/// Per-run options from the CLI.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of tasks processed in this run.
    pub max_tasks: usize,
    /// Wall-clock budget per task execution.
    pub task_timeout: Duration,
    /// Check quota before the run and before every task.
    pub check_quota: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_tasks: 5,
            task_timeout: Duration::from_secs(300),
            check_quota: true,
        }
    }
}

/// Why the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// All selected tasks were processed.
    Drained,
    /// Quota ran out (before the run or mid-task).
    QuotaExhausted { reason: String },
    /// The assistant tool is not usable.
    ToolUnavailable { message: String },
}

/// Result of processing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: String,
    pub final_status: TaskStatus,
    pub success: bool,
    pub duration: Option<Duration>,
    pub changed_files: Vec<String>,
    pub error: Option<String>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub processed: usize,
    pub reports: Vec<TaskReport>,
    pub cleaned_workspaces: usize,
    pub stop: RunStop,
}

/// Process up to `run_cfg.max_tasks` pending and resumable tasks.
///
/// `on_task` fires after each task for progress reporting.
#[allow(clippy::too_many_arguments)]
pub fn run_tasks<A: Assistant, F: FnMut(&TaskReport)>(
    root: &Path,
    assistant: &A,
    store: &TaskStore,
    workspaces: &mut WorkspaceManager,
    monitor: &mut QuotaMonitor,
    renderer: &PromptRenderer,
    cfg: &SchedulerConfig,
    run_cfg: &RunConfig,
    mut on_task: F,
) -> Result<RunOutcome> {
    info!(max_tasks = run_cfg.max_tasks, "starting scheduler run");

    let (available, message) = check_availability(assistant, root);
    if !available {
        warn!(message = %message, "assistant unavailable, aborting run");
        return Ok(RunOutcome {
            processed: 0,
            reports: Vec::new(),
            cleaned_workspaces: 0,
            stop: RunStop::ToolUnavailable { message },
        });
    }

    if run_cfg.check_quota {
        let (can_run, reason) = monitor.can_run(assistant, root);
        if !can_run {
            // A known-critical snapshot is worth waiting out; an unknown
            // status is not, since there is no reset estimate to wait for.
            let resumed = monitor.last().is_some()
                && monitor.wait_for_reset(assistant, root, thread::sleep);
            if !resumed {
                return Ok(RunOutcome {
                    processed: 0,
                    reports: Vec::new(),
                    cleaned_workspaces: 0,
                    stop: RunStop::QuotaExhausted { reason },
                });
            }
        }
    }

    let selected = select_tasks(store, run_cfg.max_tasks);
    if selected.is_empty() {
        info!("no pending or resumable tasks");
        return Ok(RunOutcome {
            processed: 0,
            reports: Vec::new(),
            cleaned_workspaces: workspaces.cleanup_all_temporary(),
            stop: RunStop::Drained,
        });
    }
    info!(count = selected.len(), "selected tasks");

    let mut reports = Vec::new();
    let mut halted = None;

    for (index, task) in selected.iter().enumerate() {
        info!(task_id = %task.id, title = %task.title, "processing task");

        let (report, continue_processing) = match process_single_task(
            root, assistant, store, workspaces, monitor, renderer, cfg, run_cfg, task,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Convert unexpected task-level errors into a failed
                // transition; the run moves on to the next task.
                let error = format!("unexpected error: {err:#}");
                warn!(task_id = %task.id, error = %error, "task processing errored");
                store.mark_failed(&task.id, &error)?;
                (
                    TaskReport {
                        task_id: task.id.clone(),
                        final_status: TaskStatus::Failed,
                        success: false,
                        duration: None,
                        changed_files: Vec::new(),
                        error: Some(error),
                    },
                    true,
                )
            }
        };

        on_task(&report);
        let stop_reason = report.error.clone();
        reports.push(report);

        if !continue_processing {
            info!("halting run early");
            halted = Some(RunStop::QuotaExhausted {
                reason: stop_reason.unwrap_or_else(|| "quota exhausted".to_string()),
            });
            break;
        }

        if index + 1 < selected.len() && cfg.pause_between_tasks_secs > 0 {
            thread::sleep(Duration::from_secs(cfg.pause_between_tasks_secs));
        }
    }

    let cleaned_workspaces = workspaces.cleanup_all_temporary();
    info!(cleaned = cleaned_workspaces, "cleaned temporary workspaces");

    Ok(RunOutcome {
        processed: reports.len(),
        cleaned_workspaces,
        stop: halted.unwrap_or(RunStop::Drained),
        reports,
    })
}

/// Pending tasks first, then paused tasks with a session id to resume,
/// truncated to `max_tasks`.
fn select_tasks(store: &TaskStore, max_tasks: usize) -> Vec<Task> {
    let mut selected = store.list_by_status(TaskStatus::Pending);
    selected.extend(
        store
            .list_by_status(TaskStatus::Paused)
            .into_iter()
            .filter(Task::is_resumable),
    );
    selected.truncate(max_tasks);
    selected
}

#[allow(clippy::too_many_arguments)]
fn process_single_task<A: Assistant>(
    root: &Path,
    assistant: &A,
    store: &TaskStore,
    workspaces: &mut WorkspaceManager,
    monitor: &mut QuotaMonitor,
    renderer: &PromptRenderer,
    cfg: &SchedulerConfig,
    run_cfg: &RunConfig,
    task: &Task,
) -> Result<(TaskReport, bool)> {
    store.mark_running(&task.id)?;

    // Quota can drain between tasks; re-check right before spending it.
    if run_cfg.check_quota {
        let (can_run, reason) = monitor.can_run(assistant, root);
        if !can_run {
            warn!(task_id = %task.id, reason = %reason, "pausing task before execution");
            store.mark_paused(&task.id, &reason)?;
            return Ok((
                TaskReport {
                    task_id: task.id.clone(),
                    final_status: TaskStatus::Paused,
                    success: false,
                    duration: None,
                    changed_files: Vec::new(),
                    error: Some(reason),
                },
                false,
            ));
        }
    }

    let workspace = workspaces.create(&task.id, None, true)?;
    store.update(&task.id, |t| t.workspace_path = Some(workspace.clone()))?;

    let prompt = renderer.render(&task.template, &task.title, &task.description);
    let request = ExecRequest {
        workspace,
        prompt,
        auto_accept: cfg.assistant.auto_accept,
        resume_session_id: task.session_id.clone(),
        timeout: run_cfg.task_timeout,
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let result = execute(assistant, &request)?;

    let current = store
        .get(&task.id)
        .ok_or_else(|| anyhow!("task {} vanished from the store mid-run", task.id))?;

    let report = match disposition_after_execution(&current, &result) {
        Disposition::Completed => {
            store.mark_completed(&task.id)?;
            info!(task_id = %task.id, changed = result.changed_files.len(), "task completed");
            TaskReport {
                task_id: task.id.clone(),
                final_status: TaskStatus::Completed,
                success: true,
                duration: Some(result.duration),
                changed_files: result.changed_files,
                error: None,
            }
        }
        Disposition::Paused { session_id, reason } => {
            if let Some(session_id) = session_id {
                store
                    .update(&task.id, |t| t.session_id = Some(session_id.clone()))
                    .context("persist session id")?;
            }
            store.mark_paused(&task.id, &reason)?;
            warn!(task_id = %task.id, "quota exhausted mid-execution, task paused");
            let report = TaskReport {
                task_id: task.id.clone(),
                final_status: TaskStatus::Paused,
                success: false,
                duration: Some(result.duration),
                changed_files: result.changed_files,
                error: Some(reason),
            };
            return Ok((report, false));
        }
        Disposition::Retry { error } => {
            // Back to pending for another attempt, from scratch: the
            // session is cleared, the error is kept for inspection.
            store.update(&task.id, |t| {
                t.status = TaskStatus::Pending;
                t.started_at = None;
                t.session_id = None;
                t.last_error = Some(error.clone());
            })?;
            warn!(task_id = %task.id, error = %error, "task failed, will retry");
            TaskReport {
                task_id: task.id.clone(),
                final_status: TaskStatus::Pending,
                success: false,
                duration: Some(result.duration),
                changed_files: result.changed_files,
                error: Some(error),
            }
        }
        Disposition::Failed { error } => {
            store.mark_failed(&task.id, &error)?;
            warn!(task_id = %task.id, error = %error, "task failed terminally");
            TaskReport {
                task_id: task.id.clone(),
                final_status: TaskStatus::Failed,
                success: false,
                duration: Some(result.duration),
                changed_files: result.changed_files,
                error: Some(error),
            }
        }
    };

    Ok((report, true))
}
