//! Task model shared by the store, the flow, and the CLI.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// Transitions between statuses go through the state machine in
/// [`crate::core::transition`]; nothing else is allowed to invent a
/// status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(format!(
                "unknown status '{other}' (expected pending, running, completed, failed or paused)"
            )),
        }
    }
}

/// A unit of work handed to the external assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Name of the prompt template used to render the assistant prompt.
    #[serde(default = "default_template")]
    pub template: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of transitions into `running` so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Assistant session handle, kept when a run pauses mid-task so the
    /// session can be resumed with context intact.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub workspace_path: Option<PathBuf>,
}

fn default_template() -> String {
    "default".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            template: template.into(),
            status: TaskStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            attempts: 0,
            max_attempts,
            last_error: None,
            session_id: None,
            workspace_path: None,
        }
    }

    /// A paused task with a stored session id can be picked up again.
    pub fn is_resumable(&self) -> bool {
        self.status == TaskStatus::Paused && self.session_id.is_some()
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Per-status task counts for the `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = TaskStats {
            total: tasks.len(),
            ..TaskStats::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Paused => stats.paused += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_with_status;

    #[test]
    fn status_round_trips_through_from_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn resumable_requires_paused_and_session_id() {
        let mut task = task_with_status("task-001", TaskStatus::Paused);
        assert!(!task.is_resumable());
        task.session_id = Some("2f1d0c1e-8a54-4c77-9f3b-0a1b2c3d4e5f".to_string());
        assert!(task.is_resumable());
        task.status = TaskStatus::Pending;
        assert!(!task.is_resumable());
    }

    #[test]
    fn stats_count_each_status() {
        let tasks = vec![
            task_with_status("task-001", TaskStatus::Pending),
            task_with_status("task-002", TaskStatus::Pending),
            task_with_status("task-003", TaskStatus::Completed),
            task_with_status("task-004", TaskStatus::Failed),
            task_with_status("task-005", TaskStatus::Paused),
        ];
        let stats = TaskStats::from_tasks(&tasks);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.paused, 1);
    }
}
