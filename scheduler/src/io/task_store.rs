//! Durable task records under `.scheduler/tasks.toml`.
//!
//! The file holds a `[meta]` block (schema version, last-updated stamp)
//! and an ordered `[[tasks]]` array. Every mutation is a whole-file
//! read-modify-write; the design assumes a single scheduler process at
//! a time (concurrent writers would race, last writer wins).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::task::{Task, TaskStats, TaskStatus};

const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFileMeta {
    version: String,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFile {
    meta: TasksFileMeta,
    #[serde(default)]
    tasks: Vec<Task>,
}

impl TasksFile {
    fn empty() -> Self {
        Self {
            meta: TasksFileMeta {
                version: SCHEMA_VERSION.to_string(),
                last_updated: Utc::now(),
            },
            tasks: Vec::new(),
        }
    }
}

/// Handle on the task file. Stateless: every operation reads the file
/// fresh and writes it back whole.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
    max_attempts_default: u32,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>, max_attempts_default: u32) -> Self {
        Self {
            path: path.into(),
            max_attempts_default,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tasks. A missing or unparseable file degrades to an
    /// empty list with a warning; losing sight of tasks beats crashing
    /// every command.
    pub fn load(&self) -> Vec<Task> {
        self.load_file().tasks
    }

    fn load_file(&self) -> TasksFile {
        if !self.path.exists() {
            return TasksFile::empty();
        }
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "could not read task file, starting empty");
                return TasksFile::empty();
            }
        };
        match toml::from_str(&contents) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "could not parse task file, starting empty");
                TasksFile::empty()
            }
        }
    }

    /// Persist the full task list. Write failures propagate: silent
    /// data loss is worse than a failed command.
    pub fn save(&self, tasks: Vec<Task>) -> Result<()> {
        let file = TasksFile {
            meta: TasksFileMeta {
                version: SCHEMA_VERSION.to_string(),
                last_updated: Utc::now(),
            },
            tasks,
        };
        let mut buf = toml::to_string_pretty(&file).context("serialize task file")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    /// Add a new pending task with a fresh `task-NNN` id.
    pub fn add(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
    ) -> Result<Task> {
        let mut tasks = self.load();
        let id = next_task_id(&tasks);
        let task = Task::new(
            id,
            title,
            description,
            template,
            self.max_attempts_default,
            Utc::now(),
        );
        debug!(task_id = %task.id, "adding task");
        tasks.push(task.clone());
        self.save(tasks)?;
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.load().into_iter().find(|task| task.id == id)
    }

    /// Apply `mutate` to the task with `id` and persist. Returns false
    /// when no such task exists.
    pub fn update(&self, id: &str, mutate: impl FnOnce(&mut Task)) -> Result<bool> {
        let mut tasks = self.load();
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            return Ok(false);
        };
        mutate(task);
        self.save(tasks)?;
        Ok(true)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut tasks = self.load();
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.save(tasks)?;
        Ok(true)
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.load()
            .into_iter()
            .filter(|task| task.status == status)
            .collect()
    }

    pub fn statistics(&self) -> TaskStats {
        TaskStats::from_tasks(&self.load())
    }

    // Canonical field bundles per state-machine transition. Attempts
    // move only here, on the transition into running.

    pub fn mark_running(&self, id: &str) -> Result<bool> {
        debug!(task_id = %id, "marking running");
        self.update(id, |task| {
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            task.attempts += 1;
        })
    }

    pub fn mark_completed(&self, id: &str) -> Result<bool> {
        debug!(task_id = %id, "marking completed");
        self.update(id, |task| {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.last_error = None;
        })
    }

    pub fn mark_failed(&self, id: &str, error: &str) -> Result<bool> {
        debug!(task_id = %id, error = %error, "marking failed");
        self.update(id, |task| {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.last_error = Some(error.to_string());
        })
    }

    pub fn mark_paused(&self, id: &str, reason: &str) -> Result<bool> {
        debug!(task_id = %id, reason = %reason, "marking paused");
        self.update(id, |task| {
            task.status = TaskStatus::Paused;
            task.last_error = Some(reason.to_string());
        })
    }

    /// Back to pending with per-run bookkeeping cleared, regardless of
    /// prior state. Attempts are preserved.
    pub fn reset(&self, id: &str) -> Result<bool> {
        debug!(task_id = %id, "resetting");
        self.update(id, |task| {
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.completed_at = None;
            task.last_error = None;
            task.session_id = None;
        })
    }
}

/// Next unused numeric suffix across existing `task-NNN` ids.
fn next_task_id(tasks: &[Task]) -> String {
    let highest = tasks
        .iter()
        .filter_map(|task| task.id.strip_prefix("task-"))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("task-{:03}", highest + 1)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("task file path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp task file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace task file {}", path.display()))?;
    Ok(())
}
