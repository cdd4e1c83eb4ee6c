//! Test-only helpers: task constructors and a scripted assistant.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use crate::core::task::{Task, TaskStatus};
use crate::core::types::ExecutionResult;
use crate::io::assistant::{Assistant, Invocation};
use crate::io::process::CommandOutput;

/// Deterministic task with default fields and the given status.
pub fn task_with_status(id: &str, status: TaskStatus) -> Task {
    let mut task = Task::new(
        id,
        format!("{id} title"),
        format!("{id} description"),
        "default",
        3,
        Utc::now(),
    );
    task.status = status;
    task
}

/// Successful execution result reporting the given changed files.
pub fn success_result(changed_files: &[&str]) -> ExecutionResult {
    ExecutionResult {
        success: true,
        stdout: "done".to_string(),
        stderr: String::new(),
        exit_code: 0,
        duration: Duration::from_secs(1),
        changed_files: changed_files.iter().map(|f| (*f).to_string()).collect(),
        workspace: PathBuf::from("/tmp/ws"),
        session_id: None,
        error: None,
        quota_exhausted: false,
    }
}

/// Failed execution result with the given error message.
pub fn failed_result(error: &str) -> ExecutionResult {
    ExecutionResult {
        success: false,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: 1,
        duration: Duration::from_secs(1),
        changed_files: Vec::new(),
        workspace: PathBuf::from("/tmp/ws"),
        session_id: None,
        error: Some(error.to_string()),
        quota_exhausted: false,
    }
}

/// One scripted assistant invocation outcome.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Files written into the invocation workdir before returning, to
    /// simulate the assistant editing the workspace.
    pub files: Vec<(String, String)>,
}

impl ScriptedRun {
    pub fn output(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            timed_out: false,
            files: Vec::new(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            timed_out: true,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.to_string()));
        self
    }
}

/// Assistant double that replays scripted outcomes in order and records
/// every invocation, without spawning processes.
pub struct ScriptedAssistant {
    runs: RefCell<VecDeque<ScriptedRun>>,
    invocations: RefCell<Vec<Invocation>>,
    fail_with: Option<String>,
}

impl ScriptedAssistant {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            invocations: RefCell::new(Vec::new()),
            fail_with: None,
        }
    }

    /// An assistant whose every invocation errors (e.g. spawn failure).
    pub fn failing(message: &str) -> Self {
        Self {
            runs: RefCell::new(VecDeque::new()),
            invocations: RefCell::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }
}

impl Assistant for ScriptedAssistant {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations.borrow_mut().push(invocation.clone());
        if let Some(message) = &self.fail_with {
            return Err(anyhow!("{message}"));
        }

        let run = self
            .runs
            .borrow_mut()
            .pop_front()
            .expect("scripted assistant exhausted");

        for (path, contents) in &run.files {
            let target = invocation.workdir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&target, contents)
                .with_context(|| format!("write {}", target.display()))?;
        }

        Ok(CommandOutput {
            exit_code: run.exit_code,
            stdout: run.stdout.into_bytes(),
            stderr: run.stderr.into_bytes(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out: run.timed_out,
        })
    }
}
