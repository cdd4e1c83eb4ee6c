//! Stable contract types between the execution adapter and the flow.

use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one assistant invocation inside a workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Exit code 0 and no quota-exhaustion signal in the output.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was killed (timeout) or never produced a code.
    pub exit_code: i32,
    pub duration: Duration,
    /// Workspace-relative paths of files that are new or whose mtime
    /// increased during execution. Deletions are not reported.
    pub changed_files: Vec<String>,
    pub workspace: PathBuf,
    pub session_id: Option<String>,
    pub error: Option<String>,
    /// The output contained a quota-exhaustion phrase. Distinct from an
    /// ordinary failure: the task pauses for resume instead of retrying.
    pub quota_exhausted: bool,
}

impl ExecutionResult {
    /// A failed result that never reached the assistant (spawn error,
    /// timeout). Keeps callers on the normal result path instead of a
    /// separate error branch.
    pub fn failure(workspace: PathBuf, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            duration,
            changed_files: Vec::new(),
            workspace,
            session_id: None,
            error: Some(error.into()),
            quota_exhausted: false,
        }
    }
}
