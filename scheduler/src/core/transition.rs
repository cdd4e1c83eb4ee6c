//! Task state machine.
//!
//! The scheduler owns every status change:
//!
//! ```text
//! pending --(selected, quota ok)--> running      [attempts += 1]
//! running --(execution success)--> completed
//! running --(quota exhausted)--> paused          [session id kept]
//! running --(failed, attempts < max)--> pending  [retry]
//! running --(failed, attempts >= max)--> failed
//! pending --(quota check fails pre-exec)--> paused
//! ```
//!
//! `completed` and `failed` are terminal until an explicit reset or
//! delete.

use crate::core::task::Task;
use crate::core::types::ExecutionResult;

/// Where a task goes after one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    /// Quota ran out mid-execution; the session id (when detected) is
    /// persisted so the task can resume instead of restarting.
    Paused {
        session_id: Option<String>,
        reason: String,
    },
    /// Ordinary failure with attempts left: back to pending.
    Retry { error: String },
    /// Ordinary failure with attempts exhausted: terminal.
    Failed { error: String },
}

/// Decide the post-execution transition for a running task.
pub fn disposition_after_execution(task: &Task, result: &ExecutionResult) -> Disposition {
    if result.success {
        return Disposition::Completed;
    }

    if result.quota_exhausted {
        return Disposition::Paused {
            session_id: result.session_id.clone(),
            reason: "quota exhausted during execution".to_string(),
        };
    }

    let error = result
        .error
        .clone()
        .unwrap_or_else(|| "assistant execution failed".to_string());

    if task.attempts_exhausted() {
        Disposition::Failed { error }
    } else {
        Disposition::Retry { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskStatus;
    use crate::test_support::{failed_result, success_result, task_with_status};
    use std::path::PathBuf;
    use std::time::Duration;

    fn running_task(attempts: u32, max_attempts: u32) -> Task {
        let mut task = task_with_status("task-001", TaskStatus::Running);
        task.attempts = attempts;
        task.max_attempts = max_attempts;
        task
    }

    #[test]
    fn success_completes() {
        let task = running_task(1, 3);
        let result = success_result(&["src/lib.rs"]);
        assert_eq!(
            disposition_after_execution(&task, &result),
            Disposition::Completed
        );
    }

    #[test]
    fn quota_exhaustion_pauses_with_session_id() {
        let task = running_task(1, 3);
        let mut result = failed_result("rate limit reached");
        result.quota_exhausted = true;
        result.session_id = Some("6f9b2c1a-1111-4f00-b2aa-9c8d7e6f5a4b".to_string());

        match disposition_after_execution(&task, &result) {
            Disposition::Paused { session_id, reason } => {
                assert_eq!(session_id, result.session_id);
                assert!(reason.contains("quota"));
            }
            other => panic!("expected paused, got {other:?}"),
        }
    }

    #[test]
    fn failure_with_attempts_left_retries() {
        let task = running_task(1, 3);
        let result = failed_result("exit status 1");
        assert_eq!(
            disposition_after_execution(&task, &result),
            Disposition::Retry {
                error: "exit status 1".to_string()
            }
        );
    }

    #[test]
    fn failure_at_max_attempts_is_terminal() {
        let task = running_task(3, 3);
        let result = failed_result("exit status 1");
        assert_eq!(
            disposition_after_execution(&task, &result),
            Disposition::Failed {
                error: "exit status 1".to_string()
            }
        );
    }

    /// Quota exhaustion wins over attempts accounting: even at max
    /// attempts the task pauses rather than failing terminally.
    #[test]
    fn quota_exhaustion_wins_over_exhausted_attempts() {
        let task = running_task(3, 3);
        let mut result = failed_result("usage limit reached");
        result.quota_exhausted = true;

        assert!(matches!(
            disposition_after_execution(&task, &result),
            Disposition::Paused { .. }
        ));
    }

    #[test]
    fn missing_error_message_gets_a_default() {
        let task = running_task(1, 3);
        let result = ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 1,
            duration: Duration::from_secs(0),
            changed_files: Vec::new(),
            workspace: PathBuf::from("/tmp/ws"),
            session_id: None,
            error: None,
            quota_exhausted: false,
        };
        assert_eq!(
            disposition_after_execution(&task, &result),
            Disposition::Retry {
                error: "assistant execution failed".to_string()
            }
        );
    }
}
