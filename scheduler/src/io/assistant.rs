//! Injected adapter for the external coding-assistant CLI.
//!
//! The [`Assistant`] trait decouples the flow and executor from the
//! actual tool (currently the `claude` CLI). Tests use scripted
//! assistants that return predetermined output without spawning
//! processes. The tool is never invoked as an ambient global.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Arguments for one assistant process invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over the external assistant tool.
pub trait Assistant {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Production assistant backed by a configured command line.
pub struct AssistantCli {
    command: Vec<String>,
}

impl AssistantCli {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Assistant for AssistantCli {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .args(&invocation.args)
            .current_dir(&invocation.workdir);

        debug!(
            command = %self.command.join(" "),
            args = ?invocation.args,
            workdir = %invocation.workdir.display(),
            "invoking assistant"
        );
        run_command_with_timeout(cmd, invocation.timeout, invocation.output_limit_bytes)
    }
}

/// Lightweight availability probe (`--version` with a short timeout).
///
/// Distinguishes "not found", "timed out", and "ran but failed" so the
/// orchestrator can report something actionable before a run.
pub fn check_availability<A: Assistant>(assistant: &A, workdir: &Path) -> (bool, String) {
    let invocation = Invocation {
        args: vec!["--version".to_string()],
        workdir: workdir.to_path_buf(),
        timeout: Duration::from_secs(10),
        output_limit_bytes: 10_000,
    };

    match assistant.run(&invocation) {
        Ok(output) if output.timed_out => (false, "assistant version probe timed out".to_string()),
        Ok(output) if output.success() => {
            let version = output.stdout_lossy().trim().to_string();
            info!(version = %version, "assistant available");
            (true, format!("assistant available: {version}"))
        }
        Ok(output) => (
            false,
            format!(
                "assistant not working (exit code {}): {}",
                output.exit_code,
                output.stderr_lossy().trim()
            ),
        ),
        Err(err) => {
            let not_found = err
                .chain()
                .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
                .any(|io| io.kind() == std::io::ErrorKind::NotFound);
            if not_found {
                (false, "assistant not found in PATH".to_string())
            } else {
                (false, format!("error probing assistant: {err:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAssistant, ScriptedRun};

    #[test]
    fn availability_reports_version_on_success() {
        let assistant = ScriptedAssistant::new(vec![ScriptedRun::output("claude 1.2.3", "", 0)]);
        let temp = tempfile::tempdir().expect("tempdir");

        let (available, message) = check_availability(&assistant, temp.path());
        assert!(available);
        assert!(message.contains("claude 1.2.3"));
    }

    #[test]
    fn availability_reports_failure_exit_code() {
        let assistant =
            ScriptedAssistant::new(vec![ScriptedRun::output("", "bad install", 3)]);
        let temp = tempfile::tempdir().expect("tempdir");

        let (available, message) = check_availability(&assistant, temp.path());
        assert!(!available);
        assert!(message.contains("exit code 3"));
        assert!(message.contains("bad install"));
    }

    #[test]
    fn availability_distinguishes_timeout() {
        let assistant = ScriptedAssistant::new(vec![ScriptedRun::timed_out()]);
        let temp = tempfile::tempdir().expect("tempdir");

        let (available, message) = check_availability(&assistant, temp.path());
        assert!(!available);
        assert!(message.contains("timed out"));
    }

    #[test]
    fn availability_distinguishes_not_found() {
        let cli = AssistantCli::new(vec!["definitely-not-a-real-binary-1b2c".to_string()]);
        let temp = tempfile::tempdir().expect("tempdir");

        let (available, message) = check_availability(&cli, temp.path());
        assert!(!available);
        assert!(message.contains("not found in PATH"));
    }
}
