//! Assistant execution inside a task workspace.
//!
//! Wraps one assistant invocation: snapshot the workspace, write the
//! prompt file, run the process (new session or resume), then diff the
//! workspace and scan the output for a session id and quota signals.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::changes::{FileSnapshot, diff_snapshots};
use crate::core::signals::{extract_session_id, quota_exhausted_in};
use crate::core::types::ExecutionResult;
use crate::io::assistant::{Assistant, Invocation};

/// Directory inside the workspace reserved for the scheduler: the
/// rendered prompt lands here and the contents never count as changes.
pub const ASSISTANT_DIR: &str = ".assistant";

/// Path components excluded from change detection.
const IGNORED_COMPONENTS: [&str; 4] = [".git", "target", "node_modules", ASSISTANT_DIR];

/// Parameters for one task execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub workspace: PathBuf,
    /// Rendered prompt body handed to the assistant.
    pub prompt: String,
    /// Pass the skip-permissions flag so the run never blocks on
    /// interactive approval.
    pub auto_accept: bool,
    /// Resume this assistant session instead of starting fresh.
    pub resume_session_id: Option<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Execute the assistant for one task.
///
/// Process-level problems (spawn failure, timeout, non-zero exit, quota
/// exhaustion) are reported inside the returned [`ExecutionResult`];
/// only local filesystem errors escape as `Err`.
pub fn execute<A: Assistant>(assistant: &A, request: &ExecRequest) -> Result<ExecutionResult> {
    let start = Instant::now();
    info!(
        workspace = %request.workspace.display(),
        resume = request.resume_session_id.is_some(),
        "executing assistant"
    );

    let before = snapshot_files(&request.workspace)?;
    write_prompt_file(&request.workspace, &request.prompt)?;

    let invocation = Invocation {
        args: build_args(request),
        workdir: request.workspace.clone(),
        timeout: request.timeout,
        output_limit_bytes: request.output_limit_bytes,
    };

    let output = match assistant.run(&invocation) {
        Ok(output) => output,
        Err(err) => {
            warn!(err = %err, "assistant invocation failed");
            return Ok(ExecutionResult::failure(
                request.workspace.clone(),
                start.elapsed(),
                format!("assistant invocation failed: {err:#}"),
            ));
        }
    };

    let stdout = output.stdout_lossy();
    let stderr = output.stderr_lossy();

    if output.timed_out {
        warn!(timeout_secs = request.timeout.as_secs(), "execution timed out");
        return Ok(ExecutionResult {
            success: false,
            stdout,
            stderr,
            exit_code: -1,
            duration: start.elapsed(),
            changed_files: Vec::new(),
            workspace: request.workspace.clone(),
            session_id: request.resume_session_id.clone(),
            error: Some(format!(
                "execution timed out after {} seconds",
                request.timeout.as_secs()
            )),
            quota_exhausted: false,
        });
    }

    let after = snapshot_files(&request.workspace)?;
    let changed_files = diff_snapshots(&before, &after);

    let quota_exhausted = quota_exhausted_in(&stdout, &stderr);
    // On resume the existing session handle stays valid even when the
    // output does not repeat it.
    let session_id = extract_session_id(&stdout).or_else(|| request.resume_session_id.clone());

    let success = output.exit_code == 0 && !quota_exhausted;
    let error = if success {
        None
    } else if quota_exhausted {
        Some("assistant quota exhausted".to_string())
    } else {
        let stderr_trimmed = stderr.trim();
        if stderr_trimmed.is_empty() {
            Some(format!("assistant exited with code {}", output.exit_code))
        } else {
            Some(stderr_trimmed.to_string())
        }
    };

    debug!(
        exit_code = output.exit_code,
        changed = changed_files.len(),
        quota_exhausted,
        "execution finished"
    );
    Ok(ExecutionResult {
        success,
        stdout,
        stderr,
        exit_code: output.exit_code,
        duration: start.elapsed(),
        changed_files,
        workspace: request.workspace.clone(),
        session_id,
        error,
        quota_exhausted,
    })
}

fn build_args(request: &ExecRequest) -> Vec<String> {
    let mut args = Vec::new();
    if request.resume_session_id.is_some() {
        args.push("--continue".to_string());
    }
    if request.auto_accept {
        args.push("--dangerously-skip-permissions".to_string());
    }
    args.push("--print".to_string());
    args.push(request.prompt.clone());
    args
}

fn write_prompt_file(workspace: &Path, prompt: &str) -> Result<()> {
    let dir = workspace.join(ASSISTANT_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join("prompt.md");
    fs::write(&path, crate::io::prompt::format_prompt_file(prompt))
        .with_context(|| format!("write prompt file {}", path.display()))?;
    debug!(path = %path.display(), "wrote prompt file");
    Ok(())
}

/// Map of workspace-relative file paths to mtimes, skipping ignored
/// directories.
fn snapshot_files(workspace: &Path) -> Result<FileSnapshot> {
    let mut snapshot = FileSnapshot::new();
    collect_files(workspace, workspace, &mut snapshot)?;
    Ok(snapshot)
}

fn collect_files(root: &Path, dir: &Path, snapshot: &mut FileSnapshot) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name();
        if IGNORED_COMPONENTS
            .iter()
            .any(|ignored| name.to_string_lossy() == *ignored)
        {
            continue;
        }
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(root, &path, snapshot)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .expect("walked path is under the workspace root")
                .to_string_lossy()
                .into_owned();
            let mtime = entry
                .metadata()
                .with_context(|| format!("stat {}", path.display()))?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            snapshot.insert(relative, mtime);
        }
    }
    Ok(())
}
