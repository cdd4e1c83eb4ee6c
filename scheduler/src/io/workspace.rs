//! Isolated per-task workspaces under a common base directory.
//!
//! The registry (`<base>/.workspace_registry.json`) maps task id to
//! workspace metadata and is rewritten wholesale on every mutation,
//! with the same single-process caveat as the task store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const REGISTRY_FILE: &str = ".workspace_registry.json";

/// Registered workspace metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub temporary: bool,
    #[serde(default)]
    pub template: Option<String>,
}

/// Creates, tracks, and destroys task workspaces.
#[derive(Debug)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
    workspace_templates_dir: PathBuf,
    registry: BTreeMap<String, WorkspaceInfo>,
}

impl WorkspaceManager {
    /// Open (or create) the base directory and load the registry.
    /// Registry entries whose directory no longer exists are dropped.
    pub fn open(base_dir: impl Into<PathBuf>, workspace_templates_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("create workspace base {}", base_dir.display()))?;

        let mut manager = Self {
            base_dir,
            workspace_templates_dir: workspace_templates_dir.into(),
            registry: BTreeMap::new(),
        };
        manager.load_registry();
        Ok(manager)
    }

    fn registry_path(&self) -> PathBuf {
        self.base_dir.join(REGISTRY_FILE)
    }

    fn load_registry(&mut self) {
        let path = self.registry_path();
        if !path.exists() {
            return;
        }
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %path.display(), err = %err, "could not read workspace registry");
                return;
            }
        };
        let entries: BTreeMap<String, WorkspaceInfo> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), err = %err, "could not parse workspace registry");
                return;
            }
        };
        for (task_id, info) in entries {
            if info.path.exists() {
                self.registry.insert(task_id, info);
            } else {
                debug!(task_id = %task_id, path = %info.path.display(), "dropping stale registry entry");
            }
        }
    }

    fn save_registry(&self) -> Result<()> {
        let path = self.registry_path();
        let mut buf = serde_json::to_string_pretty(&self.registry).context("serialize registry")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp registry {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace registry {}", path.display()))?;
        Ok(())
    }

    /// Create (or return) the workspace for a task.
    ///
    /// Idempotent per task id: a registered workspace is returned as-is.
    /// Temporary workspaces get a unique scratch directory under the
    /// base; persistent ones are keyed by task id.
    pub fn create(
        &mut self,
        task_id: &str,
        template: Option<&str>,
        temporary: bool,
    ) -> Result<PathBuf> {
        if let Some(info) = self.registry.get(task_id) {
            return Ok(info.path.clone());
        }

        let path = if temporary {
            tempfile::Builder::new()
                .prefix(&format!("task_{task_id}_"))
                .tempdir_in(&self.base_dir)
                .with_context(|| format!("create scratch dir under {}", self.base_dir.display()))?
                .keep()
        } else {
            let path = self.base_dir.join(task_id);
            fs::create_dir_all(&path)
                .with_context(|| format!("create workspace {}", path.display()))?;
            path
        };

        match template {
            Some(name) => self.apply_template(&path, name)?,
            None => scaffold_workspace(&path)?,
        }

        let info = WorkspaceInfo {
            task_id: task_id.to_string(),
            path: path.clone(),
            created_at: Utc::now(),
            temporary,
            template: template.map(str::to_string),
        };
        self.registry.insert(task_id.to_string(), info);
        self.save_registry()?;

        info!(task_id = %task_id, path = %path.display(), temporary, "created workspace");
        Ok(path)
    }

    fn apply_template(&self, path: &Path, name: &str) -> Result<()> {
        let template_dir = self.workspace_templates_dir.join(name);
        if !template_dir.is_dir() {
            warn!(template = %name, "workspace template not found, using scaffold");
            return scaffold_workspace(path);
        }
        if let Err(err) = copy_dir_recursive(&template_dir, path) {
            warn!(template = %name, err = %err, "could not apply template, using scaffold");
            return scaffold_workspace(path);
        }
        debug!(template = %name, path = %path.display(), "applied workspace template");
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<PathBuf> {
        self.registry
            .get(task_id)
            .filter(|info| info.path.exists())
            .map(|info| info.path.clone())
    }

    pub fn list(&self) -> Vec<&WorkspaceInfo> {
        self.registry.values().collect()
    }

    /// Remove a task's workspace directory and registry entry.
    ///
    /// Persistent workspaces survive unless `force` is set. An unknown
    /// task id counts as already clean.
    pub fn cleanup(&mut self, task_id: &str, force: bool) -> bool {
        let Some(info) = self.registry.get(task_id) else {
            return true;
        };
        if !info.temporary && !force {
            debug!(task_id = %task_id, "keeping persistent workspace");
            return false;
        }

        if info.path.exists()
            && let Err(err) = fs::remove_dir_all(&info.path)
        {
            warn!(task_id = %task_id, path = %info.path.display(), err = %err, "could not remove workspace");
            return false;
        }

        self.registry.remove(task_id);
        if let Err(err) = self.save_registry() {
            warn!(task_id = %task_id, err = %err, "could not save registry after cleanup");
        }
        info!(task_id = %task_id, "cleaned up workspace");
        true
    }

    /// Remove every temporary workspace. Returns the count removed.
    pub fn cleanup_all_temporary(&mut self) -> usize {
        let temporary: Vec<String> = self
            .registry
            .values()
            .filter(|info| info.temporary)
            .map(|info| info.task_id.clone())
            .collect();

        temporary
            .iter()
            .filter(|task_id| self.cleanup(task_id, false))
            .count()
    }

    /// Copy a workspace tree to a timestamped backup location before
    /// destructive cleanup. Best-effort: `None` on any failure.
    pub fn backup(&self, task_id: &str, dest_dir: Option<&Path>) -> Option<PathBuf> {
        let source = self.get(task_id)?;
        let dest_dir = dest_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.join("backups"));
        if let Err(err) = fs::create_dir_all(&dest_dir) {
            warn!(task_id = %task_id, err = %err, "could not create backup dir");
            return None;
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let backup_path = dest_dir.join(format!("{task_id}_{stamp}"));
        match copy_dir_recursive(&source, &backup_path) {
            Ok(()) => {
                info!(task_id = %task_id, path = %backup_path.display(), "backed up workspace");
                Some(backup_path)
            }
            Err(err) => {
                warn!(task_id = %task_id, err = %err, "could not back up workspace");
                None
            }
        }
    }
}

/// Minimal structure for a fresh workspace: source and docs directories,
/// an assistant scratch area, and a generated readme.
fn scaffold_workspace(path: &Path) -> Result<()> {
    for dir in ["src", "docs", ".assistant"] {
        fs::create_dir_all(path.join(dir))
            .with_context(|| format!("create {} in {}", dir, path.display()))?;
    }

    let readme = format!(
        "# Task Workspace\n\n\
         Created {} for automated task execution.\n\n\
         - `src/` - source files\n\
         - `docs/` - documentation\n\
         - `.assistant/` - prompts and assistant scratch space\n\n\
         This directory is isolated and safe to modify during execution.\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    fs::write(path.join("README.md"), readme)
        .with_context(|| format!("write readme in {}", path.display()))
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("create directory {}", to.display()))?;
    for entry in fs::read_dir(from).with_context(|| format!("read directory {}", from.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", from.display()))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if entry
            .file_type()
            .with_context(|| format!("stat {}", source.display()))?
            .is_dir()
        {
            copy_dir_recursive(&source, &target)?;
        } else {
            fs::copy(&source, &target)
                .with_context(|| format!("copy {} to {}", source.display(), target.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_in(root: &Path) -> WorkspaceManager {
        WorkspaceManager::open(root.join("workspaces"), root.join("templates/workspaces"))
            .expect("open manager")
    }

    #[test]
    fn create_scaffolds_basic_structure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());

        let path = manager.create("task-001", None, true).expect("create");
        assert!(path.join("src").is_dir());
        assert!(path.join("docs").is_dir());
        assert!(path.join(".assistant").is_dir());
        assert!(path.join("README.md").is_file());
    }

    #[test]
    fn create_is_idempotent_per_task_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());

        let first = manager.create("task-001", None, true).expect("create");
        let second = manager.create("task-001", None, true).expect("create again");
        assert_eq!(first, second);
        assert_eq!(manager.list().len(), 1);
    }

    #[test]
    fn create_applies_template_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let template_dir = temp.path().join("templates/workspaces/rust");
        fs::create_dir_all(template_dir.join("src")).expect("mkdir");
        fs::write(template_dir.join("Cargo.toml"), "[package]\n").expect("write");
        fs::write(template_dir.join("src/main.rs"), "fn main() {}\n").expect("write");

        let mut manager = manager_in(temp.path());
        let path = manager
            .create("task-001", Some("rust"), true)
            .expect("create");
        assert!(path.join("Cargo.toml").is_file());
        assert!(path.join("src/main.rs").is_file());
    }

    #[test]
    fn missing_template_falls_back_to_scaffold() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());

        let path = manager
            .create("task-001", Some("no-such-template"), true)
            .expect("create");
        assert!(path.join("src").is_dir());
        assert!(path.join("README.md").is_file());
    }

    #[test]
    fn cleanup_removes_temporary_and_keeps_persistent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());

        let scratch = manager.create("task-001", None, true).expect("create");
        let keeper = manager.create("task-002", None, false).expect("create");

        assert!(manager.cleanup("task-001", false));
        assert!(!scratch.exists());

        assert!(!manager.cleanup("task-002", false));
        assert!(keeper.exists());

        assert!(manager.cleanup("task-002", true));
        assert!(!keeper.exists());
    }

    #[test]
    fn cleanup_unknown_task_is_already_clean() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());
        assert!(manager.cleanup("task-404", false));
    }

    #[test]
    fn cleanup_all_temporary_counts_and_spares_persistent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());

        manager.create("task-001", None, true).expect("create");
        manager.create("task-002", None, true).expect("create");
        let keeper = manager.create("task-003", None, false).expect("create");

        assert_eq!(manager.cleanup_all_temporary(), 2);
        assert!(keeper.exists());
        assert_eq!(manager.list().len(), 1);
    }

    #[test]
    fn registry_survives_reopen_and_prunes_vanished_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());
        let kept = manager.create("task-001", None, false).expect("create");
        let vanished = manager.create("task-002", None, true).expect("create");
        drop(manager);

        fs::remove_dir_all(&vanished).expect("remove");

        let manager = manager_in(temp.path());
        assert_eq!(manager.get("task-001"), Some(kept));
        assert_eq!(manager.get("task-002"), None);
        assert_eq!(manager.list().len(), 1);
    }

    #[test]
    fn backup_copies_workspace_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut manager = manager_in(temp.path());
        let path = manager.create("task-001", None, true).expect("create");
        fs::write(path.join("src/lib.rs"), "pub fn f() {}\n").expect("write");

        let backup = manager.backup("task-001", None).expect("backup");
        assert!(backup.join("src/lib.rs").is_file());
        assert!(backup.starts_with(temp.path().join("workspaces/backups")));
    }

    #[test]
    fn backup_of_unknown_task_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = manager_in(temp.path());
        assert_eq!(manager.backup("task-404", None), None);
    }
}
