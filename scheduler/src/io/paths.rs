//! Canonical on-disk layout for scheduler state.

use std::path::PathBuf;

/// All scheduler-owned paths for a project root.
#[derive(Debug, Clone)]
pub struct SchedulerPaths {
    pub root: PathBuf,
    pub scheduler_dir: PathBuf,
    pub config_path: PathBuf,
    pub tasks_path: PathBuf,
    pub workspaces_dir: PathBuf,
    pub templates_dir: PathBuf,
}

impl SchedulerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let scheduler_dir = root.join(".scheduler");
        Self {
            config_path: scheduler_dir.join("config.toml"),
            tasks_path: scheduler_dir.join("tasks.toml"),
            workspaces_dir: root.join("workspaces"),
            templates_dir: root.join("templates"),
            scheduler_dir,
            root,
        }
    }

    /// Re-anchor the workspace and template directories from config
    /// values (relative entries resolve against the project root).
    pub fn with_config(mut self, workspace_root: &str, templates_dir: &str) -> Self {
        self.workspaces_dir = self.root.join(workspace_root);
        self.templates_dir = self.root.join(templates_dir);
        self
    }

    pub fn prompt_templates_dir(&self) -> PathBuf {
        self.templates_dir.join("prompts")
    }

    pub fn workspace_templates_dir(&self) -> PathBuf {
        self.templates_dir.join("workspaces")
    }
}
