//! Prompt rendering for assistant invocations.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use minijinja::{Environment, context};
use tracing::{debug, warn};

const DEFAULT_TEMPLATE: &str = include_str!("prompts/default.md");

/// Template engine wrapper around minijinja.
///
/// The built-in default template is embedded; named templates are read
/// from `<templates>/prompts/<name>.md`. Any problem with a named
/// template (missing file, render error) falls back to the default
/// with a warning, so a bad template never blocks a run.
pub struct PromptRenderer {
    env: Environment<'static>,
    prompt_templates_dir: PathBuf,
}

impl PromptRenderer {
    pub fn new(prompt_templates_dir: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.add_template("default", DEFAULT_TEMPLATE)
            .expect("default template should be valid");
        Self {
            env,
            prompt_templates_dir: prompt_templates_dir.into(),
        }
    }

    /// Render the prompt body for a task.
    pub fn render(&self, template_name: &str, title: &str, description: &str) -> String {
        match self.try_render(template_name, title, description) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(template = %template_name, err = %err, "falling back to default template");
                self.render_default(title, description)
            }
        }
    }

    fn try_render(&self, template_name: &str, title: &str, description: &str) -> Result<String> {
        if template_name == "default" {
            return Ok(self.render_default(title, description));
        }

        let path = self
            .prompt_templates_dir
            .join(format!("{template_name}.md"));
        let source = fs::read_to_string(&path)?;
        debug!(template = %template_name, path = %path.display(), "rendering named template");

        let mut env = Environment::new();
        env.add_template("named", &source)?;
        let rendered = env
            .get_template("named")?
            .render(context! { title => title, description => description })?;
        Ok(rendered)
    }

    fn render_default(&self, title: &str, description: &str) -> String {
        self.env
            .get_template("default")
            .expect("default template is registered")
            .render(context! { title => title, description => description })
            .expect("default template renders with plain strings")
    }
}

/// Wrap a rendered prompt body into the file written into the
/// workspace, stamped with the generation time.
pub fn format_prompt_file(prompt: &str) -> String {
    format!(
        "# Task Execution Request\n\n\
         **Generated:** {}\n\n\
         ## Task Description\n\
         {prompt}\n\n\
         ## Instructions\n\
         - Follow the task description carefully\n\
         - Create clean, well-documented code\n\
         - Follow the conventions of the relevant technology stack\n\n\
         ## Deliverables\n\
         Please implement the requested functionality according to the description above.\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    )
}
