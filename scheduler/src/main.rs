//! Task scheduler CLI.
//!
//! Queues tasks, runs them through the external coding assistant, and
//! reports lifecycle state. Mutating commands prompt for confirmation
//! unless `--yes` is given; every failure exits non-zero.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use scheduler::core::task::{Task, TaskStatus};
use scheduler::exit_codes;
use scheduler::flow::{RunConfig, RunStop, TaskReport, run_tasks};
use scheduler::io::assistant::AssistantCli;
use scheduler::io::config::{SchedulerConfig, load_config};
use scheduler::io::paths::SchedulerPaths;
use scheduler::io::prompt::PromptRenderer;
use scheduler::io::quota::QuotaMonitor;
use scheduler::io::task_store::TaskStore;
use scheduler::io::workspace::WorkspaceManager;

#[derive(Parser)]
#[command(
    name = "scheduler",
    version,
    about = "Queue and run coding-assistant tasks with quota-aware scheduling"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending and resumable tasks.
    Run {
        /// Maximum number of tasks to process.
        #[arg(short, long, default_value_t = 5)]
        max_tasks: usize,
        /// Per-task execution timeout in seconds.
        #[arg(short, long, default_value_t = 300)]
        timeout: u64,
        /// Skip quota checking before the run and before each task.
        #[arg(long)]
        no_quota_check: bool,
        /// Print a result line per processed task.
        #[arg(short, long)]
        verbose: bool,
    },
    /// List tasks with their status.
    List {
        /// Only show tasks with this status.
        #[arg(short, long)]
        status: Option<TaskStatus>,
        /// Show one detailed block per task.
        #[arg(short, long)]
        detailed: bool,
    },
    /// Add a new task to the queue.
    Add {
        /// Short task title.
        title: String,
        /// What the assistant should do.
        description: String,
        /// Prompt template name.
        #[arg(short = 't', long, default_value = "default")]
        template: String,
    },
    /// Reset a task back to pending, clearing run bookkeeping.
    Reset {
        task_id: String,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Delete a task permanently.
    Delete {
        task_id: String,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Show task statistics, quota usage, and active workspaces.
    Status,
    /// Show assistant quota usage.
    Quota,
    /// Clean up workspaces and optionally reset or delete tasks.
    Cleanup {
        /// Skip temporary workspace cleanup.
        #[arg(long)]
        no_workspaces: bool,
        /// Reset failed tasks back to pending.
        #[arg(long)]
        failed_tasks: bool,
        /// Delete completed tasks.
        #[arg(long)]
        completed_tasks: bool,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

fn main() {
    scheduler::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

/// Loaded per-invocation context: layout, config, and the task store.
struct Env {
    paths: SchedulerPaths,
    cfg: SchedulerConfig,
    store: TaskStore,
}

fn open_env() -> Result<Env> {
    let root = std::env::current_dir().context("determine working directory")?;
    let paths = SchedulerPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let paths = paths.with_config(&cfg.workspace_root, &cfg.templates_dir);
    let store = TaskStore::new(&paths.tasks_path, cfg.max_attempts_default);
    Ok(Env { paths, cfg, store })
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let env = open_env()?;
    match cli.command {
        Command::Run {
            max_tasks,
            timeout,
            no_quota_check,
            verbose,
        } => cmd_run(&env, max_tasks, timeout, no_quota_check, verbose),
        Command::List { status, detailed } => cmd_list(&env, status, detailed),
        Command::Add {
            title,
            description,
            template,
        } => cmd_add(&env, &title, &description, &template),
        Command::Reset { task_id, yes } => cmd_reset(&env, &task_id, yes),
        Command::Delete { task_id, yes } => cmd_delete(&env, &task_id, yes),
        Command::Status => cmd_status(&env),
        Command::Quota => cmd_quota(&env),
        Command::Cleanup {
            no_workspaces,
            failed_tasks,
            completed_tasks,
            yes,
        } => cmd_cleanup(&env, !no_workspaces, failed_tasks, completed_tasks, yes),
    }
}

fn cmd_run(
    env: &Env,
    max_tasks: usize,
    timeout: u64,
    no_quota_check: bool,
    verbose: bool,
) -> Result<i32> {
    println!("Starting task processing...");

    let assistant = AssistantCli::new(env.cfg.assistant.command.clone());
    let mut workspaces = WorkspaceManager::open(
        &env.paths.workspaces_dir,
        env.paths.workspace_templates_dir(),
    )?;
    let mut monitor = QuotaMonitor::new(&env.cfg.quota);
    let renderer = PromptRenderer::new(env.paths.prompt_templates_dir());

    let run_cfg = RunConfig {
        max_tasks,
        task_timeout: Duration::from_secs(timeout),
        check_quota: !no_quota_check,
    };

    let outcome = run_tasks(
        &env.paths.root,
        &assistant,
        &env.store,
        &mut workspaces,
        &mut monitor,
        &renderer,
        &env.cfg,
        &run_cfg,
        |report| {
            if verbose {
                print_task_report(report);
            }
        },
    )?;

    match &outcome.stop {
        RunStop::Drained => {
            println!(
                "✓ Processed {} task(s), cleaned {} workspace(s)",
                outcome.processed, outcome.cleaned_workspaces
            );
            Ok(exit_codes::OK)
        }
        RunStop::QuotaExhausted { reason } => {
            println!(
                "✗ Run halted after {} task(s): {reason}",
                outcome.processed
            );
            Ok(exit_codes::QUOTA_EXHAUSTED)
        }
        RunStop::ToolUnavailable { message } => {
            println!("✗ Assistant unavailable: {message}");
            Ok(exit_codes::TOOL_UNAVAILABLE)
        }
    }
}

fn print_task_report(report: &TaskReport) {
    let marker = if report.success { "✓" } else { "✗" };
    let duration = report
        .duration
        .map(|d| format!("{:.1}s", d.as_secs_f64()))
        .unwrap_or_else(|| "-".to_string());
    let detail = report.error.as_deref().unwrap_or("");
    println!(
        "{marker} {} -> {} ({duration}, {} file(s) changed) {detail}",
        report.task_id,
        report.final_status,
        report.changed_files.len()
    );
}

fn cmd_list(env: &Env, status: Option<TaskStatus>, detailed: bool) -> Result<i32> {
    let tasks = match status {
        Some(status) => env.store.list_by_status(status),
        None => env.store.load(),
    };

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(exit_codes::OK);
    }

    if detailed {
        for task in &tasks {
            print_task_detail(task);
        }
    } else {
        println!(
            "{:<10} {:<10} {:<9} {:<13} TITLE",
            "ID", "STATUS", "ATTEMPTS", "CREATED"
        );
        for task in &tasks {
            println!(
                "{:<10} {:<10} {:<9} {:<13} {}",
                task.id,
                task.status.as_str(),
                format!("{}/{}", task.attempts, task.max_attempts),
                task.created_at.format("%m/%d %H:%M").to_string(),
                truncate(&task.title, 50),
            );
        }
    }
    Ok(exit_codes::OK)
}

fn print_task_detail(task: &Task) {
    println!("── {} ──", task.id);
    println!("  Title:    {}", task.title);
    println!("  Status:   {}", task.status);
    println!("  Created:  {}", task.created_at.to_rfc3339());
    println!("  Attempts: {}/{}", task.attempts, task.max_attempts);
    println!("  Template: {}", task.template);
    println!("  Description: {}", task.description);
    if let Some(error) = &task.last_error {
        println!("  Last error: {error}");
    }
    if let Some(session_id) = &task.session_id {
        println!("  Session:  {session_id}");
    }
    if let Some(workspace) = &task.workspace_path {
        println!("  Workspace: {}", workspace.display());
    }
    println!();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max).collect();
    format!("{prefix}...")
}

fn cmd_add(env: &Env, title: &str, description: &str, template: &str) -> Result<i32> {
    let task = env.store.add(title, description, template)?;
    println!("✓ Added task: {} - {}", task.id, task.title);
    Ok(exit_codes::OK)
}

fn cmd_reset(env: &Env, task_id: &str, yes: bool) -> Result<i32> {
    let task = env
        .store
        .get(task_id)
        .ok_or_else(|| anyhow!("task {task_id} not found"))?;

    if !yes
        && !confirm(&format!(
            "Reset task '{}' ({}) to pending?",
            task.title, task.status
        ))?
    {
        println!("Operation cancelled");
        return Ok(exit_codes::INVALID);
    }

    if env.store.reset(task_id)? {
        println!("✓ Reset task: {task_id}");
        Ok(exit_codes::OK)
    } else {
        Err(anyhow!("failed to reset task {task_id}"))
    }
}

fn cmd_delete(env: &Env, task_id: &str, yes: bool) -> Result<i32> {
    let task = env
        .store
        .get(task_id)
        .ok_or_else(|| anyhow!("task {task_id} not found"))?;

    if !yes
        && !confirm(&format!(
            "Delete task '{}'? This cannot be undone.",
            task.title
        ))?
    {
        println!("Operation cancelled");
        return Ok(exit_codes::INVALID);
    }

    if env.store.delete(task_id)? {
        println!("✓ Deleted task: {task_id}");
        Ok(exit_codes::OK)
    } else {
        Err(anyhow!("failed to delete task {task_id}"))
    }
}

fn cmd_status(env: &Env) -> Result<i32> {
    let stats = env.store.statistics();
    println!("Task statistics");
    println!("  Total:     {}", stats.total);
    println!("  Pending:   {}", stats.pending);
    println!("  Running:   {}", stats.running);
    println!("  Completed: {}", stats.completed);
    println!("  Failed:    {}", stats.failed);
    println!("  Paused:    {}", stats.paused);

    let workspaces = WorkspaceManager::open(
        &env.paths.workspaces_dir,
        env.paths.workspace_templates_dir(),
    )?;
    println!("Active workspaces: {}", workspaces.list().len());

    print_quota(env);
    Ok(exit_codes::OK)
}

fn cmd_quota(env: &Env) -> Result<i32> {
    print_quota(env);
    Ok(exit_codes::OK)
}

fn print_quota(env: &Env) {
    let assistant = AssistantCli::new(env.cfg.assistant.command.clone());
    let mut monitor = QuotaMonitor::new(&env.cfg.quota);

    println!("Assistant quota");
    match monitor.check(&assistant, &env.paths.root) {
        Some(snapshot) => {
            let fraction = snapshot.fraction_used();
            let state = if fraction >= monitor.critical_threshold() {
                "critical"
            } else {
                "ok"
            };
            println!("  Status:    {state}");
            println!(
                "  Usage:     {}/{} ({:.1}%)",
                snapshot.messages_used,
                snapshot.messages_limit,
                fraction * 100.0
            );
            println!(
                "  Plan:      {}",
                snapshot.plan.map(|p| p.as_str()).unwrap_or("unknown")
            );
            println!(
                "  Reset in:  {}",
                snapshot
                    .time_until_reset
                    .map(scheduler::core::usage::format_reset)
                    .unwrap_or_else(|| "unknown".to_string())
            );
            println!(
                "  Estimated tasks remaining: {}",
                snapshot.estimated_tasks_remaining()
            );
        }
        None => println!("  Status:    unknown (could not retrieve quota status)"),
    }
}

fn cmd_cleanup(
    env: &Env,
    workspaces: bool,
    failed_tasks: bool,
    completed_tasks: bool,
    yes: bool,
) -> Result<i32> {
    let mut actions = Vec::new();
    if workspaces {
        actions.push("clean up temporary workspaces");
    }
    if failed_tasks {
        actions.push("reset failed tasks to pending");
    }
    if completed_tasks {
        actions.push("delete completed tasks");
    }
    if actions.is_empty() {
        println!("No cleanup actions specified");
        return Ok(exit_codes::OK);
    }

    if !yes && !confirm(&format!("This will: {}. Continue?", actions.join(", ")))? {
        println!("Operation cancelled");
        return Ok(exit_codes::INVALID);
    }

    if workspaces {
        let mut manager = WorkspaceManager::open(
            &env.paths.workspaces_dir,
            env.paths.workspace_templates_dir(),
        )?;
        let cleaned = manager.cleanup_all_temporary();
        println!("✓ Cleaned {cleaned} workspace(s)");
    }

    if failed_tasks {
        let failed = env.store.list_by_status(TaskStatus::Failed);
        for task in &failed {
            env.store.reset(&task.id)?;
        }
        println!("✓ Reset {} failed task(s)", failed.len());
    }

    if completed_tasks {
        let completed = env.store.list_by_status(TaskStatus::Completed);
        for task in &completed {
            env.store.delete(&task.id)?;
        }
        println!("✓ Deleted {} completed task(s)", completed.len());
    }

    Ok(exit_codes::OK)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("read confirmation")?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
