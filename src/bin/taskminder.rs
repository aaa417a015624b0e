//! Command-line front end for taskminder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use taskminder::reminders::{ReminderActions, ReminderMessage, ReminderPresenter, poll_reminders};
use taskminder::scheduler::BackgroundScheduler;
use taskminder::task::parse_timestamp;
use taskminder::{AppConfig, Repetition, Runtime, SqliteTaskStore, Task, TaskStore};
use tracing::info;

/// Personal task manager with recurring tasks and reminders.
#[derive(Parser)]
#[command(name = "taskminder", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Longer description.
        #[arg(short, long, default_value = "")]
        description: String,
        /// Due time, e.g. "2024-05-01 09:30".
        #[arg(long, value_parser = parse_due)]
        due: Option<NaiveDateTime>,
        /// none, daily, weekly, monthly or yearly.
        #[arg(short, long, default_value = "none")]
        repeat: Repetition,
        /// Priority (1 = highest).
        #[arg(short, long, default_value_t = 1)]
        priority: u8,
        /// Free-text category.
        #[arg(long, default_value = "")]
        category: String,
        /// Expected duration in minutes.
        #[arg(long, default_value_t = 0)]
        duration: u32,
    },

    /// List all tasks.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one task as JSON.
    Show { id: i64 },

    /// Mark a task completed and dismiss its reminder.
    Complete { id: i64 },

    /// Dismiss a task's reminder.
    Skip { id: i64 },

    /// Move a task's due time by a number of minutes (may be negative).
    Reschedule {
        id: i64,
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },

    /// Delete a task.
    Delete { id: i64 },

    /// Run one recurrence reset pass now.
    Reset,

    /// Run the scheduler and print reminders until Ctrl+C.
    Run,
}

fn parse_due(raw: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(raw).ok_or_else(|| format!("cannot parse due time {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let _log_guard = taskminder::logging::init(&config.logging);

    let db_path = config.store.resolved_path();
    let store = Arc::new(
        SqliteTaskStore::open(&db_path)
            .with_context(|| format!("opening task store {}", db_path.display()))?,
    );

    match cli.command {
        Command::Add {
            title,
            description,
            due,
            repeat,
            priority,
            category,
            duration,
        } => {
            let mut task = Task::new(title).with_repetition(repeat);
            if let Some(due) = due {
                task = task.with_due(due);
            }
            task.description = description;
            task.priority = priority;
            task.category = category;
            task.duration_minutes = duration;
            let id = store.save(&task)?;
            println!("added task {id}");
        }
        Command::List { json } => {
            let tasks = store.load_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    print_row(task);
                }
            }
        }
        Command::Show { id } => match store.load_by_id(id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => anyhow::bail!("no task with id {id}"),
        },
        Command::Complete { id } => report(id, actions(&store).on_complete(id)?, "completed")?,
        Command::Skip { id } => report(id, actions(&store).on_skip(id)?, "skipped")?,
        Command::Reschedule { id, minutes } => {
            report(id, actions(&store).on_reschedule(id, minutes)?, "rescheduled")?;
        }
        Command::Delete { id } => report(id, store.delete(id)?, "deleted")?,
        Command::Reset => {
            let today = chrono::Local::now().date_naive();
            let summary = taskminder::recurrence::run_reset_pass(store.as_ref(), today)?;
            println!(
                "examined {}, reset {}, skipped {}, failed {}",
                summary.examined, summary.reset, summary.skipped, summary.failed
            );
        }
        Command::Run => run(config, store).await?,
    }

    Ok(())
}

fn actions(store: &Arc<SqliteTaskStore>) -> ReminderActions {
    ReminderActions::new(Arc::clone(store) as Arc<dyn TaskStore>)
}

fn report(id: i64, found: bool, verb: &str) -> anyhow::Result<()> {
    if !found {
        anyhow::bail!("no task with id {id}");
    }
    println!("task {id} {verb}");
    Ok(())
}

fn print_row(task: &Task) {
    println!(
        "{:>4}  {:<9}  {:<7}  {:<19}  {}",
        task.id,
        task.status,
        task.repetition,
        task.due_at.as_deref().unwrap_or("-"),
        task.title
    );
}

/// Prints reminders to stdout.
struct StdoutPresenter;

impl ReminderPresenter for StdoutPresenter {
    fn present(&mut self, task: &Task, message: &ReminderMessage) {
        println!(
            "[{}] reminder: {} (task {}, due {})",
            message.fired_at.format("%H:%M"),
            task.title,
            task.id,
            task.due_at.as_deref().unwrap_or("-")
        );
    }
}

async fn run(config: AppConfig, store: Arc<SqliteTaskStore>) -> anyhow::Result<()> {
    println!("taskminder v{}", env!("CARGO_PKG_VERSION"));

    let scheduler =
        Arc::new(BackgroundScheduler::new().with_tick_interval(config.scheduler.tick_interval()));
    let poll_interval = config.reminders.poll_interval();
    let mut runtime = Runtime::new(config, store.clone(), scheduler);
    let receiver = runtime.start()?;

    println!("Watching for reminders. Press Ctrl+C to stop.");
    let mut ticker = tokio::time::interval(poll_interval);
    let mut presenter = StdoutPresenter;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                poll_reminders(&receiver, store.as_ref(), &mut presenter);
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
