mod config;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tidy_core::TaskId;
use tidy_reconcile::{
    cancel_task, complete_task_manually, ignore_task, purge_completed, zone_summary,
    ReconcileConfig, ReconciliationEngine, DEFAULT_RETENTION_DAYS,
};
use tidy_storage::{SqliteTaskStore, StoreError, TaskStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tidy")]
#[command(about = "Track cleaning tasks per zone across analysis cycles", long_about = None)]
struct Cli {
    /// SQLite database holding the task history.
    #[arg(long, global = true, env = "TIDY_DB")]
    db: Option<PathBuf>,
    /// TOML file with threshold and completion rule settings.
    #[arg(long, global = true, env = "TIDY_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Reconcile one analysis pass against a zone's pending tasks
    Reconcile(ReconcileArgs),
    /// List a zone's pending tasks
    Pending(ZoneArgs),
    /// Show task counts for a zone
    Summary(ZoneArgs),
    /// Mark a pending task as done by hand
    #[command(alias = "done")]
    Complete(TaskTargetArgs),
    /// Dismiss a pending task
    Ignore(TaskTargetArgs),
    /// Withdraw a pending task
    Cancel(TaskTargetArgs),
    /// Delete completed tasks older than the retention window
    Purge(PurgeArgs),
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[arg(long)]
    zone: String,
    /// Task description reported by the analysis; repeatable.
    #[arg(long = "task")]
    tasks: Vec<String>,
    /// Confidence per `--task`, in the same order.
    #[arg(long, value_delimiter = ',')]
    confidence: Vec<f64>,
    /// Read a JSON array of descriptions (or `{description, confidence}`
    /// objects) from stdin instead of `--task`.
    #[arg(long, conflicts_with_all = ["tasks", "confidence"])]
    stdin: bool,
    /// Accuracy feedback that shifts the starting threshold for this run only.
    /// Nothing carries over between runs.
    #[arg(long)]
    feedback: Option<f64>,
    /// Print the planned changes without writing them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ZoneArgs {
    #[arg(long)]
    zone: String,
}

#[derive(Args, Debug)]
struct TaskTargetArgs {
    id: TaskId,
    #[arg(long)]
    user: Option<String>,
}

#[derive(Args, Debug)]
struct PurgeArgs {
    #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
    days: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectedTask {
    Text(String),
    Scored {
        description: String,
        #[serde(default)]
        confidence: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
struct StatusChange {
    task_id: TaskId,
    changed: bool,
    task: Option<tidy_core::Task>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = config::load_config(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(config::default_db_path);
    let store = open_store(&db_path)?;

    match cli.command {
        Command::Reconcile(args) => run_reconcile(&store, &config, args),
        Command::Pending(args) => {
            let tasks = store
                .pending_tasks(&args.zone)
                .with_context(|| format!("failed to list pending tasks for {}", args.zone))?;
            print_json(&tasks)
        }
        Command::Summary(args) => {
            let summary = zone_summary(&store, &args.zone)
                .with_context(|| format!("failed to summarize zone {}", args.zone))?;
            print_json(&summary)
        }
        Command::Complete(args) => {
            change_status(&store, args, complete_task_manually::<SqliteTaskStore>)
        }
        Command::Ignore(args) => change_status(&store, args, ignore_task::<SqliteTaskStore>),
        Command::Cancel(args) => change_status(&store, args, cancel_task::<SqliteTaskStore>),
        Command::Purge(args) => {
            let deleted = purge_completed(&store, args.days, Utc::now())
                .context("failed to purge completed tasks")?;
            print_json(&json!({ "deleted": deleted, "retention_days": args.days }))
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_store(path: &Path) -> Result<SqliteTaskStore> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteTaskStore::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!(event = "task_store_opened", path = %path.display());
    Ok(store)
}

fn run_reconcile(
    store: &SqliteTaskStore,
    config: &ReconcileConfig,
    args: ReconcileArgs,
) -> Result<()> {
    let (descriptions, confidence) = if args.stdin {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("failed to read stdin")?;
        parse_detected(&input, config.default_confidence)?
    } else {
        (args.tasks, args.confidence)
    };

    let mut engine = ReconciliationEngine::new(args.zone.as_str(), config);
    if let Some(feedback) = args.feedback {
        engine
            .adjust_threshold(feedback)
            .context("invalid --feedback")?;
    }

    let now = Utc::now();
    if args.dry_run {
        let existing = engine.fetch_pending(store)?;
        let plan = engine.plan(&existing, &descriptions, &confidence, now);
        let commands = plan
            .commands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        info!(
            event = "reconcile_planned",
            zone_id = %plan.zone_id,
            threshold = plan.threshold,
            commands = commands.len()
        );
        return print_json(&json!({
            "zone_id": plan.zone_id,
            "threshold": plan.threshold,
            "total_current_tasks": plan.total_current_tasks,
            "total_existing_tasks": plan.total_existing_tasks,
            "similarity_matches": plan.comparison.similarity_matches,
            "commands": commands,
        }));
    }

    let result = engine.reconcile_at(store, &descriptions, &confidence, now);
    info!(
        event = "reconcile_reported",
        zone_id = %result.zone_id,
        threshold = engine.threshold(),
        failed = result.is_error()
    );
    print_json(&result)?;
    if let Some(error) = result.error {
        bail!("reconciliation failed: {error}");
    }
    Ok(())
}

/// Splits analysis JSON into descriptions and a parallel confidence list.
/// Entries without a confidence get `default_confidence`; when no entry
/// carries one the list is left empty.
fn parse_detected(input: &str, default_confidence: f64) -> Result<(Vec<String>, Vec<f64>)> {
    let detected: Vec<DetectedTask> =
        serde_json::from_str(input).context("expected a JSON array of tasks")?;

    let any_scored = detected.iter().any(|task| {
        matches!(
            task,
            DetectedTask::Scored {
                confidence: Some(_),
                ..
            }
        )
    });

    let mut descriptions = Vec::with_capacity(detected.len());
    let mut confidence = Vec::new();
    for task in detected {
        let (description, score) = match task {
            DetectedTask::Text(description) => (description, None),
            DetectedTask::Scored {
                description,
                confidence,
            } => (description, confidence),
        };
        descriptions.push(description);
        if any_scored {
            confidence.push(score.unwrap_or(default_confidence));
        }
    }
    Ok((descriptions, confidence))
}

fn change_status<F>(store: &SqliteTaskStore, args: TaskTargetArgs, apply: F) -> Result<()>
where
    F: Fn(&SqliteTaskStore, TaskId, Option<&str>, DateTime<Utc>) -> Result<bool, StoreError>,
{
    let changed = apply(store, args.id, args.user.as_deref(), Utc::now())
        .with_context(|| format!("failed to update task {}", args.id))?;
    let task = store
        .task(args.id)
        .with_context(|| format!("failed to load task {}", args.id))?;
    print_json(&StatusChange {
        task_id: args.id,
        changed,
        task,
    })?;
    if !changed {
        warn!(event = "task_status_unchanged", task_id = %args.id);
        bail!("task {} is missing or no longer pending", args.id);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reconcile_accepts_repeated_tasks_and_confidence_list() {
        let cli = Cli::try_parse_from([
            "tidy",
            "reconcile",
            "--zone",
            "kitchen",
            "--task",
            "Clean the microwave",
            "--task",
            "Mop the floor",
            "--confidence",
            "0.9,0.7",
        ])
        .expect("parse");

        let Command::Reconcile(args) = cli.command else {
            panic!("expected reconcile");
        };
        assert_eq!(args.zone, "kitchen");
        assert_eq!(args.tasks, vec!["Clean the microwave", "Mop the floor"]);
        assert_eq!(args.confidence, vec![0.9, 0.7]);
        assert!(!args.dry_run);
    }

    #[test]
    fn stdin_conflicts_with_inline_tasks() {
        let err = Cli::try_parse_from([
            "tidy",
            "reconcile",
            "--zone",
            "den",
            "--stdin",
            "--task",
            "Dust shelves",
        ])
        .expect_err("conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn feedback_help_scopes_it_to_one_run() {
        let command = Cli::command();
        let reconcile = command
            .find_subcommand("reconcile")
            .expect("reconcile subcommand");
        let feedback = reconcile
            .get_arguments()
            .find(|arg| arg.get_id() == "feedback")
            .expect("feedback arg");
        let help = feedback
            .get_help()
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(help.contains("this run only"), "{help}");
    }

    #[test]
    fn open_store_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("tidy").join("tasks.db");

        let store = open_store(&path).expect("open");
        assert!(path.exists());
        assert!(store.pending_tasks("kitchen").expect("pending").is_empty());
    }

    #[test]
    fn task_target_parses_id() {
        let cli = Cli::try_parse_from(["tidy", "done", "42", "--user", "sam"]).expect("parse");
        let Command::Complete(args) = cli.command else {
            panic!("expected complete");
        };
        assert_eq!(args.id, TaskId(42));
        assert_eq!(args.user.as_deref(), Some("sam"));
    }

    #[test]
    fn plain_descriptions_leave_confidence_empty() {
        let (descriptions, confidence) =
            parse_detected(r#"["Dust shelves", "Fold blankets"]"#, 0.8).expect("parse");
        assert_eq!(descriptions, vec!["Dust shelves", "Fold blankets"]);
        assert!(confidence.is_empty());
    }

    #[test]
    fn mixed_entries_fill_missing_confidence() {
        let input = r#"[
            {"description": "Dust shelves", "confidence": 0.92},
            "Fold blankets",
            {"description": "Water the fern"}
        ]"#;
        let (descriptions, confidence) = parse_detected(input, 0.8).expect("parse");
        assert_eq!(descriptions.len(), 3);
        assert_eq!(confidence, vec![0.92, 0.8, 0.8]);
    }

    #[test]
    fn non_array_input_is_rejected() {
        let err = parse_detected(r#"{"tasks": []}"#, 0.8).expect_err("object");
        assert!(err.to_string().contains("JSON array"));
    }
}
