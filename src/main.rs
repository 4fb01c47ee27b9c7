// taskmint - turns recurring behavior into suggested tasks
//
// This is the main entry point. Parses CLI args and dispatches to handlers.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::env;
use std::sync::Arc;
use taskmint_lib::{
    core::{ActivityLogger, NoteSearcher},
    db::TaskStatus,
    engine::{
        GeneratorConfig, MinerConfig, Pipeline, SequenceMiner, TaskGenerator, TaskPrioritizer,
    },
    Database, EngineError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskmint=warn")),
        )
        .with_target(false)
        .init();

    // Grab whatever the user typed
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let command = &args[1];

    let result = match command.as_str() {
        "log" => handle_log(&args[2..]).await,
        "import" => handle_import(&args[2..]).await,
        "mine" => handle_mine(&args[2..]).await,
        "suggest" => handle_suggest(&args[2..]).await,
        "prioritize" => handle_prioritize(&args[2..]).await,
        "run" => handle_run(&args[2..]).await,
        "notes" => handle_notes(&args[2..]).await,
        "tasks" => handle_tasks(&args[2..]).await,
        "task-status" => handle_task_status(&args[2..]).await,
        "feedback" => handle_feedback(&args[2..]).await,
        "tag" => handle_tag(&args[2..]).await,
        "search" => handle_search(&args[2..]).await,
        "flag" => handle_flag(&args[2..]).await,
        "status" => handle_status().await,
        "version" | "-v" | "--version" => {
            println!("taskmint v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            Ok(())
        }
    };

    // Boundary translation: engine errors get their user-facing message and
    // an exit code that says whether retrying makes sense.
    if let Err(e) = result {
        if let Some(engine_err) = e.downcast_ref::<EngineError>() {
            eprintln!("Error: {}", engine_err.user_message());
            std::process::exit(if engine_err.is_retryable() { 2 } else { 1 });
        }
        return Err(e);
    }

    Ok(())
}

async fn handle_log(args: &[String]) -> anyhow::Result<()> {
    // Parse flags and extract the activity label
    let mut positional = Vec::new();
    let mut recorded_at: Option<DateTime<Utc>> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--at" => {
                i += 1;
                if i < args.len() {
                    let parsed = DateTime::parse_from_rfc3339(&args[i])
                        .map_err(|e| EngineError::InvalidActivity(format!("bad --at timestamp: {}", e)))?;
                    recorded_at = Some(parsed.with_timezone(&Utc));
                }
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    if positional.len() < 2 {
        eprintln!("Usage: taskmint log <user> <activity> [--at <rfc3339>]");
        return Ok(());
    }

    let user_id = &positional[0];
    let label = positional[1..].join(" ");

    let db = Arc::new(get_database().await?);
    let logger = ActivityLogger::new(db);

    if logger.should_ignore(&label) {
        // Noise events are silently dropped, same as a shell hook would
        return Ok(());
    }

    logger.log(user_id, &label, recorded_at).await?;

    Ok(())
}

async fn handle_import(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint import <user> <activity,activity,...>");
        return Ok(());
    }

    let user_id = &args[0];
    let labels: Vec<String> = args[1..]
        .join(" ")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let db = Arc::new(get_database().await?);
    let logger = ActivityLogger::new(db);

    let ids = logger.log_batch(user_id, labels).await?;
    println!("Imported {} activities for {}", ids.len(), user_id);

    Ok(())
}

async fn handle_mine(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint mine <user> [--min-len N] [--max-len N] [--threshold N]");
        return Ok(());
    }

    let user_id = &args[0];
    let mut config = MinerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--min-len" => {
                i += 1;
                if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.min_len = v;
                }
            }
            "--max-len" => {
                i += 1;
                if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.max_len = v;
                }
            }
            "--threshold" => {
                i += 1;
                if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.recurrence_threshold = v;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let db = Arc::new(get_database().await?);
    let miner = SequenceMiner::new(db);

    println!("\n⛏  Mining activity history for {}...\n", user_id);
    let outcome = miner.mine(user_id, &config).await?;

    println!(
        "Process notes: {} created, {} updated",
        outcome.notes_created, outcome.notes_updated
    );

    Ok(())
}

async fn handle_suggest(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint suggest <user> [--min-occurrence N] [--recency-days N]");
        return Ok(());
    }

    let user_id = &args[0];
    let mut config = GeneratorConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--min-occurrence" => {
                i += 1;
                if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.min_occurrence = v;
                }
            }
            "--recency-days" => {
                i += 1;
                if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.recency_days = v;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let db = Arc::new(get_database().await?);
    let generator = TaskGenerator::new(db);

    let created = generator.generate(user_id, &config).await?;

    if created.is_empty() {
        println!("No new suggestions. Mine more history or loosen the filters.");
    } else {
        println!("\n💡 Suggested {} task(s):", created.len());
        println!("{}", "=".repeat(60));
        for task in &created {
            println!(
                "  [{}] {} (priority {:.2})",
                task.id,
                task.description,
                task.priority_score.unwrap_or_default()
            );
        }
        println!("{}", "=".repeat(60));
    }

    Ok(())
}

async fn handle_prioritize(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint prioritize <user> [--apply]");
        return Ok(());
    }

    let user_id = &args[0];
    let apply = args.iter().any(|arg| arg == "--apply");

    let db = Arc::new(get_database().await?);
    let prioritizer = TaskPrioritizer::new(db);

    // The gate is checked here at the boundary, before any scoring work
    prioritizer.ensure_enabled().await?;

    let adjustments = prioritizer.reprioritize(user_id, apply).await?;

    if adjustments.is_empty() {
        println!("No open tasks to score.");
        return Ok(());
    }

    println!("\n📊 Priority review for {}:", user_id);
    println!("{}", "=".repeat(60));
    for adjustment in &adjustments {
        let marker = if (adjustment.suggested_score - adjustment.original_score).abs() > 1e-6 {
            "*"
        } else {
            " "
        };
        println!(
            " {} task {:>4}: {:.3} -> {:.3}",
            marker, adjustment.task_id, adjustment.original_score, adjustment.suggested_score
        );
    }
    println!("{}", "=".repeat(60));

    if !apply {
        println!("Preview only. Re-run with --apply to save the new scores.");
    }

    Ok(())
}

async fn handle_run(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint run <user> [--apply]");
        return Ok(());
    }

    let user_id = &args[0];
    let apply = args.iter().any(|arg| arg == "--apply");

    let db = Arc::new(get_database().await?);
    let pipeline = Pipeline::new(db);

    println!("\n🔍 Running full pass for {}...\n", user_id);
    let report = pipeline.run(user_id, apply).await?;

    println!("{}", "=".repeat(60));
    println!("Notes:  {} created, {} updated", report.notes_created, report.notes_updated);
    println!("Tasks:  {} suggested", report.tasks_created.len());
    println!("Scores: {} reviewed", report.adjustments.len());
    println!("{}", "=".repeat(60));

    Ok(())
}

async fn handle_notes(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint notes <user> [limit]");
        return Ok(());
    }

    let user_id = &args[0];
    let limit = args.get(1).and_then(|s| s.parse::<usize>().ok()).unwrap_or(10);

    let db = get_database().await?;
    let notes = db.list_notes_by_user(user_id, None, None).await?;

    if notes.is_empty() {
        println!("No process notes yet. Run 'taskmint mine {}' first.", user_id);
        return Ok(());
    }

    println!("\nProcess notes for {}:", user_id);
    println!("{}", "=".repeat(60));
    for note in notes.iter().take(limit) {
        println!(
            "  [{}] {} (seen {}x, last {})",
            note.id,
            note.steps_description,
            note.occurrence_count,
            note.last_observed_at.format("%Y-%m-%d")
        );
        if let Some(feedback) = &note.user_feedback {
            println!("       feedback: {}", feedback);
        }
        let tags = note.get_user_tags();
        if !tags.is_empty() {
            println!("       tags: {}", tags.join(", "));
        }
    }
    println!("{}", "=".repeat(60));

    Ok(())
}

async fn handle_tasks(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        eprintln!("Usage: taskmint tasks <user>");
        return Ok(());
    }

    let user_id = &args[0];
    let db = get_database().await?;
    let tasks = db.list_open_tasks_for_user(user_id).await?;

    if tasks.is_empty() {
        println!("No open tasks for {}.", user_id);
        return Ok(());
    }

    println!("\nOpen tasks for {}:", user_id);
    println!("{}", "=".repeat(60));
    for task in &tasks {
        println!(
            "  [{}] ({}) {} — priority {:.2}",
            task.id,
            task.status,
            task.description,
            task.priority_score.unwrap_or_default()
        );
    }
    println!("{}", "=".repeat(60));

    Ok(())
}

async fn handle_task_status(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint task-status <task-id> <status>");
        eprintln!("Statuses: suggested, accepted, in_progress, completed, archived");
        return Ok(());
    }

    let task_id: i64 = args[0]
        .parse()
        .map_err(|_| EngineError::InvalidActivity(format!("bad task id: {}", args[0])))?;
    let new_status: TaskStatus = args[1].parse()?;

    let db = get_database().await?;
    let task = db.update_task_status(task_id, new_status).await?;

    println!("Task {} is now '{}'", task.id, task.status);

    Ok(())
}

async fn handle_feedback(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint feedback <note-id> <text...>");
        return Ok(());
    }

    let note_id: i64 = args[0]
        .parse()
        .map_err(|_| EngineError::InvalidActivity(format!("bad note id: {}", args[0])))?;
    let text = args[1..].join(" ");

    let db = get_database().await?;
    db.set_note_feedback(note_id, &text).await?;

    println!("Feedback saved on note {}", note_id);

    Ok(())
}

async fn handle_tag(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint tag <note-id> <tag,tag,...>");
        return Ok(());
    }

    let note_id: i64 = args[0]
        .parse()
        .map_err(|_| EngineError::InvalidActivity(format!("bad note id: {}", args[0])))?;
    let tags: Vec<String> = args[1..]
        .join(" ")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let db = get_database().await?;
    db.set_note_tags(note_id, tags).await?;

    println!("Tags saved on note {}", note_id);

    Ok(())
}

async fn handle_search(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint search <user> <query>");
        return Ok(());
    }

    let user_id = &args[0];
    let query = args[1..].join(" ");

    let db = Arc::new(get_database().await?);
    let searcher = NoteSearcher::new(db);

    let results = searcher.search(user_id, &query, 20).await?;

    if results.is_empty() {
        println!("No notes found matching '{}'", query);
    } else {
        println!("\nFound {} note(s) matching '{}':", results.len(), query);
        println!("{}", "=".repeat(60));
        for result in &results {
            println!(
                "  [{}] {} (seen {}x)",
                result.note.id, result.note.steps_description, result.note.occurrence_count
            );
        }
        println!("{}", "=".repeat(60));
    }

    Ok(())
}

async fn handle_flag(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: taskmint flag <name> <on|off>");
        return Ok(());
    }

    let name = &args[0];
    let enabled = match args[1].as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => {
            eprintln!("Expected 'on' or 'off', got '{}'", other);
            return Ok(());
        }
    };

    let db = get_database().await?;
    db.set_feature_enabled(name, enabled).await?;

    println!("Feature '{}' is now {}", name, if enabled { "on" } else { "off" });

    Ok(())
}

async fn handle_status() -> anyhow::Result<()> {
    let db = get_database().await?;
    let stats = db.stats().await?;

    println!("\ntaskmint Status");
    println!("{}", "=".repeat(60));
    println!("  Activities:    {}", stats.total_activities);
    println!("  Process notes: {}", stats.total_notes);
    println!("  Tasks:         {}", stats.total_tasks);
    println!("  Database:      {}", db.path().display());
    println!("{}", "=".repeat(60));

    Ok(())
}

async fn get_database() -> anyhow::Result<Database> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let db_path = home.join(".taskmint").join("taskmint.db");
    Ok(Database::new(db_path).await?)
}

fn print_usage() {
    println!(
        r#"taskmint v{} - your routines, noticed

USAGE:
    taskmint <COMMAND> [OPTIONS]

COMMANDS:
    log <user> <activity>         Record one activity (--at <rfc3339> to backdate)
    import <user> <a,b,c>         Import a comma-separated batch of activities
    mine <user>                   Detect recurring sequences as process notes
    suggest <user>                Turn strong recent notes into suggested tasks
    prioritize <user> [--apply]   Preview (or apply) task priority re-scoring
    run <user> [--apply]          Full pass: mine, suggest, prioritize
    notes <user> [limit]          List process notes
    tasks <user>                  List open tasks
    task-status <id> <status>     Move a task to a new status
    feedback <note-id> <text>     Attach reviewer feedback to a note
    tag <note-id> <tags>          Tag a note (comma-separated)
    search <user> <query>         Fuzzy-search process notes
    flag <name> <on|off>          Toggle a feature flag
    status                        Show database stats
    version                       Show version
    help                          Show this help

EXAMPLES:
    taskmint log alice open_editor
    taskmint import alice "open_editor,run_tests,commit"
    taskmint mine alice
    taskmint suggest alice
    taskmint prioritize alice --apply
"#,
        env!("CARGO_PKG_VERSION")
    );
}
