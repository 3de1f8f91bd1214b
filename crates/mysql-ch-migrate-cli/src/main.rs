//! mysql-ch-migrate CLI - Streaming MySQL to ClickHouse migration.

use clap::{Parser, Subcommand};
use mysql_ch_migrate::events::{ChannelSink, DroppedEvents};
use mysql_ch_migrate::state::{LedgerRunSink, DEFAULT_LOG_LIMIT, DEFAULT_TASK_LIMIT};
use mysql_ch_migrate::{
    health_check, Config, MigrateError, MigrationEvent, Orchestrator, RunStatistics, RunStatus,
    SqliteLedger, TeeSink, TracingSink,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Capacity of the per-run event channel drained into the ledger.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

const CONFIG_TEMPLATE: &str = r#"# mysql-ch-migrate configuration
source:
  host: 127.0.0.1
  port: 3306
  database: shop
  user: reader
  password: ""
  charset: utf8mb4
  ssl_mode: preferred

target:
  host: 127.0.0.1
  port: 8123
  database: analytics
  user: default
  password: ""
  secure: false

migration:
  default_batch_size: 10000
  default_verify: true
  log_interval: 3
  progress_bar_width: 40
  tables:
    - source_table: orders
      target_table: orders
      # batch_size: 20000
      # verify: false

advanced:
  drop_table_before_create: true
  skip_empty_tables: true
  continue_on_error: false

performance:
  connection_timeout: 30
  read_timeout: 60
  max_connections: 4

notification:
  enabled: false
  webhook_url: ""
  env_name: Production
  project_name: Data Migration

ledger:
  enabled: true
  path: migration_tasks.db
"#;

#[derive(Parser)]
#[command(name = "mysql-ch-migrate")]
#[command(about = "Streaming MySQL to ClickHouse snapshot migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new migration
    Run {
        /// Name recorded in the task ledger
        #[arg(long)]
        task_name: Option<String>,

        /// Continue with the next table when one fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// Show recent runs from the task ledger
    History {
        /// Number of runs to list
        #[arg(long, default_value_t = DEFAULT_TASK_LIMIT)]
        limit: u32,

        /// Show one run with its table results and logs
        #[arg(long)]
        task_id: Option<i64>,
    },

    /// Write a starter configuration file
    Init {
        /// Output path for configuration file [default: config.yaml]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Init doesn't need an existing config
    if let Commands::Init { output, force } = &cli.command {
        let output_path = output.clone().unwrap_or_else(|| PathBuf::from("config.yaml"));
        return write_template(&output_path, *force);
    }

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above

        Commands::Run {
            task_name,
            continue_on_error,
        } => {
            if continue_on_error {
                config.advanced.continue_on_error = true;
            }
            let cancel_token = setup_signal_handler().await?;
            let stats = run_migration(config, task_name, cancel_token).await?;

            if cli.output_json {
                println!("{}", stats.to_json()?);
            } else {
                print_summary(&stats);
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::connect(config).await?;
            let result = orchestrator.validate().await;
            orchestrator.close().await;
            let entries = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Validation Results:");
                for entry in &entries {
                    match (&entry.outcome, &entry.error) {
                        (Some(outcome), _) => println!(
                            "  {} {} -> {}: source {} | target {}",
                            if outcome.matched() { "✓" } else { "✗" },
                            entry.source_table,
                            entry.target_table,
                            outcome.source_count,
                            outcome.target_count
                        ),
                        (None, error) => println!(
                            "  ✗ {} -> {}: {}",
                            entry.source_table,
                            entry.target_table,
                            error.as_deref().unwrap_or("unknown error")
                        ),
                    }
                }
            }

            let mismatched = entries.iter().filter(|e| !e.matched()).count();
            if mismatched > 0 {
                return Err(MigrateError::transfer(
                    "validate",
                    format!("{} of {} tables do not match", mismatched, entries.len()),
                ));
            }
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source.connected { "OK" } else { "FAILED" },
                    result.source.latency_ms
                );
                if let Some(ref err) = result.source.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (ClickHouse): {} ({}ms)",
                    if result.target.connected { "OK" } else { "FAILED" },
                    result.target.latency_ms
                );
                if let Some(ref err) = result.target.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "Health check failed",
                    "testing source and target connections",
                ));
            }
        }

        Commands::History { limit, task_id } => {
            let ledger = SqliteLedger::open(&config.ledger.path).await?;
            let result = show_history(&ledger, limit, task_id, cli.output_json).await;
            ledger.close().await;
            result?;
        }
    }

    Ok(())
}

/// Run one migration, recording it in the task ledger when enabled.
async fn run_migration(
    config: Config,
    task_name: Option<String>,
    cancel: CancellationToken,
) -> Result<RunStatistics, MigrateError> {
    let ledger = if config.ledger.enabled {
        match open_task(&config, task_name).await {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!("Task ledger unavailable, run will not be recorded: {}", e);
                None
            }
        }
    } else {
        None
    };

    let orchestrator = match Orchestrator::connect(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            if let Some(sink) = &ledger {
                let _ = sink
                    .ledger()
                    .update_task_status(sink.task_id(), RunStatus::Failed, None, Some(&e.to_string()))
                    .await;
                sink.ledger().close().await;
            }
            return Err(e);
        }
    };
    let mut orchestrator = orchestrator.with_cancel(cancel);

    let mut drain = None;
    if let Some(sink) = &ledger {
        let (channel, rx) = ChannelSink::channel(EVENT_CHANNEL_CAPACITY);
        drain = Some(drain_events(sink.clone(), rx, channel.dropped()));
        orchestrator = orchestrator
            .with_run_sink(Arc::new(sink.clone()))
            .with_events(Arc::new(TeeSink::new(TracingSink, channel)));
    }

    info!("Starting migration run {}", orchestrator.run_id());
    let result = orchestrator
        .spawn()
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(e)))?;

    // The orchestrator owned the channel sender, so the drain ends on its own.
    if let Some(handle) = drain {
        let _ = handle.await;
    }
    if let Some(sink) = &ledger {
        info!("Run recorded as task {}", sink.task_id());
        sink.ledger().close().await;
    }

    result
}

async fn open_task(config: &Config, task_name: Option<String>) -> Result<LedgerRunSink, MigrateError> {
    let ledger = SqliteLedger::open(&config.ledger.path).await?;
    let name = task_name.unwrap_or_else(|| {
        format!("migration_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
    });
    let task_id = ledger
        .create_task(
            &name,
            &config.redacted_snapshot()?,
            &config.hash(),
            config.migration.tables.len(),
        )
        .await?;
    Ok(ledger.run_sink(task_id))
}

/// Copy a run's events into the ledger's log table.
fn drain_events(
    sink: LedgerRunSink,
    mut rx: mpsc::Receiver<MigrationEvent>,
    dropped: DroppedEvents,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let level = event.level();
            if level == Level::DEBUG || level == Level::TRACE {
                continue;
            }
            if let Err(e) = sink
                .ledger()
                .add_log(sink.task_id(), level.as_str(), &event.to_string())
                .await
            {
                warn!("Failed to write run log: {}", e);
            }
        }

        let missed = dropped.count();
        if missed > 0 {
            let text = format!("{} run events were dropped from the task log (channel full)", missed);
            warn!("{}", text);
            let _ = sink.ledger().add_log(sink.task_id(), "WARN", &text).await;
        }
    })
}

async fn show_history(
    ledger: &SqliteLedger,
    limit: u32,
    task_id: Option<i64>,
    output_json: bool,
) -> Result<(), MigrateError> {
    let Some(task_id) = task_id else {
        let tasks = ledger.list_tasks(limit).await?;
        if output_json {
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            return Ok(());
        }
        println!("Recent runs:");
        for task in &tasks {
            println!(
                "  #{} {} [{}] started {} | tables {}/{} ({} failed) | rows {} | {:.2}s",
                task.id,
                task.task_name,
                task.status,
                task.start_time.as_deref().unwrap_or("-"),
                task.success_tables,
                task.total_tables,
                task.failed_tables,
                task.total_rows,
                task.total_time
            );
        }
        return Ok(());
    };

    let task = ledger
        .get_task(task_id)
        .await?
        .ok_or_else(|| MigrateError::Config(format!("Task {} not found", task_id)))?;
    let tables = ledger.get_table_migrations(task_id).await?;
    let logs = ledger.get_task_logs(task_id, DEFAULT_LOG_LIMIT).await?;

    if output_json {
        let detail = serde_json::json!({ "task": task, "tables": tables, "logs": logs });
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("Task #{}: {} [{}]", task.id, task.task_name, task.status);
    println!(
        "  Started: {}  Ended: {}",
        task.start_time.as_deref().unwrap_or("-"),
        task.end_time.as_deref().unwrap_or("-")
    );
    if let Some(ref err) = task.error_message {
        println!("  Error: {}", err);
    }
    println!("  Tables:");
    for t in &tables {
        println!(
            "    {} -> {} [{}] rows {} | {:.2}s | verified: {}",
            t.source_table, t.target_table, t.status, t.rows, t.time_used, t.verified
        );
        if let Some(ref err) = t.error_message {
            println!("      Error: {}", err);
        }
    }
    println!("  Logs (newest first):");
    for log in &logs {
        println!("    {} [{}] {}", log.log_time, log.log_level, log.log_message);
    }
    Ok(())
}

fn print_summary(stats: &RunStatistics) {
    println!("\nMigration completed!");
    println!("  Tables: {}/{}", stats.success_tables, stats.total_tables);
    println!("  Failed: {}", stats.failed_tables);
    println!("  Rows: {}", stats.total_rows);
    println!("  Duration: {:.2}s", stats.total_elapsed);
    println!("  Throughput: {:.0} rows/sec", stats.avg_speed);
    let failed: Vec<&str> = stats
        .tables
        .iter()
        .filter(|t| t.error.is_some())
        .map(|t| t.source_table.as_str())
        .collect();
    if !failed.is_empty() {
        println!("  Failed tables: {:?}", failed);
    }
}

fn write_template(path: &Path, force: bool) -> Result<(), MigrateError> {
    if path.exists() && !force {
        return Err(MigrateError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    std::fs::write(path, CONFIG_TEMPLATE)?;
    println!("Wrote configuration template to {}", path.display());
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the run on SIGINT or SIGTERM.
/// The current batch finishes, then the run stops with a cancelled status.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping after the current batch..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping after the current batch..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Cancel the run on Ctrl-C (Windows).
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_ch_migrate::EventSink;

    #[tokio::test]
    async fn test_drain_records_dropped_event_count() {
        let ledger = SqliteLedger::open_in_memory().await.unwrap();
        let task_id = ledger
            .create_task("drain", &serde_json::json!({}), "hash", 1)
            .await
            .unwrap();

        let (channel, rx) = ChannelSink::channel(1);
        let drain = drain_events(ledger.run_sink(task_id), rx, channel.dropped());
        for i in 0..3 {
            channel.emit(MigrationEvent::Message {
                level: Level::INFO,
                text: format!("event {}", i),
            });
        }
        drop(channel);
        drain.await.unwrap();

        let logs = ledger.get_task_logs(task_id, 100).await.unwrap();
        assert!(logs.iter().any(|l| l.log_message == "event 0"));
        assert!(logs
            .iter()
            .any(|l| l.log_level == "WARN" && l.log_message.starts_with("2 run events were dropped")));
    }
}
