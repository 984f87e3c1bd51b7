//! Command line interface for the sniping kernel.
mod kernel;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use kernel::{Kernel, Stores};
use prettytable::{Table, row};
use sniper_api::{ApiServer, AppState, AuthConfig, AuthState, ServerConfig};
use sniper_execution::config::KernelConfig;
use sniper_execution::queue::QueueHealth;
use sniper_execution::safety::HaltSwitch;
use sniper_execution::scheduler::Scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sniper")]
#[command(about = "Execution and coordination kernel for new-listing order sniping", long_about = None)]
struct Cli {
    /// Kernel config file (TOML or JSON)
    #[arg(short, long, env = "SNIPER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// PostgreSQL connection string; `run` falls back to in-memory stores,
    /// `health` and `enqueue` refuse to start without it
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server, scheduler, job workers and position monitor
    Run {
        #[arg(long, env = "SNIPER_API_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "SNIPER_API_PORT", default_value_t = 8080)]
        port: u16,

        /// Trade against the simulated exchange
        #[arg(long)]
        paper: bool,

        /// JSON array of candidate targets served to sync jobs
        #[arg(long)]
        targets: Option<PathBuf>,
    },
    /// Load, override and validate the config, then print it
    CheckConfig,
    /// Print the queue health snapshot
    Health,
    /// Enqueue one job
    Enqueue {
        /// Job type (sync, risk_check, housekeeping, snipe_execution)
        job_type: String,

        /// JSON payload; defaults apply when omitted
        #[arg(default_value = "null")]
        payload: String,

        #[arg(long)]
        dedup_key: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn auth_config() -> AuthConfig {
    let api_tokens = std::env::var("SNIPER_API_TOKENS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    AuthConfig {
        api_tokens,
        require_auth: true,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = KernelConfig::load(cli.config.as_deref()).context("loading kernel config")?;

    match cli.command {
        Commands::Run {
            host,
            port,
            paper,
            targets,
        } => {
            run(
                config,
                cli.config,
                cli.database_url,
                ServerConfig { host, port },
                paper,
                targets,
            )
            .await?
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Config OK");
        }
        Commands::Health => {
            let url = kernel::require_database(cli.database_url.as_deref(), "health")?;
            let stores = Stores::open(Some(url)).await?;
            let dispatcher = kernel::dispatcher(&stores, &config, HaltSwitch::new());
            print_health(&dispatcher.health().await);
        }
        Commands::Enqueue {
            job_type,
            payload,
            dedup_key,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let url = kernel::require_database(cli.database_url.as_deref(), "enqueue")?;
            let stores = Stores::open(Some(url)).await?;
            let dispatcher = kernel::dispatcher(&stores, &config, HaltSwitch::new());
            let id = dispatcher.enqueue_raw(&job_type, &payload, dedup_key).await?;
            println!("Enqueued {job_type} job {id}");
        }
    }

    Ok(())
}

async fn run(
    config: KernelConfig,
    config_path: Option<PathBuf>,
    database_url: Option<String>,
    server: ServerConfig,
    paper: bool,
    targets: Option<PathBuf>,
) -> Result<()> {
    let stores = Stores::open(database_url.as_deref()).await?;
    let exchange = kernel::exchange(&config, paper)?;
    let targets = match targets {
        Some(path) => kernel::load_targets(&path)?,
        None => Vec::new(),
    };
    info!(targets = targets.len(), "Starting kernel");

    let mut kernel = Kernel::build(config, &stores, exchange, targets);
    if let Some(path) = &config_path {
        kernel.watch_config(path).await;
    }
    let kernel = Arc::new(kernel);

    let mut scheduler = Scheduler::new();
    for task in kernel.scheduled_tasks() {
        scheduler.add_task(task);
    }
    let mut events = scheduler
        .take_receiver()
        .context("scheduler receiver already taken")?;
    let scheduler_handle = scheduler.handle();
    let scheduler_task = tokio::spawn(async move { scheduler.start().await });

    let workers = kernel.workers();
    let idle_wait = Duration::from_millis(kernel.config.queue.poll_interval_ms);
    for worker in &workers {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(idle_wait).await });
    }

    let state = AppState::new(
        kernel.dispatcher.clone(),
        kernel.coordinator.clone(),
        kernel.safety.clone(),
        AuthState::new(auth_config()),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let api = ApiServer::new(server, state);
    let api_task = tokio::spawn(async move {
        api.run(async move {
            let _ = shutdown_rx.await;
        })
        .await
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => kernel.on_task(&event).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    scheduler_handle.stop();
    for worker in &workers {
        worker.stop();
    }
    let _ = shutdown_tx.send(());
    match api_task.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }
    let _ = scheduler_task.await;
    info!("Kernel stopped");
    Ok(())
}

fn print_health(health: &QueueHealth) {
    let mut table = Table::new();
    table.add_row(row!["Component", "Healthy", "Details"]);
    table.add_row(row!["overall", health.status, ""]);

    let db = &health.db_queue;
    table.add_row(row![
        "db queue",
        db.healthy,
        db.error.clone().unwrap_or_else(|| format!(
            "pending {} / running {} / completed {} / dead {}",
            db.counts.pending, db.counts.running, db.counts.completed, db.counts.dead
        ))
    ]);

    let broker = &health.broker_queues;
    table.add_row(row![
        "broker queues",
        broker.healthy,
        broker.error.clone().unwrap_or_else(|| format!("total {}", broker.total))
    ]);
    for (queue, depth) in &broker.queues {
        table.add_row(row![format!("  {queue}"), "", depth]);
    }

    let mode = &health.execution_mode;
    table.add_row(row![
        "execution mode",
        "",
        format!(
            "primary {} / fallback {} / dual-run {}",
            mode.primary.as_str(),
            mode.fallback_enabled,
            mode.dual_run
        )
    ]);
    table.printstd();

    for recommendation in &health.recommendations {
        println!("- {recommendation}");
    }
}
