use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeClient, Task, TradingMode};
use engine::{run_once, CryptoComClient, Schedule, Scheduler, WorkflowSettings, Workflows};
use exporter::{AppState, MetricsRegistry};
use paper::DryRunClient;

/// Periodic accumulation and equal-weight rebalancing on Crypto.com.
#[derive(Parser)]
#[command(name = "piebot", version, about)]
struct Cli {
    /// Run one task and exit. Without it, production mode starts the scheduler.
    #[arg(value_enum, ignore_case = true)]
    task: Option<CliTask>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliTask {
    Buy,
    Rebalance,
}

impl From<CliTask> for Task {
    fn from(task: CliTask) -> Self {
        match task {
            CliTask::Buy => Task::Buy,
            CliTask::Rebalance => Task::Rebalance,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(errors) => {
            for violation in &errors.0 {
                error!(%violation, "Invalid configuration");
            }
            bail!("configuration has {} problem(s), not starting", errors.0.len());
        }
    };
    info!(mode = %cfg.trading_mode, pairs = cfg.pairs.len(), "PieBot starting");

    if cli.task.is_none() && cfg.trading_mode == TradingMode::DryRun {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "dry-run mode needs a task to run (buy or rebalance)",
            )
            .exit();
    }

    // ── Exchange client ───────────────────────────────────────────────────────
    let live: Arc<dyn ExchangeClient> = Arc::new(
        CryptoComClient::new(
            cfg.api_key.clone(),
            cfg.api_secret.clone(),
            cfg.quote_currency.clone(),
            cfg.http_timeout,
        )
        .context("failed to build exchange client")?,
    );

    live.check_credentials()
        .await
        .context("API key or secret were rejected, please check your credentials")?;
    log_account_table(live.as_ref(), &cfg).await;

    let client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Production => live,
        TradingMode::DryRun => {
            info!("Dry-run mode, orders will be logged but not sent");
            Arc::new(DryRunClient::new(live))
        }
    };

    // ── One-shot ──────────────────────────────────────────────────────────────
    if let Some(task) = cli.task {
        let workflows = Workflows::new(
            client,
            Arc::new(common::NoopMetrics),
            WorkflowSettings::from(&cfg),
        );
        return run_once(&workflows, task.into())
            .await
            .with_context(|| format!("{} failed", Task::from(task)));
    }

    // ── Service ───────────────────────────────────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new());
    let workflows = Workflows::new(client, metrics.clone(), WorkflowSettings::from(&cfg));

    let exporter_state = AppState {
        metrics,
        trading_mode: cfg.trading_mode,
    };
    let port = cfg.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = exporter::serve(exporter_state, port).await {
            error!(error = %e, port, "Metrics exporter stopped");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, finishing current job");
        let _ = shutdown_tx.send(true);
    });

    let schedule = Schedule::from_config(&cfg, Local::now().naive_local());
    info!("Waiting to be called...");
    Scheduler::new(workflows, schedule).run(shutdown_rx).await;

    info!("PieBot stopped");
    Ok(())
}

/// Log every held coin. A failure here is not fatal.
async fn log_account_table(client: &dyn ExchangeClient, cfg: &Config) {
    match client.account_summary(&cfg.pairs).await {
        Ok(positions) => {
            info!(account = %cfg.account_name, "{:<8} {:>18} {:>14} {:>14}  state", "coin", "balance", "price", "value");
            for p in &positions {
                info!(
                    account = %cfg.account_name,
                    "{:<8} {:>18} {:>14} {:>14.2}  {}",
                    p.coin,
                    p.balance.normalize(),
                    p.price.normalize(),
                    p.value(),
                    p.state
                );
            }
        }
        Err(e) => warn!(error = %e, "Could not load account summary"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
