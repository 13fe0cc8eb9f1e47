use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use sitelink_core::config::{load_dotenv, StaleMode as ConfigStaleMode};
use sitelink_core::Config;
use sitelink_edge_store::EdgeEventStore;
use sitelink_phase_engine::{StaleConfig, StaleMode, TimeWindow};
use sitelink_pipeline::Resources;
use sitelink_workflow::{init_registry, resolve_phase_engine, resolve_scheduler_engine, ConfigError, PipelineSchedule, PluginRegistry, WorkflowRunner};

/// `sitelinkd`: single entry point, no subcommands (spec §6 "CLI").
#[derive(Parser, Debug)]
#[command(name = "sitelinkd", about = "Integration daemon control plane")]
struct CliArgs {
    /// Override `PIPELINE_SCHEDULE_PATH` for this run.
    #[arg(long)]
    schedule: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::from(0),
        Err(e) if e.chain().any(|c| c.downcast_ref::<ConfigError>().is_some()) => {
            error!(error = %e, "startup configuration error");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "unrecoverable runtime error");
            ExitCode::from(2)
        }
    }
}

/// Startup sequence (spec §4.6): load config, resolve engines, start
/// ingestion, build the pipeline registry, then run until a shutdown
/// signal arrives.
async fn run(args: CliArgs) -> Result<()> {
    load_dotenv();
    let mut config = Config::from_env();
    if let Some(path) = args.schedule {
        config.pipeline_schedule_path = config.config_root.join(path);
    }
    config.log_summary();

    let schedule = PipelineSchedule::load(&config.pipeline_schedule_path)
        .map_err(anyhow::Error::new)
        .context("failed to load pipeline schedule")?;

    let plugins = PluginRegistry::with_builtins();
    let tz = chrono_tz::Tz::from_str(&config.scheduler.tz_name)
        .map_err(|_| ConfigError::InvalidTimezone(config.scheduler.tz_name.clone()))?;
    let windows = parse_windows(&config.scheduler.windows)?;

    let scheduler_engine = resolve_scheduler_engine(config.plugins.scheduler_engine.as_deref(), &windows, tz)
        .map_err(anyhow::Error::new)
        .context("failed to resolve scheduler engine")?;

    let stale = StaleConfig {
        stale_secs: config.edge_event.stale_secs,
        mode: match config.edge_event.stale_mode {
            ConfigStaleMode::Freeze => StaleMode::Freeze,
            ConfigStaleMode::Unknown => StaleMode::Unknown,
        },
        unknown_phase: sitelink_core::Phase::new(&config.edge_event.unknown_phase),
    };
    let phase_engine = resolve_phase_engine(
        config.plugins.phase_engine.as_deref(),
        scheduler_engine,
        config.phase_stable_secs as f64,
        stale,
    )
    .map_err(anyhow::Error::new)
    .context("failed to resolve phase engine")?;

    let selector = plugins
        .resolve_selector(config.plugins.pipeline_selector.as_deref())
        .map_err(anyhow::Error::new)
        .context("failed to resolve pipeline selector")?;

    let registry = init_registry(&schedule, config.format_task_enabled)
        .map_err(anyhow::Error::new)
        .context("failed to build pipeline registry")?;

    let store = Arc::new(EdgeEventStore::new());
    let adapter = WorkflowRunner::default_adapter(&config);

    let resources = Resources {
        edge_event_store: store.clone(),
        edge_comm_adapter: adapter,
        ingestion_engine: plugins
            .resolve_ingestion_engine(config.plugins.ingestion_engine.as_deref())
            .map_err(anyhow::Error::new)?,
        tracking_engine: plugins
            .resolve_tracking_engine(config.plugins.tracking_engine.as_deref())
            .map_err(anyhow::Error::new)?,
        format_strategy: plugins
            .resolve_format_strategy(config.plugins.format_strategy.as_deref())
            .map_err(anyhow::Error::new)?,
        rule_engine: plugins
            .resolve_rule_engine(config.plugins.rules_engine.as_deref())
            .map_err(anyhow::Error::new)?,
        dispatch_engine: plugins
            .resolve_dispatch_engine(
                config.plugins.event_dispatch_engine.as_deref(),
                Duration::from_secs(config.handler_timeout_secs),
            )
            .map_err(anyhow::Error::new)?,
    };

    let runner = Arc::new(WorkflowRunner::new(config, store, phase_engine, selector, registry, resources));

    runner.start().await.context("failed to start event ingestion")?;
    info!("sitelinkd started");

    let shutdown_runner = runner.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_runner.request_shutdown();
    });

    runner.run().await.context("workflow runner exited with an error")?;
    Ok(())
}

/// Comma-separated `"HH:MM-HH:MM"` windows from `SchedulerConfig::windows`
/// (spec §9 Open Question resolution, see DESIGN.md). A malformed window is
/// a startup configuration error, not a runtime one, so this reports
/// `ConfigError` rather than a bare `anyhow` error.
fn parse_windows(raw: &[String]) -> Result<Vec<TimeWindow>, ConfigError> {
    raw.iter()
        .map(|w| {
            let (start, end) = w.split_once('-').ok_or_else(|| ConfigError::InvalidWindow {
                value: w.clone(),
                reason: "expected HH:MM-HH:MM".to_string(),
            })?;
            let start = chrono::NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|e| ConfigError::InvalidWindow {
                value: w.clone(),
                reason: format!("malformed window start: {e}"),
            })?;
            let end = chrono::NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|e| ConfigError::InvalidWindow {
                value: w.clone(),
                reason: format!("malformed window end: {e}"),
            })?;
            Ok(TimeWindow::new(start, end))
        })
        .collect()
}

/// Cancellation (spec §5): SIGINT always, SIGTERM on unix.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
