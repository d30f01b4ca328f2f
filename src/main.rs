use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitalstream::config::StreamConfig;
use vitalstream::engine::{PipelineParts, StreamingPipeline};
use vitalstream::hal::mock::{
    JsonCodec, LogActuator, LogRenderer, SimulatedConnector, SimulatedMonitorConfig, StubModel,
};
use vitalstream::hal::BloodPressureModel;
use vitalstream::resilience::Watchdog;
use vitalstream::stream::{PlethQuality, TelemetryStream};

/// Bedside monitor telemetry client with blood-pressure estimation
#[derive(Parser, Debug)]
#[command(name = "vitalstream", version)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<String>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Stream readings to the log only, without estimation or alarms
    #[arg(long)]
    headless: bool,
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(cli: &Cli) -> Result<StreamConfig> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StreamConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    Ok(config)
}

fn spawn_stop_triggers(stop: Arc<AtomicBool>, duration: Option<f64>) {
    let on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            on_signal.store(true, Ordering::SeqCst);
        }
    });
    if let Some(secs) = duration.and_then(|s| Duration::try_from_secs_f64(s).ok()) {
        tokio::spawn(async move {
            tokio::time::sleep(secs).await;
            info!("Run duration elapsed, shutting down");
            stop.store(true, Ordering::SeqCst);
        });
    }
}

/// Time given to the stages after a watchdog stop before the process exits
const WATCHDOG_DRAIN: Duration = Duration::from_millis(500);

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    info!("Starting vitalstream on {}", config.port);

    let mut pipeline = (!cli.headless).then(|| StreamingPipeline::new(config.clone()));
    let stop = match &pipeline {
        Some(pipeline) => pipeline.stop_handle(),
        None => Arc::new(AtomicBool::new(false)),
    };
    spawn_stop_triggers(stop.clone(), cli.duration);

    // A stalled poll means the link is wedged beyond recovery
    let watchdog = Watchdog::spawn_with_stop(
        config.pipeline.watchdog(),
        stop.clone(),
        WATCHDOG_DRAIN,
        || {
            error!("Telemetry poll stalled, exiting");
            std::process::exit(2);
        },
    );

    let connector = SimulatedConnector::new(SimulatedMonitorConfig::default());
    let stream = TelemetryStream::new(&config, Box::new(connector), Arc::new(JsonCodec::new()))
        .with_post_processor(Box::new(PlethQuality::new()))
        .with_watchdog(watchdog.handle())
        .with_stop_flag(stop);

    let Some(pipeline) = pipeline.as_mut() else {
        let mut stream = stream;
        tokio::task::spawn_blocking(move || stream.run())
            .await
            .context("telemetry task panicked")??;
        return Ok(());
    };

    let parts = PipelineParts {
        stream,
        model_factory: Box::new(|| Ok(Box::new(StubModel::new()) as Box<dyn BloodPressureModel>)),
        render: Box::new(LogRenderer),
        actuator: Box::new(LogActuator),
    };
    let summary = pipeline.run(parts).await?;
    info!(
        "Pipeline finished: {} frames, {} alarm edges, {} estimator restarts",
        summary.frames_rendered, summary.alarm_edges, summary.estimator_restarts
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
