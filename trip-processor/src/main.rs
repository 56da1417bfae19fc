//! Segment processor binary: Kafka in, Kafka out, metrics on the
//! side.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trip_shared::Settings;

use trip_processor::metrics::{install_recorder, MonitoringServer};
use trip_processor::TripProcessor;

#[derive(Parser)]
#[command(
    name = "trip-processor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Derives trip segment events from device telemetry streams"
)]
struct Args {
    /// Settings file path (optional; environment variables override)
    #[arg(short, long, value_name = "FILE", default_value = "settings.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("{},librdkafka=warn", args.log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    match run(&args).await {
        Ok(()) => {
            info!("segment processor shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("segment processor terminated: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let settings = Settings::load(Some(&args.config))?;
    info!(
        brokers = %settings.kafka_brokers,
        group = %settings.consumer_group,
        input = %settings.device_status_topic,
        output = %settings.trip_event_topic,
        "settings loaded"
    );

    let handle = install_recorder()?;
    let monitoring = MonitoringServer::new(handle, settings.mon_port);
    monitoring.start().await?;

    let processor = TripProcessor::new(settings)?;
    processor.check_startup().await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let result = processor.run(shutdown).await;
    monitoring.stop();
    Ok(result?)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
