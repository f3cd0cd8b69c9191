//! Speedwatch sampler - periodic speed tests into the sample log

mod provider;

use anyhow::{Context, Result};
use clap::Parser;
use speedlog::config::LoggingConfig;
use speedlog::{shutdown_channel, Config, SampleLog, Sampler, Ticker};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speedwatch-sampler")]
#[command(version)]
#[command(about = "Run periodic network speed tests and append them to the sample log", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "speedwatch.conf")]
    config: PathBuf,

    /// Sample log path (overrides general.log_path)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Seconds between samples (overrides sampler.sample_interval_s)
    #[arg(long)]
    interval: Option<u64>,

    /// Take a single sample and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    if let Some(log) = &args.log {
        config.general.log_path = log.display().to_string();
    }
    if let Some(interval) = args.interval {
        config.sampler.sample_interval_s = interval;
    }
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Speedwatch sampler v{}", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Loaded configuration from {:?}", args.config);
    } else {
        warn!("No configuration at {:?}, running with defaults", args.config);
    }
    info!("Sample log: {}", config.general.log_path);

    let provider = provider::SpeedTestProvider::new(Arc::new(config.provider.clone()))
        .context("Failed to initialize speed-test provider")?;
    let mut sampler = Sampler::new(provider, SampleLog::new(&config.general.log_path));

    if args.once {
        let sample = sampler.tick().await?;
        println!(
            "{} down {:.2} Mbps, up {:.2} Mbps, ping {:.2} ms",
            sample.timestamp, sample.download_mbps, sample.upload_mbps, sample.ping_ms
        );
        return Ok(());
    }

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        trigger.trigger();
    });

    info!("Starting sampling loop (Press Ctrl+C to stop)");
    sampler
        .run(Ticker::new(config.sample_interval(), shutdown))
        .await;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level {:?}", logging.level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &logging.path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }

    Ok(())
}
