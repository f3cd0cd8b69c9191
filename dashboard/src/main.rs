//! Speedwatch dashboard - aggregates the sample log and raises speed alerts

#[cfg(feature = "png-charts")]
mod charts;
mod output;
mod sinks;

use anyhow::{Context, Result};
use clap::Parser;
use output::keys::{spawn_key_reader, KeyCommand};
use output::{AlertHistory, TerminalView};
use speedlog::config::LoggingConfig;
use speedlog::filter::parse_time_of_day;
use speedlog::{
    shutdown_channel, Aggregator, AlertDispatcher, ChartType, Config, SampleLog, Snapshot,
    ThresholdConfig, Ticker, TimeRange,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::{Child, Command};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SAMPLER_BIN: &str = "speedwatch-sampler";

#[derive(Parser, Debug)]
#[command(name = "speedwatch")]
#[command(version)]
#[command(about = "Live network speed dashboard with threshold alerts", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "speedwatch.conf")]
    config: PathBuf,

    /// Sample log path (overrides general.log_path)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Start of the displayed time-of-day range (HH:MM[:SS])
    #[arg(long)]
    from: Option<String>,

    /// End of the displayed time-of-day range (HH:MM[:SS])
    #[arg(long)]
    to: Option<String>,

    /// Chart style: line, bar or area
    #[arg(long)]
    chart_type: Option<ChartType>,

    /// Download alert threshold in Mbps
    #[arg(long, allow_negative_numbers = true)]
    download_threshold: Option<f64>,

    /// Upload alert threshold in Mbps
    #[arg(long, allow_negative_numbers = true)]
    upload_threshold: Option<f64>,

    /// Seconds between view refreshes
    #[arg(long)]
    refresh: Option<u64>,

    /// Print one JSON snapshot and exit
    #[arg(long)]
    snapshot: bool,

    /// Write the filtered series to a PNG chart and exit
    #[arg(long, value_name = "PATH")]
    chart: Option<PathBuf>,

    /// Also run the sampler as a child process
    #[arg(long)]
    with_sampler: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(log) = &self.log {
            config.general.log_path = log.display().to_string();
        }
        if let Some(from) = &self.from {
            parse_time_of_day(from).map_err(anyhow::Error::msg)?;
            config.dashboard.time_range_start = Some(from.clone());
        }
        if let Some(to) = &self.to {
            parse_time_of_day(to).map_err(anyhow::Error::msg)?;
            config.dashboard.time_range_end = Some(to.clone());
        }
        if let Some(chart_type) = self.chart_type {
            config.dashboard.chart_type = chart_type;
        }
        if let Some(download) = self.download_threshold {
            config.thresholds.download_mbps = download;
        }
        if let Some(upload) = self.upload_threshold {
            config.thresholds.upload_mbps = upload;
        }
        if let Some(refresh) = self.refresh {
            config.dashboard.refresh_interval_s = refresh;
        }
        config.validate()?;
        Ok(())
    }

    fn one_shot(&self) -> bool {
        self.snapshot || self.chart.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    args.apply(&mut config)?;

    // The live view owns the terminal, so logs only go to a file there
    init_tracing(&config.logging, !args.one_shot())?;
    info!("Speedwatch dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!("Sample log: {}", config.general.log_path);

    let range = config.time_range()?;
    let aggregator = Aggregator::new(SampleLog::new(&config.general.log_path))
        .with_stale_after(config.stale_after());

    if args.one_shot() {
        return run_once(&args, &config, aggregator, &range);
    }

    let _sampler = if args.with_sampler {
        Some(spawn_sampler(&args.config, &config.general.log_path)?)
    } else {
        None
    };

    run_live(config, aggregator, range).await
}

fn run_once(args: &Args, config: &Config, mut aggregator: Aggregator, range: &TimeRange) -> Result<()> {
    let snapshot = aggregator.refresh(&config.thresholds, range, now());

    if let Some(path) = &args.chart {
        export_chart(&snapshot, config.dashboard.chart_type, path)?;
        println!("Chart written to {}", path.display());
    }

    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}

#[cfg(feature = "png-charts")]
fn export_chart(snapshot: &Snapshot, chart_type: ChartType, path: &Path) -> Result<()> {
    charts::export_chart(snapshot, chart_type, path)
        .with_context(|| format!("Failed to write chart to {}", path.display()))
}

#[cfg(not(feature = "png-charts"))]
fn export_chart(_snapshot: &Snapshot, _chart_type: ChartType, _path: &Path) -> Result<()> {
    anyhow::bail!("PNG charts are not available; rebuild with the png-charts feature")
}

async fn run_live(config: Config, mut aggregator: Aggregator, range: TimeRange) -> Result<()> {
    let dispatcher = if config.alerts.enabled {
        let sink = sinks::build_sink(&config.alerts).context("Failed to set up alert sink")?;
        info!("Alerts enabled via {} sink", sink.name());
        Some(AlertDispatcher::new(sink))
    } else {
        info!("Alert delivery disabled");
        None
    };

    let (trigger, shutdown) = shutdown_channel();
    let mut keys = spawn_key_reader(shutdown.clone());
    let mut ticker = Ticker::new(config.refresh_interval(), shutdown);

    let mut thresholds = config.thresholds;
    let mut chart_type = config.dashboard.chart_type;
    let mut history = AlertHistory::default();
    let mut view = TerminalView::enter(true).context("Failed to initialize terminal")?;

    loop {
        let snapshot = aggregator.refresh(&thresholds, &range, now());
        if !snapshot.alert_events.is_empty() {
            history.record(&snapshot.alert_events);
            if let Some(dispatcher) = &dispatcher {
                dispatcher.dispatch_all(&snapshot.alert_events);
            }
        }
        view.draw(&output::render_lines(
            &snapshot,
            chart_type,
            &history,
            config.dashboard.max_rows,
        ))?;

        tokio::select! {
            running = ticker.tick() => {
                if !running {
                    break;
                }
            }
            command = keys.recv() => {
                match command {
                    Some(KeyCommand::Quit) | None => break,
                    Some(KeyCommand::Refresh) => ticker.reset(),
                    Some(KeyCommand::CycleChart) => chart_type = chart_type.next(),
                    Some(KeyCommand::AdjustDownload(step)) => {
                        thresholds.download_mbps = adjust(thresholds.download_mbps, step);
                        info!("Download threshold set to {:.2} Mbps", thresholds.download_mbps);
                    }
                    Some(KeyCommand::AdjustUpload(step)) => {
                        thresholds.upload_mbps = adjust(thresholds.upload_mbps, step);
                        info!("Upload threshold set to {:.2} Mbps", thresholds.upload_mbps);
                    }
                }
            }
        }
    }

    trigger.trigger();
    drop(view);
    info!("Dashboard stopped");
    print_final(&thresholds);
    Ok(())
}

fn adjust(value: f64, step: f64) -> f64 {
    (value + step).max(0.0)
}

fn print_final(thresholds: &ThresholdConfig) {
    println!(
        "Final thresholds: download {:.2} Mbps, upload {:.2} Mbps",
        thresholds.download_mbps, thresholds.upload_mbps
    );
}

fn spawn_sampler(config_path: &Path, log_path: &str) -> Result<Child> {
    let exe = std::env::current_exe()
        .context("Cannot locate dashboard executable")?
        .with_file_name(SAMPLER_BIN);

    let child = Command::new(&exe)
        .arg("--config")
        .arg(config_path)
        .arg("--log")
        .arg(log_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start sampler {}", exe.display()))?;

    match child.id() {
        Some(pid) => info!("Started sampler (pid {})", pid),
        None => warn!("Sampler exited immediately"),
    }
    Ok(child)
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn init_tracing(logging: &LoggingConfig, owns_terminal: bool) -> Result<()> {
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
        None if owns_terminal => builder.with_writer(std::io::sink).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
