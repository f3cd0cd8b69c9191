//! Output and display management

pub mod keys;

use anyhow::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use speedlog::{Alert, ChartType, Metric, Snapshot, ViewStatus};
use std::collections::VecDeque;
use std::io::{stdout, Stdout, Write};

const BAR_WIDTH: usize = 30;
const RECENT_ALERTS: usize = 5;

/// One rendered line with an optional highlight
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub color: Option<Color>,
}

impl Line {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }

    fn colored(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
        }
    }
}

/// Alert history kept across refreshes for display
#[derive(Debug, Default)]
pub struct AlertHistory {
    alerts: VecDeque<Alert>,
}

impl AlertHistory {
    pub fn record(&mut self, alerts: &[Alert]) {
        for alert in alerts {
            self.alerts.push_front(alert.clone());
        }
        self.alerts.truncate(RECENT_ALERTS);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }
}

/// Full-screen terminal view; restores the terminal when dropped
pub struct TerminalView {
    out: Stdout,
    use_colors: bool,
}

impl TerminalView {
    pub fn enter(use_colors: bool) -> Result<Self> {
        let mut out = stdout();
        terminal::enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, Hide)?;
        Ok(Self { out, use_colors })
    }

    pub fn draw(&mut self, lines: &[Line]) -> Result<()> {
        queue!(self.out, Clear(ClearType::All))?;
        for (row, line) in lines.iter().enumerate() {
            queue!(self.out, MoveTo(0, row as u16))?;
            match line.color {
                Some(color) if self.use_colors => {
                    queue!(self.out, SetForegroundColor(color), Print(&line.text), ResetColor)?
                }
                _ => queue!(self.out, Print(&line.text))?,
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Lay out one snapshot as text
pub fn render_lines(
    snapshot: &Snapshot,
    chart_type: ChartType,
    history: &AlertHistory,
    max_rows: usize,
) -> Vec<Line> {
    let mut lines = vec![
        Line::plain(format!(
            "Real-Time Network Speed Monitor            {}",
            snapshot.taken_at.format("%Y-%m-%d %H:%M:%S")
        )),
        Line::plain(format!(
            "Rows: {}   Chart: {}   Range: {}",
            snapshot.aggregates.rows, chart_type, snapshot.time_range
        )),
        Line::plain(""),
    ];

    if snapshot.status == ViewStatus::Waiting {
        lines.push(Line::colored("Waiting for network speed data...", Color::Yellow));
    } else {
        let agg = &snapshot.aggregates;
        lines.push(Line::plain("Metrics Summary"));
        lines.push(metric_line("Average Download Speed", agg.avg_download, "Mbps"));
        lines.push(metric_line("Max Download Speed", agg.max_download, "Mbps"));
        lines.push(metric_line("Min Upload Speed", agg.min_upload, "Mbps"));
        lines.push(Line::plain(""));
        lines.push(Line::plain("Advanced Metrics"));
        lines.push(metric_line("Average Latency", agg.avg_latency, "ms"));
        lines.push(metric_line("Average Jitter", agg.avg_jitter, "ms"));
        lines.push(metric_line("Average Packet Loss", agg.avg_packet_loss, "%"));
        lines.push(metric_line("Connection Stability Index", agg.stability_index, ""));
        lines.push(Line::plain(""));
        lines.extend(series_lines(snapshot, chart_type, max_rows));
    }

    lines.push(Line::plain(""));
    lines.push(threshold_line(snapshot, Metric::Download, history));
    lines.push(threshold_line(snapshot, Metric::Upload, history));

    let recent: Vec<&Alert> = history.iter().collect();
    if !recent.is_empty() {
        lines.push(Line::plain(""));
        lines.push(Line::plain("Recent Alerts"));
        for alert in recent {
            lines.push(Line::colored(
                format!("  {}  {}", alert.sample_timestamp.format("%H:%M:%S"), alert.message),
                Color::Red,
            ));
        }
    }

    if !snapshot.warnings.is_empty() {
        lines.push(Line::plain(""));
        for warning in &snapshot.warnings {
            lines.push(Line::colored(format!("! {}", warning), Color::Yellow));
        }
    }

    lines.push(Line::plain(""));
    lines.push(Line::plain(
        "[q] quit  [d/D] download threshold -/+  [u/U] upload threshold -/+  [c] chart type  [r] refresh",
    ));

    lines
}

fn metric_line(label: &str, value: Option<f64>, unit: &str) -> Line {
    let value = match value {
        Some(v) if unit.is_empty() => format!("{:.2}", v),
        Some(v) if unit == "%" => format!("{:.2}%", v),
        Some(v) => format!("{:.2} {}", v, unit),
        None => "unavailable".to_string(),
    };
    Line::plain(format!("  {:<28}{:>14}", label, value))
}

fn threshold_line(snapshot: &Snapshot, metric: Metric, history: &AlertHistory) -> Line {
    let (threshold, current) = match metric {
        Metric::Download => (
            snapshot.thresholds.download_mbps,
            snapshot.latest.as_ref().map(|s| s.download_mbps),
        ),
        Metric::Upload => (
            snapshot.thresholds.upload_mbps,
            snapshot.latest.as_ref().map(|s| s.upload_mbps),
        ),
    };

    let below = current.is_some_and(|v| v < threshold);
    let text = format!(
        "{} Speed Threshold: {:.2} Mbps   latest: {}",
        metric,
        threshold,
        current.map_or_else(|| "-".to_string(), |v| format!("{:.2} Mbps", v))
    );

    if below {
        Line::colored(format!("{}   LOW", text), Color::Red)
    } else if history.iter().any(|a| a.metric == metric) {
        Line::colored(text, Color::Green)
    } else {
        Line::plain(text)
    }
}

fn series_lines(snapshot: &Snapshot, chart_type: ChartType, max_rows: usize) -> Vec<Line> {
    let series = &snapshot.filtered_series;
    let mut lines = vec![Line::plain(format!(
        "Download / Upload ({} of {} rows in range)",
        series.len().min(max_rows),
        series.len()
    ))];

    if series.is_empty() {
        lines.push(Line::plain("  no samples in the selected time range"));
        return lines;
    }

    let shown = &series[series.len().saturating_sub(max_rows)..];
    let scale = shown
        .iter()
        .map(|p| p.download_mbps.max(p.upload_mbps))
        .fold(0.0, f64::max);

    for point in shown {
        lines.push(Line::plain(format!(
            "  {}  {:>8.2} {:<width$}  {:>8.2} {}",
            point.timestamp.format("%H:%M:%S"),
            point.download_mbps,
            bar(point.download_mbps, scale, chart_type),
            point.upload_mbps,
            bar(point.upload_mbps, scale, chart_type),
            width = BAR_WIDTH
        )));
    }

    lines
}

/// Horizontal glyph bar for one value
pub fn bar(value: f64, scale: f64, chart_type: ChartType) -> String {
    let filled = if scale > 0.0 {
        ((value / scale) * BAR_WIDTH as f64).round() as usize
    } else {
        0
    }
    .min(BAR_WIDTH);

    match chart_type {
        ChartType::Bar => "█".repeat(filled),
        ChartType::Area => "▒".repeat(filled),
        ChartType::Line => {
            if filled == 0 {
                "●".to_string()
            } else {
                format!("{}●", " ".repeat(filled - 1))
            }
        }
    }
}
