//! PNG export of the filtered download/upload series

use anyhow::Result;
use plotters::prelude::*;
use speedlog::filter::SeriesPoint;
use speedlog::{ChartType, Snapshot};
use std::path::Path;

const CHART_WIDTH: u32 = 1600;
const CHART_HEIGHT: u32 = 900;

/// Render the snapshot's series in the requested chart style
pub fn export_chart(snapshot: &Snapshot, chart_type: ChartType, output_path: &Path) -> Result<()> {
    let series = &snapshot.filtered_series;
    if series.is_empty() {
        anyhow::bail!("No samples in {} to chart", snapshot.time_range);
    }

    let points: Vec<(i64, f64, f64)> = series
        .iter()
        .map(|p: &SeriesPoint| (p.timestamp.and_utc().timestamp(), p.download_mbps, p.upload_mbps))
        .collect();

    let min_time = points.iter().map(|p| p.0).min().unwrap_or_default();
    // Single-sample series still needs a non-empty x axis
    let max_time = points.iter().map(|p| p.0).max().unwrap_or_default().max(min_time + 1);
    let y_max = points
        .iter()
        .map(|p| p.1.max(p.2))
        .fold(0.0, f64::max)
        .max(snapshot.thresholds.download_mbps)
        .max(snapshot.thresholds.upload_mbps)
        * 1.1;
    let y_max = if y_max > 0.0 { y_max } else { 1.0 };

    let root = BitMapBackend::new(output_path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Network Speed ({})", snapshot.time_range),
            ("sans-serif", 40).into_font(),
        )
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(min_time..max_time, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_label_formatter(&|x| {
            chrono::DateTime::from_timestamp(*x, 0)
                .map(|dt| dt.format("%H:%M:%S").to_string())
                .unwrap_or_default()
        })
        .y_desc("Speed (Mbps)")
        .x_desc("Time")
        .label_style(("sans-serif", 20))
        .axis_desc_style(("sans-serif", 24))
        .draw()?;

    let download: Vec<(i64, f64)> = points.iter().map(|p| (p.0, p.1)).collect();
    let upload: Vec<(i64, f64)> = points.iter().map(|p| (p.0, p.2)).collect();

    match chart_type {
        ChartType::Line => {
            chart
                .draw_series(LineSeries::new(download, BLUE.stroke_width(2)))?
                .label("Download")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
            chart
                .draw_series(LineSeries::new(upload, GREEN.stroke_width(2)))?
                .label("Upload")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN));
        }
        ChartType::Area => {
            chart
                .draw_series(AreaSeries::new(download, 0.0, BLUE.mix(0.3)).border_style(BLUE))?
                .label("Download")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.mix(0.3).filled()));
            chart
                .draw_series(AreaSeries::new(upload, 0.0, GREEN.mix(0.3)).border_style(GREEN))?
                .label("Upload")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], GREEN.mix(0.3).filled()));
        }
        ChartType::Bar => {
            // Side-by-side bars, each a fraction of the gap to the next sample
            let half = bar_half_width(&points);
            chart
                .draw_series(download.iter().map(|&(t, v)| {
                    Rectangle::new([(t - half, 0.0), (t, v)], BLUE.mix(0.7).filled())
                }))?
                .label("Download")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], BLUE.filled()));
            chart
                .draw_series(upload.iter().map(|&(t, v)| {
                    Rectangle::new([(t, 0.0), (t + half, v)], GREEN.mix(0.7).filled())
                }))?
                .label("Upload")
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], GREEN.filled()));
        }
    }

    let thresholds = [
        ("Download threshold", snapshot.thresholds.download_mbps, RED),
        ("Upload threshold", snapshot.thresholds.upload_mbps, MAGENTA),
    ];
    for (label, value, color) in thresholds {
        chart
            .draw_series(LineSeries::new(
                vec![(min_time, value), (max_time, value)],
                color.stroke_width(1),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 20))
        .draw()?;

    root.present()?;
    Ok(())
}

fn bar_half_width(points: &[(i64, f64, f64)]) -> i64 {
    let min_gap = points
        .windows(2)
        .map(|w| w[1].0 - w[0].0)
        .filter(|gap| *gap > 0)
        .min()
        .unwrap_or(2);
    (min_gap * 2 / 5).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_width_follows_sample_spacing() {
        let points = vec![(0, 1.0, 1.0), (30, 1.0, 1.0), (90, 1.0, 1.0)];
        assert_eq!(bar_half_width(&points), 12);
        assert_eq!(bar_half_width(&points[..1]), 1);
    }
}
