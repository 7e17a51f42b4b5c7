use crate::aggregate::AggregatedStat;
use crate::metrics::MetricKind;
use anyhow::{bail, Result};
use log::info;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// Widens `[lo, hi]` by 5% on each side; a degenerate range becomes `lo ± 1`.
pub fn padded_range(lo: f64, hi: f64) -> Range<f64> {
    let span = hi - lo;
    if !(span > 0.0) {
        return (lo - 1.0)..(hi + 1.0);
    }
    (lo - 0.05 * span)..(hi + 0.05 * span)
}

/// Vertical extent covering every `mean ± stdev`, starting at 0 for
/// non-negative data.
pub fn value_range(stats: &[AggregatedStat]) -> Range<f64> {
    let lo = stats.iter().map(|s| s.mean - s.stdev).fold(f64::INFINITY, f64::min);
    let hi = stats.iter().map(|s| s.mean + s.stdev).fold(f64::NEG_INFINITY, f64::max);
    let range = padded_range(lo, hi);
    if lo >= 0.0 {
        0.0..range.end
    } else {
        range
    }
}

/// Draws mean ± stdev of `kind` against the heuristic parameter as a PNG.
pub fn plot_aggregate(
    stats: &[AggregatedStat],
    kind: MetricKind,
    param_label: &str,
    out_path: &Path,
    size: (u32, u32),
) -> Result<()> {
    if stats.is_empty() {
        bail!("No recorded runs to plot");
    }
    let x_range = padded_range(stats[0].heuristic_param, stats[stats.len() - 1].heuristic_param);
    let y_range = value_range(stats);

    let root = BitMapBackend::new(out_path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} vs {}", kind.label(), param_label), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(param_label)
        .y_desc(kind.axis_label())
        .draw()?;

    chart.draw_series(LineSeries::new(
        stats.iter().map(|s| (s.heuristic_param, s.mean)),
        BLUE,
    ))?;
    chart.draw_series(stats.iter().map(|s| {
        ErrorBar::new_vertical(
            s.heuristic_param,
            s.mean - s.stdev,
            s.mean,
            s.mean + s.stdev,
            BLUE.filled(),
            8,
        )
    }))?;

    root.present()?;
    info!("{} chart written to {}", kind.label(), out_path.display());
    Ok(())
}

/// Draws cumulative distance travelled against time as a PNG.
pub fn plot_distance_curve(times: &[f64], cumulative: &[f64], out_path: &Path, size: (u32, u32)) -> Result<()> {
    if times.is_empty() || times.len() != cumulative.len() {
        bail!(
            "Distance curve needs one distance per time step ({} times, {} distances)",
            times.len(),
            cumulative.len()
        );
    }
    let x_range = padded_range(times[0], times[times.len() - 1]);
    let total = cumulative[cumulative.len() - 1];
    let y_range = 0.0..padded_range(0.0, total).end;

    let root = BitMapBackend::new(out_path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Distance travelled over time", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(MetricKind::ElapsedTime.axis_label())
        .y_desc(MetricKind::Distance.axis_label())
        .draw()?;

    chart.draw_series(LineSeries::new(
        times.iter().copied().zip(cumulative.iter().copied()),
        RED,
    ))?;

    root.present()?;
    info!("Distance curve written to {}", out_path.display());
    Ok(())
}
