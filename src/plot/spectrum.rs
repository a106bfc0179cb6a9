//! Line plots against wavelength.

use std::path::Path;

use plotters::prelude::*;

use super::{DrawResult, PlotStyle, draw_error};
use crate::error::AppError;

const LAMBDA_LABEL: &str = "Observed wavelength [Å]";

fn finite_points(lams: &[f64], values: &[f64], positive: bool) -> Vec<(f64, f64)> {
    lams.iter()
        .zip(values)
        .filter(|(l, v)| l.is_finite() && v.is_finite() && (!positive || **v > 0.0))
        .map(|(l, v)| (*l, *v))
        .collect()
}

fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        let pad = 0.05 * (hi - lo);
        (lo - pad, hi + pad)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

fn bounds(points: &[(f64, f64)]) -> Option<((f64, f64), (f64, f64))> {
    let first = points.first()?;
    let init = ((first.0, first.0), (first.1, first.1));
    Some(points.iter().fold(init, |((x0, x1), (y0, y1)), &(x, y)| {
        ((x0.min(x), x1.max(x)), (y0.min(y), y1.max(y)))
    }))
}

/// Plot a spectrum, optionally with a logarithmic flux axis.
///
/// With `log_y`, non-positive values are left out.
pub fn plot_spectrum(
    path: &Path,
    lams: &[f64],
    values: &[f64],
    ylabel: &str,
    log_y: bool,
    style: PlotStyle,
) -> Result<(), AppError> {
    let points = finite_points(lams, values, log_y);
    draw_spectrum(path, &points, ylabel, log_y, style).map_err(|e| draw_error(path, e))
}

fn draw_spectrum(path: &Path, points: &[(f64, f64)], ylabel: &str, log_y: bool, style: PlotStyle) -> DrawResult {
    let root = SVGBackend::new(path, (1100, 340)).into_drawing_area();
    root.fill(&WHITE)?;
    let Some(((x0, x1), (y0, y1))) = bounds(points) else {
        root.present()?;
        return Ok(());
    };
    let family = style.font_family;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15).x_label_area_size(45).y_label_area_size(80);
    if log_y {
        let (ylo, yhi) = if y1 > y0 { (y0 / 1.2, y1 * 1.2) } else { (y0 / 2.0, y0 * 2.0) };
        let mut chart = builder.build_cartesian_2d(x0..x1, (ylo..yhi).log_scale())?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(LAMBDA_LABEL)
            .y_desc(ylabel)
            .label_style((family, 13).into_font())
            .draw()?;
        chart.draw_series(LineSeries::new(points.iter().copied(), &BLACK))?;
    } else {
        let (ylo, yhi) = padded_range(y0, y1);
        let mut chart = builder.build_cartesian_2d(x0..x1, ylo..yhi)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(LAMBDA_LABEL)
            .y_desc(ylabel)
            .label_style((family, 13).into_font())
            .draw()?;
        chart.draw_series(LineSeries::new(points.iter().copied(), &BLACK))?;
    }

    root.present()?;
    Ok(())
}

/// Two stacked panels: `A_λ` and the resulting flux correction factor.
pub fn plot_extinction(
    path: &Path,
    lams: &[f64],
    alam: &[f64],
    factor: &[f64],
    title: &str,
    style: PlotStyle,
) -> Result<(), AppError> {
    let alam = finite_points(lams, alam, false);
    let factor = finite_points(lams, factor, false);
    draw_extinction(path, &alam, &factor, title, style).map_err(|e| draw_error(path, e))
}

fn draw_extinction(
    path: &Path,
    alam: &[(f64, f64)],
    factor: &[(f64, f64)],
    title: &str,
    style: PlotStyle,
) -> DrawResult {
    let root = SVGBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let family = style.font_family;
    let root = root.titled(title, (family, 18).into_font())?;
    let panels = root.split_evenly((2, 1));

    for (area, (points, ylabel)) in panels
        .iter()
        .zip([(alam, "A_λ [mag]"), (factor, "10^(0.4 A_λ)")])
    {
        let Some(((x0, x1), (y0, y1))) = bounds(points) else {
            continue;
        };
        let (ylo, yhi) = padded_range(y0, y1);
        let mut chart = ChartBuilder::on(area)
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, ylo..yhi)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(LAMBDA_LABEL)
            .y_desc(ylabel)
            .label_style((family, 13).into_font())
            .draw()?;
        chart.draw_series(LineSeries::new(points.iter().copied(), &BLACK))?;
    }

    root.present()?;
    Ok(())
}
