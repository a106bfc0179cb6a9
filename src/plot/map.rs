//! 2-D maps and RGB composites.

use std::path::Path;

use ndarray::Array2;
use plotters::prelude::*;

use super::raster::{Stretch, display_limits, gaussian_blur, mask_outline, normalize};
use super::{DrawResult, PlotStyle, draw_error};
use crate::error::AppError;

const NAN_BACKGROUND: RGBColor = RGBColor(225, 225, 225);
const OUTLINE: RGBColor = RGBColor(0, 190, 255);

/// Scaling of one image channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelOptions {
    pub stretch: Stretch,
    /// Percentiles used for limits not set in `vlims`.
    pub plims: [f64; 2],
    pub vlims: [Option<f64>; 2],
    /// Gaussian blur sigma (pixels).
    pub gauss_blur: Option<f64>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            stretch: Stretch::Arcsinh,
            plims: [10.0, 99.5],
            vlims: [None, None],
            gauss_blur: None,
        }
    }
}

impl ChannelOptions {
    /// Blur, find limits, normalise. `None` when the image has no finite pixel.
    fn prepare(&self, image: &Array2<f64>) -> Option<(Array2<f64>, (f64, f64))> {
        let blurred = match self.gauss_blur {
            Some(sigma) => gaussian_blur(image, sigma),
            None => image.clone(),
        };
        let limits = display_limits(&blurred, self.plims, self.vlims)?;
        Some((normalize(&blurred, limits, self.stretch), limits))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Grey,
    /// Blue to red, for S/N maps.
    Heat,
}

impl Colormap {
    fn style(self, level: u8) -> ShapeStyle {
        match self {
            Colormap::Grey => RGBColor(level, level, level).filled(),
            Colormap::Heat => {
                let t = f64::from(level) / 255.0;
                HSLColor(0.7 * (1.0 - t), 0.85, 0.2 + 0.5 * t).filled()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    pub scale: ChannelOptions,
    pub colormap: Colormap,
    pub title: Option<String>,
    pub cblabel: Option<String>,
}

/// Draw a single map with a colour bar, optionally outlining `mask`.
pub fn plot_map(
    path: &Path,
    image: &Array2<f64>,
    opts: &MapOptions,
    mask: Option<&Array2<bool>>,
    style: PlotStyle,
) -> Result<(), AppError> {
    draw_map(path, image, opts, mask, style).map_err(|e| draw_error(path, e))
}

fn figure_size(ny: usize, nx: usize, extra_width: u32) -> (u32, u32) {
    let width = 560u32;
    let aspect = if nx == 0 { 1.0 } else { ny as f64 / nx as f64 };
    let height = ((width as f64 * aspect) as u32).clamp(240, 1120);
    (width + extra_width + 60, height + 90)
}

fn quantize(t: f64) -> u8 {
    (t.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Horizontal runs of identical values on every row: `(x0, x1, y, value)`.
fn runs<T: Copy + PartialEq>(ny: usize, nx: usize, value: impl Fn(usize, usize) -> Option<T>) -> Vec<(usize, usize, usize, T)> {
    let mut out = Vec::new();
    for y in 0..ny {
        let mut current: Option<(usize, T)> = None;
        for x in 0..=nx {
            let v = if x < nx { value(y, x) } else { None };
            match (current, v) {
                (Some((_, c)), Some(v)) if c == v => {}
                (Some((x0, c)), _) => {
                    out.push((x0, x, y, c));
                    current = v.map(|v| (x, v));
                }
                (None, _) => current = v.map(|v| (x, v)),
            }
        }
    }
    out
}

fn draw_map(
    path: &Path,
    image: &Array2<f64>,
    opts: &MapOptions,
    mask: Option<&Array2<bool>>,
    style: PlotStyle,
) -> DrawResult {
    let (ny, nx) = image.dim();
    let size = figure_size(ny, nx, 120);
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let (main, bar) = root.split_horizontally((size.0 - 120) as i32);

    let family = style.font_family;
    let mut builder = ChartBuilder::on(&main);
    builder.margin(10).x_label_area_size(40).y_label_area_size(50);
    if let Some(title) = &opts.title {
        builder.caption(title, (family, 18).into_font());
    }
    let mut chart = builder.build_cartesian_2d(0f64..nx as f64, 0f64..ny as f64)?;
    chart.plotting_area().fill(&NAN_BACKGROUND)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("x [pixel]")
        .y_desc("y [pixel]")
        .label_style((family, 12).into_font())
        .draw()?;

    let prepared = opts.scale.prepare(image);
    if let Some((norm, limits)) = &prepared {
        let cells = runs(ny, nx, |y, x| {
            let t = norm[[y, x]];
            (!t.is_nan()).then(|| quantize(t))
        });
        chart.draw_series(cells.into_iter().map(|(x0, x1, y, level)| {
            Rectangle::new(
                [(x0 as f64, y as f64), (x1 as f64, y as f64 + 1.0)],
                opts.colormap.style(level),
            )
        }))?;
        draw_colorbar(&bar, *limits, opts, family)?;
    }

    if let Some(mask) = mask {
        chart.draw_series(
            mask_outline(mask)
                .into_iter()
                .map(|(a, b)| PathElement::new(vec![a, b], OUTLINE.stroke_width(1))),
        )?;
    }

    root.present()?;
    Ok(())
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    (lo, hi): (f64, f64),
    opts: &MapOptions,
    family: &str,
) -> DrawResult
where
    DB::ErrorType: 'static,
{
    let mut chart = ChartBuilder::on(area)
        .margin_top(40)
        .margin_bottom(50)
        .margin_right(5)
        .set_label_area_size(LabelAreaPosition::Right, 70)
        .build_cartesian_2d(0f64..1f64, lo..hi)?;

    let steps = 128;
    let dv = (hi - lo) / steps as f64;
    chart.draw_series((0..steps).map(|i| {
        let v0 = lo + dv * i as f64;
        let t = opts.scale.stretch.apply((v0 + 0.5 * dv - lo) / (hi - lo));
        Rectangle::new([(0.0, v0), (1.0, v0 + dv)], opts.colormap.style(quantize(t)))
    }))?;

    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .disable_x_axis()
        .y_labels(6)
        .label_style((family, 11).into_font());
    if let Some(label) = &opts.cblabel {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    Ok(())
}

/// Compose three channels (R, G, B) into one colour image.
pub fn plot_rgb(
    path: &Path,
    channels: [&Array2<f64>; 3],
    opts: [ChannelOptions; 3],
    title: Option<&str>,
    style: PlotStyle,
) -> Result<(), AppError> {
    let dims = channels[0].dim();
    if channels.iter().any(|c| c.dim() != dims) {
        return Err(AppError::data("RGB channels must share the same shape."));
    }
    draw_rgb(path, channels, opts, title, style).map_err(|e| draw_error(path, e))
}

fn draw_rgb(
    path: &Path,
    channels: [&Array2<f64>; 3],
    opts: [ChannelOptions; 3],
    title: Option<&str>,
    style: PlotStyle,
) -> DrawResult {
    let (ny, nx) = channels[0].dim();
    let size = figure_size(ny, nx, 0);
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let family = style.font_family;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(10).x_label_area_size(40).y_label_area_size(50);
    if let Some(title) = title {
        builder.caption(title, (family, 16).into_font());
    }
    let mut chart = builder.build_cartesian_2d(0f64..nx as f64, 0f64..ny as f64)?;
    chart.plotting_area().fill(&BLACK)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("x [pixel]")
        .y_desc("y [pixel]")
        .label_style((family, 12).into_font())
        .draw()?;

    let mut norms = Vec::with_capacity(3);
    for (channel, o) in channels.iter().zip(opts.iter()) {
        match o.prepare(channel) {
            Some((norm, _)) => norms.push(norm),
            None => {
                root.present()?;
                return Ok(());
            }
        }
    }

    let cells = runs(ny, nx, |y, x| {
        let (r, g, b) = (norms[0][[y, x]], norms[1][[y, x]], norms[2][[y, x]]);
        (!(r.is_nan() || g.is_nan() || b.is_nan())).then(|| (quantize(r), quantize(g), quantize(b)))
    });
    chart.draw_series(cells.into_iter().map(|(x0, x1, y, (r, g, b))| {
        Rectangle::new(
            [(x0 as f64, y as f64), (x1 as f64, y as f64 + 1.0)],
            RGBColor(r, g, b).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}
