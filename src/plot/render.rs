use std::path::Path;

use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::element::DashedPathElement;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::color::Dash;

use super::figure::{Figure, Panel, Series};

// ---------------------------------------------------------------------------
// Static figure output
// ---------------------------------------------------------------------------

/// Render `figure` to `path`. `.svg` produces a vector image; any other
/// extension goes through the bitmap backend, which picks the image format
/// from the extension.
pub fn save_figure(figure: &Figure, path: &Path) -> Result<()> {
    let size = figure.layout.canvas_pixels();
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));

    if is_svg {
        let root = SVGBackend::new(path, size).into_drawing_area();
        draw_figure(&root, figure, true)?;
        root.present()
            .with_context(|| format!("writing {}", path.display()))?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        draw_figure(&root, figure, true)?;
        root.present()
            .with_context(|| format!("writing {}", path.display()))?;
    }
    log::info!("Saved figure to {}", path.display());
    Ok(())
}

/// Draw the facet grid onto `root`, one panel per cell, row-major.
///
/// With `with_text` off, captions, axis labels and the legend are skipped,
/// so nothing needs a system font.
fn draw_figure<DB>(root: &DrawingArea<DB, Shift>, figure: &Figure, with_text: bool) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let cells = root.split_evenly((figure.layout.rows(), figure.layout.columns));
    for (i, (panel, area)) in figure.panels.iter().zip(cells.iter()).enumerate() {
        // The figure legend goes on the first panel only.
        draw_panel(area, figure, panel, with_text, with_text && i == 0)?;
    }
    Ok(())
}

fn draw_panel<DB>(
    area: &DrawingArea<DB, Shift>,
    figure: &Figure,
    panel: &Panel,
    with_text: bool,
    with_legend: bool,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_lo, x_hi) = panel.x_range();
    let (y_lo, y_hi) = figure.y_range;

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if with_text {
        builder
            .caption(&panel.title, ("sans-serif", 18))
            .x_label_area_size(40)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    if with_text {
        chart
            .configure_mesh()
            .x_desc(figure.x_label.as_str())
            .y_desc(figure.y_label.as_str())
            .light_line_style(BLACK.mix(0.05))
            .draw()?;
    }

    let clamp = |y: f64| y.clamp(y_lo, y_hi);

    // Bands first so lines are drawn over them.
    for series in &panel.series {
        let color = series.color.to_plotters();
        let banded: Vec<(f64, f64, f64)> = series
            .points
            .iter()
            .filter_map(|p| p.band.map(|(lo, hi)| (p.x, clamp(lo), clamp(hi))))
            .collect();
        if banded.len() < 2 {
            continue;
        }
        let outline: Vec<(f64, f64)> = banded
            .iter()
            .map(|&(x, _, hi)| (x, hi))
            .chain(banded.iter().rev().map(|&(x, lo, _)| (x, lo)))
            .collect();
        chart.draw_series(std::iter::once(Polygon::new(outline, color.mix(0.2).filled())))?;
    }

    for series in &panel.series {
        let points: Vec<(f64, f64)> = series.points.iter().map(|p| (p.x, clamp(p.y))).collect();
        draw_line(&mut chart, series, points)?;
    }

    if with_legend {
        // Empty series carry the figure-wide legend, so hue values absent
        // from this panel are still listed.
        let entries = figure.legend();
        for (label, color, dash) in &entries {
            let (style, dash) = (color.to_plotters().stroke_width(2), *dash);
            chart
                .draw_series(LineSeries::new(Vec::<(f64, f64)>::new(), style))?
                .label(label.as_str())
                .legend(move |pos| legend_sample(dash, style, pos));
        }
        if !entries.is_empty() {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK.mix(0.25))
                .draw()?;
        }
    }
    Ok(())
}

/// Dash length and gap in pixels, `None` for a solid line.
fn dash_pattern(dash: Dash) -> Option<(u32, u32)> {
    match dash {
        Dash::Solid => None,
        Dash::Dashed => Some((8, 5)),
        Dash::Dotted => Some((2, 4)),
        Dash::DashDot => Some((10, 4)),
    }
}

/// Short line drawn next to a legend label, in the series' dash.
fn legend_sample<DB: DrawingBackend>(
    dash: Dash,
    style: ShapeStyle,
    (x, y): (i32, i32),
) -> DynElement<'static, DB, (i32, i32)> {
    let points = vec![(x, y), (x + 20, y)];
    match dash_pattern(dash) {
        None => PathElement::new(points, style).into_dyn(),
        Some((size, gap)) => DashedPathElement::new(points, size, gap, style).into_dyn(),
    }
}

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_line<DB>(
    chart: &mut Chart<'_, DB>,
    series: &Series,
    points: Vec<(f64, f64)>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let style = series.color.to_plotters().stroke_width(2);
    match dash_pattern(series.dash) {
        None => chart.draw_series(LineSeries::new(points, style))?,
        Some((size, gap)) => chart.draw_series(DashedLineSeries::new(points, size, gap, style))?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CellValue, Table};
    use crate::plot::{PlotOptions, SeedMode};

    /// One env, two seeds averaged into a single banded line.
    fn small_figure() -> Figure {
        let mut t = Table::new(
            ["step", "loss", "env", "seed"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for seed in 1..=2 {
            for step in 0..5 {
                t.push_row(vec![
                    CellValue::Float(step as f64),
                    CellValue::Float(1.0 + 0.1 * seed as f64),
                    CellValue::String("Pong".into()),
                    CellValue::Integer(seed),
                ]);
            }
        }
        let opts = PlotOptions {
            hue: None,
            style: None,
            seed: SeedMode::Average,
            bin_size: 10,
        };
        Figure::build(&t, &opts).unwrap()
    }

    fn render_svg(figure: &Figure) -> String {
        let mut svg = String::new();
        {
            let root =
                SVGBackend::with_string(&mut svg, figure.layout.canvas_pixels()).into_drawing_area();
            draw_figure(&root, figure, false).unwrap();
            root.present().unwrap();
        }
        svg
    }

    #[test]
    fn draws_band_and_mean_line() {
        let svg = render_svg(&small_figure());
        assert!(svg.contains("<svg"));
        assert_eq!(svg.matches("<polygon").count(), 1);
        assert_eq!(svg.matches("<polyline").count(), 1);
    }

    #[test]
    fn dashed_series_are_drawn_in_segments() {
        let mut figure = small_figure();
        figure.panels[0].series[0].dash = Dash::Dashed;
        let svg = render_svg(&figure);
        assert!(svg.matches("<polyline").count() > 1);
    }

    #[test]
    fn draws_into_a_bitmap_buffer() {
        let figure = small_figure();
        let (w, h) = figure.layout.canvas_pixels();
        let mut buf = vec![0u8; (w * h * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
            draw_figure(&root, &figure, false).unwrap();
            root.present().unwrap();
        }
        assert!(buf.chunks(3).any(|px| px == [255, 255, 255]));
        assert!(buf.chunks(3).any(|px| px != [255, 255, 255]));
    }

    #[test]
    fn legend_sample_follows_the_dash() {
        let style = RGBColor(0, 0, 0).stroke_width(2);
        let polylines = |dash: Dash| {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, (40, 20)).into_drawing_area();
                root.draw(&legend_sample(dash, style, (0, 10))).unwrap();
                root.present().unwrap();
            }
            svg.matches("<polyline").count()
        };
        assert_eq!(polylines(Dash::Solid), 1);
        assert!(polylines(Dash::Dashed) > 1);
        assert!(polylines(Dash::Dotted) > polylines(Dash::Dashed));
    }

    #[test]
    #[ignore = "needs a system sans-serif font"]
    fn writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loss.svg");
        save_figure(&small_figure(), &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("env = Pong"));
    }
}
