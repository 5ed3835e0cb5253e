use eframe::egui::{self, Color32, Stroke, Ui};
use egui_plot::{Line, LineStyle, Plot, PlotPoints, Polygon};

use crate::color::Dash;
use crate::plot::figure::Panel;
use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Facet grid (central panel)
// ---------------------------------------------------------------------------

/// Render every panel of the figure in a scrollable grid.
pub fn facet_grid(ui: &mut Ui, state: &ViewerState) {
    let fig = &state.figure;
    if fig.panels.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No rows left to plot");
        });
        return;
    }

    let columns = fig.layout.columns;
    let spacing = ui.spacing().item_spacing.x;
    let width = (ui.available_width() - spacing * (columns as f32 - 1.0)) / columns as f32;
    let (panel_w, panel_h) = fig.layout.panel_pixels();
    let height = width * panel_h as f32 / panel_w as f32;

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for (row_no, row) in fig.panels.chunks(columns).enumerate() {
                ui.horizontal(|ui: &mut Ui| {
                    for (col_no, panel) in row.iter().enumerate() {
                        ui.vertical(|ui: &mut Ui| {
                            ui.set_width(width);
                            ui.strong(&panel.title);
                            panel_plot(ui, state, panel, row_no * columns + col_no, height);
                        });
                    }
                });
            }
        });
}

fn line_style(dash: Dash) -> LineStyle {
    match dash {
        Dash::Solid => LineStyle::Solid,
        Dash::Dashed => LineStyle::dashed_loose(),
        Dash::Dotted => LineStyle::dotted_dense(),
        Dash::DashDot => LineStyle::dashed_dense(),
    }
}

fn panel_plot(ui: &mut Ui, state: &ViewerState, panel: &Panel, index: usize, height: f32) {
    let fig = &state.figure;
    let (y_lo, y_hi) = fig.y_range;
    let clamp = |y: f64| y.clamp(y_lo, y_hi);

    let mut plot = Plot::new(("facet", index))
        .height(height)
        .x_axis_label(fig.x_label.as_str())
        .y_axis_label(fig.y_label.as_str())
        .include_y(y_lo)
        .include_y(y_hi)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true);
    if state.show_legend {
        plot = plot.legend(egui_plot::Legend::default());
    }

    plot.show(ui, |plot_ui| {
        for series in &panel.series {
            let color: Color32 = series.color.to_egui();

            if state.show_bands {
                let upper = series
                    .points
                    .iter()
                    .filter_map(|p| p.band.map(|(_, hi)| [p.x, clamp(hi)]));
                let lower = series
                    .points
                    .iter()
                    .rev()
                    .filter_map(|p| p.band.map(|(lo, _)| [p.x, clamp(lo)]));
                let outline: Vec<[f64; 2]> = upper.chain(lower).collect();
                if outline.len() >= 4 {
                    plot_ui.polygon(
                        Polygon::new(PlotPoints::from(outline))
                            .fill_color(color.gamma_multiply(0.2))
                            .stroke(Stroke::NONE),
                    );
                }
            }

            let points: PlotPoints = series
                .points
                .iter()
                .map(|p| [p.x, clamp(p.y)])
                .collect();

            plot_ui.line(
                Line::new(points)
                    .name(&series.label)
                    .color(color)
                    .style(line_style(series.dash))
                    .width(1.5),
            );
        }
    });
}
