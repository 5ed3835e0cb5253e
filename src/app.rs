use anyhow::{Result, anyhow};
use eframe::egui;

use crate::plot::Figure;
use crate::state::ViewerState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct LossViewerApp {
    pub state: ViewerState,
}

impl LossViewerApp {
    pub fn new(figure: Figure) -> Self {
        Self {
            state: ViewerState::new(figure),
        }
    }
}

impl eframe::App for LossViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: figure summary and toggles ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Central panel: facet grid ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::facet_grid(ui, &self.state);
        });
    }
}

/// Open a window showing `figure`; returns when the window is closed.
pub fn show_figure(figure: Figure) -> Result<()> {
    let (w, h) = figure.layout.canvas_pixels();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([(w as f32).max(600.0), (h as f32 + 40.0).min(1000.0)])
            .with_min_inner_size([400.0, 300.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Training loss",
        options,
        Box::new(|_cc| Ok(Box::new(LossViewerApp::new(figure)))),
    )
    .map_err(|e| anyhow!("viewer window failed: {e}"))
}
