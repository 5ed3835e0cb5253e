use eframe::egui::{self, Ui};

use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top toolbar: what is plotted, plus display toggles.
pub fn top_bar(ui: &mut Ui, state: &mut ViewerState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.label(state.summary());

        ui.separator();

        if state.has_bands()
            && ui
                .selectable_label(state.show_bands, "Confidence bands")
                .clicked()
        {
            state.show_bands = !state.show_bands;
        }

        if ui.selectable_label(state.show_legend, "Legend").clicked() {
            state.show_legend = !state.show_legend;
        }
    });
}
