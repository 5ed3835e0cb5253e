use crate::plot::Figure;

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// The full viewer state, independent of rendering.
pub struct ViewerState {
    /// The facet grid being shown.
    pub figure: Figure,

    /// Whether confidence bands are drawn around averaged lines.
    pub show_bands: bool,

    /// Whether each panel carries a legend.
    pub show_legend: bool,
}

impl ViewerState {
    pub fn new(figure: Figure) -> Self {
        Self {
            figure,
            show_bands: true,
            show_legend: true,
        }
    }

    /// Whether any line in the figure has a confidence band to toggle.
    pub fn has_bands(&self) -> bool {
        self.figure
            .panels
            .iter()
            .flat_map(|p| &p.series)
            .any(|s| s.points.iter().any(|pt| pt.band.is_some()))
    }

    /// One-line description of what is plotted.
    pub fn summary(&self) -> String {
        let fig = &self.figure;
        format!(
            "{} panel(s) · hue: {} · style: {} · seed: {}",
            fig.panels.len(),
            fig.hue.as_deref().unwrap_or("none"),
            fig.style.as_deref().unwrap_or("none"),
            fig.seed,
        )
    }
}
