/// Plot layer: turns a combined table into a faceted figure and renders it.
///
/// `figure` does all the grouping and statistics; `render` (image files) and
/// the `ui` module (interactive window) only draw a finished [`Figure`].

pub mod figure;
pub mod render;

use std::fmt;
use std::str::FromStr;

pub use figure::Figure;

/// Fixed visible loss range on every panel.
pub const Y_RANGE: (f64, f64) = (0.0, 3.0);

/// Pixels per layout unit when rasterising a figure.
pub const PIXELS_PER_UNIT: f64 = 100.0;

/// Panel width / height.
pub const PANEL_ASPECT: f64 = 1.5;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlotError {
    #[error("{0} not a recognized choice")]
    UnrecognizedSeedMode(String),

    #[error("column '{0}' not found in the combined table")]
    MissingColumn(String),

    #[error("column '{column}' has a non-numeric value '{value}'")]
    NotNumeric { column: String, value: String },
}

// ---------------------------------------------------------------------------
// Seed handling
// ---------------------------------------------------------------------------

/// How rows from different seeds are turned into lines.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedMode {
    /// Aggregate across seeds: mean line with a confidence band.
    Average,
    /// One raw line per seed.
    All,
    /// Only these seeds, aggregated as in [`SeedMode::Average`].
    Explicit(Vec<i64>),
}

impl FromStr for SeedMode {
    type Err = PlotError;

    /// Accepts `average`, `all`, or a list of integer seeds such as `1,2,3`
    /// or `[1, 2]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "average" => return Ok(SeedMode::Average),
            "all" => return Ok(SeedMode::All),
            _ => {}
        }

        let unrecognized = || PlotError::UnrecognizedSeedMode(s.to_string());
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(trimmed);

        let seeds = inner
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<i64>().map_err(|_| unrecognized()))
            .collect::<Result<Vec<i64>, PlotError>>()?;

        if seeds.is_empty() {
            return Err(unrecognized());
        }
        Ok(SeedMode::Explicit(seeds))
    }
}

impl fmt::Display for SeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedMode::Average => write!(f, "average"),
            SeedMode::All => write!(f, "all"),
            SeedMode::Explicit(seeds) => write!(f, "{seeds:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Facet layout
// ---------------------------------------------------------------------------

/// Grid arrangement of the per-environment panels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacetLayout {
    pub panels: usize,
    pub columns: usize,
    /// Panel height in layout units.
    pub panel_height: f64,
}

impl FacetLayout {
    /// One column for up to two environments, otherwise a two-wide wrap with
    /// shorter panels.
    pub fn for_panels(panels: usize) -> Self {
        let many = panels > 2;
        FacetLayout {
            panels,
            columns: if many { 2 } else { 1 },
            panel_height: if many { 3.0 } else { 5.0 },
        }
    }

    pub fn rows(&self) -> usize {
        self.panels.div_ceil(self.columns).max(1)
    }

    /// Size of one panel in pixels.
    pub fn panel_pixels(&self) -> (u32, u32) {
        let h = self.panel_height * PIXELS_PER_UNIT;
        ((h * PANEL_ASPECT).round() as u32, h.round() as u32)
    }

    /// Size of the whole figure in pixels.
    pub fn canvas_pixels(&self) -> (u32, u32) {
        let (w, h) = self.panel_pixels();
        (w * self.columns as u32, h * self.rows() as u32)
    }
}

// ---------------------------------------------------------------------------
// Plot request
// ---------------------------------------------------------------------------

/// Everything needed to build a [`Figure`] from a table.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub hue: Option<String>,
    pub style: Option<String>,
    pub seed: SeedMode,
    pub bin_size: usize,
}

impl PlotOptions {
    pub fn x_label(&self) -> String {
        format!("step in {}s", self.bin_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_modes_parse() {
        assert_eq!("average".parse::<SeedMode>().unwrap(), SeedMode::Average);
        assert_eq!("all".parse::<SeedMode>().unwrap(), SeedMode::All);
        assert_eq!(
            "1,2,3".parse::<SeedMode>().unwrap(),
            SeedMode::Explicit(vec![1, 2, 3])
        );
        assert_eq!(
            "[4, 5]".parse::<SeedMode>().unwrap(),
            SeedMode::Explicit(vec![4, 5])
        );
        assert_eq!("7".parse::<SeedMode>().unwrap(), SeedMode::Explicit(vec![7]));
    }

    #[test]
    fn unknown_seed_mode_is_rejected() {
        for bad in ["median", "", "[]", "1,x", "All"] {
            assert_eq!(
                bad.parse::<SeedMode>(),
                Err(PlotError::UnrecognizedSeedMode(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn layout_follows_environment_count() {
        let one = FacetLayout::for_panels(1);
        assert_eq!((one.columns, one.rows(), one.panel_height), (1, 1, 5.0));

        let two = FacetLayout::for_panels(2);
        assert_eq!((two.columns, two.rows(), two.panel_height), (1, 2, 5.0));

        let five = FacetLayout::for_panels(5);
        assert_eq!((five.columns, five.rows(), five.panel_height), (2, 3, 3.0));
        assert_eq!(five.panel_pixels(), (450, 300));
        assert_eq!(five.canvas_pixels(), (900, 900));
    }

    #[test]
    fn x_label_names_bin_size() {
        let opts = PlotOptions {
            hue: None,
            style: None,
            seed: SeedMode::Average,
            bin_size: 100,
        };
        assert_eq!(opts.x_label(), "step in 100s");
    }
}
