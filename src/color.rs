use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

use crate::data::model::CellValue;

/// Colour used when no hue column is chosen.
pub const DEFAULT_LINE_COLOR: Rgb = Rgb(31, 119, 180);

// ---------------------------------------------------------------------------
// Rgb – backend-neutral colour
// ---------------------------------------------------------------------------

/// An 8-bit RGB triple, converted on demand for egui or plotters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_egui(self) -> Color32 {
        Color32::from_rgb(self.0, self.1, self.2)
    }

    pub fn to_plotters(self) -> RGBColor {
        RGBColor(self.0, self.1, self.2)
    }
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgb> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            Rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: hue value → Rgb
// ---------------------------------------------------------------------------

/// Maps unique values of the hue column to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<CellValue, Rgb>,
    default_color: Rgb,
}

impl ColorMap {
    /// Build a colour map from the hue column's unique values.
    pub fn new(unique_values: &BTreeSet<CellValue>) -> Self {
        let palette = generate_palette(unique_values.len());
        let mapping: BTreeMap<CellValue, Rgb> = unique_values
            .iter()
            .cloned()
            .zip(palette)
            .collect();

        ColorMap {
            mapping,
            default_color: Rgb(128, 128, 128),
        }
    }

    /// Look up the colour for a given hue value.
    pub fn color_for(&self, value: &CellValue) -> Rgb {
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }
}

// ---------------------------------------------------------------------------
// Dash mapping: style value → Dash
// ---------------------------------------------------------------------------

/// Line dash patterns, cycled through for successive style values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dash {
    Solid,
    Dashed,
    Dotted,
    DashDot,
}

const DASH_CYCLE: [Dash; 4] = [Dash::Solid, Dash::Dashed, Dash::Dotted, Dash::DashDot];

/// Maps unique values of the style column to dash patterns.
#[derive(Debug, Clone)]
pub struct DashMap {
    mapping: BTreeMap<CellValue, Dash>,
}

impl DashMap {
    pub fn new(unique_values: &BTreeSet<CellValue>) -> Self {
        let mapping = unique_values
            .iter()
            .cloned()
            .zip(DASH_CYCLE.iter().copied().cycle())
            .collect();
        DashMap { mapping }
    }

    pub fn dash_for(&self, value: &CellValue) -> Dash {
        self.mapping.get(value).copied().unwrap_or(Dash::Solid)
    }
}
