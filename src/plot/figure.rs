use std::collections::BTreeMap;

use crate::color::{ColorMap, Dash, DashMap, Rgb, DEFAULT_LINE_COLOR};
use crate::data::model::{CellValue, Table};

use super::{FacetLayout, PlotError, PlotOptions, SeedMode, Y_RANGE};

/// Normal quantile for a two-sided 95% confidence band.
pub const CI_Z: f64 = 1.96;

/// Column that selects the panel.
pub const FACET_COLUMN: &str = "env";
pub const X_COLUMN: &str = "step";
pub const Y_COLUMN: &str = "loss";
pub const SEED_COLUMN: &str = "seed";

// ---------------------------------------------------------------------------
// Figure model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Lower / upper confidence bound, for aggregated points over n > 1 rows.
    pub band: Option<(f64, f64)>,
}

/// One line in a panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend text; shared by every seed of the same hue/style group.
    pub label: String,
    pub color: Rgb,
    pub dash: Dash,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title: String,
    pub series: Vec<Series>,
}

impl Panel {
    /// Horizontal extent of all points, widened when degenerate.
    pub fn x_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.x))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(x), hi.max(x))
            });
        if !lo.is_finite() || !hi.is_finite() {
            (0.0, 1.0)
        } else if lo == hi {
            (lo - 0.5, hi + 0.5)
        } else {
            (lo, hi)
        }
    }
}

/// A finished facet grid, independent of the drawing backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub panels: Vec<Panel>,
    pub layout: FacetLayout,
    pub x_label: String,
    pub y_label: String,
    pub y_range: (f64, f64),
    pub hue: Option<String>,
    pub style: Option<String>,
    pub seed: SeedMode,
}

impl Figure {
    /// Group `table` into per-environment panels of hue/style lines.
    pub fn build(table: &Table, opts: &PlotOptions) -> Result<Self, PlotError> {
        let column = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| PlotError::MissingColumn(name.to_string()))
        };
        let env_idx = column(FACET_COLUMN)?;
        let x_idx = column(X_COLUMN)?;
        let y_idx = column(Y_COLUMN)?;
        let hue_idx = opts.hue.as_deref().map(column).transpose()?;
        let style_idx = opts.style.as_deref().map(column).transpose()?;
        let seed_idx = match opts.seed {
            SeedMode::Average => None,
            SeedMode::All | SeedMode::Explicit(_) => Some(column(SEED_COLUMN)?),
        };

        let rows: Vec<&Vec<CellValue>> = table
            .rows
            .iter()
            .filter(|row| match (&opts.seed, seed_idx) {
                (SeedMode::Explicit(seeds), Some(idx)) => row[idx]
                    .as_f64()
                    .is_some_and(|s| seeds.iter().any(|&want| want as f64 == s)),
                _ => true,
            })
            .collect();

        let colors = hue_idx.map(|idx| ColorMap::new(&unique(&rows, idx)));
        let dashes = style_idx.map(|idx| DashMap::new(&unique(&rows, idx)));

        // env → (hue, style, seed) → raw (x, y)
        type GroupKey = (Option<CellValue>, Option<CellValue>, Option<CellValue>);
        let mut groups: BTreeMap<CellValue, BTreeMap<GroupKey, Vec<(f64, f64)>>> =
            BTreeMap::new();

        for row in rows {
            let x = numeric(&row[x_idx], X_COLUMN)?;
            let y = numeric(&row[y_idx], Y_COLUMN)?;
            let (Some(x), Some(y)) = (x, y) else {
                continue;
            };
            let key = (
                hue_idx.map(|i| row[i].clone()),
                style_idx.map(|i| row[i].clone()),
                match opts.seed {
                    SeedMode::All => seed_idx.map(|i| row[i].clone()),
                    _ => None,
                },
            );
            groups
                .entry(row[env_idx].clone())
                .or_default()
                .entry(key)
                .or_default()
                .push((x, y));
        }

        let panels: Vec<Panel> = groups
            .into_iter()
            .map(|(env, lines)| Panel {
                title: format!("{FACET_COLUMN} = {env}"),
                series: lines
                    .into_iter()
                    .map(|((hue, style, _seed), raw)| {
                        let points = match opts.seed {
                            SeedMode::All => raw_points(raw),
                            _ => aggregate_points(raw),
                        };
                        Series {
                            label: series_label(hue.as_ref(), style.as_ref()),
                            color: match (&colors, &hue) {
                                (Some(map), Some(v)) => map.color_for(v),
                                _ => DEFAULT_LINE_COLOR,
                            },
                            dash: match (&dashes, &style) {
                                (Some(map), Some(v)) => map.dash_for(v),
                                _ => Dash::Solid,
                            },
                            points,
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(Figure {
            layout: FacetLayout::for_panels(panels.len()),
            panels,
            x_label: opts.x_label(),
            y_label: Y_COLUMN.to_string(),
            y_range: Y_RANGE,
            hue: opts.hue.clone(),
            style: opts.style.clone(),
            seed: opts.seed.clone(),
        })
    }

    /// Legend entries (label, colour, dash) in panel order, each listed once.
    pub fn legend(&self) -> Vec<(String, Rgb, Dash)> {
        let mut seen = std::collections::BTreeSet::new();
        self.panels
            .iter()
            .flat_map(|p| &p.series)
            .filter(|s| seen.insert(s.label.clone()))
            .map(|s| (s.label.clone(), s.color, s.dash))
            .collect()
    }
}

fn unique(rows: &[&Vec<CellValue>], idx: usize) -> std::collections::BTreeSet<CellValue> {
    rows.iter().map(|r| r[idx].clone()).collect()
}

/// Null cells are skipped; anything else must be a number.
fn numeric(cell: &CellValue, column: &str) -> Result<Option<f64>, PlotError> {
    match cell {
        CellValue::Null => Ok(None),
        other => other.as_f64().map(Some).ok_or_else(|| PlotError::NotNumeric {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

fn series_label(hue: Option<&CellValue>, style: Option<&CellValue>) -> String {
    match (hue, style) {
        (Some(h), Some(s)) => format!("{h}, {s}"),
        (Some(v), None) | (None, Some(v)) => v.to_string(),
        (None, None) => Y_COLUMN.to_string(),
    }
}

fn raw_points(mut raw: Vec<(f64, f64)>) -> Vec<Point> {
    raw.sort_by(|a, b| a.0.total_cmp(&b.0));
    raw.into_iter()
        .map(|(x, y)| Point { x, y, band: None })
        .collect()
}

/// Collapse rows sharing an x value into their mean and confidence band.
fn aggregate_points(mut raw: Vec<(f64, f64)>) -> Vec<Point> {
    raw.sort_by(|a, b| a.0.total_cmp(&b.0));
    raw.chunk_by(|a, b| a.0 == b.0)
        .map(|group| {
            let ys: Vec<f64> = group.iter().map(|&(_, y)| y).collect();
            let (y, band) = mean_with_ci(&ys);
            Point {
                x: group[0].0,
                y,
                band,
            }
        })
        .collect()
}

/// Mean of `values` and, for more than one value, the normal-approximation
/// 95% confidence interval of that mean.
pub fn mean_with_ci(values: &[f64]) -> (f64, Option<(f64, f64)>) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, None);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let half = CI_Z * (var / n).sqrt();
    (mean, Some((mean - half, mean + half)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs_table() -> Table {
        let mut t = Table::new(
            ["step", "loss", "env", "seed", "lr"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for env in ["Pong", "Breakout", "Seaquest"] {
            for seed in 1..=3i64 {
                for lr in [1e-4, 1e-3] {
                    for step in 0..4 {
                        let loss = 2.0 - 0.1 * step as f64 + 0.01 * seed as f64;
                        t.push_row(vec![
                            CellValue::Float(step as f64 * 100.0),
                            CellValue::Float(loss),
                            CellValue::String(env.into()),
                            CellValue::Integer(seed),
                            CellValue::Float(lr),
                        ]);
                    }
                }
            }
        }
        t
    }

    fn opts(seed: SeedMode) -> PlotOptions {
        PlotOptions {
            hue: Some("lr".into()),
            style: None,
            seed,
            bin_size: 100,
        }
    }

    #[test]
    fn one_panel_per_env_in_sorted_order() {
        let fig = Figure::build(&runs_table(), &opts(SeedMode::Average)).unwrap();
        let titles: Vec<_> = fig.panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["env = Breakout", "env = Pong", "env = Seaquest"]);
        assert_eq!(fig.layout.columns, 2);
        assert_eq!(fig.layout.panel_height, 3.0);
        assert_eq!(fig.x_label, "step in 100s");
        assert_eq!(fig.y_range, (0.0, 3.0));
    }

    #[test]
    fn average_mode_aggregates_across_seeds() {
        let fig = Figure::build(&runs_table(), &opts(SeedMode::Average)).unwrap();
        let panel = &fig.panels[0];
        assert_eq!(panel.series.len(), 2);
        for series in &panel.series {
            assert_eq!(series.points.len(), 4);
            let first = &series.points[0];
            // seeds 1..=3 contribute 2.01, 2.02, 2.03
            assert!((first.y - 2.02).abs() < 1e-12);
            let (lo, hi) = first.band.unwrap();
            assert!(lo < first.y && first.y < hi);
        }
        assert_ne!(panel.series[0].color, panel.series[1].color);
    }

    #[test]
    fn all_mode_draws_one_line_per_seed() {
        let fig = Figure::build(&runs_table(), &opts(SeedMode::All)).unwrap();
        let panel = &fig.panels[0];
        // 2 learning rates × 3 seeds
        assert_eq!(panel.series.len(), 6);
        for series in &panel.series {
            assert_eq!(series.points.len(), 4);
            assert!(series.points.iter().all(|p| p.band.is_none()));
        }
        // legend lists each hue once even though seeds repeat it
        assert_eq!(fig.legend().len(), 2);
    }

    #[test]
    fn explicit_seeds_restrict_rows() {
        let fig = Figure::build(&runs_table(), &opts(SeedMode::Explicit(vec![3]))).unwrap();
        let first = &fig.panels[0].series[0].points[0];
        assert!((first.y - 2.03).abs() < 1e-12);
        assert!(first.band.is_none());
    }

    #[test]
    fn style_column_assigns_dashes() {
        let mut o = opts(SeedMode::Average);
        o.hue = None;
        o.style = Some("lr".into());
        let fig = Figure::build(&runs_table(), &o).unwrap();
        let dashes: Vec<Dash> = fig.panels[0].series.iter().map(|s| s.dash).collect();
        assert_eq!(dashes, vec![Dash::Solid, Dash::Dashed]);
        assert!(fig.panels[0]
            .series
            .iter()
            .all(|s| s.color == DEFAULT_LINE_COLOR));
    }

    #[test]
    fn missing_columns_are_reported() {
        let mut table = runs_table();
        table.columns[2] = "game".into();
        assert_eq!(
            Figure::build(&table, &opts(SeedMode::Average)).unwrap_err(),
            PlotError::MissingColumn("env".into())
        );

        let mut o = opts(SeedMode::Average);
        o.hue = Some("gamma".into());
        assert_eq!(
            Figure::build(&runs_table(), &o).unwrap_err(),
            PlotError::MissingColumn("gamma".into())
        );
    }

    #[test]
    fn ci_of_single_value_has_no_band() {
        assert_eq!(mean_with_ci(&[1.5]), (1.5, None));
        let (mean, band) = mean_with_ci(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        let (lo, hi) = band.unwrap();
        // std = sqrt(2), sem = 1
        assert!((lo - (2.0 - CI_Z)).abs() < 1e-12);
        assert!((hi - (2.0 + CI_Z)).abs() < 1e-12);
    }
}
