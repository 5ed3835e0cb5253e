/// Data layer: core types, run loading, binning, and filtering.
///
/// Architecture:
/// ```text
///  <results-dir>/<run>/loss.csv + params.json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse run → bin (binning) → broadcast params
///   └──────────┘
///        │  concat
///        ▼
///   ┌──────────────┐
///   │    Table      │  columns, rows of CellValue  ⇄  combined.csv
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  query expression → retained rows
///   └──────────┘
/// ```

pub mod binning;
pub mod filter;
pub mod loader;
pub mod model;
