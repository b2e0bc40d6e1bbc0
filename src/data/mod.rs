/// Data layer: schema, parsing, encoding and synthetic cohorts.
///
/// Architecture:
/// ```text
///  .csv / .xlsx / .parquet          synthetic
///        │                              │
///        ▼                              ▼
///   ┌──────────┐                 ┌────────────┐
///   │  loader  │ → (headers,     │ synthetic  │ → labelled cohort
///   └──────────┘    rows)        └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ encoder  │  row filter + column resolution → EncodedDataset
///   └──────────┘
///
///  export: (headers, rows) → .csv / .parquet
/// ```

pub mod encoder;
pub mod export;
pub mod loader;
pub mod model;
pub mod synthetic;
