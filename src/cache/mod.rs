/// Per-sample element map cache, persisted as one Parquet file per sample.
///
/// ```text
///  PhaseAnalysis_sample{S}.parquet
///   ├── "atom norm"
///   │     ├── Fe  → f32 grid
///   │     └── O   → f32 grid
///   └── "weight norm"
///         └── ...
/// ```

pub mod schema;
pub mod store;

pub use store::{CacheHandle, OpenMode};
