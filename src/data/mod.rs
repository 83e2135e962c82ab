/// Data layer: core types, source file naming, and parsing.
///
/// Architecture:
/// ```text
///  {sample}-{norm}_{element}.tif / .txt
///        │
///        ▼
///   ┌──────────┐
///   │  naming   │  legacy filename templates → first existing path
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  source   │  parse file → ElementMap
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ ElementMap │  f32 grid, width × height
///   └────────────┘
/// ```

pub mod model;
pub mod naming;
pub mod source;
