//! Cache-backed loading and rendering of X-ray microanalysis element maps.
//!
//! ```no_run
//! use xray_phasemap::{load_elements, NormalizationType, Request};
//!
//! let request = Request::new("S1", NormalizationType::AtomicNormalized, "data/S1")
//!     .with_elements(["Fe", "O"]);
//! let loaded = load_elements(&request)?;
//! for report in loaded.missing() {
//!     eprintln!("{}: {}", report.element, report.outcome);
//! }
//! # Ok::<(), xray_phasemap::StoreError>(())
//! ```

pub mod cache;
pub mod cli;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod loader;
pub mod render;
pub mod report;

pub use cache::CacheHandle;
pub use data::model::{ElementMap, GridShape, NormalizationType, Request};
pub use data::source::{FileSourceReader, SourceReader};
pub use error::{ReadError, SchemaError, StoreError};
pub use loader::{load_elements, load_elements_with, ElementOutcome, ElementReport, LoadedMaps};
