use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// NormalizationType – composition basis of a map
// ---------------------------------------------------------------------------

/// Basis used for the composition values of an element map.
///
/// The label doubles as the cache subtree key and as the `{normType}` part of
/// the primary source filename (`S1-atom norm_Fe.txt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NormalizationType {
    AtomicNormalized,
    WeightNormalized,
}

impl NormalizationType {
    /// Canonical label, as written by the acquisition software.
    pub fn label(self) -> &'static str {
        match self {
            NormalizationType::AtomicNormalized => "atom norm",
            NormalizationType::WeightNormalized => "weight norm",
        }
    }
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown normalization type '{0}' (expected 'atom norm' or 'weight norm')")]
pub struct ParseNormalizationError(pub String);

impl FromStr for NormalizationType {
    type Err = ParseNormalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atom norm" | "atom" | "atomic" | "atomic-normalized" => {
                Ok(NormalizationType::AtomicNormalized)
            }
            "weight norm" | "weight" | "weight-normalized" | "mass" => {
                Ok(NormalizationType::WeightNormalized)
            }
            _ => Err(ParseNormalizationError(s.to_string())),
        }
    }
}

impl TryFrom<String> for NormalizationType {
    type Error = ParseNormalizationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NormalizationType> for String {
    fn from(value: NormalizationType) -> Self {
        value.label().to_string()
    }
}

// ---------------------------------------------------------------------------
// ElementMap – one 2D grid per element
// ---------------------------------------------------------------------------

/// Columns × rows of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A 2D map of per-pixel values for one chemical element.
///
/// Values are stored row-major at `f32` precision, the precision of the
/// cache store, so a parsed map and its cached copy compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl ElementMap {
    /// Build a map from row-major values. Returns `None` when the value count
    /// does not match `width * height`.
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Option<Self> {
        (width.checked_mul(height)? == values.len()).then_some(ElementMap {
            width,
            height,
            values,
        })
    }

    /// Build a map from equally long rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Self::new(width, height, rows.into_iter().flatten().collect())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> GridShape {
        GridShape {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y * self.width + x).copied()
    }

    /// Minimum and maximum of the finite values, if any.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

// ---------------------------------------------------------------------------
// Request – everything one loading session needs
// ---------------------------------------------------------------------------

/// Immutable description of one loading session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub sample: String,
    pub normalization: NormalizationType,
    /// Element symbols, in the order they are resolved.
    pub elements: Vec<String>,
    /// Directory holding the source files and the sample's cache store.
    pub data_dir: PathBuf,
    /// Source file extension, with or without the leading dot.
    pub extension: String,
    /// Discard the sample's cache store and rebuild it from source files.
    pub overwrite: bool,
}

impl Request {
    pub fn new(
        sample: impl Into<String>,
        normalization: NormalizationType,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Request {
            sample: sample.into(),
            normalization,
            elements: Vec::new(),
            data_dir: data_dir.into(),
            extension: "txt".to_string(),
            overwrite: false,
        }
    }

    pub fn with_elements<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements = elements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Extension without a leading dot.
    pub fn bare_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}
