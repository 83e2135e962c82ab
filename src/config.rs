use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{NormalizationType, Request};

// ---------------------------------------------------------------------------
// Run configuration (JSON file and/or command line)
// ---------------------------------------------------------------------------

/// Everything needed to run a request and render its maps.
///
/// ```json
/// {
///   "sample": "S1",
///   "elements": ["Fe", "O", "Si"],
///   "normalization": "weight norm",
///   "data_dir": "data/S1",
///   "extension": "tif",
///   "overwrite": false,
///   "graphics_dir": "figures",
///   "basename": "S1_wt"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub sample: Option<String>,
    pub elements: Vec<String>,
    pub normalization: Option<NormalizationType>,
    pub data_dir: Option<PathBuf>,
    pub extension: Option<String>,
    /// `None` defers to the layer underneath; unset everywhere means no rebuild.
    pub overwrite: Option<bool>,
    pub graphics_dir: Option<PathBuf>,
    pub basename: Option<String>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Overlay `other` on top of `self`: set values in `other` win.
    pub fn merge(self, other: RunConfig) -> RunConfig {
        RunConfig {
            sample: other.sample.or(self.sample),
            elements: if other.elements.is_empty() {
                self.elements
            } else {
                other.elements
            },
            normalization: other.normalization.or(self.normalization),
            data_dir: other.data_dir.or(self.data_dir),
            extension: other.extension.or(self.extension),
            overwrite: other.overwrite.or(self.overwrite),
            graphics_dir: other.graphics_dir.or(self.graphics_dir),
            basename: other.basename.or(self.basename),
        }
    }

    /// Build the loading request. Fails when a required value is missing.
    pub fn to_request(&self) -> Result<Request> {
        let Some(sample) = self.sample.as_deref().filter(|s| !s.is_empty()) else {
            bail!("no sample name given (--sample or \"sample\" in the config file)");
        };
        let Some(normalization) = self.normalization else {
            bail!("no normalization type given (--normalization or \"normalization\")");
        };
        if self.elements.is_empty() {
            bail!("no elements requested (--elements or \"elements\")");
        }

        let data_dir = self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut request = Request::new(sample, normalization, data_dir)
            .with_elements(self.elements.iter().map(|e| e.trim()).filter(|e| !e.is_empty()))
            .with_overwrite(self.overwrite.unwrap_or(false));
        if let Some(ext) = &self.extension {
            request = request.with_extension(ext.clone());
        }
        Ok(request)
    }

    /// Image directory; defaults to the data directory.
    pub fn graphics_dir(&self) -> PathBuf {
        self.graphics_dir
            .clone()
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Image file prefix; defaults to the sample name.
    pub fn basename(&self) -> String {
        self.basename
            .clone()
            .or_else(|| self.sample.clone())
            .unwrap_or_else(|| "map".to_string())
    }
}
