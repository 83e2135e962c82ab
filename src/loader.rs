use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::cache::CacheHandle;
use crate::data::model::{ElementMap, GridShape, Request};
use crate::data::naming::{resolve_source_file, Resolution};
use crate::data::source::{FileSourceReader, SourceReader};
use crate::error::{ReadError, StoreError};

// ---------------------------------------------------------------------------
// Per-element outcome
// ---------------------------------------------------------------------------

/// What happened to one requested element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElementOutcome {
    /// Served from the cache store.
    CacheHit,
    /// Parsed from a source file and written to the cache store.
    Loaded { path: PathBuf },
    /// No naming template matched an existing file.
    NotFound { tried: Vec<PathBuf> },
    /// The source file has an extension the reader does not handle.
    Unsupported { path: PathBuf, extension: String },
    /// The source file exists but could not be parsed.
    ParseError { path: PathBuf, detail: String },
    /// The map's shape differs from the first map of the request.
    ShapeMismatch { expected: GridShape, found: GridShape },
}

impl ElementOutcome {
    /// Whether the element made it into the returned maps.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ElementOutcome::CacheHit | ElementOutcome::Loaded { .. })
    }
}

impl fmt::Display for ElementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementOutcome::CacheHit => write!(f, "cached"),
            ElementOutcome::Loaded { path } => write!(f, "loaded from {}", path.display()),
            ElementOutcome::NotFound { tried } => match tried.first() {
                Some(first) => write!(
                    f,
                    "no source file (tried {} names, e.g. {})",
                    tried.len(),
                    first.display()
                ),
                None => write!(f, "no source file"),
            },
            ElementOutcome::Unsupported { path, extension } => {
                write!(f, "unsupported format '.{extension}' ({})", path.display())
            }
            ElementOutcome::ParseError { path, detail } => {
                write!(f, "unreadable {}: {detail}", path.display())
            }
            ElementOutcome::ShapeMismatch { expected, found } => {
                write!(f, "shape {found} differs from {expected}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementReport {
    pub element: String,
    #[serde(flatten)]
    pub outcome: ElementOutcome,
}

// ---------------------------------------------------------------------------
// LoadedMaps – result of one request
// ---------------------------------------------------------------------------

/// Maps resolved for a request, plus one report per requested element.
#[derive(Debug, Clone, Default)]
pub struct LoadedMaps {
    /// Element symbol → map, for resolved elements only.
    pub maps: BTreeMap<String, ElementMap>,
    /// Common shape of every map in `maps`; `None` when nothing resolved.
    pub shape: Option<GridShape>,
    /// One entry per requested element, in request order.
    pub diagnostics: Vec<ElementReport>,
}

impl LoadedMaps {
    pub fn width(&self) -> Option<usize> {
        self.shape.map(|s| s.width)
    }

    pub fn height(&self) -> Option<usize> {
        self.shape.map(|s| s.height)
    }

    /// Requested elements that were not resolved.
    pub fn missing(&self) -> impl Iterator<Item = &ElementReport> {
        self.diagnostics.iter().filter(|r| !r.outcome.is_resolved())
    }

    pub fn cache_hits(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|r| r.outcome == ElementOutcome::CacheHit)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Resolve every requested element from the sample's cache store, falling
/// back to source files in `request.data_dir`.
///
/// Maps parsed from source files are written through to the store, so this
/// mutates the store on disk. Per-element failures are reported in
/// [`LoadedMaps::diagnostics`]; only store failures abort the request.
pub fn load_elements(request: &Request) -> Result<LoadedMaps, StoreError> {
    load_elements_with(request, &FileSourceReader)
}

/// [`load_elements`] with a caller-supplied source reader.
pub fn load_elements_with<R: SourceReader + ?Sized>(
    request: &Request,
    reader: &R,
) -> Result<LoadedMaps, StoreError> {
    let mut store = if request.overwrite {
        CacheHandle::open_for_rebuild(&request.data_dir, &request.sample)?
    } else {
        CacheHandle::open_or_create(&request.data_dir, &request.sample)?
    };
    store.ensure_group(request.normalization);

    let mut loaded = LoadedMaps::default();

    for element in &request.elements {
        let (map, outcome) = match resolve_element(&mut store, request, element, reader)? {
            Ok((map, outcome)) => (map, outcome),
            Err(outcome) => {
                loaded.diagnostics.push(ElementReport {
                    element: element.clone(),
                    outcome,
                });
                continue;
            }
        };

        let outcome = match loaded.shape {
            Some(expected) if expected != map.shape() => {
                warn!(
                    "{element}: shape {} differs from {expected}; dropping it from this request",
                    map.shape()
                );
                ElementOutcome::ShapeMismatch {
                    expected,
                    found: map.shape(),
                }
            }
            _ => {
                loaded.shape = Some(map.shape());
                loaded.maps.insert(element.clone(), map);
                outcome
            }
        };
        loaded.diagnostics.push(ElementReport {
            element: element.clone(),
            outcome,
        });
    }

    store.close()?;

    info!(
        "sample {} ({}): {}/{} elements resolved, {} from cache",
        request.sample,
        request.normalization,
        loaded.maps.len(),
        request.elements.len(),
        loaded.cache_hits()
    );
    Ok(loaded)
}

/// Outer error: the store failed. Inner error: the element could not be resolved.
fn resolve_element<R: SourceReader + ?Sized>(
    store: &mut CacheHandle,
    request: &Request,
    element: &str,
    reader: &R,
) -> Result<Result<(ElementMap, ElementOutcome), ElementOutcome>, StoreError> {
    if let Some(map) = store.get(request.normalization, element) {
        debug!("{element}: cache hit");
        return Ok(Ok((map.clone(), ElementOutcome::CacheHit)));
    }

    let path = match resolve_source_file(
        &request.data_dir,
        &request.sample,
        request.normalization,
        element,
        request.bare_extension(),
    ) {
        Resolution::Found(path) => path,
        Resolution::Missing(tried) => {
            let last = tried.last().map(|p| p.display().to_string()).unwrap_or_default();
            warn!("{element}: source file does not exist (last tried {last})");
            return Ok(Err(ElementOutcome::NotFound { tried }));
        }
    };

    let map = match reader.read(&path) {
        Ok(map) => map,
        Err(ReadError::UnsupportedFormat { path, extension }) => {
            error!("{element}: unknown extension '.{extension}' for {}", path.display());
            return Ok(Err(ElementOutcome::Unsupported { path, extension }));
        }
        Err(e) => {
            error!("{element}: {e}");
            return Ok(Err(ElementOutcome::ParseError {
                path,
                detail: e.to_string(),
            }));
        }
    };

    store.insert(request.normalization, element, map.clone())?;
    debug!("{element}: cached from {}", path.display());
    Ok(Ok((map, ElementOutcome::Loaded { path })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::NormalizationType;

    #[test]
    fn outcome_reports_resolution() {
        assert!(ElementOutcome::CacheHit.is_resolved());
        assert!(ElementOutcome::Loaded { path: "a.txt".into() }.is_resolved());
        assert!(!ElementOutcome::NotFound { tried: vec![] }.is_resolved());
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let report = ElementReport {
            element: "Xx".into(),
            outcome: ElementOutcome::NotFound {
                tried: vec!["S1-atom norm_Xx.txt".into()],
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["element"], "Xx");
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["tried"][0], "S1-atom norm_Xx.txt");
    }

    #[test]
    fn empty_request_creates_store_and_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::new("S1", NormalizationType::WeightNormalized, dir.path());

        let loaded = load_elements(&request).unwrap();
        assert!(loaded.maps.is_empty());
        assert_eq!(loaded.shape, None);

        let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
        assert!(store.has_group(NormalizationType::WeightNormalized));
    }
}
