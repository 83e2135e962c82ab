use std::path::{Path, PathBuf};

use super::model::NormalizationType;

/// Legacy spellings of the weight-normalized label, tried in this order after
/// the primary `{sample}-weight norm_{element}` name.
const WEIGHT_FALLBACKS: [(&str, char); 3] =
    [("mass_norm", '_'), ("w% norm", '-'), ("w%-norm", '-')];

/// Candidate source file names for one element, most preferred first.
///
/// ```text
/// {sample}-{label}_{element}.{ext}       always
/// {sample}_mass_norm_{element}.{ext}     weight norm only
/// {sample}-w% norm_{element}.{ext}       weight norm only
/// {sample}-w%-norm_{element}.{ext}       weight norm only
/// ```
pub fn candidate_file_names(
    sample: &str,
    normalization: NormalizationType,
    element: &str,
    extension: &str,
) -> Vec<String> {
    let ext = extension.trim_start_matches('.');
    let mut names = vec![format!("{sample}-{}_{element}.{ext}", normalization.label())];

    if normalization == NormalizationType::WeightNormalized {
        names.extend(
            WEIGHT_FALLBACKS
                .iter()
                .map(|(label, sep)| format!("{sample}{sep}{label}_{element}.{ext}")),
        );
    }
    names
}

/// Where a source file search ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    /// No candidate exists; every path that was checked, in order.
    Missing(Vec<PathBuf>),
}

/// Return the first candidate that exists as a file in `dir`.
pub fn resolve_source_file(
    dir: &Path,
    sample: &str,
    normalization: NormalizationType,
    element: &str,
    extension: &str,
) -> Resolution {
    let mut tried = Vec::new();
    for name in candidate_file_names(sample, normalization, element, extension) {
        let path = dir.join(name);
        if path.is_file() {
            return Resolution::Found(path);
        }
        tried.push(path);
    }
    Resolution::Missing(tried)
}

/// File name of the cache store for a sample.
pub fn store_file_name(sample: &str) -> String {
    format!("PhaseAnalysis_sample{sample}.parquet")
}
