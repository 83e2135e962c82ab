use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use super::model::ElementMap;
use crate::error::ReadError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Anything that can turn a source file into an element map.
///
/// The cache-backed loader only talks to this trait, so callers can wrap the
/// filesystem reader (to count reads, for instance).
pub trait SourceReader {
    fn read(&self, path: &Path) -> Result<ElementMap, ReadError>;
}

/// Reads element maps straight from disk, dispatching on extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceReader;

impl SourceReader for FileSourceReader {
    fn read(&self, path: &Path) -> Result<ElementMap, ReadError> {
        read_element_map(path)
    }
}

/// Load an element map from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.tif` / `.tiff` – raster image, one value per pixel
/// * `.txt`           – semicolon-separated table, one line per pixel row
pub fn read_element_map(path: &Path) -> Result<ElementMap, ReadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let map = match ext.as_str() {
        "tif" | "tiff" => read_image(path)?,
        "txt" => read_text(path)?,
        _ => {
            return Err(ReadError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: ext,
            })
        }
    };

    debug!("read {} ({})", path.display(), map.shape());
    Ok(map)
}

// ---------------------------------------------------------------------------
// Text loader
// ---------------------------------------------------------------------------

/// Text layout, as exported by the EDS software: no header, one line per
/// pixel row, values separated by semicolons:
///
/// ```text
/// 0.12;0.14;0.11
/// 0.10;0.13;0.12
/// ```
///
/// Blank lines and `#` comments are skipped and a trailing `;` is tolerated.
fn read_text(path: &Path) -> Result<ElementMap, ReadError> {
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut width: Option<usize> = None;
    let mut values = Vec::new();
    let mut height = 0;

    for result in reader.records() {
        let record = result.map_err(|source| ReadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map_or(height + 1, |p| p.line() as usize);

        let mut cells: Vec<&str> = record.iter().collect();
        if cells.last() == Some(&"") {
            cells.pop();
        }
        if cells.is_empty() {
            continue;
        }

        let expected = *width.get_or_insert(cells.len());
        if cells.len() != expected {
            return Err(ReadError::RaggedRows {
                path: path.to_path_buf(),
                row: line,
                expected,
                found: cells.len(),
            });
        }

        for (col, tok) in cells.iter().enumerate() {
            let value = tok.parse::<f32>().map_err(|_| ReadError::InvalidNumber {
                path: path.to_path_buf(),
                row: line,
                column: col + 1,
                token: tok.to_string(),
            })?;
            values.push(value);
        }
        height += 1;
    }

    let width = width.ok_or_else(|| ReadError::Empty {
        path: path.to_path_buf(),
    })?;

    ElementMap::new(width, height, values).ok_or_else(|| ReadError::Empty {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Image loader
// ---------------------------------------------------------------------------

/// Rec. 709 luma weights used to reduce colour maps to one channel.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Decode a tagged image file into one value per pixel.
///
/// Every TIFF sample type is accepted (8/16/32/64-bit integers, signed or
/// not, and 32/64-bit floats). Grey levels are kept verbatim, so a 16-bit
/// count map stays in counts and a float composition map keeps its
/// fractions. Grey+alpha keeps the grey channel; RGB(A) is reduced to
/// luminance. Only the first image of a multi-page file is read.
fn read_image(path: &Path) -> Result<ElementMap, ReadError> {
    let tiff_err = |source| ReadError::Tiff {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let color = decoder.colortype().map_err(tiff_err)?;
    let channels = match color {
        ColorType::Gray(_) | ColorType::Palette(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) => 4,
        other => {
            return Err(ReadError::UnsupportedLayout {
                path: path.to_path_buf(),
                layout: format!("{other:?}"),
            })
        }
    };

    let samples = samples_as_f32(decoder.read_image().map_err(tiff_err)?);
    let values: Vec<f32> = match channels {
        1 => samples,
        2 => samples.chunks_exact(2).map(|px| px[0]).collect(),
        n => samples
            .chunks_exact(n)
            .map(|px| LUMA[0] * px[0] + LUMA[1] * px[1] + LUMA[2] * px[2])
            .collect(),
    };

    if values.is_empty() {
        return Err(ReadError::Empty {
            path: path.to_path_buf(),
        });
    }

    ElementMap::new(width as usize, height as usize, values).ok_or_else(|| {
        ReadError::UnsupportedLayout {
            path: path.to_path_buf(),
            layout: format!("{color:?} with a sample count that does not fill {width}x{height}"),
        }
    })
}

/// Widen (or narrow) decoded samples to the map precision.
fn samples_as_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}
