use std::path::PathBuf;

use arrow::datatypes::DataType;
use thiserror::Error;

use crate::data::model::ParseNormalizationError;

/// Failure to turn a source file into an element map.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("unsupported source format '.{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding TIFF {}: {source}", path.display())]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("{}: unsupported pixel layout {layout}", path.display())]
    UnsupportedLayout { path: PathBuf, layout: String },

    #[error("parsing {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: row {row}, column {column}: '{token}' is not a number", path.display())]
    InvalidNumber {
        path: PathBuf,
        row: usize,
        column: usize,
        token: String,
    },

    #[error("{}: row {row} has {found} values, expected {expected}", path.display())]
    RaggedRows {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{} contains no values", path.display())]
    Empty { path: PathBuf },
}

/// Failure of the per-sample cache store. Fatal to a loading session.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache store {}: {source}", path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("cache store {}: {source}", path.display())]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("cache store {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}

/// A store file that parses as Parquet but does not hold element maps.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unsupported format version '{0}'")]
    FormatVersion(String),

    #[error("missing '{0}' column")]
    MissingColumn(String),

    #[error("column '{name}' has type {found:?}")]
    ColumnType { name: String, found: DataType },

    #[error("group list: {0}")]
    Group(#[source] ParseNormalizationError),

    #[error("row {row}: {source}")]
    Normalization {
        row: usize,
        #[source]
        source: ParseNormalizationError,
    },

    #[error("row {row}: values are {found:?}, expected Float32")]
    ValueType { row: usize, found: DataType },

    #[error("row {row} ({element}): {width}x{height} does not match its {count} values")]
    Dimensions {
        row: usize,
        element: String,
        width: i64,
        height: i64,
        count: usize,
    },
}
