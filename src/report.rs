use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::cache::CacheHandle;
use crate::data::model::{GridShape, NormalizationType, Request};
use crate::loader::{ElementReport, LoadedMaps};

// ---------------------------------------------------------------------------
// JSON diagnostics report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LoadReport<'a> {
    pub sample: &'a str,
    pub normalization: NormalizationType,
    pub shape: Option<GridShape>,
    pub resolved: Vec<&'a str>,
    pub elements: &'a [ElementReport],
}

impl<'a> LoadReport<'a> {
    pub fn new(request: &'a Request, loaded: &'a LoadedMaps) -> Self {
        LoadReport {
            sample: &request.sample,
            normalization: request.normalization,
            shape: loaded.shape,
            resolved: loaded.maps.keys().map(String::as_str).collect(),
            elements: &loaded.diagnostics,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing report")?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Store summary table
// ---------------------------------------------------------------------------

/// One row per cached map: keys, dimensions and value range.
pub fn store_summary(store: &CacheHandle) -> Result<RecordBatch> {
    let mut norms = Vec::new();
    let mut elements = Vec::new();
    let mut widths = Vec::new();
    let mut heights = Vec::new();
    let mut mins = Vec::new();
    let mut maxs = Vec::new();

    for (norm, element, map) in store.entries() {
        let range = map.value_range();
        norms.push(norm.label());
        elements.push(element);
        widths.push(map.width() as i64);
        heights.push(map.height() as i64);
        mins.push(range.map(|r| r.0));
        maxs.push(range.map(|r| r.1));
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("normalization", DataType::Utf8, false),
        Field::new("element", DataType::Utf8, false),
        Field::new("width", DataType::Int64, false),
        Field::new("height", DataType::Int64, false),
        Field::new("min", DataType::Float32, true),
        Field::new("max", DataType::Float32, true),
    ]));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(norms)),
            Arc::new(StringArray::from(elements)),
            Arc::new(Int64Array::from(widths)),
            Arc::new(Int64Array::from(heights)),
            Arc::new(Float32Array::from(mins)),
            Arc::new(Float32Array::from(maxs)),
        ],
    )
    .context("building store summary")
}
