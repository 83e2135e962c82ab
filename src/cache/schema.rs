use std::sync::Arc;

use arrow::array::{
    Array, Float32Array, Float32Builder, Int64Array, ListArray, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::data::model::{ElementMap, NormalizationType};
use crate::error::SchemaError;

// ---------------------------------------------------------------------------
// On-disk layout of a sample store
// ---------------------------------------------------------------------------
//
// One row per cached map:
//
//   normalization │ element │ height │ width │ values (row-major)
//   ──────────────┼─────────┼────────┼───────┼──────────────────
//   "atom norm"   │ "Fe"    │ 3      │ 3     │ [f32; 9]
//
// Subtrees without entries are listed in the file's key-value metadata.

pub const COL_NORMALIZATION: &str = "normalization";
pub const COL_ELEMENT: &str = "element";
pub const COL_HEIGHT: &str = "height";
pub const COL_WIDTH: &str = "width";
pub const COL_VALUES: &str = "values";

pub const META_FORMAT_VERSION: &str = "xray_phasemap.format_version";
pub const META_GROUPS: &str = "xray_phasemap.groups";
pub const FORMAT_VERSION: &str = "1";

pub fn store_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COL_NORMALIZATION, DataType::Utf8, false),
        Field::new(COL_ELEMENT, DataType::Utf8, false),
        Field::new(COL_HEIGHT, DataType::Int64, false),
        Field::new(COL_WIDTH, DataType::Int64, false),
        Field::new(
            COL_VALUES,
            DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
            false,
        ),
    ]))
}

/// One stored map together with its keys.
pub struct StoredEntry<'a> {
    pub normalization: NormalizationType,
    pub element: &'a str,
    pub map: &'a ElementMap,
}

/// Encode entries as a single record batch.
pub fn entries_to_batch<'a, I>(entries: I) -> Result<RecordBatch, ArrowError>
where
    I: IntoIterator<Item = StoredEntry<'a>>,
{
    let mut norms = Vec::new();
    let mut elements = Vec::new();
    let mut heights = Vec::new();
    let mut widths = Vec::new();
    let mut values = ListBuilder::new(Float32Builder::new());

    for entry in entries {
        norms.push(entry.normalization.label());
        elements.push(entry.element);
        heights.push(entry.map.height() as i64);
        widths.push(entry.map.width() as i64);
        values.values().append_slice(entry.map.values());
        values.append(true);
    }

    RecordBatch::try_new(
        store_schema(),
        vec![
            Arc::new(StringArray::from(norms)),
            Arc::new(StringArray::from(elements)),
            Arc::new(Int64Array::from(heights)),
            Arc::new(Int64Array::from(widths)),
            Arc::new(values.finish()),
        ],
    )
}

/// Decoded row of a stored batch.
pub struct DecodedEntry {
    pub normalization: NormalizationType,
    pub element: String,
    pub map: ElementMap,
}

/// Decode every row of a batch, checking types and dimensions.
pub fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<DecodedEntry>, SchemaError> {
    let norms = column::<StringArray>(batch, COL_NORMALIZATION)?;
    let elements = column::<StringArray>(batch, COL_ELEMENT)?;
    let heights = column::<Int64Array>(batch, COL_HEIGHT)?;
    let widths = column::<Int64Array>(batch, COL_WIDTH)?;
    let values = column::<ListArray>(batch, COL_VALUES)?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let normalization = norms
            .value(row)
            .parse::<NormalizationType>()
            .map_err(|source| SchemaError::Normalization { row, source })?;
        let element = elements.value(row).to_string();

        let inner = values.value(row);
        let floats = inner
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| SchemaError::ValueType {
                row,
                found: inner.data_type().clone(),
            })?;
        let data: Vec<f32> = floats.iter().map(|v| v.unwrap_or(f32::NAN)).collect();
        let count = data.len();

        let (height, width) = (heights.value(row), widths.value(row));
        let map = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| ElementMap::new(w, h, data))
            .ok_or_else(|| SchemaError::Dimensions {
                row,
                element: element.clone(),
                width,
                height,
                count,
            })?;

        out.push(DecodedEntry {
            normalization,
            element,
            map,
        });
    }
    Ok(out)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, SchemaError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
    col.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| SchemaError::ColumnType {
            name: name.to_string(),
            found: col.data_type().clone(),
        })
}

/// Encode the subtree labels for the key-value metadata.
pub fn encode_groups<'a, I: IntoIterator<Item = &'a NormalizationType>>(groups: I) -> String {
    groups
        .into_iter()
        .map(|g| g.label())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_groups(value: &str) -> Result<Vec<NormalizationType>, SchemaError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<NormalizationType>().map_err(SchemaError::Group))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::ParseNormalizationError;

    #[test]
    fn batch_round_trip_keeps_keys_and_values() {
        let fe = ElementMap::new(2, 3, vec![0.1, 0.2, 0.3, 0.4, 0.5, f32::MAX]).unwrap();
        let o = ElementMap::new(1, 1, vec![-7.25]).unwrap();
        let batch = entries_to_batch([
            StoredEntry {
                normalization: NormalizationType::AtomicNormalized,
                element: "Fe",
                map: &fe,
            },
            StoredEntry {
                normalization: NormalizationType::WeightNormalized,
                element: "O",
                map: &o,
            },
        ])
        .unwrap();

        let decoded = batch_to_entries(&batch).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].normalization, NormalizationType::AtomicNormalized);
        assert_eq!(decoded[0].element, "Fe");
        assert_eq!(decoded[0].map, fe);
        assert_eq!(decoded[1].element, "O");
        assert_eq!(decoded[1].map, o);
    }

    #[test]
    fn groups_encode_as_labels() {
        let groups = [NormalizationType::AtomicNormalized, NormalizationType::WeightNormalized];
        let encoded = encode_groups(&groups);
        assert_eq!(encoded, "atom norm,weight norm");
        assert_eq!(decode_groups(&encoded).unwrap(), groups.to_vec());
        assert!(decode_groups("").unwrap().is_empty());
        assert!(matches!(
            decode_groups("atom norm,bogus"),
            Err(SchemaError::Group(ParseNormalizationError(label))) if label == "bogus"
        ));
    }

    fn one_row(norm: &str, width: i64, values: Vec<f32>) -> RecordBatch {
        let mut list = ListBuilder::new(Float32Builder::new());
        list.values().append_slice(&values);
        list.append(true);
        RecordBatch::try_new(
            store_schema(),
            vec![
                Arc::new(StringArray::from(vec![norm])),
                Arc::new(StringArray::from(vec!["Fe"])),
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Int64Array::from(vec![width])),
                Arc::new(list.finish()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn bad_rows_report_typed_errors() {
        match batch_to_entries(&one_row("atom norm", 3, vec![1.0, 2.0])) {
            Err(SchemaError::Dimensions {
                row, width, count, ..
            }) => {
                assert_eq!((row, width, count), (0, 3, 2));
            }
            Err(other) => panic!("expected Dimensions, got {other}"),
            Ok(_) => panic!("expected Dimensions"),
        }
        assert!(matches!(
            batch_to_entries(&one_row("volume norm", 1, vec![1.0])),
            Err(SchemaError::Normalization { row: 0, .. })
        ));
    }

    #[test]
    fn foreign_batches_are_rejected_by_column() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            COL_NORMALIZATION,
            DataType::Int64,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        match batch_to_entries(&batch) {
            Err(SchemaError::ColumnType { name, found }) => {
                assert_eq!(name, COL_NORMALIZATION);
                assert_eq!(found, DataType::Int64);
            }
            Err(other) => panic!("expected ColumnType, got {other}"),
            Ok(_) => panic!("expected ColumnType"),
        }

        let empty = RecordBatch::new_empty(Arc::new(Schema::empty()));
        assert!(matches!(
            batch_to_entries(&empty),
            Err(SchemaError::MissingColumn(name)) if name == COL_NORMALIZATION
        ));
    }
}
