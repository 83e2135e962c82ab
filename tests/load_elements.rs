use std::cell::Cell;
use std::fs;
use std::path::Path;

use xray_phasemap::data::source::read_element_map;
use xray_phasemap::{
    load_elements, load_elements_with, CacheHandle, ElementMap, ElementOutcome, NormalizationType,
    ReadError, Request, SourceReader,
};

/// Filesystem reader that counts how often it is asked for a file.
#[derive(Default)]
struct CountingReader {
    reads: Cell<usize>,
}

impl SourceReader for CountingReader {
    fn read(&self, path: &Path) -> Result<ElementMap, ReadError> {
        self.reads.set(self.reads.get() + 1);
        read_element_map(path)
    }
}

fn write_text_map(dir: &Path, name: &str, rows: &[&[f32]]) {
    let text: String = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(";")
                + "\n"
        })
        .collect();
    fs::write(dir.join(name), text).unwrap();
}

fn three_by_three(seed: f32) -> Vec<Vec<f32>> {
    (0..3)
        .map(|r| (0..3).map(|c| seed + (r * 3 + c) as f32 * 0.1).collect())
        .collect()
}

fn write_grid(dir: &Path, name: &str, grid: &[Vec<f32>]) {
    let rows: Vec<&[f32]> = grid.iter().map(Vec::as_slice).collect();
    write_text_map(dir, name, &rows);
}

#[test]
fn atomic_sample_loads_and_caches_both_elements() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(1.0));
    write_grid(dir.path(), "S1-atom norm_O.txt", &three_by_three(2.0));

    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe", "O"]);
    let loaded = load_elements(&request).unwrap();

    assert_eq!(loaded.maps.len(), 2);
    assert_eq!(loaded.width(), Some(3));
    assert_eq!(loaded.height(), Some(3));
    assert_eq!(
        loaded.maps["Fe"],
        ElementMap::from_rows(three_by_three(1.0)).unwrap()
    );

    let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
    assert!(dir.path().join("PhaseAnalysis_sampleS1.parquet").is_file());
    assert!(store.contains(NormalizationType::AtomicNormalized, "Fe"));
    assert!(store.contains(NormalizationType::AtomicNormalized, "O"));
    assert!(!store.contains(NormalizationType::WeightNormalized, "Fe"));
}

#[test]
fn second_call_is_served_from_cache_without_reads() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(0.3));
    write_grid(dir.path(), "S1-atom norm_O.txt", &three_by_three(0.7));
    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe", "O"]);

    let reader = CountingReader::default();
    let first = load_elements_with(&request, &reader).unwrap();
    assert_eq!(reader.reads.get(), 2);

    let reader = CountingReader::default();
    let second = load_elements_with(&request, &reader).unwrap();
    assert_eq!(reader.reads.get(), 0);
    assert_eq!(second.cache_hits(), 2);

    for (element, map) in &first.maps {
        let cached = &second.maps[element];
        let bits = |m: &ElementMap| m.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(map), bits(cached), "{element} differs after caching");
    }
}

#[test]
fn cached_maps_survive_source_removal() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(5.0));
    let request =
        Request::new("S1", NormalizationType::AtomicNormalized, dir.path()).with_elements(["Fe"]);

    load_elements(&request).unwrap();
    fs::remove_file(dir.path().join("S1-atom norm_Fe.txt")).unwrap();

    let loaded = load_elements(&request).unwrap();
    assert_eq!(loaded.diagnostics[0].outcome, ElementOutcome::CacheHit);
    assert_eq!(loaded.maps["Fe"].get(2, 2), Some(three_by_three(5.0)[2][2]));
}

#[test]
fn weight_normalized_falls_back_to_legacy_names() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1_mass_norm_Fe.txt", &three_by_three(1.0));
    write_grid(dir.path(), "S1-w%-norm_O.txt", &three_by_three(2.0));

    let request = Request::new("S1", NormalizationType::WeightNormalized, dir.path())
        .with_elements(["Fe", "O"]);
    let loaded = load_elements(&request).unwrap();

    assert_eq!(loaded.maps.len(), 2);
    assert_eq!(
        loaded.diagnostics[0].outcome,
        ElementOutcome::Loaded {
            path: dir.path().join("S1_mass_norm_Fe.txt")
        }
    );

    let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
    assert!(store.contains(NormalizationType::WeightNormalized, "Fe"));
    assert!(store.contains(NormalizationType::WeightNormalized, "O"));
}

#[test]
fn atomic_does_not_use_weight_fallbacks() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1_mass_norm_Fe.txt", &three_by_three(1.0));

    let request =
        Request::new("S1", NormalizationType::AtomicNormalized, dir.path()).with_elements(["Fe"]);
    let loaded = load_elements(&request).unwrap();

    assert!(loaded.maps.is_empty());
    match &loaded.diagnostics[0].outcome {
        ElementOutcome::NotFound { tried } => assert_eq!(tried.len(), 1),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn missing_elements_are_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-weight norm_Fe.txt", &three_by_three(1.0));

    let request = Request::new("S1", NormalizationType::WeightNormalized, dir.path())
        .with_elements(["Fe", "Xx"]);
    let loaded = load_elements(&request).unwrap();

    assert_eq!(loaded.maps.keys().collect::<Vec<_>>(), vec!["Fe"]);
    let missing: Vec<_> = loaded.missing().collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].element, "Xx");
    match &missing[0].outcome {
        ElementOutcome::NotFound { tried } => assert_eq!(tried.len(), 4),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn unreadable_files_are_reported_per_element() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(1.0));
    fs::write(dir.path().join("S1-atom norm_O.txt"), "1;2;3\nnot;a;number\n").unwrap();

    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["O", "Fe"]);
    let loaded = load_elements(&request).unwrap();

    assert!(matches!(
        loaded.diagnostics[0].outcome,
        ElementOutcome::ParseError { .. }
    ));
    assert!(loaded.maps.contains_key("Fe"));

    let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
    assert!(!store.contains(NormalizationType::AtomicNormalized, "O"));
}

#[test]
fn unsupported_extension_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("S1-atom norm_Fe.csv"), "1;2\n").unwrap();

    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe"])
        .with_extension("csv");
    let loaded = load_elements(&request).unwrap();

    match &loaded.diagnostics[0].outcome {
        ElementOutcome::Unsupported { extension, .. } => assert_eq!(extension, "csv"),
        other => panic!("expected Unsupported, got {other:?}"),
    }
}

#[test]
fn overwrite_discards_previous_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(1.0));
    write_grid(dir.path(), "S1-atom norm_O.txt", &three_by_three(2.0));
    let both = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe", "O"]);
    load_elements(&both).unwrap();

    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(9.0));
    let rebuild = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe"])
        .with_overwrite(true);
    let reader = CountingReader::default();
    let loaded = load_elements_with(&rebuild, &reader).unwrap();

    assert_eq!(reader.reads.get(), 1);
    assert_eq!(loaded.maps["Fe"].get(0, 0), Some(9.0));

    let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
    assert!(store.contains(NormalizationType::AtomicNormalized, "Fe"));
    assert!(!store.contains(NormalizationType::AtomicNormalized, "O"));
}

#[test]
fn mismatched_shapes_are_excluded() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(1.0));
    write_text_map(dir.path(), "S1-atom norm_O.txt", &[&[1.0, 2.0], &[3.0, 4.0]]);

    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path())
        .with_elements(["Fe", "O"]);
    let loaded = load_elements(&request).unwrap();

    assert_eq!(loaded.maps.len(), 1);
    assert_eq!(loaded.width(), Some(3));
    match &loaded.diagnostics[1].outcome {
        ElementOutcome::ShapeMismatch { expected, found } => {
            assert_eq!((expected.width, expected.height), (3, 3));
            assert_eq!((found.width, found.height), (2, 2));
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn normalization_types_are_cached_separately() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path(), "S1-atom norm_Fe.txt", &three_by_three(1.0));
    write_grid(dir.path(), "S1-weight norm_Fe.txt", &three_by_three(4.0));

    let atomic =
        Request::new("S1", NormalizationType::AtomicNormalized, dir.path()).with_elements(["Fe"]);
    let weight =
        Request::new("S1", NormalizationType::WeightNormalized, dir.path()).with_elements(["Fe"]);
    let a = load_elements(&atomic).unwrap();
    let w = load_elements(&weight).unwrap();

    assert_ne!(a.maps["Fe"], w.maps["Fe"]);
    let store = CacheHandle::open_or_create(dir.path(), "S1").unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn missing_data_directory_fails_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::new("S1", NormalizationType::AtomicNormalized, dir.path().join("absent"))
        .with_elements(["Fe"]);
    assert!(load_elements(&request).is_err());
}

#[test]
fn float_tiff_weight_maps_load_and_cache() {
    use tiff::encoder::{colortype, TiffEncoder};

    let dir = tempfile::tempdir().unwrap();
    let data: Vec<f32> = (0..12).map(|i| i as f32 / 16.0).collect();
    let file = fs::File::create(dir.path().join("S1-w% norm_Fe.tif")).unwrap();
    TiffEncoder::new(file)
        .unwrap()
        .write_image::<colortype::Gray32Float>(4, 3, &data)
        .unwrap();

    let request = Request::new("S1", NormalizationType::WeightNormalized, dir.path())
        .with_elements(["Fe"])
        .with_extension("tif");
    let loaded = load_elements(&request).unwrap();

    assert_eq!(loaded.width(), Some(4));
    assert_eq!(loaded.height(), Some(3));
    assert_eq!(loaded.maps["Fe"].get(3, 2), Some(11.0 / 16.0));

    let again = load_elements(&request).unwrap();
    assert_eq!(again.diagnostics[0].outcome, ElementOutcome::CacheHit);
    assert_eq!(again.maps["Fe"], loaded.maps["Fe"]);
}
