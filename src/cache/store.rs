use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use super::schema::{self, StoredEntry};
use crate::data::model::{ElementMap, NormalizationType};
use crate::data::naming::store_file_name;
use crate::error::{SchemaError, StoreError};

type Groups = BTreeMap<NormalizationType, BTreeMap<String, ElementMap>>;

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing entries are kept; every insert is written through to the store.
    Append,
    /// Start empty; inserts go to a staging file that replaces the store on
    /// [`CacheHandle::close`]. Until then the previous store is untouched.
    Rebuild,
}

// ---------------------------------------------------------------------------
// CacheHandle – one open session on a sample store
// ---------------------------------------------------------------------------

/// Per-sample element map store: normalization type → element → map.
///
/// Entries are never overwritten once present. The whole store lives in memory
/// while the handle is open and is rewritten atomically (temp file + rename)
/// on every flush.
///
/// Only one handle per sample may be open at a time; nothing guards against
/// concurrent writers from other processes.
#[derive(Debug)]
pub struct CacheHandle {
    path: PathBuf,
    mode: OpenMode,
    groups: Groups,
    dirty: bool,
    closed: bool,
}

impl CacheHandle {
    /// Location of the store for `sample` inside `data_dir`.
    pub fn store_path(data_dir: &Path, sample: &str) -> PathBuf {
        data_dir.join(store_file_name(sample))
    }

    /// Open the sample's store, creating an empty one if none exists.
    pub fn open_or_create(data_dir: &Path, sample: &str) -> Result<Self, StoreError> {
        let path = Self::store_path(data_dir, sample);
        let (groups, dirty) = if path.exists() {
            let groups = read_store(&path)?;
            debug!(
                "opened cache store {} ({} entries)",
                path.display(),
                groups.values().map(BTreeMap::len).sum::<usize>()
            );
            (groups, false)
        } else {
            info!("creating cache store {}", path.display());
            (Groups::new(), true)
        };

        let mut handle = CacheHandle {
            path,
            mode: OpenMode::Append,
            groups,
            dirty,
            closed: false,
        };
        if handle.dirty {
            handle.flush()?;
        }
        Ok(handle)
    }

    /// Start a fresh store for the sample, discarding the old one on commit.
    pub fn open_for_rebuild(data_dir: &Path, sample: &str) -> Result<Self, StoreError> {
        let path = Self::store_path(data_dir, sample);
        if !data_dir.is_dir() {
            return Err(StoreError::Io {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "data directory does not exist",
                ),
            });
        }
        info!("rebuilding cache store {}", path.display());
        let mut handle = CacheHandle {
            path,
            mode: OpenMode::Rebuild,
            groups: Groups::new(),
            dirty: true,
            closed: false,
        };
        handle.flush()?;
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Create the subtree for `normalization` if absent. Returns whether it was created.
    pub fn ensure_group(&mut self, normalization: NormalizationType) -> bool {
        if self.groups.contains_key(&normalization) {
            return false;
        }
        debug!("creating cache group '{normalization}'");
        self.groups.insert(normalization, BTreeMap::new());
        self.dirty = true;
        true
    }

    pub fn has_group(&self, normalization: NormalizationType) -> bool {
        self.groups.contains_key(&normalization)
    }

    /// Subtrees present in the store.
    pub fn groups(&self) -> impl Iterator<Item = NormalizationType> + '_ {
        self.groups.keys().copied()
    }

    pub fn contains(&self, normalization: NormalizationType, element: &str) -> bool {
        self.get(normalization, element).is_some()
    }

    pub fn get(&self, normalization: NormalizationType, element: &str) -> Option<&ElementMap> {
        self.groups.get(&normalization)?.get(element)
    }

    /// Every stored map, grouped by normalization type then element symbol.
    pub fn entries(&self) -> impl Iterator<Item = (NormalizationType, &str, &ElementMap)> + '_ {
        self.groups.iter().flat_map(|(norm, elements)| {
            elements
                .iter()
                .map(move |(element, map)| (*norm, element.as_str(), map))
        })
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a map and flush it to disk immediately.
    ///
    /// Returns `Ok(false)` without touching the store when the entry already
    /// exists.
    pub fn insert(
        &mut self,
        normalization: NormalizationType,
        element: &str,
        map: ElementMap,
    ) -> Result<bool, StoreError> {
        let group = self.groups.entry(normalization).or_default();
        if group.contains_key(element) {
            warn!("cache entry {normalization}/{element} already exists; keeping the stored map");
            return Ok(false);
        }
        group.insert(element.to_string(), map);
        self.dirty = true;
        self.flush()?;
        Ok(true)
    }

    /// Write pending changes. Append sessions write the store itself, rebuild
    /// sessions write the staging file.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let target = match self.mode {
            OpenMode::Append => self.path.clone(),
            OpenMode::Rebuild => staging_path(&self.path),
        };
        write_store(&target, &self.groups)?;
        self.dirty = false;
        Ok(())
    }

    /// Flush and release the store. A rebuild replaces the previous store here.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.flush()?;
        if self.mode == OpenMode::Rebuild {
            let staging = staging_path(&self.path);
            fs::rename(&staging, &self.path).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
            info!("rebuilt cache store {} ({} entries)", self.path.display(), self.len());
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.mode {
            OpenMode::Append => {
                if let Err(e) = self.flush() {
                    error!("failed to flush cache store on release: {e}");
                }
            }
            OpenMode::Rebuild => {
                let staging = staging_path(&self.path);
                if staging.exists() {
                    warn!(
                        "abandoning unfinished rebuild of {}; previous store kept",
                        self.path.display()
                    );
                    if let Err(e) = fs::remove_file(&staging) {
                        error!("failed to remove {}: {e}", staging.display());
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parquet I/O
// ---------------------------------------------------------------------------

fn staging_path(path: &Path) -> PathBuf {
    with_suffix(path, ".rebuild")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn read_store(path: &Path) -> Result<Groups, StoreError> {
    let parquet_err = |source| StoreError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let corrupt = |source: SchemaError| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(parquet_err)?;

    let mut groups = Groups::new();
    if let Some(kv) = builder.metadata().file_metadata().key_value_metadata() {
        for entry in kv {
            let value = entry.value.as_deref().unwrap_or("");
            match entry.key.as_str() {
                schema::META_FORMAT_VERSION if value != schema::FORMAT_VERSION => {
                    return Err(corrupt(SchemaError::FormatVersion(value.to_string())));
                }
                schema::META_GROUPS => {
                    for group in schema::decode_groups(value).map_err(corrupt)? {
                        groups.entry(group).or_default();
                    }
                }
                _ => {}
            }
        }
    }

    let reader = builder.build().map_err(parquet_err)?;
    for batch in reader {
        let batch = batch.map_err(|source| StoreError::Arrow {
            path: path.to_path_buf(),
            source,
        })?;
        for entry in schema::batch_to_entries(&batch).map_err(corrupt)? {
            groups
                .entry(entry.normalization)
                .or_default()
                .entry(entry.element)
                .or_insert(entry.map);
        }
    }
    Ok(groups)
}

fn write_store(target: &Path, groups: &Groups) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: target.to_path_buf(),
        source,
    };
    let parquet_err = |source| StoreError::Parquet {
        path: target.to_path_buf(),
        source,
    };

    let batch = schema::entries_to_batch(groups.iter().flat_map(|(norm, elements)| {
        elements.iter().map(move |(element, map)| StoredEntry {
            normalization: *norm,
            element: element.as_str(),
            map,
        })
    }))
    .map_err(|source| StoreError::Arrow {
        path: target.to_path_buf(),
        source,
    })?;

    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![
            KeyValue::new(
                schema::META_FORMAT_VERSION.to_string(),
                schema::FORMAT_VERSION.to_string(),
            ),
            KeyValue::new(
                schema::META_GROUPS.to_string(),
                schema::encode_groups(groups.keys()),
            ),
        ]))
        .build();

    let tmp = with_suffix(target, ".tmp");
    let file = File::create(&tmp).map_err(io_err)?;
    let mut writer = ArrowWriter::try_new(
        file.try_clone().map_err(io_err)?,
        schema::store_schema(),
        Some(props),
    )
    .map_err(parquet_err)?;
    writer.write(&batch).map_err(parquet_err)?;
    writer.close().map_err(parquet_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, target).map_err(io_err)?;

    debug!("flushed {} ({} rows)", target.display(), batch.num_rows());
    Ok(())
}
