//! JSON dataset store
//!
//! Every dataset is a single JSON array on disk. Each mutation reloads the file,
//! applies the change in memory and rewrites the whole array through a temporary
//! file in the same directory that is then renamed over the target, so readers
//! only ever see a complete old version or a complete new version.

use crate::storage::traits::{DatasetStore, StoreError, StoreResult, UpsertOutcome};
use crate::storage::Record;
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// File-backed dataset store guarded by one global lock
#[derive(Debug, Default)]
pub struct JsonStore {
    lock: Mutex<()>,
}

impl JsonStore {
    /// Creates a new store
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), so a panicked writer leaves nothing inconsistent behind
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DatasetStore for JsonStore {
    fn append(&self, path: &Path, record: Record, dedup_keys: &[String]) -> StoreResult<bool> {
        let _guard = self.guard();
        let mut data = read_dataset(path)?;

        if !dedup_keys.is_empty() {
            let candidate = Value::Object(record);
            let probe = dedup_tuple(&candidate, dedup_keys);

            if data
                .iter()
                .any(|existing| dedup_tuple(existing, dedup_keys) == probe)
            {
                tracing::trace!("Duplicate record skipped in {}", path.display());
                return Ok(false);
            }

            data.push(candidate);
        } else {
            data.push(Value::Object(record));
        }

        write_dataset(path, &data)?;
        Ok(true)
    }

    fn upsert(
        &self,
        path: &Path,
        match_field: &str,
        match_value: &str,
        patch: Record,
    ) -> StoreResult<UpsertOutcome> {
        let _guard = self.guard();
        let mut data = read_dataset(path)?;

        let existing = data.iter_mut().find_map(|value| match value {
            Value::Object(obj) if obj.get(match_field).and_then(Value::as_str) == Some(match_value) => {
                Some(obj)
            }
            _ => None,
        });

        let outcome = match existing {
            Some(obj) => {
                obj.extend(patch);
                UpsertOutcome::Updated
            }
            None => {
                let mut fresh = Record::new();
                fresh.insert(match_field.to_string(), Value::String(match_value.to_string()));
                fresh.extend(patch);
                data.push(Value::Object(fresh));
                UpsertOutcome::Inserted
            }
        };

        write_dataset(path, &data)?;
        Ok(outcome)
    }

    fn load(&self, path: &Path) -> StoreResult<Vec<Value>> {
        let _guard = self.guard();
        read_dataset(path)
    }
}

/// Reads a dataset file without taking the store lock
///
/// A missing file, unparsable content or a top-level value that is not an array
/// all read as an empty dataset. Other I/O failures are errors.
pub fn read_dataset(path: &Path) -> StoreResult<Vec<Value>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => {
            tracing::warn!("{} does not hold a JSON array, treating as empty", path.display());
            Ok(Vec::new())
        }
        Err(e) => {
            tracing::warn!("{} is not valid JSON ({}), treating as empty", path.display(), e);
            Ok(Vec::new())
        }
    }
}

/// Serializes the dataset into a temporary file next to `path`
///
/// Nothing at `path` changes until the returned file is persisted; dropping it
/// removes the temporary file.
pub(crate) fn stage_dataset(path: &Path, data: &[Value]) -> StoreResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, data)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;

    Ok(tmp)
}

fn write_dataset(path: &Path, data: &[Value]) -> StoreResult<()> {
    let tmp = stage_dataset(path, data)?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Projects the dedup fields of a record into comparable strings
fn dedup_tuple(value: &Value, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| key_text(pluck(value, key)))
        .collect()
}

/// Follows a dotted path (`a.b.c`) through nested objects
fn pluck<'v>(value: &'v Value, dotted: &str) -> Option<&'v Value> {
    dotted
        .split('.')
        .try_fold(value, |current, part| current.as_object()?.get(part))
}

/// String form used for dedup comparison
///
/// Strings compare by their raw text and everything else by compact JSON, so
/// `1` and `"1"` are the same key.
fn key_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}
