//! Keyed storage for calibration records and checkpoints.
//!
//! Writes replace the previous value wholesale (last write wins); concurrent
//! writers are not coordinated.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use fisheye_core::CalibrationRecord;

use crate::device::FileStorage;
use crate::{PipelineError, PipelineResult};

/// Byte-level keyed store.
pub trait RecordStore {
    fn put(&mut self, key: &str, contents: Vec<u8>) -> impl Future<Output = PipelineResult<()>>;
    fn get(&mut self, key: &str) -> impl Future<Output = PipelineResult<Option<Vec<u8>>>>;
}

/// Serialize `value` as pretty JSON under `key`.
pub async fn save_json<R: RecordStore, T: Serialize>(
    store: &mut R,
    key: &str,
    value: &T,
) -> PipelineResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PipelineError::Storage(format!("failed to encode {key}: {e}")))?;
    store.put(key, bytes).await
}

/// Load and decode the JSON stored under `key`, if any.
pub async fn load_json<R: RecordStore, T: DeserializeOwned>(
    store: &mut R,
    key: &str,
) -> PipelineResult<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PipelineError::Storage(format!("failed to decode {key}: {e}"))),
        None => Ok(None),
    }
}

/// Key of the calibration record for a model, or for one unit when the
/// calibration is per device.
pub fn record_key(model: &str, serial: Option<&str>) -> String {
    match serial {
        Some(serial) => format!("fisheye-{model}-{serial}.json"),
        None => format!("fisheye-{model}.json"),
    }
}

pub async fn save_record<R: RecordStore>(
    store: &mut R,
    key: &str,
    record: &CalibrationRecord,
) -> PipelineResult<()> {
    record.validate()?;
    save_json(store, key, record).await
}

/// Load a calibration record; a stored record without pose data is an error.
pub async fn load_record<R: RecordStore>(
    store: &mut R,
    key: &str,
) -> PipelineResult<Option<CalibrationRecord>> {
    load_json(store, key).await
}

/// Store backed by a directory of the device's file storage.
#[derive(Debug, Clone)]
pub struct DeviceStore<S> {
    storage: S,
    dir: String,
}

impl<S: FileStorage> DeviceStore<S> {
    pub fn new(storage: S, dir: impl Into<String>) -> Self {
        Self {
            storage,
            dir: dir.into(),
        }
    }
}

impl<S: FileStorage> RecordStore for DeviceStore<S> {
    async fn put(&mut self, key: &str, contents: Vec<u8>) -> PipelineResult<()> {
        debug!("uploading {key} to {}", self.dir);
        self.storage.upload_to_directory(contents, &self.dir, key).await
    }

    async fn get(&mut self, key: &str) -> PipelineResult<Option<Vec<u8>>> {
        let files = self.storage.ls(&self.dir).await?;
        if !files.iter().any(|f| f == key) {
            return Ok(None);
        }
        let bytes = self
            .storage
            .download_file(&self.dir, key, &mut |_| {})
            .await?;
        Ok(Some(bytes))
    }
}

/// Store backed by a local directory.
///
/// Each write goes to a temporary sibling file which is then renamed over
/// the target, so readers never observe a partial document.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl RecordStore for DirectoryStore {
    async fn put(&mut self, key: &str, contents: Vec<u8>) -> PipelineResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.path(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn get(&mut self, key: &str) -> PipelineResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
