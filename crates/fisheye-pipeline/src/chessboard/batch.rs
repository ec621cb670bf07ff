//! Batch calibration from pictures already stored on the device.

use std::path::Path;

use fisheye_core::Real;
use log::{debug, info, warn};

use super::checkpoint::CachedImage;
use super::{ChessboardCheckpoint, ChessboardConfig, ChessboardSolution, save_solution_record};
use crate::cancel::{CancelToken, with_timeout};
use crate::connection::DeviceConnection;
use crate::device::{CalibrationBackend, FileStorage, MotionChannel, Presenter};
use crate::persistence::RecordStore;
use crate::progress::{EtaTracker, step_message};
use crate::{PipelineError, PipelineResult};

/// A stored picture named `pic_<offset>_<location>.jpg`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationFile {
    pub name: String,
    pub offset: Real,
    pub location: String,
}

/// Parse a calibration picture name; anything else yields `None`.
///
/// The offset may be negative or fractional and the location may itself
/// contain underscores (`pic_-1.5_top_left.jpg`).
pub fn parse_calibration_file(name: &str) -> Option<CalibrationFile> {
    let stem = name.strip_prefix("pic_")?.strip_suffix(".jpg")?;
    let (offset, location) = stem.split_once('_')?;
    if location.is_empty() {
        return None;
    }
    let offset: Real = offset.parse().ok()?;
    if !offset.is_finite() {
        return None;
    }
    Some(CalibrationFile {
        name: name.to_string(),
        offset,
        location: location.to_string(),
    })
}

/// Group files by location, keeping the order locations were first listed in.
pub fn group_by_location(files: Vec<CalibrationFile>) -> Vec<(String, Vec<CalibrationFile>)> {
    let mut groups: Vec<(String, Vec<CalibrationFile>)> = Vec::new();
    for file in files {
        match groups.iter_mut().find(|(loc, _)| *loc == file.location) {
            Some((_, entries)) => entries.push(file),
            None => groups.push((file.location.clone(), vec![file])),
        }
    }
    groups
}

async fn discard_cached(images: &[CachedImage]) {
    for image in images {
        if let Err(err) = tokio::fs::remove_file(&image.path).await {
            debug!("could not remove {}: {err}", image.path.display());
        }
    }
}

async fn all_cached(images: &[CachedImage]) -> bool {
    for image in images {
        if !tokio::fs::try_exists(&image.path).await.unwrap_or(false) {
            return false;
        }
    }
    true
}

const DOWNLOAD_MESSAGE: &str = "downloading calibration data";

/// Downloads stored calibration pictures location by location, feeds them to
/// the backend's accumulator, and requests the combined solve.
///
/// A checkpoint is uploaded after every location. A rerun skips checkpointed
/// locations: their cached pictures are re-added to the backend without
/// downloading them again.
pub struct BatchCalibration<'c, C, S, B, P, R> {
    connection: &'c mut DeviceConnection<C>,
    storage: S,
    backend: B,
    presenter: P,
    store: R,
    config: ChessboardConfig,
}

impl<'c, C, S, B, P, R> BatchCalibration<'c, C, S, B, P, R>
where
    C: MotionChannel,
    S: FileStorage,
    B: CalibrationBackend,
    P: Presenter,
    R: RecordStore,
{
    pub fn new(
        connection: &'c mut DeviceConnection<C>,
        storage: S,
        backend: B,
        presenter: P,
        store: R,
        config: ChessboardConfig,
    ) -> Self {
        Self {
            connection,
            storage,
            backend,
            presenter,
            store,
            config,
        }
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run to completion, cancellation, or the first failure.
    ///
    /// The device is released and the progress indicator dismissed on every
    /// path.
    pub async fn run(&mut self, cancel: &CancelToken) -> PipelineResult<ChessboardSolution> {
        self.config.validate().map_err(PipelineError::Config)?;
        self.connection.begin_session().await?;

        let id = self.config.progress_id.clone();
        self.presenter.open_stepping(&id, "preparing calibration data");
        let result = self.run_steps(cancel).await;

        if let Err(err) = self.connection.release().await {
            warn!("failed to release device after batch calibration: {err}");
        }
        self.presenter.dismiss(&id);

        match &result {
            Ok(_) => info!("batch calibration finished"),
            Err(PipelineError::Cancelled) => info!("batch calibration cancelled"),
            Err(err) => self.presenter.show_error(&err.to_string()),
        }
        result
    }

    async fn run_steps(&mut self, cancel: &CancelToken) -> PipelineResult<ChessboardSolution> {
        let timeout = self.config.round_trip_timeout();
        let names = with_timeout(timeout, self.storage.ls(&self.config.image_dir)).await?;
        let groups = group_by_location(
            names
                .iter()
                .filter_map(|n| parse_calibration_file(n))
                .collect(),
        );
        if groups.is_empty() {
            return Err(PipelineError::Storage(format!(
                "no calibration pictures in {}",
                self.config.image_dir
            )));
        }

        let mut checkpoint = self.load_checkpoint().await?;
        with_timeout(timeout, self.backend.start_calibration()).await?;
        self.reseed(&mut checkpoint).await?;

        let pending: Vec<_> = groups
            .into_iter()
            .filter(|(location, _)| !checkpoint.is_downloaded(location))
            .collect();
        let total: usize = pending.iter().map(|(_, files)| files.len()).sum();
        info!(
            "{} locations checkpointed, {} files in {} locations to download",
            checkpoint.state.downloaded.len(),
            total,
            pending.len()
        );

        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let mut tracker = EtaTracker::new(total);
        for (location, files) in pending {
            match self
                .download_location(&files, &mut tracker, cancel)
                .await
            {
                Ok(images) => {
                    checkpoint.record_download(location, images);
                    checkpoint
                        .save(&mut self.store, &self.config.checkpoint_key)
                        .await?;
                }
                Err(err) => {
                    checkpoint.log_failure("download", format!("{location}: {err}"));
                    return Err(err);
                }
            }
        }
        cancel.check()?;

        let id = self.config.progress_id.clone();
        let presenter = &mut self.presenter;
        presenter.update(&id, Some(0.0), "calibrating");
        let solution = self
            .backend
            .do_full_calibration(&mut |fraction| {
                presenter.update(&id, Some((fraction * 100.0).clamp(0.0, 100.0)), "calibrating");
            })
            .await?;

        checkpoint.set_output(solution.clone());
        checkpoint
            .save(&mut self.store, &self.config.checkpoint_key)
            .await?;
        save_solution_record(&mut self.store, &self.config, &solution).await?;
        Ok(solution)
    }

    async fn load_checkpoint(&mut self) -> PipelineResult<ChessboardCheckpoint> {
        let stored = ChessboardCheckpoint::load(&mut self.store, &self.config.checkpoint_key).await?;
        Ok(match stored {
            Some(c) if c.chessboard == self.config.chessboard => c,
            Some(c) => {
                warn!(
                    "stored checkpoint is for a {:?} board, starting over",
                    c.chessboard
                );
                ChessboardCheckpoint::new(self.config.chessboard)
            }
            None => ChessboardCheckpoint::new(self.config.chessboard),
        })
    }

    /// Re-add cached pictures of checkpointed locations to a fresh accumulator.
    async fn reseed(&mut self, checkpoint: &mut ChessboardCheckpoint) -> PipelineResult<()> {
        let timeout = self.config.round_trip_timeout();
        let mut stale = Vec::new();
        for done in &checkpoint.state.downloaded {
            if !all_cached(&done.images).await {
                stale.push(done.location.clone());
                continue;
            }
            for image in &done.images {
                with_timeout(timeout, self.backend.add_calibrate_img(image.offset, &image.path))
                    .await?;
            }
        }
        for location in stale {
            warn!("cached pictures of {location} are gone, downloading them again");
            checkpoint.forget_download(&location);
        }
        Ok(())
    }

    async fn download_location(
        &mut self,
        files: &[CalibrationFile],
        tracker: &mut EtaTracker,
        cancel: &CancelToken,
    ) -> PipelineResult<Vec<CachedImage>> {
        let mut images = Vec::with_capacity(files.len());
        for file in files {
            match self.fetch_one(file, tracker, cancel).await {
                Ok(Some(image)) => images.push(image),
                Ok(None) => {}
                Err(err) => {
                    discard_cached(&images).await;
                    return Err(match err {
                        PipelineError::Cancelled => PipelineError::Cancelled,
                        other => PipelineError::PartialDownload {
                            file: file.name.clone(),
                            source: Box::new(other),
                        },
                    });
                }
            }
        }
        Ok(images)
    }

    /// Download one picture into the cache and add it to the accumulator.
    ///
    /// `None` when the backend found no chessboard in it.
    async fn fetch_one(
        &mut self,
        file: &CalibrationFile,
        tracker: &mut EtaTracker,
        cancel: &CancelToken,
    ) -> PipelineResult<Option<CachedImage>> {
        cancel.check()?;
        let timeout = self.config.round_trip_timeout();
        let index = tracker.completed() + 1;
        let total = tracker.total();
        tracker.begin_item();

        let id = &self.config.progress_id;
        let presenter = &mut self.presenter;
        let bytes = {
            let tracker = &*tracker;
            with_timeout(
                timeout,
                self.storage
                    .download_file(&self.config.image_dir, &file.name, &mut |progress| {
                        let e = tracker.estimate_within_item(progress.fraction());
                        presenter.update(
                            id,
                            Some(e.percentage),
                            &step_message(DOWNLOAD_MESSAGE, index, total, e.remaining),
                        );
                    }),
            )
            .await?
        };

        let path = self.config.cache_dir.join(&file.name);
        if let Err(err) = write_cached(&path, &bytes).await {
            warn!("failed to cache {}: {err}", file.name);
            return Err(err.into());
        }
        let added = match with_timeout(timeout, self.backend.add_calibrate_img(file.offset, &path)).await {
            Ok(added) => added,
            Err(err) => {
                remove_quietly(&path).await;
                return Err(err);
            }
        };

        let estimate = tracker.complete_item();
        self.presenter.update(
            &self.config.progress_id,
            Some(estimate.percentage),
            &step_message(DOWNLOAD_MESSAGE, index, total, estimate.remaining),
        );

        if !added {
            warn!("no chessboard found in {}, skipping it", file.name);
            remove_quietly(&path).await;
            return Ok(None);
        }
        Ok(Some(CachedImage {
            file: file.name.clone(),
            offset: file.offset,
            path,
        }))
    }
}

/// Write through a staging file so a cached picture is either complete or absent.
async fn write_cached(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let staging = path.with_file_name(format!(".{name}.tmp"));
    let written = match tokio::fs::write(&staging, bytes).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(err) => Err(err),
    };
    if written.is_err() {
        remove_quietly(&staging).await;
    }
    written
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        debug!("could not remove {}: {err}", path.display());
    }
}
