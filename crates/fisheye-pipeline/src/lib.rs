//! Device-facing workflows of the fisheye calibration pipeline.
//!
//! This crate orchestrates the external collaborators described in
//! [`device`] (motion/camera channel, file storage, numeric backend and
//! presenter) around the pure computations of `fisheye-core`:
//!
//! - [`preview`]: the preview session state machine, from raw-mode entry to
//!   a pushed perspective matrix, plus the fast height-change path;
//! - [`chessboard`]: live-capture and batch-from-device calibration with
//!   per-location checkpoints;
//! - [`progress`]: percentage and time-remaining reporting;
//! - [`persistence`]: last-write-wins stores for records and checkpoints.
//!
//! All device calls are awaited strictly in sequence. A [`DeviceConnection`]
//! is borrowed mutably by whichever session drives it, so only one session
//! can run per connection, and starting one tears down raw mode left over
//! from the previous one.
//!
//! # Example
//!
//! ```no_run
//! use fisheye_core::{CalibrationRecord, Workarea};
//! use fisheye_pipeline::device::{MotionChannel, Presenter};
//! use fisheye_pipeline::preview::{PreviewConfig, PreviewSession};
//! use fisheye_pipeline::{CancelToken, DeviceConnection, PipelineResult};
//!
//! async fn start_preview<C: MotionChannel, P: Presenter>(
//!     connection: &mut DeviceConnection<C>,
//!     presenter: P,
//!     record: CalibrationRecord,
//! ) -> PipelineResult<()> {
//!     let workarea = Workarea::new(430.0, 300.0, 40.0);
//!     let mut session =
//!         PreviewSession::new(connection, presenter, record, workarea, PreviewConfig::default())?;
//!     session.setup(&CancelToken::new()).await?;
//!     session.on_object_height_changed(12.5).await?;
//!     session.teardown().await
//! }
//! ```

mod cancel;
pub mod chessboard;
mod connection;
pub mod device;
mod error;
pub mod persistence;
pub mod preview;
pub mod progress;
pub mod session;

pub use cancel::{CancelToken, with_timeout};
pub use connection::DeviceConnection;
pub use error::{PipelineError, PipelineResult};
