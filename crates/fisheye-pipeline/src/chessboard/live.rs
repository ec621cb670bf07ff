//! Live-capture chessboard calibration: capture, solve, operator review.

use fisheye_core::Real;
use log::{info, warn};

use super::quality::{ReprojectionQuality, result_message};
use super::{
    ChessboardCheckpoint, ChessboardConfig, ChessboardSolution, LocationSolve,
    save_solution_record,
};
use crate::cancel::with_timeout;
use crate::connection::DeviceConnection;
use crate::device::{CalibrationBackend, MotionChannel, Picture, Presenter, SolverResponse};
use crate::persistence::RecordStore;
use crate::progress::with_nonstop_progress;
use crate::session::current_timestamp;
use crate::{PipelineError, PipelineResult};

/// What happened to a solved picture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    /// The operator accepted; the solve is committed and checkpointed.
    Accepted {
        quality: ReprojectionQuality,
        ret: Real,
    },
    /// The operator rejected; nothing changed and the feed is live for a retake.
    Rejected {
        quality: ReprojectionQuality,
        ret: Real,
    },
}

/// Drives live-capture calibration over one device connection.
pub struct ChessboardWorkflow<'c, C, B, P, R> {
    connection: &'c mut DeviceConnection<C>,
    backend: B,
    presenter: P,
    store: R,
    config: ChessboardConfig,
    checkpoint: ChessboardCheckpoint,
    frame: Option<Picture>,
    feed_paused: bool,
}

impl<'c, C, B, P, R> ChessboardWorkflow<'c, C, B, P, R>
where
    C: MotionChannel,
    B: CalibrationBackend,
    P: Presenter,
    R: RecordStore,
{
    /// Take over the connection, resume a stored checkpoint for the same
    /// board if there is one, and start the live feed.
    pub async fn start(
        connection: &'c mut DeviceConnection<C>,
        backend: B,
        presenter: P,
        mut store: R,
        config: ChessboardConfig,
    ) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::Config)?;
        connection.begin_session().await?;

        let checkpoint = match ChessboardCheckpoint::load(&mut store, &config.checkpoint_key).await? {
            Some(c) if c.chessboard == config.chessboard => {
                info!(
                    "resuming chessboard calibration with {} accepted locations",
                    c.state.accepted.len()
                );
                c
            }
            Some(c) => {
                warn!(
                    "stored checkpoint is for a {:?} board, starting a new {:?} run",
                    c.chessboard, config.chessboard
                );
                ChessboardCheckpoint::new(config.chessboard)
            }
            None => ChessboardCheckpoint::new(config.chessboard),
        };

        let mut workflow = Self {
            connection,
            backend,
            presenter,
            store,
            config,
            checkpoint,
            frame: None,
            feed_paused: true,
        };
        workflow.refresh_feed().await?;
        Ok(workflow)
    }

    pub fn checkpoint(&self) -> &ChessboardCheckpoint {
        &self.checkpoint
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_feed_paused(&self) -> bool {
        self.feed_paused
    }

    pub fn latest_frame(&self) -> Option<&Picture> {
        self.frame.as_ref()
    }

    /// Grab a fresh frame; the feed is live afterwards.
    pub async fn refresh_feed(&mut self) -> PipelineResult<&Picture> {
        let picture = with_timeout(
            self.config.round_trip_timeout(),
            self.connection.channel_mut().take_one_picture(),
        )
        .await?;
        self.feed_paused = false;
        Ok(self.frame.insert(picture))
    }

    async fn resume_feed(&mut self) {
        if let Err(err) = self.refresh_feed().await {
            warn!("could not refresh camera feed: {err}");
            self.feed_paused = false;
        }
    }

    /// Solve the current frame as the picture of `location`, captured at `offset`.
    ///
    /// The feed is frozen while the backend works and is live again on every
    /// return path. Solver failures are shown to the operator and returned as
    /// [`PipelineError::Solver`]; the session stays usable for a retake.
    pub async fn solve_location(&mut self, location: &str, offset: Real) -> PipelineResult<SolveOutcome> {
        let picture = match self.frame.take() {
            Some(p) => p,
            None => self.refresh_feed().await?.clone(),
        };
        self.feed_paused = true;

        let response = with_nonstop_progress(
            &mut self.presenter,
            &self.config.progress_id,
            "calibrating chessboard",
            self.config.round_trip_timeout(),
            self.backend
                .calibrate_chessboard(&picture.bytes, offset, self.config.chessboard),
        )
        .await;

        let solve = match response {
            Ok(SolverResponse::Solved(solve)) => solve,
            Ok(SolverResponse::Failed { reason }) => {
                self.presenter
                    .show_error(&format!("failed to calibrate chessboard: {reason}"));
                self.checkpoint
                    .log_failure("solve", format!("{location}: {reason}"));
                self.resume_feed().await;
                return Err(PipelineError::Solver { reason });
            }
            Err(err) => {
                self.presenter.show_error(&err.to_string());
                self.checkpoint.log_failure("solve", format!("{location}: {err}"));
                self.resume_feed().await;
                return Err(err);
            }
        };

        let ret = solve.ret;
        let quality = self.config.quality.classify(ret);
        let message = result_message(quality, ret);
        info!("{location}: {message}");

        if !self.presenter.confirm(&message).await {
            info!("{location}: result rejected by operator");
            self.resume_feed().await;
            return Ok(SolveOutcome::Rejected { quality, ret });
        }

        self.checkpoint.record_solve(LocationSolve {
            location: location.to_string(),
            offset,
            solve,
            captured_at: current_timestamp(),
        });
        self.resume_feed().await;
        self.checkpoint
            .save(&mut self.store, &self.config.checkpoint_key)
            .await?;
        Ok(SolveOutcome::Accepted { quality, ret })
    }

    /// Combine every accepted location into the final solution and persist it
    /// together with the calibration record sampled from it.
    pub async fn finalize(&mut self) -> PipelineResult<ChessboardSolution> {
        let solution = ChessboardSolution::from_accepted(&self.checkpoint.state.accepted)?;
        self.checkpoint.set_output(solution.clone());
        self.checkpoint
            .save(&mut self.store, &self.config.checkpoint_key)
            .await?;
        save_solution_record(&mut self.store, &self.config, &solution).await?;
        if let Some(ret) = solution.ret {
            let quality = self.config.quality.classify(ret);
            self.presenter.show_info(&result_message(quality, ret));
        }
        Ok(solution)
    }
}
