use std::fmt;

use fisheye_core::{
    CalibrationRecord, CoreError, LevelingProfile, LevelingSource, PerspectiveModel,
    PerspectivePointGrid, PerspectiveResolver, Real, RotationData, StandardModel, Workarea,
    effective_height,
};
use log::{debug, info, warn};

use super::PreviewConfig;
use crate::cancel::{CancelToken, with_timeout};
use crate::connection::DeviceConnection;
use crate::device::{MotionChannel, Presenter};
use crate::{PipelineError, PipelineResult};

/// Where a preview session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Idle,
    EnteringRawMode,
    FetchingLeveling,
    LoadingPose,
    Homing,
    ComputingPerspective,
    PushingMatrix,
    ExitingRawMode,
    Ready,
}

impl PreviewState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::EnteringRawMode => "entering raw mode",
            Self::FetchingLeveling => "fetching leveling",
            Self::LoadingPose => "loading pose",
            Self::Homing => "homing",
            Self::ComputingPerspective => "computing perspective",
            Self::PushingMatrix => "pushing matrix",
            Self::ExitingRawMode => "exiting raw mode",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for PreviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress checkpoints reported during setup.
const SETUP_STEPS: usize = 4;

/// Drives the camera preview of one device connection.
///
/// Setup enters raw mode, reads leveling and pose, homes, probes the object
/// height, then pushes a perspective matrix and leaves raw mode again. Once
/// ready, height changes only recompute and push the matrix.
pub struct PreviewSession<'c, C, P, M = StandardModel> {
    connection: &'c mut DeviceConnection<C>,
    presenter: P,
    resolver: PerspectiveResolver<M>,
    record: CalibrationRecord,
    config: PreviewConfig,
    state: PreviewState,
    leveling: LevelingProfile,
    rotation: RotationData,
    object_height: Real,
}

impl<'c, C: MotionChannel, P: Presenter> PreviewSession<'c, C, P, StandardModel> {
    pub fn new(
        connection: &'c mut DeviceConnection<C>,
        presenter: P,
        record: CalibrationRecord,
        workarea: Workarea,
        config: PreviewConfig,
    ) -> PipelineResult<Self> {
        Self::with_model(StandardModel, connection, presenter, record, workarea, config)
    }
}

impl<'c, C, P, M> PreviewSession<'c, C, P, M>
where
    C: MotionChannel,
    P: Presenter,
    M: PerspectiveModel,
{
    pub fn with_model(
        model: M,
        connection: &'c mut DeviceConnection<C>,
        presenter: P,
        record: CalibrationRecord,
        workarea: Workarea,
        config: PreviewConfig,
    ) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::Config)?;
        workarea.validate()?;
        record.validate()?;
        let mut resolver = PerspectiveResolver::with_model(model, workarea, config.chessboard);
        if let Some(center) = config.center {
            resolver = resolver.with_center(center);
        }
        Ok(Self {
            connection,
            presenter,
            resolver,
            record,
            config,
            state: PreviewState::Idle,
            leveling: LevelingProfile::default(),
            rotation: RotationData::default(),
            object_height: 0.0,
        })
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn object_height(&self) -> Real {
        self.object_height
    }

    pub fn rotation(&self) -> &RotationData {
        &self.rotation
    }

    pub fn leveling(&self) -> &LevelingProfile {
        &self.leveling
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn is_raw_mode(&self) -> bool {
        self.connection.is_raw_mode()
    }

    fn depth(&self) -> Real {
        self.resolver.workarea().depth
    }

    fn transition(&mut self, next: PreviewState) {
        debug!("preview: {} -> {}", self.state, next);
        self.state = next;
    }

    fn report(&mut self, step: usize, message: &str) {
        let percentage = step as Real / SETUP_STEPS as Real * 100.0;
        self.presenter
            .update(&self.config.progress_id, Some(percentage), message);
    }

    fn require_ready(&self) -> PipelineResult<()> {
        if self.state == PreviewState::Ready {
            Ok(())
        } else {
            Err(PipelineError::NotReady(self.state.name()))
        }
    }

    fn compute_grid(&self) -> Result<PerspectivePointGrid, CoreError> {
        let h = effective_height(self.object_height, &self.rotation, self.depth())?;
        self.resolver.resolve(h, &self.record, &self.leveling)
    }

    /// Run the setup sequence and push the first matrix.
    ///
    /// Raw mode is exited and the progress indicator dismissed whether or
    /// not setup succeeds; on failure the session returns to idle and the
    /// setup error is returned.
    pub async fn setup(&mut self, cancel: &CancelToken) -> PipelineResult<PerspectivePointGrid> {
        self.connection.begin_session().await?;
        let id = self.config.progress_id.clone();
        self.presenter.open_stepping(&id, "preparing camera preview");
        self.report(0, "entering raw mode");

        let result = self.run_setup(cancel).await;

        self.report(3, "exiting raw mode");
        self.transition(PreviewState::ExitingRawMode);
        let exit = self.connection.release().await;
        self.report(SETUP_STEPS, "camera preview ready");
        self.presenter.dismiss(&id);

        match (result, exit) {
            (Ok(grid), Ok(())) => {
                self.transition(PreviewState::Ready);
                Ok(grid)
            }
            (Ok(_), Err(err)) => {
                self.transition(PreviewState::Idle);
                Err(err)
            }
            (Err(err), exit) => {
                if let Err(exit_err) = exit {
                    warn!("failed to exit raw mode after setup error: {exit_err}");
                }
                self.transition(PreviewState::Idle);
                Err(err)
            }
        }
    }

    async fn run_setup(&mut self, cancel: &CancelToken) -> PipelineResult<PerspectivePointGrid> {
        let timeout = self.config.device_timeout();
        let depth = self.depth();

        self.transition(PreviewState::EnteringRawMode);
        with_timeout(timeout, self.connection.enter_raw_mode()).await?;
        cancel.check()?;

        // One channel: the three sources are queried one after another.
        self.transition(PreviewState::FetchingLeveling);
        let mut leveling = LevelingProfile::default();
        for source in LevelingSource::ALL {
            let data = with_timeout(
                timeout,
                self.connection.channel_mut().fetch_leveling_data(source),
            )
            .await?;
            leveling.set(source, data);
        }
        self.leveling = leveling;
        self.report(1, "leveling data loaded");
        cancel.check()?;

        self.transition(PreviewState::LoadingPose);
        self.rotation =
            with_timeout(timeout, self.connection.channel_mut().fetch_3d_rotation()).await?;
        cancel.check()?;

        self.transition(PreviewState::Homing);
        let channel = self.connection.channel_mut();
        with_timeout(timeout, channel.raw_home()).await?;
        with_timeout(timeout, channel.raw_home_z()).await?;
        cancel.check()?;

        with_timeout(timeout, self.connection.channel_mut().raw_auto_focus()).await?;
        let probe =
            with_timeout(timeout, self.connection.channel_mut().raw_get_probe_pos()).await?;
        if probe.did_af {
            self.object_height = (depth - probe.z).max(0.0);
            info!("autofocus measured object height {:.2}", self.object_height);
        } else {
            warn!(
                "autofocus did not reach the object, keeping height {:.2}",
                self.object_height
            );
        }
        self.report(2, "object height measured");
        cancel.check()?;

        self.transition(PreviewState::ComputingPerspective);
        let grid = self.compute_grid()?;
        let command = self.rotation.command(self.object_height, depth)?;

        self.transition(PreviewState::PushingMatrix);
        let channel = self.connection.channel_mut();
        with_timeout(timeout, channel.set_3d_rotation(command)).await?;
        with_timeout(
            timeout,
            channel.set_fisheye_matrix(&grid, self.config.matrix_is_interim),
        )
        .await?;
        Ok(grid)
    }

    /// Recompute the grid for `height` and push it.
    ///
    /// The matrix push is the only device call on this path.
    pub async fn on_object_height_changed(
        &mut self,
        height: Real,
    ) -> PipelineResult<PerspectivePointGrid> {
        self.require_ready()?;
        if !height.is_finite() {
            return Err(CoreError::NonFiniteInput("object height").into());
        }
        self.object_height = height;
        let grid = self.compute_grid()?;
        with_timeout(
            self.config.device_timeout(),
            self.connection
                .channel_mut()
                .set_fisheye_matrix(&grid, self.config.matrix_is_interim),
        )
        .await?;
        Ok(grid)
    }

    /// Apply a refreshed rig tilt and re-push the matrix for the current height.
    pub async fn update_3d_rotation(
        &mut self,
        rotation: RotationData,
    ) -> PipelineResult<PerspectivePointGrid> {
        self.require_ready()?;
        let depth = self.depth();
        let effective = effective_height(self.object_height, &rotation, depth)?;
        let command = rotation.command(self.object_height, depth)?;
        with_timeout(
            self.config.device_timeout(),
            self.connection.channel_mut().set_3d_rotation(command),
        )
        .await?;
        self.rotation = rotation;
        debug!("rotation updated, effective height {effective:.3}");
        self.on_object_height_changed(self.object_height).await
    }

    /// End the session, leaving raw mode if it is still active.
    pub async fn teardown(&mut self) -> PipelineResult<()> {
        if self.connection.is_raw_mode() {
            self.transition(PreviewState::ExitingRawMode);
        }
        let result = self.connection.release().await;
        self.transition(PreviewState::Idle);
        result
    }
}
