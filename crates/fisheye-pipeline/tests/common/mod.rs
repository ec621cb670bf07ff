//! In-memory collaborators that record every call made to them.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use fisheye_core::{
    LevelingData, LevelingProfile, LevelingSource, PerspectivePointGrid, Real, RotationCommand,
    RotationData,
};
use fisheye_pipeline::chessboard::{ChessboardSolution, ChessboardSolve};
use fisheye_pipeline::device::{
    CalibrationBackend, FileStorage, MotionChannel, Picture, Presenter, ProbePosition,
    SolverResponse, TransferProgress,
};
use fisheye_pipeline::persistence::RecordStore;
use fisheye_pipeline::{CancelToken, PipelineError, PipelineResult};

#[derive(Debug, Default)]
pub struct FakeChannel {
    pub log: Vec<String>,
    /// Call name (as logged) that fails with a link error.
    pub fail_on: Option<String>,
    pub leveling: LevelingProfile,
    pub rotation: RotationData,
    pub probe: Option<ProbePosition>,
    pub matrices: Vec<(PerspectivePointGrid, bool)>,
    pub commands: Vec<RotationCommand>,
    pub frames: u8,
}

impl FakeChannel {
    pub fn new(rotation: RotationData, probe: ProbePosition) -> Self {
        Self {
            rotation,
            probe: Some(probe),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, call: &str) -> Self {
        self.fail_on = Some(call.to_string());
        self
    }

    pub fn count(&self, call: &str) -> usize {
        self.log.iter().filter(|c| *c == call).count()
    }

    fn call(&mut self, name: impl Into<String>) -> PipelineResult<()> {
        let name = name.into();
        let fails = self.fail_on.as_deref() == Some(name.as_str());
        self.log.push(name.clone());
        if fails {
            Err(PipelineError::DeviceLink(format!("{name} failed")))
        } else {
            Ok(())
        }
    }
}

impl MotionChannel for FakeChannel {
    async fn enter_raw_mode(&mut self) -> PipelineResult<()> {
        self.call("enter_raw_mode")
    }

    async fn end_raw_mode(&mut self) -> PipelineResult<()> {
        self.call("end_raw_mode")
    }

    async fn raw_home(&mut self) -> PipelineResult<()> {
        self.call("raw_home")
    }

    async fn raw_home_z(&mut self) -> PipelineResult<()> {
        self.call("raw_home_z")
    }

    async fn raw_auto_focus(&mut self) -> PipelineResult<()> {
        self.call("raw_auto_focus")
    }

    async fn raw_get_probe_pos(&mut self) -> PipelineResult<ProbePosition> {
        self.call("raw_get_probe_pos")?;
        Ok(self.probe.unwrap_or(ProbePosition { did_af: false, z: 0.0 }))
    }

    async fn take_one_picture(&mut self) -> PipelineResult<Picture> {
        self.call("take_one_picture")?;
        self.frames = self.frames.wrapping_add(1);
        Ok(Picture::new(vec![self.frames]))
    }

    async fn set_fisheye_matrix(
        &mut self,
        grid: &PerspectivePointGrid,
        is_interim: bool,
    ) -> PipelineResult<()> {
        self.call("set_fisheye_matrix")?;
        self.matrices.push((grid.clone(), is_interim));
        Ok(())
    }

    async fn set_3d_rotation(&mut self, command: RotationCommand) -> PipelineResult<()> {
        self.call("set_3d_rotation")?;
        self.commands.push(command);
        Ok(())
    }

    async fn fetch_leveling_data(&mut self, source: LevelingSource) -> PipelineResult<LevelingData> {
        self.call(format!("fetch_leveling_data:{source}"))?;
        Ok(match source {
            LevelingSource::HexaPlatform => self.leveling.hexa_platform.clone(),
            LevelingSource::BottomCover => self.leveling.bottom_cover.clone(),
            LevelingSource::Offset => self.leveling.offset.clone(),
        })
    }

    async fn fetch_3d_rotation(&mut self) -> PipelineResult<RotationData> {
        self.call("fetch_3d_rotation")?;
        Ok(self.rotation)
    }
}

/// Device storage holding a fixed listing of pictures.
#[derive(Debug, Default)]
pub struct FakeStorage {
    pub files: Vec<(String, Vec<u8>)>,
    pub downloads: RefCell<Vec<String>>,
    pub fail_file: Option<String>,
    /// Cancel the token once this many downloads have finished.
    pub cancel_after: Option<(usize, CancelToken)>,
    pub uploads: RefCell<BTreeMap<String, Vec<u8>>>,
    completed: Cell<usize>,
}

impl FakeStorage {
    pub fn with_files(names: &[&str]) -> Self {
        Self {
            files: names
                .iter()
                .map(|n| (n.to_string(), n.as_bytes().to_vec()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }
}

impl FileStorage for FakeStorage {
    async fn ls(&self, _dir: &str) -> PipelineResult<Vec<String>> {
        let mut names: Vec<String> = self.files.iter().map(|(n, _)| n.clone()).collect();
        names.extend(self.uploads.borrow().keys().cloned());
        Ok(names)
    }

    async fn download_file(
        &self,
        _dir: &str,
        name: &str,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> PipelineResult<Vec<u8>> {
        if self.fail_file.as_deref() == Some(name) {
            return Err(PipelineError::DeviceLink(format!("lost connection during {name}")));
        }
        let bytes = match self.files.iter().find(|(n, _)| n == name) {
            Some((_, bytes)) => bytes.clone(),
            None => match self.uploads.borrow().get(name) {
                Some(bytes) => bytes.clone(),
                None => return Err(PipelineError::Storage(format!("{name} not found"))),
            },
        };
        let total = bytes.len() as u64;
        on_progress(TransferProgress {
            loaded: total / 2,
            total,
        });
        on_progress(TransferProgress {
            loaded: total,
            total,
        });
        self.downloads.borrow_mut().push(name.to_string());

        let done = self.completed.get() + 1;
        self.completed.set(done);
        if let Some((after, token)) = &self.cancel_after {
            if done >= *after {
                token.cancel();
            }
        }
        Ok(bytes)
    }

    async fn upload_to_directory(&self, bytes: Vec<u8>, _dir: &str, name: &str) -> PipelineResult<()> {
        self.uploads.borrow_mut().insert(name.to_string(), bytes);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub responses: VecDeque<SolverResponse>,
    /// Never answer single-image solves.
    pub stall: bool,
    pub starts: usize,
    /// `(offset, path, existed)` for every picture added to the accumulator.
    pub added: Vec<(Real, PathBuf, bool)>,
    /// File names in which no chessboard is found.
    pub rejects: Vec<String>,
    pub solution: Option<ChessboardSolution>,
}

impl FakeBackend {
    pub fn answering(responses: impl IntoIterator<Item = SolverResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn added_names(&self) -> Vec<String> {
        self.added
            .iter()
            .filter_map(|(_, p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }
}

impl CalibrationBackend for FakeBackend {
    async fn calibrate_chessboard(
        &mut self,
        _image: &[u8],
        _offset: Real,
        _chessboard: [u32; 2],
    ) -> PipelineResult<SolverResponse> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        Ok(self.responses.pop_front().unwrap_or(SolverResponse::Failed {
            reason: "no response queued".to_string(),
        }))
    }

    async fn start_calibration(&mut self) -> PipelineResult<()> {
        self.starts += 1;
        self.added.clear();
        Ok(())
    }

    async fn add_calibrate_img(&mut self, offset: Real, path: &Path) -> PipelineResult<bool> {
        self.added.push((offset, path.to_path_buf(), path.exists()));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(!self.rejects.contains(&name))
    }

    async fn do_full_calibration(
        &mut self,
        on_progress: &mut dyn FnMut(Real),
    ) -> PipelineResult<ChessboardSolution> {
        on_progress(0.5);
        on_progress(1.0);
        self.solution.clone().ok_or(PipelineError::Solver {
            reason: "no solution configured".to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct FakePresenter {
    pub opened: Vec<String>,
    pub nonstop: Vec<String>,
    pub dismissed: Vec<String>,
    pub updates: Vec<(String, Option<Real>, String)>,
    pub errors: Vec<String>,
    pub infos: Vec<String>,
    pub prompts: Vec<String>,
    /// Answers to confirmation prompts; accept when empty.
    pub answers: VecDeque<bool>,
}

impl FakePresenter {
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Presenter for FakePresenter {
    fn open_nonstop(&mut self, id: &str, _message: &str) {
        self.nonstop.push(id.to_string());
    }

    fn open_stepping(&mut self, id: &str, _message: &str) {
        self.opened.push(id.to_string());
    }

    fn update(&mut self, id: &str, percentage: Option<Real>, message: &str) {
        self.updates
            .push((id.to_string(), percentage, message.to_string()));
    }

    fn dismiss(&mut self, id: &str) {
        self.dismissed.push(id.to_string());
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn show_info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }

    async fn confirm(&mut self, message: &str) -> bool {
        self.prompts.push(message.to_string());
        self.answers.pop_front().unwrap_or(true)
    }
}

/// Record store whose contents stay inspectable while a workflow owns a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(pub Rc<RefCell<BTreeMap<String, Vec<u8>>>>);

impl MemoryStore {
    pub fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }
}

impl RecordStore for MemoryStore {
    async fn put(&mut self, key: &str, contents: Vec<u8>) -> PipelineResult<()> {
        self.0.borrow_mut().insert(key.to_string(), contents);
        Ok(())
    }

    async fn get(&mut self, key: &str) -> PipelineResult<Option<Vec<u8>>> {
        Ok(self.0.borrow().get(key).cloned())
    }
}

pub fn solve(ret: Real, rz: Real, tz: Real) -> ChessboardSolve {
    ChessboardSolve {
        k: [[800.0, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]],
        d: vec![0.1, -0.02, 0.0, 0.0],
        rvec: [0.0, 0.0, rz],
        tvec: [0.0, 0.0, tz],
        ret,
    }
}

pub fn solution(ret: Real) -> ChessboardSolution {
    ChessboardSolution {
        k: [[800.0, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]],
        d: vec![0.1, -0.02, 0.0, 0.0],
        rvec: [0.0; 3],
        tvec: [0.0, 0.0, 100.0],
        rvec_polyfit: vec![[0.0, 0.0]; 3],
        tvec_polyfit: vec![[0.0, 0.0], [0.0, 0.0], [1.0, 100.0]],
        ret: Some(ret),
    }
}
