mod common;

use std::path::Path;

use common::{FakeBackend, FakeChannel, FakePresenter, FakeStorage, solution};
use fisheye_pipeline::chessboard::{BatchCalibration, ChessboardCheckpoint, ChessboardConfig};
use fisheye_pipeline::persistence::{DirectoryStore, load_record};
use fisheye_pipeline::{CancelToken, DeviceConnection, PipelineError};

const PICTURES: [&str; 7] = [
    "pic_0_center.jpg",
    "pic_1.5_center.jpg",
    "pic_0_top_left.jpg",
    "pic_1.5_top_left.jpg",
    "notes.txt",
    "pic_0_bottom.jpg",
    "pic_1.5_bottom.jpg",
];

fn config(root: &Path) -> ChessboardConfig {
    ChessboardConfig {
        cache_dir: root.join("cache"),
        ..ChessboardConfig::default()
    }
}

fn backend() -> FakeBackend {
    FakeBackend {
        solution: Some(solution(0.7)),
        ..FakeBackend::default()
    }
}

async fn stored_checkpoint(store: &DirectoryStore, config: &ChessboardConfig) -> ChessboardCheckpoint {
    let mut store = store.clone();
    ChessboardCheckpoint::load(&mut store, &config.checkpoint_key)
        .await
        .unwrap()
        .expect("checkpoint was saved")
}

#[tokio::test]
async fn cancelled_run_resumes_without_downloading_again() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());

    // First run: cancelled once the first location's two pictures are in.
    let cancel = CancelToken::new();
    let mut storage = FakeStorage::with_files(&PICTURES);
    storage.cancel_after = Some((2, cancel.clone()));
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        let err = batch.run(&cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled), "{err}");
        assert!(batch.presenter().errors.is_empty());
        assert_eq!(batch.presenter().dismissed.len(), 1);
    }
    assert_eq!(storage.downloaded(), ["pic_0_center.jpg", "pic_1.5_center.jpg"]);

    let checkpoint = stored_checkpoint(&store, &config).await;
    assert_eq!(checkpoint.state.downloaded.len(), 1);
    assert!(checkpoint.is_downloaded("center"));
    assert!(checkpoint.output.is_none());

    // Second run picks up where the first stopped.
    let storage = FakeStorage::with_files(&PICTURES);
    let added = {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        let result = batch.run(&CancelToken::new()).await.unwrap();
        assert_eq!(result, solution(0.7));
        assert_eq!(batch.backend().starts, 1);
        assert!(batch.backend().added.iter().all(|(_, _, existed)| *existed));
        batch.backend().added_names()
    };
    assert_eq!(
        storage.downloaded(),
        [
            "pic_0_top_left.jpg",
            "pic_1.5_top_left.jpg",
            "pic_0_bottom.jpg",
            "pic_1.5_bottom.jpg"
        ]
    );
    assert_eq!(
        added,
        [
            "pic_0_center.jpg",
            "pic_1.5_center.jpg",
            "pic_0_top_left.jpg",
            "pic_1.5_top_left.jpg",
            "pic_0_bottom.jpg",
            "pic_1.5_bottom.jpg"
        ]
    );

    let checkpoint = stored_checkpoint(&store, &config).await;
    let locations: Vec<&str> = checkpoint
        .state
        .downloaded
        .iter()
        .map(|l| l.location.as_str())
        .collect();
    assert_eq!(locations, ["center", "top_left", "bottom"]);
    assert_eq!(checkpoint.output, Some(solution(0.7)));
    assert!(!connection.is_raw_mode());
}

#[tokio::test]
async fn failed_download_discards_the_location_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());

    let mut storage = FakeStorage::with_files(&PICTURES);
    storage.fail_file = Some("pic_1.5_top_left.jpg".to_string());
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        let err = batch.run(&CancelToken::new()).await.unwrap_err();
        match &err {
            PipelineError::PartialDownload { file, source } => {
                assert_eq!(file, "pic_1.5_top_left.jpg");
                assert!(matches!(**source, PipelineError::DeviceLink(_)));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(batch.presenter().errors, [err.to_string()]);
        assert_eq!(batch.presenter().dismissed.len(), 1);
    }

    let checkpoint = stored_checkpoint(&store, &config).await;
    assert!(checkpoint.is_downloaded("center"));
    assert!(!checkpoint.is_downloaded("top_left"));
    assert!(config.cache_dir.join("pic_0_center.jpg").exists());
    assert!(!config.cache_dir.join("pic_0_top_left.jpg").exists());
}

#[tokio::test]
async fn failed_cache_write_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());
    // A directory squatting on the cache path makes the final rename fail.
    std::fs::create_dir_all(config.cache_dir.join("pic_0_center.jpg").join("occupied")).unwrap();

    let storage = FakeStorage::with_files(&PICTURES);
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        let err = batch.run(&CancelToken::new()).await.unwrap_err();
        match &err {
            PipelineError::PartialDownload { file, source } => {
                assert_eq!(file, "pic_0_center.jpg");
                assert!(matches!(**source, PipelineError::Io(_)));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(batch.backend().added.is_empty());
    }

    assert!(!config.cache_dir.join(".pic_0_center.jpg.tmp").exists());
    assert!(config.cache_dir.join("pic_0_center.jpg").is_dir());
    let mut reader = store.clone();
    let checkpoint = ChessboardCheckpoint::load(&mut reader, &config.checkpoint_key)
        .await
        .unwrap();
    assert!(checkpoint.is_none_or(|c| !c.is_downloaded("center")));
}

#[tokio::test]
async fn pictures_without_a_board_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());
    let storage = FakeStorage::with_files(&PICTURES);

    let mut backend = backend();
    backend.rejects.push("pic_1.5_bottom.jpg".to_string());
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend,
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        batch.run(&CancelToken::new()).await.unwrap();
    }

    let checkpoint = stored_checkpoint(&store, &config).await;
    let bottom = checkpoint
        .state
        .downloaded
        .iter()
        .find(|l| l.location == "bottom")
        .unwrap();
    assert_eq!(bottom.images.len(), 1);
    assert_eq!(bottom.images[0].file, "pic_0_bottom.jpg");
    assert!(!config.cache_dir.join("pic_1.5_bottom.jpg").exists());
}

#[tokio::test]
async fn missing_cache_is_downloaded_again() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());

    let storage = FakeStorage::with_files(&PICTURES);
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        batch.run(&CancelToken::new()).await.unwrap();
    }
    std::fs::remove_file(config.cache_dir.join("pic_0_center.jpg")).unwrap();

    let storage = FakeStorage::with_files(&PICTURES);
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        batch.run(&CancelToken::new()).await.unwrap();
        assert_eq!(batch.backend().added.len(), 6);
    }
    assert_eq!(storage.downloaded(), ["pic_0_center.jpg", "pic_1.5_center.jpg"]);
}

#[tokio::test]
async fn download_progress_counts_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut connection = DeviceConnection::new(FakeChannel::default());
    let storage = FakeStorage::with_files(&PICTURES);

    let mut batch = BatchCalibration::new(
        &mut connection,
        &storage,
        backend(),
        FakePresenter::default(),
        DirectoryStore::new(dir.path().join("device")),
        config.clone(),
    );
    batch.run(&CancelToken::new()).await.unwrap();

    let presenter = batch.presenter();
    assert_eq!(presenter.opened, [config.progress_id.clone()]);
    assert!(
        presenter
            .updates
            .iter()
            .any(|(_, _, m)| m.starts_with("downloading calibration data 6/6"))
    );
    let last = presenter.updates.last().unwrap();
    assert_eq!(last.1, Some(100.0));
    assert_eq!(last.2, "calibrating");
}

#[tokio::test]
async fn finished_run_stores_the_calibration_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut store = DirectoryStore::new(dir.path().join("device"));
    let mut connection = DeviceConnection::new(FakeChannel::default());
    let storage = FakeStorage::with_files(&PICTURES);
    {
        let mut batch = BatchCalibration::new(
            &mut connection,
            &storage,
            backend(),
            FakePresenter::default(),
            store.clone(),
            config.clone(),
        );
        batch.run(&CancelToken::new()).await.unwrap();
    }

    let record = load_record(&mut store, &config.record_key)
        .await
        .unwrap()
        .expect("record was saved");
    assert_eq!(record.ret, Some(0.7));
    assert_eq!(record.pose.grid_shape(), (7, 7));
    assert!(dir.path().join("device").join(&config.record_key).exists());
}

#[tokio::test]
async fn empty_image_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut connection = DeviceConnection::new(FakeChannel::default());
    let storage = FakeStorage::with_files(&["notes.txt"]);

    let mut batch = BatchCalibration::new(
        &mut connection,
        &storage,
        backend(),
        FakePresenter::default(),
        DirectoryStore::new(dir.path().join("device")),
        config(dir.path()),
    );
    let err = batch.run(&CancelToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert_eq!(batch.presenter().errors.len(), 1);
}
