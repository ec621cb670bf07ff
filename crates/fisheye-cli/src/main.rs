use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fisheye_core::{
    CalibrationRecord, LevelingProfile, PerspectivePointGrid, PerspectiveResolver, Real,
    RotationData, Workarea, WorkareaRegistry, WorkareaTable, effective_height,
};
use fisheye_pipeline::chessboard::{ChessboardCheckpoint, QualityThresholds, result_message};
use log::{debug, info};
use serde::Serialize;

/// Fisheye calibration tools: perspective grids, quality checks and checkpoints.
#[derive(Debug, Parser)]
#[command(author, version, about = "Fisheye camera calibration tools")]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the perspective grid for an object height.
    Resolve(ResolveArgs),
    /// Classify a reprojection error.
    Classify {
        /// RMS reprojection error in pixels.
        #[arg(long)]
        ret: Real,
        /// JSON QualityThresholds; defaults are used if omitted.
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Convert a discrete-height record into regression form.
    FitRegression {
        #[arg(long)]
        record: PathBuf,
    },
    /// Summarize a stored chessboard checkpoint.
    InspectCheckpoint {
        #[arg(long)]
        checkpoint: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct ResolveArgs {
    /// JSON CalibrationRecord.
    #[arg(long)]
    record: PathBuf,
    /// Object height in millimetres.
    #[arg(long)]
    height: Real,
    /// JSON RotationData; no tilt if omitted.
    #[arg(long)]
    rotation: Option<PathBuf>,
    /// JSON LevelingProfile; a flat platform if omitted.
    #[arg(long)]
    leveling: Option<PathBuf>,
    /// JSON Workarea.
    #[arg(long, conflicts_with = "workarea_table")]
    workarea: Option<PathBuf>,
    /// JSON WorkareaTable, used together with --model.
    #[arg(long, requires = "model")]
    workarea_table: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, requires = "model")]
    variant: Option<String>,
    /// Chessboard inner corners as <cols>x<rows>.
    #[arg(long, default_value = "48x36", value_parser = parse_chessboard)]
    chessboard: [u32; 2],
    /// Alignment center <x>,<y> in pixels; the record's center if omitted.
    #[arg(long, value_parser = parse_center)]
    center: Option<[Real; 2]>,
}

fn parse_chessboard(s: &str) -> Result<[u32; 2], String> {
    let (cols, rows) = s
        .split_once('x')
        .ok_or_else(|| format!("expected <cols>x<rows>, got {s}"))?;
    let cols = cols.trim().parse().map_err(|e| format!("columns: {e}"))?;
    let rows = rows.trim().parse().map_err(|e| format!("rows: {e}"))?;
    Ok([cols, rows])
}

fn parse_center(s: &str) -> Result<[Real; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected <x>,<y>, got {s}"))?;
    let x = x.trim().parse().map_err(|e| format!("x: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("y: {e}"))?;
    Ok([x, y])
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_optional<T: serde::de::DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) => load_json_file(p),
        None => Ok(T::default()),
    }
}

fn select_workarea(args: &ResolveArgs) -> Result<Workarea> {
    if let Some(path) = &args.workarea {
        let workarea: Workarea = load_json_file(path)?;
        workarea.validate()?;
        return Ok(workarea);
    }
    let (Some(path), Some(model)) = (&args.workarea_table, &args.model) else {
        bail!("either --workarea or --workarea-table with --model is required");
    };
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let table = WorkareaTable::from_json(&data)?;
    table
        .workarea(model, args.variant.as_deref())
        .with_context(|| format!("model {model} is not in {}", path.display()))
}

fn resolve_from_files(args: &ResolveArgs) -> Result<PerspectivePointGrid> {
    let record: CalibrationRecord = load_json_file(&args.record)?;
    let rotation: RotationData = load_optional(args.rotation.as_deref())?;
    let leveling: LevelingProfile = load_optional(args.leveling.as_deref())?;
    let workarea = select_workarea(args)?;
    debug!("workarea {workarea:?}, chessboard {:?}", args.chessboard);

    let h = effective_height(args.height, &rotation, workarea.depth)?;
    info!("object height {:.3} resolves at effective height {h:.3}", args.height);

    let mut resolver = PerspectiveResolver::new(workarea, args.chessboard);
    if let Some(center) = args.center {
        resolver = resolver.with_center(center);
    }
    Ok(resolver.resolve(h, &record, &leveling)?)
}

fn classify_message(ret: Real, thresholds: Option<&Path>) -> Result<String> {
    let thresholds: QualityThresholds = load_optional(thresholds)?;
    thresholds.validate()?;
    Ok(result_message(thresholds.classify(ret), ret))
}

fn fit_regression_from_file(path: &Path) -> Result<CalibrationRecord> {
    let mut record: CalibrationRecord = load_json_file(path)?;
    record.pose = record.pose.to_regression()?;
    Ok(record)
}

#[derive(Debug, Serialize)]
struct CheckpointSummary {
    chessboard: [u32; 2],
    schema_version: u32,
    last_modified: u64,
    downloaded: Vec<String>,
    accepted: Vec<String>,
    reprojection_error: Option<Real>,
    finished: bool,
    failures: usize,
}

fn inspect_checkpoint(path: &Path) -> Result<CheckpointSummary> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let checkpoint = ChessboardCheckpoint::from_json(&data)?;
    Ok(CheckpointSummary {
        chessboard: checkpoint.chessboard,
        schema_version: checkpoint.metadata.schema_version,
        last_modified: checkpoint.metadata.last_modified,
        downloaded: checkpoint
            .state
            .downloaded
            .iter()
            .map(|l| l.location.clone())
            .collect(),
        accepted: checkpoint
            .state
            .accepted
            .iter()
            .map(|s| s.location.clone())
            .collect(),
        reprojection_error: checkpoint.reprojection_error(),
        finished: checkpoint.output.is_some(),
        failures: checkpoint.log.iter().filter(|e| !e.success).count(),
    })
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let output = match &args.command {
        Command::Resolve(resolve) => serde_json::to_string_pretty(&resolve_from_files(resolve)?)?,
        Command::Classify { ret, thresholds } => classify_message(*ret, thresholds.as_deref())?,
        Command::FitRegression { record } => {
            serde_json::to_string_pretty(&fit_regression_from_file(record)?)?
        }
        Command::InspectCheckpoint { checkpoint } => {
            serde_json::to_string_pretty(&inspect_checkpoint(checkpoint)?)?
        }
    };
    println!("{output}");
    Ok(())
}
