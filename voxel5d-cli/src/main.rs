//! voxel5d command-line interface.
//!
//! Loads raw volumes, renders projections to PPM images and tracks markers
//! through time from the shell.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use voxel5d_core::{plane_axes, Calibration, ColorModel, ValueKind, VolumeSet, VoxelVolume};
use voxel5d_io::{
    load_markers, save_markers, LoadConfig, MarkerTableReader, MarkerTableWriter,
    RawVolumeLoader, SettingsFile,
};
use voxel5d_render::{to_rgb_bytes, DisplaySession, ProjectionMode};
use voxel5d_tracking::{autotrack, msd_from_list, summarize, MarkerLists};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    VoxelIo(#[from] voxel5d_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] voxel5d_core::Error),

    #[error("Tracking error: {0}")]
    Tracking(#[from] voxel5d_tracking::TrackingError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Voxel type of a raw file.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    U8,
    U16,
    I32,
    F32,
    F64,
    Complex64,
}

impl From<Kind> for ValueKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::U8 => ValueKind::U8,
            Kind::U16 => ValueKind::U16,
            Kind::I32 => ValueKind::I32,
            Kind::F32 => ValueKind::F32,
            Kind::F64 => ValueKind::F64,
            Kind::Complex64 => ValueKind::Complex64,
        }
    }
}

/// Viewing axis.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Projection reduction.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Maximum intensity projection
    Mip,
    /// Mean over contributing voxels
    Average,
}

/// Five-dimensional voxel viewer toolkit.
#[derive(Parser)]
#[command(name = "voxel5d")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file (tracking, projection and memory options)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Raw volume description shared by subcommands.
#[derive(Args)]
struct VolumeArgs {
    /// Raw volume file(s), one per time point
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// Volume shape as X,Y,Z
    #[arg(long, value_parser = parse_shape)]
    shape: [usize; 3],

    /// Voxel type
    #[arg(long, value_enum, default_value = "u16")]
    kind: Kind,

    /// Voxel size as X,Y,Z
    #[arg(long, value_parser = parse_scale)]
    scale: Option<[f64; 3]>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about raw volume files
    Info {
        #[command(flatten)]
        volume: VolumeArgs,
    },

    /// Render a projection of the first time point to a PPM image
    Project {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Viewing axis
        #[arg(long, value_enum, default_value = "z")]
        axis: Axis,

        /// Projection mode (overrides the settings file)
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Colormap index (built-in models first)
        #[arg(long, default_value = "0")]
        colormap: usize,

        /// Stretch the display window to the projected data
        #[arg(long)]
        auto_window: bool,

        /// Output PPM file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Marker list operations
    Markers {
        #[command(subcommand)]
        command: MarkerCommands,
    },
}

#[derive(Subcommand)]
enum MarkerCommands {
    /// Track markers through time and write the extended table
    Track {
        #[command(flatten)]
        volume: VolumeArgs,

        /// Marker table with the starting markers
        #[arg(short, long)]
        markers: PathBuf,

        /// Output marker table
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print per-list trace statistics of a marker table
    Summary {
        /// Marker table
        #[arg(short, long)]
        input: PathBuf,

        /// Axis the tracks advance along (4 = time)
        #[arg(long, default_value = "4")]
        track_direction: usize,

        /// Voxel size as X,Y,Z
        #[arg(long, value_parser = parse_scale)]
        scale: Option<[f64; 3]>,

        /// Also print the mean square displacement of every list
        #[arg(long)]
        msd: bool,
    },

    /// Reimport and rewrite a marker table, dropping duplicate lists
    Normalize {
        /// Input marker table
        #[arg(short, long)]
        input: PathBuf,

        /// Output marker table
        #[arg(short, long)]
        output: PathBuf,

        /// Axis the tracks advance along (4 = time)
        #[arg(long, default_value = "4")]
        track_direction: usize,

        /// Voxel size as X,Y,Z
        #[arg(long, value_parser = parse_scale)]
        scale: Option<[f64; 3]>,
    },
}

fn parse_triple<T: std::str::FromStr>(text: &str) -> std::result::Result<[T; 3], String> {
    let parts = text
        .split(',')
        .map(|p| p.trim().parse::<T>().map_err(|_| format!("bad component {p:?}")))
        .collect::<std::result::Result<Vec<T>, String>>()?;
    <[T; 3]>::try_from(parts).map_err(|_| format!("expected three values, got {text:?}"))
}

fn parse_shape(text: &str) -> std::result::Result<[usize; 3], String> {
    parse_triple(text)
}

fn parse_scale(text: &str) -> std::result::Result<[f64; 3], String> {
    parse_triple(text)
}

fn load_settings(path: Option<&Path>) -> Result<SettingsFile> {
    match path {
        Some(path) => Ok(SettingsFile::load(path)?),
        None => Ok(SettingsFile::default()),
    }
}

fn scales_of(scale: Option<[f64; 3]>) -> [f64; 5] {
    let mut scales = [1.0; 5];
    if let Some(s) = scale {
        scales[..3].copy_from_slice(&s);
    }
    scales
}

fn read_lists(path: &Path) -> Result<MarkerLists> {
    let rows = MarkerTableReader::open(path)?;
    if rows.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "{} holds no marker rows",
            path.display()
        )));
    }
    let mut lists = MarkerLists::new();
    let report = lists.import_rows(&rows);
    if report.duplicates_removed > 0 {
        log::info!("{} duplicate list(s) dropped", report.duplicates_removed);
    }
    Ok(lists)
}

fn load_volumes(args: &VolumeArgs, config: &LoadConfig) -> Result<VolumeSet> {
    let kind = ValueKind::from(args.kind);
    let mut times = Vec::with_capacity(args.input.len());
    for path in &args.input {
        let loader = RawVolumeLoader::open(path)?;
        let mut volume: VoxelVolume = loader.load(kind, args.shape, config)?;
        if let Some(scale) = args.scale {
            let mut calibration = volume.calibration().clone();
            for (axis, s) in scale.into_iter().enumerate() {
                calibration = calibration.with_axis(axis, s, 0.0);
            }
            volume.set_calibration(calibration);
        }
        times.push(vec![volume]);
    }
    Ok(VolumeSet::from_volumes(times)?)
}

fn write_ppm(path: &Path, width: usize, height: usize, argb: &[u32]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "P6\n{} {}\n255\n", width, height)?;
    writer.write_all(&to_rgb_bytes(argb))?;
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Info { volume } => {
            let kind = ValueKind::from(volume.kind);
            for path in &volume.input {
                let loader = RawVolumeLoader::open(path)?;
                let data = loader.load(kind, volume.shape, &settings.load)?;
                println!("File: {}", path.display());
                println!(
                    "Size: {} bytes ({:.2} MB)",
                    loader.len(),
                    loader.len() as f64 / 1_000_000.0
                );
                println!("Shape: {:?} ({})", data.shape(), kind);
                let (low, high) = data.calibrated_range();
                println!("Raw range: {} - {}", data.min_raw(), data.max_raw());
                println!("Calibrated range: {} - {}", low, high);
            }
        }

        Commands::Project {
            volume,
            axis,
            mode,
            colormap,
            auto_window,
            output,
        } => {
            let axis = axis.index();
            let volumes = load_volumes(&volume, &settings.load)?;
            let shape = volumes.shape();
            let mut session = DisplaySession::new(volumes, settings.projection)?;
            if let Some(mode) = mode {
                session.set_projection_mode(match mode {
                    Mode::Mip => ProjectionMode::Mip,
                    Mode::Average => ProjectionMode::Average,
                });
            }
            session.set_colormap(0, ColorModel::from_index(colormap))?;

            let start = Instant::now();
            let stats = session.project(0, axis)?;
            if auto_window {
                if let Some((low, high)) = session.auto_window_to_roi(0)? {
                    log::debug!("display window {} - {}", low, high);
                }
            }
            let image = session.composite_projection(axis)?;
            let (ua, va) = plane_axes(axis);
            write_ppm(&output, shape[ua], shape[va], &image)?;
            log::debug!("projected in {:.2?}", start.elapsed());

            println!("Wrote {}x{} image to {}", shape[ua], shape[va], output.display());
            println!("Voxels: {}", stats.voxels);
            println!("Sum: {}", stats.sum);
            println!("Min: {}", stats.min);
            println!("Max: {}", stats.max);
            println!("Average: {}", stats.average);
        }

        Commands::Markers { command } => match command {
            MarkerCommands::Track {
                volume,
                markers,
                output,
            } => {
                let mut volumes = load_volumes(&volume, &settings.load)?;
                let mut lists = MarkerLists::new();
                let imported = load_markers(&markers, &mut lists, &mut volumes)?;
                log::info!("{} marker(s) read from {}", imported.rows, markers.display());

                let start = Instant::now();
                let report = autotrack(&mut lists, &volumes, &settings.tracking)?;
                log::debug!("tracked in {:.2?}", start.elapsed());

                let written =
                    save_markers(&output, &lists, &volumes, settings.tracking.track_direction)?;
                println!("Updated: {}", report.updated);
                println!("Created: {}", report.created);
                println!("Removed: {}", report.removed);
                println!("Stopped: {}", report.stopped);
                println!("Wrote {} marker(s) to {}", written, output.display());
            }

            MarkerCommands::Summary {
                input,
                track_direction,
                scale,
                msd,
            } => {
                let lists = read_lists(&input)?;
                let scales = scales_of(scale);

                println!(
                    "{:<8} | {:>7} | {:>12} | {:>12} | {:>10} | {:>14}",
                    "List", "Markers", "Path", "Net", "Speed", "Directionality"
                );
                println!("{:-<78}", "");
                for s in summarize(&lists, track_direction, scales) {
                    println!(
                        "{:<8} | {:>7} | {:>12.3} | {:>12.3} | {:>10.3} | {:>14.3}",
                        s.name,
                        s.markers,
                        s.path_length,
                        s.net_distance,
                        s.average_speed,
                        s.directionality
                    );
                }

                if msd {
                    for list in lists.lists() {
                        let values = msd_from_list(list, track_direction, scales);
                        let text: Vec<String> = values.iter().map(|v| format!("{v:.3}")).collect();
                        println!("MSD {}: {}", list.name, text.join(" "));
                    }
                }
            }

            MarkerCommands::Normalize {
                input,
                output,
                track_direction,
                scale,
            } => {
                let lists = read_lists(&input)?;
                let scales = scales_of(scale);
                let mut calibration = Calibration::default();
                for (axis, s) in scales.into_iter().enumerate().take(3) {
                    calibration = calibration.with_axis(axis, s, 0.0);
                }
                let rows = lists.export_rows(&[calibration]);
                let mut writer = MarkerTableWriter::create(&output)?;
                writer.write_rows(&rows)?;
                writer.write_summary(&summarize(&lists, track_direction, scales))?;
                println!(
                    "Wrote {} marker(s) in {} list(s) to {}",
                    rows.len(),
                    lists.len(),
                    output.display()
                );
            }
        },
    }

    Ok(())
}
