//! Keyprint CLI Tool
//!
//! Fingerprints every keyframe of a video file and writes the fingerprints,
//! in frame order, to a CSV file.

use anyhow::{Context, Result};
use clap::Parser;
use keyprint_core::{DebugImageFormat, FingerprintConfig};
use keyprint_ffmpeg::{KeyframeReader, SwsGrayConverter};
use keyprint_pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyprint")]
#[command(about = "Per-keyframe grid median fingerprints of a video, as a CSV time series")]
#[command(version)]
struct Cli {
    /// Input video file path
    input: PathBuf,

    /// Output CSV file path [default: frame-analysis.csv]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of horizontal grid bands
    #[arg(long)]
    rows: Option<u32>,

    /// Number of vertical grid bands
    #[arg(long)]
    cols: Option<u32>,

    /// Worker thread count [default: detected parallelism, at least 4]
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum number of decoded keyframes waiting for a worker
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Write every analyzed keyframe as a grayscale image into this directory
    #[arg(long)]
    dump_frames: Option<PathBuf>,

    /// Dump frames as PNG instead of PGM
    #[arg(long, requires = "dump_frames")]
    png: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    fingerprint_video(&cli.input, config)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "keyprint={level},keyprint_core={level},keyprint_pipeline={level},keyprint_ffmpeg={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}

fn load_config(cli: &Cli) -> Result<FingerprintConfig> {
    let mut config = match &cli.config {
        Some(path) => FingerprintConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FingerprintConfig::default(),
    };

    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(rows) = cli.rows {
        config.grid_rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.grid_cols = cols;
    }
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(dir) = &cli.dump_frames {
        config.debug_image_dir = Some(dir.clone());
    }
    if cli.png {
        config.debug_image_format = DebugImageFormat::Png;
    }

    config.validate().context("Invalid configuration")?;
    tracing::debug!(?config, "Resolved configuration");
    Ok(config)
}

fn fingerprint_video(input: &Path, config: FingerprintConfig) -> Result<()> {
    let output = config.output.clone();

    let mut reader = KeyframeReader::open(input).context("Failed to open video file")?;
    println!(
        "Video info: {}x{}, time base {}/{}",
        reader.width(),
        reader.height(),
        reader.time_base().numerator(),
        reader.time_base().denominator()
    );

    let mut pipeline = Pipeline::new(config, Arc::new(SwsGrayConverter::new()))
        .context("Failed to set up pipeline")?;
    let summary = pipeline
        .run_to_csv(&mut reader)
        .context("Failed to fingerprint video")?;

    println!(
        "Fingerprinted {} keyframes with {} workers ({} skipped)",
        summary.fingerprinted, summary.workers, summary.failed
    );
    println!("Successfully wrote {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["keyprint"]).is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "keyprint",
            "movie.mp4",
            "-o",
            "out.csv",
            "--rows",
            "4",
            "--workers",
            "2",
            "--dump-frames",
            "frames",
            "--png",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.output, PathBuf::from("out.csv"));
        assert_eq!(config.grid_rows, 4);
        assert_eq!(config.grid_cols, 3);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.debug_image_dir, Some(PathBuf::from("frames")));
        assert_eq!(config.debug_image_format, DebugImageFormat::Png);
    }

    #[test]
    fn test_png_requires_dump_dir() {
        assert!(Cli::try_parse_from(["keyprint", "movie.mp4", "--png"]).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli::try_parse_from(["keyprint", "movie.mp4", "--workers", "0"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
