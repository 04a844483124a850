//! Run configuration, loadable from a TOML file

use crate::{Error, GridShape, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

fn default_grid_rows() -> u32 {
    3
}

fn default_grid_cols() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_backoff_ms() -> u64 {
    10
}

fn default_output() -> PathBuf {
    PathBuf::from("frame-analysis.csv")
}

/// File format of the optional per-frame debug images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugImageFormat {
    /// Binary PGM (P5)
    #[default]
    Pgm,
    Png,
}

impl DebugImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DebugImageFormat::Pgm => "pgm",
            DebugImageFormat::Png => "png",
        }
    }
}

/// Settings for one fingerprinting run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    #[serde(default = "default_grid_rows")]
    pub grid_rows: u32,
    #[serde(default = "default_grid_cols")]
    pub grid_cols: u32,
    /// Maximum number of decoded frames waiting for a worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Producer backoff and worker poll period in milliseconds, at least 1
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Worker thread count (None = detected parallelism, at least 4)
    pub workers: Option<usize>,
    /// CSV output path
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// When set, every analyzed frame is written into this directory
    pub debug_image_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug_image_format: DebugImageFormat,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            grid_rows: default_grid_rows(),
            grid_cols: default_grid_cols(),
            queue_capacity: default_queue_capacity(),
            backoff_ms: default_backoff_ms(),
            workers: None,
            output: default_output(),
            debug_image_dir: None,
            debug_image_format: DebugImageFormat::default(),
        }
    }
}

impl FingerprintConfig {
    /// Reads a configuration from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.grid_shape()?;
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.backoff_ms == 0 {
            return Err(Error::Config("backoff_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn grid_shape(&self) -> Result<GridShape> {
        GridShape::new(self.grid_rows, self.grid_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = FingerprintConfig::default();
        assert_eq!(config.grid_shape().unwrap(), GridShape::default());
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.backoff_ms, 10);
        assert_eq!(config.output, PathBuf::from("frame-analysis.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
grid_rows = 4
grid_cols = 2
workers = 8
debug_image_dir = "/tmp/frames"
debug_image_format = "png"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = FingerprintConfig::from_file(file.path()).unwrap();
        assert_eq!(config.grid_rows, 4);
        assert_eq!(config.grid_cols, 2);
        assert_eq!(config.workers, Some(8));
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.debug_image_dir, Some(PathBuf::from("/tmp/frames")));
        assert_eq!(config.debug_image_format, DebugImageFormat::Png);
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"queue_capacity = 0\n").unwrap();

        let result = FingerprintConfig::from_file(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_zero_backoff() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"backoff_ms = 0\n").unwrap();

        let result = FingerprintConfig::from_file(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_zero_grid() {
        let config = FingerprintConfig {
            grid_cols: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidGrid { .. })));
    }

    #[test]
    fn test_config_bad_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"grid_rows = \"three\"\n").unwrap();
        assert!(FingerprintConfig::from_file(file.path()).is_err());
    }
}
