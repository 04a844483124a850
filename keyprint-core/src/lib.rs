//! Keyprint Core Library
//!
//! This library provides the frame data model, the grid median extractor that
//! turns a grayscale frame into a fingerprint, and the output formats used by
//! the keyprint pipeline.

pub mod config;
pub mod convert;
pub mod frame;
pub mod grid;
pub mod output;

pub use config::{DebugImageFormat, FingerprintConfig};
pub use convert::{GrayscaleConverter, LumaConverter};
pub use frame::{DecodedFrame, FrameFingerprint, GrayscaleBuffer, PixelFormat, Plane};
pub use grid::{extract_fingerprint, median, GridShape};

/// Result type for keyprint-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for keyprint-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame of {width}x{height} is smaller than the {rows}x{cols} grid")]
    DimensionTooSmall {
        width: u32,
        height: u32,
        rows: u32,
        cols: u32,
    },

    #[error("Invalid grid shape {rows}x{cols}")]
    InvalidGrid { rows: u32, cols: u32 },

    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("Grayscale conversion failed: {0}")]
    Conversion(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
