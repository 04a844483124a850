//! Keyprint FFmpeg Library
//!
//! Demuxes and decodes the keyframes of a media file with FFmpeg and converts
//! them to grayscale with swscale.

pub mod keyframe_reader;
pub mod pixel;
pub mod sws_converter;

pub use keyframe_reader::KeyframeReader;
pub use sws_converter::SwsGrayConverter;

use std::path::PathBuf;

/// Result type for keyprint-ffmpeg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for keyprint-ffmpeg operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Keyprint core error: {0}")]
    Core(#[from] keyprint_core::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("Failed to open input file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("Failed to find a decodable video stream in input file")]
    NoVideoStream,
}
