//! Grayscale conversion with swscale

use crate::pixel;
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use keyprint_core::{DecodedFrame, Error, GrayscaleBuffer, GrayscaleConverter, Result};

/// Converts frames to GRAY8 with a bilinear swscale context.
///
/// A scaling context is not thread-safe, so each call builds its own; the
/// converter itself holds no state and can be shared by every worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwsGrayConverter;

impl SwsGrayConverter {
    pub fn new() -> Self {
        Self
    }
}

impl GrayscaleConverter for SwsGrayConverter {
    fn to_grayscale(&self, frame: &DecodedFrame) -> Result<GrayscaleBuffer> {
        let width = frame.width();
        let height = frame.height();
        let source_format = pixel::to_ffmpeg(frame.format());

        let mut source = ffmpeg::frame::Video::new(source_format, width, height);
        for (index, plane) in frame.planes().iter().enumerate() {
            let (row_bytes, rows) = frame.format().plane_extent(index, width, height);
            let stride = source.stride(index);
            let dst = source.data_mut(index);
            for y in 0..rows {
                let src_off = y * plane.stride;
                let dst_off = y * stride;
                dst[dst_off..dst_off + row_bytes]
                    .copy_from_slice(&plane.data[src_off..src_off + row_bytes]);
            }
        }

        let mut scaler = scaling::Context::get(
            source_format,
            width,
            height,
            Pixel::GRAY8,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(conversion_error)?;

        let mut gray = ffmpeg::frame::Video::empty();
        scaler.run(&source, &mut gray).map_err(conversion_error)?;

        GrayscaleBuffer::new(width, height, gray.stride(0), gray.data(0).to_vec())
    }
}

fn conversion_error(e: ffmpeg::Error) -> Error {
    Error::Conversion(e.to_string())
}
