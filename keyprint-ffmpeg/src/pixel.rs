//! Mapping between FFmpeg pixel formats and keyprint's

use ffmpeg_next::format::Pixel;
use keyprint_core::PixelFormat;

/// The keyprint format for an FFmpeg pixel format, if it is one the
/// converters handle directly. Full-range (JPEG) YUV shares the planar layout.
pub fn from_ffmpeg(pixel: Pixel) -> Option<PixelFormat> {
    match pixel {
        Pixel::GRAY8 => Some(PixelFormat::Gray8),
        Pixel::YUV420P | Pixel::YUVJ420P => Some(PixelFormat::Yuv420p),
        Pixel::YUV422P | Pixel::YUVJ422P => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P | Pixel::YUVJ444P => Some(PixelFormat::Yuv444p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::BGR24 => Some(PixelFormat::Bgr24),
        Pixel::RGBA => Some(PixelFormat::Rgba),
        Pixel::BGRA => Some(PixelFormat::Bgra),
        _ => None,
    }
}

pub fn to_ffmpeg(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Gray8 => Pixel::GRAY8,
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Bgra => Pixel::BGRA,
    }
}
