//! Pixel format conversion to 8-bit grayscale

use crate::{DecodedFrame, GrayscaleBuffer, PixelFormat, Result};

/// Row alignment of converted buffers, matching what FFmpeg allocates
const ROW_ALIGN: usize = 32;

/// Converts decoded frames into grayscale buffers of the same dimensions.
///
/// Implementations are shared by every worker thread, so they must not keep
/// per-frame state in `self`.
pub trait GrayscaleConverter: Send + Sync {
    fn to_grayscale(&self, frame: &DecodedFrame) -> Result<GrayscaleBuffer>;
}

/// Pure-Rust converter.
///
/// YUV and gray formats contribute their luma plane unchanged; packed RGB
/// formats are reduced with BT.601 weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct LumaConverter;

impl LumaConverter {
    pub fn new() -> Self {
        Self
    }
}

impl GrayscaleConverter for LumaConverter {
    fn to_grayscale(&self, frame: &DecodedFrame) -> Result<GrayscaleBuffer> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = width.next_multiple_of(ROW_ALIGN);
        let mut out = vec![0u8; stride * height];

        // Every format keeps its luma or packed pixels in plane 0
        let plane = frame.plane(0).ok_or_else(|| {
            crate::Error::Conversion(format!("frame {} has no planes", frame.frame_number()))
        })?;

        for y in 0..height {
            let src = &plane.data[y * plane.stride..];
            let dst = &mut out[y * stride..y * stride + width];

            match frame.format() {
                PixelFormat::Gray8
                | PixelFormat::Yuv420p
                | PixelFormat::Yuv422p
                | PixelFormat::Yuv444p
                | PixelFormat::Nv12 => dst.copy_from_slice(&src[..width]),
                PixelFormat::Rgb24 => pack_luma(dst, src, 3, [0, 1, 2]),
                PixelFormat::Bgr24 => pack_luma(dst, src, 3, [2, 1, 0]),
                PixelFormat::Rgba => pack_luma(dst, src, 4, [0, 1, 2]),
                PixelFormat::Bgra => pack_luma(dst, src, 4, [2, 1, 0]),
            }
        }

        GrayscaleBuffer::new(frame.width(), frame.height(), stride, out)
    }
}

/// `rgb` gives the byte offsets of R, G and B within one pixel
fn pack_luma(dst: &mut [u8], src: &[u8], bytes_per_pixel: usize, rgb: [usize; 3]) {
    for (x, out) in dst.iter_mut().enumerate() {
        let px = &src[x * bytes_per_pixel..];
        let r = px[rgb[0]] as u32;
        let g = px[rgb[1]] as u32;
        let b = px[rgb[2]] as u32;
        *out = ((77 * r + 150 * g + 29 * b + 128) >> 8) as u8;
    }
}
