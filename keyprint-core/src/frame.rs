//! Frame data structures: decoded keyframes, grayscale buffers and fingerprints

use crate::{Error, Result};
use image::GrayImage;

/// Pixel layouts a decoded frame may arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit single channel
    Gray8,
    /// Planar Y, U, V with both chroma planes subsampled 2x2
    Yuv420p,
    /// Planar Y, U, V with chroma subsampled horizontally
    Yuv422p,
    /// Planar Y, U, V at full resolution
    Yuv444p,
    /// Y plane followed by an interleaved UV plane subsampled 2x2
    Nv12,
    /// Packed 8-bit R, G, B
    Rgb24,
    /// Packed 8-bit B, G, R
    Bgr24,
    /// Packed 8-bit R, G, B, A
    Rgba,
    /// Packed 8-bit B, G, R, A
    Bgra,
}

impl PixelFormat {
    /// Number of planes a frame in this format carries
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Gray8
            | PixelFormat::Rgb24
            | PixelFormat::Bgr24
            | PixelFormat::Rgba
            | PixelFormat::Bgra => 1,
            PixelFormat::Nv12 => 2,
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => 3,
        }
    }

    /// Bytes per row (excluding padding) and row count of `plane` for a
    /// `width` x `height` frame.
    pub fn plane_extent(self, plane: usize, width: u32, height: u32) -> (usize, usize) {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);

        match (self, plane) {
            (PixelFormat::Gray8, _) => (w, h),
            (PixelFormat::Rgb24 | PixelFormat::Bgr24, _) => (w * 3, h),
            (PixelFormat::Rgba | PixelFormat::Bgra, _) => (w * 4, h),
            (PixelFormat::Nv12, 0) => (w, h),
            (PixelFormat::Nv12, _) => (half_w * 2, half_h),
            (PixelFormat::Yuv420p, 0) => (w, h),
            (PixelFormat::Yuv420p, _) => (half_w, half_h),
            (PixelFormat::Yuv422p, 0) => (w, h),
            (PixelFormat::Yuv422p, _) => (half_w, h),
            (PixelFormat::Yuv444p, _) => (w, h),
        }
    }
}

/// One plane of pixel data. `stride` is the distance in bytes between the
/// starts of consecutive rows and may exceed the visible row width.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

impl Plane {
    /// Creates a new plane
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }
}

/// A single decoded keyframe as delivered by the decoder
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    frame_number: u64,
    timestamp: f64,
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
}

impl DecodedFrame {
    /// Creates a decoded frame, checking that every plane is large enough for
    /// the declared dimensions and strides.
    pub fn new(
        frame_number: u64,
        timestamp: f64,
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
    ) -> Result<Self> {
        if planes.len() != format.plane_count() {
            return Err(Error::InvalidBuffer(format!(
                "{:?} expects {} planes, got {}",
                format,
                format.plane_count(),
                planes.len()
            )));
        }

        for (index, plane) in planes.iter().enumerate() {
            let (row_bytes, rows) = format.plane_extent(index, width, height);
            check_plane(index, &plane.data, plane.stride, row_bytes, rows)?;
        }

        Ok(Self {
            frame_number,
            timestamp,
            width,
            height,
            format,
            planes,
        })
    }

    /// Creates a single-plane grayscale frame with tightly packed rows
    pub fn gray(frame_number: u64, timestamp: f64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        Self::new(
            frame_number,
            timestamp,
            width,
            height,
            PixelFormat::Gray8,
            vec![Plane::new(pixels, width as usize)],
        )
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Presentation time in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }
}

/// An 8-bit single-channel image owned by the worker that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayscaleBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl GrayscaleBuffer {
    /// Wraps `data` laid out with `stride` bytes per row
    pub fn new(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self> {
        check_plane(0, &data, stride, width as usize, height as usize)?;
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Wraps tightly packed row-major pixels
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, width as usize, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The visible pixels of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride + x as usize]
    }

    /// Copies the visible pixels into an `image` buffer, dropping row padding
    pub fn to_image(&self) -> Result<GrayImage> {
        let width = self.width as usize;
        let mut packed = Vec::with_capacity(width * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            let row = self.data.get(start..start + width).ok_or_else(|| {
                Error::InvalidBuffer(format!(
                    "row {y} ends past the {}-byte buffer",
                    self.data.len()
                ))
            })?;
            packed.extend_from_slice(row);
        }

        GrayImage::from_raw(self.width, self.height, packed).ok_or_else(|| {
            Error::InvalidBuffer(format!(
                "{}x{} pixels do not fill the image",
                self.width, self.height
            ))
        })
    }
}

/// The per-cell median luma values of one keyframe
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFingerprint {
    /// Arrival index of the keyframe, used as the ordering key
    pub frame_number: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    /// One median per grid cell, in row-major cell order
    pub values: Vec<f32>,
}

impl FrameFingerprint {
    /// Creates a new fingerprint
    pub fn new(frame_number: u64, timestamp: f64, values: Vec<f32>) -> Self {
        Self {
            frame_number,
            timestamp,
            values,
        }
    }
}

fn check_plane(index: usize, data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Result<()> {
    if stride < row_bytes {
        return Err(Error::InvalidBuffer(format!(
            "plane {index}: stride {stride} is smaller than row width {row_bytes}"
        )));
    }

    let required = match rows {
        0 => 0,
        rows => stride * (rows - 1) + row_bytes,
    };
    if data.len() < required {
        return Err(Error::InvalidBuffer(format!(
            "plane {index}: {} bytes, need at least {required}",
            data.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_frame_accepts_packed_rows() {
        let frame = DecodedFrame::gray(7, 1.5, 4, 2, vec![0; 8]).unwrap();
        assert_eq!(frame.frame_number(), 7);
        assert_eq!(frame.format(), PixelFormat::Gray8);
        assert_eq!(frame.planes().len(), 1);
    }

    #[test]
    fn test_frame_rejects_short_plane() {
        let result = DecodedFrame::gray(0, 0.0, 4, 4, vec![0; 15]);
        assert!(matches!(result, Err(Error::InvalidBuffer(_))));
    }

    #[test]
    fn test_frame_rejects_wrong_plane_count() {
        let planes = vec![Plane::new(vec![0; 16], 4)];
        let result = DecodedFrame::new(0, 0.0, 4, 4, PixelFormat::Yuv420p, planes);
        assert!(matches!(result, Err(Error::InvalidBuffer(_))));
    }

    #[test]
    fn test_yuv420_odd_dimensions() {
        // 5x3 luma, chroma rounds up to 3x2
        assert_eq!(PixelFormat::Yuv420p.plane_extent(1, 5, 3), (3, 2));
        let planes = vec![
            Plane::new(vec![0; 8 * 3], 8),
            Plane::new(vec![0; 4 + 3], 4),
            Plane::new(vec![0; 4 + 3], 4),
        ];
        assert!(DecodedFrame::new(0, 0.0, 5, 3, PixelFormat::Yuv420p, planes).is_ok());
    }

    #[test]
    fn test_last_row_needs_no_padding() {
        // Stride 6, width 4, 2 rows: 6 + 4 bytes are enough
        let buffer = GrayscaleBuffer::new(4, 2, 6, vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8]).unwrap();
        assert_eq!(buffer.row(1), &[5, 6, 7, 8]);
        assert_eq!(buffer.pixel(2, 0), 3);
    }

    #[test]
    fn test_stride_smaller_than_width_rejected() {
        let result = GrayscaleBuffer::new(4, 1, 3, vec![0; 4]);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_image_strips_padding() {
        let buffer = GrayscaleBuffer::new(2, 2, 4, vec![1, 2, 99, 99, 3, 4, 99, 99]).unwrap();
        let image = buffer.to_image().unwrap();
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_to_image_rejects_short_buffer() {
        // Bypasses `new` to get a buffer whose rows overrun its data
        let buffer = GrayscaleBuffer {
            width: 4,
            height: 3,
            stride: 4,
            data: vec![7; 8],
        };
        assert!(matches!(buffer.to_image(), Err(Error::InvalidBuffer(_))));
    }
}
