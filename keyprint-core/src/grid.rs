//! Grid median extraction
//!
//! A grayscale frame is split into `rows` x `cols` cells and each cell is
//! reduced to the median of its pixels. Cells are not equal tiles: every band
//! takes `remaining / bands_left` pixels, so later bands absorb the remainder
//! when the frame size is not a multiple of the grid size.

use crate::{Error, GrayscaleBuffer, Result};

/// Shape of the fingerprint grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    /// Number of horizontal bands (R)
    pub rows: u32,
    /// Number of vertical bands (C)
    pub cols: u32,
}

impl GridShape {
    /// Creates a grid shape; both dimensions must be non-zero
    pub fn new(rows: u32, cols: u32) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidGrid { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Number of values in a fingerprint of this shape
    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Fails with `DimensionTooSmall` unless every cell gets at least one pixel
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if width < self.cols || height < self.rows {
            return Err(Error::DimensionTooSmall {
                width,
                height,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self { rows: 3, cols: 3 }
    }
}

/// Splits `total` pixels into `count` bands, returning `(offset, length)`
/// pairs in order.
pub fn bands(total: u32, count: u32) -> Vec<(u32, u32)> {
    let mut remaining = total;
    (0..count)
        .map(|band| {
            let offset = total - remaining;
            let length = remaining / (count - band);
            remaining -= length;
            (offset, length)
        })
        .collect()
}

/// Median of `pixels`, reordering the slice in the process.
///
/// For an even count this is the average of the element at rank `len / 2`
/// and the largest element ranked below it. Returns `None` for an empty slice.
pub fn median(pixels: &mut [u8]) -> Option<f32> {
    if pixels.is_empty() {
        return None;
    }

    let len = pixels.len();
    let middle = len / 2;
    let (lower, nth, _) = pixels.select_nth_unstable(middle);
    let nth = f32::from(*nth);

    if len % 2 == 1 {
        return Some(nth);
    }

    let lower_max = lower.iter().copied().max().map_or(nth, f32::from);
    Some((nth + lower_max) / 2.0)
}

/// Computes the row-major per-cell medians of `buffer` for `shape`
pub fn extract_fingerprint(buffer: &GrayscaleBuffer, shape: GridShape) -> Result<Vec<f32>> {
    shape.check_dimensions(buffer.width(), buffer.height())?;

    let row_bands = bands(buffer.height(), shape.rows);
    let col_bands = bands(buffer.width(), shape.cols);

    let mut values = Vec::with_capacity(shape.cell_count());
    let mut cell = Vec::new();

    for &(y_offset, y_pixels) in &row_bands {
        for &(x_offset, x_pixels) in &col_bands {
            cell.clear();
            let start = x_offset as usize;
            let end = start + x_pixels as usize;
            for y in y_offset..y_offset + y_pixels {
                cell.extend_from_slice(&buffer.row(y)[start..end]);
            }

            let value = median(&mut cell).ok_or(Error::DimensionTooSmall {
                width: buffer.width(),
                height: buffer.height(),
                rows: shape.rows,
                cols: shape.cols,
            })?;
            values.push(value);
        }
    }

    Ok(values)
}
