//! Image views and dense pixel buffers
//!
//! [`ImageView`] borrows pixels laid out with arbitrary (possibly negative)
//! steps, the way capture pipelines hand them over. [`DenseImage`] is the
//! owned, interleaved copy that gets serialized or compressed.

use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// Pixel format code stored in raw image records
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Unsigned 8-bit samples
    Byte = 1,
}

impl PixelFormat {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(PixelFormat::Byte),
            _ => None,
        }
    }
}

/// Borrowed 8-bit image with explicit steps
///
/// Sample `(i, j, p)` lives at `first + i*w_step + j*h_step + p*d_step`.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    first: usize,
    width: usize,
    height: usize,
    depth: usize,
    w_step: isize,
    h_step: isize,
    d_step: isize,
}

impl<'a> ImageView<'a> {
    /// View over a packed interleaved buffer (`depth` samples per pixel)
    pub fn packed(data: &'a [u8], width: usize, height: usize, depth: usize) -> Result<Self> {
        let row = width
            .checked_mul(depth)
            .and_then(|row| isize::try_from(row).ok())
            .ok_or_else(|| {
                ArchiveError::InvalidImage(format!("{}x{} row size overflows", width, depth))
            })?;
        Self::with_steps(data, 0, width, height, depth, depth as isize, row, 1)
    }

    /// View with explicit steps; every addressable sample must be in bounds
    #[allow(clippy::too_many_arguments)]
    pub fn with_steps(
        data: &'a [u8],
        first: usize,
        width: usize,
        height: usize,
        depth: usize,
        w_step: isize,
        h_step: isize,
        d_step: isize,
    ) -> Result<Self> {
        if depth == 0 {
            return Err(ArchiveError::InvalidImage("depth must be at least 1".into()));
        }

        let view = ImageView {
            data,
            first,
            width,
            height,
            depth,
            w_step,
            h_step,
            d_step,
        };

        if width > 0 && height > 0 {
            let in_bounds = view.offset_range().and_then(|(lo, hi)| {
                let first = isize::try_from(first).ok()?;
                Some((first.checked_add(lo)?, first.checked_add(hi)?))
            });
            let fits = matches!(in_bounds, Some((lo, hi)) if lo >= 0 && (hi as usize) < data.len());
            if !fits {
                return Err(ArchiveError::InvalidImage(format!(
                    "{}x{}x{} view with steps ({}, {}, {}) from offset {} exceeds {} byte buffer",
                    width,
                    height,
                    depth,
                    w_step,
                    h_step,
                    d_step,
                    first,
                    data.len()
                )));
            }
        }

        Ok(view)
    }

    /// Relative offsets of the lowest and highest addressable samples,
    /// `None` if they overflow `isize`
    fn offset_range(&self) -> Option<(isize, isize)> {
        let mut lo = 0isize;
        let mut hi = 0isize;
        for (extent, step) in [
            (self.width, self.w_step),
            (self.height, self.h_step),
            (self.depth, self.d_step),
        ] {
            let span = isize::try_from(extent - 1).ok()?.checked_mul(step)?;
            lo = lo.checked_add(span.min(0))?;
            hi = hi.checked_add(span.max(0))?;
        }
        Some((lo, hi))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Steps as `(w_step, h_step, d_step)`
    pub fn steps(&self) -> (isize, isize, isize) {
        (self.w_step, self.h_step, self.d_step)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, p: usize) -> u8 {
        let offset = self.first as isize
            + i as isize * self.w_step
            + j as isize * self.h_step
            + p as isize * self.d_step;
        self.data[offset as usize]
    }

    /// True when the samples are already packed interleaved from `first`
    pub fn is_packed(&self) -> bool {
        self.d_step == 1
            && self.w_step == self.depth as isize
            && self.h_step == (self.width * self.depth) as isize
    }
}

/// Owned interleaved 8-bit image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseImage {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub pixels: Vec<u8>,
}

impl DenseImage {
    pub fn new(width: usize, height: usize, depth: usize, pixels: Vec<u8>) -> Result<Self> {
        let expected = width.checked_mul(height).and_then(|n| n.checked_mul(depth));
        if expected != Some(pixels.len()) {
            return Err(ArchiveError::InvalidImage(format!(
                "expected {:?} bytes for {}x{}x{}, got {}",
                expected,
                width,
                height,
                depth,
                pixels.len()
            )));
        }
        Ok(DenseImage {
            width,
            height,
            depth,
            pixels,
        })
    }

    /// Byte-exact packed copy of a possibly strided view
    pub fn from_view(view: &ImageView<'_>) -> Self {
        let len = view.width * view.height * view.depth;
        let pixels = if len == 0 {
            Vec::new()
        } else if view.is_packed() {
            view.data[view.first..view.first + len].to_vec()
        } else {
            let mut pixels = Vec::with_capacity(len);
            for j in 0..view.height {
                for i in 0..view.width {
                    for p in 0..view.depth {
                        pixels.push(view.get(i, j, p));
                    }
                }
            }
            pixels
        };

        DenseImage {
            width: view.width,
            height: view.height,
            depth: view.depth,
            pixels,
        }
    }

    /// Steps of the interleaved layout as `(w_step, h_step, d_step)`
    pub fn steps(&self) -> (isize, isize, isize) {
        (
            self.depth as isize,
            (self.width * self.depth) as isize,
            1,
        )
    }

    pub fn get(&self, i: usize, j: usize, p: usize) -> u8 {
        self.pixels[(j * self.width + i) * self.depth + p]
    }

    pub fn view(&self) -> ImageView<'_> {
        let (w_step, h_step, d_step) = self.steps();
        ImageView {
            data: &self.pixels,
            first: 0,
            width: self.width,
            height: self.height,
            depth: self.depth,
            w_step,
            h_step,
            d_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_view_copy_is_identity() {
        let data: Vec<u8> = (0..24).collect();
        let view = ImageView::packed(&data, 4, 2, 3).unwrap();
        assert!(view.is_packed());

        let dense = DenseImage::from_view(&view);
        assert_eq!(dense.pixels, data);
    }

    #[test]
    fn test_planar_view_is_interleaved_on_copy() {
        // 2x1 image with 2 planes stored plane after plane: [a0 a1][b0 b1]
        let data = [10u8, 11, 20, 21];
        let view = ImageView::with_steps(&data, 0, 2, 1, 2, 1, 2, 2).unwrap();
        assert!(!view.is_packed());

        let dense = DenseImage::from_view(&view);
        assert_eq!(dense.pixels, vec![10, 20, 11, 21]);
    }

    #[test]
    fn test_flipped_view_with_negative_step() {
        // 2 rows, bottom-up: first points at the last row
        let data = [1u8, 2, 3, 4];
        let view = ImageView::with_steps(&data, 2, 2, 2, 1, 1, -2, 1).unwrap();
        let dense = DenseImage::from_view(&view);
        assert_eq!(dense.pixels, vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_padded_rows_skip_padding() {
        // 3x2 grey with rows padded to 4 bytes
        let data = [1u8, 2, 3, 0xEE, 4, 5, 6, 0xEE];
        let view = ImageView::with_steps(&data, 0, 3, 2, 1, 1, 4, 1).unwrap();
        let dense = DenseImage::from_view(&view);
        assert_eq!(dense.pixels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_out_of_bounds_view_rejected() {
        let data = [0u8; 5];
        assert!(matches!(
            ImageView::packed(&data, 3, 2, 1),
            Err(ArchiveError::InvalidImage(_))
        ));
        assert!(ImageView::with_steps(&data, 0, 2, 1, 1, 1, 2, 1).is_ok());
        assert!(ImageView::with_steps(&data, 0, 2, 2, 1, 1, -2, 1).is_err());
    }

    #[test]
    fn test_extreme_steps_rejected_without_overflow() {
        let data = [0u8; 16];
        assert!(matches!(
            ImageView::with_steps(&data, 0, 3, 2, 1, isize::MAX, 1, 1),
            Err(ArchiveError::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::with_steps(&data, 0, 2, 3, 1, 1, isize::MIN, 1),
            Err(ArchiveError::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::with_steps(&data, usize::MAX, 1, 1, 1, 1, 1, 1),
            Err(ArchiveError::InvalidImage(_))
        ));
        assert!(ImageView::packed(&data, usize::MAX, 1, 2).is_err());
        assert!(DenseImage::new(usize::MAX, 2, 1, Vec::new()).is_err());
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(ImageView::packed(&[], 0, 0, 0).is_err());
    }

    #[test]
    fn test_dense_image_length_checked() {
        assert!(DenseImage::new(2, 2, 1, vec![0; 3]).is_err());
        let img = DenseImage::new(2, 2, 1, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(img.get(1, 1, 0), 4);
        assert_eq!(img.steps(), (1, 2, 1));
    }
}
