use thiserror::Error;

use crate::shared::constants::{PATCH_HEIGHT, PATCH_WIDTH};

#[derive(Error, Debug, PartialEq)]
pub enum PatchShapeError {
    #[error("patch shape must be non-empty, got {height}x{width}")]
    ZeroDimension { height: u32, width: u32 },
}

/// Output size of an appearance patch, in rows × columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchShape {
    height: u32,
    width: u32,
}

impl PatchShape {
    pub const DEFAULT: PatchShape = PatchShape {
        height: PATCH_HEIGHT,
        width: PATCH_WIDTH,
    };

    pub fn new(height: u32, width: u32) -> Result<Self, PatchShapeError> {
        if height == 0 || width == 0 {
            return Err(PatchShapeError::ZeroDimension { height, width });
        }
        Ok(Self { height, width })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Width over height; the ratio every crop is widened or narrowed to.
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// `(rows, columns, channels)` of a patch with this shape.
    pub fn tensor_shape(&self, channels: usize) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, channels)
    }
}

impl Default for PatchShape {
    fn default() -> Self {
        Self::DEFAULT
    }
}
