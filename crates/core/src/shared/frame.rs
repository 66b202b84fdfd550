use image::RgbImage;
use ndarray::ArrayView3;
use thiserror::Error;

use crate::shared::constants::PATCH_CHANNELS;

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{width}x{height} RGB frame does not fit in memory")]
    TooLarge { width: u32, height: u32 },
}

/// The full image a tracker observes at one time step.
///
/// Contiguous RGB bytes in row-major order, addressed as (row, column,
/// channel). Patch extraction only ever borrows it.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(PATCH_CHANNELS))
            .ok_or(FrameError::TooLarge { width, height })?;
        if data.len() != expected {
            return Err(FrameError::DimensionMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        PATCH_CHANNELS
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, PATCH_CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }
}
