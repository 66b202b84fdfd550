use image::RgbImage;
use ndarray::{Array3, ArrayView3};

/// Fixed-size pixel crop describing one object's appearance.
///
/// Laid out as (rows, columns, channels), the same order a frame uses.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pixels: Array3<u8>,
}

impl Patch {
    pub fn from_ndarray(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_vec((height as usize, width as usize, 3), image.into_raw())
            .expect("RgbImage buffer length must match its dimensions");
        Self { pixels }
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn channels(&self) -> usize {
        self.pixels.shape()[2]
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn into_ndarray(self) -> Array3<u8> {
        self.pixels
    }
}
