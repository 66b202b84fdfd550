use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::s;

use crate::extraction::domain::patch::Patch;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::patch_shape::PatchShape;

/// Crops appearance patches out of a frame.
///
/// With a target shape, every box is first widened or narrowed to the
/// shape's aspect ratio around its horizontal center, so the bilinear resize
/// that follows does not distort the object. Without one, the clipped crop
/// is returned at its native size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchExtractor {
    patch_shape: Option<PatchShape>,
}

impl PatchExtractor {
    pub fn new(patch_shape: Option<PatchShape>) -> Self {
        Self { patch_shape }
    }

    pub fn patch_shape(&self) -> Option<PatchShape> {
        self.patch_shape
    }

    /// Returns `None` when the box is empty or entirely outside the frame
    /// after aspect correction, truncation and clipping. Never panics on
    /// malformed boxes.
    pub fn extract(&self, frame: &Frame, bbox: &BoundingBox) -> Option<Patch> {
        let bbox = match self.patch_shape {
            Some(shape) => bbox.with_aspect_ratio(shape.aspect()),
            None => *bbox,
        };
        let rect = bbox.clip_to(frame.width(), frame.height())?;

        let region = frame.as_ndarray().slice_move(s![
            rect.y1 as usize..rect.y2 as usize,
            rect.x1 as usize..rect.x2 as usize,
            ..
        ]);
        let crop = RgbImage::from_raw(rect.width(), rect.height(), region.iter().copied().collect())?;
        let pixels = match self.patch_shape {
            Some(shape) => imageops::resize(&crop, shape.width(), shape.height(), FilterType::Triangle),
            None => crop,
        };
        Some(Patch::from_rgb(pixels))
    }
}

impl Default for PatchExtractor {
    fn default() -> Self {
        Self::new(Some(PatchShape::DEFAULT))
    }
}
