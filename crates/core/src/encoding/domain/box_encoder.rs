use ndarray::Array4;
use thiserror::Error;

use crate::encoding::domain::embedding::{Embedding, PatchOrigin};
use crate::encoding::domain::fallback_patch::{FallbackPatchSource, UniformNoise};
use crate::encoding::domain::image_encoder::{EncoderError, ImageEncoder};
use crate::extraction::domain::patch_extractor::PatchExtractor;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::patch_shape::PatchShape;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("encoder returned {actual} embeddings for a batch of {expected} patches")]
    RowCountMismatch { expected: usize, actual: usize },
}

/// Turns the boxes of one frame into appearance embeddings.
///
/// Every box contributes exactly one patch to a single batch: a crop when
/// extraction succeeds, a fallback patch otherwise. The batch goes to the
/// encoder in one call and the resulting rows stay index-aligned with the
/// input boxes.
pub struct BoxEncoder<E, F = UniformNoise> {
    extractor: PatchExtractor,
    patch_shape: PatchShape,
    encoder: E,
    fallback: F,
}

impl<E: ImageEncoder> BoxEncoder<E, UniformNoise> {
    /// Canonical 128x64 patches with entropy-seeded noise fallbacks.
    pub fn new(encoder: E) -> Self {
        Self::with_fallback(encoder, PatchShape::DEFAULT, UniformNoise::from_entropy())
    }
}

impl<E: ImageEncoder, F: FallbackPatchSource> BoxEncoder<E, F> {
    pub fn with_fallback(encoder: E, patch_shape: PatchShape, fallback: F) -> Self {
        Self {
            extractor: PatchExtractor::new(Some(patch_shape)),
            patch_shape,
            encoder,
            fallback,
        }
    }

    pub fn patch_shape(&self) -> PatchShape {
        self.patch_shape
    }

    /// Builds the `(boxes, rows, columns, channels)` batch without running
    /// the encoder, together with the origin of each entry.
    pub fn assemble_batch(
        &mut self,
        frame: &Frame,
        boxes: &[BoundingBox],
    ) -> (Array4<u8>, Vec<PatchOrigin>) {
        let (rows, cols, channels) = self.patch_shape.tensor_shape(frame.channels());
        let mut batch = Array4::<u8>::zeros((boxes.len(), rows, cols, channels));
        let mut origins = Vec::with_capacity(boxes.len());

        for (bbox, mut slot) in boxes.iter().zip(batch.outer_iter_mut()) {
            let origin = match self.extractor.extract(frame, bbox) {
                // The extractor resizes to `patch_shape`, matching the slot.
                Some(patch) => {
                    slot.assign(&patch.as_ndarray());
                    PatchOrigin::Extracted
                }
                None => {
                    log::warn!("Failed to extract image patch: {bbox}");
                    self.fallback.fill(slot);
                    PatchOrigin::Fallback
                }
            };
            origins.push(origin);
        }

        (batch, origins)
    }

    /// One embedding per box, in input order.
    ///
    /// An empty box list returns an empty result without calling the
    /// encoder. Encoder failures fail the whole batch.
    pub fn encode(
        &mut self,
        frame: &Frame,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncodeError> {
        if boxes.is_empty() {
            return Ok(Vec::new());
        }

        let (batch, origins) = self.assemble_batch(frame, boxes);
        let fallbacks = origins
            .iter()
            .filter(|o| **o == PatchOrigin::Fallback)
            .count();
        log::debug!(
            "Encoding {} patches ({fallbacks} fallback)",
            origins.len()
        );

        let features = self.encoder.encode(batch.view())?;
        if features.nrows() != origins.len() {
            return Err(EncodeError::RowCountMismatch {
                expected: origins.len(),
                actual: features.nrows(),
            });
        }

        Ok(features
            .outer_iter()
            .zip(origins)
            .map(|(row, origin)| Embedding {
                vector: row.to_vec(),
                origin,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::domain::image_encoder::encoder_fn;
    use approx::assert_relative_eq;
    use image::{Rgb, RgbImage};
    use ndarray::{Array2, ArrayView4, ArrayViewMut3, Axis};
    use std::cell::RefCell;

    thread_local! {
        static RECORDS: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    /// Collects records emitted on the current test thread.
    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            RECORDS.with(|r| {
                r.borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    fn start_capture() {
        // Another test may have installed it already.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
        RECORDS.with(|r| r.borrow_mut().clear());
    }

    fn captured_warnings() -> Vec<String> {
        RECORDS.with(|r| {
            r.borrow()
                .iter()
                .filter(|(level, _)| *level == log::Level::Warn)
                .map(|(_, message)| message.clone())
                .collect()
        })
    }

    /// Writes a constant into every fallback slot.
    struct ConstantFill(u8);

    impl FallbackPatchSource for ConstantFill {
        fn fill(&mut self, mut out: ArrayViewMut3<'_, u8>) {
            out.fill(self.0);
        }
    }

    /// Embeds each patch as its mean red, green and blue value and counts
    /// how often it was called.
    struct MeanColorEncoder {
        calls: usize,
        batch_sizes: Vec<usize>,
    }

    impl MeanColorEncoder {
        fn new() -> Self {
            Self {
                calls: 0,
                batch_sizes: Vec::new(),
            }
        }
    }

    impl ImageEncoder for MeanColorEncoder {
        fn encode(&mut self, batch: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
            self.calls += 1;
            self.batch_sizes.push(batch.shape()[0]);
            let mut out = Array2::<f32>::zeros((batch.shape()[0], 3));
            for (i, patch) in batch.outer_iter().enumerate() {
                for c in 0..3 {
                    out[[i, c]] = patch.index_axis(Axis(2), c).mapv(f32::from).mean().unwrap_or(0.0);
                }
            }
            Ok(out)
        }
    }

    /// Left half red, right half blue.
    fn split_frame() -> Frame {
        Frame::from_rgb(RgbImage::from_fn(640, 480, |x, _| {
            if x < 320 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }))
    }

    fn encoder_with_seed(seed: u64) -> BoxEncoder<MeanColorEncoder> {
        BoxEncoder::with_fallback(
            MeanColorEncoder::new(),
            PatchShape::DEFAULT,
            UniformNoise::seeded(seed),
        )
    }

    #[test]
    fn test_outputs_align_with_boxes() {
        let mut encoder = encoder_with_seed(0);
        let boxes = [
            BoundingBox::new(500.0, 100.0, 50.0, 100.0),
            BoundingBox::new(50.0, 100.0, 50.0, 100.0),
            BoundingBox::new(520.0, 300.0, 40.0, 80.0),
        ];
        let out = encoder.encode(&split_frame(), &boxes).unwrap();
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[0].vector[2], 255.0);
        assert_relative_eq!(out[1].vector[0], 255.0);
        assert_relative_eq!(out[2].vector[2], 255.0);
        assert!(out.iter().all(Embedding::is_reliable));
    }

    #[test]
    fn test_single_batched_call() {
        let mut encoder = encoder_with_seed(0);
        let boxes = vec![BoundingBox::new(10.0, 10.0, 20.0, 40.0); 5];
        encoder.encode(&split_frame(), &boxes).unwrap();
        assert_eq!(encoder.encoder.calls, 1);
        assert_eq!(encoder.encoder.batch_sizes, vec![5]);
    }

    #[test]
    fn test_empty_boxes_skip_encoder() {
        let mut encoder = encoder_with_seed(0);
        let out = encoder.encode(&split_frame(), &[]).unwrap();
        assert!(out.is_empty());
        assert_eq!(encoder.encoder.calls, 0);
    }

    #[test]
    fn test_failed_box_gets_fallback_in_place() {
        let mut encoder = encoder_with_seed(0);
        let boxes = [
            BoundingBox::new(50.0, 100.0, 50.0, 100.0),
            BoundingBox::new(-50.0, -50.0, 10.0, 10.0),
            BoundingBox::new(500.0, 100.0, 50.0, 100.0),
        ];
        let out = encoder.encode(&split_frame(), &boxes).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].origin, PatchOrigin::Extracted);
        assert_eq!(out[1].origin, PatchOrigin::Fallback);
        assert!(!out[1].is_reliable());
        assert_eq!(out[2].origin, PatchOrigin::Extracted);
        // Noise averages near mid-grey on every channel.
        for c in 0..3 {
            assert!((out[1].vector[c] - 127.5).abs() < 10.0);
        }
    }

    #[test]
    fn test_all_boxes_failing_still_fills_batch() {
        let mut encoder = encoder_with_seed(0);
        let boxes = [
            BoundingBox::new(0.0, 0.0, 0.0, 0.0),
            BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0),
        ];
        let out = encoder.encode(&split_frame(), &boxes).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.origin == PatchOrigin::Fallback));
    }

    #[test]
    fn test_assemble_batch_shape_and_fallback_determinism() {
        let boxes = [
            BoundingBox::new(10.0, 10.0, 20.0, 40.0),
            BoundingBox::new(1000.0, 1000.0, 5.0, 5.0),
        ];
        let (batch_a, origins) = encoder_with_seed(9).assemble_batch(&split_frame(), &boxes);
        let (batch_b, _) = encoder_with_seed(9).assemble_batch(&split_frame(), &boxes);
        assert_eq!(batch_a.shape(), &[2, 128, 64, 3]);
        assert_eq!(origins, vec![PatchOrigin::Extracted, PatchOrigin::Fallback]);
        assert_eq!(batch_a, batch_b);
    }

    #[test]
    fn test_custom_patch_shape() {
        let mut encoder = BoxEncoder::with_fallback(
            MeanColorEncoder::new(),
            PatchShape::new(32, 16).unwrap(),
            UniformNoise::seeded(0),
        );
        let (batch, _) = encoder.assemble_batch(&split_frame(), &[BoundingBox::new(0.0, 0.0, 8.0, 8.0)]);
        assert_eq!(batch.shape(), &[1, 32, 16, 3]);
        assert_eq!(encoder.patch_shape(), PatchShape::new(32, 16).unwrap());
    }

    #[test]
    fn test_warning_names_each_failed_box() {
        start_capture();
        let mut encoder = encoder_with_seed(0);
        let boxes = [
            BoundingBox::new(-50.0, -50.0, 10.0, 10.0),
            BoundingBox::new(50.0, 100.0, 50.0, 100.0),
            BoundingBox::new(-50.0, -50.0, 10.0, 10.0),
        ];
        encoder.encode(&split_frame(), &boxes).unwrap();
        let warnings = captured_warnings();
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings.iter().all(|w| w.contains("(-50, -50, 10, 10)")));
    }

    #[test]
    fn test_no_warning_for_good_boxes() {
        start_capture();
        let mut encoder = encoder_with_seed(0);
        let boxes = [
            BoundingBox::new(50.0, 100.0, 50.0, 100.0),
            BoundingBox::new(500.0, 100.0, 50.0, 100.0),
        ];
        encoder.encode(&split_frame(), &boxes).unwrap();
        assert!(captured_warnings().is_empty());
    }

    #[test]
    fn test_fallback_fills_slot_of_custom_shape() {
        let mut encoder = BoxEncoder::with_fallback(
            MeanColorEncoder::new(),
            PatchShape::new(8, 4).unwrap(),
            ConstantFill(7),
        );
        let boxes = [
            BoundingBox::new(-50.0, -50.0, 10.0, 10.0),
            BoundingBox::new(10.0, 10.0, 20.0, 40.0),
        ];
        let (batch, origins) = encoder.assemble_batch(&split_frame(), &boxes);
        assert_eq!(batch.shape(), &[2, 8, 4, 3]);
        assert_eq!(origins[0], PatchOrigin::Fallback);
        assert!(batch.index_axis(Axis(0), 0).iter().all(|&v| v == 7));

        let out = encoder.encode(&split_frame(), &boxes).unwrap();
        assert_relative_eq!(out[0].vector[1], 7.0);
    }

    #[test]
    fn test_row_count_mismatch_is_surfaced() {
        let mut encoder = BoxEncoder::with_fallback(
            encoder_fn(|_| Ok(Array2::zeros((1, 8)))),
            PatchShape::DEFAULT,
            UniformNoise::seeded(0),
        );
        let boxes = vec![BoundingBox::new(10.0, 10.0, 20.0, 40.0); 2];
        let err = encoder.encode(&split_frame(), &boxes).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::RowCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_encoder_error_fails_batch() {
        let mut encoder = BoxEncoder::new(encoder_fn(|_| {
            Err(EncoderError::Inference("session closed".into()))
        }));
        let err = encoder
            .encode(&split_frame(), &[BoundingBox::new(10.0, 10.0, 20.0, 40.0)])
            .unwrap_err();
        assert_eq!(err.to_string(), "inference failed: session closed");
    }
}
