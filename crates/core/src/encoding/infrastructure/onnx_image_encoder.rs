use std::path::Path;

use ndarray::{concatenate, Array2, ArrayView4, ArrayViewMut1, Axis, Ix2};

use crate::encoding::domain::image_encoder::{EncoderError, ImageEncoder};
use crate::shared::constants::DEFAULT_BATCH_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputElement {
    Uint8,
    Float32,
}

/// Appearance embedding backend running an ONNX re-identification model.
///
/// Feeds NHWC patches in sub-batches, casting to `f32` only when the model
/// declares a float input, and optionally L2-normalizes the output rows so
/// they can be compared by cosine distance.
pub struct OnnxImageEncoder {
    session: ort::session::Session,
    input_element: InputElement,
    batch_size: usize,
    normalize: bool,
}

impl OnnxImageEncoder {
    /// Load a model with the default sub-batch size and normalized output.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_options(model_path, DEFAULT_BATCH_SIZE, true)
    }

    pub fn with_options(
        model_path: &Path,
        batch_size: usize,
        normalize: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if batch_size == 0 {
            return Err("batch size must be at least 1".into());
        }
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(model_path)?;

        let input_element = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ty, .. } => Some(*ty),
                _ => None,
            })
            .map(|ty| match ty {
                ort::value::TensorElementType::Uint8 => InputElement::Uint8,
                _ => InputElement::Float32,
            })
            .unwrap_or(InputElement::Float32);
        log::info!(
            "Loaded embedding model {} ({input_element:?} input, batch size {batch_size})",
            model_path.display()
        );

        Ok(Self {
            session,
            input_element,
            batch_size,
            normalize,
        })
    }

    fn run_chunk(&mut self, chunk: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
        let outputs = match self.input_element {
            InputElement::Uint8 => {
                let tensor = ort::value::Tensor::from_array(chunk.to_owned()).map_err(inference)?;
                self.session.run(ort::inputs![tensor])
            }
            InputElement::Float32 => {
                let tensor =
                    ort::value::Tensor::from_array(chunk.mapv(f32::from)).map_err(inference)?;
                self.session.run(ort::inputs![tensor])
            }
        }
        .map_err(inference)?;
        if outputs.len() == 0 {
            return Err(EncoderError::UnexpectedOutput("model produced no outputs".into()));
        }

        let features = outputs[0].try_extract_array::<f32>().map_err(inference)?;
        let shape = features.shape().to_vec();
        let features = features.into_dimensionality::<Ix2>().map_err(|_| {
            EncoderError::UnexpectedOutput(format!(
                "expected [batch, dim] features, got shape {shape:?}"
            ))
        })?;
        Ok(features.to_owned())
    }
}

impl ImageEncoder for OnnxImageEncoder {
    fn encode(&mut self, batch: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
        let batch_size = self.batch_size;
        let mut features = encode_in_chunks(batch, batch_size, |chunk| self.run_chunk(chunk))?;
        if self.normalize {
            features.rows_mut().into_iter().for_each(l2_normalize);
        }
        Ok(features)
    }
}

/// Runs `run` over consecutive chunks of at most `batch_size` patches and
/// stacks the results in order.
fn encode_in_chunks<F>(
    batch: ArrayView4<'_, u8>,
    batch_size: usize,
    mut run: F,
) -> Result<Array2<f32>, EncoderError>
where
    F: FnMut(ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError>,
{
    let mut parts = Vec::new();
    for chunk in batch.axis_chunks_iter(Axis(0), batch_size.max(1)) {
        let expected = chunk.shape()[0];
        let part = run(chunk)?;
        if part.nrows() != expected {
            return Err(EncoderError::UnexpectedOutput(format!(
                "{} rows for a chunk of {expected} patches",
                part.nrows()
            )));
        }
        parts.push(part);
    }
    if parts.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }

    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    concatenate(Axis(0), &views)
        .map_err(|e| EncoderError::UnexpectedOutput(format!("inconsistent feature sizes: {e}")))
}

pub fn l2_normalize(mut v: ArrayViewMut1<'_, f32>) {
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v.mapv_inplace(|x| x / norm);
    }
}

fn inference(e: impl std::fmt::Display) -> EncoderError {
    EncoderError::Inference(e.to_string())
}

fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array4};

    /// Encodes each patch as `[first pixel value, batch position]`.
    fn first_pixel(chunk: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
        let mut out = Array2::zeros((chunk.shape()[0], 2));
        for (i, patch) in chunk.outer_iter().enumerate() {
            out[[i, 0]] = patch[[0, 0, 0]] as f32;
            out[[i, 1]] = i as f32;
        }
        Ok(out)
    }

    fn numbered_batch(n: usize) -> Array4<u8> {
        let mut batch = Array4::<u8>::zeros((n, 2, 1, 3));
        for i in 0..n {
            batch[[i, 0, 0, 0]] = i as u8;
        }
        batch
    }

    #[test]
    fn test_chunks_preserve_order_across_boundaries() {
        let batch = numbered_batch(7);
        let mut chunk_sizes = Vec::new();
        let out = encode_in_chunks(batch.view(), 3, |chunk| {
            chunk_sizes.push(chunk.shape()[0]);
            first_pixel(chunk)
        })
        .unwrap();
        assert_eq!(chunk_sizes, vec![3, 3, 1]);
        assert_eq!(out.column(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(out.column(1).to_vec(), vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_single_chunk_when_batch_fits() {
        let batch = numbered_batch(4);
        let mut calls = 0;
        encode_in_chunks(batch.view(), 32, |chunk| {
            calls += 1;
            first_pixel(chunk)
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_empty_batch_never_runs() {
        let batch = numbered_batch(0);
        let out = encode_in_chunks(batch.view(), 32, |_| -> Result<Array2<f32>, EncoderError> {
            panic!("must not run on an empty batch")
        })
        .unwrap();
        assert_eq!(out.nrows(), 0);
    }

    #[test]
    fn test_chunk_row_mismatch_is_error() {
        let batch = numbered_batch(2);
        let result = encode_in_chunks(batch.view(), 32, |_| Ok(Array2::zeros((1, 4))));
        assert!(matches!(result, Err(EncoderError::UnexpectedOutput(_))));
    }

    #[test]
    fn test_chunk_error_propagates() {
        let batch = numbered_batch(5);
        let result = encode_in_chunks(batch.view(), 2, |_| {
            Err(EncoderError::Inference("out of memory".into()))
        });
        assert!(matches!(result, Err(EncoderError::Inference(_))));
    }

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v: Array1<f32> = array![3.0, 4.0];
        l2_normalize(v.view_mut());
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v: Array1<f32> = array![0.0, 0.0, 0.0];
        l2_normalize(v.view_mut());
        assert_eq!(v.to_vec(), vec![0.0, 0.0, 0.0]);
    }
}
