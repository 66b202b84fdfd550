use ndarray::{Array2, ArrayView4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("embedding backend failed: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain interface for appearance embedding models.
///
/// Receives a batch of equally sized patches laid out as
/// `(batch, rows, columns, channels)` and returns one row per patch, in batch
/// order. Backends are assumed not to be reentrant, hence `&mut self`.
pub trait ImageEncoder: Send {
    fn encode(&mut self, batch: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError>;
}

impl<T: ImageEncoder + ?Sized> ImageEncoder for Box<T> {
    fn encode(&mut self, batch: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
        (**self).encode(batch)
    }
}

/// Adapts a closure into an [`ImageEncoder`].
pub struct FnEncoder<F>(F);

pub fn encoder_fn<F>(f: F) -> FnEncoder<F>
where
    F: FnMut(ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> + Send,
{
    FnEncoder(f)
}

impl<F> ImageEncoder for FnEncoder<F>
where
    F: FnMut(ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> + Send,
{
    fn encode(&mut self, batch: ArrayView4<'_, u8>) -> Result<Array2<f32>, EncoderError> {
        (self.0)(batch)
    }
}
