use ndarray::ArrayViewMut3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Supplies placeholder pixels for boxes that cannot be cropped, so a batch
/// keeps one entry per box.
///
/// `out` is the batch slot itself, laid out as (rows, columns, channels);
/// its shape is fixed by the caller.
pub trait FallbackPatchSource: Send {
    fn fill(&mut self, out: ArrayViewMut3<'_, u8>);
}

/// Independent uniform noise over `0..=255` for every pixel and channel.
pub struct UniformNoise<R = ChaCha8Rng> {
    rng: R,
}

impl<R: Rng + Send> UniformNoise<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl UniformNoise<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy())
    }
}

impl<R: Rng + Send> FallbackPatchSource for UniformNoise<R> {
    fn fill(&mut self, mut out: ArrayViewMut3<'_, u8>) {
        out.iter_mut().for_each(|v| *v = self.rng.gen::<u8>());
    }
}
