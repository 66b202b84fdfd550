/// How the patch behind an embedding was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOrigin {
    /// Cropped from the frame at the requested box.
    Extracted,
    /// Synthetic placeholder; the box could not be cropped.
    Fallback,
}

/// Appearance descriptor for one bounding box.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub origin: PatchOrigin,
}

impl Embedding {
    /// False for embeddings computed from a fallback patch, which carry no
    /// information about the object.
    pub fn is_reliable(&self) -> bool {
        self.origin == PatchOrigin::Extracted
    }
}
