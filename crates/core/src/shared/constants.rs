/// Canonical appearance patch size used by the person re-identification
/// models this crate targets (rows × columns × channels).
pub const PATCH_HEIGHT: u32 = 128;
pub const PATCH_WIDTH: u32 = 64;
pub const PATCH_CHANNELS: usize = 3;

/// Patches per inference call when a batch is split for the ONNX backend.
pub const DEFAULT_BATCH_SIZE: usize = 32;

pub const MODEL_CACHE_DIR_NAME: &str = "trackfeat";
