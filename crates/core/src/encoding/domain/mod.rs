pub mod box_encoder;
pub mod embedding;
pub mod fallback_patch;
pub mod image_encoder;
