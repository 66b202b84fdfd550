pub mod patch;
pub mod patch_extractor;
