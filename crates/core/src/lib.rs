pub mod encoding;
pub mod extraction;
pub mod shared;
