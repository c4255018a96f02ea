pub mod bucket;
pub mod media;
pub mod upload;
