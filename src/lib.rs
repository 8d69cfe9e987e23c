pub mod article;
pub mod artifact;
pub mod cancel;
pub mod capability;
pub mod config;
pub mod drain;
pub mod error;
pub mod pack;
pub mod pdf;
pub mod pipeline;
pub mod render;
pub mod segment;
pub mod stabilize;
pub mod sync;
pub mod world;

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(test)]
mod fake;

pub use drain::{DrainReport, archive_queue};
pub use error::ArchiveError;
