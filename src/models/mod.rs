//! Data models for docpipe.

mod document;
mod stage;

pub use document::{Document, StatusUpdate};
pub use stage::{ProcessingLevel, Stage, StageStatus, StageStatuses};
