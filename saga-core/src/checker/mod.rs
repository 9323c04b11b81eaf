//! Chapter review.
//!
//! Continuity is checked with deterministic rules against story memory.
//! Quality is assessed by the model.

mod continuity;
mod quality;

pub use continuity::ContinuityChecker;
pub use quality::QualityChecker;
