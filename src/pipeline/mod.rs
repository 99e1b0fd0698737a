//! Replication pipeline: classification, submission pools and outcome recording.

mod classifier;
mod outcome;
mod recorder;
mod stages;
mod submitter;


pub use classifier::{Classifier, Routed};
pub use outcome::Outcome;
pub use recorder::{Recorder, RecorderStats};
pub use stages::{Pipeline, PipelineConfig, PipelineReport};
pub use submitter::Submitter;

/// Downstream of a send has gone away; only happens while the pipeline is
/// aborting after a fatal sink error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pipeline closed")]
pub struct PipelineClosed;
