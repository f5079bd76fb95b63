//! Conversation pipeline.
//!
//! A job moves through transcription, response generation and per-chunk
//! production while every milestone is pushed to an [`EventSink`] as soon as
//! it happens.

pub mod events;
pub mod orchestrator;
pub mod sink;
pub mod state;

pub use events::{Emitter, PipelineEvent, Sequencer};
pub use orchestrator::{JobOutcome, Pipeline, PipelineConfig};
pub use sink::{ChannelSink, CollectorSink, EventSink, NdjsonSink};
pub use state::{JobState, JobTracker};
