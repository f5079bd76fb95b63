//! lipstream - progressive talking-avatar pipeline
//!
//! Turns a spoken question into a stream of short lip-synced clips, each
//! advertised to the client as soon as it is safely on disk.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod producer;
pub mod readiness;
pub mod segmenter;

// Collaborator seams
pub use collaborators::{Renderer, Responder, Synthesizer, Transcriber};

// Pipeline
pub use pipeline::events::{Emitter, PipelineEvent, Sequencer};
pub use pipeline::orchestrator::{JobOutcome, Pipeline, PipelineConfig};
pub use pipeline::sink::{CollectorSink, EventSink, NdjsonSink};
pub use pipeline::state::JobState;

// Building blocks
pub use job::{ConversationJob, HistoryTurn, VoiceProfile};
pub use producer::{ChunkProducer, ChunkResult};
pub use readiness::{ReadinessConfig, ReadinessVerifier};
pub use segmenter::{Segmenter, SegmenterConfig, TextChunk};

// Error handling
pub use error::{LipstreamError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
