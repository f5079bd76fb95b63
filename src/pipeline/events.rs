//! Pipeline milestones and their emission order.

use crate::ipc::protocol::WireEvent;
use crate::pipeline::sink::EventSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One milestone of a job, as sent to the client.
///
/// Field names are the wire names. Durations are seconds with millisecond
/// precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Speech was recognized. `elapsed_seconds` is the recognition time.
    Transcription {
        text: String,
        language: String,
        elapsed_seconds: f64,
    },
    /// The answer to speak. `fallback` is set when the transcript was echoed
    /// because no responder is configured.
    #[serde(rename = "llm_response")]
    ResponseText {
        text: String,
        elapsed_seconds: f64,
        fallback: bool,
    },
    /// A chunk's video is ready. `elapsed_seconds` is that chunk's
    /// production time.
    #[serde(rename = "video_chunk")]
    ChunkReady {
        chunk_index: usize,
        text_chunk: String,
        media_url: String,
        elapsed_seconds: f64,
    },
    /// All chunks delivered.
    Complete {
        total_elapsed_seconds: f64,
        chunk_count: usize,
    },
    /// The job failed. Always the last event of a job.
    #[serde(rename = "error")]
    Failure {
        message: String,
        job_id: String,
        elapsed_seconds: f64,
    },
}

impl PipelineEvent {
    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transcription { .. } => "transcription",
            Self::ResponseText { .. } => "llm_response",
            Self::ChunkReady { .. } => "video_chunk",
            Self::Complete { .. } => "complete",
            Self::Failure { .. } => "error",
        }
    }

    /// True for the events that end a job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failure { .. })
    }
}

/// Duration as seconds rounded to the millisecond.
pub fn seconds(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Process-wide event sequence numbers, starting at 1.
#[derive(Debug)]
pub struct Sequencer {
    next: AtomicU64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamps events and hands them to a sink.
///
/// Numbers and timestamps are assigned at emission, so a job's events are
/// strictly increasing in `seq`. If the sink fails (the client went away)
/// the failure is logged once and later events are dropped; the job itself
/// keeps running.
pub struct Emitter {
    sequencer: Arc<Sequencer>,
    sink: Box<dyn EventSink>,
    sink_failed: bool,
    emitted: usize,
}

impl Emitter {
    pub fn new(sequencer: Arc<Sequencer>, sink: Box<dyn EventSink>) -> Self {
        Self {
            sequencer,
            sink,
            sink_failed: false,
            emitted: 0,
        }
    }

    pub async fn emit(&mut self, event: PipelineEvent) -> WireEvent {
        let stamped = WireEvent::stamp(self.sequencer.next(), event);
        self.emitted += 1;

        if !self.sink_failed
            && let Err(e) = self.sink.send(&stamped).await
        {
            tracing::warn!(
                sink = self.sink.name(),
                seq = stamped.seq,
                error = %e,
                "event sink failed, continuing without client"
            );
            self.sink_failed = true;
        }
        stamped
    }

    /// False once the sink has failed.
    pub fn is_connected(&self) -> bool {
        !self.sink_failed
    }

    /// Events emitted so far, delivered or not.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
