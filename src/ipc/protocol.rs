//! JSON messages exchanged over the job socket.
//!
//! The client sends one [`JobRequest`] line; the server answers with one
//! [`WireEvent`] line per pipeline milestone until a terminal event.

use crate::job::{ConversationJob, parse_history};
use crate::pipeline::events::PipelineEvent;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A request to run one conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Recorded user speech, readable by the server.
    pub audio_path: PathBuf,
    /// Defaults to the server's configured language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Earlier turns as `[{"role": "user"|"assistant", "content": "..."}]`.
    /// Kept as raw JSON so a malformed history degrades instead of
    /// rejecting the whole request.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub history: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_sample: Option<String>,
    /// Client-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl JobRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            language: None,
            history: serde_json::Value::Null,
            reference_image: None,
            voice_sample: None,
            job_id: None,
        }
    }

    /// Serialize request to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize request from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Build the job, filling unset fields from server defaults.
    pub fn into_job(self, default_language: &str) -> ConversationJob {
        let language = self
            .language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| default_language.to_string());
        let mut job =
            ConversationJob::new(self.audio_path, language).with_history(parse_history(&self.history));
        if let Some(id) = self.job_id.filter(|id| !id.is_empty()) {
            job = job.with_id(id);
        }
        job.reference_image = self.reference_image;
        job.voice_sample = self.voice_sample;
        job
    }
}

/// A pipeline event as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Process-wide, strictly increasing.
    pub seq: u64,
    /// UTC send time, RFC 3339 with milliseconds.
    pub timestamp: String,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

impl WireEvent {
    /// Attach a sequence number and the current time.
    pub fn stamp(seq: u64, event: PipelineEvent) -> Self {
        Self {
            seq,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }

    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::HistoryTurn;
    use serde_json::json;

    fn fixed(seq: u64, event: PipelineEvent) -> WireEvent {
        WireEvent {
            seq,
            timestamp: "2025-03-01T12:00:00.250Z".to_string(),
            event,
        }
    }

    #[test]
    fn video_chunk_wire_format() {
        let event = fixed(
            7,
            PipelineEvent::ChunkReady {
                chunk_index: 2,
                text_chunk: "It works.".to_string(),
                media_url: "/api/v1/videos/avatar_002.mp4".to_string(),
                elapsed_seconds: 4.5,
            },
        );
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"seq":7,"timestamp":"2025-03-01T12:00:00.250Z","type":"video_chunk","chunk_index":2,"text_chunk":"It works.","media_url":"/api/v1/videos/avatar_002.mp4","elapsed_seconds":4.5}"#
        );
    }

    #[test]
    fn transcription_wire_format() {
        let event = fixed(
            1,
            PipelineEvent::Transcription {
                text: "hello".to_string(),
                language: "en".to_string(),
                elapsed_seconds: 0.8,
            },
        );
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"seq":1,"timestamp":"2025-03-01T12:00:00.250Z","type":"transcription","text":"hello","language":"en","elapsed_seconds":0.8}"#
        );
    }

    #[test]
    fn llm_response_wire_format() {
        let event = fixed(
            2,
            PipelineEvent::ResponseText {
                text: "hello".to_string(),
                elapsed_seconds: 0.0,
                fallback: true,
            },
        );
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"seq":2,"timestamp":"2025-03-01T12:00:00.250Z","type":"llm_response","text":"hello","elapsed_seconds":0.0,"fallback":true}"#
        );
    }

    #[test]
    fn complete_and_error_wire_format() {
        let complete = fixed(
            9,
            PipelineEvent::Complete {
                total_elapsed_seconds: 12.25,
                chunk_count: 3,
            },
        );
        assert_eq!(
            complete.to_json().unwrap(),
            r#"{"seq":9,"timestamp":"2025-03-01T12:00:00.250Z","type":"complete","total_elapsed_seconds":12.25,"chunk_count":3}"#
        );

        let error = fixed(
            10,
            PipelineEvent::Failure {
                message: "Transcription failed: no speech".to_string(),
                job_id: "20250301_120000_abcd1234".to_string(),
                elapsed_seconds: 0.5,
            },
        );
        assert_eq!(
            error.to_json().unwrap(),
            r#"{"seq":10,"timestamp":"2025-03-01T12:00:00.250Z","type":"error","message":"Transcription failed: no speech","job_id":"20250301_120000_abcd1234","elapsed_seconds":0.5}"#
        );
    }

    #[test]
    fn wire_event_parses_back() {
        let line = r#"{"seq":4,"timestamp":"2025-03-01T12:00:00.250Z","type":"complete","total_elapsed_seconds":1.0,"chunk_count":1}"#;
        let event = WireEvent::from_json(line).unwrap();
        assert_eq!(event.seq, 4);
        assert!(event.is_terminal());
    }

    #[test]
    fn stamp_uses_utc_millis() {
        let event = WireEvent::stamp(
            1,
            PipelineEvent::Complete {
                total_elapsed_seconds: 0.0,
                chunk_count: 0,
            },
        );
        assert!(event.timestamp.ends_with('Z'), "{}", event.timestamp);
        let parsed = chrono::DateTime::parse_from_rfc3339(&event.timestamp).unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn minimal_request_parses() {
        let request = JobRequest::from_json(r#"{"audio_path":"/tmp/q.wav"}"#).unwrap();
        assert_eq!(request, JobRequest::new("/tmp/q.wav"));
        assert_eq!(request.to_json().unwrap(), r#"{"audio_path":"/tmp/q.wav"}"#);
    }

    #[test]
    fn request_without_audio_path_is_rejected() {
        assert!(JobRequest::from_json(r#"{"language":"en"}"#).is_err());
        assert!(JobRequest::from_json("not json").is_err());
    }

    #[test]
    fn into_job_applies_defaults_and_overrides() {
        let request = JobRequest::from_json(
            &json!({
                "audio_path": "/tmp/q.wav",
                "history": [{"role": "user", "content": "hi"}],
                "reference_image": "alice.png",
                "job_id": "fixed-id"
            })
            .to_string(),
        )
        .unwrap();
        let job = request.into_job("es");
        assert_eq!(job.id, "fixed-id");
        assert_eq!(job.language, "es");
        assert_eq!(job.history, vec![HistoryTurn::user("hi")]);
        assert_eq!(job.reference_image.as_deref(), Some("alice.png"));
        assert_eq!(job.voice_sample, None);
    }

    #[test]
    fn into_job_tolerates_malformed_history() {
        let request = JobRequest::from_json(
            r#"{"audio_path":"/tmp/q.wav","language":"zh","history":"oops"}"#,
        )
        .unwrap();
        let job = request.into_job("en");
        assert_eq!(job.language, "zh");
        assert!(job.history.is_empty());
        assert!(!job.id.is_empty());
    }
}
