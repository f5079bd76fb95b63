//! External capabilities the pipeline drives but does not implement.
//!
//! Speech recognition, response generation, speech synthesis and avatar
//! rendering all run elsewhere (usually a GPU service). The pipeline only
//! sees these traits, so tests and dry runs can substitute [`mock`] versions.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

use crate::error::Result;
use crate::job::HistoryTurn;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recognized speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// Language the recognizer detected or was told to use.
    pub language: String,
}

/// Output of speech synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub duration: Duration,
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript>;

    fn name(&self) -> &str;
}

/// Produces the answer to speak.
///
/// Optional: without one the pipeline echoes the transcript.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, text: &str, history: &[HistoryTurn]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Text-to-speech, optionally cloning a reference voice.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&Path>,
        language: &str,
    ) -> Result<SynthesizedAudio>;

    fn name(&self) -> &str;
}

/// Lip-synced avatar video from audio and a still image.
///
/// Implementations may return before the video file is fully written.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, audio: &Path, image: &Path) -> Result<PathBuf>;

    fn name(&self) -> &str;
}
