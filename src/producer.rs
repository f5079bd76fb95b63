//! Turns one text chunk into one verified video artifact.

use crate::collaborators::{Renderer, Synthesizer};
use crate::error::{LipstreamError, Result};
use crate::job::VoiceProfile;
use crate::readiness::ReadinessVerifier;
use crate::segmenter::TextChunk;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// A produced chunk, ready to advertise.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub chunk_index: usize,
    /// Video file written by the renderer. Never modified after this point.
    pub artifact: PathBuf,
    pub text: String,
    /// Wall time from the produce call to a verified artifact, including any
    /// wait for the render slot.
    pub latency: Duration,
    /// Length of the synthesized speech.
    pub audio_duration: Duration,
    /// False when readiness could not be confirmed before the timeout.
    pub verified: bool,
}

/// Synthesize → render → verify, one chunk at a time.
///
/// The renderer can only work on one request at a time, so a producer owns a
/// single permit and holds it for the whole chunk. Share one producer (behind
/// an `Arc`) between all jobs that use the same renderer.
pub struct ChunkProducer {
    synthesizer: Arc<dyn Synthesizer>,
    renderer: Arc<dyn Renderer>,
    verifier: ReadinessVerifier,
    render_slot: Semaphore,
}

impl ChunkProducer {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        renderer: Arc<dyn Renderer>,
        verifier: ReadinessVerifier,
    ) -> Self {
        Self {
            synthesizer,
            renderer,
            verifier,
            render_slot: Semaphore::new(1),
        }
    }

    /// Produce `chunk`. Any collaborator error aborts the chunk; nothing is
    /// retried. A readiness timeout is logged and the artifact is returned
    /// unverified.
    pub async fn produce(&self, chunk: &TextChunk, voice: &VoiceProfile) -> Result<ChunkResult> {
        let started = Instant::now();
        let _permit = self
            .render_slot
            .acquire()
            .await
            .map_err(|_| LipstreamError::Render {
                message: "render slot closed".to_string(),
            })?;
        tracing::debug!(
            chunk = chunk.index,
            queued_ms = started.elapsed().as_millis() as u64,
            "render slot acquired"
        );

        let audio = self
            .synthesizer
            .synthesize(&chunk.text, voice.voice_sample.as_deref(), &voice.language)
            .await?;
        tracing::debug!(
            chunk = chunk.index,
            synthesizer = self.synthesizer.name(),
            audio = %audio.path.display(),
            "speech ready"
        );

        let artifact = self
            .renderer
            .render(&audio.path, &voice.reference_image)
            .await?;

        let verified = self.verifier.wait_until_ready(&artifact).await;
        if !verified {
            tracing::warn!(
                chunk = chunk.index,
                path = %artifact.display(),
                timeout_ms = self.verifier.config().timeout_ms,
                "artifact not confirmed stable, advertising anyway"
            );
        }

        Ok(ChunkResult {
            chunk_index: chunk.index,
            artifact,
            text: chunk.text.clone(),
            latency: started.elapsed(),
            audio_duration: audio.duration,
            verified,
        })
    }
}
