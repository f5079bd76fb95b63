//! Drives one job from audio to the last video chunk.

use crate::collaborators::{Responder, Transcriber};
use crate::defaults;
use crate::error::{LipstreamError, Result};
use crate::job::{AssetResolver, ConversationJob, recent_history};
use crate::pipeline::events::{Emitter, PipelineEvent, seconds};
use crate::pipeline::state::{JobState, JobTracker};
use crate::producer::ChunkProducer;
use crate::segmenter::{Segmenter, SegmenterConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunking bounds
    pub segmenter: SegmenterConfig,
    /// Prefix for advertised media URLs, e.g. `/api/v1/videos`
    pub media_url_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            media_url_prefix: defaults::MEDIA_URL_PREFIX.to_string(),
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    /// `Complete` or `Failed`.
    pub state: JobState,
    /// Chunks delivered before the job ended.
    pub chunk_count: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Complete
    }
}

/// Transcribe → respond → segment → produce each chunk, emitting an event
/// after every step.
///
/// One pipeline serves any number of concurrent jobs. They share the chunk
/// producer and therefore its single render slot.
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    responder: Option<Arc<dyn Responder>>,
    producer: Arc<ChunkProducer>,
    assets: AssetResolver,
    segmenter: Segmenter,
    media_url_prefix: String,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        producer: Arc<ChunkProducer>,
        assets: AssetResolver,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transcriber,
            responder: None,
            producer,
            assets,
            segmenter: Segmenter::new(config.segmenter),
            media_url_prefix: config.media_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Without a responder the transcript is echoed back.
    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Public URL for a rendered artifact.
    pub fn media_url(&self, artifact: &Path) -> String {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.display().to_string());
        format!("{}/{}", self.media_url_prefix, name)
    }

    /// Run `job` to completion, sending every milestone through `emitter`.
    ///
    /// Never returns an error: failures become the job's final `error` event
    /// and are reported in the outcome.
    pub async fn run(&self, job: ConversationJob, emitter: &mut Emitter) -> JobOutcome {
        let span = tracing::info_span!("job", job_id = %job.id);
        self.run_job(job, emitter).instrument(span).await
    }

    async fn run_job(&self, job: ConversationJob, emitter: &mut Emitter) -> JobOutcome {
        let started = Instant::now();
        let mut tracker = JobTracker::new();
        let mut delivered = 0;
        tracing::info!(
            audio = %job.audio_path.display(),
            language = %job.language,
            history_turns = job.history.len(),
            "job received"
        );

        let result = self
            .drive(&job, emitter, &mut tracker, &mut delivered)
            .await;
        let elapsed = started.elapsed();

        let error = match result {
            Ok(()) => {
                tracker.advance(JobState::Complete);
                emitter
                    .emit(PipelineEvent::Complete {
                        total_elapsed_seconds: seconds(elapsed),
                        chunk_count: delivered,
                    })
                    .await;
                tracing::info!(
                    chunks = delivered,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job complete"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    collaborator = e.collaborator().unwrap_or("pipeline"),
                    state = %tracker.state(),
                    chunks = delivered,
                    "job failed"
                );
                tracker.advance(JobState::Failed);
                let message = e.to_string();
                emitter
                    .emit(PipelineEvent::Failure {
                        message: message.clone(),
                        job_id: job.id.clone(),
                        elapsed_seconds: seconds(elapsed),
                    })
                    .await;
                Some(message)
            }
        };

        JobOutcome {
            job_id: job.id,
            state: tracker.state(),
            chunk_count: delivered,
            elapsed,
            error,
        }
    }

    async fn drive(
        &self,
        job: &ConversationJob,
        emitter: &mut Emitter,
        tracker: &mut JobTracker,
        delivered: &mut usize,
    ) -> Result<()> {
        let step = Instant::now();
        let transcript = self
            .transcriber
            .transcribe(&job.audio_path, &job.language)
            .await?;
        tracker.advance(JobState::Transcribed);
        tracing::info!(
            transcriber = self.transcriber.name(),
            chars = transcript.text.len(),
            language = %transcript.language,
            "transcribed"
        );
        emitter
            .emit(PipelineEvent::Transcription {
                text: transcript.text.clone(),
                language: transcript.language.clone(),
                elapsed_seconds: seconds(step.elapsed()),
            })
            .await;

        let step = Instant::now();
        let (response, fallback) = match &self.responder {
            Some(responder) => {
                let text = responder
                    .respond(&transcript.text, recent_history(&job.history))
                    .await?;
                (text, false)
            }
            None => {
                tracing::info!("no responder configured, echoing transcript");
                (transcript.text.clone(), true)
            }
        };
        tracker.advance(JobState::Responded);
        emitter
            .emit(PipelineEvent::ResponseText {
                text: response.clone(),
                elapsed_seconds: seconds(step.elapsed()),
                fallback,
            })
            .await;

        let chunks = self.segmenter.segment(&response);
        if chunks.is_empty() {
            return Err(LipstreamError::ResponseGeneration {
                message: "response text is empty".to_string(),
            });
        }
        let voice = self.assets.resolve(job)?;
        tracing::info!(
            chunks = chunks.len(),
            first_chunk_chars = chunks[0].char_len(),
            "response segmented"
        );

        let total = chunks.len();
        for chunk in &chunks {
            tracker.advance(JobState::Emitting { chunk: chunk.index });
            let result = self.producer.produce(chunk, &voice).await?;
            *delivered += 1;
            tracing::info!(
                chunk = chunk.index,
                of = total,
                latency_ms = result.latency.as_millis() as u64,
                verified = result.verified,
                "chunk ready"
            );
            emitter
                .emit(PipelineEvent::ChunkReady {
                    chunk_index: result.chunk_index,
                    media_url: self.media_url(&result.artifact),
                    text_chunk: result.text,
                    elapsed_seconds: seconds(result.latency),
                })
                .await;
        }
        Ok(())
    }
}
