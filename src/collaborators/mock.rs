//! In-process collaborators for tests and `--dry-run`.
//!
//! Synthesizer and renderer write real files so the readiness check has
//! something to look at. Every mock can be told to fail, and synthesis and
//! rendering can record into a shared [`CallLog`] so tests can assert on
//! ordering.

use super::{Renderer, Responder, SynthesizedAudio, Synthesizer, Transcriber, Transcript};
use crate::error::{LipstreamError, Result};
use crate::job::HistoryTurn;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

/// Transcriber returning a fixed transcript.
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    text: String,
    language: Option<String>,
    should_fail: bool,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            text: "mock transcription".to_string(),
            language: None,
            should_fail: false,
        }
    }

    pub fn with_response(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Report this language instead of echoing the requested one.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &Path, language: &str) -> Result<Transcript> {
        if self.should_fail {
            return Err(LipstreamError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        Ok(Transcript {
            text: self.text.clone(),
            language: self
                .language
                .clone()
                .unwrap_or_else(|| language.to_string()),
        })
    }

    fn name(&self) -> &str {
        "mock-transcriber"
    }
}

/// Responder returning a fixed answer and remembering the history it saw.
#[derive(Debug, Default)]
pub struct MockResponder {
    response: Option<String>,
    should_fail: bool,
    histories: Mutex<Vec<Vec<HistoryTurn>>>,
}

impl MockResponder {
    /// Without a configured response the mock answers `"You said: <text>"`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// History passed on each call, in call order.
    pub fn histories(&self) -> Vec<Vec<HistoryTurn>> {
        lock(&self.histories).clone()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(&self, text: &str, history: &[HistoryTurn]) -> Result<String> {
        lock(&self.histories).push(history.to_vec());
        if self.should_fail {
            return Err(LipstreamError::ResponseGeneration {
                message: "mock responder failure".to_string(),
            });
        }
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| format!("You said: {}", text)))
    }

    fn name(&self) -> &str {
        "mock-responder"
    }
}

/// Synthesizer writing placeholder audio files.
#[derive(Debug)]
pub struct MockSynthesizer {
    output_dir: PathBuf,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    log: Option<CallLog>,
}

impl MockSynthesizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fail_on_call: None,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            log: None,
        }
    }

    /// Fail the `n`th call (1-based).
    pub fn with_failure_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Texts synthesized so far, in call order.
    pub fn texts(&self) -> Vec<String> {
        lock(&self.texts).clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: Option<&Path>,
        _language: &str,
    ) -> Result<SynthesizedAudio> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.texts).push(text.to_string());
        if let Some(log) = &self.log {
            log.record(format!("synthesize:{}", call));
        }
        if self.fail_on_call == Some(call) {
            return Err(LipstreamError::Synthesis {
                message: format!("mock synthesis failure on call {}", call),
            });
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("tts_{:03}.wav", call));
        tokio::fs::write(&path, text.as_bytes()).await?;

        // Roughly 15 characters per second of speech.
        let duration = Duration::from_millis(text.chars().count() as u64 * 1000 / 15);
        Ok(SynthesizedAudio { path, duration })
    }

    fn name(&self) -> &str {
        "mock-synthesizer"
    }
}

/// How the mock renderer writes its output.
#[derive(Debug, Clone, Copy, PartialEq)]
enum WriteMode {
    /// Whole file written before `render` returns.
    Immediate,
    /// `render` returns at once; a background task appends `steps` pieces,
    /// `interval` apart.
    Growing { steps: usize, interval: Duration },
}

/// Renderer writing placeholder video files.
#[derive(Debug)]
pub struct MockRenderer {
    output_dir: PathBuf,
    fail_on_call: Option<usize>,
    delay: Duration,
    write_mode: WriteMode,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Option<CallLog>,
}

impl MockRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fail_on_call: None,
            delay: Duration::ZERO,
            write_mode: WriteMode::Immediate,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Fail the `n`th call (1-based).
    pub fn with_failure_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Simulated render time before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return before the file is complete and keep appending in the
    /// background, like a renderer that flushes asynchronously.
    pub fn with_growing_output(mut self, steps: usize, interval: Duration) -> Self {
        self.write_mode = WriteMode::Growing { steps, interval };
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `render` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn render_inner(&self, call: usize, audio: &Path) -> Result<PathBuf> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on_call == Some(call) {
            return Err(LipstreamError::Render {
                message: format!("mock render failure on call {}", call),
            });
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("avatar_{:03}.mp4", call));
        let frame = format!("frame for {}\n", audio.display()).into_bytes();

        match self.write_mode {
            WriteMode::Immediate => {
                tokio::fs::write(&path, &frame).await?;
            }
            WriteMode::Growing { steps, interval } => {
                let mut file = tokio::fs::File::create(&path).await?;
                tokio::spawn(async move {
                    for _ in 0..steps {
                        if file.write_all(&frame).await.is_err() || file.flush().await.is_err() {
                            break;
                        }
                        tokio::time::sleep(interval).await;
                    }
                });
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, audio: &Path, _image: &Path) -> Result<PathBuf> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.record(format!("render:{}", call));
        }

        let result = self.render_inner(call, audio).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "mock-renderer"
    }
}
