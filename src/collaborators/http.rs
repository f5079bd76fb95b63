//! HTTP clients for the GPU inference service.
//!
//! One service hosts synthesis (`/tts/generate`), rendering
//! (`/avatar/generate`) and `/health`. Speech recognition and the language
//! model may live on separate hosts with the same request/response shape:
//! JSON in, JSON out, `success` plus an optional `error` string.

use super::{Renderer, Responder, SynthesizedAudio, Synthesizer, Transcriber, Transcript};
use crate::error::{LipstreamError, Result};
use crate::job::HistoryTurn;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rendering mode understood by the avatar endpoint.
const AVATAR_MODE: &str = "sadtalker";

/// Upper bound on generated response length.
const MAX_NEW_TOKENS: u32 = 256;

/// Map a job language to a code the TTS model accepts.
///
/// Unsupported languages fall back to English rather than failing the chunk.
pub fn tts_language(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "zh" | "zh-cn" => "zh-cn",
        "es" => "es",
        _ => "en",
    }
}

/// Shared JSON-over-HTTP plumbing.
#[derive(Debug, Clone)]
struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LipstreamError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn unavailable(&self, e: reqwest::Error) -> LipstreamError {
        LipstreamError::ServiceUnavailable {
            url: self.base_url.clone(),
            message: e.to_string(),
        }
    }

    /// POST `body` and decode the reply. HTTP-level errors are mapped with
    /// `stage_error`; transport errors become `ServiceUnavailable`.
    async fn post<B, R>(
        &self,
        endpoint: &str,
        body: &B,
        stage_error: fn(String) -> LipstreamError,
    ) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(endpoint);
        tracing::debug!(%url, "calling service");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !response.status().is_success() {
            return Err(stage_error(format!(
                "{} returned status {}",
                endpoint,
                response.status()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| stage_error(format!("invalid response from {}: {}", endpoint, e)))
    }
}

fn transcription_error(message: String) -> LipstreamError {
    LipstreamError::Transcription { message }
}

fn response_error(message: String) -> LipstreamError {
    LipstreamError::ResponseGeneration { message }
}

fn synthesis_error(message: String) -> LipstreamError {
    LipstreamError::Synthesis { message }
}

fn render_error(message: String) -> LipstreamError {
    LipstreamError::Render { message }
}

/// Turn a `success: false` reply into the stage's error.
fn require_success(
    success: bool,
    error: Option<String>,
    stage_error: fn(String) -> LipstreamError,
) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(stage_error(
            error.unwrap_or_else(|| "service reported failure".to_string()),
        ))
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    language: &'a str,
    speaker_wav: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    success: bool,
    audio_path: Option<PathBuf>,
    #[serde(default)]
    duration_s: f64,
    #[serde(default)]
    generation_time_ms: f64,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AvatarRequest<'a> {
    audio_path: String,
    reference_image: String,
    mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    enhancer: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AvatarResponse {
    success: bool,
    video_path: Option<PathBuf>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AsrRequest<'a> {
    audio_path: String,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct AsrResponse {
    success: bool,
    #[serde(default)]
    text: String,
    language: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LlmRequest<'a> {
    prompt: &'a str,
    history: &'a [HistoryTurn],
    max_new_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    success: bool,
    #[serde(default)]
    text: String,
    error: Option<String>,
}

/// Reply from `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub models: ModelStatus,
}

/// Which models the GPU service has loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    #[serde(default)]
    pub tts: bool,
    #[serde(default)]
    pub avatar: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.models.tts && self.models.avatar
    }
}

/// Client for the GPU service: synthesis, rendering and health.
#[derive(Debug, Clone)]
pub struct GpuServiceClient {
    service: ServiceClient,
}

impl GpuServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new(base_url, timeout)?,
        })
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.service.url("/health");
        let response = self
            .service
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.service.unavailable(e))?;

        if !response.status().is_success() {
            return Err(LipstreamError::ServiceUnavailable {
                url,
                message: format!("status {}", response.status()),
            });
        }

        response
            .json::<HealthReport>()
            .await
            .map_err(|e| self.service.unavailable(e))
    }
}

#[async_trait]
impl Synthesizer for GpuServiceClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&Path>,
        language: &str,
    ) -> Result<SynthesizedAudio> {
        let request = TtsRequest {
            text,
            language: tts_language(language),
            speaker_wav: voice.map(|p| p.display().to_string()),
        };
        let reply: TtsResponse = self
            .service
            .post("/tts/generate", &request, synthesis_error)
            .await?;
        require_success(reply.success, reply.error, synthesis_error)?;

        let path = reply
            .audio_path
            .ok_or_else(|| synthesis_error("response has no audio_path".to_string()))?;
        tracing::debug!(
            path = %path.display(),
            duration_s = reply.duration_s,
            generation_ms = reply.generation_time_ms,
            "speech synthesized"
        );
        Ok(SynthesizedAudio {
            path,
            duration: Duration::from_secs_f64(reply.duration_s.max(0.0)),
        })
    }

    fn name(&self) -> &str {
        "gpu-tts"
    }
}

#[async_trait]
impl Renderer for GpuServiceClient {
    async fn render(&self, audio: &Path, image: &Path) -> Result<PathBuf> {
        let request = AvatarRequest {
            audio_path: audio.display().to_string(),
            reference_image: image.display().to_string(),
            mode: AVATAR_MODE,
            enhancer: None,
        };
        let reply: AvatarResponse = self
            .service
            .post("/avatar/generate", &request, render_error)
            .await?;
        require_success(reply.success, reply.error, render_error)?;

        reply
            .video_path
            .ok_or_else(|| render_error("response has no video_path".to_string()))
    }

    fn name(&self) -> &str {
        "gpu-avatar"
    }
}

/// Speech recognition client.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    service: ServiceClient,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript> {
        let request = AsrRequest {
            audio_path: audio.display().to_string(),
            language,
        };
        let reply: AsrResponse = self
            .service
            .post("/asr/transcribe", &request, transcription_error)
            .await?;
        require_success(reply.success, reply.error, transcription_error)?;

        Ok(Transcript {
            text: reply.text.trim().to_string(),
            language: reply.language.unwrap_or_else(|| language.to_string()),
        })
    }

    fn name(&self) -> &str {
        "http-asr"
    }
}

/// Language model client.
#[derive(Debug, Clone)]
pub struct HttpResponder {
    service: ServiceClient,
}

impl HttpResponder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, text: &str, history: &[HistoryTurn]) -> Result<String> {
        let request = LlmRequest {
            prompt: text,
            history,
            max_new_tokens: MAX_NEW_TOKENS,
        };
        let reply: LlmResponse = self
            .service
            .post("/llm/generate", &request, response_error)
            .await?;
        require_success(reply.success, reply.error, response_error)?;
        Ok(reply.text.trim().to_string())
    }

    fn name(&self) -> &str {
        "http-llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tts_language_mapping() {
        assert_eq!(tts_language("en"), "en");
        assert_eq!(tts_language("zh"), "zh-cn");
        assert_eq!(tts_language("zh-CN"), "zh-cn");
        assert_eq!(tts_language("es"), "es");
        assert_eq!(tts_language("fr"), "en");
        assert_eq!(tts_language(""), "en");
    }

    #[test]
    fn tts_request_wire_format() {
        let request = TtsRequest {
            text: "Hello there.",
            language: "en",
            speaker_wav: Some("/voices/alice.wav".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"text":"Hello there.","language":"en","speaker_wav":"/voices/alice.wav"}"#
        );
    }

    #[test]
    fn avatar_request_omits_missing_enhancer() {
        let request = AvatarRequest {
            audio_path: "/out/tts.wav".to_string(),
            reference_image: "/img/bruce.jpg".to_string(),
            mode: AVATAR_MODE,
            enhancer: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"audio_path":"/out/tts.wav","reference_image":"/img/bruce.jpg","mode":"sadtalker"}"#
        );
    }

    #[test]
    fn llm_request_carries_history() {
        let history = [HistoryTurn::user("hi"), HistoryTurn::assistant("hello")];
        let request = LlmRequest {
            prompt: "how are you?",
            history: &history,
            max_new_tokens: 64,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["history"][0]["role"], "user");
        assert_eq!(json["history"][1]["content"], "hello");
        assert_eq!(json["max_new_tokens"], 64);
    }

    #[test]
    fn tts_response_parses_failure() {
        let reply: TtsResponse =
            serde_json::from_str(r#"{"success":false,"error":"CUDA out of memory"}"#).unwrap();
        let err = require_success(reply.success, reply.error, synthesis_error).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Speech synthesis failed: CUDA out of memory"
        );
    }

    #[test]
    fn failure_without_message_gets_generic_text() {
        let err = require_success(false, None, render_error).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Avatar render failed: service reported failure"
        );
    }

    #[test]
    fn health_report_parses() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"healthy","device":"cuda","models":{"tts":true,"avatar":true}}"#,
        )
        .unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.device.as_deref(), Some("cuda"));

        let degraded: HealthReport =
            serde_json::from_str(r#"{"status":"healthy","models":{"tts":true}}"#).unwrap();
        assert!(!degraded.is_healthy());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GpuServiceClient::new("http://gpu:8001/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.service.url("/health"), "http://gpu:8001/health");
    }

    #[tokio::test]
    async fn unreachable_service_is_reported() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = GpuServiceClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client
            .synthesize("hello", None, "en")
            .await
            .unwrap_err();
        assert!(
            matches!(err, LipstreamError::ServiceUnavailable { .. }),
            "unexpected error: {err}"
        );
    }
}
