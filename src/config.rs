use crate::defaults;
use crate::error::{LipstreamError, Result};
use crate::readiness::ReadinessConfig;
use crate::segmenter::SegmenterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub segmenter: SegmenterConfig,
    pub readiness: ReadinessConfig,
    pub assets: AssetsConfig,
    pub services: ServicesConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Where reference images, voice samples and rendered output live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    pub images_dir: PathBuf,
    pub voice_samples_dir: PathBuf,
    pub default_reference_image: String,
    pub default_voice_sample: Option<String>,
    /// Speaker whose `<speaker>_<lang>_sample.wav` clips are used when no
    /// voice sample is chosen.
    pub speaker: String,
    pub output_dir: PathBuf,
}

/// Collaborator service endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
    /// Hosts `/tts/generate`, `/avatar/generate` and `/health`.
    pub gpu_service_url: String,
    /// Speech recognition service; falls back to `gpu_service_url`.
    pub asr_url: Option<String>,
    /// Language model service. When unset the pipeline echoes the transcript.
    pub llm_url: Option<String>,
    pub request_timeout_secs: u64,
}

/// Job server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: Option<PathBuf>,
    pub media_url_prefix: String,
    pub default_language: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Tracing filter directive, e.g. `info` or `lipstream=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("data/images"),
            voice_samples_dir: PathBuf::from("data/voice_samples"),
            default_reference_image: defaults::DEFAULT_REFERENCE_IMAGE.to_string(),
            default_voice_sample: None,
            speaker: defaults::DEFAULT_SPEAKER.to_string(),
            output_dir: PathBuf::from("data/outputs"),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            gpu_service_url: defaults::GPU_SERVICE_URL.to_string(),
            asr_url: None,
            llm_url: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            media_url_prefix: defaults::MEDIA_URL_PREFIX.to_string(),
            default_language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

impl ServicesConfig {
    /// Effective speech recognition endpoint.
    pub fn asr_url(&self) -> &str {
        self.asr_url.as_deref().unwrap_or(&self.gpu_service_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIPSTREAM_GPU_SERVICE_URL → services.gpu_service_url
    /// - LIPSTREAM_LLM_URL → services.llm_url
    /// - LIPSTREAM_LANGUAGE → server.default_language
    /// - LIPSTREAM_SOCKET → server.socket_path
    /// - LIPSTREAM_LOG → log.level
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("LIPSTREAM_GPU_SERVICE_URL")
            && !url.is_empty()
        {
            self.services.gpu_service_url = url;
        }

        if let Ok(url) = std::env::var("LIPSTREAM_LLM_URL")
            && !url.is_empty()
        {
            self.services.llm_url = Some(url);
        }

        if let Ok(language) = std::env::var("LIPSTREAM_LANGUAGE")
            && !language.is_empty()
        {
            self.server.default_language = language;
        }

        if let Ok(socket) = std::env::var("LIPSTREAM_SOCKET")
            && !socket.is_empty()
        {
            self.server.socket_path = Some(PathBuf::from(socket));
        }

        if let Ok(level) = std::env::var("LIPSTREAM_LOG")
            && !level.is_empty()
        {
            self.log.level = level;
        }

        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmenter;
        if seg.target_chars == 0 {
            return Err(invalid("segmenter.target_chars", "must be positive"));
        }
        if seg.buffer_ceiling_chars < seg.target_chars {
            return Err(invalid(
                "segmenter.buffer_ceiling_chars",
                "must not be smaller than segmenter.target_chars",
            ));
        }
        if seg.min_words == 0 {
            return Err(invalid("segmenter.min_words", "must be at least 1"));
        }
        if self.readiness.poll_interval_ms == 0 {
            return Err(invalid("readiness.poll_interval_ms", "must be positive"));
        }
        if self.services.request_timeout_secs == 0 {
            return Err(invalid("services.request_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Override the readiness timeout, e.g. from `--readiness-timeout`.
    pub fn set_readiness_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.readiness.timeout_ms = u64::try_from(timeout.as_millis())
            .map_err(|_| invalid("readiness.timeout_ms", "does not fit in 64-bit milliseconds"))?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lipstream/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lipstream")
            .join("config.toml")
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LipstreamError::ConfigParse {
            message: e.to_string(),
        })
    }
}

fn invalid(key: &str, message: &str) -> LipstreamError {
    LipstreamError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
