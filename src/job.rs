//! Conversation jobs: one spoken utterance in, one streamed answer out.

use crate::config::AssetsConfig;
use crate::defaults;
use crate::error::{LipstreamError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Speaker of a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One earlier exchange passed to the responder for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parse client-supplied history.
///
/// History is optional context, so anything that is not an array of
/// `{role, content}` objects is dropped with a warning instead of failing
/// the job. `null` means no history and is not warned about.
pub fn parse_history(value: &serde_json::Value) -> Vec<HistoryTurn> {
    if value.is_null() {
        return Vec::new();
    }
    match serde_json::from_value::<Vec<HistoryTurn>>(value.clone()) {
        Ok(turns) => turns,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed conversation history");
            Vec::new()
        }
    }
}

/// The most recent turns, oldest first.
pub fn recent_history(history: &[HistoryTurn]) -> &[HistoryTurn] {
    let start = history.len().saturating_sub(defaults::MAX_HISTORY_TURNS);
    &history[start..]
}

/// Job ids look like `20240131_142501_1a2b3c4d`: sortable by start time,
/// unique thanks to the random suffix.
pub fn generate_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Everything needed to run one conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationJob {
    pub id: String,
    pub audio_path: PathBuf,
    pub language: String,
    pub history: Vec<HistoryTurn>,
    /// File name inside the images directory.
    pub reference_image: Option<String>,
    /// File name inside the voice samples directory.
    pub voice_sample: Option<String>,
}

impl ConversationJob {
    pub fn new(audio_path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            id: generate_job_id(),
            audio_path: audio_path.into(),
            language: language.into(),
            history: Vec::new(),
            reference_image: None,
            voice_sample: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_reference_image(mut self, name: impl Into<String>) -> Self {
        self.reference_image = Some(name.into());
        self
    }

    pub fn with_voice_sample(mut self, name: impl Into<String>) -> Self {
        self.voice_sample = Some(name.into());
        self
    }
}

/// Avatar and voice parameters shared by every chunk of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    pub reference_image: PathBuf,
    /// `None` lets the synthesizer use its built-in voice.
    pub voice_sample: Option<PathBuf>,
    pub language: String,
}

/// Image file extensions offered as reference images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Audio file extensions offered as voice samples.
const VOICE_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// Resolves job asset names against the configured directories.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    images_dir: PathBuf,
    voice_samples_dir: PathBuf,
    default_image: String,
    default_voice: Option<String>,
    speaker: String,
}

impl AssetResolver {
    pub fn new(config: &AssetsConfig) -> Self {
        Self {
            images_dir: config.images_dir.clone(),
            voice_samples_dir: config.voice_samples_dir.clone(),
            default_image: config.default_reference_image.clone(),
            default_voice: config.default_voice_sample.clone(),
            speaker: config.speaker.clone(),
        }
    }

    /// Build the voice profile for `job`.
    ///
    /// A missing reference image fails the job at the render stage. A missing
    /// voice sample only loses voice cloning, so it is logged and dropped.
    /// Without an explicit or configured sample, the speaker's sample for the
    /// job's language is used, then the English one.
    ///
    /// Asset names are plain file names; anything with a directory part is
    /// rejected as an invalid request.
    pub fn resolve(&self, job: &ConversationJob) -> Result<VoiceProfile> {
        let image_name = job.reference_image.as_deref().unwrap_or(&self.default_image);
        let reference_image = asset_path(&self.images_dir, image_name)?;
        if !reference_image.is_file() {
            return Err(LipstreamError::Render {
                message: format!("reference image not found: {}", reference_image.display()),
            });
        }

        let voice_sample = match job.voice_sample.as_deref().or(self.default_voice.as_deref()) {
            Some(name) => {
                let path = asset_path(&self.voice_samples_dir, name)?;
                if path.is_file() {
                    Some(path)
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        "voice sample not found, using the synthesizer's default voice"
                    );
                    None
                }
            }
            None => self.language_sample(&job.language),
        };

        Ok(VoiceProfile {
            reference_image,
            voice_sample,
            language: job.language.clone(),
        })
    }

    /// First existing `<speaker>_<lang>_sample.wav` for `language`.
    ///
    /// `zh-CN` tries `zh`, then `zh-cn`, then the fallback language.
    fn language_sample(&self, language: &str) -> Option<PathBuf> {
        let language = language.to_lowercase();
        let base = language.split('-').next().unwrap_or(language.as_str());
        let mut tags = vec![base, language.as_str(), defaults::FALLBACK_VOICE_LANGUAGE];
        tags.dedup();

        let found = tags
            .into_iter()
            .filter(|tag| !tag.is_empty())
            .map(|tag| {
                self.voice_samples_dir
                    .join(format!("{}_{}_sample.wav", self.speaker, tag))
            })
            .find(|path| path.is_file());
        if let Some(path) = &found {
            tracing::debug!(path = %path.display(), "using language voice sample");
        }
        found
    }

    /// Reference images available to jobs, sorted by name.
    pub fn list_images(&self) -> Result<Vec<String>> {
        list_files(&self.images_dir, IMAGE_EXTENSIONS)
    }

    /// Voice samples available to jobs, sorted by name. A missing samples
    /// directory just means there are none.
    pub fn list_voice_samples(&self) -> Result<Vec<String>> {
        if !self.voice_samples_dir.is_dir() {
            return Ok(Vec::new());
        }
        list_files(&self.voice_samples_dir, VOICE_EXTENSIONS)
    }
}

/// Join a client-supplied file name onto `dir`, refusing anything that could
/// leave it.
fn asset_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(dir.join(file)),
        _ => Err(LipstreamError::InvalidRequest {
            message: format!("asset name must be a plain file name: {:?}", name),
        }),
    }
}

fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()));
        if matches
            && path.is_file()
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
