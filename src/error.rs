//! Error types for lipstream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LipstreamError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Job input errors
    #[error("Invalid job request: {message}")]
    InvalidRequest { message: String },

    // Collaborator errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Response generation failed: {message}")]
    ResponseGeneration { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Avatar render failed: {message}")]
    Render { message: String },

    #[error("Service unavailable at {url}: {message}")]
    ServiceUnavailable { url: String, message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl LipstreamError {
    /// Name of the collaborator that produced this error, if any.
    ///
    /// Used to label failure events so clients can tell which stage broke.
    pub fn collaborator(&self) -> Option<&'static str> {
        match self {
            Self::Transcription { .. } => Some("transcriber"),
            Self::ResponseGeneration { .. } => Some("responder"),
            Self::Synthesis { .. } => Some("synthesizer"),
            Self::Render { .. } => Some("renderer"),
            Self::ServiceUnavailable { .. } => Some("service"),
            _ => None,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LipstreamError>;
