//! Default configuration constants for lipstream.
//!
//! Shared by the config structs, the CLI and the tests so every layer agrees
//! on the same numbers.

/// Soft upper bound, in characters, for every text chunk after the first.
pub const TARGET_CHUNK_CHARS: usize = 120;

/// Hard ceiling, in characters, for the buffered first chunk.
///
/// The first chunk absorbs as many leading sentences as fit so the client has
/// a longer clip to play while the next one renders.
pub const BUFFER_CEILING_CHARS: usize = 125;

/// Chunks with fewer words than this are folded into a neighbour when possible.
pub const MIN_CHUNK_WORDS: usize = 3;

/// How long to wait for a rendered artifact before advertising it anyway.
pub const READINESS_TIMEOUT_MS: u64 = 10_000;

/// Interval between existence checks while waiting for an artifact.
pub const READINESS_POLL_INTERVAL_MS: u64 = 100;

/// Gap between the two size samples that must agree before an artifact
/// counts as fully written.
pub const READINESS_STABILITY_DELAY_MS: u64 = 200;

/// Base URL of the GPU service hosting synthesis and rendering.
pub const GPU_SERVICE_URL: &str = "http://127.0.0.1:8001";

/// Per-request timeout for collaborator HTTP calls, in seconds.
///
/// Rendering a chunk on a busy GPU can take minutes.
pub const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Reference image used when a job does not choose one.
pub const DEFAULT_REFERENCE_IMAGE: &str = "bruce_neutral.jpg";

/// Speaker name used to find per-language voice samples.
pub const DEFAULT_SPEAKER: &str = "bruce";

/// Voice sample language tried when none matches the job's language.
pub const FALLBACK_VOICE_LANGUAGE: &str = "en";

/// Language used when a job does not specify one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// URL prefix under which rendered media is served.
pub const MEDIA_URL_PREFIX: &str = "/api/v1/videos";

/// Only this many most recent history turns are passed to the responder.
pub const MAX_HISTORY_TURNS: usize = 2;

/// Default tracing filter when neither `RUST_LOG` nor config sets one.
pub const LOG_LEVEL: &str = "info";

/// Upper bound on one job request line, history included.
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// Socket file name inside `$XDG_RUNTIME_DIR`.
pub const SOCKET_NAME: &str = "lipstream.sock";
