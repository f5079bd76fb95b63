//! Application wiring.
//!
//! Turns a [`Config`] into collaborators, a chunk producer and a pipeline,
//! and runs the CLI's job-oriented commands on top of them.

#[cfg(feature = "http")]
use crate::collaborators::http::{GpuServiceClient, HttpResponder, HttpTranscriber};
use crate::collaborators::mock::{MockRenderer, MockResponder, MockSynthesizer, MockTranscriber};
use crate::collaborators::{Renderer, Responder, Synthesizer, Transcriber};
use crate::config::{AssetsConfig, Config, LogConfig};
use crate::error::{LipstreamError, Result};
use crate::ipc::client::submit_job;
use crate::ipc::protocol::{JobRequest, WireEvent};
use crate::ipc::server::JobServer;
use crate::job::{AssetResolver, ConversationJob};
use crate::output::{TerminalSink, render_event};
use crate::pipeline::events::{Emitter, Sequencer};
use crate::pipeline::orchestrator::{JobOutcome, Pipeline, PipelineConfig};
use crate::pipeline::sink::{EventSink, NdjsonSink};
use crate::producer::ChunkProducer;
use crate::readiness::ReadinessVerifier;
use crate::segmenter::{Segmenter, SegmenterConfig, TextChunk};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise `tracing` once for the process.
///
/// `RUST_LOG` wins over everything; otherwise `-v`/`-vv` raise the configured
/// level to debug/trace. Logs go to stderr so `--json` event output on stdout
/// stays clean.
pub fn init_logging(config: &LogConfig, verbose: u8) {
    let level = match verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("warn,lipstream={}", level).into());

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("Logging already initialised: {}", e);
    }
}

/// The four external capabilities a pipeline needs.
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub responder: Option<Arc<dyn Responder>>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub renderer: Arc<dyn Renderer>,
}

impl Collaborators {
    /// In-process stand-ins writing placeholder files to the output directory.
    pub fn mock(config: &Config) -> Self {
        let output_dir = &config.assets.output_dir;
        Self {
            transcriber: Arc::new(MockTranscriber::new()),
            responder: Some(Arc::new(MockResponder::new())),
            synthesizer: Arc::new(MockSynthesizer::new(output_dir)),
            renderer: Arc::new(MockRenderer::new(output_dir)),
        }
    }

    /// Clients for the configured services. Without an LLM URL the pipeline
    /// runs in echo mode.
    #[cfg(feature = "http")]
    pub fn from_services(config: &Config) -> Result<Self> {
        let services = &config.services;
        let timeout = services.request_timeout();
        let gpu = GpuServiceClient::new(&services.gpu_service_url, timeout)?;
        let responder = match &services.llm_url {
            Some(url) => Some(Arc::new(HttpResponder::new(url, timeout)?) as Arc<dyn Responder>),
            None => {
                tracing::warn!("no LLM URL configured; responses will echo the transcript");
                None
            }
        };
        Ok(Self {
            transcriber: Arc::new(HttpTranscriber::new(services.asr_url(), timeout)?),
            responder,
            synthesizer: Arc::new(gpu.clone()),
            renderer: Arc::new(gpu),
        })
    }

    #[cfg(not(feature = "http"))]
    pub fn from_services(_config: &Config) -> Result<Self> {
        Err(LipstreamError::Other(
            "built without the `http` feature; only --dry-run is available".to_string(),
        ))
    }
}

/// Build a pipeline from configuration.
pub fn build_pipeline(config: &Config, dry_run: bool) -> Result<Pipeline> {
    let collaborators = if dry_run {
        std::fs::create_dir_all(&config.assets.output_dir)?;
        Collaborators::mock(config)
    } else {
        Collaborators::from_services(config)?
    };
    Ok(assemble(config, collaborators))
}

/// Wire collaborators into a pipeline sharing one chunk producer.
pub fn assemble(config: &Config, collaborators: Collaborators) -> Pipeline {
    let producer = ChunkProducer::new(
        collaborators.synthesizer,
        collaborators.renderer,
        ReadinessVerifier::new(config.readiness.clone()),
    );
    let pipeline = Pipeline::new(
        collaborators.transcriber,
        Arc::new(producer),
        AssetResolver::new(&config.assets),
        PipelineConfig {
            segmenter: config.segmenter.clone(),
            media_url_prefix: config.server.media_url_prefix.clone(),
        },
    );
    match collaborators.responder {
        Some(responder) => pipeline.with_responder(responder),
        None => pipeline,
    }
}

/// Options for a single job coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub audio: PathBuf,
    pub language: Option<String>,
    pub history_file: Option<PathBuf>,
    pub reference_image: Option<String>,
    pub voice_sample: Option<String>,
    pub json: bool,
}

impl JobOptions {
    fn request(&self) -> Result<JobRequest> {
        let mut request = JobRequest::new(&self.audio);
        request.language = self.language.clone();
        request.reference_image = self.reference_image.clone();
        request.voice_sample = self.voice_sample.clone();
        if let Some(path) = &self.history_file {
            request.history = read_history(path)?;
        }
        Ok(request)
    }
}

/// Read a history file. Unreadable files are an error; contents that are not
/// JSON are ignored with a warning, like any other malformed history.
fn read_history(path: &Path) -> Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path).map_err(|e| LipstreamError::InvalidRequest {
        message: format!("cannot read history file {}: {}", path.display(), e),
    })?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "history file is not JSON; ignoring");
            Ok(serde_json::Value::Null)
        }
    }
}

/// Run one job in this process, printing its events.
pub async fn run_job_command(
    config: &Config,
    options: &JobOptions,
    dry_run: bool,
    quiet: bool,
) -> Result<JobOutcome> {
    let pipeline = build_pipeline(config, dry_run)?;
    let job: ConversationJob = options
        .request()?
        .into_job(&config.server.default_language);

    let sink: Box<dyn EventSink> = if options.json {
        Box::new(NdjsonSink::new(tokio::io::stdout()))
    } else {
        Box::new(TerminalSink::new(quiet))
    };
    let mut emitter = Emitter::new(Arc::new(Sequencer::new()), sink);
    Ok(pipeline.run(job, &mut emitter).await)
}

/// Serve jobs on a Unix socket until Ctrl-C.
pub async fn run_serve_command(
    config: &Config,
    socket: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let socket_path = socket
        .or_else(|| config.server.socket_path.clone())
        .unwrap_or_else(JobServer::default_socket_path);
    let pipeline = Arc::new(build_pipeline(config, dry_run)?);
    let server = JobServer::new(
        socket_path,
        pipeline,
        Arc::new(Sequencer::new()),
        config.server.default_language.clone(),
    );

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            server.stop().await
        }
    }
}

/// Send a job to a running server and print its events.
///
/// Returns the events received; the last one tells whether the job succeeded.
pub async fn run_submit_command(
    config: &Config,
    options: &JobOptions,
    socket: Option<PathBuf>,
    quiet: bool,
) -> Result<Vec<WireEvent>> {
    let socket_path = socket
        .or_else(|| config.server.socket_path.clone())
        .unwrap_or_else(JobServer::default_socket_path);
    let request = options.request()?;
    let json = options.json;

    submit_job(&socket_path, &request, |event| {
        if json {
            match event.to_json() {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "cannot print event"),
            }
        } else if !quiet || event.is_terminal() {
            render_event(event);
        }
    })
    .await
}

/// Reference images and voice samples a job can name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetListing {
    pub images: Vec<String>,
    pub samples: Vec<String>,
}

impl AssetListing {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LipstreamError::Other(e.to_string()))
    }
}

pub fn list_assets(config: &AssetsConfig) -> Result<AssetListing> {
    let resolver = AssetResolver::new(config);
    let images = resolver.list_images().map_err(|e| LipstreamError::ConfigInvalidValue {
        key: "assets.images_dir".to_string(),
        message: format!("cannot list {}: {}", config.images_dir.display(), e),
    })?;
    Ok(AssetListing {
        images,
        samples: resolver.list_voice_samples()?,
    })
}

/// Split `text` the way the pipeline would.
///
/// `--target` alone also caps the first chunk at the same size.
pub fn plan_segments(
    config: &SegmenterConfig,
    text: &str,
    target: Option<usize>,
    ceiling: Option<usize>,
) -> Result<Vec<TextChunk>> {
    let target_chars = target.unwrap_or(config.target_chars);
    let buffer_ceiling_chars = match (target, ceiling) {
        (_, Some(ceiling)) => ceiling,
        (Some(target), None) => target,
        (None, None) => config.buffer_ceiling_chars,
    };
    let segmenter_config = SegmenterConfig {
        target_chars,
        buffer_ceiling_chars,
        min_words: config.min_words,
    };
    if target_chars == 0 || buffer_ceiling_chars < target_chars {
        return Err(LipstreamError::ConfigInvalidValue {
            key: "segmenter".to_string(),
            message: format!(
                "ceiling ({}) must be at least target ({}) and target must be positive",
                buffer_ceiling_chars, target_chars
            ),
        });
    }
    Ok(Segmenter::new(segmenter_config).segment(text))
}
