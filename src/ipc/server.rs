//! Async Unix socket server running conversation jobs.

use crate::defaults;
use crate::error::{LipstreamError, Result};
use crate::ipc::protocol::JobRequest;
use crate::pipeline::events::{Emitter, PipelineEvent, Sequencer};
use crate::pipeline::orchestrator::Pipeline;
use crate::pipeline::sink::NdjsonSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// Everything a connection task needs.
struct JobContext {
    pipeline: Arc<Pipeline>,
    sequencer: Arc<Sequencer>,
    default_language: String,
    max_request_bytes: u64,
}

/// Accepts job requests on a Unix socket and streams their events back.
///
/// Each connection carries one job. Jobs run concurrently on their own tasks
/// and share one pipeline and one sequence counter.
pub struct JobServer {
    socket_path: PathBuf,
    state: ServerState,
    context: Arc<JobContext>,
}

impl JobServer {
    pub fn new(
        socket_path: PathBuf,
        pipeline: Arc<Pipeline>,
        sequencer: Arc<Sequencer>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            socket_path,
            state: ServerState::new(),
            context: Arc::new(JobContext {
                pipeline,
                sequencer,
                default_language: default_language.into(),
                max_request_bytes: defaults::MAX_REQUEST_BYTES,
            }),
        }
    }

    /// Reject request lines longer than `limit` bytes.
    pub fn with_max_request_bytes(mut self, limit: u64) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            context.max_request_bytes = limit;
        }
        self
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR")
            && !xdg_runtime.is_empty()
        {
            PathBuf::from(xdg_runtime).join(defaults::SOCKET_NAME)
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/lipstream-{}.sock", uid))
        }
    }

    /// Bind the socket and serve until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| LipstreamError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| LipstreamError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        tracing::info!(
            socket = %self.socket_path.display(),
            version = %crate::version_string(),
            "job server listening"
        );

        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept connection with timeout to check for shutdown
            let accept_result =
                tokio::time::timeout(tokio::time::Duration::from_millis(100), listener.accept())
                    .await;

            match accept_result {
                Ok(Ok((stream, _))) => {
                    let context = Arc::clone(&self.context);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, context).await {
                            tracing::warn!(error = %e, "client connection failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(LipstreamError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => {
                    // Timeout - check shutdown flag again
                    continue;
                }
            }
        }

        tracing::info!("job server stopped");
        Ok(())
    }

    /// Stop accepting jobs and remove the socket file.
    ///
    /// Jobs already running continue to completion.
    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| LipstreamError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Read one request line and stream the job's events back.
async fn handle_client(stream: UnixStream, context: Arc<JobContext>) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let limit = context.max_request_bytes;
    let mut reader = BufReader::new(reader.take(limit));
    let mut line = Vec::new();

    let read = reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(|e| LipstreamError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;
    if read == 0 {
        return Err(LipstreamError::IpcProtocol {
            message: "client closed before sending a request".to_string(),
        });
    }

    let mut emitter = Emitter::new(
        Arc::clone(&context.sequencer),
        Box::new(NdjsonSink::new(writer)),
    );

    let request = if !line.ends_with(b"\n") && read as u64 >= limit {
        Err(format!("request line exceeds {} bytes", limit))
    } else {
        String::from_utf8(line)
            .map_err(|e| e.to_string())
            .and_then(|line| JobRequest::from_json(line.trim()).map_err(|e| e.to_string()))
    };

    match request {
        Ok(request) => {
            let job = request.into_job(&context.default_language);
            let outcome = context.pipeline.run(job, &mut emitter).await;
            if !emitter.is_connected() {
                tracing::info!(
                    job_id = %outcome.job_id,
                    state = %outcome.state,
                    "client disconnected before the job finished"
                );
            }
        }
        Err(e) => {
            let error = LipstreamError::InvalidRequest { message: e };
            tracing::warn!(error = %error, "rejecting job request");
            emitter
                .emit(PipelineEvent::Failure {
                    message: error.to_string(),
                    job_id: String::new(),
                    elapsed_seconds: 0.0,
                })
                .await;
        }
    }

    Ok(())
}
