//! IPC client for submitting jobs to a running server.

use crate::error::{LipstreamError, Result};
use crate::ipc::protocol::{JobRequest, WireEvent};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Submit a job and follow its events until the terminal one.
///
/// `on_event` sees every event as soon as it arrives; all of them are also
/// returned in arrival order.
///
/// # Errors
/// Returns `LipstreamError::IpcConnection` if the server is unreachable or the
/// stream ends before a terminal event.
/// Returns `LipstreamError::IpcProtocol` if a line cannot be (de)serialized.
pub async fn submit_job<F>(
    socket_path: &Path,
    request: &JobRequest,
    mut on_event: F,
) -> Result<Vec<WireEvent>>
where
    F: FnMut(&WireEvent),
{
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| LipstreamError::IpcConnection {
                message: format!("Failed to connect to server: {}", e),
            })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_json = request.to_json().map_err(|e| LipstreamError::IpcProtocol {
        message: format!("Failed to serialize request: {}", e),
    })?;
    request_json.push('\n');

    writer
        .write_all(request_json.as_bytes())
        .await
        .map_err(|e| LipstreamError::IpcConnection {
            message: format!("Failed to write request: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| LipstreamError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    let mut events = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| LipstreamError::IpcConnection {
                message: format!("Failed to read event: {}", e),
            })?;
        if read == 0 {
            return Err(LipstreamError::IpcConnection {
                message: format!(
                    "server closed the stream after {} events without finishing the job",
                    events.len()
                ),
            });
        }
        if line.trim().is_empty() {
            continue;
        }

        let event =
            WireEvent::from_json(line.trim()).map_err(|e| LipstreamError::IpcProtocol {
                message: format!("Failed to deserialize event: {}", e),
            })?;
        on_event(&event);
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return Ok(events);
        }
    }
}
