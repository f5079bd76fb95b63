use crate::error::{LipstreamError, Result};
use crate::ipc::protocol::WireEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Destination for stamped pipeline events.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event. An error means the destination is gone.
    async fn send(&mut self, event: &WireEvent) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Newline-delimited JSON over any async writer, flushed after every event
/// so the client sees each milestone as soon as it happens.
pub struct NdjsonSink<W> {
    writer: W,
}

impl<W> NdjsonSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> EventSink for NdjsonSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, event: &WireEvent) -> Result<()> {
        let mut line = event.to_json().map_err(|e| LipstreamError::IpcProtocol {
            message: format!("Failed to serialize event: {}", e),
        })?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LipstreamError::IpcConnection {
                message: format!("Failed to write event: {}", e),
            })?;

        self.writer
            .flush()
            .await
            .map_err(|e| LipstreamError::IpcConnection {
                message: format!("Failed to flush writer: {}", e),
            })
    }

    fn name(&self) -> &'static str {
        "ndjson"
    }
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<WireEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<WireEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: &WireEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| LipstreamError::IpcConnection {
                message: "event receiver dropped".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<WireEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WireEvent> {
        self.collected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventSink for CollectorSink {
    async fn send(&mut self, event: &WireEvent) -> Result<()> {
        self.collected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
