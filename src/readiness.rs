//! Confirms a rendered artifact is completely written before it is advertised.
//!
//! The renderer can return before its output is fully on disk, so an
//! existence check alone is not enough. The verifier waits for the file to
//! appear, waits until two size samples taken `stability_delay` apart agree,
//! then fsyncs the file.

use crate::defaults;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Readiness timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stability_delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::READINESS_TIMEOUT_MS,
            poll_interval_ms: defaults::READINESS_POLL_INTERVAL_MS,
            stability_delay_ms: defaults::READINESS_STABILITY_DELAY_MS,
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }
}

/// Filesystem access used by the verifier.
///
/// Swappable so tests can script a writer that is still appending.
#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    /// Current size in bytes, or `None` if the file does not exist yet.
    async fn size(&self, path: &Path) -> io::Result<Option<u64>>;

    /// Force the file's contents to storage.
    async fn sync(&self, path: &Path) -> io::Result<()>;
}

/// Probe backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl ArtifactProbe for FsProbe {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sync(&self, path: &Path) -> io::Result<()> {
        let file = tokio::fs::File::open(path).await?;
        file.sync_all().await
    }
}

/// Waits for artifacts to become stable and flushed.
#[derive(Clone)]
pub struct ReadinessVerifier {
    config: ReadinessConfig,
    probe: Arc<dyn ArtifactProbe>,
}

impl ReadinessVerifier {
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            config,
            probe: Arc::new(FsProbe),
        }
    }

    /// Replace the filesystem probe.
    pub fn with_probe(mut self, probe: Arc<dyn ArtifactProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Wait up to the configured timeout.
    pub async fn wait_until_ready(&self, path: &Path) -> bool {
        self.wait(path, self.config.timeout()).await
    }

    /// Returns true once `path` is stable and flushed, false if that did not
    /// happen within `max_wait` or the file could not be inspected.
    pub async fn wait(&self, path: &Path, max_wait: Duration) -> bool {
        let started = Instant::now();
        match tokio::time::timeout_at(started + max_wait, self.settle(path)).await {
            Ok(Ok(size)) => {
                tracing::debug!(
                    path = %path.display(),
                    size,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "artifact ready"
                );
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(path = %path.display(), error = %e, "artifact inspection failed");
                false
            }
            Err(_) => false,
        }
    }

    async fn settle(&self, path: &Path) -> io::Result<u64> {
        let mut previous = loop {
            match self.probe.size(path).await? {
                Some(size) => break size,
                None => {
                    tracing::trace!(path = %path.display(), "waiting for artifact to appear");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        };

        // An empty file is never complete; keep sampling until it has content
        // and two consecutive samples agree.
        loop {
            tokio::time::sleep(self.config.stability_delay()).await;
            let current = self.probe.size(path).await?.unwrap_or(0);
            tracing::trace!(path = %path.display(), previous, current, "size sample");
            if current == previous && current > 0 {
                break;
            }
            previous = current;
        }

        self.probe.sync(path).await?;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Replays a fixed sequence of size observations, repeating the last one.
    struct ScriptedProbe {
        sizes: Mutex<VecDeque<Option<u64>>>,
        last: Mutex<Option<u64>>,
        samples: AtomicUsize,
        syncs: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(sizes: &[Option<u64>]) -> Arc<Self> {
            Arc::new(Self {
                sizes: Mutex::new(sizes.iter().copied().collect()),
                last: Mutex::new(None),
                samples: AtomicUsize::new(0),
                syncs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ArtifactProbe for ScriptedProbe {
        async fn size(&self, _path: &Path) -> io::Result<Option<u64>> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.sizes.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(*last)
        }

        async fn sync(&self, _path: &Path) -> io::Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> ReadinessConfig {
        ReadinessConfig {
            timeout_ms: 2_000,
            poll_interval_ms: 100,
            stability_delay_ms: 200,
        }
    }

    #[test]
    fn default_config_matches_constants() {
        let config = ReadinessConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.stability_delay(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_growing_file_stops_growing() {
        let probe = ScriptedProbe::new(&[
            None,
            None,
            Some(10),
            Some(20),
            Some(30),
            Some(30),
        ]);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe.clone());

        let started = Instant::now();
        assert!(verifier.wait_until_ready(Path::new("out.mp4")).await);

        // Two polls while missing, then three growing samples before the
        // matching one.
        assert_eq!(probe.samples.load(Ordering::SeqCst), 6);
        assert_eq!(probe.syncs.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(2 * 100 + 3 * 200));
    }

    #[tokio::test(start_paused = true)]
    async fn immediately_stable_file_needs_two_samples() {
        let probe = ScriptedProbe::new(&[Some(512), Some(512)]);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe.clone());

        assert!(verifier.wait_until_ready(Path::new("out.mp4")).await);
        assert_eq!(probe.samples.load(Ordering::SeqCst), 2);
        assert_eq!(probe.syncs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_file_times_out() {
        let probe = ScriptedProbe::new(&[None]);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe.clone());

        let started = Instant::now();
        assert!(!verifier.wait_until_ready(Path::new("never.mp4")).await);
        assert!(started.elapsed() >= Duration::from_millis(2_000));
        assert_eq!(probe.syncs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn file_that_keeps_growing_times_out() {
        let sizes: Vec<Option<u64>> = (1..=100).map(|n| Some(n * 100)).collect();
        let probe = ScriptedProbe::new(&sizes);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe.clone());

        assert!(!verifier.wait_until_ready(Path::new("busy.mp4")).await);
        assert_eq!(probe.syncs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_file_is_not_ready() {
        let probe = ScriptedProbe::new(&[Some(0)]);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe.clone());

        assert!(!verifier.wait_until_ready(Path::new("empty.mp4")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_max_wait_overrides_config() {
        let probe = ScriptedProbe::new(&[None]);
        let verifier = ReadinessVerifier::new(config()).with_probe(probe);

        let started = Instant::now();
        assert!(
            !verifier
                .wait(Path::new("never.mp4"), Duration::from_millis(300))
                .await
        );
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn real_file_is_confirmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let verifier = ReadinessVerifier::new(ReadinessConfig {
            timeout_ms: 2_000,
            poll_interval_ms: 5,
            stability_delay_ms: 10,
        });
        assert!(verifier.wait_until_ready(&path).await);
    }

    #[tokio::test]
    async fn real_file_appearing_late_is_confirmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.mp4");

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&writer_path, b"frames").await.unwrap();
        });

        let verifier = ReadinessVerifier::new(ReadinessConfig {
            timeout_ms: 5_000,
            poll_interval_ms: 5,
            stability_delay_ms: 10,
        });
        assert!(verifier.wait_until_ready(&path).await);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn real_missing_file_times_out() {
        let dir = TempDir::new().unwrap();
        let verifier = ReadinessVerifier::new(ReadinessConfig {
            timeout_ms: 50,
            poll_interval_ms: 5,
            stability_delay_ms: 10,
        });
        assert!(!verifier.wait_until_ready(&dir.path().join("absent.mp4")).await);
    }
}
