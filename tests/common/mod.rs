//! Shared fixtures for integration tests.
#![allow(dead_code)]

use lipstream::collaborators::mock::{MockRenderer, MockSynthesizer, MockTranscriber};
use lipstream::config::AssetsConfig;
use lipstream::job::AssetResolver;
use lipstream::{
    ChunkProducer, Pipeline, PipelineConfig, ReadinessConfig, ReadinessVerifier, SegmenterConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const GREETING: &str = "Hello. Welcome to the system. It works.";

/// Temporary asset and output directories.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("bruce_neutral.jpg"), b"jpg").unwrap();
        Self { dir }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("outputs")
    }

    pub fn audio(&self) -> PathBuf {
        self.dir.path().join("question.wav")
    }

    pub fn assets(&self) -> AssetResolver {
        AssetResolver::new(&AssetsConfig {
            images_dir: self.dir.path().join("images"),
            voice_samples_dir: self.dir.path().join("voices"),
            output_dir: self.output_dir(),
            ..AssetsConfig::default()
        })
    }

    pub fn synthesizer(&self) -> MockSynthesizer {
        MockSynthesizer::new(self.output_dir())
    }

    pub fn renderer(&self) -> MockRenderer {
        MockRenderer::new(self.output_dir())
    }
}

/// Fast polling so tests settle in milliseconds.
pub fn quick_readiness() -> ReadinessConfig {
    ReadinessConfig {
        timeout_ms: 2_000,
        poll_interval_ms: 5,
        stability_delay_ms: 20,
    }
}

/// Bounds that split [`GREETING`] into two chunks.
pub fn narrow_segmenter() -> PipelineConfig {
    PipelineConfig {
        segmenter: SegmenterConfig {
            target_chars: 30,
            buffer_ceiling_chars: 30,
            min_words: 3,
        },
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    workspace: &Workspace,
    transcriber: MockTranscriber,
    synthesizer: Arc<MockSynthesizer>,
    renderer: Arc<MockRenderer>,
    readiness: ReadinessConfig,
    config: PipelineConfig,
) -> Pipeline {
    let producer = ChunkProducer::new(synthesizer, renderer, ReadinessVerifier::new(readiness));
    Pipeline::new(
        Arc::new(transcriber),
        Arc::new(producer),
        workspace.assets(),
        config,
    )
}
