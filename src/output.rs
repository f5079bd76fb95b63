//! Shared event rendering for terminal output.
//! Used by both `lipstream run` and `lipstream submit`.

use crate::error::Result;
use crate::ipc::protocol::WireEvent;
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::sink::EventSink;
use async_trait::async_trait;

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Human-readable one-line form of an event.
pub fn format_event(event: &WireEvent) -> String {
    let seq = format!("{DIM}#{}{RESET}", event.seq);
    match &event.event {
        PipelineEvent::Transcription {
            text,
            language,
            elapsed_seconds,
        } => format!("{seq} heard {DIM}[{language}]{RESET} {text} {DIM}({elapsed_seconds:.2}s){RESET}"),
        PipelineEvent::ResponseText {
            text,
            elapsed_seconds,
            fallback,
        } => {
            let tag = if *fallback {
                format!(" {YELLOW}(echo){RESET}")
            } else {
                String::new()
            };
            format!("{seq} reply{tag} {text} {DIM}({elapsed_seconds:.2}s){RESET}")
        }
        PipelineEvent::ChunkReady {
            chunk_index,
            text_chunk,
            media_url,
            elapsed_seconds,
        } => format!(
            "{seq} {GREEN}chunk {chunk_index}{RESET} {media_url} {DIM}({elapsed_seconds:.2}s){RESET}\n    {DIM}{text_chunk}{RESET}"
        ),
        PipelineEvent::Complete {
            total_elapsed_seconds,
            chunk_count,
        } => format!(
            "{seq} {GREEN}complete{RESET} {chunk_count} chunk(s) in {total_elapsed_seconds:.2}s"
        ),
        PipelineEvent::Failure {
            message,
            job_id,
            elapsed_seconds,
        } => {
            let job = if job_id.is_empty() {
                String::new()
            } else {
                format!(" {DIM}{job_id}{RESET}")
            };
            format!("{seq} {RED}error{RESET}{job} {message} {DIM}({elapsed_seconds:.2}s){RESET}")
        }
    }
}

/// Render a job event to stderr.
pub fn render_event(event: &WireEvent) {
    eprintln!("{}", format_event(event));
}

/// Renders events on stderr as they arrive. In quiet mode only failures are
/// shown.
pub struct TerminalSink {
    quiet: bool,
}

impl TerminalSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

#[async_trait]
impl EventSink for TerminalSink {
    async fn send(&mut self, event: &WireEvent) -> Result<()> {
        if !self.quiet || matches!(event.event, PipelineEvent::Failure { .. }) {
            render_event(event);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}
