//! Job server and client over a real Unix socket.

mod common;

use common::{GREETING, Workspace, narrow_segmenter, pipeline, quick_readiness};
use lipstream::collaborators::mock::MockTranscriber;
use lipstream::ipc::protocol::{JobRequest, WireEvent};
use lipstream::ipc::{JobServer, submit_job};
use lipstream::{PipelineEvent, Sequencer};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

async fn start_server(ws: &Workspace, transcript: &str) -> (Arc<JobServer>, PathBuf) {
    let socket_path = ws.dir.path().join("lipstream.sock");
    let pipeline = Arc::new(pipeline(
        ws,
        MockTranscriber::new().with_response(transcript),
        Arc::new(ws.synthesizer()),
        Arc::new(ws.renderer().with_delay(Duration::from_millis(10))),
        quick_readiness(),
        narrow_segmenter(),
    ));
    let server = Arc::new(JobServer::new(
        socket_path.clone(),
        pipeline,
        Arc::new(Sequencer::new()),
        "en",
    ));
    let running = Arc::clone(&server);
    tokio::spawn(async move { running.start().await });

    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    (server, socket_path)
}

#[tokio::test]
async fn submitted_job_streams_all_events() {
    let ws = Workspace::new();
    let (server, socket_path) = start_server(&ws, GREETING).await;

    let mut live = Vec::new();
    let mut request = JobRequest::new(ws.audio());
    request.job_id = Some("socket-job".to_string());
    request.history = json!([{"role": "user", "content": "earlier"}]);
    let events = submit_job(&socket_path, &request, |e| live.push(e.event.kind()))
        .await
        .unwrap();

    assert_eq!(
        live,
        vec![
            "transcription",
            "llm_response",
            "video_chunk",
            "video_chunk",
            "complete"
        ]
    );
    assert_eq!(events.len(), 5);
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_clients_get_disjoint_sequence_numbers() {
    let ws = Workspace::new();
    let (server, socket_path) = start_server(&ws, GREETING).await;

    let first = {
        let socket_path = socket_path.clone();
        let request = JobRequest::new(ws.audio());
        tokio::spawn(async move { submit_job(&socket_path, &request, |_| {}).await })
    };
    let second = {
        let socket_path = socket_path.clone();
        let request = JobRequest::new(ws.audio());
        tokio::spawn(async move { submit_job(&socket_path, &request, |_| {}).await })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    for events in [&a, &b] {
        assert!(events.last().is_some_and(WireEvent::is_terminal));
        assert_eq!(events.last().map(|e| e.event.kind()), Some("complete"));
    }

    let mut seqs: Vec<u64> = a.iter().chain(b.iter()).map(|e| e.seq).collect();
    let total = seqs.len();
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs.len(), total);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_request_gets_one_error_then_close() {
    let ws = Workspace::new();
    let (server, socket_path) = start_server(&ws, GREETING).await;

    let stream = UnixStream::connect(&socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"this is not json\n").await.unwrap();

    let mut lines = BufReader::new(reader).lines();
    let first = lines.next_line().await.unwrap().unwrap();
    let event = WireEvent::from_json(&first).unwrap();
    match event.event {
        PipelineEvent::Failure {
            message, job_id, ..
        } => {
            assert!(message.starts_with("Invalid job request"), "{message}");
            assert!(job_id.is_empty());
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(lines.next_line().await.unwrap().is_none());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn client_disconnect_does_not_break_the_server() {
    let ws = Workspace::new();
    let (server, socket_path) = start_server(&ws, GREETING).await;

    // Leave right after the first event.
    {
        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let line = format!("{}\n", JobRequest::new(ws.audio()).to_json().unwrap());
        writer.write_all(line.as_bytes()).await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        assert!(lines.next_line().await.unwrap().is_some());
    }

    let events = submit_job(&socket_path, &JobRequest::new(ws.audio()), |_| {})
        .await
        .unwrap();
    assert_eq!(events.last().map(|e| e.event.kind()), Some("complete"));

    server.stop().await.unwrap();
}
