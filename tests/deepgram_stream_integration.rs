//! End-to-end tests for the Deepgram streaming client against a local mock
//! WebSocket server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

use streamscribe::core::stt::{
    BaseSTT, DeepgramSTT, DeepgramSTTConfig, STTConnectionState, STTError, STTResultCallback,
    TranscriptionMessage,
};

// =============================================================================
// Mock Server
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ServerEvent {
    Handshake {
        uri: String,
        authorization: Option<String>,
    },
    Binary(Vec<u8>),
    Close,
}

/// What the mock server does right after the handshake.
#[derive(Default)]
struct Script {
    /// Text frames sent to the client, in order
    replies: Vec<String>,
    /// Close the connection from the server side after the replies
    close_after_replies: bool,
}

/// Accept one WebSocket client and report everything it sends.
async fn start_mock_server(script: Script) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();

        let handshake_tx = events_tx.clone();
        let callback = move |req: &Request, resp: Response| {
            let authorization = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = handshake_tx.send(ServerEvent::Handshake {
                uri: req.uri().to_string(),
                authorization,
            });
            Ok(resp)
        };
        let mut ws = accept_hdr_async(tcp, callback).await.unwrap();

        for reply in script.replies {
            ws.send(Message::Text(reply.into())).await.unwrap();
        }
        if script.close_after_replies {
            let _ = ws.close(None).await;
        }

        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    let _ = events_tx.send(ServerEvent::Binary(data.to_vec()));
                }
                Ok(Message::Close(_)) => {
                    let _ = events_tx.send(ServerEvent::Close);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    (format!("ws://127.0.0.1:{}/v1/listen", addr.port()), events_rx)
}

/// Answer the upgrade request with a plain HTTP 200.
async fn start_http_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = tcp.read(&mut buf).await.unwrap();
            if read == 0 {
                return;
            }
            request.extend_from_slice(&buf[..read]);
        }
        tcp.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let _ = tcp.shutdown().await;
    });

    format!("ws://127.0.0.1:{}/v1/listen", addr.port())
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config(endpoint: String) -> DeepgramSTTConfig {
    let mut config = DeepgramSTTConfig {
        endpoint,
        ..Default::default()
    };
    config.base.api_key = "test-key".to_string();
    config.timeouts.connect = Duration::from_secs(5);
    config.timeouts.read = Duration::from_secs(2);
    config
}

fn collecting_callback() -> (
    STTResultCallback,
    mpsc::UnboundedReceiver<TranscriptionMessage>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: STTResultCallback = Arc::new(move |message: TranscriptionMessage| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(message);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    (callback, rx)
}

fn results_json(start: f64, transcript: &str, is_final: bool) -> String {
    format!(
        r#"{{"type":"Results","channel_index":[0,1],"duration":0.5,"start":{start},"is_final":{is_final},"speech_final":false,"channel":{{"alternatives":[{{"transcript":"{transcript}","confidence":0.9,"words":[]}}]}}}}"#
    )
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for server event")
        .expect("server ended")
}

/// Collect every remaining event until the server task ends.
async fn remaining_events(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut collected = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
        collected.push(event);
    }
    collected
}

async fn wait_for_state(stt: &DeepgramSTT, expected: &STTConnectionState) -> bool {
    for _ in 0..250 {
        if stt.connection_state() == *expected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

// =============================================================================
// Connection Tests
// =============================================================================

#[tokio::test]
async fn test_handshake_opens_session() {
    let (endpoint, mut events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.expect("Failed to connect");

    assert_eq!(stt.connection_state(), STTConnectionState::Open);
    assert!(stt.is_ready());

    match next_event(&mut events).await {
        ServerEvent::Handshake { uri, authorization } => {
            assert_eq!(
                uri,
                "/v1/listen?encoding=linear16&sample_rate=16000&channels=1&model=nova-2\
                 &endpointing=10&smart_format=true&diarize=true&utterances=true"
            );
            assert_eq!(authorization.as_deref(), Some("Token test-key"));
        }
        other => panic!("Expected handshake, got {other:?}"),
    }

    stt.disconnect().await.unwrap();
    assert_eq!(stt.connection_state(), STTConnectionState::Closed);
}

#[tokio::test]
async fn test_non_101_response_fails_connect() {
    let endpoint = start_http_server().await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    let result = stt.connect().await;

    assert!(matches!(result, Err(STTError::ConnectFailure(_))));
    assert!(matches!(
        stt.connection_state(),
        STTConnectionState::Failed(_)
    ));
    assert!(!stt.is_ready());
    assert!(matches!(stt.send_audio(&[0u8; 10]).await, Err(STTError::Closed)));
}

// =============================================================================
// Send Path Tests
// =============================================================================

#[tokio::test]
async fn test_send_writes_one_binary_frame() {
    let (endpoint, mut events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Handshake { .. }));

    let audio: Vec<u8> = (0..3200).map(|i| (i % 251) as u8).collect();
    stt.send_audio(&audio).await.unwrap();

    match next_event(&mut events).await {
        ServerEvent::Binary(data) => {
            assert_eq!(data.len(), 3200);
            assert_eq!(data, audio);
        }
        other => panic!("Expected binary frame, got {other:?}"),
    }

    stt.disconnect().await.unwrap();
    assert_eq!(remaining_events(&mut events).await, vec![ServerEvent::Close]);

    let stats = stt.stats();
    assert_eq!(stats.frames_sent, 1);
    assert_eq!(stats.bytes_sent, 3200);
    assert_eq!(stats.frames_dropped, 0);
}

#[tokio::test]
async fn test_sender_handle_from_another_task() {
    let (endpoint, mut events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Handshake { .. }));

    let sender = stt.sender().expect("sender after connect");
    let producer = tokio::spawn(async move {
        for i in 0..5u8 {
            sender.send(&[i; 320]).await.unwrap();
        }
    });
    producer.await.unwrap();

    for i in 0..5u8 {
        assert_eq!(next_event(&mut events).await, ServerEvent::Binary(vec![i; 320]));
    }

    stt.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_close_flushes_accepted_frames() {
    let (endpoint, mut events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Handshake { .. }));

    for i in 0..3u8 {
        stt.send_audio(&[i; 640]).await.unwrap();
    }
    stt.disconnect().await.unwrap();

    assert_eq!(
        remaining_events(&mut events).await,
        vec![
            ServerEvent::Binary(vec![0; 640]),
            ServerEvent::Binary(vec![1; 640]),
            ServerEvent::Binary(vec![2; 640]),
            ServerEvent::Close,
        ]
    );
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_double_close_sends_one_close_frame() {
    let (endpoint, mut events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Handshake { .. }));

    stt.disconnect().await.unwrap();
    stt.disconnect().await.unwrap();
    assert_eq!(stt.connection_state(), STTConnectionState::Closed);

    let closes = remaining_events(&mut events)
        .await
        .into_iter()
        .filter(|event| *event == ServerEvent::Close)
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let (endpoint, _events) = start_mock_server(Script::default()).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    stt.connect().await.unwrap();
    let sender = stt.sender().unwrap();

    stt.disconnect().await.unwrap();

    assert!(matches!(stt.send_audio(&[1, 2, 3]).await, Err(STTError::Closed)));
    assert!(matches!(sender.send(&[1, 2, 3]).await, Err(STTError::Closed)));
    assert!(!stt.is_ready());
}

#[tokio::test]
async fn test_remote_close_moves_to_closed() {
    let script = Script {
        replies: vec![results_json(0.0, "goodbye", true)],
        close_after_replies: true,
    };
    let (endpoint, _events) = start_mock_server(script).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    let (callback, mut results) = collecting_callback();
    stt.on_result(callback).await.unwrap();
    stt.connect().await.unwrap();

    assert!(wait_for_state(&stt, &STTConnectionState::Closed).await);
    assert!(!stt.is_ready());
    assert!(matches!(stt.send_audio(&[0u8; 32]).await, Err(STTError::Closed)));

    // Results that arrived before the close are still delivered
    let message = timeout(Duration::from_secs(2), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.transcript(), "goodbye");

    // Local close after a remote close is a no-op
    stt.disconnect().await.unwrap();
    assert_eq!(stt.connection_state(), STTConnectionState::Closed);
}

// =============================================================================
// Receive Path Tests
// =============================================================================

#[tokio::test]
async fn test_split_and_batched_messages_arrive_in_order() {
    let first = results_json(0.0, "one", false);
    let second = results_json(0.5, "two", true);
    let third = results_json(1.0, "three", true);

    let (first_head, first_tail) = first.split_at(20);
    let (third_head, third_tail) = third.split_at(third.len() - 7);
    let script = Script {
        replies: vec![
            first_head.to_string(),
            format!("{first_tail}\n{second}{third_head}"),
            third_tail.to_string(),
        ],
        close_after_replies: false,
    };
    let (endpoint, _events) = start_mock_server(script).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    let (callback, mut results) = collecting_callback();
    stt.on_result(callback).await.unwrap();
    stt.connect().await.unwrap();

    let mut transcripts = Vec::new();
    for _ in 0..3 {
        let message = timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("timed out waiting for result")
            .unwrap();
        transcripts.push((message.transcript().to_string(), message.is_final));
    }

    assert_eq!(
        transcripts,
        vec![
            ("one".to_string(), false),
            ("two".to_string(), true),
            ("three".to_string(), true),
        ]
    );

    let stats = stt.stats();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.final_messages, 2);
    assert_eq!(stats.parse_failures, 0);

    stt.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_does_not_end_session() {
    let script = Script {
        replies: vec![
            "{\"type\": oops}".to_string(),
            results_json(0.0, "still here", true),
        ],
        close_after_replies: false,
    };
    let (endpoint, _events) = start_mock_server(script).await;

    let mut stt = DeepgramSTT::new(test_config(endpoint)).unwrap();
    let (callback, mut results) = collecting_callback();
    stt.on_result(callback).await.unwrap();

    let (error_tx, mut errors) = mpsc::unbounded_channel();
    stt.on_error(Arc::new(move |error: STTError| {
        let error_tx = error_tx.clone();
        Box::pin(async move {
            let _ = error_tx.send(error);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    }))
    .await
    .unwrap();

    stt.connect().await.unwrap();

    let message = timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.transcript(), "still here");

    let error = timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(error, STTError::ParseFailure(_)));

    assert!(stt.is_ready());
    assert_eq!(stt.stats().parse_failures, 1);

    stt.disconnect().await.unwrap();
}
