mod stubs;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};

use stubs::{StubFactory, StubLLM, StubSTT, StubTTS, wait_until};
use vocalis::core::providers::{ProviderFactory, UnconfiguredProviders};
use vocalis::core::stt::RecognitionEvent;
use vocalis::{PipelineSettings, ServerConfig, routes, state::AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_server(factory: Arc<dyn ProviderFactory>) -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        pipeline: PipelineSettings {
            connect_delay: Duration::from_millis(10),
            warning_clip_path: "/nonexistent/warning.wav".into(),
            ..Default::default()
        },
    };

    let app = routes::create_router(AppState::new(config, factory));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn stub_factory() -> Arc<StubFactory> {
    Arc::new(StubFactory {
        stt: Arc::new(StubSTT::default()),
        tts: Arc::new(StubTTS {
            chunk_delay: Duration::from_millis(5),
            ..Default::default()
        }),
        llm: Arc::new(StubLLM::default().reply("天气", &["今天是晴天。"])),
    })
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let url = format!("ws://127.0.0.1:{}/ws/voice{}", addr.port(), query);
    let (client, _) = connect_async(url).await.expect("Failed to connect");
    client
}

/// Next JSON control frame, skipping audio
async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(READ_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("read failed");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read control frames until one of the given type arrives
async fn expect_type(client: &mut Client, expected: &str) -> Value {
    loop {
        let frame = next_json(client).await;
        if frame["type"] == expected {
            return frame;
        }
    }
}

async fn send_json(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_check_and_not_found() {
    let addr = spawn_server(stub_factory()).await;

    for (path, status, body) in [
        ("/", "200 OK", r#"{"status":"OK"}"#),
        ("/missing", "404 Not Found", "/missing"),
    ] {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with(&format!("HTTP/1.1 {status}")), "{response}");
        assert!(response.contains(body), "{response}");
    }
}

#[tokio::test]
async fn test_connect_ping_and_new_session() {
    let factory = stub_factory();
    let addr = spawn_server(factory.clone()).await;
    let mut client = connect(addr, "").await;

    let connected = next_json(&mut client).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["message"], "WebSocket voice connection established");

    send_json(&mut client, serde_json::json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    // Unknown and malformed frames are ignored
    send_json(&mut client, serde_json::json!({"type": "dance"})).await;
    client.send(Message::Text("{not json".into())).await.unwrap();
    send_json(&mut client, serde_json::json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    send_json(&mut client, serde_json::json!({"type": "new_session"})).await;
    let cleared = next_json(&mut client).await;
    assert_eq!(cleared["type"], "session_cleared");

    // The recognizer is stopped and reconnected by the supervisor
    let stt = factory.stt.clone();
    assert!(
        wait_until(READ_TIMEOUT, || {
            stt.connects.load(Ordering::SeqCst) >= 2 && stt.is_active_now()
        })
        .await
    );

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn test_recognized_speech_is_answered_with_audio() {
    let factory = stub_factory();
    let addr = spawn_server(factory.clone()).await;
    let mut client = connect(addr, "?temperature=0.2&model=qwen-max").await;
    assert_eq!(next_json(&mut client).await["type"], "connected");

    let stt = factory.stt.clone();
    assert!(wait_until(READ_TIMEOUT, || stt.is_active_now()).await);

    client
        .send(Message::Binary(vec![0u8; 640].into()))
        .await
        .unwrap();
    assert!(wait_until(READ_TIMEOUT, || stt.audio_frames.load(Ordering::SeqCst) == 1).await);

    stt.emit(RecognitionEvent::final_result(
        "今天天气怎么样",
        Duration::from_secs(1),
    ))
    .await;

    let asr = next_json(&mut client).await;
    assert_eq!(asr["type"], "asr_result");
    assert_eq!(asr["text"], "今天天气怎么样");

    let reply = expect_type(&mut client, "llm_response").await;
    assert_eq!(reply["text"], "今天是晴天。");

    let start = expect_type(&mut client, "tts_start").await;
    assert_eq!(start["sampleRate"], 16000);
    assert_eq!(start["channels"], 1);
    assert_eq!(start["bitDepth"], 16);

    let mut audio_bytes = 0;
    loop {
        let message = tokio::time::timeout(READ_TIMEOUT, client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match message {
            Message::Binary(data) => audio_bytes += data.len(),
            Message::Text(text) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(frame["type"], "tts_end");
                break;
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(audio_bytes, 3 * 3200);

    let request = &factory.llm.requests()[0];
    assert_eq!(request.model, "qwen-max");
    assert_eq!(request.temperature, Some(0.2));

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn test_invalid_query_is_rejected() {
    let addr = spawn_server(stub_factory()).await;
    let url = format!("ws://127.0.0.1:{}/ws/voice?max_tokens=lots", addr.port());
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_unconfigured_providers_close_with_fatal_error() {
    let addr = spawn_server(Arc::new(UnconfiguredProviders)).await;
    let mut client = connect(addr, "").await;

    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["fatal"], true);
    assert!(
        error["message"]
            .as_str()
            .unwrap()
            .contains("No voice providers are configured")
    );

    let closed = tokio::time::timeout(READ_TIMEOUT, client.next()).await.unwrap();
    assert!(matches!(closed, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}

#[tokio::test]
async fn test_recognizer_quota_error_disconnects_client() {
    let factory = stub_factory();
    let addr = spawn_server(factory.clone()).await;
    let mut client = connect(addr, "").await;
    assert_eq!(next_json(&mut client).await["type"], "connected");

    factory
        .stt
        .fail(vocalis::core::stt::STTError::ProviderError(
            "pkg exhausted".to_string(),
        ))
        .await;

    let error = expect_type(&mut client, "error").await;
    assert_eq!(error["fatal"], true);
    assert_eq!(error["message"], "ASR error: Provider error: pkg exhausted");

    let closed = tokio::time::timeout(READ_TIMEOUT, client.next()).await.unwrap();
    assert!(matches!(closed, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}
