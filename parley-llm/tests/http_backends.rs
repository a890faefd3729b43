//! HTTP Backend Tests: Wire Shapes, Retries, Failures
//!
//! Each test stands up a throwaway HTTP/1.1 responder on localhost, points a
//! backend at it, and checks both what was sent and how the reply was read.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_llm::{
    ElevenLabsVoice, HttpGenerator, LlmError, LlmProvider, LlmRequest, TextGenerator,
    VoiceSynthesizer,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ---------------------------------------------------------------------------
// Mock responder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seen {
    head: String,
    body: Value,
}

struct MockServer {
    base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockServer {
    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().expect("lock").clone()
    }
}

/// Serve `replies` in order, one per connection.
async fn serve(replies: Vec<(u16, String)>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for (status, body) in replies {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let request = read_request(&mut stream).await;
            log.lock().expect("lock").push(request);
            let reply = format!(
                "HTTP/1.1 {status} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    MockServer {
        base_url: format!("http://{addr}"),
        seen,
    }
}

async fn read_request(stream: &mut TcpStream) -> Seen {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.expect("read");
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap_or(Value::Null);
    Seen { head, body }
}

fn fast(generator: HttpGenerator) -> HttpGenerator {
    generator.with_backoff(Duration::ZERO, Duration::ZERO)
}

fn request() -> LlmRequest {
    LlmRequest::new("You are a helpful assistant.", "Greet the traveller.").with_timeout(2_000)
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn openai_request_and_reply() {
    let server = serve(vec![(
        200,
        json!({"choices": [{"message": {"content": "  Well met, outlander.  "}}], "usage": {"completion_tokens": 4}}).to_string(),
    )])
    .await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::OpenAiCompatible {
            base_url: server.base_url.clone(),
            api_key: "sk-test".into(),
        },
        "gpt-3.5-turbo",
        0,
    ));
    let response = generator.generate(&request()).await.expect("generate");
    assert_eq!(response.text, "Well met, outlander.");
    assert_eq!(response.tokens_generated, 4);
    assert_eq!(response.model, "gpt-3.5-turbo");

    let seen = server.requests();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].head.starts_with("post /v1/chat/completions"));
    assert!(seen[0].head.contains("authorization: bearer sk-test"));
    assert_eq!(seen[0].body["model"], "gpt-3.5-turbo");
    assert_eq!(seen[0].body["messages"][0]["role"], "system");
    assert_eq!(seen[0].body["messages"][1]["content"], "Greet the traveller.");
    assert_eq!(seen[0].body["max_tokens"], 150);
}

#[tokio::test]
async fn anthropic_request_and_reply() {
    let server = serve(vec![(
        200,
        json!({"content": [{"type": "text", "text": "Hail."}], "usage": {"output_tokens": 1}}).to_string(),
    )])
    .await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::Anthropic {
            base_url: server.base_url.clone(),
            api_key: "ak-test".into(),
        },
        "claude-instant",
        0,
    ));
    let response = generator.generate(&request()).await.expect("generate");
    assert_eq!(response.text, "Hail.");

    let seen = server.requests();
    assert!(seen[0].head.starts_with("post /v1/messages"));
    assert!(seen[0].head.contains("x-api-key: ak-test"));
    assert!(seen[0].head.contains("anthropic-version:"));
    assert_eq!(seen[0].body["system"], "You are a helpful assistant.");
}

#[tokio::test]
async fn ollama_request_and_reply() {
    let server = serve(vec![(200, json!({"response": "Greetings.", "eval_count": 2}).to_string())]).await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: server.base_url.clone(),
        },
        "mistral",
        0,
    ));
    let response = generator.generate(&request()).await.expect("generate");
    assert_eq!(response.text, "Greetings.");
    assert_eq!(response.tokens_generated, 2);

    let seen = server.requests();
    assert!(seen[0].head.starts_with("post /api/generate"));
    assert_eq!(seen[0].body["stream"], false);
    assert_eq!(
        seen[0].body["prompt"],
        "You are a helpful assistant.\n\nGreet the traveller."
    );
}

// ---------------------------------------------------------------------------
// Retries and failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_errors_are_retried() {
    let server = serve(vec![
        (500, json!({"error": "overloaded"}).to_string()),
        (200, json!({"response": "Second time lucky."}).to_string()),
    ])
    .await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: server.base_url.clone(),
        },
        "mistral",
        2,
    ));
    let response = generator.generate(&request()).await.expect("generate");
    assert_eq!(response.text, "Second time lucky.");
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn retries_run_out() {
    let server = serve(vec![
        (503, "{}".to_string()),
        (503, "{}".to_string()),
    ])
    .await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: server.base_url.clone(),
        },
        "mistral",
        1,
    ));
    let err = generator.generate(&request()).await.expect_err("exhausted");
    match err {
        LlmError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_success_body_is_not_retried() {
    let server = serve(vec![
        (200, "definitely not json".to_string()),
        (200, json!({"response": "unused"}).to_string()),
    ])
    .await;

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: server.base_url.clone(),
        },
        "mistral",
        3,
    ));
    let err = generator.generate(&request()).await.expect_err("parse error");
    assert!(matches!(err, LlmError::ParseError(_)));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn unreachable_backend_exhausts_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: format!("http://{addr}"),
        },
        "mistral",
        1,
    ));
    let err = generator.generate(&request()).await.expect_err("refused");
    assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn slow_backend_times_out_per_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let generator = fast(HttpGenerator::new(
        LlmProvider::Ollama {
            base_url: format!("http://{addr}"),
        },
        "mistral",
        0,
    ));
    let err = generator
        .generate(&request().with_timeout(100))
        .await
        .expect_err("timeout");
    match err {
        LlmError::RetriesExhausted { last_error, .. } => assert!(last_error.contains("timed out")),
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn elevenlabs_writes_audio_file() {
    let server = serve(vec![(200, "ID3-not-really-audio".to_string())]).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let voice = ElevenLabsVoice::new("xi-test", "narrator", "eleven_monolingual_v1", dir.path())
        .with_base_url(server.base_url.clone());
    let path = voice.synthesize("Welcome to Seyda Neen.", "guard").await.expect("synthesize");

    assert!(path.starts_with(dir.path()));
    let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
    assert!(name.starts_with("guard_"));
    assert!(name.ends_with(".mp3"));
    assert_eq!(std::fs::read(&path).expect("read"), b"ID3-not-really-audio");

    let seen = server.requests();
    assert!(seen[0].head.starts_with("post /v1/text-to-speech/narrator"));
    assert!(seen[0].head.contains("xi-api-key: xi-test"));
    assert_eq!(seen[0].body["text"], "Welcome to Seyda Neen.");
    assert_eq!(seen[0].body["model_id"], "eleven_monolingual_v1");
}

#[tokio::test]
async fn elevenlabs_error_status_is_request_failure() {
    let server = serve(vec![(401, json!({"detail": "bad key"}).to_string())]).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let voice = ElevenLabsVoice::new("wrong", "narrator", "eleven_monolingual_v1", dir.path())
        .with_base_url(server.base_url.clone());
    let err = voice.synthesize("Hello", "guard").await.expect_err("401");
    assert!(matches!(err, LlmError::RequestFailed(_)));
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}
