//! End-to-end chat session behavior against a mock LM Studio server.

use lmchat_engine::{
    ChatSession, EngineError, ImageAttachment, LMStudioClient, ReplyOutcome, Role, Transcript,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn models_body(ids: &[&str]) -> String {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "organization_owner"}))
        .collect();
    json!({"object": "list", "data": data}).to_string()
}

fn sse_body(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"object": "chat.completion.chunk", "choices": [{"index": 0, "delta": {"content": part}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_models(server: &MockServer, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(models_body(ids), "application/json"))
        .mount(server)
        .await;
}

async fn mount_stream(server: &MockServer, parts: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(parts), "text/event-stream"),
        )
        .mount(server)
        .await;
}

async fn connected_session(server: &MockServer, ids: &[&str]) -> ChatSession {
    mount_models(server, ids).await;
    let mut session = ChatSession::new(LMStudioClient::new(server.uri()));
    session.refresh_models().await.unwrap();
    session
}

fn summary(transcript: &Transcript) -> Vec<(Role, String, bool)> {
    transcript
        .turns()
        .iter()
        .map(|t| (t.role(), t.text().to_string(), t.is_streaming()))
        .collect()
}

/// Serve one chat request whose streamed body is cut off after `parts`.
async fn serve_truncated_stream(parts: &'static [&'static str]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }

        let mut frames = String::new();
        for part in parts {
            frames.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"index": 0, "delta": {"content": part}}]})
            ));
        }
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: 4096\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(frames.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}")
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= end + 4 + length
}

async fn chat_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/chat/completions")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_refresh_auto_selects_first_model() {
    let server = MockServer::start().await;
    let session = connected_session(&server, &["qwen3-8b", "gemma-3-4b"]).await;

    assert_eq!(session.models().len(), 2);
    assert_eq!(session.selected_model(), Some("qwen3-8b"));
    assert_eq!(session.connection_error(), None);
}

#[tokio::test]
async fn test_refresh_keeps_valid_selection() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["a", "b"]).await;
    session.select_model("b").unwrap();

    session.refresh_models().await.unwrap();
    assert_eq!(session.selected_model(), Some("b"));
}

#[tokio::test]
async fn test_refresh_replaces_vanished_selection() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["a", "b"]).await;
    session.select_model("b").unwrap();

    server.reset().await;
    mount_models(&server, &["c"]).await;
    session.refresh_models().await.unwrap();
    assert_eq!(session.selected_model(), Some("c"));
}

#[tokio::test]
async fn test_streamed_reply_is_folded() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["qwen3-8b"]).await;
    mount_stream(&server, &["He", "llo"]).await;

    let mut streaming_texts = Vec::new();
    let outcome = session
        .send("hi", Vec::new(), |t| {
            if let Some(turn) = t.streaming_turn() {
                streaming_texts.push(turn.text().to_string());
            }
        })
        .await
        .unwrap();

    assert_eq!(outcome, ReplyOutcome::Completed);
    assert_eq!(
        summary(session.transcript()),
        vec![
            (Role::User, "hi".to_string(), false),
            (Role::Assistant, "Hello".to_string(), false),
        ]
    );
    assert_eq!(streaming_texts, vec!["", "He", "Hello"]);

    let bodies = chat_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "qwen3-8b");
    assert_eq!(bodies[0]["stream"], true);
    assert_eq!(
        bodies[0]["messages"],
        json!([{"role": "user", "content": "hi"}])
    );
}

#[tokio::test]
async fn test_reasoning_reply_keeps_markers_in_transcript() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["r1"]).await;
    mount_stream(&server, &["<think>", "Let me see", "</think>", "4"]).await;

    session.send("2+2?", Vec::new(), |_| {}).await.unwrap();

    let reply = session.transcript().last().unwrap();
    assert_eq!(reply.text(), "<think>Let me see</think>4");
    let split = lmchat_engine::split_reasoning(reply.text(), reply.is_streaming());
    assert_eq!(split.reasoning.as_deref(), Some("Let me see"));
    assert!(split.reasoning_complete);
    assert_eq!(split.answer, "4");
}

#[tokio::test]
async fn test_http_error_becomes_system_turn() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["qwen3-8b"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let outcome = session.send("hi", Vec::new(), |_| {}).await.unwrap();

    let expected =
        "Error: API Error: 500. Ensure LM Studio is running and the model is loaded.".to_string();
    assert_eq!(
        outcome,
        ReplyOutcome::Failed {
            message: expected.clone()
        }
    );
    assert_eq!(
        summary(session.transcript()),
        vec![
            (Role::User, "hi".to_string(), false),
            (Role::System, expected, false),
        ]
    );
}

#[tokio::test]
async fn test_server_error_message_is_surfaced() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["qwen3-8b"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            json!({"error": {"message": "Model is not loaded"}}).to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    session.send("hi", Vec::new(), |_| {}).await.unwrap();
    let last = session.transcript().last().unwrap();
    assert_eq!(last.role(), Role::System);
    assert!(last.text().starts_with("Error: Model is not loaded."));
}

#[tokio::test]
async fn test_model_change_resets_transcript() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["a", "b"]).await;
    mount_stream(&server, &["ok"]).await;
    session.send("hi", Vec::new(), |_| {}).await.unwrap();
    assert_eq!(session.transcript().len(), 2);

    session.select_model("a").unwrap();
    assert_eq!(session.transcript().len(), 2);

    session.select_model("b").unwrap();
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_refresh_failure_clears_models_and_selection() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["a"]).await;
    mount_stream(&server, &["ok"]).await;
    session.send("hi", Vec::new(), |_| {}).await.unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = session.refresh_models().await.unwrap_err();
    assert!(matches!(err, EngineError::Client(_)));
    assert!(session.models().is_empty());
    assert_eq!(session.selected_model(), None);
    assert_eq!(
        session.connection_error(),
        Some("Failed to fetch models. Status: 500")
    );
    assert!(session.transcript().is_empty());

    let result = session.send("again", Vec::new(), |_| {}).await;
    assert!(matches!(result, Err(EngineError::NoModelSelected)));
}

#[tokio::test]
async fn test_non_streaming_mode() {
    let server = MockServer::start().await;
    mount_models(&server, &["m"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            json!({
                "id": "c1",
                "object": "chat.completion",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Full reply"}, "finish_reason": "stop"}]
            })
            .to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    let mut session =
        ChatSession::new(LMStudioClient::new(server.uri())).with_streaming(false);
    session.refresh_models().await.unwrap();
    let outcome = session.send("hi", Vec::new(), |_| {}).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(session.transcript().last().unwrap().text(), "Full reply");
    assert_eq!(chat_bodies(&server).await[0]["stream"], false);
}

#[tokio::test]
async fn test_non_streaming_empty_content() {
    let server = MockServer::start().await;
    mount_models(&server, &["m"]).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]})
                .to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    let mut session =
        ChatSession::new(LMStudioClient::new(server.uri())).with_streaming(false);
    session.refresh_models().await.unwrap();
    session.send("hi", Vec::new(), |_| {}).await.unwrap();

    let last = session.transcript().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.text(), "No content returned.");
}

#[tokio::test]
async fn test_history_is_sent_with_follow_up() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["m"]).await;
    mount_stream(&server, &["first"]).await;

    session.send("one", Vec::new(), |_| {}).await.unwrap();
    let image = ImageAttachment::from_data_url("data:image/png;base64,AAAA").unwrap();
    session.send("two", vec![image], |_| {}).await.unwrap();

    let bodies = chat_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[1]["messages"],
        json!([
            {"role": "user", "content": "one"},
            {"role": "assistant", "content": "first"},
            {"role": "user", "content": [
                {"type": "text", "text": "two"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ]}
        ])
    );
}

#[tokio::test]
async fn test_unreachable_server_reply_fails_cleanly() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["m"]).await;
    session.set_base_url("http://127.0.0.1:9");

    let outcome = session.send("hi", Vec::new(), |_| {}).await.unwrap();
    assert!(!outcome.is_completed());
    assert!(!session.transcript().is_streaming());
    assert_eq!(session.transcript().last().unwrap().role(), Role::System);
}

#[tokio::test]
async fn test_unreachable_refresh_keeps_conversation() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["a"]).await;
    mount_stream(&server, &["ok"]).await;
    session.send("hi", Vec::new(), |_| {}).await.unwrap();

    session.set_base_url("http://127.0.0.1:9");
    let err = session.refresh_models().await.unwrap_err();
    assert!(matches!(err, EngineError::Client(_)));
    assert!(session.models().is_empty());
    assert!(
        session
            .connection_error()
            .is_some_and(|banner| banner.starts_with("Could not connect to http://127.0.0.1:9"))
    );
    assert_eq!(session.selected_model(), Some("a"));
    assert_eq!(session.transcript().len(), 2);

    session.set_base_url(server.uri());
    session.refresh_models().await.unwrap();
    assert_eq!(session.selected_model(), Some("a"));
    assert_eq!(session.connection_error(), None);
    assert_eq!(session.transcript().len(), 2);
}

#[tokio::test]
async fn test_stream_cut_off_keeps_partial_reply() {
    let server = MockServer::start().await;
    let mut session = connected_session(&server, &["m"]).await;
    session.set_base_url(serve_truncated_stream(&["Hel", "lo"]).await);

    let outcome = session.send("hi", Vec::new(), |_| {}).await.unwrap();

    let ReplyOutcome::Failed { message } = outcome else {
        panic!("expected a failed reply, got {outcome:?}");
    };
    assert!(message.starts_with("Error: Stream interrupted"));
    assert!(message.ends_with(". Ensure LM Studio is running and the model is loaded."));
    assert_eq!(
        summary(session.transcript()),
        vec![
            (Role::User, "hi".to_string(), false),
            (Role::Assistant, "Hello".to_string(), false),
            (Role::System, message.clone(), false),
        ]
    );
}
