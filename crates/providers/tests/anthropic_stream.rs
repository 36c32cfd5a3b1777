use deskmate_providers::traits::collect_turn;
use deskmate_providers::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SSE_BODY: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":21,\"output_tokens\":1}}}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"好的，\"}}\n\n",
    "event: content_block_stop\n",
    "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_01\",\"name\":\"empty_trash\",\"input\":{}}}\n\n",
    "event: content_block_stop\n",
    "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
    "event: message_delta\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":30}}\n\n",
    "event: message_stop\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

/// Reads one HTTP request (headers plus Content-Length body) and returns it.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                return text;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

async fn write_response(socket: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
}

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "claude-test".into(),
        max_tokens: 256,
        system: "system prompt".into(),
        tools: vec![json!({"name": "empty_trash", "description": "d", "input_schema": {"type": "object"}})],
        messages: vec![Message::user_text("清空回收站")],
        stream: false,
    }
}

fn client_for(addr: std::net::SocketAddr, max_retries: u32) -> AnthropicClient {
    let mut config = AnthropicConfig::new(format!("http://{addr}"), "test-key");
    config.max_retries = max_retries;
    config.connect_timeout = Duration::from_secs(2);
    AnthropicClient::new(config)
}

#[tokio::test]
async fn streams_text_and_tool_calls_from_sse() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        write_response(&mut socket, "200 OK", "text/event-stream", SSE_BODY).await;
        request
    });

    let client = client_for(addr, 0);
    let stream = client.stream(request()).await.unwrap();
    let mut fragments = Vec::new();
    let turn = collect_turn(stream, |t| fragments.push(t.to_string()))
        .await
        .unwrap();

    assert_eq!(fragments, vec!["好的，".to_string()]);
    assert_eq!(turn.text, "好的，");
    assert_eq!(turn.tool_calls.len(), 1);
    assert_eq!(turn.tool_calls[0].id, "toolu_01");
    assert_eq!(turn.tool_calls[0].name, "empty_trash");
    assert_eq!(turn.usage, Usage { input_tokens: 21, output_tokens: 30 });

    let raw_request = server.await.unwrap();
    assert!(raw_request.starts_with("POST /v1/messages"));
    assert!(raw_request.to_ascii_lowercase().contains("x-api-key: test-key"));
    assert!(raw_request.contains("anthropic-version: 2023-06-01"));
    assert!(raw_request.contains("\"stream\":true"));
}

#[tokio::test]
async fn retries_server_errors_before_streaming() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let server_hits = hits.clone();

    tokio::spawn(async move {
        for attempt in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            server_hits.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                write_response(&mut socket, "529 Overloaded", "application/json", "{\"error\":\"overloaded\"}").await;
            } else {
                write_response(&mut socket, "200 OK", "text/event-stream", SSE_BODY).await;
            }
        }
    });

    let client = client_for(addr, 1);
    let stream = client.stream(request()).await.unwrap();
    let turn = collect_turn(stream, |_| {}).await.unwrap();

    assert_eq!(turn.tool_calls.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        write_response(&mut socket, "401 Unauthorized", "application/json", "{\"error\":\"bad key\"}").await;
    });

    let client = client_for(addr, 3);
    let result = client.stream(request()).await;
    match result {
        Err(TransportError::Api { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("bad key"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an API error"),
    }
}

#[tokio::test]
async fn stalled_stream_fails_after_idle_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
        let partial = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":3,\"output_tokens\":0}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"好的，\"}}\n\n",
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(partial.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        // Hold the connection open without sending anything else.
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let mut config = AnthropicConfig::new(format!("http://{addr}"), "test-key");
    config.max_retries = 0;
    config.idle_timeout = Duration::from_millis(200);
    let client = AnthropicClient::new(config);

    let stream = client.stream(request()).await.unwrap();
    let mut fragments = Vec::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        collect_turn(stream, |t| fragments.push(t.to_string())),
    )
    .await
    .expect("idle timeout should end the turn");

    assert!(matches!(result, Err(TransportError::Stream(_))));
    assert_eq!(fragments, vec!["好的，".to_string()]);
}
