use deskmate_memory::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

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
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Serves one canned response and hands back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{addr}"), handle)
}

fn remote(url: String) -> SupabaseMemory {
    let mut config = SupabaseConfig::new(url, "anon-key");
    config.timeout = Duration::from_secs(2);
    SupabaseMemory::new(config)
}

#[tokio::test]
async fn fetch_selects_by_scope_key() {
    let (url, server) = serve_once("200 OK", r##"[{"content":"# remote","updated_at":"2026-01-01T00:00:00Z"}]"##).await;

    let content = remote(url).fetch("device:box").await.unwrap();
    assert_eq!(content.as_deref(), Some("# remote"));

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /rest/v1/ai_memory?"));
    assert!(request.contains("scope_key=eq.device%3Abox"));
    assert!(request.contains("apikey: anon-key"));
    assert!(request.contains("authorization: Bearer anon-key"));
}

#[tokio::test]
async fn fetch_with_no_rows_is_none() {
    let (url, _server) = serve_once("200 OK", "[]").await;
    assert!(remote(url).fetch("device:box").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_merges_duplicates() {
    let (url, server) = serve_once("201 Created", "").await;

    let record = MemoryRecord::new("device:box", "# doc");
    remote(url).upsert(&record).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /rest/v1/ai_memory?on_conflict=scope_key"));
    assert!(request.contains("prefer: resolution=merge-duplicates"));
    assert!(request.contains("\"scope_key\":\"device:box\""));
    assert!(request.contains("\"content\":\"# doc\""));
}

#[tokio::test]
async fn http_errors_surface_as_remote_errors() {
    let (url, _server) = serve_once("503 Service Unavailable", r#"{"message":"down"}"#).await;
    let result = remote(url).fetch("device:box").await;
    match result {
        Err(MemoryError::Remote(msg)) => assert!(msg.contains("503")),
        other => panic!("expected remote error, got {other:?}"),
    }
}
