//! Local HTTP listener with scripted replies, for exercising the network paths in tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Raw HTTP/1.1 response with a known length.
pub fn response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Response without Content-Length; the body ends when the connection closes.
pub fn unsized_response(content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        content_type
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Answers one connection per reply, in order, and returns the base URL.
///
/// Connections after the last reply are accepted and never answered.
pub async fn serve(replies: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut replies = replies.into_iter();
        let mut stalled = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            match replies.next() {
                Some(reply) => {
                    read_request(&mut socket).await;
                    let _ = socket.write_all(&reply).await;
                    let _ = socket.shutdown().await;
                }
                None => stalled.push(socket),
            }
        }
    });
    format!("http://{}", addr)
}

async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        request.extend_from_slice(&chunk[..n]);
        let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };

        let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = request.len() - end - 4;
        while body < length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => body += n,
            }
        }
        return;
    }
}
