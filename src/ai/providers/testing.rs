//! Single-request HTTP server that replays a scripted response body, one
//! write per chunk.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serve one request on a random local port and return its base URL.
pub async fn serve_once(status: &str, content_type: &str, chunks: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind local test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n"
    );

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("Failed to accept request");
        read_request(&mut socket).await;
        let _ = socket.write_all(head.as_bytes()).await;
        for chunk in chunks {
            let _ = socket.write_all(&chunk).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Consume headers and a `Content-Length` body so closing the socket does not
/// reset the connection under the client.
async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(read) = socket.read(&mut buf).await else {
            return;
        };
        if read == 0 {
            return;
        }
        request.extend_from_slice(&buf[..read]);

        let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let body_len = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= header_end + 4 + body_len {
            return;
        }
    }
}

pub fn sse_event(payload: &str) -> Vec<u8> {
    format!("data: {payload}\n\n").into_bytes()
}
