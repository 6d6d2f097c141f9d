//! Just enough HTTP/1.1 to read one request and write one response per
//! connection. The fault server needs control over the bytes on the wire
//! (dropped connections, lying Content-Length headers) that a conforming
//! server framework does not give.

use axum::http::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{MAX_REQUEST_BODY, MAX_REQUEST_HEAD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug, Error)]
pub(crate) enum RequestError {
    #[error("connection closed before a complete request")]
    Closed,

    #[error("request too large")]
    TooLarge,

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) async fn read_request<S>(stream: &mut S) -> Result<Request, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(RequestError::TooLarge);
        }
        let wanted = buf.len() + 1;
        fill(stream, &mut buf, wanted).await?;
    };

    let head = std::str::from_utf8(&buf[..head_end])
        .map_err(|_| RequestError::Malformed("request head is not UTF-8"))?;
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(target), Some(_version)) =
        (request_line.next(), request_line.next(), request_line.next())
    else {
        return Err(RequestError::Malformed("bad request line"));
    };
    let path = target.split('?').next().unwrap_or(target).to_string();
    let method = method.to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(RequestError::Malformed("bad header line"));
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| RequestError::Malformed("bad content-length"))?;
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            if !value.trim().eq_ignore_ascii_case("chunked") {
                return Err(RequestError::Malformed("unsupported transfer-encoding"));
            }
            chunked = true;
        }
    }

    let rest = buf.split_off(head_end + 4);
    let body = if chunked {
        read_chunked_body(stream, rest).await?
    } else {
        if content_length > MAX_REQUEST_BODY {
            return Err(RequestError::TooLarge);
        }
        let mut body = rest;
        fill(stream, &mut body, content_length).await?;
        body.truncate(content_length);
        body
    };

    Ok(Request { method, path, body })
}

/// Reads until `buf` holds at least `len` bytes.
async fn fill<S>(stream: &mut S, buf: &mut Vec<u8>, len: usize) -> Result<(), RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    while buf.len() < len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Removes one CRLF-terminated line from the front of `buf`, reading more
/// as needed. The terminator is not returned.
async fn take_line<S>(stream: &mut S, buf: &mut Vec<u8>) -> Result<String, RequestError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = buf.windows(2).position(|w| w == b"\r\n") {
            let mut line: Vec<u8> = buf.drain(..end + 2).collect();
            line.truncate(end);
            return String::from_utf8(line)
                .map_err(|_| RequestError::Malformed("chunk line is not UTF-8"));
        }
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(RequestError::TooLarge);
        }
        let wanted = buf.len() + 1;
        fill(stream, buf, wanted).await?;
    }
}

/// Decodes a `Transfer-Encoding: chunked` body. `buf` holds whatever
/// followed the head. Chunk extensions and trailers are discarded.
async fn read_chunked_body<S>(stream: &mut S, mut buf: Vec<u8>) -> Result<Vec<u8>, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let line = take_line(stream, &mut buf).await?;
        let size = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| RequestError::Malformed("bad chunk size"))?;
        if size == 0 {
            break;
        }
        if size > MAX_REQUEST_BODY - body.len() {
            return Err(RequestError::TooLarge);
        }
        fill(stream, &mut buf, size + 2).await?;
        if &buf[size..size + 2] != b"\r\n" {
            return Err(RequestError::Malformed("chunk is not followed by CRLF"));
        }
        body.extend_from_slice(&buf[..size]);
        buf.drain(..size + 2);
    }
    while !take_line(stream, &mut buf).await?.is_empty() {}
    Ok(body)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Writes a complete response. `declared_length` overrides the
/// Content-Length header without changing the bytes written.
pub(crate) async fn write_response<S>(
    stream: &mut S,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
    declared_length: Option<usize>,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
    if let Some(content_type) = content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        declared_length.unwrap_or(body.len())
    ));
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_post_in_pieces() {
        let (mut client, mut server) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            client
                .write_all(
                    b"POST /verifyReceipt?x=1 HTTP/1.1\r\nHost: localhost\r\ncontent-length: 11\r\n\r\nhello world",
                )
                .await
                .unwrap();
            client
        });

        let request = read_request(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/verifyReceipt");
        assert_eq!(request.body, b"hello world");
    }

    #[tokio::test]
    async fn reads_a_chunked_body() {
        let (mut client, mut server) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            client
                .write_all(
                    b"POST /verifyReceipt HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                      5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: 1\r\n\r\n",
                )
                .await
                .unwrap();
            client
        });

        let request = read_request(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(request.body, b"hello world");
    }

    #[tokio::test]
    async fn rejects_bad_chunk_framing() {
        for raw in [
            &b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"[..],
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nabc\r\n0\r\n\r\n",
            b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n",
        ] {
            let (mut client, mut server) = tokio::io::duplex(256);
            client.write_all(raw).await.unwrap();
            assert!(matches!(
                read_request(&mut server).await,
                Err(RequestError::Malformed(_))
            ));
        }
    }

    #[tokio::test]
    async fn early_close_is_reported() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(matches!(
            read_request(&mut server).await,
            Err(RequestError::Closed)
        ));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();
        assert!(matches!(
            read_request(&mut server).await,
            Err(RequestError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn declared_length_can_lie() {
        let mut out = Vec::new();
        write_response(&mut out, 200, None, b"{}", Some(64))
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 64\r\n"));
        assert!(!text.contains("Content-Type"));
        assert!(text.ends_with("\r\n\r\n{}"));
    }
}
