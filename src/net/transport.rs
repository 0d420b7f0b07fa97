#![cfg(feature = "net")]

//! Server-side request framing.
//!
//! A [`Transport`] owns one accepted connection and yields at most one
//! request from it.  Two framings are provided:
//!
//! * [`RawSocketTransport`] performs a single read into a fixed buffer and
//!   parses whatever arrived.  A read that fills the buffer is rejected
//!   rather than silently truncated.
//! * [`HttpTransport`] keeps reading until the header block is complete and
//!   then until `Content-Length` body bytes have arrived, within limits.

use crate::net::codec::{self, CodecError, Request, Response};
use serde::Deserialize;
use std::future::Future;
use std::io;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

/// Default read buffer for [`RawSocketTransport`].
pub const DEFAULT_READ_BUFFER_BYTES: usize = 2048;
/// Default header limit for [`HttpTransport`].
pub const DEFAULT_MAX_HEADER_BYTES: usize = 32 * 1024;
/// Default body limit for [`HttpTransport`].
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Failure to obtain a request from a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection before sending a request")]
    /// Zero bytes were read.
    Closed,
    #[error("timed out waiting for the request")]
    /// The read deadline elapsed.
    Timeout,
    #[error(transparent)]
    /// The bytes did not form an acceptable request.
    Codec(#[from] CodecError),
    #[error("i/o error: {0}")]
    /// Socket-level failure.
    Io(#[from] io::Error),
}

impl TransportError {
    /// Status code reported to the peer, or `None` when no response should be written.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Closed | Self::Io(_) => None,
            Self::Timeout => Some(408),
            Self::Codec(CodecError::TooLarge(_)) => Some(413),
            Self::Codec(_) => Some(400),
        }
    }
}

/// Selects the framing used by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Single fixed-size read per connection.
    #[default]
    Raw,
    /// Header-then-body reads driven by `Content-Length`.
    Http,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// One connection's worth of request/response exchange.
pub trait Transport: Send {
    /// Reads and decodes the request.
    fn receive_request(&mut self) -> impl Future<Output = Result<Request, TransportError>> + Send;

    /// Writes `response` and closes the write half.
    fn send_response(&mut self, response: &Response) -> impl Future<Output = io::Result<()>> + Send;
}

async fn write_and_close<S>(stream: &mut S, response: &Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&response.encode()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Single-read framing over any byte stream.
#[derive(Debug)]
pub struct RawSocketTransport<S> {
    stream: S,
    buffer_len: usize,
    timeout: Duration,
}

impl<S> RawSocketTransport<S> {
    /// Wraps `stream` with a read buffer of `buffer_len` bytes.
    pub fn new(stream: S, buffer_len: usize, timeout: Duration) -> Self {
        Self {
            stream,
            buffer_len: buffer_len.max(1),
            timeout,
        }
    }
}

impl<S> Transport for RawSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive_request(&mut self) -> Result<Request, TransportError> {
        let mut buf = vec![0u8; self.buffer_len];
        let n = time::timeout(self.timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        if n == buf.len() {
            return Err(CodecError::TooLarge(self.buffer_len).into());
        }
        Ok(codec::parse_request(&buf[..n])?)
    }

    async fn send_response(&mut self, response: &Response) -> io::Result<()> {
        write_and_close(&mut self.stream, response).await
    }
}

/// Content-Length driven framing over any byte stream.
#[derive(Debug)]
pub struct HttpTransport<S> {
    stream: S,
    max_header_bytes: usize,
    max_body_bytes: usize,
    timeout: Duration,
}

impl<S> HttpTransport<S> {
    /// Wraps `stream` with the given limits.
    pub fn new(stream: S, max_header_bytes: usize, max_body_bytes: usize, timeout: Duration) -> Self {
        Self {
            stream,
            max_header_bytes,
            max_body_bytes,
            timeout,
        }
    }
}

impl<S> HttpTransport<S>
where
    S: AsyncRead + Unpin + Send,
{
    async fn read_some(&mut self, buf: &mut Vec<u8>, want: usize) -> Result<usize, TransportError> {
        let mut tmp = vec![0u8; want.clamp(1, 8192)];
        let n = time::timeout(self.timeout, self.stream.read(&mut tmp))
            .await
            .map_err(|_| TransportError::Timeout)??;
        buf.extend_from_slice(&tmp[..n]);
        Ok(n)
    }
}

impl<S> Transport for HttpTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive_request(&mut self) -> Result<Request, TransportError> {
        let mut buf = Vec::new();
        let header_end = loop {
            if let Some(end) = codec::find_header_end(&buf) {
                break end;
            }
            if buf.len() > self.max_header_bytes {
                return Err(CodecError::TooLarge(self.max_header_bytes).into());
            }
            if self.read_some(&mut buf, 1024).await? == 0 {
                if buf.is_empty() {
                    return Err(TransportError::Closed);
                }
                // Peer half-closed without a blank line: parse what we have.
                return Ok(codec::parse_request(&buf)?);
            }
        };

        // Decode the head alone (without the blank line) to learn the body length.
        let head = codec::parse_request(&buf[..header_end - 4])?;
        let body_len = codec::content_length(&head.headers)?.unwrap_or(0);
        if body_len > self.max_body_bytes {
            return Err(CodecError::TooLarge(self.max_body_bytes).into());
        }
        let total = header_end + body_len;
        while buf.len() < total {
            let want = total - buf.len();
            if self.read_some(&mut buf, want).await? == 0 {
                break;
            }
        }
        if buf.len() < total {
            return Err(CodecError::Truncated {
                expected: body_len,
                actual: buf.len() - header_end,
            }
            .into());
        }
        Ok(codec::parse_request(&buf[..total])?)
    }

    async fn send_response(&mut self, response: &Response) -> io::Result<()> {
        write_and_close(&mut self.stream, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn raw_transport_reads_one_buffer() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut transport = RawSocketTransport::new(server, DEFAULT_READ_BUFFER_BYTES, TIMEOUT);
        let req = transport.receive_request().await.unwrap();
        assert_eq!(req.path, "/healthz");

        transport.send_response(&Response::ok()).await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn raw_transport_rejects_full_buffer() {
        let (mut client, server) = duplex(4096);
        let mut raw = b"POST /zkp/proof HTTP/1.1\r\n\r\n".to_vec();
        raw.resize(64, b'9');
        client.write_all(&raw).await.unwrap();
        let mut transport = RawSocketTransport::new(server, 64, TIMEOUT);
        let err = transport.receive_request().await.unwrap_err();
        assert!(matches!(err, TransportError::Codec(CodecError::TooLarge(64))));
        assert_eq!(err.status(), Some(413));
    }

    #[tokio::test]
    async fn raw_transport_reports_close_and_timeout() {
        let (client, server) = duplex(64);
        drop(client);
        let mut transport = RawSocketTransport::new(server, 128, TIMEOUT);
        let err = transport.receive_request().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert_eq!(err.status(), None);

        let (_client, server) = duplex(64);
        let mut transport = RawSocketTransport::new(server, 128, Duration::from_millis(20));
        let err = transport.receive_request().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert_eq!(err.status(), Some(408));
    }

    #[tokio::test]
    async fn http_transport_assembles_split_body() {
        let (mut client, server) = duplex(4096);
        let mut transport =
            HttpTransport::new(server, DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_BODY_BYTES, TIMEOUT);
        let writer = tokio::spawn(async move {
            client
                .write_all(b"POST /zkp/proof HTTP/1.1\r\nContent-Length: 30\r\n")
                .await
                .unwrap();
            time::sleep(Duration::from_millis(10)).await;
            client.write_all(b"\r\n{\"commitment\":1,").await.unwrap();
            time::sleep(Duration::from_millis(10)).await;
            client.write_all(b"\"response\":22}").await.unwrap();
            client
        });
        let req = transport.receive_request().await.unwrap();
        let body = req.require_body().unwrap();
        assert_eq!(body, br#"{"commitment":1,"response":22}"#);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn http_transport_enforces_body_limit() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"POST /zkp/proof HTTP/1.1\r\nContent-Length: 999999\r\n\r\n")
            .await
            .unwrap();
        let mut transport = HttpTransport::new(server, 1024, 1024, TIMEOUT);
        let err = transport.receive_request().await.unwrap_err();
        assert_eq!(err.status(), Some(413));
    }

    #[tokio::test]
    async fn http_transport_reports_truncated_body() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"POST /zkp/proof HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        let mut transport = HttpTransport::new(server, 1024, 1024, TIMEOUT);
        let err = transport.receive_request().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Codec(CodecError::Truncated {
                expected: 10,
                actual: 3
            })
        ));
    }

    #[test]
    fn transport_kind_parses() {
        assert_eq!("raw".parse::<TransportKind>(), Ok(TransportKind::Raw));
        assert_eq!("HTTP".parse::<TransportKind>(), Ok(TransportKind::Http));
        assert!("udp".parse::<TransportKind>().is_err());
    }
}
