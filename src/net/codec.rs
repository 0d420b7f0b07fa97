#![cfg(feature = "net")]

//! Minimal HTTP/1.1-subset wire codec.
//!
//! Requests are parsed from a single byte buffer: request line, optional
//! `name: value` headers, and everything after the first blank line as the
//! body.  Bodies follow a deliberately tiny grammar of labelled decimal
//! integers:
//!
//! ```text
//! body  := ws "{" ws field ( ws "," ws field )* ws "}" ws
//! field := "\"" label "\"" ws ":" ws digit+
//! label := [A-Za-z0-9_-]+
//! ```
//!
//! Responses are framed with `\r\n` line endings, an explicit
//! `Content-Length` and `Connection: close`.

use num_bigint::BigUint;
use std::collections::HashMap;
use std::fmt;
use std::str;
use thiserror::Error;

/// Header carrying the session token on requests and responses.
pub const SESSION_HEADER: &str = "x-zkp-session";
/// Longest decimal integer accepted in a body.
pub const MAX_INTEGER_DIGITS: usize = 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Failures while decoding or encoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed request: {0}")]
    /// Request line or header block is not well formed.
    MalformedRequest(String),
    #[error("request has no body")]
    /// A body-carrying route was called without the blank-line delimiter.
    MissingBody,
    #[error("malformed body: {0}")]
    /// Body does not follow the labelled-integer grammar.
    MalformedBody(String),
    #[error("request body truncated: expected {expected} bytes, got {actual}")]
    /// Fewer body bytes arrived than `Content-Length` announced.
    Truncated {
        /// Announced body length.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },
    #[error("request exceeds {0} bytes")]
    /// Request does not fit the configured limits.
    TooLarge(usize),
    #[error("malformed response: {0}")]
    /// Status line or header block of a response is not well formed.
    MalformedResponse(String),
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/zkp/proof`.
    pub path: String,
    /// Protocol version token, e.g. `HTTP/1.1`.
    pub version: String,
    /// Header values keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Bytes after the blank line, or `None` when no blank line was present.
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the body or [`CodecError::MissingBody`].
    pub fn require_body(&self) -> Result<&[u8], CodecError> {
        self.body.as_deref().ok_or(CodecError::MissingBody)
    }
}

/// Returns the offset just past the first `\r\n\r\n`, if any.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|w| w == HEADER_END)
        .map(|pos| pos + HEADER_END.len())
}

/// Parses the `Content-Length` header value, if present.
pub fn content_length(headers: &HashMap<String, String>) -> Result<Option<usize>, CodecError> {
    match headers.get("content-length") {
        None => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| CodecError::MalformedRequest(format!("bad content-length: {value}"))),
    }
}

/// Decodes one request from `bytes`.
///
/// Exactly one request per buffer: there is no pipelining and no chunked
/// transfer coding.  When `Content-Length` is present the body is cut to
/// that length, and a shorter body is reported as [`CodecError::Truncated`].
pub fn parse_request(bytes: &[u8]) -> Result<Request, CodecError> {
    let (head, body) = match find_header_end(bytes) {
        Some(end) => (&bytes[..end - HEADER_END.len()], Some(&bytes[end..])),
        None => (bytes, None),
    };
    let head = str::from_utf8(head)
        .map_err(|_| CodecError::MalformedRequest("header block is not UTF-8".to_string()))?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, path, version) = parse_request_line(request_line)?;
    let headers = parse_headers(lines, CodecError::MalformedRequest)?;

    if headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        return Err(CodecError::MalformedRequest(
            "chunked bodies are not supported".to_string(),
        ));
    }

    let body = match (body, content_length(&headers)?) {
        (Some(body), Some(expected)) if body.len() < expected => {
            return Err(CodecError::Truncated {
                expected,
                actual: body.len(),
            })
        }
        (Some(body), Some(expected)) => Some(body[..expected].to_vec()),
        (Some(body), None) => Some(body.to_vec()),
        (None, _) => None,
    };

    Ok(Request {
        method,
        path,
        version,
        headers,
        body,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String, String), CodecError> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let [method, path, version] = tokens.as_slice() else {
        return Err(CodecError::MalformedRequest(format!(
            "request line has {} tokens, expected 3",
            tokens.len()
        )));
    };
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(CodecError::MalformedRequest(format!("bad method: {method:?}")));
    }
    if !path.starts_with('/') {
        return Err(CodecError::MalformedRequest(format!("bad path: {path:?}")));
    }
    if !version.starts_with("HTTP/") {
        return Err(CodecError::MalformedRequest(format!(
            "bad version: {version:?}"
        )));
    }
    Ok((method.to_string(), path.to_string(), version.to_string()))
}

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
    err: fn(String) -> CodecError,
) -> Result<HashMap<String, String>, CodecError> {
    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| err(format!("header line without colon: {line:?}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(err("empty header name".to_string()));
        }
        headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(headers)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, want: u8) -> Result<(), CodecError> {
        match self.peek() {
            Some(got) if got == want => {
                self.pos += 1;
                Ok(())
            }
            Some(got) => Err(CodecError::MalformedBody(format!(
                "expected '{}' at offset {}, found '{}'",
                want as char,
                self.pos,
                got.escape_ascii()
            ))),
            None => Err(CodecError::MalformedBody(format!(
                "expected '{}' at offset {}, found end of body",
                want as char, self.pos
            ))),
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.bytes[start..self.pos]
    }

    fn label(&mut self) -> Result<String, CodecError> {
        self.expect(b'"')?;
        let raw = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if raw.is_empty() {
            return Err(CodecError::MalformedBody(format!(
                "empty or invalid label at offset {}",
                self.pos
            )));
        }
        self.expect(b'"')?;
        // Only ASCII bytes were accepted above.
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn integer(&mut self) -> Result<BigUint, CodecError> {
        let start = self.pos;
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(CodecError::MalformedBody(format!(
                "expected a decimal integer at offset {start}"
            )));
        }
        if digits.len() > MAX_INTEGER_DIGITS {
            return Err(CodecError::MalformedBody(format!(
                "integer longer than {MAX_INTEGER_DIGITS} digits"
            )));
        }
        BigUint::parse_bytes(digits, 10)
            .ok_or_else(|| CodecError::MalformedBody("invalid decimal integer".to_string()))
    }
}

/// Parses every `"label":integer` field of a body, in order.
pub fn parse_field_list(body: &[u8]) -> Result<Vec<(String, BigUint)>, CodecError> {
    let mut cur = Cursor::new(body);
    let mut fields = Vec::new();
    cur.skip_ws();
    cur.expect(b'{')?;
    loop {
        cur.skip_ws();
        let label = cur.label()?;
        cur.skip_ws();
        cur.expect(b':')?;
        cur.skip_ws();
        let value = cur.integer()?;
        fields.push((label, value));
        cur.skip_ws();
        match cur.peek() {
            Some(b',') => cur.pos += 1,
            Some(b'}') => {
                cur.pos += 1;
                break;
            }
            _ => cur.expect(b'}')?,
        }
    }
    cur.skip_ws();
    if cur.pos != body.len() {
        return Err(CodecError::MalformedBody(format!(
            "trailing bytes after offset {}",
            cur.pos
        )));
    }
    Ok(fields)
}

/// Parses a body that must consist of exactly `labels`, in that order.
pub fn parse_fields(body: &[u8], labels: &[&str]) -> Result<Vec<BigUint>, CodecError> {
    let fields = parse_field_list(body)?;
    if fields.len() != labels.len() {
        return Err(CodecError::MalformedBody(format!(
            "expected {} fields, found {}",
            labels.len(),
            fields.len()
        )));
    }
    fields
        .into_iter()
        .zip(labels)
        .map(|((label, value), want)| {
            if label == *want {
                Ok(value)
            } else {
                Err(CodecError::MalformedBody(format!(
                    "expected field \"{want}\", found \"{label}\""
                )))
            }
        })
        .collect()
}

/// Parses `{"commitment":C,"response":R}`.
pub fn parse_proof_body(body: &[u8]) -> Result<(BigUint, BigUint), CodecError> {
    let mut values = parse_fields(body, &["commitment", "response"])?.into_iter();
    match (values.next(), values.next()) {
        (Some(commitment), Some(response)) => Ok((commitment, response)),
        _ => Err(CodecError::MalformedBody("expected two fields".to_string())),
    }
}

/// Looks up a field by label in a parsed field list.
pub fn field<'a>(fields: &'a [(String, BigUint)], label: &str) -> Option<&'a BigUint> {
    fields
        .iter()
        .find(|(name, _)| name == label)
        .map(|(_, value)| value)
}

/// Renders the canonical body for `fields`.
pub fn format_fields(fields: &[(&str, &dyn fmt::Display)]) -> String {
    let inner: Vec<String> = fields
        .iter()
        .map(|(label, value)| format!("\"{label}\":{value}"))
        .collect();
    format!("{{{}}}", inner.join(","))
}

/// Reason phrase for the status codes this crate emits.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A response ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Extra headers, emitted in order after `Content-Type`.
    pub headers: Vec<(String, String)>,
    /// Optional content type of the body.
    pub content_type: Option<String>,
    /// Body bytes (possibly empty).
    pub body: Vec<u8>,
}

impl Response {
    /// An empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: None,
            body: Vec::new(),
        }
    }

    /// An empty `200 OK`.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// A `200 OK` carrying a JSON-shaped body.
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            body: body.into().into_bytes(),
            ..Self::ok()
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Frames the response for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, status_text(self.status));
        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Frames a status line, optional content type and optional body.
pub fn format_response(
    status_code: u16,
    status_text: &str,
    content_type: Option<&str>,
    body: Option<&[u8]>,
) -> Vec<u8> {
    let body = body.unwrap_or_default();
    let mut head = format!("HTTP/1.1 {status_code} {status_text}\r\n");
    if let Some(content_type) = content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

/// Frames a request for the raw-socket client.
pub fn format_request(
    method: &str,
    path: &str,
    headers: &[(&str, String)],
    body: Option<&str>,
) -> Vec<u8> {
    let mut out = format!("{method} {path} HTTP/1.1\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = body {
        out.push_str("Content-Type: application/json\r\n");
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("\r\n");
    if let Some(body) = body {
        out.push_str(body);
    }
    out.into_bytes()
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase (may be empty).
    pub reason: String,
    /// Header values keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// Decodes a complete response (the peer closed the connection after writing it).
pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, CodecError> {
    let end = find_header_end(bytes)
        .ok_or_else(|| CodecError::MalformedResponse("missing header terminator".to_string()))?;
    let head = str::from_utf8(&bytes[..end - HEADER_END.len()])
        .map_err(|_| CodecError::MalformedResponse("header block is not UTF-8".to_string()))?;
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(CodecError::MalformedResponse(format!(
            "bad status line: {status_line:?}"
        )));
    }
    let status = parts
        .next()
        .filter(|code| code.len() == 3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            CodecError::MalformedResponse(format!("bad status code: {status_line:?}"))
        })?;
    let reason = parts.next().unwrap_or_default().to_string();
    let headers = parse_headers(lines, CodecError::MalformedResponse)?;
    let mut body = bytes[end..].to_vec();
    if let Some(len) = content_length(&headers)? {
        if body.len() < len {
            return Err(CodecError::MalformedResponse(format!(
                "body truncated: expected {len} bytes, got {}",
                body.len()
            )));
        }
        body.truncate(len);
    }
    Ok(ParsedResponse {
        status,
        reason,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_get_without_body() {
        let req = parse_request(b"GET /zkp/initiate HTTP/1.1\r\nHost: localhost\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/zkp/initiate");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("HOST"), Some("localhost"));
        assert_eq!(req.body, None);
        assert_eq!(req.require_body(), Err(CodecError::MissingBody));
    }

    #[test]
    fn parses_post_with_body() {
        let raw = b"POST /zkp/proof HTTP/1.1\r\nX-Zkp-Session: 42\r\nContent-Length: 30\r\n\r\n{\"commitment\":1,\"response\":22}";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.header(SESSION_HEADER), Some("42"));
        let body = req.require_body().unwrap();
        assert_eq!(
            parse_proof_body(body).unwrap(),
            (BigUint::from(1u8), BigUint::from(22u8))
        );
    }

    #[test]
    fn body_without_content_length_runs_to_end() {
        let req = parse_request(b"POST /x HTTP/1.1\r\n\r\nabc").unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn short_body_is_truncated_error() {
        let err = parse_request(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                expected: 10,
                actual: 3
            }
        );
    }

    #[test]
    fn malformed_request_lines() {
        for raw in [
            &b"GET\r\n\r\n"[..],
            b"GET /\r\n\r\n",
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET  / HTTP/1.1\r\n\r\n",
            b"get / HTTP/1.1\r\n\r\n",
            b"GET zkp HTTP/1.1\r\n\r\n",
            b"GET / FTP/1.0\r\n\r\n",
            b"",
            b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n",
            b"\xff\xfe / HTTP/1.1\r\n\r\n",
        ] {
            assert!(
                matches!(parse_request(raw), Err(CodecError::MalformedRequest(_))),
                "accepted {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn chunked_requests_are_rejected() {
        let raw = b"POST /zkp/proof HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(
            parse_request(raw),
            Err(CodecError::MalformedRequest(_))
        ));
    }

    #[test]
    fn proof_body_grammar() {
        assert_eq!(
            parse_proof_body(br#"{"commitment":12345,"response":67890}"#).unwrap(),
            (BigUint::from(12345u32), BigUint::from(67890u32))
        );
        assert_eq!(
            parse_proof_body(b" { \"commitment\" : 1 ,\n \"response\":2 }\r\n").unwrap(),
            (BigUint::from(1u8), BigUint::from(2u8))
        );
        for bad in [
            &br#"{"response":1,"commitment":2}"#[..],
            br#"{"commitment":1}"#,
            br#"{"commitment":1,"response":2,"extra":3}"#,
            br#"{"commitment":-1,"response":2}"#,
            br#"{"commitment":1.5,"response":2}"#,
            br#"{"commitment":"1","response":2}"#,
            br#"{"commitment":1,"response":2"#,
            br#"{"commitment":1,"response":2}x"#,
            br#"{"commitment":1,,"response":2}"#,
            br#"{}"#,
            br#"{"":1,"response":2}"#,
            b"",
        ] {
            assert!(
                matches!(parse_proof_body(bad), Err(CodecError::MalformedBody(_))),
                "accepted {:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn oversized_integers_are_rejected() {
        let digits = "9".repeat(MAX_INTEGER_DIGITS + 1);
        let body = format!("{{\"commitment\":{digits},\"response\":1}}");
        assert!(matches!(
            parse_proof_body(body.as_bytes()),
            Err(CodecError::MalformedBody(_))
        ));
    }

    #[test]
    fn format_fields_is_parseable() {
        let session = 7u64;
        let public = BigUint::from(99u8);
        let body = format_fields(&[("session", &session), ("public", &public)]);
        assert_eq!(body, r#"{"session":7,"public":99}"#);
        let fields = parse_field_list(body.as_bytes()).unwrap();
        assert_eq!(field(&fields, "public"), Some(&public));
        assert_eq!(field(&fields, "private"), None);
    }

    #[test]
    fn response_framing() {
        let bytes = format_response(200, "OK", Some("text/plain"), Some(b"hi"));
        assert_eq!(
            bytes,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi"
        );
        assert_eq!(
            format_response(404, "Not Found", None, None),
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn response_roundtrip_through_parser() {
        let resp = Response::json(r#"{"session":5}"#).with_header("X-Zkp-Session", "5");
        let parsed = parse_response(&resp.encode()).unwrap();
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.reason, "OK");
        assert_eq!(parsed.headers.get(SESSION_HEADER).map(String::as_str), Some("5"));
        assert_eq!(parsed.body, br#"{"session":5}"#);
    }

    #[test]
    fn request_framing_is_parseable() {
        let body = r#"{"public":3}"#;
        let bytes = format_request(
            "POST",
            "/zkp/initiate",
            &[("Host", "localhost".to_string())],
            Some(body),
        );
        let req = parse_request(&bytes).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.require_body().unwrap(), body.as_bytes());
    }

    #[test]
    fn bad_responses() {
        assert!(parse_response(b"HTTP/1.1 200 OK\r\n").is_err());
        assert!(parse_response(b"HTTP/1.1 2000 OK\r\n\r\n").is_err());
        assert!(parse_response(b"SMTP 200 OK\r\n\r\n").is_err());
        assert!(parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nab").is_err());
    }

    proptest! {
        #[test]
        fn recovers_two_integers(a in proptest::collection::vec(any::<u8>(), 1..64),
                                 b in proptest::collection::vec(any::<u8>(), 1..64)) {
            let commitment = BigUint::from_bytes_be(&a);
            let response = BigUint::from_bytes_be(&b);
            let body = format_fields(&[("commitment", &commitment), ("response", &response)]);
            prop_assert_eq!(parse_proof_body(body.as_bytes()).unwrap(), (commitment, response));
        }

        #[test]
        fn arbitrary_bytes_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = parse_request(&raw);
            let _ = parse_field_list(&raw);
            let _ = parse_response(&raw);
        }
    }
}
