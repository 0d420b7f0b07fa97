#![cfg(feature = "net")]

//! Prover-side clients.
//!
//! [`Prover`] drives the protocol against a verifier through any
//! [`ClientTransport`]: [`RawClient`] speaks the wire codec over a plain
//! TCP connection, [`HttpClient`] goes through `reqwest`.

use crate::error::GroupError;
use crate::group::Group;
use crate::keypair::KeyPair;
use crate::net::artifact::proof_body;
use crate::net::codec::{self, format_fields, CodecError, SESSION_HEADER};
use crate::net::session::SessionId;
use crate::proof::{generate_proof, Proof, Verdict};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    /// Socket-level failure.
    Io(#[from] io::Error),
    #[error("http error: {0}")]
    /// `reqwest` failure.
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    /// The response could not be decoded.
    Codec(#[from] CodecError),
    #[error(transparent)]
    /// A returned element was invalid, or the OS RNG failed.
    Group(#[from] GroupError),
    #[error("timed out talking to the verifier")]
    /// The exchange did not finish in time.
    Timeout,
    #[error("verifier answered with status {0}")]
    /// Unexpected status code.
    Status(u16),
    #[error("response is missing field \"{0}\"")]
    /// A required body field was absent or out of range.
    MissingField(&'static str),
}

/// Request methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Transport-neutral request.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// Method.
    pub method: Method,
    /// Route.
    pub path: &'static str,
    /// Session token sent in the session header.
    pub session: Option<SessionId>,
    /// Literal body.
    pub body: Option<String>,
}

impl ClientRequest {
    /// A body-less `GET`.
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::Get,
            path,
            session: None,
            body: None,
        }
    }

    /// A `POST` with `body`.
    pub fn post(path: &'static str, body: String) -> Self {
        Self {
            method: Method::Post,
            path,
            session: None,
            body: Some(body),
        }
    }

    /// Attaches a session token.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }
}

/// Transport-neutral response.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// Status code.
    pub status: u16,
    /// Header values keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// Sends one request and waits for the complete response.
pub trait ClientTransport: Send + Sync {
    /// Performs the exchange.
    fn send(
        &self,
        request: ClientRequest,
    ) -> impl Future<Output = Result<ClientResponse, ClientError>> + Send;
}

/// One TCP connection per request, framed with the wire codec.
#[derive(Debug, Clone)]
pub struct RawClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RawClient {
    /// Client for the verifier at `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Overrides the per-exchange deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange(&self, request: &ClientRequest) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let mut headers = vec![("Host", self.addr.to_string())];
        if let Some(session) = request.session {
            headers.push(("X-Zkp-Session", session.to_string()));
        }
        let bytes = codec::format_request(
            request.method.as_str(),
            request.path,
            &headers,
            request.body.as_deref(),
        );
        stream.write_all(&bytes).await?;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        Ok(raw)
    }
}

impl ClientTransport for RawClient {
    async fn send(&self, request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let raw = time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| ClientError::Timeout)??;
        let parsed = codec::parse_response(&raw)?;
        Ok(ClientResponse {
            status: parsed.status,
            headers: parsed.headers,
            body: parsed.body,
        })
    }
}

/// `reqwest`-backed client for verifiers using the buffered HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    inner: reqwest::Client,
}

impl HttpClient {
    /// Client for the verifier at `base_url`, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder()
            .timeout(DEFAULT_CLIENT_TIMEOUT)
            .build()?;
        Ok(Self {
            base: base_url.into(),
            inner,
        })
    }
}

impl ClientTransport for HttpClient {
    async fn send(&self, request: ClientRequest) -> Result<ClientResponse, ClientError> {
        let url = format!("{}{}", self.base.trim_end_matches('/'), request.path);
        let mut builder = match request.method {
            Method::Get => self.inner.get(&url),
            Method::Post => self.inner.post(&url),
        };
        if let Some(session) = request.session {
            builder = builder.header(SESSION_HEADER, session.to_string());
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(ClientResponse {
            status,
            headers,
            body,
        })
    }
}

fn ok_fields(response: ClientResponse) -> Result<Vec<(String, BigUint)>, ClientError> {
    if response.status != 200 {
        return Err(ClientError::Status(response.status));
    }
    Ok(codec::parse_field_list(&response.body)?)
}

fn required<'a>(
    fields: &'a [(String, BigUint)],
    label: &'static str,
) -> Result<&'a BigUint, ClientError> {
    codec::field(fields, label).ok_or(ClientError::MissingField(label))
}

fn session_field(fields: &[(String, BigUint)]) -> Result<SessionId, ClientError> {
    required(fields, "session")?
        .to_u64()
        .map(SessionId::from_u64)
        .ok_or(ClientError::MissingField("session"))
}

/// Prover side of the protocol.
#[derive(Debug)]
pub struct Prover<G: Group, T: ClientTransport> {
    group: G,
    transport: T,
}

impl<G: Group, T: ClientTransport> Prover<G, T> {
    /// Prover over `group` talking through `transport`.
    pub fn new(group: G, transport: T) -> Self {
        Self { group, transport }
    }

    /// The group proofs are made in.
    pub fn group(&self) -> &G {
        &self.group
    }

    /// Registers a client-held public key and returns its session.
    pub async fn register(&self, keypair: &KeyPair<G::Element>) -> Result<SessionId, ClientError> {
        let public = self.group.element_to_integer(keypair.public());
        let body = format_fields(&[("public", &public)]);
        let response = self
            .transport
            .send(ClientRequest::post("/zkp/initiate", body))
            .await?;
        let session = session_field(&ok_fields(response)?)?;
        debug!(module = "ZKP", evt = "REGISTER", session = %session);
        Ok(session)
    }

    /// Asks the verifier to issue a key pair.
    ///
    /// Only works against verifiers that disclose secrets; otherwise the
    /// response lacks `"private"` and this fails with
    /// [`ClientError::MissingField`].
    pub async fn initiate(&self) -> Result<(SessionId, KeyPair<G::Element>), ClientError> {
        let response = self
            .transport
            .send(ClientRequest::get("/zkp/initiate"))
            .await?;
        let fields = ok_fields(response)?;
        let session = session_field(&fields)?;
        let public = self
            .group
            .element_from_integer(required(&fields, "public")?)?;
        let secret = required(&fields, "private")?.clone();
        let pair = KeyPair::check(&self.group, public, secret)?;
        Ok((session, pair))
    }

    /// Submits `proof` under `session`.
    pub async fn submit(
        &self,
        session: SessionId,
        proof: &Proof<G::Element>,
    ) -> Result<Verdict, ClientError> {
        let body = proof_body(&self.group, proof);
        let response = self
            .transport
            .send(ClientRequest::post("/zkp/proof", body).with_session(session))
            .await?;
        match response.status {
            200 => Ok(Verdict::Valid),
            401 => Ok(Verdict::Invalid),
            other => Err(ClientError::Status(other)),
        }
    }

    /// Registers `keypair`, proves knowledge of its secret and submits the proof.
    pub async fn prove_and_submit(
        &self,
        keypair: &KeyPair<G::Element>,
    ) -> Result<Verdict, ClientError> {
        let session = self.register(keypair).await?;
        let proof = generate_proof(&self.group, keypair)?;
        self.submit(session, &proof).await
    }
}
