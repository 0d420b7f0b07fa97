#![cfg(feature = "net")]

//! Connection server.
//!
//! One tokio task per accepted connection; each task reads exactly one
//! request through the configured [`Transport`], dispatches it by
//! `(method, path)` and answers with a single response before closing.
//! The only state shared between tasks is the [`SessionStore`].

use crate::error::GroupError;
use crate::group::Group;
use crate::keypair::KeyPair;
use crate::net::artifact;
use crate::net::codec::{self, format_fields, CodecError, Request, Response, SESSION_HEADER};
use crate::net::config::ServerConfig;
use crate::net::session::{SessionError, SessionId, SessionStore};
use crate::net::transport::{HttpTransport, RawSocketTransport, Transport, TransportKind};
use crate::proof::{generate_proof, verify_proof, Proof, Verdict};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Failures that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    /// The listen address could not be bound.
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: io::Error,
    },
    #[error("listener unusable: {0}")]
    /// The listener could not report its bound address.
    Accept(io::Error),
    #[error("secure random source failed: {0}")]
    /// A handler could not obtain entropy; the process cannot continue safely.
    Entropy(GroupError),
}

#[derive(Debug, Error)]
enum HandlerError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid group element: {0}")]
    Encoding(GroupError),
    #[error("missing or malformed session header")]
    SessionHeader,
    #[error("unknown, expired or busy session {0}")]
    UnknownSession(SessionId),
    #[error("proof rejected")]
    InvalidProof,
    #[error("no route")]
    NotFound,
    #[error("session store full")]
    StoreFull,
    #[error("entropy failure: {0}")]
    Entropy(GroupError),
    #[error("artifact write failed: {0}")]
    Artifact(io::Error),
}

impl HandlerError {
    fn status(&self) -> u16 {
        match self {
            Self::Codec(CodecError::TooLarge(_)) => 413,
            Self::Codec(_) | Self::Encoding(_) | Self::SessionHeader => 400,
            Self::UnknownSession(_) | Self::InvalidProof => 401,
            Self::NotFound => 404,
            Self::StoreFull => 503,
            Self::Entropy(_) | Self::Artifact(_) => 500,
        }
    }
}

impl From<GroupError> for HandlerError {
    fn from(err: GroupError) -> Self {
        if err.is_fatal() {
            Self::Entropy(err)
        } else {
            Self::Encoding(err)
        }
    }
}

impl From<SessionError> for HandlerError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Full(_) => Self::StoreFull,
            SessionError::Entropy(err) => Self::Entropy(err),
        }
    }
}

struct ServerState<G: Group> {
    group: G,
    config: ServerConfig,
    sessions: SessionStore<G::Element>,
    faults: mpsc::UnboundedSender<GroupError>,
}

/// A bound verifier, ready to [`run`](Server::run).
pub struct Server<G: Group> {
    listener: TcpListener,
    state: Arc<ServerState<G>>,
    faults: mpsc::UnboundedReceiver<GroupError>,
}

impl<G: Group> Server<G> {
    /// Binds `config.listen` and prepares an empty session store.
    pub async fn bind(config: ServerConfig, group: G) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        let (tx, rx) = mpsc::unbounded_channel();
        let sessions = SessionStore::new(config.session_ttl, config.max_sessions);
        Ok(Self {
            listener,
            state: Arc::new(ServerState {
                group,
                config,
                sessions,
                faults: tx,
            }),
            faults: rx,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until a handler reports an entropy failure.
    ///
    /// Failed accepts are logged and retried after [`accept_backoff`].
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            state,
            mut faults,
        } = self;
        let addr = listener.local_addr().map_err(ServerError::Accept)?;
        info!(
            module = "ZKP",
            evt = "LISTEN",
            addr = %addr,
            group = state.group.name(),
            transport = ?state.config.transport,
            debug_routes = state.config.debug_routes,
            "verifier listening"
        );
        let mut purge = time::interval(state.config.session_ttl.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(module = "ZKP", evt = "ACCEPT", peer = %peer);
                        let state = Arc::clone(&state);
                        tokio::spawn(handle_connection(stream, peer, state));
                    }
                    Err(err) => {
                        let pause = accept_backoff(&err);
                        warn!(module = "ZKP", evt = "ACCEPT_FAILED", error = %err, pause_ms = pause.as_millis() as u64);
                        time::sleep(pause).await;
                    }
                },
                Some(err) = faults.recv() => {
                    error!(module = "ZKP", evt = "FATAL", error = %err, "stopping verifier");
                    return Err(ServerError::Entropy(err));
                }
                _ = purge.tick() => {
                    let purged = state.sessions.purge_expired_at(Instant::now());
                    if purged > 0 {
                        debug!(module = "ZKP", evt = "PURGE", purged);
                    }
                }
            }
        }
    }
}

/// Delay before retrying after a failed `accept`.
///
/// Errors tied to a single aborted handshake are retried at once; anything
/// else (descriptor exhaustion, memory pressure) waits so the loop does not spin.
fn accept_backoff(err: &io::Error) -> Duration {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => Duration::ZERO,
        _ => ACCEPT_RETRY_DELAY,
    }
}

async fn handle_connection<G: Group>(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState<G>>) {
    let cfg = &state.config;
    match cfg.transport {
        TransportKind::Raw => {
            let transport =
                RawSocketTransport::new(stream, cfg.read_buffer_bytes, cfg.request_timeout);
            serve(transport, peer, &state).await
        }
        TransportKind::Http => {
            let transport = HttpTransport::new(
                stream,
                cfg.max_header_bytes,
                cfg.max_body_bytes,
                cfg.request_timeout,
            );
            serve(transport, peer, &state).await
        }
    }
}

async fn serve<G: Group, T: Transport>(mut transport: T, peer: SocketAddr, state: &ServerState<G>) {
    let response = match transport.receive_request().await {
        Ok(request) => {
            debug!(
                module = "ZKP",
                evt = "REQUEST",
                peer = %peer,
                method = %request.method,
                path = %request.path
            );
            match route(&request, state) {
                Ok(response) => response,
                Err(err) => failure_response(err, peer, state),
            }
        }
        Err(err) => match err.status() {
            Some(status) => {
                warn!(module = "ZKP", evt = "BAD_REQUEST", peer = %peer, status, error = %err);
                Response::status(status)
            }
            None => {
                debug!(module = "ZKP", evt = "DROP", peer = %peer, error = %err);
                return;
            }
        },
    };
    if let Err(err) = transport.send_response(&response).await {
        warn!(module = "ZKP", evt = "WRITE_FAILED", peer = %peer, error = %err);
    }
}

fn failure_response<G: Group>(err: HandlerError, peer: SocketAddr, state: &ServerState<G>) -> Response {
    let status = err.status();
    match err {
        HandlerError::Entropy(fault) => {
            error!(module = "ZKP", evt = "ENTROPY", peer = %peer, error = %fault);
            // The receiver only disappears once the accept loop has already stopped.
            let _ = state.faults.send(fault);
        }
        HandlerError::Artifact(ref io_err) => {
            error!(module = "ZKP", evt = "ARTIFACT", peer = %peer, error = %io_err);
        }
        other => {
            warn!(module = "ZKP", evt = "REJECT", peer = %peer, status, error = %other);
        }
    }
    Response::status(status)
}

fn route<G: Group>(req: &Request, state: &ServerState<G>) -> Result<Response, HandlerError> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/") => Ok(Response::ok()),
        ("GET", "/healthz") => Ok(health(state)),
        ("GET", "/zkp/params") => Ok(params(state)),
        ("GET", "/zkp/initiate") => issue_keypair(state),
        ("POST", "/zkp/initiate") => register_public(req, state),
        ("POST", "/zkp/proof") => verify(req, state),
        ("POST", "/zkp/generate-proof") if state.config.debug_routes => {
            generate_on_behalf(req, state)
        }
        _ => Err(HandlerError::NotFound),
    }
}

fn health<G: Group>(state: &ServerState<G>) -> Response {
    let body = json!({
        "status": "ok",
        "group": state.group.name(),
    })
    .to_string();
    Response::json(body)
}

fn params<G: Group>(state: &ServerState<G>) -> Response {
    let group = &state.group;
    let generator = group.element_to_integer(&group.generator());
    let body = json!({
        "group": group.name(),
        "generator": generator.to_string(),
        "order": group.order().to_string(),
        "encoded_len": group.encoded_len(),
    })
    .to_string();
    Response::json(body)
}

fn session_response(session: SessionId, body: String) -> Response {
    Response::json(body).with_header("X-Zkp-Session", session.to_string())
}

fn issue_keypair<G: Group>(state: &ServerState<G>) -> Result<Response, HandlerError> {
    let group = &state.group;
    let pair = KeyPair::generate(group)?;
    let disclose = state.config.disclose_secret;
    if disclose {
        if let Some(dir) = &state.config.artifact_dir {
            artifact::write_keypair(dir, group, &pair).map_err(HandlerError::Artifact)?;
        }
    }
    // Only a fully prepared response may occupy a slot in the store.
    let session = state.sessions.issue(pair.public().clone())?;
    let public = group.element_to_integer(pair.public());
    let session_raw = session.as_u64();
    let body = if disclose {
        format_fields(&[
            ("session", &session_raw),
            ("public", &public),
            ("private", pair.secret()),
        ])
    } else {
        format_fields(&[("session", &session_raw), ("public", &public)])
    };
    info!(module = "ZKP", evt = "ISSUE", session = %session, disclosed = disclose);
    Ok(session_response(session, body))
}

fn register_public<G: Group>(req: &Request, state: &ServerState<G>) -> Result<Response, HandlerError> {
    let values = codec::parse_fields(req.require_body()?, &["public"])?;
    let public_raw = &values[0];
    let public = state.group.element_from_integer(public_raw)?;
    let session = state.sessions.issue(public)?;
    let session_raw = session.as_u64();
    info!(module = "ZKP", evt = "REGISTER", session = %session);
    let body = format_fields(&[("session", &session_raw), ("public", public_raw)]);
    Ok(session_response(session, body))
}

fn session_header(req: &Request) -> Result<SessionId, HandlerError> {
    req.header(SESSION_HEADER)
        .ok_or(HandlerError::SessionHeader)?
        .parse()
        .map_err(|_| HandlerError::SessionHeader)
}

fn verify<G: Group>(req: &Request, state: &ServerState<G>) -> Result<Response, HandlerError> {
    let session = session_header(req)?;
    let (commitment, response) = codec::parse_proof_body(req.require_body()?)?;
    let commitment = state.group.element_from_integer(&commitment)?;
    // The claim is held across verification: a concurrent submission for
    // the same session sees it as busy and cannot also be accepted.
    let public = state
        .sessions
        .claim(session)
        .ok_or(HandlerError::UnknownSession(session))?;
    let proof = Proof {
        commitment,
        response,
    };
    match verify_proof(&state.group, &proof, &public) {
        Verdict::Valid => {
            state.sessions.consume(session);
            info!(module = "ZKP", evt = "VERIFY", session = %session, verdict = "valid");
            Ok(Response::ok())
        }
        Verdict::Invalid => {
            state.sessions.release(session);
            info!(module = "ZKP", evt = "VERIFY", session = %session, verdict = "invalid");
            Err(HandlerError::InvalidProof)
        }
    }
}

fn generate_on_behalf<G: Group>(
    req: &Request,
    state: &ServerState<G>,
) -> Result<Response, HandlerError> {
    let group = &state.group;
    let values = codec::parse_fields(req.require_body()?, &["public", "private"])?;
    let public = group.element_from_integer(&values[0])?;
    let pair = KeyPair::check(group, public, values[1].clone())?;
    let proof = generate_proof(group, &pair)?;
    if let Some(dir) = &state.config.artifact_dir {
        let path = artifact::write_proof(dir, group, &proof).map_err(HandlerError::Artifact)?;
        debug!(module = "ZKP", evt = "ARTIFACT", path = %path.display());
    }
    let session = state.sessions.issue(pair.public().clone())?;
    let session_raw = session.as_u64();
    let commitment = group.element_to_integer(&proof.commitment);
    info!(module = "ZKP", evt = "GENERATE", session = %session);
    let body = format_fields(&[
        ("session", &session_raw),
        ("commitment", &commitment),
        ("response", &proof.response),
    ]);
    Ok(session_response(session, body))
}
