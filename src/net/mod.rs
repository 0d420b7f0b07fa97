//! Networking for the proof protocol.
//!
//! These modules are gated behind the `net` Cargo feature and provide the
//! wire codec, the server-side transports, the session store, and the
//! connection server that verifies proofs, plus the prover-side clients
//! used by the `zkp` binary.

#![cfg(feature = "net")]

/// Debug artifacts in the wire body format.
pub mod artifact;
/// Prover-side clients over raw sockets and `reqwest`.
pub mod client;
/// HTTP/1.1-subset request/response codec and the literal body grammar.
pub mod codec;
/// Server configuration from defaults, JSON files and the environment.
pub mod config;
/// Connection server and router.
pub mod server;
/// Session tokens binding public keys to verification attempts.
pub mod session;
/// Request framing over accepted connections.
pub mod transport;

pub use client::{ClientError, ClientTransport, HttpClient, Prover, RawClient};
pub use codec::{
    format_fields, format_request, format_response, parse_fields, parse_proof_body,
    parse_request, parse_response, CodecError, Request, Response, SESSION_HEADER,
};
pub use config::{ConfigError, ConfigFile, ServerConfig};
pub use server::{Server, ServerError};
pub use session::{SessionError, SessionId, SessionStore};
pub use transport::{HttpTransport, RawSocketTransport, Transport, TransportError, TransportKind};
