#![cfg(feature = "net")]

//! Debug artifacts written next to the server.
//!
//! Both files use the wire body format, so they can be replayed with
//! `curl --data @schnorrProof.json`.

use crate::group::Group;
use crate::keypair::KeyPair;
use crate::net::codec::format_fields;
use crate::proof::Proof;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the key pair artifact.
pub const KEYPAIR_FILE: &str = "keyPair.json";
/// File name of the proof artifact.
pub const PROOF_FILE: &str = "schnorrProof.json";

/// Body `{"public":P,"private":X}` for `pair`.
pub fn keypair_body<G: Group>(group: &G, pair: &KeyPair<G::Element>) -> String {
    let public = group.element_to_integer(pair.public());
    format_fields(&[("public", &public), ("private", pair.secret())])
}

/// Body `{"commitment":T,"response":S}` for `proof`.
pub fn proof_body<G: Group>(group: &G, proof: &Proof<G::Element>) -> String {
    let commitment = group.element_to_integer(&proof.commitment);
    format_fields(&[("commitment", &commitment), ("response", &proof.response)])
}

fn write(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, body)?;
    Ok(path)
}

/// Writes [`KEYPAIR_FILE`] under `dir`.
pub fn write_keypair<G: Group>(
    dir: &Path,
    group: &G,
    pair: &KeyPair<G::Element>,
) -> io::Result<PathBuf> {
    write(dir, KEYPAIR_FILE, &keypair_body(group, pair))
}

/// Writes [`PROOF_FILE`] under `dir`.
pub fn write_proof<G: Group>(dir: &Path, group: &G, proof: &Proof<G::Element>) -> io::Result<PathBuf> {
    write(dir, PROOF_FILE, &proof_body(group, proof))
}
