#![cfg(feature = "net")]

//! Short-lived verification sessions.
//!
//! Every public key the server will verify against is bound to a random
//! [`SessionId`].  Proofs name the session they answer, so concurrent
//! provers never observe each other's keys.  Entries expire after a fixed
//! time-to-live and the store refuses new sessions once it holds
//! `capacity` live entries.
//!
//! Verification goes through [`SessionStore::claim`]: a claimed session is
//! invisible to further claims until it is either consumed or released, so
//! at most one proof per session is ever checked at a time.

use crate::error::GroupError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Opaque session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw token.
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw token.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    fn random() -> Result<Self, GroupError> {
        let mut bytes = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| GroupError::RandomSource(err.to_string()))?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Failure to open a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store is full ({0} live sessions)")]
    /// Capacity reached even after purging expired entries.
    Full(usize),
    #[error(transparent)]
    /// The OS RNG could not produce a token.
    Entropy(#[from] GroupError),
}

#[derive(Debug)]
struct Entry<E> {
    public: E,
    expires_at: Instant,
    claimed: bool,
}

/// Thread-safe map from session token to the public key under test.
#[derive(Debug)]
pub struct SessionStore<E> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<SessionId, Entry<E>>>,
}

impl<E: Clone> SessionStore<E> {
    /// Creates an empty store.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionId, Entry<E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a session for `public`.
    pub fn issue(&self, public: E) -> Result<SessionId, SessionError> {
        self.issue_at(public, Instant::now())
    }

    /// [`SessionStore::issue`] with an explicit clock.
    pub fn issue_at(&self, public: E, now: Instant) -> Result<SessionId, SessionError> {
        let mut entries = self.entries();
        if entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.capacity {
                return Err(SessionError::Full(entries.len()));
            }
        }
        let id = loop {
            let id = SessionId::random()?;
            if !entries.contains_key(&id) {
                break id;
            }
        };
        entries.insert(
            id,
            Entry {
                public,
                expires_at: now + self.ttl,
                claimed: false,
            },
        );
        Ok(id)
    }

    /// Returns the public key bound to `id` if the session is live.
    pub fn lookup(&self, id: SessionId) -> Option<E> {
        self.lookup_at(id, Instant::now())
    }

    /// [`SessionStore::lookup`] with an explicit clock.  Expired entries are dropped.
    pub fn lookup_at(&self, id: SessionId, now: Instant) -> Option<E> {
        let mut entries = self.entries();
        match entries.get(&id) {
            Some(entry) if entry.expires_at > now => Some(entry.public.clone()),
            Some(_) => {
                entries.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Reserves a live, unclaimed session for verification and returns its key.
    ///
    /// Concurrent callers naming the same session get `None` until the
    /// winner calls [`SessionStore::consume`] or [`SessionStore::release`].
    pub fn claim(&self, id: SessionId) -> Option<E> {
        self.claim_at(id, Instant::now())
    }

    /// [`SessionStore::claim`] with an explicit clock.  Expired entries are dropped.
    pub fn claim_at(&self, id: SessionId, now: Instant) -> Option<E> {
        let mut entries = self.entries();
        let live = entries.get(&id)?.expires_at > now;
        if !live {
            entries.remove(&id);
            return None;
        }
        let entry = entries.get_mut(&id)?;
        if entry.claimed {
            return None;
        }
        entry.claimed = true;
        Some(entry.public.clone())
    }

    /// Returns a claimed session to the pool after a rejected proof.
    pub fn release(&self, id: SessionId) {
        if let Some(entry) = self.entries().get_mut(&id) {
            entry.claimed = false;
        }
    }

    /// Closes the session, returning its key if it was still live.
    pub fn consume(&self, id: SessionId) -> Option<E> {
        self.consume_at(id, Instant::now())
    }

    /// [`SessionStore::consume`] with an explicit clock.
    pub fn consume_at(&self, id: SessionId, now: Instant) -> Option<E> {
        self.entries()
            .remove(&id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.public)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// `true` when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn issue_lookup_consume() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let id = store.issue("alice").unwrap();
        assert_eq!(store.lookup(id), Some("alice"));
        assert_eq!(store.lookup(id), Some("alice"));
        assert_eq!(store.consume(id), Some("alice"));
        assert_eq!(store.lookup(id), None);
        assert_eq!(store.consume(id), None);
    }

    #[test]
    fn claim_is_exclusive_until_release() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let id = store.issue("k").unwrap();
        assert_eq!(store.claim(id), Some("k"));
        assert_eq!(store.claim(id), None);
        assert_eq!(store.lookup(id), Some("k"));

        store.release(id);
        assert_eq!(store.claim(id), Some("k"));
        assert_eq!(store.consume(id), Some("k"));
        assert_eq!(store.claim(id), None);
        store.release(id);
        assert!(store.is_empty());
    }

    #[test]
    fn expired_session_cannot_be_claimed() {
        let store = SessionStore::new(Duration::from_secs(5), 8);
        let start = Instant::now();
        let id = store.issue_at('k', start).unwrap();
        assert_eq!(store.claim_at(id, start + Duration::from_secs(5)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn racing_claims_have_one_winner() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60), 8));
        for _ in 0..50 {
            let id = store.issue(7u8).unwrap();
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || store.claim(id).is_some())
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
            store.consume(id);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let a = store.issue(1u32).unwrap();
        let b = store.issue(2u32).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.lookup(a), Some(1));
        assert_eq!(store.lookup(b), Some(2));
        assert_eq!(store.lookup(SessionId::from_u64(a.as_u64() ^ 1)), None);
    }

    #[test]
    fn entries_expire() {
        let store = SessionStore::new(Duration::from_secs(5), 8);
        let start = Instant::now();
        let id = store.issue_at('k', start).unwrap();
        assert_eq!(store.lookup_at(id, start + Duration::from_secs(4)), Some('k'));
        assert_eq!(store.lookup_at(id, start + Duration::from_secs(5)), None);
        assert!(store.is_empty());

        let id = store.issue_at('k', start).unwrap();
        assert_eq!(store.consume_at(id, start + Duration::from_secs(6)), None);
    }

    #[test]
    fn capacity_is_enforced_after_purging() {
        let store = SessionStore::new(Duration::from_secs(5), 2);
        let start = Instant::now();
        store.issue_at(1, start).unwrap();
        store.issue_at(2, start).unwrap();
        assert!(matches!(store.issue_at(3, start), Err(SessionError::Full(2))));

        let later = start + Duration::from_secs(10);
        store.issue_at(4, later).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired_at(later + Duration::from_secs(10)), 1);
    }

    #[test]
    fn concurrent_issue_yields_distinct_ids() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60), 1024));
        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..32u32)
                        .map(|i| (store.issue(worker * 100 + i).unwrap(), worker * 100 + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for (id, value) in handle.join().unwrap() {
                assert_eq!(store.lookup(id), Some(value));
            }
        }
        assert_eq!(store.len(), 256);
    }

    #[test]
    fn session_id_text_form() {
        let id: SessionId = " 12345 ".parse().unwrap();
        assert_eq!(id.as_u64(), 12345);
        assert_eq!(id.to_string(), "12345");
        assert!("abc".parse::<SessionId>().is_err());
    }
}
