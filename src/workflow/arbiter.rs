//! Workflow Arbiter
//!
//! Several workflows of the same kind may be open against one server at a
//! time (two browser windows, two operators). Only the most recently
//! touched one may commit. The arbiter hands out monotonically increasing
//! session tokens and tracks the active token per `(kind, server)`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Kind of workflow being arbitrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    GrowFileSystem,
}

/// Token identifying one workflow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub u64);

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for SessionToken {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(SessionToken)
    }
}

/// Active-session arbitration keyed by workflow kind and server
#[derive(Debug, Default)]
pub struct WorkflowArbiter {
    next_token: AtomicU64,
    active: DashMap<(WorkflowKind, String), SessionToken>,
}

impl WorkflowArbiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Issue a new token and make it the active one
    pub fn register(&self, kind: WorkflowKind, server: &str) -> SessionToken {
        let token = SessionToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        self.active.insert((kind, server.to_string()), token);
        debug!("Registered {:?} session {} on {}", kind, token, server);
        token
    }

    /// Make `token` the active session
    pub fn activate(&self, kind: WorkflowKind, server: &str, token: SessionToken) {
        self.active.insert((kind, server.to_string()), token);
    }

    pub fn active(&self, kind: WorkflowKind, server: &str) -> Option<SessionToken> {
        self.active.get(&(kind, server.to_string())).map(|t| *t)
    }

    pub fn is_active(&self, kind: WorkflowKind, server: &str, token: SessionToken) -> bool {
        self.active(kind, server) == Some(token)
    }

    /// Clear the active pointer if it still refers to `token`
    pub fn release(&self, kind: WorkflowKind, server: &str, token: SessionToken) -> bool {
        self.active
            .remove_if(&(kind, server.to_string()), |_, active| *active == token)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_monotonic() {
        let arbiter = WorkflowArbiter::new();
        let a = arbiter.register(WorkflowKind::GrowFileSystem, "mds1");
        let b = arbiter.register(WorkflowKind::GrowFileSystem, "mds2");
        assert!(b > a);
    }

    #[test]
    fn test_latest_session_is_active_until_other_touches() {
        let arbiter = WorkflowArbiter::new();
        let kind = WorkflowKind::GrowFileSystem;
        let first = arbiter.register(kind, "mds1");
        let second = arbiter.register(kind, "mds1");

        assert!(!arbiter.is_active(kind, "mds1", first));
        assert!(arbiter.is_active(kind, "mds1", second));

        arbiter.activate(kind, "mds1", first);
        assert!(arbiter.is_active(kind, "mds1", first));

        // Other servers are independent
        let other = arbiter.register(kind, "mds2");
        assert!(arbiter.is_active(kind, "mds1", first));
        assert!(arbiter.is_active(kind, "mds2", other));
    }

    #[test]
    fn test_release_only_clears_own_token() {
        let arbiter = WorkflowArbiter::new();
        let kind = WorkflowKind::GrowFileSystem;
        let first = arbiter.register(kind, "mds1");
        let second = arbiter.register(kind, "mds1");

        assert!(!arbiter.release(kind, "mds1", first));
        assert_eq!(arbiter.active(kind, "mds1"), Some(second));
        assert!(arbiter.release(kind, "mds1", second));
        assert_eq!(arbiter.active(kind, "mds1"), None);
    }

    #[test]
    fn test_token_round_trips_as_hex() {
        let token = SessionToken(42);
        assert_eq!(token.to_string(), "000000000000002a");
        assert_eq!("000000000000002a".parse::<SessionToken>().unwrap(), token);
    }
}
