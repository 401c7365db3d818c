//! Remote side of a session.
//!
//! This module provides the pieces the session controller composes:
//! - host resolution, including cloud instance lookup
//! - local port selection for the tunnel
//! - code-server installation and the ssh tunnel that runs it
//! - readiness probing of the tunneled endpoint
//! - settings/extensions synchronization

pub mod deployment;
pub mod host;
pub mod port;
pub mod probe;
pub mod sync;
pub mod tunnel;

/// Where to connect, produced once per session and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    /// ssh destination (`host`, `user@host`, or a bare IP).
    pub address: String,
    /// Connection flags the resolver needs on every ssh invocation.
    pub extra_flags: String,
}

impl ResolvedHost {
    /// Resolver flags first, then the user's.
    pub fn ssh_flags(&self, user_flags: &str) -> String {
        match (self.extra_flags.trim(), user_flags.trim()) {
            ("", user) => user.to_string(),
            (extra, "") => extra.to_string(),
            (extra, user) => format!("{} {}", extra, user),
        }
    }
}
