//! Async resolver adapter (component L).
//!
//! The policy hook may ask to resolve a hostname; this suspends the
//! policy future rather than the whole connection task, since resolution
//! runs on tokio's async DNS path (`lookup_host`) and is naturally
//! cancel-safe by dropping the future. A path-like name (leading `/` or
//! `@`) is treated as a UNIX-domain socket address and resolved
//! synchronously, with no suspension at all.

use std::net::SocketAddr;

const DEFAULT_PORT: u16 = 3306;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("host name resolution failed: {0}")]
    Lookup(#[from] std::io::Error),
    #[error("resolver returned no addresses for {0}")]
    NoAddresses(String),
}

/// A resolved backend target: either a TCP address or (conceptually) a
/// UNIX-domain path. The core only ever dials TCP backends, so the path
/// form is resolved here for API completeness but callers that only
/// support TCP backends should treat it as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Tcp(SocketAddr),
    Unix(String),
}

/// Resolves `host` the way the policy hook's `resolve()` routine would.
///
/// A leading `/` or `@` names a UNIX-domain socket and is returned
/// immediately with no suspension; otherwise `host` is looked up
/// asynchronously on `DEFAULT_PORT` unless a `:port` suffix is present.
pub async fn resolve(host: &str) -> Result<ResolvedTarget, ResolveError> {
    if host.starts_with('/') || host.starts_with('@') {
        return Ok(ResolvedTarget::Unix(host.to_string()));
    }

    let lookup_key = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    };

    let mut addrs = tokio::net::lookup_host(&lookup_key).await?;
    addrs
        .next()
        .map(ResolvedTarget::Tcp)
        .ok_or_else(|| ResolveError::NoAddresses(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unix_paths_resolve_synchronously() {
        let r = resolve("/var/run/mysqld/mysqld.sock").await.unwrap();
        assert_eq!(
            r,
            ResolvedTarget::Unix("/var/run/mysqld/mysqld.sock".to_string())
        );
    }

    #[tokio::test]
    async fn loopback_literal_resolves() {
        let r = resolve("127.0.0.1:4000").await.unwrap();
        assert_eq!(r, ResolvedTarget::Tcp("127.0.0.1:4000".parse().unwrap()));
    }
}
