//! Policy hook adapter (component I).
//!
//! The FSM suspends into `POLICY_PENDING` and awaits exactly one
//! [`PolicyOutcome`] from the registered [`Policy`]. In this codebase the
//! "scripting coroutine" of the original design is realized as a plain
//! `async fn`: a tokio task `.await`ing a future already is a suspended-task
//! handle that can be resumed exactly once, so no separate continuation
//! object is needed (see DESIGN.md).

use crate::cluster::Cluster;
use async_trait::async_trait;
use hashbrown::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Client-facing descriptor handed to the policy hook.
#[derive(Debug, Clone)]
pub struct ClientDescriptor {
    pub address: SocketAddr,
    pub account: Option<String>,
    pub notes: HashMap<String, String>,
    pub pid: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub cgroup: Option<String>,
    pub server_version: Vec<u8>,
    pub username: Option<Vec<u8>>,
    pub database: Option<Vec<u8>>,
}

/// Routing decision: reject the client outright.
#[derive(Debug, Clone)]
pub struct ErrAction {
    pub msg: String,
}

/// Routing decision: connect to `address` using the given credentials.
#[derive(Debug, Clone)]
pub struct ConnectAction {
    pub address: SocketAddr,
    pub user: String,
    pub password: Option<String>,
    pub password_sha1: Option<Vec<u8>>,
    pub database: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PolicyOutcome {
    Err(ErrAction),
    Connect(ConnectAction),
}

/// The embedded-scripting contract. A real deployment would bind this to a
/// Lua/JS host; the core only depends on the trait, not on any particular
/// scripting runtime.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Resumed exactly once per connection with the routing decision.
    async fn decide(&self, client: &ClientDescriptor) -> PolicyOutcome;

    /// Invoked when a query's duration becomes known (§4.6's
    /// `COMMAND_PHASE` "publish duration to policy collaborator" action).
    /// Default is a no-op; hosts that care about query timing override it.
    async fn on_query_duration(&self, _account: Option<&str>, _duration_ms: u64) {}
}

/// A policy that always routes to the cluster's rendezvous-hash pick for
/// the client's username, forwarding the client's own credentials
/// unchanged. This is the degenerate "no scripting host installed" policy;
/// real deployments are expected to supply their own [`Policy`].
pub struct StaticClusterPolicy {
    cluster: Arc<Cluster>,
}

impl StaticClusterPolicy {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Policy for StaticClusterPolicy {
    async fn decide(&self, client: &ClientDescriptor) -> PolicyOutcome {
        let key = client
            .username
            .clone()
            .unwrap_or_else(|| b"_anonymous".to_vec());
        match self.cluster.pick(&key) {
            Some(address) => PolicyOutcome::Connect(ConnectAction {
                address,
                user: client
                    .username
                    .as_ref()
                    .map(|u| String::from_utf8_lossy(u).into_owned())
                    .unwrap_or_default(),
                password: None,
                password_sha1: None,
                database: client
                    .database
                    .as_ref()
                    .map(|d| String::from_utf8_lossy(d).into_owned()),
            }),
            None => PolicyOutcome::Err(ErrAction {
                msg: "no backend available".to_string(),
            }),
        }
    }
}
