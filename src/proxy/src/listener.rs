//! Listener and instance (component J): accepts client sockets, spawns one
//! task per connection, and keeps a registry of the live set so the admin
//! control channel can drain connections bound to a particular database.

use crate::config::ProxyConfig;
use crate::stats::Stats;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A registry entry: enough to identify and forcibly close a live
/// connection task from outside it.
///
/// `handle` is `None` for the brief window between [`ConnectionRegistry::reserve`]
/// and [`ConnectionRegistry::attach`] — the gap needed so a connection task
/// can learn its own registry id (and call `update_database` once its
/// handshake resolves one) before the `JoinHandle` spawning it even exists.
struct Entry {
    database: Option<String>,
    handle: Option<JoinHandle<()>>,
}

/// The live set of accepted connections, keyed by an opaque incrementing id.
/// Dropping (aborting) a `JoinHandle` is this codebase's cancellation
/// mechanism (§5): the connection's task simply stops at its next await
/// point, and any held sockets are closed on drop.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, database: Option<String>, handle: JoinHandle<()>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .insert(id, Entry { database, handle: Some(handle) });
        id
    }

    /// Reserves a registry slot ahead of spawning its connection task, so the
    /// task itself can be handed the id and update its own entry (via
    /// [`update_database`](Self::update_database)) without racing
    /// [`attach`](Self::attach).
    pub fn reserve(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .insert(id, Entry { database: None, handle: None });
        id
    }

    /// Attaches the spawned task's `JoinHandle` to a slot reserved via
    /// [`reserve`](Self::reserve).
    pub fn attach(&self, id: u64, handle: JoinHandle<()>) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.handle = Some(handle);
        }
    }

    /// Records the database a connection negotiated once its handshake
    /// resolves one, so `close_connections_to_database` can later find it.
    pub fn update_database(&self, id: u64, database: Option<String>) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.database = database;
        }
    }

    pub fn unregister(&self, id: u64) {
        self.entries.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts every connection whose negotiated database matches `name`,
    /// returning how many were closed. This is the `DISCONNECT_DATABASE`
    /// admin command's implementation.
    pub fn close_connections_to_database(&self, name: &str) -> usize {
        self.close_connections_if(|db| db.map(|d| d == name).unwrap_or(false))
    }

    /// Aborts every connection for which `predicate(database)` returns
    /// true, returning how many were closed.
    pub fn close_connections_if(&self, predicate: impl Fn(Option<&str>) -> bool) -> usize {
        let mut closed = 0;
        self.entries.lock().retain(|_, entry| {
            if predicate(entry.database.as_deref()) {
                if let Some(handle) = &entry.handle {
                    handle.abort();
                }
                closed += 1;
                false
            } else {
                true
            }
        });
        closed
    }
}

/// A running proxy instance: the bound listener plus the shared state every
/// spawned connection task needs a handle to.
pub struct Instance {
    listener: TcpListener,
    pub registry: Arc<ConnectionRegistry>,
    pub stats: Arc<Stats>,
    pub config: Arc<ProxyConfig>,
}

impl Instance {
    pub async fn bind(config: Arc<ProxyConfig>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(addr = %config.listen_addr, "listening for clients");
        Ok(Self {
            listener,
            registry: Arc::new(ConnectionRegistry::new()),
            stats: Arc::new(Stats::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop forever. Each accepted socket is spawned as its
    /// own task via `spawn_connection`; acceptance errors are logged and do
    /// not stop the loop, since they're almost always transient (EMFILE,
    /// ECONNABORTED) rather than a reason to stop serving the backlog. The
    /// `u64` handed to `spawn_connection` is this connection's registry id —
    /// the task uses it to call `registry.update_database` once its
    /// handshake negotiates one, so `DISCONNECT_DATABASE` can later find it.
    pub async fn serve<F, Fut>(&self, spawn_connection: F) -> std::io::Result<()>
    where
        F: Fn(tokio::net::TcpStream, SocketAddr, u64, Arc<ConnectionRegistry>, Arc<Stats>, Arc<ProxyConfig>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%peer, "accepted client connection");
            self.stats.connections_accepted.inc();
            let registry = self.registry.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            let id = registry.reserve();
            let fut = spawn_connection(socket, peer, id, registry.clone(), stats, config);
            let handle = tokio::spawn(fut);
            registry.attach(id, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserved_entry_survives_late_database_update() {
        let registry = ConnectionRegistry::new();
        let id = registry.reserve();
        registry.update_database(id, Some("billing".to_string()));
        let handle = tokio::spawn(async { futures_forever().await });
        registry.attach(id, handle);
        let closed = registry.close_connections_to_database("billing");
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn close_connections_if_aborts_matching_entries() {
        let registry = ConnectionRegistry::new();
        let h1 = tokio::spawn(async { futures_forever().await });
        let h2 = tokio::spawn(async { futures_forever().await });
        registry.register(Some("shard_a".to_string()), h1);
        registry.register(Some("shard_b".to_string()), h2);
        let closed = registry.close_connections_to_database("shard_a");
        assert_eq!(closed, 1);
        assert_eq!(registry.len(), 1);
    }

    async fn futures_forever() {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    }
}
