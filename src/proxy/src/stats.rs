//! Stats (component K): additive counters written by Connections, read by
//! the metrics-export collaborator. Plain atomics, no locks — §5 only
//! requires that writers and the one exporter reader not tear values, which
//! `AtomicU64` gives for free.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-backend counters, labeled by `server` in the exporter.
#[derive(Debug, Default)]
pub struct NodeStats {
    pub connects: Counter,
    pub connect_errors: Counter,
    pub packets_received: Counter,
    pub bytes_received: Counter,
    pub malformed_packets: Counter,
    pub queries: Counter,
    pub query_errors: Counter,
    pub query_warnings: Counter,
    pub no_good_index_queries: Counter,
    pub no_index_queries: Counter,
    pub slow_queries: Counter,
    pub affected_rows: Counter,
    /// Total query wait time, in milliseconds (seconds in the original);
    /// published as a float count of seconds to match its counter semantics.
    pub query_wait_ms: Counter,
    pub health_state: RwLock<&'static str>,
}

impl NodeStats {
    fn new() -> Self {
        Self {
            health_state: RwLock::new("unknown"),
            ..Default::default()
        }
    }
}

/// Global counters plus a lazily-populated map of per-backend [`NodeStats`].
#[derive(Debug, Default)]
pub struct Stats {
    pub connections_accepted: Counter,
    pub connections_rejected: Counter,
    pub client_bytes_received: Counter,
    pub client_packets_received: Counter,
    pub client_malformed_packets: Counter,
    pub client_handshake_responses: Counter,
    pub client_auth_ok: Counter,
    pub client_auth_err: Counter,
    pub client_queries: Counter,
    /// Errors raised by the policy hook (the "scripting coroutine" in the
    /// original; see `src/policy.rs`).
    pub lua_errors: Counter,
    nodes: RwLock<HashMap<SocketAddr, std::sync::Arc<NodeStats>>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily inserts and returns the per-backend counters for `addr`.
    pub fn node(&self, addr: SocketAddr) -> std::sync::Arc<NodeStats> {
        if let Some(n) = self.nodes.read().get(&addr) {
            return n.clone();
        }
        self.nodes
            .write()
            .entry(addr)
            .or_insert_with(|| std::sync::Arc::new(NodeStats::new()))
            .clone()
    }

    pub fn known_nodes(&self) -> Vec<SocketAddr> {
        self.nodes.read().keys().copied().collect()
    }

    /// Pushes every counter's current value through the ambient metrics
    /// facade as a gauge, labeled the same way the rest of this codebase
    /// labels process-wide metrics. Called periodically by the health-check
    /// scheduler rather than on every increment, since the exporter only
    /// needs a fresh snapshot each scrape interval.
    pub fn publish(&self) {
        let labels = common::metrics::common_labels();
        common::metrics::gauge("proxy_connections_accepted", self.connections_accepted.get() as f64, Some(labels));
        common::metrics::gauge("proxy_connections_rejected", self.connections_rejected.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_bytes_received", self.client_bytes_received.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_packets_received", self.client_packets_received.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_malformed_packets", self.client_malformed_packets.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_handshake_responses", self.client_handshake_responses.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_auth_ok", self.client_auth_ok.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_auth_err", self.client_auth_err.get() as f64, Some(labels));
        common::metrics::gauge("proxy_client_queries", self.client_queries.get() as f64, Some(labels));
        common::metrics::gauge("proxy_lua_errors", self.lua_errors.get() as f64, Some(labels));

        for addr in self.known_nodes() {
            let node = self.node(addr);
            let node_labels: Vec<(&'static str, String)> = labels
                .iter()
                .cloned()
                .chain(std::iter::once(("server", addr.to_string())))
                .collect();
            common::metrics::gauge("proxy_node_connects", node.connects.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_connect_errors", node.connect_errors.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_bytes_received", node.bytes_received.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_packets_received", node.packets_received.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_malformed_packets", node.malformed_packets.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_queries", node.queries.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_query_errors", node.query_errors.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_query_warnings", node.query_warnings.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_no_good_index_queries", node.no_good_index_queries.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_no_index_queries", node.no_index_queries.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_slow_queries", node.slow_queries.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_affected_rows", node.affected_rows.get() as f64, Some(&node_labels));
            common::metrics::gauge("proxy_node_query_wait", node.query_wait_ms.get() as f64 / 1000.0, Some(&node_labels));

            let state = *node.health_state.read();
            let state_labels: Vec<(&'static str, String)> = node_labels
                .iter()
                .cloned()
                .chain(std::iter::once(("state", state.to_string())))
                .collect();
            common::metrics::gauge("proxy_node_server_state", 1.0, Some(&state_labels));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_lookup_is_idempotent() {
        let stats = Stats::new();
        let addr: SocketAddr = "10.0.0.1:3306".parse().unwrap();
        stats.node(addr).connects.inc();
        stats.node(addr).connects.inc();
        assert_eq!(stats.node(addr).connects.get(), 2);
    }
}
