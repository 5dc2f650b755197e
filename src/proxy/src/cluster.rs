//! Cluster membership and rendezvous-hash routing (component G).
//!
//! `Cluster::pick` implements Highest-Random-Weight hashing: every node gets
//! a fixed 64-bit hash derived from its address, and a key is routed to
//! whichever node's `mix64(node_hash, key_hash)` score is largest. Removing
//! a node only reassigns the keys that used to pick it — there is no
//! virtual-node ring to rebuild.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Notified exactly once when its node is marked unavailable, then dropped.
pub trait NodeObserver: Send + Sync {
    fn on_node_unavailable(&self, addr: SocketAddr);
}

struct Node {
    addr: SocketAddr,
    hash: u64,
    available: AtomicBool,
    observers: Mutex<Vec<Arc<dyn NodeObserver>>>,
}

/// A backend cluster with precomputed rendezvous-hash scores.
pub struct Cluster {
    nodes: Vec<Arc<Node>>,
}

impl Cluster {
    pub fn new(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        let nodes = addrs
            .into_iter()
            .map(|addr| {
                Arc::new(Node {
                    hash: node_hash(&addr, 0),
                    addr,
                    available: AtomicBool::new(true),
                    observers: Mutex::new(Vec::new()),
                })
            })
            .collect();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.nodes.iter().map(|n| n.addr).collect()
    }

    /// Highest-Random-Weight pick among the currently-available nodes.
    /// Ties broken by lexicographically-smallest stable address bytes.
    pub fn pick(&self, account_key: &[u8]) -> Option<SocketAddr> {
        let key_hash = djb_hash(account_key);
        self.nodes
            .iter()
            .filter(|n| n.available.load(Ordering::Acquire))
            .map(|n| (mix64(n.hash, key_hash), address_bytes(&n.addr), n.addr))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, _, addr)| addr)
    }

    /// Registers `observer` against `addr`'s node, if present in this cluster.
    pub fn observe(&self, addr: SocketAddr, observer: Arc<dyn NodeObserver>) {
        if let Some(node) = self.nodes.iter().find(|n| n.addr == addr) {
            node.observers.lock().unwrap().push(observer);
        }
    }

    /// Marks a node unavailable (admin command or a failed health check),
    /// notifying every registered observer exactly once.
    pub fn mark_unavailable(&self, addr: SocketAddr) {
        if let Some(node) = self.nodes.iter().find(|n| n.addr == addr) {
            node.available.store(false, Ordering::Release);
            for observer in node.observers.lock().unwrap().drain(..) {
                observer.on_node_unavailable(addr);
            }
        }
    }

    pub fn mark_available(&self, addr: SocketAddr) {
        if let Some(node) = self.nodes.iter().find(|n| n.addr == addr) {
            node.available.store(true, Ordering::Release);
        }
    }

    pub fn is_available(&self, addr: SocketAddr) -> bool {
        self.nodes
            .iter()
            .find(|n| n.addr == addr)
            .map(|n| n.available.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

fn address_bytes(addr: &SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(a) => {
            let mut v = a.ip().octets().to_vec();
            v.extend_from_slice(&a.port().to_be_bytes());
            v
        }
        SocketAddr::V6(a) => {
            let mut v = a.ip().octets().to_vec();
            v.extend_from_slice(&a.port().to_be_bytes());
            v
        }
    }
}

/// 64-bit node hash: BLAKE3 of `(address-stable-bytes, replica)`, truncated.
fn node_hash(addr: &SocketAddr, replica: u32) -> u64 {
    let mut input = address_bytes(addr);
    input.extend_from_slice(&replica.to_le_bytes());
    let digest = blake3::hash(&input);
    u64::from_le_bytes(digest.as_bytes()[..8].try_into().unwrap())
}

/// Classic Bernstein hash, used for the account-key side of the mix.
pub fn djb_hash(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

/// splitmix64 finalizer, used to combine a node hash with a key hash.
fn mix64(a: u64, b: u64) -> u64 {
    let mut z = a ^ b.wrapping_add(0x9e3779b97f4a7c15).wrapping_add(a << 6).wrapping_add(a >> 2);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> Vec<SocketAddr> {
        vec![
            "10.0.0.1:3306".parse().unwrap(),
            "10.0.0.2:3306".parse().unwrap(),
            "10.0.0.3:3306".parse().unwrap(),
        ]
    }

    #[test]
    fn pick_is_deterministic() {
        let cluster = Cluster::new(addrs());
        let a = cluster.pick(b"acct-42");
        let b = cluster.pick(b"acct-42");
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn removing_a_node_moves_roughly_one_nth_of_keys() {
        let cluster = Cluster::new(addrs());
        let removed = "10.0.0.2:3306".parse().unwrap();

        let keys: Vec<String> = (0..10_000).map(|i| format!("acct-{i}")).collect();
        let before: Vec<_> = keys.iter().map(|k| cluster.pick(k.as_bytes())).collect();

        cluster.mark_unavailable(removed);
        let after: Vec<_> = keys.iter().map(|k| cluster.pick(k.as_bytes())).collect();

        let moved = before
            .iter()
            .zip(after.iter())
            .filter(|(a, b)| a != b)
            .count();
        // only keys that previously picked the removed node should move.
        let picked_removed = before.iter().filter(|a| **a == Some(removed)).count();
        assert_eq!(moved, picked_removed);
        assert!((moved as f64) < keys.len() as f64 * 0.5);
        assert!(after.iter().all(|a| *a != Some(removed)));
    }

    #[test]
    fn djb_hash_is_stable() {
        assert_eq!(djb_hash(b"acct-42"), djb_hash(b"acct-42"));
        assert_ne!(djb_hash(b"acct-42"), djb_hash(b"acct-43"));
    }
}
