//! Admin control channel: a UDP listener accepting `DISCONNECT_DATABASE
//! <name>` lines, used operationally to drain connections to a backend that
//! is about to be taken out of service. This is ambient glue around the
//! cluster/listener collaborators, not part of the wire protocol itself.

use crate::listener::ConnectionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 1024;

/// Runs the admin UDP loop until the socket errors or the process shuts
/// down; errors from individual datagrams are logged and do not stop the
/// loop.
pub async fn run(socket: UdpSocket, registry: Arc<ConnectionRegistry>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "admin control socket read failed");
                return;
            }
        };
        handle_datagram(&buf[..n], peer, &registry);
    }
}

fn handle_datagram(datagram: &[u8], peer: SocketAddr, registry: &ConnectionRegistry) {
    let line = String::from_utf8_lossy(datagram);
    let line = line.trim();
    debug!(%peer, %line, "admin control datagram");

    match line.split_once(' ') {
        Some(("DISCONNECT_DATABASE", name)) => {
            let name = name.trim();
            let closed = registry.close_connections_to_database(name);
            info!(%peer, database = name, closed, "disconnected clients for database");
        }
        _ => {
            warn!(%peer, %line, "unrecognized admin control command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ConnectionRegistry;

    #[test]
    fn recognizes_disconnect_database_command() {
        let registry = ConnectionRegistry::new();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        handle_datagram(b"DISCONNECT_DATABASE shard_7", peer, &registry);
    }
}
