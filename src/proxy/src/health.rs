//! Health checker (component H).
//!
//! A single-shot check dials the backend, completes just enough of the
//! handshake to prove it's alive, and optionally issues the `read_only`
//! probe query before dropping the connection. The periodic scheduler
//! around it is ambient glue, not part of the checked contract itself.

use crate::cluster::Cluster;
use crate::protocol::mysql::resultset;
use crate::stats::Stats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Up,
    Down,
    ReadOnly,
}

impl HealthState {
    fn label(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::ReadOnly => "read_only",
        }
    }
}

/// Dials `addr`, reads the server's initial handshake greeting far enough to
/// confirm it's a live MySQL/MariaDB server, then closes the socket without
/// completing authentication. A full check never needs valid credentials:
/// a greeting packet is proof of life on its own.
async fn probe_handshake(addr: SocketAddr, connect_timeout: Duration) -> bool {
    let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "health check connect failed");
            return false;
        }
        Err(_) => {
            debug!(%addr, "health check connect timed out");
            return false;
        }
    };
    let mut stream = stream;
    let mut header = [0u8; 4];
    match timeout(connect_timeout, stream.read_exact(&mut header)).await {
        Ok(Ok(())) => true,
        _ => {
            debug!(%addr, "health check greeting read failed");
            false
        }
    }
}

/// Issues `SHOW GLOBAL VARIABLES LIKE 'read_only'` over a fresh,
/// unauthenticated-but-connected socket. This is best-effort: a server that
/// requires auth before any query will simply fail this step, and the
/// checker falls back to treating the plain handshake probe as sufficient
/// (see DESIGN.md). The query returns a two-column `(Variable_name, Value)`
/// row; `resultset::second_column_text` reads the `Value` column.
async fn probe_read_only(addr: SocketAddr, timeout_dur: Duration) -> Option<bool> {
    let mut stream = timeout(timeout_dur, TcpStream::connect(addr))
        .await
        .ok()?
        .ok()?;
    let mut header = [0u8; 4];
    timeout(timeout_dur, stream.read_exact(&mut header))
        .await
        .ok()?
        .ok()?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut greeting = vec![0u8; len];
    timeout(timeout_dur, stream.read_exact(&mut greeting))
        .await
        .ok()?
        .ok()?;

    let query = b"SHOW GLOBAL VARIABLES LIKE 'read_only'";
    let mut payload = Vec::with_capacity(query.len() + 1);
    payload.push(0x03); // COM_QUERY
    payload.extend_from_slice(query);
    let mut packet = vec![
        (payload.len() & 0xFF) as u8,
        ((payload.len() >> 8) & 0xFF) as u8,
        ((payload.len() >> 16) & 0xFF) as u8,
        0,
    ];
    packet.extend_from_slice(&payload);
    timeout(timeout_dur, stream.write_all(&packet)).await.ok()?.ok()?;

    let mut resp_header = [0u8; 4];
    timeout(timeout_dur, stream.read_exact(&mut resp_header))
        .await
        .ok()?
        .ok()?;
    let resp_len = u32::from_le_bytes([resp_header[0], resp_header[1], resp_header[2], 0]) as usize;
    let mut col_count_payload = vec![0u8; resp_len];
    timeout(timeout_dur, stream.read_exact(&mut col_count_payload))
        .await
        .ok()?
        .ok()?;

    // Skip the column-definition packets until EOF, then read one row.
    loop {
        let mut h = [0u8; 4];
        if timeout(timeout_dur, stream.read_exact(&mut h)).await.ok()?.is_err() {
            return None;
        }
        let l = u32::from_le_bytes([h[0], h[1], h[2], 0]) as usize;
        let mut body = vec![0u8; l];
        timeout(timeout_dur, stream.read_exact(&mut body)).await.ok()?.ok()?;
        if body.first() == Some(&0xFE) && body.len() < 9 {
            break;
        }
    }

    let mut row_header = [0u8; 4];
    timeout(timeout_dur, stream.read_exact(&mut row_header))
        .await
        .ok()?
        .ok()?;
    let row_len = u32::from_le_bytes([row_header[0], row_header[1], row_header[2], 0]) as usize;
    let mut row = vec![0u8; row_len];
    timeout(timeout_dur, stream.read_exact(&mut row)).await.ok()?.ok()?;

    resultset::second_column_text(&row).map(|v| v.trim().eq_ignore_ascii_case("on"))
}

/// Runs one health-check cycle against `addr` and returns the observed
/// [`HealthState`].
pub async fn check_once(addr: SocketAddr, connect_timeout: Duration, probe_ro: bool) -> HealthState {
    if !probe_handshake(addr, connect_timeout).await {
        return HealthState::Down;
    }
    if probe_ro {
        if let Some(true) = probe_read_only(addr, connect_timeout).await {
            return HealthState::ReadOnly;
        }
    }
    HealthState::Up
}

/// Periodic scheduler: checks every known cluster node on `interval`,
/// updating [`Stats`] and marking nodes (un)available on the cluster.
pub async fn run_scheduler(
    cluster: Arc<Cluster>,
    stats: Arc<Stats>,
    interval: Duration,
    connect_timeout: Duration,
    probe_ro: bool,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for addr in cluster.addresses() {
            let state = check_once(addr, connect_timeout, probe_ro).await;
            *stats.node(addr).health_state.write() = state.label();
            match state {
                HealthState::Down => {
                    warn!(%addr, "backend failed health check");
                    cluster.mark_unavailable(addr);
                }
                HealthState::Up | HealthState::ReadOnly => {
                    cluster.mark_available(addr);
                }
            }
        }
        stats.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_port_is_down() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let state = check_once(addr, Duration::from_millis(200), false).await;
        assert_eq!(state, HealthState::Down);
    }
}
