//! The per-client connection state machine (component F): the core of this
//! proxy. One task per accepted socket runs [`Connection::run`] from
//! `AWAIT_CLIENT_HR` through to `CLOSING`.
//!
//! The "deferred read of buffered client bytes" the state table calls for
//! between `AWAIT_CLIENT_HR` and `COMMAND_PHASE` needs no explicit buffer in
//! this implementation: the client socket is simply never read from again
//! until `COMMAND_PHASE` is reached, so anything the client sends early sits
//! in the kernel's receive buffer. TCP backpressure does the buffering for
//! free (see DESIGN.md).

use crate::auth::{self, AuthAlgorithm};
use crate::cluster::Cluster;
use crate::errors::{CodecError, ConnectionError};
use crate::listener::ConnectionRegistry;
use crate::peer::{ForwardOutcome, Peer};
use crate::policy::{ClientDescriptor, Policy, PolicyOutcome};
use crate::protocol::mysql::basic::{self, parse_server_handshake};
use crate::protocol::mysql::error_codes::ErrorCode;
use crate::protocol::mysql::packet::codec::FrameEvent;
use crate::protocol::mysql::packet::packet_reader::PacketReader;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::{default_capabilities, DEFAULT_BACKEND_VERSION};
use crate::stats::Stats;
use hashbrown::HashMap;
use mysql_common::constants::CapabilityFlags;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const FORWARD_BUF_SIZE: usize = 32 * 1024;

static NEXT_CONN_ID: AtomicU32 = AtomicU32::new(1);

/// Everything a [`Connection`] needs that outlives any single client.
pub struct ConnectionDeps {
    pub cluster: Arc<Cluster>,
    pub policy: Arc<dyn Policy>,
    pub stats: Arc<Stats>,
    pub idle_timeout: Duration,
}

pub struct Connection {
    peer_addr: SocketAddr,
    conn_id: u32,
    registry_id: u64,
    registry: Arc<ConnectionRegistry>,
    deps: Arc<ConnectionDeps>,
}

impl Connection {
    /// `registry_id` is the slot `Instance::serve` reserved for this
    /// connection before spawning it; `run` updates that slot's database
    /// once the handshake negotiates one, so `DISCONNECT_DATABASE` can find
    /// it later.
    pub fn new(
        peer_addr: SocketAddr,
        registry_id: u64,
        registry: Arc<ConnectionRegistry>,
        deps: Arc<ConnectionDeps>,
    ) -> Self {
        Self {
            peer_addr,
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            registry_id,
            registry,
            deps,
        }
    }

    /// Drives one client socket through every FSM state to completion.
    /// Returns `Ok(())` on a clean client-initiated close; any other outcome
    /// is a [`ConnectionError`], already reported to the client where the
    /// protocol allows it (an ERR packet) before being surfaced here.
    #[instrument(skip(self, client_stream), fields(peer = %self.peer_addr, conn_id = self.conn_id))]
    pub async fn run(self, client_stream: TcpStream) -> Result<(), ConnectionError> {
        let _ = client_stream.set_nodelay(true);
        let (client_read, client_write) = client_stream.into_split();
        let mut client_reader = PacketReader::new(client_read);
        let mut client_writer = PacketWriter::new(client_write);

        // AWAIT_CLIENT_HR
        let scramble = auth::gen_auth_plugin_data();
        writers::write_initial_handshake(
            &mut client_writer,
            self.conn_id as u64,
            scramble,
            DEFAULT_BACKEND_VERSION,
            &None,
        )
        .await?;

        let (hr_seq, hr_packet) = client_reader
            .next_async()
            .await?
            .ok_or(ConnectionError::ProtocolViolation(
                "client closed before sending HandshakeResponse41",
            ))?;
        let handshake = basic::client_handshake_response(&hr_packet, false)
            .map_err(|_| CodecError::Malformed("client HandshakeResponse41"))?
            .1;
        debug!(user = %handshake.db_user_string(), "client handshake parsed");
        self.registry.update_database(
            self.registry_id,
            handshake
                .database
                .as_ref()
                .map(|d| String::from_utf8_lossy(d).into_owned()),
        );

        // POLICY_PENDING
        let descriptor = ClientDescriptor {
            address: self.peer_addr,
            account: handshake
                .username
                .as_ref()
                .map(|u| String::from_utf8_lossy(u).into_owned()),
            notes: HashMap::new(),
            pid: None,
            uid: None,
            gid: None,
            cgroup: None,
            server_version: DEFAULT_BACKEND_VERSION.to_vec(),
            username: handshake.username.clone(),
            database: handshake.database.clone(),
        };
        let connect_action = match self.deps.policy.decide(&descriptor).await {
            PolicyOutcome::Err(err) => {
                client_writer.set_seq(hr_seq.wrapping_add(1));
                writers::write_err_packet(
                    ErrorCode::PolicyRejected,
                    err.msg.as_bytes(),
                    &mut client_writer,
                )
                .await?;
                return Err(ConnectionError::PolicyRejected(err.msg));
            }
            PolicyOutcome::Connect(action) => action,
        };

        // SERVER_CONNECTING: reply OK to the client before the backend is
        // even dialed (see module docs and DESIGN.md).
        client_writer.set_seq(hr_seq.wrapping_add(1));
        writers::write_ok_packet(
            &mut client_writer,
            0,
            0,
            mysql_common::constants::StatusFlags::SERVER_STATUS_AUTOCOMMIT,
        )
        .await?;

        let backend_stream = match timeout(
            BACKEND_CONNECT_TIMEOUT,
            TcpStream::connect(connect_action.address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.deps.stats.node(connect_action.address).connect_errors.inc();
                return Err(ConnectionError::BackendConnect {
                    addr: connect_action.address,
                    source,
                });
            }
            Err(_) => {
                self.deps.stats.node(connect_action.address).connect_errors.inc();
                return Err(ConnectionError::BackendConnectTimeout(connect_action.address));
            }
        };
        let _ = backend_stream.set_nodelay(true);
        self.deps.stats.node(connect_action.address).connects.inc();
        let (backend_read, backend_write) = backend_stream.into_split();
        let mut backend_reader = PacketReader::new(backend_read);
        let mut backend_writer = PacketWriter::new(backend_write);

        // SERVER_HANDSHAKE
        self.backend_handshake(&mut backend_reader, &mut backend_writer, &connect_action)
            .await?;
        info!(backend = %connect_action.address, "backend session established");

        // COMMAND_PHASE. `PacketReader`/`PacketWriter` are themselves plain
        // `AsyncRead`/`AsyncWrite` passthroughs once no framed packet is
        // pending, so raw forwarding reuses them directly instead of
        // unwrapping to the bare socket halves — any bytes the handshake
        // reads already buffered are replayed first (the deferred-read
        // bytes this state's transition calls for).
        let client_peer = Peer::new(client_reader);
        let backend_peer = Peer::new(backend_reader);
        self.forward_command_phase(client_peer, client_writer, backend_peer, backend_writer)
            .await
    }

    async fn backend_handshake<R, W>(
        &self,
        backend_reader: &mut PacketReader<R>,
        backend_writer: &mut PacketWriter<W>,
        connect_action: &crate::policy::ConnectAction,
    ) -> Result<(), ConnectionError>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let (_, greeting) = backend_reader
            .next_async()
            .await?
            .ok_or(ConnectionError::ProtocolViolation(
                "backend closed before greeting",
            ))?;
        let mut server_hs = parse_server_handshake(&greeting)?;

        loop {
            let plugin_name = String::from_utf8_lossy(&server_hs.auth_plugin_name).into_owned();
            let algorithm = AuthAlgorithm::from_plugin_name(&plugin_name, false)
                .ok_or_else(|| crate::errors::AuthError::UnknownPlugin(plugin_name.clone()))?;

            let (data1, data2) = split_nonce(&server_hs.auth_plugin_data, algorithm);
            let password_clear = connect_action.password.as_deref().map(str::as_bytes);
            let password_sha1 = connect_action.password_sha1.as_deref();
            let response = algorithm.generate_response(password_clear, password_sha1, &data1, &data2)?;

            let our_flags = default_capabilities() & server_hs.capabilities
                | CapabilityFlags::CLIENT_PROTOCOL_41
                | CapabilityFlags::CLIENT_SECURE_CONNECTION
                | CapabilityFlags::CLIENT_PLUGIN_AUTH;
            writers::write_handshake_response41(
                backend_writer,
                our_flags,
                connect_action.user.as_bytes(),
                &response,
                algorithm.plugin_name().as_bytes(),
                connect_action.database.as_deref().map(str::as_bytes),
            )
            .await?;

            let (_, reply) = backend_reader
                .next_async()
                .await?
                .ok_or(ConnectionError::ProtocolViolation(
                    "backend closed mid-handshake",
                ))?;
            match reply.first() {
                Some(0x00) => return Ok(()),
                Some(0xff) => {
                    return Err(crate::errors::AuthError::ServerRejected(
                        String::from_utf8_lossy(&reply[3..]).into_owned(),
                    )
                    .into())
                }
                Some(0xfe) => {
                    // AuthSwitchRequest: "\xfe" + plugin-name\0 + auth-data.
                    let body = &reply[1..];
                    let nul = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                    server_hs.auth_plugin_name = body[..nul].to_vec();
                    server_hs.auth_plugin_data = body.get(nul + 1..).unwrap_or(&[]).to_vec();
                    continue;
                }
                _ => {
                    return Err(ConnectionError::ProtocolViolation(
                        "unexpected byte after backend HandshakeResponse41",
                    ))
                }
            }
        }
    }

    /// Raw bidirectional forwarding with no re-serialization; see
    /// [`crate::peer`]. Tracks `request_time` across a client `COM_QUERY`
    /// and publishes its duration to the policy collaborator once the
    /// backend's matching EOF/OK is observed.
    async fn forward_command_phase<CR, CW, BR, BW>(
        &self,
        mut client_peer: Peer<CR>,
        mut client_writer: CW,
        mut backend_peer: Peer<BR>,
        mut backend_writer: BW,
    ) -> Result<(), ConnectionError>
    where
        CR: tokio::io::AsyncRead + Unpin,
        CW: tokio::io::AsyncWrite + Unpin,
        BR: tokio::io::AsyncRead + Unpin,
        BW: tokio::io::AsyncWrite + Unpin,
    {
        let mut client_buf = vec![0u8; FORWARD_BUF_SIZE];
        let mut backend_buf = vec![0u8; FORWARD_BUF_SIZE];
        let mut request_time: Option<Instant> = None;

        loop {
            tokio::select! {
                result = client_peer.forward_once(&mut backend_writer, &mut client_buf) => {
                    match result? {
                        ForwardOutcome::Closed => {
                            let _ = backend_writer.shutdown().await;
                            return Ok(());
                        }
                        ForwardOutcome::Forwarded { events, .. } => {
                            self.deps.stats.client_bytes_received.add(1);
                            for event in events {
                                if let FrameEvent::Packet { seq: 0, payload, complete: true } = event {
                                    if payload.first() == Some(&0x03) {
                                        request_time = Some(Instant::now());
                                        self.deps.stats.client_queries.inc();
                                    }
                                }
                            }
                        }
                    }
                }
                result = backend_peer.forward_once(&mut client_writer, &mut backend_buf) => {
                    match result? {
                        ForwardOutcome::Closed => {
                            let _ = client_writer.shutdown().await;
                            return Ok(());
                        }
                        ForwardOutcome::Forwarded { events, .. } => {
                            for event in events {
                                let terminal = matches!(
                                    &event,
                                    FrameEvent::Packet { payload, complete: true, .. }
                                        if matches!(payload.first(), Some(0x00) | Some(0xfe) | Some(0xff))
                                );
                                if terminal {
                                    if let Some(start) = request_time.take() {
                                        let elapsed = start.elapsed().as_millis() as u64;
                                        self.deps
                                            .policy
                                            .on_query_duration(None, elapsed)
                                            .await;
                                    }
                                }
                            }
                        }
                    }
                }
                _ = tokio::time::sleep(self.deps.idle_timeout), if request_time.is_none() => {
                    warn!("idle timeout exceeded, closing connection");
                    return Err(ConnectionError::IdleTimeout);
                }
            }
        }
    }
}

/// Splits a backend's combined `auth_plugin_data` into the `(data1, data2)`
/// halves each auth algorithm expects: 8+13 bytes (with `data2`'s trailing
/// NUL) for the SHA-1/SHA-256 families, or a bare 32-byte nonce for
/// ed25519.
fn split_nonce(auth_plugin_data: &[u8], algorithm: AuthAlgorithm) -> (Vec<u8>, Vec<u8>) {
    if algorithm == AuthAlgorithm::Ed25519 {
        return (auth_plugin_data.to_vec(), Vec::new());
    }
    let data1 = auth_plugin_data.get(..8).unwrap_or(auth_plugin_data).to_vec();
    let mut data2 = auth_plugin_data.get(8..).unwrap_or(&[]).to_vec();
    data2.push(0);
    (data1, data2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_nonce_appends_trailing_nul_for_sha_families() {
        let data = [0u8; 20];
        let (d1, d2) = split_nonce(&data, AuthAlgorithm::NativePassword);
        assert_eq!(d1.len(), 8);
        assert_eq!(d2.len(), 13);
        assert_eq!(d2.last(), Some(&0));
    }

    #[test]
    fn split_nonce_is_bare_for_ed25519() {
        let data = [0u8; 32];
        let (d1, d2) = split_nonce(&data, AuthAlgorithm::Ed25519);
        assert_eq!(d1.len(), 32);
        assert!(d2.is_empty());
    }
}
