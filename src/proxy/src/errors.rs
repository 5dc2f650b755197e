use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while decoding/encoding the wire protocol (components A-C).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("packet payload exceeds the 1KiB staging buffer")]
    PacketTooLarge,
    #[error("unsupported protocol_version {0} (only 10 is accepted)")]
    UnsupportedProtocolVersion(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the four password-authentication algorithms (component D).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AuthError {
    #[error("need clear-text password for this auth plugin")]
    NeedClearPassword,
    #[error("auth_plugin_data must total 21 bytes with a trailing NUL, got {0}")]
    BadNonceLength(usize),
    #[error("auth_plugin_data must total 32 bytes for ed25519, got {0}")]
    BadEd25519NonceLength(usize),
    #[error("unknown auth plugin name: {0}")]
    UnknownPlugin(String),
    #[error("caching_sha2_password full-auth (RSA) path is not supported")]
    FullAuthUnsupported,
    #[error("server rejected authentication: {0}")]
    ServerRejected(String),
}

/// Errors fatal to a single [`crate::connection::Connection`] (component F).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("backend connect to {addr} failed: {source}")]
    BackendConnect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("backend connect to {0} timed out")]
    BackendConnectTimeout(SocketAddr),
    #[error("policy hook rejected the connection: {0}")]
    PolicyRejected(String),
    #[error("cluster has no address for this account")]
    NoBackendAvailable,
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    #[error("idle timeout exceeded")]
    IdleTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading/merging the ambient `ProxyConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cluster must name at least one backend address")]
    EmptyCluster,
    #[error("invalid socket address {0}: {1}")]
    InvalidAddr(String, std::net::AddrParseError),
}
