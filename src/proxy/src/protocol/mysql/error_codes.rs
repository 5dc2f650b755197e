//! A small subset of the MySQL server error code space.
//!
//! We don't forward arbitrary server error codes (the core never originates
//! SQL errors of its own); this only covers the codes this proxy can itself
//! raise when building an ERR packet — auth failures, policy rejections, and
//! protocol violations detected before a backend is even chosen.

/// Numeric `error_code` field of an ERR packet, paired with its SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic "the policy hook rejected this connection" error.
    PolicyRejected,
    /// `ER_HANDSHAKE_ERROR`: client or server handshake packet was malformed.
    HandshakeError,
    /// `ER_ACCESS_DENIED_ERROR`: auth algorithm failed or backend returned ERR.
    AccessDenied,
    /// `ER_UNKNOWN_COM_ERROR`: an unexpected command byte in command phase.
    UnknownCommand,
    /// Catch-all for I/O / malformed-packet errors that have no natural
    /// MySQL error code; reported under the generic `HY000` SQLSTATE.
    Internal,
}

impl ErrorCode {
    pub const fn code(self) -> u16 {
        match self {
            ErrorCode::PolicyRejected => 1045,
            ErrorCode::HandshakeError => 1043,
            ErrorCode::AccessDenied => 1045,
            ErrorCode::UnknownCommand => 1047,
            ErrorCode::Internal => 2013,
        }
    }

    /// 5-byte SQLSTATE, without the leading `'#'` marker.
    pub const fn sqlstate(self) -> &'static [u8; 5] {
        match self {
            ErrorCode::AccessDenied => b"28000",
            ErrorCode::HandshakeError | ErrorCode::UnknownCommand => b"08S01",
            // The policy hook has no field to provide its own SQLSTATE, so a
            // rejection defaults to the generic HY000.
            ErrorCode::PolicyRejected | ErrorCode::Internal => b"HY000",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_uses_28000() {
        assert_eq!(ErrorCode::AccessDenied.sqlstate(), b"28000");
        assert_eq!(ErrorCode::AccessDenied.code(), 1045);
    }

    #[test]
    fn policy_rejected_uses_hy000() {
        assert_eq!(ErrorCode::PolicyRejected.sqlstate(), b"HY000");
    }
}
