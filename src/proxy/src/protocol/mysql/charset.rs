//! Collation name lookup used when parsing/building handshake packets.
//!
//! `mysql_common` exposes the numeric collation ids as bare `u8` constants
//! (`UTF8_GENERAL_CI`, `UTF8MB4_GENERAL_CI`, ...) but no name→id map. We only
//! need the handful of collations this proxy actually negotiates with, so
//! this is a small static table rather than the full upstream charset list.

use hashbrown::HashMap;
use std::sync::OnceLock;

static COLLATION_NAMES: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();

/// Collation this proxy advertises in its own server greeting.
pub const DEFAULT_COLLATION_ID: u16 = mysql_common::constants::UTF8_GENERAL_CI as u16;

/// Name → numeric collation id, for the collations this proxy negotiates.
pub fn collation_names() -> &'static HashMap<&'static str, u8> {
    COLLATION_NAMES.get_or_init(|| {
        use mysql_common::constants as c;
        let mut m = HashMap::new();
        m.insert("utf8_general_ci", c::UTF8_GENERAL_CI);
        m.insert("utf8mb4_general_ci", c::UTF8MB4_GENERAL_CI);
        m.insert("utf8mb4_unicode_ci", c::UTF8MB4_UNICODE_CI);
        m.insert("binary", c::BINARY);
        m.insert("latin1_swedish_ci", c::LATIN1_SWEDISH_CI);
        m
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_collations_resolve() {
        assert_eq!(*collation_names().get("utf8_general_ci").unwrap(), 33);
        assert!(collation_names().get("does_not_exist").is_none());
    }
}
