//! Minimal text-resultset parsing.
//!
//! The core does not interpret query results in general (see the proxy's
//! non-goals); the one exception is the health checker's optional
//! `SHOW GLOBAL VARIABLES LIKE 'read_only'` probe, which needs to read
//! exactly one scalar value back out of a two-column result set. This module
//! is intentionally narrow: it does not attempt to model every MySQL column
//! type, NULL-handling edge case, or multi-row result.

use crate::protocol::mysql::basic::read_length_encoded_number;

/// Reads the column count from the first packet of a resultset response.
pub fn column_count(payload: &[u8]) -> Option<u64> {
    read_length_encoded_number(payload).ok().map(|(_, n)| n)
}

/// Parses one text-protocol row into its lenenc-string column values.
///
/// A column value of `0xFB` denotes SQL NULL and is represented as `None`.
pub fn text_row_values(payload: &[u8]) -> Vec<Option<Vec<u8>>> {
    let mut values = Vec::new();
    let mut input = payload;
    while !input.is_empty() {
        if input[0] == 0xFB {
            values.push(None);
            input = &input[1..];
            continue;
        }
        let Ok((rest, len)) = read_length_encoded_number(input) else {
            break;
        };
        let len = len as usize;
        if rest.len() < len {
            break;
        }
        values.push(Some(rest[..len].to_vec()));
        input = &rest[len..];
    }
    values
}

/// Convenience accessor for the health-check probe: the second column
/// (`Value`) of a single-row `SHOW GLOBAL VARIABLES LIKE '...'` resultset.
pub fn second_column_text(row_payload: &[u8]) -> Option<String> {
    let values = text_row_values(row_payload);
    values
        .into_iter()
        .nth(1)
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variable_name_value_row() {
        let mut payload = Vec::new();
        payload.push(9);
        payload.extend_from_slice(b"read_only");
        payload.push(2);
        payload.extend_from_slice(b"ON");
        let values = text_row_values(&payload);
        assert_eq!(values[0].as_deref(), Some(&b"read_only"[..]));
        assert_eq!(values[1].as_deref(), Some(&b"ON"[..]));
        assert_eq!(second_column_text(&payload).as_deref(), Some("ON"));
    }

    #[test]
    fn null_column_is_none() {
        let payload = [0xFBu8, 1, b'x'];
        let values = text_row_values(&payload);
        assert_eq!(values[0], None);
        assert_eq!(values[1].as_deref(), Some(&b"x"[..]));
    }
}
