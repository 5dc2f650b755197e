//! Password-authentication algorithms (component D).
//!
//! Each algorithm is a pure function over byte slices — none of them may
//! suspend (§5) — selected at handshake time by a small factory mapping a
//! plugin-name string to a tagged variant, mirroring the plugin dispatch a
//! real MySQL/MariaDB client library performs.

mod ed25519;

use crate::errors::AuthError;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// A client-side password-auth algorithm, selected by plugin name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    ClearPassword,
    NativePassword,
    CachingSha2Password,
    Ed25519,
}

impl AuthAlgorithm {
    /// Maps an auth plugin name to a variant. Unknown plugins fall back to
    /// `NativePassword`, matching `auth::Factory::MakeAuthHandler`'s
    /// non-strict mode; pass `strict = true` to reject unknown plugins.
    pub fn from_plugin_name(name: &str, strict: bool) -> Option<Self> {
        match name {
            "mysql_clear_password" => Some(Self::ClearPassword),
            "caching_sha2_password" => Some(Self::CachingSha2Password),
            "client_ed25519" => Some(Self::Ed25519),
            "mysql_native_password" => Some(Self::NativePassword),
            _ if !strict => Some(Self::NativePassword),
            _ => None,
        }
    }

    pub fn plugin_name(self) -> &'static str {
        match self {
            Self::ClearPassword => "mysql_clear_password",
            Self::NativePassword => "mysql_native_password",
            Self::CachingSha2Password => "caching_sha2_password",
            Self::Ed25519 => "client_ed25519",
        }
    }

    /// `GenerateResponse(password_clear, password_sha1, data1, data2)`.
    pub fn generate_response(
        self,
        password_clear: Option<&[u8]>,
        password_sha1: Option<&[u8]>,
        data1: &[u8],
        data2: &[u8],
    ) -> Result<Vec<u8>, AuthError> {
        match self {
            Self::ClearPassword => clear_password(password_clear, password_sha1),
            Self::NativePassword => native_password(password_clear, password_sha1, data1, data2),
            Self::CachingSha2Password => {
                caching_sha2_password(password_clear, password_sha1, data1, data2)
            }
            Self::Ed25519 => {
                let password = password_clear.ok_or(AuthError::NeedClearPassword)?;
                ed25519::generate_response(password, data1, data2).map(|bytes| bytes.to_vec())
            }
        }
    }
}

fn clear_password(
    password_clear: Option<&[u8]>,
    password_sha1: Option<&[u8]>,
) -> Result<Vec<u8>, AuthError> {
    match password_clear {
        Some(p) => Ok(p.to_vec()),
        None if password_sha1.is_some() => Err(AuthError::NeedClearPassword),
        None => Ok(Vec::new()),
    }
}

fn concat_nonce(data1: &[u8], data2: &[u8]) -> Result<Vec<u8>, AuthError> {
    let total = data1.len() + data2.len();
    if total != 21 || data2.last() != Some(&0) {
        return Err(AuthError::BadNonceLength(total));
    }
    let mut nonce = Vec::with_capacity(20);
    nonce.extend_from_slice(data1);
    nonce.extend_from_slice(&data2[..data2.len() - 1]);
    Ok(nonce)
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// `S = SHA1(password)` (or supplied), `T = SHA1(S)`,
/// response = `SHA1(data1||data2||T) XOR S`.
fn native_password(
    password_clear: Option<&[u8]>,
    password_sha1: Option<&[u8]>,
    data1: &[u8],
    data2: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let nonce = concat_nonce(data1, data2)?;
    let s = match password_sha1 {
        Some(s) => s.to_vec(),
        None => Sha1::digest(password_clear.unwrap_or(b"")).to_vec(),
    };
    let t = Sha1::digest(&s).to_vec();
    let mut hasher_input = nonce;
    hasher_input.extend_from_slice(&t);
    let digest = Sha1::digest(&hasher_input).to_vec();
    Ok(xor(&digest, &s))
}

/// `S = SHA256(password)`, `T = SHA256(S)`,
/// response = `SHA256(T||data1||data2) XOR S`.
fn caching_sha2_password(
    password_clear: Option<&[u8]>,
    password_sha1: Option<&[u8]>,
    data1: &[u8],
    data2: &[u8],
) -> Result<Vec<u8>, AuthError> {
    if password_clear.is_none() {
        return Err(AuthError::NeedClearPassword);
    }
    let nonce = concat_nonce(data1, data2)?;
    let _ = password_sha1; // caching_sha2_password has no SHA-1 fallback.
    let password = password_clear.unwrap();
    let s = Sha256::digest(password).to_vec();
    let t = Sha256::digest(&s).to_vec();
    let mut hasher_input = t;
    hasher_input.extend_from_slice(&nonce);
    let digest = Sha256::digest(&hasher_input).to_vec();
    Ok(xor(&digest, &s))
}

/// First byte of the server's `caching_sha2_password` fast-auth response.
pub const FAST_AUTH_MORE_DATA: u8 = 0x01;
/// `{0x01, 0x03}`: fast-path succeeded, proceed straight to OK.
pub const FAST_AUTH_OK: u8 = 0x03;
/// `{0x01, 0x04}`: server demands the RSA full-auth path (unsupported).
pub const FAST_AUTH_FULL_AUTH_REQUIRED: u8 = 0x04;

/// Generates a fresh 20-byte auth-plugin-data nonce (8+12 split, NUL/`'`-free).
pub fn gen_auth_plugin_data() -> [u8; 20] {
    let mut rng = rand::thread_rng();
    let mut out = [0u8; 20];
    loop {
        rng.fill_bytes(&mut out);
        if out.iter().all(|&b| b != 0 && b != b'\'' && b != b'\\') {
            return out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha1(input: &[u8]) -> Vec<u8> {
        Sha1::digest(input).to_vec()
    }

    #[test]
    fn native_password_matches_documented_formula() {
        let data1 = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let mut data2 = [0u8; 13];
        for (i, b) in data2.iter_mut().enumerate().take(12) {
            *b = 8 + i as u8;
        }
        let response = native_password(Some(b"foo"), None, &data1, &data2).unwrap();
        let s = sha1(b"foo");
        let t = sha1(&s);
        let mut nonce = data1.to_vec();
        nonce.extend_from_slice(&data2[..12]);
        nonce.extend_from_slice(&t);
        let expected = xor(&sha1(&nonce), &s);
        assert_eq!(response, expected);
    }

    #[test]
    fn clear_password_requires_cleartext() {
        let err = clear_password(None, Some(&[1, 2, 3])).unwrap_err();
        assert_eq!(err, AuthError::NeedClearPassword);
    }

    #[test]
    fn caching_sha2_rejects_sha1_only_input() {
        let data1 = [0u8; 8];
        let data2 = [0u8; 13];
        let err = caching_sha2_password(None, Some(&[1, 2, 3]), &data1, &data2).unwrap_err();
        assert_eq!(err, AuthError::NeedClearPassword);
    }

    #[test]
    fn factory_defaults_unknown_plugins_to_native() {
        assert_eq!(
            AuthAlgorithm::from_plugin_name("something_else", false),
            Some(AuthAlgorithm::NativePassword)
        );
        assert_eq!(AuthAlgorithm::from_plugin_name("something_else", true), None);
    }
}
