//! MariaDB's `client_ed25519` auth plugin.
//!
//! MariaDB's scheme is a deterministic variant of Ed25519 signing where the
//! "message" is the server nonce and the "keypair" is derived straight from
//! the password — there is no external signature verification step, just a
//! fixed derivation both sides can reproduce. We build it from
//! `curve25519-dalek`'s scalar/point primitives rather than a signing API,
//! since the derivation injects `az_first`/`az_second` directly instead of
//! going through a seed.

use crate::errors::AuthError;
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};

/// `GenerateResponse` for the `client_ed25519` plugin: `R || s`, 64 bytes.
pub fn generate_response(password: &[u8], data1: &[u8], data2: &[u8]) -> Result<[u8; 64], AuthError> {
    let nonce_len = data1.len() + data2.len();
    if nonce_len != 32 {
        return Err(AuthError::BadEd25519NonceLength(nonce_len));
    }
    let mut m = [0u8; 32];
    m[..data1.len()].copy_from_slice(data1);
    m[data1.len()..].copy_from_slice(data2);

    let az: [u8; 64] = Sha512::digest(password).into();
    let mut az_first = [0u8; 32];
    az_first.copy_from_slice(&az[..32]);
    az_first[0] &= 248;
    az_first[31] &= 63;
    az_first[31] |= 64;
    let az_second = &az[32..64];

    // a = az_first (already clamped) · B
    let a_scalar = Scalar::from_bits_clamped(az_first);
    let a_point = (&a_scalar * ED25519_BASEPOINT_TABLE).compress();

    // r = SHA512(az_second || m) mod L
    let mut hasher = Sha512::new();
    hasher.update(az_second);
    hasher.update(m);
    let r_digest: [u8; 64] = hasher.finalize().into();
    let r_scalar = Scalar::from_bytes_mod_order_wide(&r_digest);
    let r_point = (&r_scalar * ED25519_BASEPOINT_TABLE).compress();

    // k = SHA512(R || A || m) mod L
    let mut hasher = Sha512::new();
    hasher.update(r_point.as_bytes());
    hasher.update(a_point.as_bytes());
    hasher.update(m);
    let k_digest: [u8; 64] = hasher.finalize().into();
    let k_scalar = Scalar::from_bytes_mod_order_wide(&k_digest);

    // s = r + k * az_first mod L
    let s_scalar = r_scalar + k_scalar * a_scalar;

    let mut out = [0u8; 64];
    out[..32].copy_from_slice(r_point.as_bytes());
    out[32..].copy_from_slice(s_scalar.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_inputs() {
        let data1 = [1u8; 8];
        let data2 = [2u8; 24];
        let a = generate_response(b"hunter2", &data1, &data2).unwrap();
        let b = generate_response(b"hunter2", &data1, &data2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_wrong_nonce_length() {
        let err = generate_response(b"x", &[0u8; 8], &[0u8; 10]).unwrap_err();
        assert_eq!(err, AuthError::BadEd25519NonceLength(18));
    }

    #[test]
    fn different_passwords_diverge() {
        let data1 = [1u8; 8];
        let data2 = [2u8; 24];
        let a = generate_response(b"hunter2", &data1, &data2).unwrap();
        let b = generate_response(b"hunter3", &data1, &data2).unwrap();
        assert_ne!(a, b);
    }
}
