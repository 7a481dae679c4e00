//! Password authentication for the initial handshake.
//!
//! Only the SHA1 challenge/response scheme (`mysql_native_password`) is
//! implemented:
//!
//! ```text
//! H1    = SHA1(password)
//! H2    = SHA1(H1)
//! token = SHA1(challenge || H2) XOR H1
//! ```
//!
//! The server stores `H2`, so it can recover `H1` from the token and check
//! that `SHA1(H1) == H2` without ever seeing the password.

use sha1::{Digest, Sha1};

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based challenge/response
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
}

/// Length of the server challenge and of the resulting token.
pub const SCRAMBLE_LENGTH: usize = 20;

/// Compute the `mysql_native_password` token for `password` and `challenge`.
///
/// Returns an empty token when no password (or an empty one) is configured,
/// which the server reads as "no password". Only the first 20 bytes of the
/// challenge are used.
pub fn scramble_native_password(password: Option<&str>, challenge: &[u8]) -> Vec<u8> {
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => return Vec::new(),
    };

    let seed = &challenge[..challenge.len().min(SCRAMBLE_LENGTH)];

    let h1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let h2: [u8; 20] = Sha1::digest(h1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(h2);
    let mixed: [u8; 20] = hasher.finalize().into();

    h1.iter().zip(mixed.iter()).map(|(a, b)| a ^ b).collect()
}
