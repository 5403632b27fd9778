//! Client id nonce generation
//!
//! Nonces only keep concurrent client identities apart on the transport
//! broker. They are not secrets, so `thread_rng` is sufficient.

use rand::Rng;

/// Length of the random client id suffix
pub const CLIENT_NONCE_LEN: usize = 16;

const ALPHANUMERIC: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random alphanumeric nonce of [`CLIENT_NONCE_LEN`] characters
pub fn generate_client_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..CLIENT_NONCE_LEN)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// Build a transport client id from the endpoint's client-name prefix
pub fn client_id(prefix: &str) -> String {
    format!("{prefix}{}", generate_client_nonce())
}
