//! Client secrets handed out with payment intents.

use rand::RngCore;

/// Random bytes per secret (128 bits).
pub const SECRET_BYTES: usize = 16;

/// Generates a fresh hex-encoded client secret.
pub fn generate() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compares a stored secret with a supplied one in constant time.
pub fn matches(expected: &str, supplied: &str) -> bool {
    constant_time_eq::constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}
