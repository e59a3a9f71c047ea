//! Job identifier generation.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a generated `unique_id`.
pub const UNIQUE_ID_LEN: usize = 20;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Random URL-safe identifier; the only externally addressable identity of a job.
pub fn new_unique_id() -> String {
    let mut rng = rand::thread_rng();
    (0..UNIQUE_ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Ordering key: current Unix time in milliseconds plus up to 10s of jitter.
/// Not guaranteed unique; the store rejects collisions.
pub fn new_row_id() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    millis + rand::thread_rng().gen_range(0..10_000)
}
