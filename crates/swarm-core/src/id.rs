//! Short, collision-resistant opaque agent identifiers.
//!
//! Not UUIDs — these want to be short and readable in a terminal. 10
//! lowercase base32 (RFC 4648, no padding, `0-9a-v` alphabet) characters
//! seeded from wall-clock nanos plus a process-local counter, in the same
//! spirit as purpose-hash short IDs minted for subagents elsewhere.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Generate a new opaque agent ID. Guaranteed-unique within a process;
/// collision-resistant across processes (128 bits of entropy folded into
/// a 10-char, 50-bit string is more than enough for the scale this system
/// operates at — dozens to low thousands of concurrently tracked agents).
pub fn generate() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = DefaultHasher::new();
    nanos.hash(&mut hasher);
    seq.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    let mut bits = hasher.finish();

    let mut out = String::with_capacity(10);
    for _ in 0..10 {
        out.push(ALPHABET[(bits & 0x1f) as usize] as char);
        bits >>= 5;
        if bits == 0 {
            // re-seed from the low bits of nanos so we don't run dry
            bits = (nanos as u64) ^ seq;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_ten_chars_lowercase_base32() {
        let id = generate();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            assert!(seen.insert(generate()), "duplicate id generated");
        }
    }
}
