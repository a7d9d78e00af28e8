//! Key/value aliases and wall-clock helpers.
//!
//! Keys and values are raw byte strings throughout the system; nothing
//! assumes UTF-8. Expiration deadlines are absolute epoch milliseconds
//! (`i64`), matching the on-disk WAL header field.

use std::time::{SystemTime, UNIX_EPOCH};

/// A key identifier: an arbitrary byte string.
pub type Key = Vec<u8>;

/// A stored value payload: an arbitrary byte string.
pub type Value = Vec<u8>;

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        // Clock before 1970: treat as epoch so TTL math stays defined.
        Err(_) => 0,
    }
}

/// Current wall-clock time as epoch nanoseconds (change-feed timestamps).
pub fn now_ns() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_recent() {
        // Anything after 2020-01-01 counts as a sane clock.
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_now_ns_outpaces_now_ms() {
        let ms = now_ms();
        let ns = now_ns();
        assert!(ns / 1_000_000 >= ms - 1000);
    }
}
