//! Per-client token bucket: `per_second` tokens, replenished to full once
//! per second. The bucket lives in the connection's private state; this
//! module holds the arithmetic.

use crate::conn::SessionState;
use std::time::{Duration, Instant};

/// Take one token, replenishing first when the window rolled over.
/// Returns false when the bucket is empty.
pub fn try_take(session: &mut SessionState, per_second: u64) -> bool {
    let now = Instant::now();
    if now.duration_since(session.bucket_reset) >= Duration::from_secs(1) {
        session.tokens = per_second;
        session.bucket_reset = now;
    }
    if session.tokens == 0 {
        return false;
    }
    session.tokens -= 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_exhausts_then_replenishes() {
        let mut session = SessionState::new(3);
        assert!(try_take(&mut session, 3));
        assert!(try_take(&mut session, 3));
        assert!(try_take(&mut session, 3));
        assert!(!try_take(&mut session, 3));

        // Roll the window back artificially instead of sleeping.
        session.bucket_reset = Instant::now() - Duration::from_secs(2);
        assert!(try_take(&mut session, 3));
        assert_eq!(session.tokens, 2);
    }
}
