// CLASSIFICATION: COMMUNITY
// Filename: util.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-04-11

//! Shared helpers used across the runtime.

use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ureq::Agent;

/// Seconds since the epoch.
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Milliseconds since the epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Short hex correlation id attached to every envelope call.
pub fn correlation_id() -> String {
    let mut rng = rand::thread_rng();
    let bits: u64 = rng.gen();
    format!("{bits:016x}")
}

/// Build a blocking HTTP agent with a global per-call deadline.
pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .proxy(None)
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_distinct() {
        let a = correlation_id();
        let b = correlation_id();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
