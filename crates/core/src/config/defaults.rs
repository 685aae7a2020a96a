//! Default values and functions for configuration

/// Default interval between polling scans
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Capacity of a watch key's pending event queue
pub const MAX_PENDING_EVENTS: usize = 512;

pub(crate) fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub(crate) fn default_event_kinds() -> Vec<String> {
    vec![
        "create".to_string(),
        "modify".to_string(),
        "delete".to_string(),
    ]
}
