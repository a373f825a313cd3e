//! Compile-time resource budgets for the proxy core: a fixed per-connection
//! buffer, a fixed connection table, and a fixed backlog. They are
//! deliberately not user-configurable — see [`crate::config::ProxyConfig`]
//! for the knobs that are.

use std::time::Duration;

/// Size in bytes of each [`crate::buffer::Endpoint`] buffer.
///
/// Headers beyond this size are rejected with 431; this also bounds the
/// framer's per-call work since it never scans past `read_index`.
pub const BUFFER_SIZE: usize = 8192;

/// Maximum body size accepted from either side, in bytes.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of simultaneously live connections.
///
/// The active-connection table is a fixed array of this many slots; the
/// `N+1`th concurrent accept is rejected rather than queued.
pub const MAX_CONNECTIONS: usize = 256;

/// `listen()` backlog for the proxy's listening socket.
pub const BACKLOG: i32 = 25;

/// Per-type state timeouts and the overall connection timeout.
///
/// Field order matches [`crate::timeout::TimeoutType`] discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutLimits {
    pub request_read: Duration,
    pub request_write: Duration,
    pub response_read: Duration,
    pub response_write: Duration,
    pub connection: Duration,
}

impl Default for TimeoutLimits {
    fn default() -> Self {
        Self {
            request_read: Duration::from_secs(10),
            request_write: Duration::from_secs(5),
            response_read: Duration::from_secs(20),
            response_write: Duration::from_secs(5),
            connection: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configured_ttls() {
        let t = TimeoutLimits::default();
        assert_eq!(t.request_read, Duration::from_secs(10));
        assert_eq!(t.request_write, Duration::from_secs(5));
        assert_eq!(t.response_read, Duration::from_secs(20));
        assert_eq!(t.response_write, Duration::from_secs(5));
        assert_eq!(t.connection, Duration::from_secs(30));
    }
}
