//! Ordered timeout queue keyed by absolute expiry.
//!
//! The dispatcher holds one [`TimeoutWheel`] for the whole process. Each
//! connection task owns a [`ConnSlot`] registered with the wheel; expiry is
//! delivered by `await`ing [`ConnSlot::expired`] rather than by the
//! dispatcher polling a list and forcing a state transition by hand, since
//! here each connection is its own task rather than a case dispatched from
//! a single event loop.

use crate::limits::TimeoutLimits;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep_until;

/// Which phase a timeout belongs to; order matches the TTL table in §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutType {
    RequestRead,
    RequestWrite,
    ResponseRead,
    ResponseWrite,
    Connection,
}

impl TimeoutType {
    fn ttl(self, limits: &TimeoutLimits) -> Duration {
        match self {
            Self::RequestRead => limits.request_read,
            Self::RequestWrite => limits.request_write,
            Self::ResponseRead => limits.response_read,
            Self::ResponseWrite => limits.response_write,
            Self::Connection => limits.connection,
        }
    }

    /// Status code `clear_expired` assigns when a timeout of this type
    /// fires (§4.4).
    pub fn status_code(self) -> u16 {
        match self {
            Self::RequestRead | Self::RequestWrite => 408,
            Self::ResponseRead | Self::ResponseWrite => 504,
            Self::Connection => 500,
        }
    }
}

type TimerId = u64;

/// Global, sorted-by-expiry timeout list.
///
/// Modeled as a `BTreeSet<(Instant, TimerId)>` rather than the original's
/// intrusive singly-linked list: insertion, removal, and earliest-first
/// iteration are all `O(log n)`/`O(1)` and there is no unsafe back-pointer
/// juggling, while the externally observable contract — strictly
/// non-decreasing expiry order, two live slots per connection — is
/// identical. Expiry itself is delivered by [`ConnSlot::expired`] racing
/// `sleep_until` against each held key's `Instant`, so the set holds no
/// wake primitive of its own — just the ordered keys, for membership and
/// ordering.
pub struct TimeoutWheel {
    limits: TimeoutLimits,
    next_id: AtomicU64,
    entries: Mutex<BTreeSet<(Instant, TimerId)>>,
}

impl TimeoutWheel {
    pub fn new(limits: TimeoutLimits) -> Self {
        Self {
            limits,
            next_id: AtomicU64::new(0),
            entries: Mutex::new(BTreeSet::new()),
        }
    }

    fn fresh_id(&self) -> TimerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn arm(&self, ttl: Duration) -> ArmedTimeout {
        let expires_at = Instant::now() + ttl;
        let id = self.fresh_id();
        self.entries.lock().unwrap().insert((expires_at, id));
        ArmedTimeout { key: (expires_at, id) }
    }

    fn disarm(&self, key: (Instant, TimerId)) {
        self.entries.lock().unwrap().remove(&key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[cfg(test)]
    fn is_sorted(&self) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.iter().is_sorted()
    }
}

struct ArmedTimeout {
    key: (Instant, TimerId),
}

/// The two timeout slots a live connection holds: a per-state timeout for
/// the current phase, and an overall connection-lifetime timeout.
pub struct ConnSlot<'a> {
    wheel: &'a TimeoutWheel,
    state_timeout: Option<ArmedTimeout>,
    pending_type: Option<TimeoutType>,
    conn_timeout: Option<ArmedTimeout>,
}

impl<'a> ConnSlot<'a> {
    pub fn new(wheel: &'a TimeoutWheel) -> Self {
        Self {
            wheel,
            state_timeout: None,
            pending_type: None,
            conn_timeout: None,
        }
    }

    /// Replaces any prior state-timeout with a fresh one for `ty`.
    pub fn start_state_timeout(&mut self, ty: TimeoutType) {
        self.remove_state_timeout();
        self.state_timeout = Some(self.wheel.arm(ty.ttl(&self.wheel.limits)));
        self.pending_type = Some(ty);
    }

    pub fn remove_state_timeout(&mut self) {
        if let Some(armed) = self.state_timeout.take() {
            self.wheel.disarm(armed.key);
        }
        self.pending_type = None;
    }

    /// Replaces any prior overall-connection timeout. `ttl = None` uses the
    /// default `CONNECTION` TTL.
    pub fn start_conn_timeout(&mut self, ttl: Option<Duration>) {
        self.remove_conn_timeout();
        let ttl = ttl.unwrap_or(self.wheel.limits.connection);
        self.conn_timeout = Some(self.wheel.arm(ttl));
    }

    pub fn remove_conn_timeout(&mut self) {
        if let Some(armed) = self.conn_timeout.take() {
            self.wheel.disarm(armed.key);
        }
    }

    /// Resolves when either slot's timer has run its course. The caller
    /// (the dispatcher's per-connection task) races this against the I/O
    /// future for the current state, exactly like `select!` over the
    /// readiness multiplexer and the timeout-to-next-expiry in the
    /// original design.
    pub async fn expired(&self) -> TimeoutType {
        // Two independently-expiring slots; race both and report which
        // type fired. `pending_type` tracks which TimeoutType the state
        // slot currently holds.
        let state = async {
            if let Some(armed) = &self.state_timeout {
                sleep_until(tokio::time::Instant::from_std(armed.key.0)).await;
                self.pending_type.unwrap_or(TimeoutType::Connection)
            } else {
                std::future::pending().await
            }
        };
        let conn = async {
            if let Some(armed) = &self.conn_timeout {
                sleep_until(tokio::time::Instant::from_std(armed.key.0)).await;
                TimeoutType::Connection
            } else {
                std::future::pending().await
            }
        };
        tokio::select! {
            ty = state => ty,
            ty = conn => ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_then_disarmed_leaves_list_empty() {
        let wheel = TimeoutWheel::new(TimeoutLimits::default());
        let mut slot = ConnSlot::new(&wheel);
        slot.start_state_timeout(TimeoutType::RequestRead);
        slot.start_conn_timeout(None);
        assert_eq!(wheel.len(), 2);
        slot.remove_state_timeout();
        assert_eq!(wheel.len(), 1);
        slot.remove_conn_timeout();
        assert_eq!(wheel.len(), 0);
    }

    #[test]
    fn restarting_state_timeout_keeps_at_most_one_entry_per_slot() {
        let wheel = TimeoutWheel::new(TimeoutLimits::default());
        let mut slot = ConnSlot::new(&wheel);
        slot.start_state_timeout(TimeoutType::RequestRead);
        slot.start_state_timeout(TimeoutType::ResponseRead);
        assert_eq!(wheel.len(), 1);
    }

    #[test]
    fn wheel_stays_sorted_across_many_connections() {
        let wheel = TimeoutWheel::new(TimeoutLimits::default());
        let mut slots: Vec<_> = (0..16).map(|_| ConnSlot::new(&wheel)).collect();
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.start_conn_timeout(Some(Duration::from_millis((i as u64 + 1) * 10)));
        }
        assert!(wheel.is_sorted());
        slots[3].remove_conn_timeout();
        assert!(wheel.is_sorted());
    }

    #[test]
    fn status_codes_match_phase() {
        assert_eq!(TimeoutType::RequestRead.status_code(), 408);
        assert_eq!(TimeoutType::RequestWrite.status_code(), 408);
        assert_eq!(TimeoutType::ResponseRead.status_code(), 504);
        assert_eq!(TimeoutType::ResponseWrite.status_code(), 504);
        assert_eq!(TimeoutType::Connection.status_code(), 500);
    }
}
