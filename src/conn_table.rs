//! Bounded slot allocator for live connections.
//!
//! A connection's "active-connection table" entry is a fixed array index
//! that doubles as its back-reference, with the index space itself
//! enforcing the concurrency cap. `crossbeam::queue::ArrayQueue` gives the
//! same three properties — bounded capacity, O(1) allocate/free, lock-free
//! under contention — without a hand-rolled free list, so a connection's
//! self-reference is the `u32` its `activate()` call returned.

use crate::limits::MAX_CONNECTIONS;
use crossbeam::queue::ArrayQueue;

/// Pool of free slot indices in `0..MAX_CONNECTIONS`.
pub struct ActiveConnections {
    free: ArrayQueue<u32>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        let free = ArrayQueue::new(MAX_CONNECTIONS);
        for slot in 0..MAX_CONNECTIONS as u32 {
            free.push(slot).expect("capacity matches MAX_CONNECTIONS");
        }
        Self { free }
    }

    /// Claims a slot for a newly accepted connection. `None` means the
    /// table is at capacity; the caller closes the socket and logs a
    /// warning rather than queuing the connection.
    pub fn activate(&self) -> Option<u32> {
        self.free.pop()
    }

    /// Returns a slot to the pool. Safe to call at most once per value
    /// returned from `activate`; calling it twice for the same slot would
    /// let two live connections share a self-reference.
    pub fn deactivate(&self, slot: u32) {
        let _ = self.free.push(slot);
    }

    pub fn in_use(&self) -> usize {
        MAX_CONNECTIONS - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        MAX_CONNECTIONS
    }
}

impl Default for ActiveConnections {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_hands_out_distinct_slots() {
        let table = ActiveConnections::new();
        let a = table.activate().unwrap();
        let b = table.activate().unwrap();
        assert_ne!(a, b);
        assert_eq!(table.in_use(), 2);
    }

    #[test]
    fn deactivate_returns_slot_to_pool() {
        let table = ActiveConnections::new();
        let a = table.activate().unwrap();
        table.deactivate(a);
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn table_rejects_activation_past_capacity() {
        let table = ActiveConnections::new();
        let slots: Vec<_> = (0..MAX_CONNECTIONS).map(|_| table.activate().unwrap()).collect();
        assert_eq!(slots.len(), MAX_CONNECTIONS);
        assert!(table.activate().is_none());
    }
}
