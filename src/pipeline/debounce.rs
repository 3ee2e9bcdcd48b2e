//! Cancel-and-reschedule timers
//!
//! A [`Debouncer`] holds at most one pending deadline. Scheduling while a
//! deadline is pending replaces it, so a burst of triggers fires once, one
//! window after the last trigger. Deadlines are polled by the owner's tick
//! loop with an explicit `now`, which keeps timing deterministic in tests.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancels any pending deadline and starts a new window at `now`
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true exactly once when the pending deadline has passed
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// One independent debouncer per key, e.g. per module
#[derive(Debug, Clone)]
pub struct DebounceMap<K> {
    window: Duration,
    deadlines: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> DebounceMap<K> {
    pub fn new(window: Duration) -> Self {
        Self { window, deadlines: HashMap::new() }
    }

    pub fn schedule(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.window);
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Removes and returns every key whose deadline has passed, oldest
    /// deadline first
    pub fn drain_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired: Vec<(K, Instant)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(key, deadline)| (key.clone(), *deadline))
            .collect();
        expired.sort_by_key(|(_, deadline)| *deadline);
        for (key, _) in &expired {
            self.deadlines.remove(key);
        }
        expired.into_iter().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_fires_once_after_last_trigger() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        debouncer.schedule(start);
        debouncer.schedule(start + Duration::from_millis(80));
        assert!(!debouncer.poll_expired(start + Duration::from_millis(120)));
        assert!(debouncer.poll_expired(start + Duration::from_millis(180)));
        assert!(!debouncer.poll_expired(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_cancel_drops_pending_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.schedule(start);
        debouncer.cancel();
        assert!(!debouncer.is_pending());
        assert!(!debouncer.poll_expired(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_map_tracks_keys_independently() {
        let start = Instant::now();
        let mut map = DebounceMap::new(Duration::from_millis(50));
        map.schedule("a", start);
        map.schedule("b", start + Duration::from_millis(20));
        map.schedule("a", start + Duration::from_millis(40));

        assert_eq!(map.drain_expired(start + Duration::from_millis(75)), vec!["b"]);
        assert_eq!(map.drain_expired(start + Duration::from_millis(90)), vec!["a"]);
        assert!(map.is_empty());
    }
}
