//! Time-windowed suppression of repeated switch events
//!
//! Switches repeat their messages over the mesh, so the same physical press
//! arrives several times. Entries older than the window are purged lazily
//! whenever a new event is checked.

use casambi_protocol::SwitchEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Fingerprint of a switch event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub unit_id: u16,
    pub button: u8,
    pub payload_hex: String,
}

impl DedupKey {
    #[must_use] pub fn from_event(event: &SwitchEvent) -> Self {
        Self {
            unit_id: event.unit_id,
            button: event.button,
            payload_hex: event.payload_hex(),
        }
    }
}

/// Result of checking an event against the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First occurrence inside the window; it has been recorded
    Fresh,
    /// Seen `age` ago
    Duplicate { age: Duration },
}

/// Cache of recently delivered switch events
#[derive(Debug)]
pub struct EventDeduplicator {
    window: Duration,
    seen: HashMap<DedupKey, Instant>,
}

impl EventDeduplicator {
    #[must_use] pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    #[must_use] pub fn window(&self) -> Duration {
        self.window
    }

    /// Check `key` at `now`, recording it if it is fresh
    ///
    /// A duplicate does not refresh the recorded timestamp, so a button held
    /// down is reported again once the window has passed.
    pub fn check(&mut self, key: DedupKey, now: Instant) -> DedupOutcome {
        self.purge(now);

        if let Some(last_seen) = self.seen.get(&key) {
            return DedupOutcome::Duplicate {
                age: now.saturating_duration_since(*last_seen),
            };
        }

        self.seen.insert(key, now);
        DedupOutcome::Fresh
    }

    fn purge(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, last_seen| now.saturating_duration_since(*last_seen) <= window);
    }

    #[must_use] pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(unit_id: u16, button: u8, payload: &str) -> DedupKey {
        DedupKey {
            unit_id,
            button,
            payload_hex: payload.to_string(),
        }
    }

    #[test]
    fn test_duplicate_inside_window_then_fresh_after() {
        let mut cache = EventDeduplicator::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert_eq!(cache.check(key(5, 2, "aabb"), t0), DedupOutcome::Fresh);
        assert_eq!(
            cache.check(key(5, 2, "aabb"), t0 + Duration::from_secs(5)),
            DedupOutcome::Duplicate {
                age: Duration::from_secs(5)
            }
        );
        assert_eq!(
            cache.check(key(5, 2, "aabb"), t0 + Duration::from_secs(11)),
            DedupOutcome::Fresh
        );
    }

    #[test]
    fn test_distinct_keys_do_not_collide() {
        let mut cache = EventDeduplicator::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert_eq!(cache.check(key(5, 2, "aabb"), t0), DedupOutcome::Fresh);
        assert_eq!(cache.check(key(5, 3, "aabb"), t0), DedupOutcome::Fresh);
        assert_eq!(cache.check(key(6, 2, "aabb"), t0), DedupOutcome::Fresh);
        assert_eq!(cache.check(key(5, 2, "aabc"), t0), DedupOutcome::Fresh);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_expired_entries_are_purged() {
        let mut cache = EventDeduplicator::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cache.check(key(1, 1, "01"), t0);
        cache.check(key(2, 1, "01"), t0 + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);

        cache.check(key(3, 1, "01"), t0 + Duration::from_secs(12));
        // Only the entry from t=3 and the new one survive
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.check(key(1, 1, "01"), t0 + Duration::from_secs(12)),
            DedupOutcome::Fresh
        );
    }
}
