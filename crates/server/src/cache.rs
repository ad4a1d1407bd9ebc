//! Keyed TTL cache with an injected clock.
//!
//! Owned by `AppState` and shared by clone; the webhook handler uses it to
//! short-circuit replayed provider event ids. Entries are process-local and
//! advisory only — durable idempotency comes from conditioning status
//! transitions on current order state.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use rosterframe_core::clock::Clock;

#[derive(Clone)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: Arc<Mutex<HashMap<K, (DateTime<Utc>, V)>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let expires = self.clock.now() + self.ttl;
        self.entries.lock().unwrap().insert(key, (expires, value));
    }

    /// Fetch a live entry; expired entries are dropped on read.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((expires, value)) if *expires > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .retain(|_, (expires, _)| *expires > now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rosterframe_core::clock::testing::ManualClock;

    fn cache_with_clock(ttl_secs: i64) -> (Arc<ManualClock>, TtlCache<String, u32>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(Duration::seconds(ttl_secs), clock.clone());
        (clock, cache)
    }

    #[test]
    fn entries_live_until_ttl() {
        let (clock, cache) = cache_with_clock(60);
        cache.insert("evt_1".into(), 1);
        assert_eq!(cache.get(&"evt_1".into()), Some(1));

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.get(&"evt_1".into()), Some(1));

        clock.advance(Duration::seconds(2));
        assert_eq!(cache.get(&"evt_1".into()), None);
        assert!(cache.is_empty(), "expired entry dropped on read");
    }

    #[test]
    fn purge_sweeps_expired_entries() {
        let (clock, cache) = cache_with_clock(10);
        cache.insert("a".into(), 1);
        clock.advance(Duration::seconds(5));
        cache.insert("b".into(), 2);
        clock.advance(Duration::seconds(6));

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b".into()), Some(2));
    }
}
