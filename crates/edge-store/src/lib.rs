//! In-memory per-camera latest-event store (spec §4.1).
//!
//! Ingestion (from transport threads) and pipeline reads (`snapshot`) may
//! happen concurrently; a single [`std::sync::Mutex`] guards the map. The
//! lock is held only long enough to update or clone the map, never while
//! running caller-supplied callbacks.

use std::collections::HashMap;
use std::sync::Mutex;

use sitelink_core::EdgeEvent;

/// Clock skew tolerated before a future-dated event is rejected rather than
/// clamped to `received_at` (spec §4.1 Failure).
const FUTURE_SKEW_TOLERANCE_SECS: f64 = 2.0;

struct Inner {
    events: HashMap<String, EdgeEvent>,
    last_event_at: Option<f64>,
}

/// Per-camera latest-event store. At most one event is retained per camera;
/// a newer event (by ingestion order) replaces the older one atomically.
pub struct EdgeEventStore {
    inner: Mutex<Inner>,
}

impl EdgeEventStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: HashMap::new(),
                last_event_at: None,
            }),
        }
    }

    /// Accept one normalized event. Returns `false` (no side effect) if
    /// `now - event.timestamp > max_age_secs`. A small future skew is
    /// clamped to `now`; anything beyond [`FUTURE_SKEW_TOLERANCE_SECS`] is
    /// rejected the same way an over-age event is.
    pub fn add_event(&self, mut event: EdgeEvent, now: f64, max_age_secs: f64) -> bool {
        let skew = event.timestamp - now;
        if skew > FUTURE_SKEW_TOLERANCE_SECS {
            tracing::warn!(
                camera_id = %event.camera_id,
                timestamp = event.timestamp,
                now,
                "rejecting event too far in the future"
            );
            return false;
        }
        if skew > 0.0 {
            event.timestamp = now;
        }

        let age = now - event.timestamp;
        if age > max_age_secs {
            tracing::warn!(
                camera_id = %event.camera_id,
                age,
                max_age_secs,
                "rejecting event older than EDGE_EVENT_MAX_AGE"
            );
            return false;
        }

        let mut inner = self.inner.lock().expect("edge event store lock poisoned");
        inner.events.insert(event.camera_id.clone(), event);
        inner.last_event_at = Some(now);
        true
    }

    /// Consistent snapshot of the current per-camera latest events.
    pub fn snapshot(&self) -> Vec<EdgeEvent> {
        let inner = self.inner.lock().expect("edge event store lock poisoned");
        inner.events.values().cloned().collect()
    }

    /// Seconds since the most recent successful ingest across all cameras,
    /// or `+∞` if none has ever arrived.
    pub fn last_event_age(&self, now: f64) -> f64 {
        let inner = self.inner.lock().expect("edge event store lock poisoned");
        match inner.last_event_at {
            Some(at) => now - at,
            None => f64::INFINITY,
        }
    }

    pub fn clear(&self, camera_id: &str) {
        let mut inner = self.inner.lock().expect("edge event store lock poisoned");
        inner.events.remove(camera_id);
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("edge event store lock poisoned");
        inner.events.clear();
        inner.last_event_at = None;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("edge event store lock poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EdgeEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitelink_core::RawEdgePayload;

    fn event(camera_id: &str, timestamp: f64) -> EdgeEvent {
        RawEdgePayload {
            camera_id: camera_id.to_string(),
            timestamp,
            detections: vec![],
        }
        .into_event(timestamp)
    }

    #[test]
    fn newer_event_supersedes_older_for_same_camera() {
        let store = EdgeEventStore::new();
        assert!(store.add_event(event("cam01", 100.0), 100.0, 300.0));
        assert!(store.add_event(event("cam01", 105.0), 105.0, 300.0));
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].timestamp, 105.0);
    }

    #[test]
    fn at_most_one_event_per_camera() {
        let store = EdgeEventStore::new();
        store.add_event(event("cam01", 100.0), 100.0, 300.0);
        store.add_event(event("cam02", 100.0), 100.0, 300.0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn events_older_than_max_age_are_rejected() {
        let store = EdgeEventStore::new();
        let accepted = store.add_event(event("cam01", 0.0), 120.0, 60.0);
        assert!(!accepted);
        assert!(store.is_empty());
    }

    #[test]
    fn small_future_skew_is_clamped_not_rejected() {
        let store = EdgeEventStore::new();
        let accepted = store.add_event(event("cam01", 101.0), 100.0, 300.0);
        assert!(accepted);
        assert_eq!(store.snapshot()[0].timestamp, 100.0);
    }

    #[test]
    fn large_future_skew_is_rejected() {
        let store = EdgeEventStore::new();
        let accepted = store.add_event(event("cam01", 1000.0), 100.0, 300.0);
        assert!(!accepted);
    }

    #[test]
    fn last_event_age_is_infinite_when_empty() {
        let store = EdgeEventStore::new();
        assert_eq!(store.last_event_age(100.0), f64::INFINITY);
    }

    #[test]
    fn last_event_age_tracks_most_recent_ingest() {
        let store = EdgeEventStore::new();
        store.add_event(event("cam01", 100.0), 100.0, 300.0);
        assert_eq!(store.last_event_age(130.0), 30.0);
    }

    #[test]
    fn clear_removes_single_camera() {
        let store = EdgeEventStore::new();
        store.add_event(event("cam01", 100.0), 100.0, 300.0);
        store.add_event(event("cam02", 100.0), 100.0, 300.0);
        store.clear("cam01");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_all_empties_store_and_resets_last_event_at() {
        let store = EdgeEventStore::new();
        store.add_event(event("cam01", 100.0), 100.0, 300.0);
        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.last_event_age(200.0), f64::INFINITY);
    }
}
