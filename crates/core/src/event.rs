//! The normalized edge inference record and its detection payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single detected object inside an [`EdgeEvent`]'s payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    /// `[x1, y1, x2, y2]` in the edge side's coordinate space.
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub confidence: f64,
    /// Local (single-camera) tracking id, if the edge producer assigns one.
    pub local_id: Option<u64>,
}

/// A normalized inference record pushed by one camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub camera_id: String,
    /// Epoch seconds, UTC, as reported by the edge producer.
    pub timestamp: f64,
    /// Wall-clock epoch seconds at ingestion time.
    pub received_at: f64,
    pub detections: Vec<Detection>,
    /// Opaque extra fields the edge producer may attach; never interpreted
    /// by the daemon, only forwarded.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl EdgeEvent {
    /// Age of this event relative to `now` (wall-clock epoch seconds).
    /// Negative if `timestamp` is in the future relative to `now`.
    pub fn age_secs(&self, now: f64) -> f64 {
        now - self.timestamp
    }
}

/// Wire shape accepted over HTTP/MQTT ingestion, decoded into an [`EdgeEvent`]
/// by the comm adapter (see spec §6: `{camera_id, timestamp, detections}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdgePayload {
    pub camera_id: String,
    pub timestamp: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl RawEdgePayload {
    /// Normalize into an [`EdgeEvent`], stamping `received_at` with the
    /// current wall clock.
    pub fn into_event(self, received_at: f64) -> EdgeEvent {
        EdgeEvent {
            camera_id: self.camera_id,
            timestamp: self.timestamp,
            received_at,
            detections: self.detections,
            extra: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_secs_positive_for_past_event() {
        let event = RawEdgePayload {
            camera_id: "cam01".into(),
            timestamp: 100.0,
            detections: vec![],
        }
        .into_event(100.0);
        assert_eq!(event.age_secs(130.0), 30.0);
    }

    #[test]
    fn raw_payload_roundtrips_through_json() {
        let json = r#"{"camera_id":"cam01","timestamp":1700000000.0,"detections":[{"class":"person","box":[1.0,2.0,3.0,4.0],"confidence":0.9,"local_id":5}]}"#;
        let payload: RawEdgePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.camera_id, "cam01");
        assert_eq!(payload.detections.len(), 1);
        assert_eq!(payload.detections[0].local_id, Some(5));
    }

    #[test]
    fn raw_payload_defaults_empty_detections() {
        let json = r#"{"camera_id":"cam01","timestamp":1.0}"#;
        let payload: RawEdgePayload = serde_json::from_str(json).unwrap();
        assert!(payload.detections.is_empty());
    }
}
