//! [`EdgeCommAdapter`] — transport-agnostic ingestion + phase publish (spec §4.2).

use std::sync::Arc;

use async_trait::async_trait;
use sitelink_core::{EdgeEvent, Phase};

use crate::error::AdapterError;

/// Invoked once per accepted inbound message, already decoded into an
/// [`EdgeEvent`]. Returns whether the caller's store accepted it (age/skew
/// checks happen downstream); the HTTP adapter echoes this in its response
/// body, the MQTT adapter only logs it.
pub type EventCallback = Arc<dyn Fn(EdgeEvent) -> bool + Send + Sync>;

/// Decouples transport (HTTP server, MQTT client) from ingestion and phase
/// publish. Implementations own their transport resources and release them
/// on [`stop`](EdgeCommAdapter::stop).
#[async_trait]
pub trait EdgeCommAdapter: Send + Sync {
    /// Starts the transport. Callable only once; later calls return
    /// `AlreadyStarted`.
    async fn start_event_ingestion(&self, on_event: EventCallback) -> Result<(), AdapterError>;

    /// Publishes the current phase. Never raises; `false` signals a
    /// transient send failure the caller may retry on the next heartbeat.
    async fn publish_phase(&self, phase: &Phase, timestamp: f64) -> bool;

    /// Idempotent. Releases transport resources with guaranteed release
    /// even if `start_event_ingestion` failed partway through.
    async fn stop(&self) -> Result<(), AdapterError>;
}
