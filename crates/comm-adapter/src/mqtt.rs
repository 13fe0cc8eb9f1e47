//! `MqttEdgeCommAdapter` — subscribes for ingestion, publishes phase with
//! retain/QoS (spec §6 MQTT transport).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use sitelink_core::{Phase, RawEdgePayload};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::{EdgeCommAdapter, EventCallback};
use crate::error::AdapterError;

/// Bound on how long `publish_phase` waits for the broker's `PUBACK`/
/// `PUBCOMP` before giving up and reporting the publish as not accepted.
const PUBLISH_ACK_TIMEOUT: Duration = Duration::from_secs(5);

fn qos_from(n: u8) -> QoS {
    match n {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

pub struct MqttEdgeCommAdapter {
    host: String,
    port: u16,
    client_id: String,
    qos: u8,
    retain: bool,
    heartbeat_secs: u64,
    retry_backoff_secs: u64,
    phase_topic: String,
    events_topic: String,
    started: AtomicBool,
    stopped: AtomicBool,
    client: Mutex<Option<AsyncClient>>,
    eventloop_task: Mutex<Option<JoinHandle<()>>>,
    /// Packet ids of `PUBACK`/`PUBCOMP` events observed by the event loop
    /// task, drained by `publish_phase` to confirm broker acknowledgment.
    ack_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<u16>>>,
    /// Serializes `publish_phase` calls: since `rumqttc::AsyncClient::publish`
    /// doesn't return the packet id it assigns, the next ack observed on the
    /// shared event loop after a publish is enqueued is trusted to belong to
    /// it, which only holds if no other publish is in flight concurrently.
    publish_lock: AsyncMutex<()>,
}

impl MqttEdgeCommAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        qos: u8,
        retain: bool,
        heartbeat_secs: u64,
        retry_backoff_secs: u64,
        phase_topic: impl Into<String>,
        events_topic: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            qos,
            retain,
            heartbeat_secs,
            retry_backoff_secs,
            phase_topic: phase_topic.into(),
            events_topic: events_topic.into(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            client: Mutex::new(None),
            eventloop_task: Mutex::new(None),
            ack_rx: AsyncMutex::new(None),
            publish_lock: AsyncMutex::new(()),
        }
    }
}

#[async_trait]
impl EdgeCommAdapter for MqttEdgeCommAdapter {
    async fn start_event_ingestion(&self, on_event: EventCallback) -> Result<(), AdapterError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::AlreadyStarted);
        }

        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.heartbeat_secs.max(5)));
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        client
            .subscribe(&self.events_topic, qos_from(self.qos))
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        info!(topic = %self.events_topic, host = %self.host, port = self.port, "mqtt edge comm adapter subscribed");

        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        *self.ack_rx.lock().await = Some(ack_rx);

        let events_topic = self.events_topic.clone();
        let retry_backoff_secs = self.retry_backoff_secs;
        let task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == events_topic => {
                        match serde_json::from_slice::<RawEdgePayload>(&publish.payload) {
                            Ok(raw) => {
                                let event = raw.into_event(now_epoch());
                                let accepted = (on_event)(event);
                                if !accepted {
                                    tracing::debug!("mqtt-ingested event rejected by store");
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "failed to decode mqtt edge event payload");
                            }
                        }
                    }
                    // QoS1 completes on PUBACK; QoS2 only completes once the
                    // PUBREC/PUBREL handshake lands on PUBCOMP.
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        let _ = ack_tx.send(ack.pkid);
                    }
                    Ok(Event::Incoming(Packet::PubComp(comp))) => {
                        let _ = ack_tx.send(comp.pkid);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt event loop error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(retry_backoff_secs.max(1))).await;
                    }
                }
            }
        });
        *self.eventloop_task.lock().expect("eventloop task lock poisoned") = Some(task);
        *self.client.lock().expect("client lock poisoned") = Some(client);
        Ok(())
    }

    async fn publish_phase(&self, phase: &Phase, timestamp: f64) -> bool {
        let client = self.client.lock().expect("client lock poisoned").clone();
        let Some(client) = client else {
            warn!("publish_phase called before start_event_ingestion");
            return false;
        };

        let payload = serde_json::json!({
            "phase": phase.as_str(),
            "timestamp": timestamp,
            "service": "sitelinkd",
        });
        let qos = qos_from(self.qos);

        // Hold the publish lock across the publish-and-wait-for-ack so a
        // concurrent call's packet id can never be mistaken for this one's.
        let _publish_guard = self.publish_lock.lock().await;

        if let Err(e) = client
            .publish(&self.phase_topic, qos, self.retain, payload.to_string().into_bytes())
            .await
        {
            warn!(error = %e, "mqtt phase publish failed");
            return false;
        }

        // QoS0 has no broker acknowledgment to wait for (spec §4.2 only
        // requires waiting for "QoS>=1 MQTT: broker acknowledged").
        if qos == QoS::AtMostOnce {
            return true;
        }

        let mut guard = self.ack_rx.lock().await;
        let Some(rx) = guard.as_mut() else {
            warn!("publish_phase called before start_event_ingestion");
            return false;
        };
        // Drop any ack left over from a call that already timed out, so it
        // isn't mistaken for this publish's ack.
        while rx.try_recv().is_ok() {}

        match tokio::time::timeout(PUBLISH_ACK_TIMEOUT, rx.recv()).await {
            Ok(Some(_pkid)) => true,
            Ok(None) => {
                warn!("mqtt event loop closed while waiting for phase publish ack");
                false
            }
            Err(_) => {
                warn!(timeout = ?PUBLISH_ACK_TIMEOUT, "timed out waiting for broker ack of phase publish");
                false
            }
        }
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(client) = self.client.lock().expect("client lock poisoned").take() {
            let _ = client.disconnect().await;
        }
        if let Some(task) = self
            .eventloop_task
            .lock()
            .expect("eventloop task lock poisoned")
            .take()
        {
            task.abort();
        }
        info!("mqtt edge comm adapter stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_from_maps_recommended_default_to_at_least_once() {
        assert_eq!(qos_from(0), QoS::AtMostOnce);
        assert_eq!(qos_from(1), QoS::AtLeastOnce);
        assert_eq!(qos_from(2), QoS::ExactlyOnce);
        // unrecognized values fall back to the spec's recommended QoS 1
        assert_eq!(qos_from(9), QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn publish_phase_before_start_returns_false() {
        let adapter = MqttEdgeCommAdapter::new(
            "127.0.0.1",
            1883,
            "sitelinkd-test",
            1,
            true,
            30,
            5,
            "integration/phase",
            "edge/events",
        );
        let ok = adapter.publish_phase(&Phase::new("working"), 1.0).await;
        assert!(!ok);
    }
}
