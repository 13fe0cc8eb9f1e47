//! `WorkflowRunner`: startup sequence, the `PhaseTask` tick, and the
//! `LoopTask` sleep/cancellation loop (spec §4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use sitelink_comm_adapter::{EdgeCommAdapter, EventCallback, HttpEdgeCommAdapter, MqttEdgeCommAdapter};
use sitelink_core::{Config, Phase};
use sitelink_edge_store::EdgeEventStore;
use sitelink_phase_engine::PhaseEngine;
use sitelink_pipeline::{DispatchEvent, PipelineRegistry, PipelineSelector, Resources, TaskContext};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::error::WorkflowError;

fn epoch_secs(now: DateTime<Utc>) -> f64 {
    now.timestamp() as f64 + now.timestamp_subsec_millis() as f64 / 1000.0
}

fn system_now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

/// Builds the comm adapter for one backend name (spec §6 `EDGE_EVENT_BACKEND`
/// / `PHASE_PUBLISH_BACKEND` ∈ {http, mqtt}).
fn build_adapter(backend: &str, config: &Config) -> Arc<dyn EdgeCommAdapter> {
    match backend {
        "mqtt" => Arc::new(MqttEdgeCommAdapter::new(
            config.mqtt.host.clone(),
            config.mqtt.port,
            config.mqtt.client_id.clone(),
            config.mqtt.qos,
            config.mqtt.retain,
            config.mqtt.heartbeat_secs,
            config.retry_backoff_secs,
            config.mqtt.phase_topic.clone(),
            config.mqtt.events_topic.clone(),
        )),
        _ => Arc::new(HttpEdgeCommAdapter::new(config.http.host.clone(), config.http.port, None)),
    }
}

pub struct WorkflowRunner {
    config: Config,
    store: Arc<EdgeEventStore>,
    ingestion_adapter: Arc<dyn EdgeCommAdapter>,
    publish_adapter: Arc<dyn EdgeCommAdapter>,
    phase_engine: Box<dyn PhaseEngine>,
    selector: Arc<dyn PipelineSelector>,
    registry: PipelineRegistry,
    context: TaskContext,
    previous_phase: Mutex<Option<Phase>>,
    last_publish_at: Mutex<Option<f64>>,
    shutdown_notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl WorkflowRunner {
    pub fn new(
        config: Config,
        store: Arc<EdgeEventStore>,
        phase_engine: Box<dyn PhaseEngine>,
        selector: Arc<dyn PipelineSelector>,
        registry: PipelineRegistry,
        resources: Resources,
    ) -> Self {
        let ingestion_adapter = resources.edge_comm_adapter.clone();
        let publish_backend = config.phase_publish_backend().to_string();
        let publish_adapter = if publish_backend == config.edge_event.backend {
            ingestion_adapter.clone()
        } else {
            build_adapter(&publish_backend, &config)
        };
        let context = TaskContext::new(resources);
        Self {
            config,
            store,
            ingestion_adapter,
            publish_adapter,
            phase_engine,
            selector,
            registry,
            context,
            previous_phase: Mutex::new(None),
            last_publish_at: Mutex::new(None),
            shutdown_notify: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Constructs the default ingestion adapter for `config.edge_event.backend`,
    /// used by `sitelink-cli` to seed `Resources::edge_comm_adapter` before
    /// calling [`WorkflowRunner::new`].
    pub fn default_adapter(config: &Config) -> Arc<dyn EdgeCommAdapter> {
        build_adapter(&config.edge_event.backend, config)
    }

    /// Step 2 of the startup sequence (spec §4.6): wires the store's
    /// `add_event` as the ingestion callback and starts the transport.
    pub async fn start(&self) -> Result<(), WorkflowError> {
        let store = self.store.clone();
        let max_age = self.config.edge_event.max_age_secs;
        let callback: EventCallback = Arc::new(move |event| {
            let now = system_now_epoch();
            store.add_event(event, now, max_age)
        });
        self.ingestion_adapter.start_event_ingestion(callback).await?;
        Ok(())
    }

    /// One `PhaseTask` tick (spec §4.6 "Per-tick logic"): decide phase,
    /// heartbeat-publish, emit a phase-change dispatch event, select and run
    /// a pipeline, and compute the next sleep.
    async fn phase_task_tick(&self, now: DateTime<Utc>) -> f64 {
        let phase = self.phase_engine.current_phase(now, &self.store);
        let now_epoch = epoch_secs(now);

        let mut previous = self.previous_phase.lock().expect("previous phase lock poisoned");
        let changed = previous.as_ref() != Some(&phase);

        let mut last_publish = self.last_publish_at.lock().expect("last publish lock poisoned");
        let heartbeat_due = last_publish
            .map(|at| now_epoch - at >= self.config.mqtt.heartbeat_secs as f64)
            .unwrap_or(true);
        if changed || heartbeat_due {
            // Continued attempts at the heartbeat cadence regardless of the
            // previous call's outcome (spec §9 Open Question).
            let _ = self.publish_adapter.publish_phase(&phase, now_epoch).await;
            *last_publish = Some(now_epoch);
        }
        drop(last_publish);

        if changed {
            info!(from = ?previous.as_ref().map(Phase::as_str), to = %phase, "phase changed");
            self.context.enqueue_event(DispatchEvent {
                handlers: ["monitor".to_string()].into_iter().collect(),
                data: serde_json::json!({
                    "from": previous.as_ref().map(Phase::as_str),
                    "to": phase.as_str(),
                    "at": now_epoch,
                }),
                origin: "phase_engine".to_string(),
                created_at: now,
            });
        }
        *previous = Some(phase.clone());
        drop(previous);

        let (name, meta) = self.selector.select(&phase, &self.context);

        let (pipeline, default_sleep) = match self.registry.get(&name) {
            Ok(v) => v,
            Err(e) => {
                error!(pipeline = %name, error = %e, "selector returned unknown pipeline, skipping this tick");
                return self.config.loop_interval_secs as f64;
            }
        };

        let result = pipeline.run(&self.context).await;
        result
            .sleep_override()
            .or(meta.sleep)
            .or(default_sleep)
            .unwrap_or(self.config.loop_interval_secs as f64)
    }

    /// The `LoopTask`: runs `phase_task_tick` forever, sleeping the returned
    /// interval between ticks. Cancellation interrupts the sleep promptly
    /// and triggers shutdown (spec §5 Cancellation).
    pub async fn run(&self) -> Result<(), WorkflowError> {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            let now = Utc::now();
            let next_sleep = self.phase_task_tick(now).await;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(next_sleep.max(0.0))) => {}
                _ = self.shutdown_notify.notified() => break,
            }
        }
        self.do_shutdown().await;
        Ok(())
    }

    /// Aborts the sleep promptly and marks the runner for shutdown on its
    /// next loop check (spec §5 Cancellation: SIGINT/SIGTERM).
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    /// Stops accepting new events, then releases adapter resources in
    /// reverse acquisition order. The in-flight pipeline tick (if any) has
    /// already completed by the time this runs, so `event_queue` is already
    /// drained (spec §4.6 Shutdown). Each `stop()` gets a bounded grace
    /// period (spec §5: "In-flight transport I/O gets a bounded grace
    /// period... before forced resource release") — past it, shutdown moves
    /// on rather than block the process exit indefinitely.
    async fn do_shutdown(&self) {
        let grace = Duration::from_secs_f64(self.config.shutdown_grace_secs as f64);

        match tokio::time::timeout(grace, self.ingestion_adapter.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "ingestion adapter stop failed"),
            Err(_) => error!(
                grace_secs = self.config.shutdown_grace_secs,
                "ingestion adapter did not stop within grace period, forcing shutdown"
            ),
        }

        if !Arc::ptr_eq(&self.ingestion_adapter, &self.publish_adapter) {
            match tokio::time::timeout(grace, self.publish_adapter.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "publish adapter stop failed"),
                Err(_) => error!(
                    grace_secs = self.config.shutdown_grace_secs,
                    "publish adapter did not stop within grace period, forcing shutdown"
                ),
            }
        }

        info!(
            event_queue_len = self.context.event_queue_len(),
            "workflow runner shutdown complete"
        );
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }
}
