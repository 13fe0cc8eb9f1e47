//! Environment-variable configuration, resolved once at startup.

use std::env;
use std::path::PathBuf;

/// Load `.env` file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(default)
}

/// Edge ingestion/stale-handling knobs (spec §6).
#[derive(Debug, Clone)]
pub struct EdgeEventConfig {
    pub max_age_secs: f64,
    pub stale_secs: f64,
    pub stale_mode: StaleMode,
    pub unknown_phase: String,
    pub backend: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleMode {
    Freeze,
    Unknown,
}

impl EdgeEventConfig {
    fn from_env() -> Self {
        let stale_mode = match env_or("EDGE_EVENT_STALE_MODE", "freeze").as_str() {
            "unknown" => StaleMode::Unknown,
            _ => StaleMode::Freeze,
        };
        Self {
            max_age_secs: env_f64("EDGE_EVENT_MAX_AGE", 300.0),
            stale_secs: env_f64("EDGE_EVENT_STALE_SECONDS", 0.0),
            stale_mode,
            unknown_phase: env_or("EDGE_EVENT_UNKNOWN_PHASE", "unknown"),
            backend: env_or("EDGE_EVENT_BACKEND", "http"),
        }
    }
}

/// MQTT transport knobs (spec §6).
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub qos: u8,
    pub retain: bool,
    pub heartbeat_secs: u64,
    pub client_id: String,
    pub phase_topic: String,
    pub events_topic: String,
}

impl MqttConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("MQTT_HOST", "localhost"),
            port: env_u64("MQTT_PORT", 1883) as u16,
            qos: env_u64("MQTT_QOS", 1) as u8,
            retain: env_bool("MQTT_RETAIN", true),
            heartbeat_secs: env_u64("MQTT_HEARTBEAT_SECONDS", 60),
            client_id: env_or("MQTT_CLIENT_ID", "sitelinkd"),
            phase_topic: env_or("PHASE_MQTT_TOPIC", "integration/phase"),
            events_topic: env_or("EDGE_EVENTS_MQTT_TOPIC", "edge/events"),
        }
    }
}

/// Time-window scheduler knobs. Not named as literal env vars in spec §6
/// (which leaves `TimeBasedSchedulerEngine`'s window configuration
/// unspecified); `WORKING_HOURS_TZ`/`WORKING_HOURS_WINDOWS` are this crate's
/// choice of source, recorded as an Open Question resolution in DESIGN.md.
/// Windows are kept as raw `"HH:MM-HH:MM"` strings here and parsed into
/// `sitelink_phase_engine::TimeWindow` by the plugin resolver, since this
/// crate sits below `phase-engine` in the dependency order.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tz_name: String,
    pub windows: Vec<String>,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        let windows = env_opt("WORKING_HOURS_WINDOWS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            tz_name: env_or("WORKING_HOURS_TZ", "UTC"),
            windows,
        }
    }
}

/// HTTP transport knobs (spec §6).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl HttpConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("EDGE_HTTP_HOST", "0.0.0.0"),
            port: env_u64("EDGE_HTTP_PORT", 8080) as u16,
        }
    }
}

/// Plugin class-path-equivalent knobs (spec §6, §9): names resolved against
/// the compile-time `PluginRegistry` in `sitelink-workflow`.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    pub phase_engine: Option<String>,
    pub scheduler_engine: Option<String>,
    pub ingestion_engine: Option<String>,
    pub tracking_engine: Option<String>,
    pub format_strategy: Option<String>,
    pub rules_engine: Option<String>,
    pub event_dispatch_engine: Option<String>,
    pub pipeline_selector: Option<String>,
}

impl PluginConfig {
    fn from_env() -> Self {
        Self {
            phase_engine: env_opt("PHASE_ENGINE_CLASS"),
            scheduler_engine: env_opt("SCHEDULER_ENGINE_CLASS"),
            ingestion_engine: env_opt("INGESTION_ENGINE_CLASS"),
            tracking_engine: env_opt("TRACKING_ENGINE_CLASS"),
            format_strategy: env_opt("FORMAT_STRATEGY_CLASS"),
            rules_engine: env_opt("RULES_ENGINE_CLASS"),
            event_dispatch_engine: env_opt("EVENT_DISPATCH_ENGINE_CLASS"),
            pipeline_selector: env_opt("PIPELINE_SELECTOR_CLASS"),
        }
    }
}

/// Top-level daemon configuration, resolved once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub loop_interval_secs: u64,
    pub phase_stable_secs: u64,
    pub config_root: PathBuf,
    pub pipeline_schedule_path: PathBuf,
    pub format_task_enabled: bool,
    pub retry_backoff_secs: u64,
    pub shutdown_grace_secs: u64,
    pub handler_timeout_secs: u64,
    pub edge_event: EdgeEventConfig,
    pub scheduler: SchedulerConfig,
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
    pub phase_publish_backend: Option<String>,
    pub plugins: PluginConfig,
}

impl Config {
    /// Build config from environment variables. Call [`load_dotenv`] first.
    pub fn from_env() -> Self {
        let config_root = PathBuf::from(env_or("CONFIG_ROOT", "."));
        let schedule_path = env_or("PIPELINE_SCHEDULE_PATH", "pipeline_schedule.json");
        Self {
            loop_interval_secs: env_u64("LOOP_INTERVAL_SECONDS", 5),
            phase_stable_secs: env_u64("PHASE_STABLE_SECONDS", 180),
            pipeline_schedule_path: config_root.join(schedule_path),
            config_root,
            format_task_enabled: env_bool("FORMAT_TASK_ENABLED", true),
            retry_backoff_secs: env_u64("RETRY_BACKOFF_SECONDS", 5),
            shutdown_grace_secs: env_u64("SHUTDOWN_GRACE_SECONDS", 5),
            handler_timeout_secs: env_u64("HANDLER_TIMEOUT_SECONDS", 5),
            edge_event: EdgeEventConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            mqtt: MqttConfig::from_env(),
            http: HttpConfig::from_env(),
            phase_publish_backend: env_opt("PHASE_PUBLISH_BACKEND"),
            plugins: PluginConfig::from_env(),
        }
    }

    /// Backend used for phase publish: explicit override, else the
    /// ingestion backend (spec §4.2 "Phase publish default").
    pub fn phase_publish_backend(&self) -> &str {
        self.phase_publish_backend
            .as_deref()
            .unwrap_or(&self.edge_event.backend)
    }

    /// Log a redacted summary at startup.
    pub fn log_summary(&self) {
        tracing::info!(
            backend = %self.edge_event.backend,
            phase_publish_backend = %self.phase_publish_backend(),
            loop_interval_secs = self.loop_interval_secs,
            phase_stable_secs = self.phase_stable_secs,
            schedule_path = %self.pipeline_schedule_path.display(),
            "config loaded"
        );
    }

    /// Redacted view safe for the adapter's `/healthz` surface.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "backend": self.edge_event.backend,
            "phase_publish_backend": self.phase_publish_backend(),
            "loop_interval_secs": self.loop_interval_secs,
            "phase_stable_secs": self.phase_stable_secs,
            "edge_event_max_age": self.edge_event.max_age_secs,
            "edge_event_stale_seconds": self.edge_event.stale_secs,
        })
    }
}
