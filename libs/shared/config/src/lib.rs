use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub default_avg_consultation_minutes: u32,
    pub rebalance_interval_seconds: u64,
    pub finished_retention_minutes: i64,
    pub event_channel_capacity: usize,
    pub triage_timeout_ms: u64,
    pub rebalance_on_insert: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            server_port: env_or("QUEUE_SERVER_PORT", 3000),
            default_avg_consultation_minutes: env_or("QUEUE_DEFAULT_AVG_CONSULTATION_MINUTES", 15),
            rebalance_interval_seconds: env_or("QUEUE_REBALANCE_INTERVAL_SECONDS", 60),
            finished_retention_minutes: env_or("QUEUE_FINISHED_RETENTION_MINUTES", 720),
            event_channel_capacity: env_or("QUEUE_EVENT_CHANNEL_CAPACITY", 1000),
            triage_timeout_ms: env_or("QUEUE_TRIAGE_TIMEOUT_MS", 2000),
            rebalance_on_insert: env_or("QUEUE_REBALANCE_ON_INSERT", true),
        };

        if !config.is_configured() {
            warn!("Queue settings contain zero values - falling back to defaults where needed");
        }

        config
    }

    /// All durations and capacities must be non-zero for the engine to behave sensibly.
    pub fn is_configured(&self) -> bool {
        self.default_avg_consultation_minutes > 0
            && self.rebalance_interval_seconds > 0
            && self.event_channel_capacity > 0
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            default_avg_consultation_minutes: 15,
            rebalance_interval_seconds: 60,
            finished_retention_minutes: 720,
            event_channel_capacity: 1000,
            triage_timeout_ms: 2000,
            rebalance_on_insert: true,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("{} has invalid value '{}' ({}), using default {}", key, raw, e, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}
