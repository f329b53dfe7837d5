use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Telemetry listener configuration
    /// Bind address for the device-facing TCP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Idle timeout before a silent session is closed, in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum accepted wire frame length in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    // Ingestion queue configuration
    /// Absolute record capacity of the shared queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Occupancy below which all records are admitted
    #[serde(default = "default_queue_low_watermark")]
    pub queue_low_watermark: usize,

    /// Occupancy at which only critical records are admitted
    #[serde(default = "default_queue_high_watermark")]
    pub queue_high_watermark: usize,

    /// Bounded wait for critical records above the high watermark, in ms
    #[serde(default = "default_critical_admission_timeout_ms")]
    pub critical_admission_timeout_ms: u64,

    // Batch writer configuration
    /// Number of writer tasks draining the queue
    #[serde(default = "default_writer_count")]
    pub writer_count: usize,

    /// Records per table batch before an early flush
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,

    /// Max linger before a partial batch is flushed, in ms
    #[serde(default = "default_batch_linger_ms")]
    pub batch_linger_ms: u64,

    /// Quota usage reset period, in seconds (daily by default)
    #[serde(default = "default_quota_reset_interval_secs")]
    pub quota_reset_interval_secs: u64,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Timeout for graceful shutdown cleanup, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5200".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_max_frame_len() -> usize {
    4096
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_queue_low_watermark() -> usize {
    6_000
}

fn default_queue_high_watermark() -> usize {
    9_000
}

fn default_critical_admission_timeout_ms() -> u64 {
    100
}

fn default_writer_count() -> usize {
    2
}

fn default_batch_max_size() -> usize {
    500
}

fn default_batch_linger_ms() -> u64 {
    500
}

fn default_quota_reset_interval_secs() -> u64 {
    86_400
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "fleetgate".to_string()
}

fn default_postgres_username() -> String {
    "fleetgate".to_string()
}

fn default_postgres_password() -> String {
    "fleetgate".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FLEETGATE"))
            .build()?
            .try_deserialize()
    }
}
