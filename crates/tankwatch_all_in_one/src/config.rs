use common::postgres::PostgresConfig;
use common::telemetry::{LogFormat, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telemetry_ingester::demo::DemoProducerConfig;
use telemetry_ingester::domain::RetryPolicy;

/// Where sites are read from and frames are committed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local storage seeded with the demo sites
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
#[garde(allow_unvalidated)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Console log encoding (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    #[garde(length(min = 1))]
    pub otel_service_name: String,

    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    #[garde(range(min = 1))]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    #[garde(range(min = 1))]
    pub postgres_max_pool_size: usize,

    /// Directory holding the goose migrations
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Storage retry configuration
    /// Total attempts per storage operation, including the first
    #[serde(default = "default_storage_retry_max_attempts")]
    #[garde(range(min = 1))]
    pub storage_retry_max_attempts: u32,

    #[serde(default = "default_storage_retry_initial_delay_ms")]
    pub storage_retry_initial_delay_ms: u64,

    #[serde(default = "default_storage_retry_max_delay_ms")]
    pub storage_retry_max_delay_ms: u64,

    // Ingestion configuration
    /// Seconds a site lane may sit idle before it is retired
    #[serde(default = "default_lane_idle_timeout_secs")]
    #[garde(range(min = 1))]
    pub lane_idle_timeout_secs: u64,

    #[serde(default = "default_status_interval_secs")]
    #[garde(range(min = 1))]
    pub status_interval_secs: u64,

    // Demo producer configuration
    #[serde(default = "default_demo_enabled")]
    pub demo_enabled: bool,

    /// Comma-separated site management codes
    #[serde(default = "default_demo_site_codes")]
    pub demo_site_codes: String,

    #[serde(default = "default_demo_interval_ms")]
    #[garde(range(min = 1))]
    pub demo_interval_ms: u64,

    /// Every n-th demo round sends a malformed frame; 0 disables
    #[serde(default = "default_demo_malformed_every")]
    pub demo_malformed_every: u64,

    /// Seconds the closers get to finish on shutdown
    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "tankwatch".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "tankwatch".to_string()
}

fn default_postgres_username() -> String {
    "tankwatch".to_string()
}

fn default_postgres_password() -> String {
    "tankwatch".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "/home/tankwatch/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_storage_retry_max_attempts() -> u32 {
    5
}

fn default_storage_retry_initial_delay_ms() -> u64 {
    100
}

fn default_storage_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_lane_idle_timeout_secs() -> u64 {
    300
}

fn default_status_interval_secs() -> u64 {
    60
}

fn default_demo_enabled() -> bool {
    false
}

fn default_demo_site_codes() -> String {
    "DEMO-01".to_string()
}

fn default_demo_interval_ms() -> u64 {
    1_000
}

fn default_demo_malformed_every() -> u64 {
    10
}

fn default_closer_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("TANKWATCH"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn storage_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.storage_retry_max_attempts,
            initial_delay: Duration::from_millis(self.storage_retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.storage_retry_max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn demo_site_codes(&self) -> Vec<String> {
        self.demo_site_codes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Demo producer settings, or `None` when the producer is disabled
    pub fn demo_producer_config(&self) -> Option<DemoProducerConfig> {
        self.demo_enabled.then(|| DemoProducerConfig {
            site_codes: self.demo_site_codes(),
            interval_ms: self.demo_interval_ms,
            malformed_every: self.demo_malformed_every,
        })
    }
}
