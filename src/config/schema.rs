//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the SMTP server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Protocol limits and advertised capabilities.
    pub smtp: SmtpConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-IP admission control.
    pub rate_limit: RateLimitConfig,

    /// How completed messages reach the sink.
    pub delivery: DeliveryConfig,

    /// Storage backend selection.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:25").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:2525".to_string(),
        }
    }
}

/// Protocol-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Domain advertised in the greeting and EHLO response.
    pub domain: String,

    /// Maximum accepted message size in bytes.
    pub max_message_size: usize,

    /// Maximum recipients per transaction.
    pub max_recipients: usize,

    /// Advertise CHUNKING and accept BDAT.
    pub enable_chunking: bool,

    /// Maximum length of a command line in bytes.
    pub max_command_line: usize,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            max_message_size: 10 * 1024 * 1024, // 10MB
            max_recipients: 50,
            enable_chunking: true,
            max_command_line: 4096,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each read or write on a client connection, in seconds.
    pub command_secs: u64,

    /// Deadline for one call into the message sink, in seconds.
    pub store_secs: u64,

    /// Upper bound on graceful shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 30,
            store_secs: 10,
            shutdown_secs: 30,
        }
    }
}

/// Connection admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum concurrent connections from one IP.
    pub max_connections_per_ip: usize,

    /// Interval between sweeps of idle admission records, in seconds.
    pub cleanup_interval_secs: u64,

    /// Idle time after which a zero-count record is dropped, in seconds.
    pub stale_after_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_per_ip: 10,
            cleanup_interval_secs: 60,
            stale_after_secs: 300,
        }
    }
}

/// Message hand-off strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Store synchronously before replying; failures reach the client as 554.
    #[default]
    Direct,
    /// Enqueue and reply immediately; workers store in the background.
    Queued,
}

/// Delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,

    /// Bound on messages waiting for a worker.
    pub queue_capacity: usize,

    /// Number of background store workers.
    pub workers: usize,

    /// Store attempts per queued message.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Direct,
            queue_capacity: 1000,
            workers: 4,
            max_attempts: 1,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Spool file for the file backend.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "mail-spool.jsonl".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
