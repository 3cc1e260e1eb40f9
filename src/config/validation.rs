//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. All failures are collected, not just the first.

use std::net::SocketAddr;

use crate::config::schema::{DeliveryMode, ServerConfig, StorageBackend};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("delivery.retry_base_delay_ms ({base}) exceeds delivery.retry_max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.smtp.domain.trim().is_empty() {
        errors.push(ValidationError::Empty("smtp.domain"));
    }

    let nonzero = [
        ("smtp.max_message_size", config.smtp.max_message_size as u64),
        ("smtp.max_recipients", config.smtp.max_recipients as u64),
        ("smtp.max_command_line", config.smtp.max_command_line as u64),
        ("timeouts.command_secs", config.timeouts.command_secs),
        ("timeouts.store_secs", config.timeouts.store_secs),
        ("timeouts.shutdown_secs", config.timeouts.shutdown_secs),
        ("rate_limit.max_connections_per_ip", config.rate_limit.max_connections_per_ip as u64),
        ("rate_limit.cleanup_interval_secs", config.rate_limit.cleanup_interval_secs),
        ("delivery.max_attempts", config.delivery.max_attempts as u64),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.delivery.mode == DeliveryMode::Queued {
        if config.delivery.queue_capacity == 0 {
            errors.push(ValidationError::Zero("delivery.queue_capacity"));
        }
        if config.delivery.workers == 0 {
            errors.push(ValidationError::Zero("delivery.workers"));
        }
    }

    if config.delivery.retry_base_delay_ms > config.delivery.retry_max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: config.delivery.retry_base_delay_ms,
            max: config.delivery.retry_max_delay_ms,
        });
    }

    if config.storage.backend == StorageBackend::File && config.storage.path.trim().is_empty() {
        errors.push(ValidationError::Empty("storage.path"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
