//! Configuration constants and environment variables for Corral
//!
//! This module centralizes all configurable constants, making them
//! easy to override via environment variables for different deployments.

use std::env;

/// Parse an environment variable as a typed value with a default fallback
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Health aggregation configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Weight of the online-node fraction in the health score
    pub online_weight: f64,
    /// Weight of the healthy-online fraction in the health score
    pub healthy_weight: f64,
    /// Score penalty when no online node holds the primary role
    pub missing_primary_penalty: f64,
    /// Score penalty when no online node holds the coordinator role
    pub missing_coordinator_penalty: f64,
    /// Score below which an active cluster is marked degraded
    pub degraded_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            online_weight: env_var_or_default("CORRAL_HEALTH_ONLINE_WEIGHT", 0.6),
            healthy_weight: env_var_or_default("CORRAL_HEALTH_HEALTHY_WEIGHT", 0.4),
            missing_primary_penalty: env_var_or_default("CORRAL_MISSING_PRIMARY_PENALTY", 0.1),
            missing_coordinator_penalty: env_var_or_default(
                "CORRAL_MISSING_COORDINATOR_PENALTY",
                0.1,
            ),
            degraded_threshold: env_var_or_default("CORRAL_DEGRADED_THRESHOLD", 0.7),
        }
    }
}

/// Node registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Length of generated node auth tokens
    pub token_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            token_length: env_var_or_default("CORRAL_TOKEN_LENGTH", 40),
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Default page size for event queries
    pub default_page_limit: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            default_page_limit: env_var_or_default("CORRAL_EVENT_PAGE_LIMIT", 100),
        }
    }
}
