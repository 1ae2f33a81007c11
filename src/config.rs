//! Runtime configuration read from the environment.

use std::str::FromStr;

use tracing::warn;

/// Default number of reconciles in flight per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 1;

/// Default port for the health and metrics server
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default number of consecutive failures before a key is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Operator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Reconciles in flight per controller (`MAX_CONCURRENT_RECONCILES`)
    pub max_concurrent_reconciles: u16,
    /// Health/metrics listen port (`HEALTH_PORT`)
    pub health_port: u16,
    /// Retry budget per object (`MAX_RETRIES`)
    pub max_retries: u32,
    /// Namespace for namespaced Roles; all namespaces when unset (`WATCH_NAMESPACE`)
    pub watch_namespace: Option<String>,
    /// Pod name used as event reporter instance (`POD_NAME`)
    pub pod_name: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            health_port: DEFAULT_HEALTH_PORT,
            max_retries: DEFAULT_MAX_RETRIES,
            watch_namespace: None,
            pod_name: None,
        }
    }
}

impl OperatorConfig {
    /// Load settings from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, falling back to defaults for unset
    /// or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            max_concurrent_reconciles: parse_or(
                "MAX_CONCURRENT_RECONCILES",
                non_empty("MAX_CONCURRENT_RECONCILES"),
                defaults.max_concurrent_reconciles,
            )
            .max(1),
            health_port: parse_or(
                "HEALTH_PORT",
                non_empty("HEALTH_PORT"),
                defaults.health_port,
            ),
            max_retries: parse_or("MAX_RETRIES", non_empty("MAX_RETRIES"), defaults.max_retries),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            pod_name: non_empty("POD_NAME"),
        }
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
    }
}
