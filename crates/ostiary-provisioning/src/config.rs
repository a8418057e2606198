//! Runtime configuration for the provisioning engine.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Which event processor implementation drives deliveries.
///
/// Only `scheduled` is constructible in this build; broker-driven
/// processors parse but fail at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// Poll the delivery store on a fixed interval.
    Scheduled,
    /// Consume lifecycle events from a Kafka topic.
    Kafka,
    /// Consume lifecycle events from an AMQP queue.
    Amqp,
}

impl ProcessorKind {
    /// Stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Scheduled => "scheduled",
            ProcessorKind::Kafka => "kafka",
            ProcessorKind::Amqp => "amqp",
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(ProcessorKind::Scheduled),
            "kafka" => Ok(ProcessorKind::Kafka),
            "amqp" => Ok(ProcessorKind::Amqp),
            _ => Err(ConfigError::Invalid {
                var: "SCIM_PROCESSOR".to_string(),
                reason: format!("Unknown processor: {s}"),
            }),
        }
    }
}

/// Provisioning engine configuration.
#[derive(Debug, Clone)]
pub struct ScimConfig {
    /// Master switch. When false, no processor is started.
    pub enabled: bool,

    /// How often the scheduled processor polls for due deliveries.
    pub poll_interval: Duration,

    /// Lifetime of minted bearer tokens.
    pub token_lifetime: Duration,

    /// Which processor implementation to run.
    pub processor: ProcessorKind,

    /// Connect and total timeout for outbound SCIM requests.
    pub http_timeout: Duration,

    /// Maximum deliveries claimed per poll tick.
    pub batch_size: i64,

    /// Maximum deliveries executing concurrently within one tick.
    pub max_concurrency: usize,

    /// How long shutdown waits for in-flight workers before abandoning
    /// them to reclaim.
    pub drain_timeout: Duration,

    /// Age after which an in-progress claim is considered stale and
    /// released back to pending.
    pub stale_after: Duration,
}

impl Default for ScimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(5),
            token_lifetime: Duration::from_secs(3600),
            processor: ProcessorKind::Scheduled,
            http_timeout: Duration::from_secs(30),
            batch_size: 50,
            max_concurrency: 16,
            drain_timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
        }
    }
}

impl ScimConfig {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional; defaults apply where unset:
    /// - `SCIM_ENABLED` (default `true`)
    /// - `SCIM_POLL_INTERVAL_SECS` (default 5)
    /// - `SCIM_TOKEN_LIFETIME_SECS` (default 3600)
    /// - `SCIM_PROCESSOR`: `scheduled`, `kafka`, `amqp` (default `scheduled`)
    /// - `SCIM_HTTP_TIMEOUT_SECS` (default 30)
    /// - `SCIM_BATCH_SIZE` (default 50)
    /// - `SCIM_MAX_CONCURRENCY` (default 16)
    /// - `SCIM_DRAIN_TIMEOUT_SECS` (default 30)
    /// - `SCIM_STALE_AFTER_SECS` (default 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            enabled: read_bool("SCIM_ENABLED", defaults.enabled)?,
            poll_interval: read_secs("SCIM_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            token_lifetime: read_secs("SCIM_TOKEN_LIFETIME_SECS", defaults.token_lifetime)?,
            processor: match env::var("SCIM_PROCESSOR") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.processor,
            },
            http_timeout: read_secs("SCIM_HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            batch_size: read_int("SCIM_BATCH_SIZE", defaults.batch_size)?,
            max_concurrency: read_int("SCIM_MAX_CONCURRENCY", defaults.max_concurrency as i64)?
                .max(1) as usize,
            drain_timeout: read_secs("SCIM_DRAIN_TIMEOUT_SECS", defaults.drain_timeout)?,
            stale_after: read_secs("SCIM_STALE_AFTER_SECS", defaults.stale_after)?,
        })
    }
}

fn read_bool(var: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("Expected boolean, got: {other}"),
            }),
        },
        Err(_) => Ok(default),
    }
}

fn read_secs(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(var) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn read_int(var: &str, default: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(v) => v.parse::<i64>().map_err(|e| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
