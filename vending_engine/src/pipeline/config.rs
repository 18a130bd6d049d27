use std::time::Duration;

pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(120);
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_IDEMPOTENCY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MIN_TEMPERATURE: f64 = -10.0;
pub const DEFAULT_MAX_TEMPERATURE: f64 = 30.0;

/// Tunables for a [`VendingPipeline`](crate::VendingPipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Prefix for every topic the pipeline reads or writes, without a trailing slash. May be empty.
    pub topic_root: String,
    /// A device whose last heartbeat is at least this old is not live.
    pub liveness_window: Duration,
    /// Maximum number of entries retained per log category. The oldest entries are dropped first.
    pub log_capacity: usize,
    /// Deadline for the collaborator calls made while resolving a single intent. If it passes, the store is given the
    /// same time again to confirm whether the order was settled anyway.
    pub settlement_timeout: Duration,
    /// How long resolved tokens are kept in the idempotency map.
    pub idempotency_retention: Duration,
    pub min_temperature: f64,
    pub max_temperature: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic_root: String::default(),
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            log_capacity: DEFAULT_LOG_CAPACITY,
            settlement_timeout: DEFAULT_SETTLEMENT_TIMEOUT,
            idempotency_retention: DEFAULT_IDEMPOTENCY_RETENTION,
            min_temperature: DEFAULT_MIN_TEMPERATURE,
            max_temperature: DEFAULT_MAX_TEMPERATURE,
        }
    }
}
