use registry_core::TargetsByRegion;

use crate::telemetry::LogFormat;

/// Registry-level configuration.
///
/// Controls transaction and operation deadlines, concurrency limits, paging,
/// job dispatch, regional targets, and log output.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Identifier of this registry node, attached to log output.
    pub node_id: String,
    /// Deadline for one manager transaction in milliseconds. Exceeding it
    /// aborts the transaction with a retryable error.
    pub transaction_timeout_ms: u64,
    /// Default timeout for operations in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Maximum number of concurrent operations before load shedding.
    pub max_concurrent_operations: u32,
    /// Page size used when a listing does not ask for one.
    pub default_page_size: usize,
    /// Upper bound on any requested page size.
    pub max_page_size: usize,
    /// Interval between pending-job sweeps in milliseconds.
    pub dispatch_interval_ms: u64,
    /// Regional execution targets for job tasks.
    pub targets: TargetsByRegion,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            transaction_timeout_ms: 5_000,
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            default_page_size: 50,
            max_page_size: 500,
            dispatch_interval_ms: 1_000,
            targets: TargetsByRegion::new(),
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
