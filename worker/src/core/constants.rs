// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Cardinality";

/// Service name reported with exported gauges
pub const SERVICE_NAME: &str = "cardinality";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".cardinality";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "cardinality.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CARDINALITY_CONFIG";

// =============================================================================
// Environment Variables - Logging
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CARDINALITY_LOG";

/// Environment variable for the log output format (text or json)
pub const ENV_LOG_FORMAT: &str = "CARDINALITY_LOG_FORMAT";

/// Filter used when neither `CARDINALITY_LOG` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "info,cardinality_worker=info";

// =============================================================================
// Environment Variables - Metrics Backend
// =============================================================================

/// Environment variable for the managed Prometheus workspace id
pub const ENV_WORKSPACE_ID: &str = "AMP_WORKSPACE_ID";

/// Environment variable for the AWS region
pub const ENV_REGION: &str = "AWS_REGION";

/// Environment variable overriding the backend endpoint
pub const ENV_PROMETHEUS_URL: &str = "CARDINALITY_PROMETHEUS_URL";

/// Environment variable selecting request signing (sigv4 or none)
pub const ENV_PROMETHEUS_SIGNING: &str = "CARDINALITY_PROMETHEUS_SIGNING";

// =============================================================================
// Metrics Backend Defaults
// =============================================================================

/// Timeout of the name listing call
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 5;

/// Timeout of one cardinality query
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// How far in the past cardinality queries are evaluated, so late samples
/// are included
pub const DEFAULT_QUERY_OFFSET_SECS: u64 = 20;

/// Upper bound for any backend timeout
pub const MAX_BACKEND_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Environment Variables - Queues
// =============================================================================

/// Environment variable selecting the queue backend (sqs or memory)
pub const ENV_QUEUE_BACKEND: &str = "CARDINALITY_QUEUE_BACKEND";

/// Environment variable for the metric name jobs queue
pub const ENV_NAMES_QUEUE_URL: &str = "NAMES_QUEUE_URL";

/// Environment variable for the cardinality results queue
pub const ENV_COUNTS_QUEUE_URL: &str = "COUNTS_QUEUE_URL";

/// Environment variable for the ingestion jobs queue
pub const ENV_INGEST_QUEUE_URL: &str = "INGEST_QUEUE_URL";

// =============================================================================
// Queue Defaults
// =============================================================================

/// Long poll duration of one receive (SQS maximum)
pub const DEFAULT_QUEUE_WAIT_SECS: u64 = 20;

/// Messages requested per receive
pub const DEFAULT_QUEUE_MAX_MESSAGES: usize = 10;

// =============================================================================
// Environment Variables - Stages
// =============================================================================

/// Environment variable for the top-N size
pub const ENV_TOP_N: &str = "TOPN_CARDINALITY_VALUE";

/// Environment variable for the OTLP/HTTP metrics endpoint
pub const ENV_OTLP_ENDPOINT: &str = "CARDINALITY_OTLP_ENDPOINT";

/// Environment variable for the enumeration interval of `run`
pub const ENV_ENUMERATE_INTERVAL_SECS: &str = "CARDINALITY_ENUMERATE_INTERVAL_SECS";

// =============================================================================
// Stage Defaults
// =============================================================================

/// Top-N size used when the configured value is missing or unusable
pub const DEFAULT_TOP_N: usize = 10;

/// Names per published batch
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Concurrent lookups within one delivery group
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// Upper bound for lookup concurrency
pub const MAX_PROBE_CONCURRENCY: usize = 64;

// =============================================================================
// Shutdown
// =============================================================================

/// Time given to background tasks to finish after a shutdown signal
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
