use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::queue::MAX_BATCH_SIZE;
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CHUNK_SIZE, DEFAULT_LIST_TIMEOUT_SECS,
    DEFAULT_PROBE_CONCURRENCY, DEFAULT_QUERY_OFFSET_SECS, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_QUEUE_MAX_MESSAGES, DEFAULT_QUEUE_WAIT_SECS, DEFAULT_TOP_N, ENV_COUNTS_QUEUE_URL,
    ENV_INGEST_QUEUE_URL, ENV_NAMES_QUEUE_URL, ENV_PROMETHEUS_URL, ENV_TOP_N, ENV_WORKSPACE_ID,
    MAX_BACKEND_TIMEOUT_SECS, MAX_PROBE_CONCURRENCY,
};

/// SQS caps long polling at 20 seconds
const MAX_QUEUE_WAIT_SECS: u64 = 20;

/// Queries further back than this would miss the series being measured
const MAX_QUERY_OFFSET_SECS: u64 = 3600;

// =============================================================================
// Log Format Enum
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// Signing Mode Enum
// =============================================================================

/// How requests to the metrics backend are authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    /// AWS Signature V4 with the default credential chain
    #[default]
    Sigv4,
    /// Plain requests, for self-hosted Prometheus
    None,
}

impl fmt::Display for SigningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningMode::Sigv4 => write!(f, "sigv4"),
            SigningMode::None => write!(f, "none"),
        }
    }
}

// =============================================================================
// Queue Backend Enum
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendType {
    #[default]
    Sqs,
    Memory,
}

impl fmt::Display for QueueBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackendType::Sqs => write!(f, "sqs"),
            QueueBackendType::Memory => write!(f, "memory"),
        }
    }
}

/// The three queues between stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    /// Enumerator -> Prober
    Names,
    /// Prober -> Reducer
    Counts,
    /// Reducer -> Ingestor
    Ingest,
}

impl QueueRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueRole::Names => "names",
            QueueRole::Counts => "counts",
            QueueRole::Ingest => "ingest",
        }
    }

    fn config_key(&self) -> &'static str {
        match self {
            QueueRole::Names => "queue.names_url",
            QueueRole::Counts => "queue.counts_url",
            QueueRole::Ingest => "queue.ingest_url",
        }
    }

    fn env_var(&self) -> &'static str {
        match self {
            QueueRole::Names => ENV_NAMES_QUEUE_URL,
            QueueRole::Counts => ENV_COUNTS_QUEUE_URL,
            QueueRole::Ingest => ENV_INGEST_QUEUE_URL,
        }
    }
}

// =============================================================================
// File Config Sections
// =============================================================================

/// Metrics backend section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PrometheusFileConfig {
    pub workspace_id: Option<String>,
    pub region: Option<String>,
    pub url: Option<String>,
    pub signing: Option<SigningMode>,
    pub list_timeout_secs: Option<u64>,
    pub query_timeout_secs: Option<u64>,
    pub query_offset_secs: Option<u64>,
}

/// Queue section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueueFileConfig {
    pub backend: Option<QueueBackendType>,
    pub names_url: Option<String>,
    pub counts_url: Option<String>,
    pub ingest_url: Option<String>,
    pub wait_secs: Option<u64>,
    pub max_messages: Option<usize>,
}

/// Reducer section. `top_n` is kept raw so a bad value degrades to the
/// default instead of failing the whole file.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReduceFileConfig {
    pub top_n: Option<serde_json::Value>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProbeFileConfig {
    pub concurrency: Option<usize>,
    pub forward_zero_counts: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EnumerateFileConfig {
    pub chunk_size: Option<usize>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestFileConfig {
    pub enabled: Option<bool>,
    pub otlp_endpoint: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub prometheus: Option<PrometheusFileConfig>,
    pub queue: Option<QueueFileConfig>,
    pub reduce: Option<ReduceFileConfig>,
    pub probe: Option<ProbeFileConfig>,
    pub enumerate: Option<EnumerateFileConfig>,
    pub ingest: Option<IngestFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Replace `current` when the overlay sets a value
fn overlay<T: fmt::Debug>(key: &'static str, current: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        tracing::trace!(key, value = ?other, "Merging config value");
        *current = other;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(prometheus) = other.prometheus {
            let current = self
                .prometheus
                .get_or_insert_with(PrometheusFileConfig::default);
            overlay(
                "prometheus.workspace_id",
                &mut current.workspace_id,
                prometheus.workspace_id,
            );
            overlay("prometheus.region", &mut current.region, prometheus.region);
            overlay("prometheus.url", &mut current.url, prometheus.url);
            overlay("prometheus.signing", &mut current.signing, prometheus.signing);
            overlay(
                "prometheus.list_timeout_secs",
                &mut current.list_timeout_secs,
                prometheus.list_timeout_secs,
            );
            overlay(
                "prometheus.query_timeout_secs",
                &mut current.query_timeout_secs,
                prometheus.query_timeout_secs,
            );
            overlay(
                "prometheus.query_offset_secs",
                &mut current.query_offset_secs,
                prometheus.query_offset_secs,
            );
        }

        if let Some(queue) = other.queue {
            let current = self.queue.get_or_insert_with(QueueFileConfig::default);
            overlay("queue.backend", &mut current.backend, queue.backend);
            overlay("queue.names_url", &mut current.names_url, queue.names_url);
            overlay("queue.counts_url", &mut current.counts_url, queue.counts_url);
            overlay("queue.ingest_url", &mut current.ingest_url, queue.ingest_url);
            overlay("queue.wait_secs", &mut current.wait_secs, queue.wait_secs);
            overlay(
                "queue.max_messages",
                &mut current.max_messages,
                queue.max_messages,
            );
        }

        if let Some(reduce) = other.reduce {
            let current = self.reduce.get_or_insert_with(ReduceFileConfig::default);
            overlay("reduce.top_n", &mut current.top_n, reduce.top_n);
        }

        if let Some(probe) = other.probe {
            let current = self.probe.get_or_insert_with(ProbeFileConfig::default);
            overlay(
                "probe.concurrency",
                &mut current.concurrency,
                probe.concurrency,
            );
            overlay(
                "probe.forward_zero_counts",
                &mut current.forward_zero_counts,
                probe.forward_zero_counts,
            );
        }

        if let Some(enumerate) = other.enumerate {
            let current = self
                .enumerate
                .get_or_insert_with(EnumerateFileConfig::default);
            overlay(
                "enumerate.chunk_size",
                &mut current.chunk_size,
                enumerate.chunk_size,
            );
            overlay(
                "enumerate.interval_secs",
                &mut current.interval_secs,
                enumerate.interval_secs,
            );
        }

        if let Some(ingest) = other.ingest {
            let current = self.ingest.get_or_insert_with(IngestFileConfig::default);
            overlay("ingest.enabled", &mut current.enabled, ingest.enabled);
            overlay(
                "ingest.otlp_endpoint",
                &mut current.otlp_endpoint,
                ingest.otlp_endpoint,
            );
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub workspace_id: Option<String>,
    pub region: Option<String>,
    /// Explicit endpoint, takes precedence over the workspace address
    pub url: Option<String>,
    pub signing: SigningMode,
    pub list_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub query_offset_secs: u64,
}

impl PrometheusConfig {
    /// Base URL of the query API, `None` when neither a url nor a
    /// workspace with its region is configured
    pub fn endpoint(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        match (&self.workspace_id, &self.region) {
            (Some(workspace), Some(region)) => Some(format!(
                "https://aps-workspaces.{region}.amazonaws.com/workspaces/{workspace}"
            )),
            _ => None,
        }
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn query_offset(&self) -> Duration {
        Duration::from_secs(self.query_offset_secs)
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackendType,
    pub names_url: Option<String>,
    pub counts_url: Option<String>,
    pub ingest_url: Option<String>,
    pub wait_secs: u64,
    pub max_messages: usize,
}

impl QueueConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Address of the queue serving `role`.
    ///
    /// In-memory queues fall back to the role name; SQS queues must be
    /// configured.
    pub fn url(&self, role: QueueRole) -> Result<String> {
        let configured = match role {
            QueueRole::Names => &self.names_url,
            QueueRole::Counts => &self.counts_url,
            QueueRole::Ingest => &self.ingest_url,
        };
        match (configured, self.backend) {
            (Some(url), _) => Ok(url.clone()),
            (None, QueueBackendType::Memory) => Ok(role.as_str().to_string()),
            (None, QueueBackendType::Sqs) => anyhow::bail!(
                "Configuration error: {} is required for the sqs backend (set {})",
                role.config_key(),
                role.env_var()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReduceConfig {
    pub top_n: usize,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub concurrency: usize,
    pub forward_zero_counts: bool,
}

#[derive(Debug, Clone)]
pub struct EnumerateConfig {
    pub chunk_size: usize,
    /// Enumeration period of `run`, none to only consume
    pub interval_secs: Option<u64>,
}

impl EnumerateConfig {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Whether `run` starts the ingest consumer
    pub enabled: bool,
    /// Full OTLP/HTTP metrics URL, otherwise the exporter reads
    /// `OTEL_EXPORTER_OTLP_*`
    pub otlp_endpoint: Option<String>,
}

/// Fully resolved configuration, built once per invocation
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub prometheus: PrometheusConfig,
    pub queue: QueueConfig,
    pub reduce: ReduceConfig,
    pub probe: ProbeConfig,
    pub enumerate: EnumerateConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.cardinality/cardinality.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::from_layers(file_config, cli)
    }

    /// Layer defaults -> file config -> CLI/env overrides, then validate
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_prometheus = file_config.prometheus.unwrap_or_default();
        let file_queue = file_config.queue.unwrap_or_default();
        let file_reduce = file_config.reduce.unwrap_or_default();
        let file_probe = file_config.probe.unwrap_or_default();
        let file_enumerate = file_config.enumerate.unwrap_or_default();
        let file_ingest = file_config.ingest.unwrap_or_default();

        let prometheus = PrometheusConfig {
            workspace_id: non_empty(cli.workspace_id.clone().or(file_prometheus.workspace_id)),
            region: non_empty(cli.region.clone().or(file_prometheus.region)),
            url: non_empty(cli.prometheus_url.clone().or(file_prometheus.url))
                .map(|u| u.trim_end_matches('/').to_string()),
            signing: cli.signing.or(file_prometheus.signing).unwrap_or_default(),
            list_timeout_secs: file_prometheus
                .list_timeout_secs
                .unwrap_or(DEFAULT_LIST_TIMEOUT_SECS),
            query_timeout_secs: file_prometheus
                .query_timeout_secs
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            query_offset_secs: file_prometheus
                .query_offset_secs
                .unwrap_or(DEFAULT_QUERY_OFFSET_SECS),
        };

        let queue = QueueConfig {
            backend: cli.queue_backend.or(file_queue.backend).unwrap_or_default(),
            names_url: non_empty(cli.names_queue_url.clone().or(file_queue.names_url)),
            counts_url: non_empty(cli.counts_queue_url.clone().or(file_queue.counts_url)),
            ingest_url: non_empty(cli.ingest_queue_url.clone().or(file_queue.ingest_url)),
            wait_secs: file_queue.wait_secs.unwrap_or(DEFAULT_QUEUE_WAIT_SECS),
            max_messages: file_queue
                .max_messages
                .unwrap_or(DEFAULT_QUEUE_MAX_MESSAGES),
        };

        // CLI/env wins; a JSON number is accepted as well as a string
        let raw_top_n = cli.top_n.clone().or(file_reduce.top_n.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }));
        let reduce = ReduceConfig {
            top_n: resolve_top_n(raw_top_n.as_deref()),
        };

        let probe = ProbeConfig {
            concurrency: file_probe
                .concurrency
                .unwrap_or(DEFAULT_PROBE_CONCURRENCY),
            forward_zero_counts: file_probe.forward_zero_counts.unwrap_or(false),
        };

        let enumerate = EnumerateConfig {
            chunk_size: file_enumerate.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            interval_secs: cli.enumerate_interval.or(file_enumerate.interval_secs),
        };

        let ingest = IngestConfig {
            enabled: file_ingest.enabled.unwrap_or(true),
            otlp_endpoint: non_empty(cli.otlp_endpoint.clone().or(file_ingest.otlp_endpoint)),
        };

        let config = Self {
            prometheus,
            queue,
            reduce,
            probe,
            enumerate,
            ingest,
        };

        tracing::debug!(
            endpoint = ?config.prometheus.endpoint(),
            signing = %config.prometheus.signing,
            queue_backend = %config.queue.backend,
            top_n = config.reduce.top_n,
            "Configuration loaded"
        );

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness.
    ///
    /// Settings only some commands need (endpoint, queue URLs) are checked
    /// when the command asks for them.
    fn validate(&self) -> Result<()> {
        let p = &self.prometheus;
        for (key, value) in [
            ("prometheus.list_timeout_secs", p.list_timeout_secs),
            ("prometheus.query_timeout_secs", p.query_timeout_secs),
        ] {
            if value == 0 || value > MAX_BACKEND_TIMEOUT_SECS {
                anyhow::bail!(
                    "Configuration error: {} must be between 1 and {} (got {})",
                    key,
                    MAX_BACKEND_TIMEOUT_SECS,
                    value
                );
            }
        }
        if p.query_offset_secs > MAX_QUERY_OFFSET_SECS {
            anyhow::bail!(
                "Configuration error: prometheus.query_offset_secs must be at most {} (got {})",
                MAX_QUERY_OFFSET_SECS,
                p.query_offset_secs
            );
        }
        if let Some(url) = &p.url {
            reqwest::Url::parse(url).with_context(|| {
                format!(
                    "Configuration error: prometheus.url is not a valid URL (check {})",
                    ENV_PROMETHEUS_URL
                )
            })?;
        }
        if p.url.is_none() && p.workspace_id.is_some() && p.region.is_none() {
            tracing::warn!(
                "prometheus.workspace_id is set without a region, the backend address cannot be derived"
            );
        }

        if self.queue.wait_secs > MAX_QUEUE_WAIT_SECS {
            anyhow::bail!(
                "Configuration error: queue.wait_secs must be at most {} (got {})",
                MAX_QUEUE_WAIT_SECS,
                self.queue.wait_secs
            );
        }
        if self.queue.max_messages == 0 || self.queue.max_messages > MAX_BATCH_SIZE {
            anyhow::bail!(
                "Configuration error: queue.max_messages must be between 1 and {} (got {})",
                MAX_BATCH_SIZE,
                self.queue.max_messages
            );
        }

        if self.probe.concurrency == 0 || self.probe.concurrency > MAX_PROBE_CONCURRENCY {
            anyhow::bail!(
                "Configuration error: probe.concurrency must be between 1 and {} (got {})",
                MAX_PROBE_CONCURRENCY,
                self.probe.concurrency
            );
        }

        if self.enumerate.chunk_size == 0 {
            anyhow::bail!("Configuration error: enumerate.chunk_size must be greater than 0");
        }
        if self.enumerate.interval_secs == Some(0) {
            anyhow::bail!("Configuration error: enumerate.interval_secs must be greater than 0");
        }

        Ok(())
    }

    /// Backend address, or a configuration error naming what is missing
    pub fn require_endpoint(&self) -> Result<String> {
        self.prometheus.endpoint().with_context(|| {
            format!(
                "Configuration error: set prometheus.workspace_id ({}) with a region, or prometheus.url ({})",
                ENV_WORKSPACE_ID, ENV_PROMETHEUS_URL
            )
        })
    }
}

/// Resolve the configured top-N size. Missing, negative or unparsable values
/// fall back to the default; zero is honored and selects nothing.
pub fn resolve_top_n(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_TOP_N;
    };
    match raw.trim().parse::<usize>() {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(
                value = raw,
                error = %e,
                default = DEFAULT_TOP_N,
                "Invalid {}, using default",
                ENV_TOP_N
            );
            DEFAULT_TOP_N
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the profile config path (~/.cardinality/cardinality.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
