use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{LogFormat, QueueBackendType, SigningMode};
use super::constants::{
    ENV_CONFIG, ENV_COUNTS_QUEUE_URL, ENV_ENUMERATE_INTERVAL_SECS, ENV_INGEST_QUEUE_URL,
    ENV_LOG_FORMAT, ENV_NAMES_QUEUE_URL, ENV_OTLP_ENDPOINT, ENV_PROMETHEUS_SIGNING,
    ENV_PROMETHEUS_URL, ENV_QUEUE_BACKEND, ENV_REGION, ENV_TOP_N, ENV_WORKSPACE_ID,
};

#[derive(Parser)]
#[command(name = "cardinality")]
#[command(
    version,
    about = "Find the highest-cardinality metrics of a Prometheus workspace",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, global = true, env = ENV_LOG_FORMAT, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    // Metrics backend options
    /// Managed Prometheus workspace id
    #[arg(long, global = true, env = ENV_WORKSPACE_ID)]
    pub workspace_id: Option<String>,

    /// AWS region of the workspace and queues
    #[arg(long, global = true, env = ENV_REGION)]
    pub region: Option<String>,

    /// Prometheus-compatible endpoint, overrides the workspace address
    #[arg(long, global = true, env = ENV_PROMETHEUS_URL)]
    pub prometheus_url: Option<String>,

    /// Request signing for the backend (sigv4 or none)
    #[arg(long, global = true, env = ENV_PROMETHEUS_SIGNING, value_parser = parse_signing_mode)]
    pub signing: Option<SigningMode>,

    // Queue options
    /// Queue backend (sqs or memory)
    #[arg(long, global = true, env = ENV_QUEUE_BACKEND, value_parser = parse_queue_backend)]
    pub queue_backend: Option<QueueBackendType>,

    /// Queue carrying metric name jobs
    #[arg(long, global = true, env = ENV_NAMES_QUEUE_URL)]
    pub names_queue_url: Option<String>,

    /// Queue carrying cardinality results
    #[arg(long, global = true, env = ENV_COUNTS_QUEUE_URL)]
    pub counts_queue_url: Option<String>,

    /// Queue carrying ingestion jobs
    #[arg(long, global = true, env = ENV_INGEST_QUEUE_URL)]
    pub ingest_queue_url: Option<String>,

    // Stage options
    /// Number of metrics the reducer keeps (falls back to 10 when unusable)
    #[arg(long, global = true, env = ENV_TOP_N)]
    pub top_n: Option<String>,

    /// OTLP/HTTP metrics endpoint for the ingest stage
    #[arg(long, global = true, env = ENV_OTLP_ENDPOINT)]
    pub otlp_endpoint: Option<String>,

    /// Enumerate every N seconds while running (`run` only)
    #[arg(long, global = true, env = ENV_ENUMERATE_INTERVAL_SECS)]
    pub enumerate_interval: Option<u64>,
}

/// Parse log format from CLI/env string
fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_lowercase().as_str() {
        "text" | "pretty" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Valid options: text, json",
            s
        )),
    }
}

/// Parse signing mode from CLI/env string
fn parse_signing_mode(s: &str) -> Result<SigningMode, String> {
    match s.to_lowercase().as_str() {
        "sigv4" => Ok(SigningMode::Sigv4),
        "none" => Ok(SigningMode::None),
        _ => Err(format!(
            "Invalid signing mode '{}'. Valid options: sigv4, none",
            s
        )),
    }
}

/// Parse queue backend from CLI/env string
fn parse_queue_backend(s: &str) -> Result<QueueBackendType, String> {
    match s.to_lowercase().as_str() {
        "sqs" => Ok(QueueBackendType::Sqs),
        "memory" => Ok(QueueBackendType::Memory),
        _ => Err(format!(
            "Invalid queue backend '{}'. Valid options: sqs, memory",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List every metric name and publish the names as jobs
    Enumerate,
    /// Look up the cardinality of one delivery of name jobs
    Probe {
        /// Read the delivery from an event file ("-" for stdin) instead of the queue
        #[arg(long, value_name = "FILE")]
        event: Option<String>,
    },
    /// Reduce one delivery of results to the top N
    Reduce {
        /// Read the delivery from an event file ("-" for stdin) instead of the queue
        #[arg(long, value_name = "FILE")]
        event: Option<String>,
    },
    /// Export one delivery of top-N results as gauges
    Ingest {
        /// Read the delivery from an event file ("-" for stdin) instead of the queue
        #[arg(long, value_name = "FILE")]
        event: Option<String>,
    },
    /// Run every queue-fed stage until interrupted
    Run,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Enumerate => "enumerate",
            Commands::Probe { .. } => "probe",
            Commands::Reduce { .. } => "reduce",
            Commands::Ingest { .. } => "ingest",
            Commands::Run => "run",
        }
    }

    /// Whether a one-shot command publishes to or receives from a queue.
    /// Probe and reduce always publish; ingest only receives when no event
    /// file is given.
    pub fn uses_queues(&self) -> bool {
        match self {
            Commands::Enumerate | Commands::Probe { .. } | Commands::Reduce { .. } => true,
            Commands::Ingest { event } => event.is_none(),
            Commands::Run => false,
        }
    }
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub workspace_id: Option<String>,
    pub region: Option<String>,
    pub prometheus_url: Option<String>,
    pub signing: Option<SigningMode>,
    pub queue_backend: Option<QueueBackendType>,
    pub names_queue_url: Option<String>,
    pub counts_queue_url: Option<String>,
    pub ingest_queue_url: Option<String>,
    pub top_n: Option<String>,
    pub otlp_endpoint: Option<String>,
    pub enumerate_interval: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        log_format: cli.log_format,
        workspace_id: cli.workspace_id,
        region: cli.region,
        prometheus_url: cli.prometheus_url,
        signing: cli.signing,
        queue_backend: cli.queue_backend,
        names_queue_url: cli.names_queue_url,
        counts_queue_url: cli.counts_queue_url,
        ingest_queue_url: cli.ingest_queue_url,
        top_n: cli.top_n,
        otlp_endpoint: cli.otlp_endpoint,
        enumerate_interval: cli.enumerate_interval,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_backend() {
        assert_eq!(parse_queue_backend("SQS"), Ok(QueueBackendType::Sqs));
        assert_eq!(parse_queue_backend("memory"), Ok(QueueBackendType::Memory));
        assert!(parse_queue_backend("redis").is_err());
    }

    #[test]
    fn test_parse_signing_mode() {
        assert_eq!(parse_signing_mode("sigv4"), Ok(SigningMode::Sigv4));
        assert_eq!(parse_signing_mode("None"), Ok(SigningMode::None));
        assert!(parse_signing_mode("basic").is_err());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["cardinality", "probe", "--event", "-"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Probe {
                event: Some("-".to_string())
            }
        );

        let cli = Cli::try_parse_from(["cardinality", "reduce"]).unwrap();
        assert_eq!(cli.command, Commands::Reduce { event: None });
        assert_eq!(cli.command.name(), "reduce");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cardinality",
            "enumerate",
            "--queue-backend",
            "memory",
            "--top-n",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Enumerate);
        assert_eq!(cli.queue_backend, Some(QueueBackendType::Memory));
        assert_eq!(cli.top_n.as_deref(), Some("abc"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["cardinality"]).is_err());
    }
}
