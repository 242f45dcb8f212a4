//! Core application

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::{AppConfig, LogFormat, QueueBackendType, QueueRole};
use crate::core::constants::{APP_NAME, DEFAULT_LOG_FILTER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::queue::SqsEvent;
use crate::data::{Delivery, MetricsBackend, OtlpGaugeSink, PrometheusClient, QueueService};
use crate::domain::stages::{
    DeliveryHandler, Enumerator, Ingestor, ProbeSettings, Prober, QueueConsumer, Reducer,
};

pub struct CoreApp {
    pub config: AppConfig,
    pub queues: QueueService,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.log_format.unwrap_or_default());

        tracing::debug!(app = APP_NAME, command = command.name(), "Application starting");

        let app = Self::init(&cli_config).await?;
        app.execute(command).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let queues =
            QueueService::from_config(&config.queue, config.prometheus.region.clone()).await;

        Ok(Self {
            config,
            queues,
            shutdown: ShutdownService::new(),
        })
    }

    fn init_logging(format: LogFormat) {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_env_filter(filter);

        match format {
            LogFormat::Text => builder.with_ansi(true).compact().init(),
            LogFormat::Json => builder.with_ansi(false).json().init(),
        }
    }

    /// Run one command to completion
    pub async fn execute(&self, command: Commands) -> Result<()> {
        check_queue_backend(self.config.queue.backend, &command)?;

        match command {
            Commands::Enumerate => {
                let backend = self.metrics_backend().await?;
                self.enumerator(backend)?.run().await?;
                Ok(())
            }
            Commands::Probe { event } => {
                let prober = self.prober(self.metrics_backend().await?)?;
                let delivery = self.delivery(event.as_deref(), QueueRole::Names).await?;
                self.handle_once(&prober, &delivery).await
            }
            Commands::Reduce { event } => {
                let reducer = self.reducer()?;
                let delivery = self.delivery(event.as_deref(), QueueRole::Counts).await?;
                self.handle_once(&reducer, &delivery).await
            }
            Commands::Ingest { event } => {
                let ingestor = self.ingestor().await?;
                let delivery = self.delivery(event.as_deref(), QueueRole::Ingest).await?;
                let result = self.handle_once(&ingestor, &delivery).await;
                if let Err(e) = ingestor.shutdown().await {
                    tracing::warn!(error = %e, "Failed to shut down exporter");
                }
                result
            }
            Commands::Run => self.run_workers().await,
        }
    }

    async fn metrics_backend(&self) -> Result<Arc<dyn MetricsBackend>> {
        let endpoint = self.config.require_endpoint()?;
        let client = PrometheusClient::from_config(&self.config.prometheus)
            .await
            .with_context(|| format!("Failed to initialize metrics backend client for {endpoint}"))?;
        Ok(Arc::new(client))
    }

    fn enumerator(&self, backend: Arc<dyn MetricsBackend>) -> Result<Enumerator> {
        Ok(Enumerator::new(
            backend,
            self.queues.clone(),
            self.config.queue.url(QueueRole::Names)?,
            self.config.enumerate.chunk_size,
        )
        .with_query_offset(self.config.prometheus.query_offset()))
    }

    fn prober(&self, backend: Arc<dyn MetricsBackend>) -> Result<Prober> {
        Ok(Prober::new(
            backend,
            self.queues.clone(),
            self.config.queue.url(QueueRole::Counts)?,
            ProbeSettings {
                concurrency: self.config.probe.concurrency,
                forward_zero_counts: self.config.probe.forward_zero_counts,
                query_offset: self.config.prometheus.query_offset(),
            },
        ))
    }

    fn reducer(&self) -> Result<Reducer> {
        Ok(Reducer::new(
            self.queues.clone(),
            self.config.queue.url(QueueRole::Ingest)?,
            self.config.reduce.top_n,
        ))
    }

    async fn ingestor(&self) -> Result<Ingestor> {
        let sink = OtlpGaugeSink::new(self.config.ingest.otlp_endpoint.clone())
            .await
            .context("Failed to initialize OTLP exporter")?;
        Ok(Ingestor::new(Arc::new(sink)))
    }

    /// The delivery group of a one-shot command: the event file when given,
    /// otherwise one receive from the stage's input queue
    async fn delivery(&self, event: Option<&str>, input: QueueRole) -> Result<Delivery> {
        match event {
            Some(source) => {
                let event = SqsEvent::read(source)
                    .await
                    .with_context(|| format!("Failed to read event from {source}"))?;
                Ok(event.into_delivery())
            }
            None => {
                let queue = self.config.queue.url(input)?;
                let delivery = self.queues.receive(&queue).await?;
                tracing::debug!(queue = %queue, messages = delivery.len(), "Received delivery");
                Ok(delivery)
            }
        }
    }

    async fn handle_once(&self, handler: &dyn DeliveryHandler, delivery: &Delivery) -> Result<()> {
        if delivery.is_empty() {
            tracing::info!(stage = handler.name(), "Nothing to process");
        }
        handler.handle(delivery).await?;

        let deleted = self.queues.ack(delivery).await?;
        if deleted > 0 {
            tracing::debug!(stage = handler.name(), deleted, "Deleted handled messages");
        }
        Ok(())
    }

    /// Start a consumer per queue-fed stage, plus the enumeration schedule
    /// when configured, and run until a shutdown signal
    async fn run_workers(&self) -> Result<()> {
        // Install signal handlers FIRST
        self.shutdown.install_signal_handlers();

        let names_queue = self.config.queue.url(QueueRole::Names)?;
        let counts_queue = self.config.queue.url(QueueRole::Counts)?;
        let backend = self.metrics_backend().await?;

        self.shutdown
            .register(
                QueueConsumer::new(
                    Arc::new(self.prober(backend.clone())?),
                    self.queues.clone(),
                    names_queue,
                )
                .start(self.shutdown.subscribe()),
            )
            .await;

        self.shutdown
            .register(
                QueueConsumer::new(Arc::new(self.reducer()?), self.queues.clone(), counts_queue)
                    .start(self.shutdown.subscribe()),
            )
            .await;

        let ingestor = if self.config.ingest.enabled {
            let ingestor = Arc::new(self.ingestor().await?);
            self.shutdown
                .register(
                    QueueConsumer::new(
                        ingestor.clone(),
                        self.queues.clone(),
                        self.config.queue.url(QueueRole::Ingest)?,
                    )
                    .start(self.shutdown.subscribe()),
                )
                .await;
            Some(ingestor)
        } else {
            tracing::debug!("Ingest stage disabled by config");
            None
        };

        if let Some(interval) = self.config.enumerate.interval() {
            let enumerator = Arc::new(self.enumerator(backend)?);
            self.shutdown
                .register(enumerator.start_interval(interval, self.shutdown.subscribe()))
                .await;
        }

        tracing::info!(
            queue_backend = self.queues.backend_name(),
            top_n = self.config.reduce.top_n,
            ingest = self.config.ingest.enabled,
            enumerate_interval_secs = ?self.config.enumerate.interval_secs,
            "Workers started"
        );

        self.shutdown.wait().await;
        self.shutdown.shutdown().await;

        if let Some(ingestor) = ingestor
            && let Err(e) = ingestor.shutdown().await
        {
            tracing::warn!(error = %e, "Failed to shut down exporter");
        }
        Ok(())
    }
}

/// The memory queue lives only as long as this process, so only `run` can
/// hand jobs from one stage to the next through it
fn check_queue_backend(backend: QueueBackendType, command: &Commands) -> Result<()> {
    if backend == QueueBackendType::Memory && command.uses_queues() {
        bail!(
            "Configuration error: `{}` needs the sqs queue backend, the memory backend only works with `run`",
            command.name()
        );
    }
    Ok(())
}
