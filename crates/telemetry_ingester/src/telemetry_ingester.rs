use crate::demo::{run_demo_frame_producer, DemoProducerConfig};
use crate::domain::{IngestionService, RetryPolicy, RetryingTelemetryRepository, SiteSequencer};
use common::domain::{SiteRepository, TelemetryRepository};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Long-running process handed to the service runner
pub type IngesterProcess =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub struct TelemetryIngesterConfig {
    pub lane_idle_timeout: Duration,
    pub storage_retry: RetryPolicy,
    /// How often the lane monitor reports open lanes
    pub status_interval: Duration,
    pub demo: Option<DemoProducerConfig>,
}

/// Wires the ingestion pipeline on top of the given storage and exposes
/// its background processes.
pub struct TelemetryIngester {
    service: Arc<IngestionService>,
    status_interval: Duration,
    demo: Option<DemoProducerConfig>,
}

impl TelemetryIngester {
    pub fn new(
        site_repository: Arc<dyn SiteRepository>,
        telemetry_repository: Arc<dyn TelemetryRepository>,
        config: TelemetryIngesterConfig,
    ) -> Self {
        info!(
            lane_idle_timeout_secs = config.lane_idle_timeout.as_secs(),
            storage_retry_max_attempts = config.storage_retry.max_attempts,
            demo_enabled = config.demo.is_some(),
            "Initializing telemetry ingester"
        );

        let telemetry_repository: Arc<dyn TelemetryRepository> = Arc::new(
            RetryingTelemetryRepository::new(telemetry_repository, config.storage_retry),
        );
        let service = Arc::new(IngestionService::new(
            site_repository,
            telemetry_repository,
            SiteSequencer::new(config.lane_idle_timeout),
        ));

        Self {
            service,
            status_interval: config.status_interval,
            demo: config.demo,
        }
    }

    /// Entry point for callers that submit frames
    pub fn service(&self) -> Arc<IngestionService> {
        self.service.clone()
    }

    pub fn into_runner_processes(self) -> Vec<(String, IngesterProcess)> {
        let mut processes: Vec<(String, IngesterProcess)> = Vec::new();

        processes.push((
            "lane_monitor".to_string(),
            Box::new({
                let service = self.service.clone();
                let status_interval = self.status_interval;
                move |ctx| run_lane_monitor(service, status_interval, ctx).boxed()
            }),
        ));

        if let Some(demo) = self.demo {
            processes.push((
                "demo_frame_producer".to_string(),
                Box::new({
                    let service = self.service.clone();
                    move |ctx| run_demo_frame_producer(service, demo, ctx).boxed()
                }),
            ));
        }

        processes
    }
}

/// Periodically reports the number of open site lanes until cancelled
async fn run_lane_monitor(
    service: Arc<IngestionService>,
    status_interval: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    if status_interval.is_zero() {
        anyhow::bail!("lane monitor interval must be greater than zero");
    }

    let mut ticker = tokio::time::interval(status_interval);
    loop {
        tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                let active_lanes = service.active_lanes().await;
                info!(active_lanes, "ingester status");
            }
        }
    }
}
