use crate::domain::{IngestFrameRequest, IngestOutcome, IngestionService};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the synthetic frame producer
#[derive(Debug, Clone)]
pub struct DemoProducerConfig {
    pub site_codes: Vec<String>,
    pub interval_ms: u64,
    /// Every n-th round sends a malformed frame; 0 disables
    pub malformed_every: u64,
}

/// Feed synthetic frames for each configured site into the ingestion
/// service until cancelled.
///
/// Totals rise monotonically per site, so every well-formed frame is
/// accepted as long as the site exists, is active and is at least 2.5 units
/// tall.
pub async fn run_demo_frame_producer(
    service: Arc<IngestionService>,
    config: DemoProducerConfig,
    ctx: CancellationToken,
) -> Result<()> {
    if config.interval_ms == 0 {
        bail!("demo producer interval must be greater than zero");
    }

    info!(
        sites = ?config.site_codes,
        interval_ms = config.interval_ms,
        "Starting demo frame producer"
    );

    let mut ticker = interval(Duration::from_millis(config.interval_ms));
    let mut round: u64 = 0;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                info!(rounds = round, "demo frame producer stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let malformed = config.malformed_every > 0 && (round + 1) % config.malformed_every == 0;
        let payload = if malformed {
            malformed_payload(round)
        } else {
            demo_payload(round)
        };

        for site_code in &config.site_codes {
            match service
                .ingest(IngestFrameRequest::new(site_code.as_str(), payload.as_str()))
                .await
            {
                Ok(IngestOutcome::Accepted(parsed)) => {
                    debug!(site_code = %site_code, raw_frame_id = parsed.raw_frame_id, "demo frame accepted");
                }
                Ok(outcome) => {
                    debug!(site_code = %site_code, ?outcome, "demo frame not accepted");
                }
                Err(err) => {
                    warn!(site_code = %site_code, error = %err, "demo frame ingestion failed");
                }
            }
        }

        round += 1;
    }
}

/// Well-formed frame for the given round
///
/// Water level cycles between 0.5 and 2.5, both motors alternate and the
/// total grows by the flow rate each round.
pub fn demo_payload(round: u64) -> String {
    let phase = (round % 20) as f64;
    let water_level = 0.5 + phase / 10.0;
    let chemical_level = 0.25 + (round % 4) as f64 * 0.05;
    let motor1 = round % 2;
    let motor2 = (round / 2) % 2;
    let flow_rate = 12.5;
    let total_amount = flow_rate * (round + 1) as f64;

    format!(
        "{:.2},{:.2},{},{},{:.1},{:.1}",
        water_level, chemical_level, motor1, motor2, flow_rate, total_amount
    )
}

fn malformed_payload(round: u64) -> String {
    format!("ERR,{},sensor timeout", round)
}
