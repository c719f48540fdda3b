mod config;

use common::domain::{Site, SiteRepository, SiteStatus, TankType, TelemetryRepository};
use common::garde::validate_struct;
use common::memory::{InMemorySiteRegistry, InMemoryTelemetryStore};
use common::postgres::{PostgresClient, PostgresSiteRepository, PostgresTelemetryRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::{ServiceConfig, StorageBackend};
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use tankwatch_runner::Runner;
use telemetry_ingester::{TelemetryIngester, TelemetryIngesterConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = validate_struct(&config) {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        storage_backend = ?config.storage_backend,
        "Starting tankwatch-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let (site_repository, telemetry_repository) = match initialize_storage(&config).await {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let ingester = TelemetryIngester::new(
        site_repository,
        telemetry_repository,
        TelemetryIngesterConfig {
            lane_idle_timeout: Duration::from_secs(config.lane_idle_timeout_secs),
            storage_retry: config.storage_retry_policy(),
            status_interval: Duration::from_secs(config.status_interval_secs),
            demo: config.demo_producer_config(),
        },
    );

    let mut runner = Runner::new();
    for (name, process) in ingester.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs));

    if let Err(e) = runner.run().await {
        eprintln!("tankwatch-all-in-one stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

type Repositories = (Arc<dyn SiteRepository>, Arc<dyn TelemetryRepository>);

async fn initialize_storage(config: &ServiceConfig) -> anyhow::Result<Repositories> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            info!("Initializing PostgreSQL...");
            let postgres_config = config.postgres_config();
            MigrationRunner::postgres(
                postgres_config.goose_binary_path.clone(),
                postgres_config.migrations_dir.clone(),
                postgres_config.dsn(),
            )
            .run_migrations()
            .await?;

            let client = PostgresClient::from_config(&postgres_config)?;
            client.ping().await?;

            Ok((
                Arc::new(PostgresSiteRepository::new(client.clone())),
                Arc::new(PostgresTelemetryRepository::new(client)),
            ))
        }
        StorageBackend::Memory => {
            let site_codes = config.demo_site_codes();
            info!(sites = ?site_codes, "Using in-memory storage");
            let registry =
                InMemorySiteRegistry::with_sites(site_codes.iter().map(|code| demo_site(code)));

            Ok((
                Arc::new(registry),
                Arc::new(InMemoryTelemetryStore::new()),
            ))
        }
    }
}

/// Active cylindrical tank tall enough for every synthetic demo level
fn demo_site(management_code: &str) -> Site {
    Site {
        management_code: management_code.to_string(),
        site_name: format!("Demo tank {}", management_code),
        contact_number: String::new(),
        tank_type: TankType::Circle,
        length: 2.0,
        width: 2.0,
        height: 3.0,
        status: SiteStatus::Active,
    }
}
