use crate::domain::DomainResult;
use crate::postgres::{classify_pool_error, PostgresConfig};
use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Pooled connection handle shared by the site and telemetry repositories
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Build a pool for the given database. No connection is opened until
    /// the first checkout; use [`PostgresClient::ping`] to fail fast.
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(port);
        cfg.dbname = Some(database.to_string());
        cfg.user = Some(username.to_string());
        cfg.password = Some(password.to_string());
        cfg.pool = Some(PoolConfig::new(max_pool_size.max(1)));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .with_context(|| format!("invalid postgres pool config for {}:{}", host, port))?;

        info!(
            host = %host,
            port,
            database = %database,
            max_pool_size,
            "postgres pool created"
        );

        Ok(Self { pool })
    }

    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        Self::new(
            &config.host,
            config.port,
            &config.database,
            &config.username,
            &config.password,
            config.max_pool_size,
        )
    }

    /// Round-trip a trivial query to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute("SELECT 1", &[])
            .await
            .context("postgres ping failed")?;
        debug!("postgres connection verified");
        Ok(())
    }

    /// Check a connection out of the pool, classifying failures for the
    /// repositories
    pub async fn checkout(&self) -> DomainResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(classify_pool_error)
    }

    /// Check a connection out of the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("failed to check out a postgres connection")
    }
}
