use crate::domain::{DomainError, DomainResult, GetSiteRepoInput, Site, SiteRepository};
use crate::postgres::{classify_postgres_error, PostgresClient};
use async_trait::async_trait;
use tracing::debug;

/// Site row as stored in the `sites` table
#[derive(Debug, Clone)]
pub struct SiteRow {
    pub management_code: String,
    pub site_name: String,
    pub contact_number: String,
    pub tank_type: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub status: String,
}

impl TryFrom<SiteRow> for Site {
    type Error = DomainError;

    fn try_from(row: SiteRow) -> Result<Self, Self::Error> {
        Ok(Site {
            management_code: row.management_code,
            site_name: row.site_name,
            contact_number: row.contact_number,
            tank_type: row.tank_type.parse()?,
            length: row.length,
            width: row.width,
            height: row.height,
            status: row.status.parse()?,
        })
    }
}

/// Read-only PostgreSQL view of the site registry
#[derive(Clone)]
pub struct PostgresSiteRepository {
    client: PostgresClient,
}

impl PostgresSiteRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SiteRepository for PostgresSiteRepository {
    async fn get_site(&self, input: GetSiteRepoInput) -> DomainResult<Option<Site>> {
        debug!(management_code = %input.management_code, "getting site from database");

        let conn = self.client.checkout().await?;

        let row = conn
            .query_opt(
                "SELECT management_code, site_name, contact_number, tank_type, length, width, height, status
                 FROM sites
                 WHERE management_code = $1",
                &[&input.management_code],
            )
            .await
            .map_err(classify_postgres_error)?;

        row.map(|row| {
            SiteRow {
                management_code: row.get(0),
                site_name: row.get(1),
                contact_number: row.get(2),
                tank_type: row.get(3),
                length: row.get(4),
                width: row.get(5),
                height: row.get(6),
                status: row.get(7),
            }
            .try_into()
        })
        .transpose()
    }
}
