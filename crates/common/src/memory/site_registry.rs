use crate::domain::{DomainResult, GetSiteRepoInput, Site, SiteRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of SiteRepository keyed by management code
#[derive(Clone, Default)]
pub struct InMemorySiteRegistry {
    sites: Arc<RwLock<HashMap<String, Site>>>,
}

impl InMemorySiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: impl IntoIterator<Item = Site>) -> Self {
        let sites = sites
            .into_iter()
            .map(|site| (site.management_code.clone(), site))
            .collect();
        Self {
            sites: Arc::new(RwLock::new(sites)),
        }
    }

    /// Insert or replace a site
    pub async fn upsert(&self, site: Site) {
        let mut sites = self.sites.write().await;
        sites.insert(site.management_code.clone(), site);
    }

    pub async fn remove(&self, management_code: &str) -> Option<Site> {
        let mut sites = self.sites.write().await;
        sites.remove(management_code)
    }
}

#[async_trait]
impl SiteRepository for InMemorySiteRegistry {
    async fn get_site(&self, input: GetSiteRepoInput) -> DomainResult<Option<Site>> {
        let sites = self.sites.read().await;
        Ok(sites.get(&input.management_code).cloned())
    }
}
