//! Long-lived state shared by every tool call.

use std::sync::Arc;

use archive_harvest::{HarvestConfig, Harvester, SearchClient};

pub struct HarvestContext {
    harvester: Arc<Harvester>,
    search: SearchClient,
}

impl HarvestContext {
    pub fn new(config: HarvestConfig) -> Self {
        let search = SearchClient::new(&config.http, &config.portal);
        Self {
            harvester: Arc::new(Harvester::new(config)),
            search,
        }
    }

    /// Context around a pre-built harvester, e.g. one with fake browser backends.
    pub fn with_harvester(harvester: Harvester) -> Self {
        let config = harvester.config();
        let search = SearchClient::new(&config.http, &config.portal);
        Self {
            harvester: Arc::new(harvester),
            search,
        }
    }

    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }

    pub fn config(&self) -> &HarvestConfig {
        self.harvester.config()
    }

    pub fn search(&self) -> &SearchClient {
        &self.search
    }
}
