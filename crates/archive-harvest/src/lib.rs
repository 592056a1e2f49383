//! ArchiveHarvest — image acquisition from the national archives portal.
//!
//! Resolves an item page, asks the portal's file-listing API first, falls back
//! to rendering the page in a browser, and finally to a second automation
//! driver. Found files are downloaded into a caller-chosen directory.

pub mod alternate;
pub mod browser;
pub mod bulk;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod dom;
pub mod download;
pub mod events;
pub mod http;
pub mod orchestrator;
pub mod resolver;
pub mod search;
pub mod types;

#[cfg(test)]
mod testing;

pub use alternate::{AlternateBackend, WebDriverBackend};
pub use browser::{ChromiumSessionFactory, ContextProfile, PageSession, SessionFactory};
pub use catalog::{CatalogClient, CatalogResponse};
pub use config::HarvestConfig;
pub use events::{EventSink, HarvestEvent, MemorySink, TracingSink};
pub use orchestrator::{dedupe_by_url, Harvester};
pub use resolver::{resolve, PageRef};
pub use search::{SearchClient, SearchQuery, SearchResponse, SearchSummary};
pub use types::*;
