//! Collection run: category targets first, then every category feed in order.

use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{self, FeedTarget, FetchError};
use crate::storage::{Database, DatabaseError, NewsRecord, TableName};

/// Fatal errors of a collection run.
///
/// Per-feed and per-entry problems never surface here; they are logged and
/// degrade to fewer records. These variants mean the run cannot proceed.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Feed discovery found no feed directory on the site
    #[error("Discovery failed: {0}")]
    Discovery(String),
    /// The directory page no longer has the expected layout
    #[error("Unexpected page structure: {0}")]
    Structure(String),
    /// The feed directory page could not be fetched
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: FetchError,
    },
    /// The HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failure of a whole run: collection or persistence.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Runs discovery, category extraction and feed parsing for one site.
pub struct Collector {
    client: reqwest::Client,
    site_url: String,
    category_marker: String,
    default_creator: String,
    timeout: Duration,
}

impl Collector {
    /// Builds a collector and its HTTP client from configuration.
    pub fn new(config: &Config) -> Result<Self, CollectError> {
        let client = feed::build_client(&config.user_agent)?;
        Ok(Self {
            client,
            site_url: config.site_url.clone(),
            category_marker: config.category_marker.clone(),
            default_creator: config.default_creator.clone(),
            timeout: config.request_timeout(),
        })
    }

    /// Resolves the ordered category feed list for the configured site.
    ///
    /// # Errors
    ///
    /// Propagates [`CollectError::Discovery`], [`CollectError::Structure`]
    /// and [`CollectError::Network`] unchanged.
    pub async fn get_targets(&self) -> Result<Vec<FeedTarget>, CollectError> {
        feed::get_targets(&self.client, &self.site_url, &self.category_marker, self.timeout).await
    }

    /// Collects every category's records into one batch.
    ///
    /// Records keep category order, then feed order within a category. An
    /// empty batch is a normal outcome (no category had articles).
    pub async fn run_collection(&self) -> Result<Vec<NewsRecord>, CollectError> {
        tracing::info!(site = %self.site_url, "Starting news collection");

        let targets = self.get_targets().await?;

        let mut collected = Vec::new();
        for target in &targets {
            tracing::info!(category = %target.category, feed_url = %target.feed_url, "Collecting category");
            let records =
                feed::parse_feed(&self.client, target, &self.default_creator, self.timeout).await;
            tracing::info!(category = %target.category, records = records.len(), "Category done");
            collected.extend(records);
        }

        tracing::info!(
            categories = targets.len(),
            total = collected.len(),
            "Collection finished"
        );
        Ok(collected)
    }
}

/// One full run: collect, then persist the batch in one upsert.
///
/// An empty batch returns `Ok(0)` without opening the database. Once opened,
/// the database is closed on every path before this returns.
pub async fn run_once(config: &Config) -> Result<usize, RunError> {
    let records = Collector::new(config)?.run_collection().await?;
    if records.is_empty() {
        tracing::warn!("No records collected, nothing to save");
        return Ok(0);
    }

    let table = TableName::new(&config.database.table)?;
    let db = Database::open(&config.database.path).await?;
    let saved = db.save_and_close(&table, &records).await?;

    tracing::info!(saved, path = %config.database.path, "Collection run complete");
    Ok(saved)
}
