use thiserror::Error;
use uuid::Uuid;

use super::pipeline::{ingest_document, IngestReport};
use super::{system_clock, Clock};
use crate::feed::{FetchError, Fetcher};
use crate::storage::{DatabaseError, Feed, FeedStore};

/// Why a cycle produced nothing.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no feeds registered")]
    NoFeeds,
    #[error("failed to claim next feed: {0}")]
    Claim(#[from] DatabaseError),
    #[error("failed to fetch feed {url}: {source}")]
    Fetch {
        feed_id: Uuid,
        url: String,
        #[source]
        source: FetchError,
    },
}

impl CycleError {
    pub fn is_transport(&self) -> bool {
        matches!(self, CycleError::Fetch { source, .. } if source.is_transport())
    }
}

/// Result of one successful claim → fetch → ingest pass.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// The feed as claimed, with its new stamp
    pub feed: Feed,
    pub channel_title: String,
    pub report: IngestReport,
}

/// Claims feeds in least-recently-fetched order and ingests them.
///
/// The claim stamp is written before the fetch starts, so a feed whose fetch
/// fails or hangs simply goes to the back of the rotation.
pub struct Scheduler<S> {
    store: S,
    fetcher: Fetcher,
    clock: Clock,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: Fetcher) -> Self {
        Self {
            store,
            fetcher,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Select the least-recently-fetched feed and stamp it with the current time.
    pub async fn claim(&self) -> Result<Feed, CycleError> {
        let now = (self.clock)();
        self.store
            .claim_next_feed(now)
            .await?
            .ok_or(CycleError::NoFeeds)
    }

    /// Run one full cycle for a single feed.
    pub async fn run_cycle(&self) -> Result<CycleSummary, CycleError> {
        let feed = self.claim().await?;
        tracing::info!(feed = %feed.name, url = %feed.url, "Fetching feed");

        let doc = self
            .fetcher
            .fetch(&feed.url)
            .await
            .map_err(|source| CycleError::Fetch {
                feed_id: feed.id,
                url: feed.url.clone(),
                source,
            })?;

        let report = ingest_document(&self.store, feed.id, &doc, (self.clock)()).await;

        Ok(CycleSummary {
            feed,
            channel_title: doc.channel.title,
            report,
        })
    }
}
