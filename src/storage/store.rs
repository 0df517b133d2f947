use chrono::{DateTime, Utc};
use std::future::Future;
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewPost};

/// The storage operations the ingestion loop depends on.
///
/// [`Database`] is the production implementation; tests substitute
/// in-memory fakes to inject failures.
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest `last_fetched_at` (never-fetched first)
    fn next_feed_to_fetch(
        &self,
    ) -> impl Future<Output = Result<Option<Feed>, DatabaseError>> + Send;

    fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Fails with [`DatabaseError::UniqueViolation`] when the post URL exists.
    fn insert_post(&self, post: &NewPost)
        -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Select the next feed and stamp it as fetched at `at`.
    ///
    /// The default runs the two steps separately, which is sound only while a
    /// single worker claims feeds. Stores that can do it atomically should
    /// override this.
    fn claim_next_feed(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Feed>, DatabaseError>> + Send {
        async move {
            let Some(mut feed) = self.next_feed_to_fetch().await? else {
                return Ok(None);
            };
            self.mark_feed_fetched(feed.id, at).await?;
            feed.last_fetched_at = Some(feed.last_fetched_at.map_or(at, |prev| prev.max(at)));
            Ok(Some(feed))
        }
    }
}

impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<(), DatabaseError> {
        Database::insert_post(self, post).await
    }

    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        Database::claim_next_feed(self, at).await
    }
}
