use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedListing, FeedListingRow};

/// Least-recently-fetched first; never-fetched feeds before everything else,
/// then registration order.
const CLAIM_ORDER: &str = "ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, rowid ASC";

impl Database {
    // ========================================================================
    // Feed Registration
    // ========================================================================

    /// Register a feed owned by `user_id`. The URL must not already be registered.
    pub async fn insert_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Uuid,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, FeedDbRow>(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, created_at, updated_at, name, url, user_id, last_fetched_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_feed())
    }

    /// All feeds with their owner's name, ordered by feed name
    pub async fn list_feeds(&self) -> Result<Vec<FeedListing>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedListingRow>(
            r#"
            SELECT f.id, f.created_at, f.updated_at, f.name, f.url, f.user_id,
                   f.last_fetched_at, u.name AS user_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.created_at
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FeedListing {
                feed: row.feed.into_feed(),
                user_name: row.user_name,
            })
            .collect())
    }

    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedDbRow>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    // ========================================================================
    // Fetch Scheduling
    // ========================================================================

    /// The feed that has waited longest since its last fetch, if any are registered.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedDbRow>(&format!(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            {CLAIM_ORDER}
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Stamp a feed as fetched at `at`.
    ///
    /// The stamp never moves backwards: an `at` older than the stored value
    /// leaves it unchanged.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = to_millis(at);
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(COALESCE(last_fetched_at, ?), ?),
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(at)
        .bind(at)
        .bind(at)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Select and stamp the least-recently-fetched feed in one statement.
    ///
    /// Two concurrent callers can never claim the same feed: SQLite serializes
    /// the writes and the second caller's subquery sees the first one's stamp.
    pub async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        let at = to_millis(at);
        let row = sqlx::query_as::<_, FeedDbRow>(&format!(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(COALESCE(last_fetched_at, ?), ?),
                updated_at = ?
            WHERE id = (SELECT id FROM feeds {CLAIM_ORDER} LIMIT 1)
            RETURNING id, created_at, updated_at, name, url, user_id, last_fetched_at
        "#
        ))
        .bind(at)
        .bind(at)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_db() -> (Database, Uuid) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("owner").await.unwrap();
        (db, user.id)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_insert_feed_starts_unfetched() {
        let (db, user_id) = test_db().await;
        let feed = db
            .insert_feed("Example", "https://example.com/feed.xml", user_id)
            .await
            .unwrap();
        assert_eq!(feed.name, "Example");
        assert_eq!(feed.user_id, user_id);
        assert!(feed.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let (db, user_id) = test_db().await;
        db.insert_feed("A", "https://example.com/feed.xml", user_id)
            .await
            .unwrap();
        let err = db
            .insert_feed("B", "https://example.com/feed.xml", user_id)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_feed_requires_existing_user() {
        let (db, _) = test_db().await;
        let err = db
            .insert_feed("A", "https://example.com/feed.xml", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(!err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_list_feeds_includes_owner() {
        let (db, user_id) = test_db().await;
        db.insert_feed("B feed", "https://b.example.com/rss", user_id)
            .await
            .unwrap();
        db.insert_feed("A feed", "https://a.example.com/rss", user_id)
            .await
            .unwrap();

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].feed.name, "A feed");
        assert_eq!(feeds[0].user_name, "owner");
    }

    #[tokio::test]
    async fn test_next_feed_empty_registry() {
        let (db, _) = test_db().await;
        assert!(db.next_feed_to_fetch().await.unwrap().is_none());
        assert!(db.claim_next_feed(t(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_feed_prefers_never_fetched() {
        let (db, user_id) = test_db().await;
        let a = db.insert_feed("A", "https://a.example.com/rss", user_id).await.unwrap();
        let b = db.insert_feed("B", "https://b.example.com/rss", user_id).await.unwrap();

        db.mark_feed_fetched(a.id, t(0)).await.unwrap();
        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_next_feed_picks_oldest_stamp() {
        let (db, user_id) = test_db().await;
        let a = db.insert_feed("A", "https://a.example.com/rss", user_id).await.unwrap();
        let b = db.insert_feed("B", "https://b.example.com/rss", user_id).await.unwrap();

        db.mark_feed_fetched(a.id, t(20)).await.unwrap();
        db.mark_feed_fetched(b.id, t(10)).await.unwrap();
        assert_eq!(db.next_feed_to_fetch().await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_never_moves_backwards() {
        let (db, user_id) = test_db().await;
        let a = db.insert_feed("A", "https://a.example.com/rss", user_id).await.unwrap();

        db.mark_feed_fetched(a.id, t(10)).await.unwrap();
        db.mark_feed_fetched(a.id, t(5)).await.unwrap();
        let feed = db.get_feed(a.id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched_at, Some(t(10)));
    }

    #[tokio::test]
    async fn test_mark_unknown_feed_not_found() {
        let (db, _) = test_db().await;
        let err = db.mark_feed_fetched(Uuid::new_v4(), t(0)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));
    }

    #[tokio::test]
    async fn test_claim_stamps_and_returns_feed() {
        let (db, user_id) = test_db().await;
        let a = db.insert_feed("A", "https://a.example.com/rss", user_id).await.unwrap();

        let claimed = db.claim_next_feed(t(1)).await.unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.last_fetched_at, Some(t(1)));
        assert_eq!(
            db.get_feed(a.id).await.unwrap().unwrap().last_fetched_at,
            Some(t(1))
        );
    }

    #[tokio::test]
    async fn test_claims_round_robin() {
        let (db, user_id) = test_db().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            let feed = db
                .insert_feed(&format!("F{i}"), &format!("https://f{i}.example.com/rss"), user_id)
                .await
                .unwrap();
            ids.push(feed.id);
        }

        let mut claimed = Vec::new();
        for step in 0..6 {
            claimed.push(db.claim_next_feed(t(step)).await.unwrap().unwrap().id);
        }

        // Registration order first, then the same rotation again
        assert_eq!(&claimed[..3], &ids[..]);
        assert_eq!(&claimed[3..], &ids[..]);
    }
}
