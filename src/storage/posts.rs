use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, NewPost, Post, PostDbRow, PostListing, PostListingRow};

/// Maximum number of posts returned by any single listing query
const MAX_POSTS: i64 = 500;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// A post whose URL is already stored fails with
    /// [`DatabaseError::UniqueViolation`]; the existing row is left untouched.
    pub async fn insert_post(&self, post: &NewPost) -> Result<(), DatabaseError> {
        let created_at = to_millis(post.created_at);
        sqlx::query(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, url, description, published_at, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(post.id)
        .bind(created_at)
        .bind(created_at)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(post.feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Posts of one feed, newest first
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostDbRow>(
            r#"
            SELECT id, created_at, updated_at, title, url, description, published_at, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC NULLS LAST, created_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    /// Most recent posts across the feeds owned by `user_id`.
    ///
    /// `limit` is capped at [`MAX_POSTS`].
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PostListing>, DatabaseError> {
        let limit = limit.clamp(0, MAX_POSTS);
        let rows = sqlx::query_as::<_, PostListingRow>(
            r#"
            SELECT p.id, p.created_at, p.updated_at, p.title, p.url, p.description,
                   p.published_at, p.feed_id, f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            WHERE f.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PostListing {
                post: row.post.into_post(),
                feed_name: row.feed_name,
            })
            .collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl NewPost {
    /// A post for `feed_id` with a fresh id, stamped now, no description or publish date.
    pub fn new(feed_id: Uuid, title: &str, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: title.to_string(),
            url: url.to_string(),
            description: None,
            published_at: None,
            feed_id,
        }
    }
}
