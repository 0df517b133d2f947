use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::feed::{parse_timestamp, RawFeedDocument, RawItem};
use crate::storage::{FeedStore, NewPost};

/// Per-document ingestion tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Items in the document
    pub total: usize,
    /// New posts stored
    pub inserted: usize,
    /// Items whose link was already stored
    pub duplicates: usize,
    /// Items whose insert failed for any other reason
    pub failed: usize,
    /// Items without a usable link
    pub skipped: usize,
}

/// Store every item of `doc` as a post of `feed_id`, in document order.
///
/// Never fails as a whole: duplicate links are counted and skipped quietly,
/// other storage errors are logged per item and processing moves on.
pub async fn ingest_document<S: FeedStore>(
    store: &S,
    feed_id: Uuid,
    doc: &RawFeedDocument,
    now: DateTime<Utc>,
) -> IngestReport {
    let mut report = IngestReport {
        total: doc.channel.items.len(),
        ..IngestReport::default()
    };

    for item in &doc.channel.items {
        let Some(post) = normalize_item(item, feed_id, now) else {
            tracing::debug!(title = %item.title.trim(), "Item has no link, skipping");
            report.skipped += 1;
            continue;
        };

        match store.insert_post(&post).await {
            Ok(()) => report.inserted += 1,
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(link = %post.url, "Post already stored");
                report.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(
                    title = %post.title,
                    link = %post.url,
                    error = %e,
                    "Failed to save post"
                );
                report.failed += 1;
            }
        }
    }

    report
}

/// Turn a raw item into insert parameters, or `None` if it has no link.
pub(crate) fn normalize_item(item: &RawItem, feed_id: Uuid, now: DateTime<Utc>) -> Option<NewPost> {
    let url = item.link.trim();
    if url.is_empty() {
        return None;
    }

    let description = item.description.trim();
    let pub_date = item.pub_date.trim();
    let published_at = if pub_date.is_empty() {
        None
    } else {
        match parse_timestamp(pub_date) {
            Ok(at) => Some(at),
            Err(e) => {
                tracing::debug!(error = %e, link = %url, "Ignoring unparseable pubDate");
                None
            }
        }
    };

    Some(NewPost {
        id: Uuid::new_v4(),
        created_at: now,
        title: item.title.trim().to_string(),
        url: url.to_string(),
        description: (!description.is_empty()).then(|| description.to_string()),
        published_at,
        feed_id,
    })
}
