//! Content items produced by the external ingestion pipeline. Read-only
//! from this crate's perspective, except for dev mocks.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::{Collectable, Identifiable};
use crate::{Database, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentItem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,

    /// Channel label, the voice this item belongs to.
    pub channel: String,
    pub description: Option<String>,

    /// Popularity score at ingestion time.
    pub views: u64,

    pub ingested_at: DateTime<Utc>,
}

impl Default for ContentItem {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            url: String::new(),
            thumbnail: None,
            channel: String::new(),
            description: None,
            views: 0,
            ingested_at: Utc::now(),
        }
    }
}

impl Collectable for ContentItem {
    fn get_collection_name() -> &'static str {
        "contents"
    }
}

impl Identifiable for ContentItem {
    fn get_id(&self) -> Uuid {
        self.id
    }
}

/// Recency-windowed content pool for a dispatch, most popular first,
/// bounded to `cap` items.
pub fn eligible_pool(db: &Database, window_hours: i64, cap: usize) -> Result<Vec<ContentItem>> {
    let cutoff = Utc::now() - Duration::hours(window_hours);
    let mut pool: Vec<ContentItem> = db
        .get_collection::<ContentItem>()?
        .into_iter()
        .filter(|item| item.ingested_at > cutoff)
        .collect();
    pool.sort_by(|a, b| b.views.cmp(&a.views));
    pool.truncate(cap);
    Ok(pool)
}

/// Slice of the pool served on the public feed.
pub fn public_feed(db: &Database, window_hours: i64, limit: usize) -> Result<Vec<ContentItem>> {
    eligible_pool(db, window_hours, limit)
}
