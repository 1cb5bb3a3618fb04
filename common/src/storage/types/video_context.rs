use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

/// Inclusive price band in the catalog currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn overlaps(&self, other: &PriceRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

stored_object!(VideoContext, "video_context", {
    video_id: String,
    title: String,
    /// Structured signals computed by the upstream video analysis job.
    category_tags: Vec<String>,
    brand_tags: Vec<String>,
    price_range: Option<PriceRange>,
    tags: Vec<String>
});

impl VideoContext {
    pub fn new(
        video_id: String,
        title: String,
        category_tags: Vec<String>,
        brand_tags: Vec<String>,
        price_range: Option<PriceRange>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            video_id,
            title,
            category_tags,
            brand_tags,
            price_range,
            tags,
        }
    }

    pub async fn find_by_video_id(
        video_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db_client
            .query("SELECT * FROM type::table($table) WHERE video_id = $video_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("video_id", video_id.to_owned()))
            .await?;
        let contexts: Vec<Self> = response.take(0)?;
        Ok(contexts.into_iter().next())
    }
}
