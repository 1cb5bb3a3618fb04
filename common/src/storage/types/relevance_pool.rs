use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

stored_object!(RelevancePoolEntry, "relevance_pool_entry", {
    context_id: String,
    candidate_id: String,
    /// Metadata match score in [0, 1]; see the pool builder weights.
    relevance_score: f32,
    matched_brand: bool,
    matched_category: bool,
    matched_price_range: bool
});

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    #[allow(dead_code)]
    id: String,
}

impl RelevancePoolEntry {
    pub fn new(
        context_id: String,
        candidate_id: String,
        relevance_score: f32,
        matched_brand: bool,
        matched_category: bool,
        matched_price_range: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            context_id,
            candidate_id,
            relevance_score,
            matched_brand,
            matched_category,
            matched_price_range,
        }
    }

    /// Pool entries for a context, best first.
    pub async fn load_for_context(
        context_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db_client
            .query(
                "SELECT * FROM type::table($table) WHERE context_id = $context_id \
                 ORDER BY relevance_score DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("context_id", context_id.to_owned()))
            .await?;
        let entries: Vec<Self> = response.take(0)?;
        Ok(entries)
    }

    pub async fn exists_for_context(
        context_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<bool, AppError> {
        let mut response = db_client
            .query("SELECT id FROM type::table($table) WHERE context_id = $context_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("context_id", context_id.to_owned()))
            .await?;
        let rows: Vec<IdRow> = response.take(0)?;
        Ok(!rows.is_empty())
    }

    /// First half of the delete-then-insert pool recompute.
    pub async fn delete_for_context(
        context_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .query(format!(
                "DELETE {} WHERE context_id = $context_id",
                Self::table_name()
            ))
            .bind(("context_id", context_id.to_owned()))
            .await?;
        Ok(())
    }
}
