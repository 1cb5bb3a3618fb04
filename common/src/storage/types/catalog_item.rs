use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

stored_object!(CatalogItem, "catalog_item", {
    /// Natural key assigned by the upstream catalog ingestion job.
    external_id: String,
    display_name: String,
    brand: String,
    category: String,
    price: Option<f64>,
    tags: Vec<String>,
    canonical_url: String,
    /// Only recommendable items enter relevance pools and candidate pools.
    recommendable: bool
});

#[derive(Debug, Deserialize)]
struct BrandRow {
    brand: String,
}

impl CatalogItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        external_id: String,
        display_name: String,
        brand: String,
        category: String,
        price: Option<f64>,
        tags: Vec<String>,
        canonical_url: String,
        recommendable: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            external_id,
            display_name,
            brand,
            category,
            price,
            tags,
            canonical_url,
            recommendable,
        }
    }

    /// The candidate universe: every item flagged eligible for
    /// recommendation.
    pub async fn list_recommendable(db_client: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db_client
            .query("SELECT * FROM type::table($table) WHERE recommendable = true")
            .bind(("table", Self::table_name()))
            .await?;
        let items: Vec<Self> = response.take(0)?;
        Ok(items)
    }

    /// Distinct brand names across recommendable items, used as the known
    /// brand vocabulary for query intent extraction.
    pub async fn distinct_brands(db_client: &SurrealDbClient) -> Result<Vec<String>, AppError> {
        let mut response = db_client
            .query(
                "SELECT brand FROM type::table($table) \
                 WHERE recommendable = true GROUP BY brand",
            )
            .bind(("table", Self::table_name()))
            .await?;
        let rows: Vec<BrandRow> = response.take(0)?;
        Ok(rows.into_iter().map(|row| row.brand).collect())
    }

    pub async fn get_many(
        ids: &[String],
        db_client: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();

        let mut response = db_client
            .query("SELECT * FROM type::table($table) WHERE id IN $things")
            .bind(("table", Self::table_name()))
            .bind(("things", things))
            .await?;
        let items: Vec<Self> = response.take(0)?;
        Ok(items)
    }
}
