use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

/// Content pool a document belongs to. Each pool is ingested and searched
/// as its own partition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Comment,
    Transcript,
    Product,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Comment => "comment",
            SourceType::Transcript => "transcript",
            SourceType::Product => "product",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "comment" => Ok(Self::Comment),
            "transcript" => Ok(Self::Transcript),
            "product" => Ok(Self::Product),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source metadata. A tagged variant rather than a loose map so that
/// downstream stages can rely on the shape matching the source type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentMetadata {
    Comment {
        video_id: String,
        author: Option<String>,
    },
    Transcript {
        video_id: String,
        title: String,
        language: Option<String>,
    },
    Product {
        brand: String,
        category: String,
        price: Option<f64>,
        tags: Vec<String>,
        canonical_url: String,
        display_name: String,
    },
}

impl DocumentMetadata {
    pub fn source_type(&self) -> SourceType {
        match self {
            DocumentMetadata::Comment { .. } => SourceType::Comment,
            DocumentMetadata::Transcript { .. } => SourceType::Transcript,
            DocumentMetadata::Product { .. } => SourceType::Product,
        }
    }

    /// Price carried by product metadata, if any.
    pub fn price(&self) -> Option<f64> {
        match self {
            DocumentMetadata::Product { price, .. } => *price,
            _ => None,
        }
    }
}

stored_object!(SourceDocument, "source_document", {
    source_type: SourceType,
    source_id: String,
    metadata: DocumentMetadata
});

impl SourceDocument {
    pub fn new(source_type: SourceType, source_id: String, metadata: DocumentMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_type,
            source_id,
            metadata,
        }
    }

    /// Looks a document up by its `(source_type, source_id)` natural key.
    pub async fn find_by_natural_key(
        source_type: SourceType,
        source_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db_client
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE source_type = $source_type AND source_id = $source_id \
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_type", source_type))
            .bind(("source_id", source_id.to_owned()))
            .await?;

        let documents: Vec<Self> = response.take(0)?;
        Ok(documents.into_iter().next())
    }

    pub async fn delete_by_natural_key(
        source_type: SourceType,
        source_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .query(format!(
                "DELETE {} WHERE source_type = $source_type AND source_id = $source_id",
                Self::table_name()
            ))
            .bind(("source_type", source_type))
            .bind(("source_id", source_id.to_owned()))
            .await?;

        Ok(())
    }
}
