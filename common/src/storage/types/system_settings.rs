use crate::storage::types::text_chunk::deserialize_flexible_id;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemSettings {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    pub query_model: String,
    pub reply_system_prompt: String,
}

impl SystemSettings {
    pub async fn ensure_initialized(db: &SurrealDbClient) -> Result<Self, AppError> {
        let settings = db.select(("system_settings", "current")).await?;

        if settings.is_none() {
            let created: Option<SystemSettings> = db
                .create(("system_settings", "current"))
                .content(SystemSettings {
                    id: "current".to_string(),
                    embedding_model: "text-embedding-3-small".to_string(),
                    embedding_dimensions: 1536,
                    query_model: "gpt-4o-mini".to_string(),
                    reply_system_prompt:
                        crate::storage::types::system_prompts::DEFAULT_REPLY_SYSTEM_PROMPT
                            .to_string(),
                })
                .await?;

            return created.ok_or(AppError::Validation("Failed to initialize settings".into()));
        };

        settings.ok_or(AppError::Validation("Failed to initialize settings".into()))
    }

    pub async fn get_current(db: &SurrealDbClient) -> Result<Self, AppError> {
        let settings: Option<Self> = db
            .client
            .query("SELECT * FROM type::thing('system_settings', 'current')")
            .await?
            .take(0)?;

        settings.ok_or(AppError::NotFound("System settings not found".into()))
    }

    pub async fn update(db: &SurrealDbClient, changes: Self) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('system_settings', 'current') MERGE $changes RETURN AFTER")
            .bind(("changes", changes))
            .await?
            .take(0)?;

        updated.ok_or(AppError::Validation(
            "Something went wrong updating the settings".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn ensure_initialized_seeds_defaults_once() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let first = SystemSettings::ensure_initialized(&db)
            .await
            .expect("Failed to seed settings");
        assert_eq!(first.embedding_dimensions, 1536);

        let mut changed = first.clone();
        changed.embedding_dimensions = 8;
        SystemSettings::update(&db, changed)
            .await
            .expect("Failed to update settings");

        // A second ensure must not reset the stored values
        let second = SystemSettings::ensure_initialized(&db)
            .await
            .expect("Failed to re-read settings");
        assert_eq!(second.embedding_dimensions, 8);

        let current = SystemSettings::get_current(&db)
            .await
            .expect("Failed to read settings");
        assert_eq!(current.embedding_dimensions, 8);
    }
}
