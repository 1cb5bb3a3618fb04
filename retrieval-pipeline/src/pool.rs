use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            catalog_item::CatalogItem, relevance_pool::RelevancePoolEntry,
            video_context::VideoContext, StoredObject,
        },
    },
    utils::batch::BatchReport,
};
use tracing::{debug, info, instrument, warn};

use crate::prefilter::{self, ContextSignals, PrefilterOptions};

/// Default number of contexts handled per batch in a full rebuild.
pub const DEFAULT_REBUILD_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolBuildOutcome {
    /// Pool recomputed; carries the entry count.
    Built { entries: usize },
    /// A pool already existed and overwrite was not requested.
    Skipped,
    /// The context does not exist; an explicit empty outcome, not an error.
    ContextMissing,
}

/// Precomputes the capped, scored candidate subset for each context. The
/// pool amortizes a full catalog scan into a bounded id set reused across
/// queries; it is only as fresh as its last explicit recompute.
pub struct RelevancePoolBuilder {
    db: Arc<SurrealDbClient>,
    options: PrefilterOptions,
}

impl RelevancePoolBuilder {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self {
            db,
            options: PrefilterOptions::default(),
        }
    }

    pub fn with_options(db: Arc<SurrealDbClient>, options: PrefilterOptions) -> Self {
        Self { db, options }
    }

    /// Recomputes one context's pool as delete-then-insert. Skips work when a
    /// pool already exists unless `overwrite` is set. Concurrent recomputes
    /// for the same context are last-writer-wins.
    #[instrument(skip_all, fields(context_id = %context_id, overwrite))]
    pub async fn build_for_context(
        &self,
        context_id: &str,
        overwrite: bool,
    ) -> Result<PoolBuildOutcome, AppError> {
        let Some(context) = self.db.get_item::<VideoContext>(context_id).await? else {
            info!("context not found; yielding empty pool outcome");
            return Ok(PoolBuildOutcome::ContextMissing);
        };

        if !overwrite && RelevancePoolEntry::exists_for_context(context_id, &self.db).await? {
            debug!("pool already present; skipping recompute");
            return Ok(PoolBuildOutcome::Skipped);
        }

        let universe = CatalogItem::list_recommendable(&self.db).await?;
        let universe_size = universe.len();
        let signals = ContextSignals::from(&context);
        let scored = prefilter::run(&signals, universe, &self.options);

        RelevancePoolEntry::delete_for_context(context_id, &self.db).await?;

        let entry_count = scored.len();
        for (item, score) in scored {
            let entry = RelevancePoolEntry::new(
                context_id.to_owned(),
                item.id.clone(),
                score.score,
                score.matched_brand,
                score.matched_category,
                score.matched_price_range,
            );
            self.db.store_item(entry).await?;
        }

        info!(
            universe_size,
            entry_count, "relevance pool recomputed"
        );
        Ok(PoolBuildOutcome::Built {
            entries: entry_count,
        })
    }

    /// Recomputes pools for every context, sequentially in bounded batches.
    /// Item failures are logged and sampled; the run keeps going.
    #[instrument(skip_all, fields(overwrite, batch_size))]
    pub async fn rebuild_all(
        &self,
        overwrite: bool,
        batch_size: usize,
    ) -> Result<BatchReport, AppError> {
        let batch_size = batch_size.max(1);
        let contexts: Vec<VideoContext> = self.db.get_all_stored_items().await?;
        let total = contexts.len();
        info!(total, "starting full pool rebuild");

        let mut report = BatchReport::default();
        for batch in contexts.chunks(batch_size) {
            for context in batch {
                match self.build_for_context(context.get_id(), overwrite).await {
                    Ok(_) => report.record_success(),
                    Err(err) => {
                        warn!(context_id = %context.get_id(), error = %err, "pool rebuild failed");
                        report.record_failure(err);
                    }
                }
            }
            debug!(processed = report.processed, total, "pool rebuild batch done");
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "pool rebuild finished"
        );
        Ok(report)
    }

    /// Pool entries for a context, best first.
    pub async fn load_pool(&self, context_id: &str) -> Result<Vec<RelevancePoolEntry>, AppError> {
        RelevancePoolEntry::load_for_context(context_id, &self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::video_context::PriceRange;
    use uuid::Uuid;

    async fn setup_db() -> Arc<SurrealDbClient> {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(3)
            .await
            .expect("Failed to initialize schema");
        Arc::new(db)
    }

    fn context() -> VideoContext {
        VideoContext::new(
            "vid-1".into(),
            "Budget gaming notebooks".into(),
            vec!["notebook".into()],
            vec!["asus".into()],
            Some(PriceRange::new(10_000.0, 20_000.0)),
            vec!["gaming".into()],
        )
    }

    fn catalog_item(external_id: &str, price: f64, tags: &[&str]) -> CatalogItem {
        CatalogItem::new(
            external_id.to_owned(),
            format!("Item {external_id}"),
            "Asus".into(),
            "notebook".into(),
            Some(price),
            tags.iter().map(|tag| (*tag).to_owned()).collect(),
            format!("https://shop.example/{external_id}"),
            true,
        )
    }

    #[tokio::test]
    async fn build_skip_and_overwrite() {
        let db = setup_db().await;
        let context = context();
        db.store_item(context.clone()).await.expect("store context");
        db.store_item(catalog_item("p1", 15_000.0, &["gaming"]))
            .await
            .expect("store item");

        let builder = RelevancePoolBuilder::new(Arc::clone(&db));

        let outcome = builder
            .build_for_context(&context.id, false)
            .await
            .expect("build failed");
        assert_eq!(outcome, PoolBuildOutcome::Built { entries: 1 });

        // Second build without overwrite is skipped.
        let outcome = builder
            .build_for_context(&context.id, false)
            .await
            .expect("build failed");
        assert_eq!(outcome, PoolBuildOutcome::Skipped);

        // Overwrite recomputes delete-then-insert.
        db.store_item(catalog_item("p2", 16_000.0, &["gaming"]))
            .await
            .expect("store item");
        let outcome = builder
            .build_for_context(&context.id, true)
            .await
            .expect("build failed");
        assert_eq!(outcome, PoolBuildOutcome::Built { entries: 2 });

        let entries = builder.load_pool(&context.id).await.expect("load pool");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].relevance_score >= entries[1].relevance_score);
    }

    #[tokio::test]
    async fn missing_context_short_circuits() {
        let db = setup_db().await;
        let builder = RelevancePoolBuilder::new(db);
        let outcome = builder
            .build_for_context("does-not-exist", true)
            .await
            .expect("build should not error");
        assert_eq!(outcome, PoolBuildOutcome::ContextMissing);
    }

    #[tokio::test]
    async fn pool_size_never_exceeds_cap() {
        let db = setup_db().await;
        let context = context();
        db.store_item(context.clone()).await.expect("store context");
        for index in 0..8 {
            db.store_item(catalog_item(&format!("p{index}"), 15_000.0, &["gaming"]))
                .await
                .expect("store item");
        }

        let builder = RelevancePoolBuilder::with_options(
            Arc::clone(&db),
            PrefilterOptions {
                min_score: 0.1,
                max_candidates: 5,
            },
        );
        let outcome = builder
            .build_for_context(&context.id, true)
            .await
            .expect("build failed");
        assert_eq!(outcome, PoolBuildOutcome::Built { entries: 5 });

        let entries = builder.load_pool(&context.id).await.expect("load pool");
        assert_eq!(entries.len(), 5, "pool must honor the configured cap");
    }

    #[tokio::test]
    async fn empty_metadata_context_builds_empty_pool() {
        let db = setup_db().await;
        let bare = VideoContext::new(
            "vid-bare".into(),
            "Untagged upload".into(),
            Vec::new(),
            Vec::new(),
            None,
            Vec::new(),
        );
        db.store_item(bare.clone()).await.expect("store context");
        db.store_item(catalog_item("p1", 15_000.0, &["gaming"]))
            .await
            .expect("store item");

        let builder = RelevancePoolBuilder::new(Arc::clone(&db));
        let outcome = builder
            .build_for_context(&bare.id, true)
            .await
            .expect("build failed");
        assert_eq!(outcome, PoolBuildOutcome::Built { entries: 0 });
        assert!(builder
            .load_pool(&bare.id)
            .await
            .expect("load pool")
            .is_empty());
    }

    #[tokio::test]
    async fn rebuild_all_reports_per_context() {
        let db = setup_db().await;
        db.store_item(context()).await.expect("store context");
        let second = VideoContext::new(
            "vid-2".into(),
            "Peripherals".into(),
            vec!["keyboard".into()],
            Vec::new(),
            None,
            vec!["mechanical".into()],
        );
        db.store_item(second).await.expect("store context");
        db.store_item(catalog_item("p1", 15_000.0, &["gaming"]))
            .await
            .expect("store item");

        let builder = RelevancePoolBuilder::new(db);
        let report = builder.rebuild_all(true, 1).await.expect("rebuild failed");
        assert!(report.is_success());
        assert_eq!(report.processed, 2);
    }
}
