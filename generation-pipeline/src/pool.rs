use std::collections::HashSet;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{catalog_item::CatalogItem, relevance_pool::RelevancePoolEntry},
    },
};

/// One recommendable item inside a generation call's allow-list.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    pub canonical_url: String,
    pub display_name: String,
    pub price: Option<f64>,
}

impl From<&CatalogItem> for CandidateItem {
    fn from(item: &CatalogItem) -> Self {
        Self {
            id: item.id.clone(),
            canonical_url: item.canonical_url.clone(),
            display_name: item.display_name.clone(),
            price: item.price,
        }
    }
}

/// Ordered allow-list of items eligible for recommendation in a single
/// generation call. Anything outside it is invalid by definition.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    items: Vec<CandidateItem>,
}

impl CandidatePool {
    pub fn from_items(items: Vec<CandidateItem>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        Self { items }
    }

    /// Resolves pool entries against the catalog, preserving entry order and
    /// silently dropping candidates that have left the catalog.
    pub async fn from_pool_entries(
        entries: &[RelevancePoolEntry],
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let ids: Vec<String> = entries
            .iter()
            .map(|entry| entry.candidate_id.clone())
            .collect();
        let items = CatalogItem::get_many(&ids, db).await?;

        let by_id: std::collections::HashMap<&str, &CatalogItem> = items
            .iter()
            .map(|item| (item.id.as_str(), item))
            .collect();

        let ordered = ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|item| CandidateItem::from(*item)))
            .collect();
        Ok(Self::from_items(ordered))
    }

    pub fn items(&self) -> &[CandidateItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    pub fn canonical_url_for(&self, id: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.canonical_url.as_str())
    }

    pub fn allowed_urls(&self) -> HashSet<&str> {
        self.items
            .iter()
            .map(|item| item.canonical_url.as_str())
            .collect()
    }
}
