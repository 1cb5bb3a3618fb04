use std::cmp::Ordering;
use std::collections::BTreeSet;

use common::storage::types::{
    catalog_item::CatalogItem,
    video_context::{PriceRange, VideoContext},
};

/// Weight of each structured signal in the candidate score.
pub const TAG_WEIGHT: f32 = 0.4;
pub const CATEGORY_WEIGHT: f32 = 0.3;
pub const PRICE_WEIGHT: f32 = 0.2;
pub const BRAND_WEIGHT: f32 = 0.1;

/// Fraction applied on both sides of an item price to build its band before
/// testing overlap with the context range.
pub const PRICE_BAND_FRACTION: f64 = 0.10;

pub const DEFAULT_MIN_SCORE: f32 = 0.1;
pub const DEFAULT_MAX_CANDIDATES: usize = 200;

/// Structured signals a context contributes to candidate filtering.
#[derive(Debug, Clone, Default)]
pub struct ContextSignals {
    pub category_tags: Vec<String>,
    pub brand_tags: Vec<String>,
    pub price_range: Option<PriceRange>,
    pub tags: Vec<String>,
}

impl ContextSignals {
    pub fn is_empty(&self) -> bool {
        self.category_tags.is_empty()
            && self.brand_tags.is_empty()
            && self.price_range.is_none()
            && self.tags.is_empty()
    }
}

impl From<&VideoContext> for ContextSignals {
    fn from(context: &VideoContext) -> Self {
        Self {
            category_tags: context.category_tags.clone(),
            brand_tags: context.brand_tags.clone(),
            price_range: context.price_range,
            tags: context.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub score: f32,
    pub matched_brand: bool,
    pub matched_category: bool,
    pub matched_price_range: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PrefilterOptions {
    pub min_score: f32,
    pub max_candidates: usize,
}

impl Default for PrefilterOptions {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

/// Scores one candidate against the context's structured signals:
/// `0.4·tagOverlap + 0.3·categoryMatch + 0.2·priceOverlap + 0.1·brandMatch`.
pub fn score_candidate(signals: &ContextSignals, item: &CatalogItem) -> CandidateScore {
    let context_tags: BTreeSet<String> =
        signals.tags.iter().map(|tag| tag.to_lowercase()).collect();
    let tag_overlap_ratio = if context_tags.is_empty() {
        0.0
    } else {
        let matched = item
            .tags
            .iter()
            .filter(|tag| context_tags.contains(&tag.to_lowercase()))
            .count();
        matched as f32 / context_tags.len() as f32
    };

    let category = item.category.to_lowercase();
    let matched_category = signals
        .category_tags
        .iter()
        .any(|tag| tag.to_lowercase() == category);

    let brand = item.brand.to_lowercase();
    let matched_brand = signals
        .brand_tags
        .iter()
        .any(|tag| tag.to_lowercase() == brand);

    let matched_price_range = match (signals.price_range, item.price) {
        (Some(range), Some(price)) if price > 0.0 => {
            let band = PriceRange::new(
                price * (1.0 - PRICE_BAND_FRACTION),
                price * (1.0 + PRICE_BAND_FRACTION),
            );
            band.overlaps(&range)
        }
        _ => false,
    };

    let score = TAG_WEIGHT * tag_overlap_ratio
        + CATEGORY_WEIGHT * unit(matched_category)
        + PRICE_WEIGHT * unit(matched_price_range)
        + BRAND_WEIGHT * unit(matched_brand);

    CandidateScore {
        score,
        matched_brand,
        matched_category,
        matched_price_range,
    }
}

fn unit(matched: bool) -> f32 {
    if matched {
        1.0
    } else {
        0.0
    }
}

/// Scores the whole universe, drops weak candidates, sorts descending and
/// truncates to the configured cap.
pub fn run(
    signals: &ContextSignals,
    universe: Vec<CatalogItem>,
    options: &PrefilterOptions,
) -> Vec<(CatalogItem, CandidateScore)> {
    let mut scored: Vec<(CatalogItem, CandidateScore)> = universe
        .into_iter()
        .map(|item| {
            let score = score_candidate(signals, &item);
            (item, score)
        })
        .filter(|(_, score)| score.score >= options.min_score)
        .collect();

    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(options.max_candidates);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> ContextSignals {
        ContextSignals {
            category_tags: vec!["notebook".into()],
            brand_tags: vec!["asus".into()],
            price_range: Some(PriceRange::new(10_000.0, 20_000.0)),
            tags: vec!["gaming".into(), "budget".into()],
        }
    }

    fn item(external_id: &str, brand: &str, category: &str, price: f64, tags: &[&str]) -> CatalogItem {
        CatalogItem::new(
            external_id.to_owned(),
            format!("{brand} {category}"),
            brand.to_owned(),
            category.to_owned(),
            Some(price),
            tags.iter().map(|tag| (*tag).to_owned()).collect(),
            format!("https://shop.example/{external_id}"),
            true,
        )
    }

    #[test]
    fn full_match_scores_every_component() {
        let candidate = item("p1", "Asus", "Notebook", 15_000.0, &["gaming", "budget"]);
        let scored = score_candidate(&signals(), &candidate);

        assert!(scored.matched_brand);
        assert!(scored.matched_category);
        assert!(scored.matched_price_range);
        // 0.4·1.0 + 0.3 + 0.2 + 0.1
        assert!((scored.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn partial_tag_overlap_is_proportional() {
        let candidate = item("p1", "Lenovo", "mouse", 500.0, &["gaming"]);
        let scored = score_candidate(&signals(), &candidate);

        assert!(!scored.matched_brand);
        assert!(!scored.matched_category);
        assert!(!scored.matched_price_range);
        // one of two context tags matched
        assert!((scored.score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn no_context_tags_means_zero_overlap_ratio() {
        let mut no_tag_signals = signals();
        no_tag_signals.tags.clear();
        let candidate = item("p1", "Asus", "notebook", 15_000.0, &["gaming"]);
        let scored = score_candidate(&no_tag_signals, &candidate);
        // 0.3 + 0.2 + 0.1 without any tag contribution
        assert!((scored.score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn price_band_must_intersect_context_range() {
        // 10% band around 9,200 reaches 10,120, inside [10k, 20k].
        let close = item("p1", "Acer", "keyboard", 9_200.0, &[]);
        assert!(score_candidate(&signals(), &close).matched_price_range);

        // Band around 8,000 tops out at 8,800, outside the range.
        let far = item("p2", "Acer", "keyboard", 8_000.0, &[]);
        assert!(!score_candidate(&signals(), &far).matched_price_range);

        // Unpriced items never match on price.
        let mut unpriced = item("p3", "Acer", "keyboard", 1.0, &[]);
        unpriced.price = None;
        assert!(!score_candidate(&signals(), &unpriced).matched_price_range);
    }

    #[test]
    fn run_filters_sorts_and_caps() {
        let universe = vec![
            item("strong", "Asus", "notebook", 15_000.0, &["gaming", "budget"]),
            item("medium", "Acer", "notebook", 15_000.0, &["gaming"]),
            item("weak", "Lenovo", "webcam", 99_000.0, &[]),
        ];

        let results = run(&signals(), universe.clone(), &PrefilterOptions::default());
        assert_eq!(results.len(), 2, "weak candidate must be dropped");
        assert_eq!(results[0].0.external_id, "strong");
        assert_eq!(results[1].0.external_id, "medium");

        let capped = run(
            &signals(),
            universe,
            &PrefilterOptions {
                min_score: DEFAULT_MIN_SCORE,
                max_candidates: 1,
            },
        );
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].0.external_id, "strong");
    }
}
