use std::collections::BTreeSet;

use common::storage::types::video_context::PriceRange;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Broad purpose of the purchase. First matching vocabulary wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    Gaming,
    Work,
    Study,
    Editing,
    Programming,
}

/// Hardware category mentioned in the comment. Several may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Notebook,
    Desktop,
    Cpu,
    Gpu,
    Ram,
    Storage,
    Monitor,
    Keyboard,
    Mouse,
    Headset,
}

impl ComponentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentCategory::Notebook => "notebook",
            ComponentCategory::Desktop => "desktop",
            ComponentCategory::Cpu => "cpu",
            ComponentCategory::Gpu => "gpu",
            ComponentCategory::Ram => "ram",
            ComponentCategory::Storage => "storage",
            ComponentCategory::Monitor => "monitor",
            ComponentCategory::Keyboard => "keyboard",
            ComponentCategory::Mouse => "mouse",
            ComponentCategory::Headset => "headset",
        }
    }
}

/// Signals derived from one free-text comment. Request-scoped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryIntent {
    pub brands: BTreeSet<String>,
    pub price_range: Option<PriceRange>,
    pub usage_category: Option<UsageCategory>,
    pub component_categories: BTreeSet<ComponentCategory>,
    pub tags: BTreeSet<String>,
}

impl QueryIntent {
    /// Single budget figure for the price re-ranker. A pure ceiling
    /// ("no more than N") uses the ceiling itself, otherwise the midpoint.
    pub fn budget(&self) -> Option<f64> {
        self.price_range.map(|range| {
            if range.min == 0.0 && range.max > 0.0 {
                range.max
            } else {
                range.midpoint()
            }
        })
    }
}

// Literal price patterns in priority order; the first hit wins. Thousands
// separators are stripped before matching.
static PRICE_PATTERNS: Lazy<Vec<(PricePattern, Regex)>> = Lazy::new(|| {
    vec![
        (
            PricePattern::Thousands,
            Regex::new(r"(\d+)[kK]\b").expect("static regex compiles"),
        ),
        (
            PricePattern::Point,
            Regex::new(r"(\d+)\s*(?:บาท|baht)").expect("static regex compiles"),
        ),
        (
            PricePattern::Point,
            Regex::new(r"(?:งบ|budget)\s*(\d+)").expect("static regex compiles"),
        ),
        (
            PricePattern::Point,
            Regex::new(r"(?:ราคา|price)\s*(\d+)").expect("static regex compiles"),
        ),
        (
            PricePattern::Ceiling,
            Regex::new(r"(?:ไม่เกิน|under|no more than)\s*(\d+)").expect("static regex compiles"),
        ),
        (
            PricePattern::Point,
            Regex::new(r"(?:ประมาณ|around|about)\s*(\d+)").expect("static regex compiles"),
        ),
        (
            PricePattern::Point,
            Regex::new(r"\$\s?(\d+)").expect("static regex compiles"),
        ),
    ]
});

#[derive(Debug, Clone, Copy)]
enum PricePattern {
    /// `40K` style shorthand, multiplied by 1000.
    Thousands,
    /// Exact budget figure.
    Point,
    /// "Not exceeding N": everything from zero up to N.
    Ceiling,
}

static USAGE_VOCABULARY: &[(UsageCategory, &[&str])] = &[
    (UsageCategory::Gaming, &["เล่นเกม", "เกมมิ่ง", "เกม", "gaming", "game"]),
    (UsageCategory::Work, &["ทำงาน", "ออฟฟิศ", "work", "office"]),
    (UsageCategory::Study, &["เรียน", "นักศึกษา", "study", "school", "student"]),
    (
        UsageCategory::Editing,
        &["ตัดต่อ", "แต่งรูป", "editing", "premiere", "photoshop"],
    ),
    (
        UsageCategory::Programming,
        &["เขียนโปรแกรม", "เขียนโค้ด", "โค้ดดิ้ง", "programming", "coding"],
    ),
];

static COMPONENT_VOCABULARY: &[(ComponentCategory, &[&str])] = &[
    (
        ComponentCategory::Notebook,
        &["โน้ตบุ๊ค", "โน๊ตบุ๊ค", "โน้ตบุ๊ก", "notebook", "laptop"],
    ),
    (
        ComponentCategory::Desktop,
        &["คอมประกอบ", "เดสก์ท็อป", "desktop", "pc build"],
    ),
    (ComponentCategory::Cpu, &["ซีพียู", "cpu", "ryzen", "core i"]),
    (
        ComponentCategory::Gpu,
        &["การ์ดจอ", "gpu", "graphics card", "rtx", "radeon"],
    ),
    (ComponentCategory::Ram, &["แรม", "ram", "memory"]),
    (
        ComponentCategory::Storage,
        &["ฮาร์ดดิสก์", "เอสเอสดี", "ssd", "harddisk", "nvme"],
    ),
    (ComponentCategory::Monitor, &["จอมอนิเตอร์", "หน้าจอ", "monitor"]),
    (ComponentCategory::Keyboard, &["คีย์บอร์ด", "keyboard"]),
    (ComponentCategory::Mouse, &["เมาส์", "mouse"]),
    (ComponentCategory::Headset, &["หูฟัง", "headset", "headphone"]),
];

/// Parses free text into structured retrieval signals. `known_brands` is the
/// brand vocabulary taken from the catalog.
pub fn extract_intent(text: &str, known_brands: &[String]) -> QueryIntent {
    let lowered = text.to_lowercase();
    let mut intent = QueryIntent {
        price_range: parse_price(&lowered),
        ..QueryIntent::default()
    };

    for brand in known_brands {
        let brand_lowered = brand.to_lowercase();
        if !brand_lowered.is_empty() && lowered.contains(&brand_lowered) {
            intent.brands.insert(brand_lowered.clone());
            intent.tags.insert(brand_lowered);
        }
    }

    for (category, keywords) in USAGE_VOCABULARY {
        if let Some(keyword) = keywords.iter().find(|keyword| lowered.contains(*keyword)) {
            intent.usage_category = Some(*category);
            intent.tags.insert((*keyword).to_owned());
            break;
        }
    }

    for (category, keywords) in COMPONENT_VOCABULARY {
        if let Some(keyword) = keywords.iter().find(|keyword| lowered.contains(*keyword)) {
            intent.component_categories.insert(*category);
            intent.tags.insert((*keyword).to_owned());
        }
    }

    intent
}

/// Literal price detection. Patterns run in priority order against the text
/// with thousands separators removed; the first match wins.
pub fn parse_price(text: &str) -> Option<PriceRange> {
    let stripped = text.replace(',', "");

    for (kind, pattern) in PRICE_PATTERNS.iter() {
        let Some(captures) = pattern.captures(&stripped) else {
            continue;
        };
        let Some(amount) = captures.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
            continue;
        };

        return Some(match kind {
            PricePattern::Thousands => {
                let value = amount * 1000.0;
                PriceRange::new(value, value)
            }
            PricePattern::Point => PriceRange::new(amount, amount),
            PricePattern::Ceiling => PriceRange::new(0.0, amount),
        });
    }

    None
}
