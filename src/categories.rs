// 🏷️ Category Rules - category catalogue and vitality deltas as data
//
// The categorizer is a collaborator of the engine: it turns a category label
// into (health, happiness) deltas. The engine never looks inside.

use serde::{Deserialize, Serialize};

pub const OTHER_CATEGORY: &str = "other";

// ============================================================================
// CATEGORY DELTA
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub health: i32,
    pub happiness: i32,
}

impl CategoryDelta {
    pub const fn new(health: i32, happiness: i32) -> Self {
        CategoryDelta { health, happiness }
    }
}

impl std::ops::Add for CategoryDelta {
    type Output = CategoryDelta;

    fn add(self, other: CategoryDelta) -> CategoryDelta {
        CategoryDelta {
            health: self.health.saturating_add(other.health),
            happiness: self.happiness.saturating_add(other.happiness),
        }
    }
}

impl std::iter::Sum for CategoryDelta {
    fn sum<I: Iterator<Item = CategoryDelta>>(iter: I) -> CategoryDelta {
        iter.fold(CategoryDelta::default(), |acc, d| acc + d)
    }
}

// ============================================================================
// STAT RULES
// ============================================================================

/// (label, health, happiness) in catalogue order
const STAT_RULES: &[(&str, i32, i32)] = &[
    ("healthy food, vegetables and fruits", 10, 5),
    ("unhealthy food, snacks", -10, -10),
    ("drinks alcoholic", -20, -10),
    ("drinks nonalcoholic", -5, 5),
    ("grocery", 0, 0),
    ("hygiene and cosmetics", 10, 0),
    ("medicines and health", 10, 0),
    ("clothing and shoes", 0, 0),
    ("toys, fun, entertainment", 0, 10),
    ("home and furniture", 0, 5),
    ("electronics and technology", -5, 5),
    ("transportation and fuel", 0, 0),
    ("books, education and stationery", 5, 10),
    ("sports and outdoor", 5, 5),
    ("pet care", 0, 0),
    ("garden and plants", 0, 0),
    ("home maintenance and repairs", 0, 0),
    ("services and subscriptions", 0, 0),
    ("restaurants and dining out", 0, 5),
    ("travel and accommodation", 0, 5),
    ("events and tickets", 0, 5),
    ("gifts and special occasions", 0, 5),
    ("beauty and personal care services", 5, 0),
    ("jewelry and accessories", 0, 5),
    ("baby and child care", 0, 0),
    (OTHER_CATEGORY, 0, 0),
];

/// All known category labels
pub fn categories() -> Vec<&'static str> {
    STAT_RULES.iter().map(|(label, _, _)| *label).collect()
}

/// Map free-form category text onto a catalogue label
///
/// Exact match first, then substring in either direction, else "other".
pub fn normalize_category(input: &str) -> &'static str {
    let lower = input.trim().to_lowercase();
    if lower.is_empty() {
        return OTHER_CATEGORY;
    }

    if let Some((label, _, _)) = STAT_RULES.iter().find(|(label, _, _)| *label == lower) {
        return label;
    }

    STAT_RULES
        .iter()
        .find(|(label, _, _)| label.contains(lower.as_str()) || lower.contains(label))
        .map(|(label, _, _)| *label)
        .unwrap_or(OTHER_CATEGORY)
}

// ============================================================================
// CATEGORIZER
// ============================================================================

pub trait Categorizer {
    /// Deltas for one category label; unknown labels are neutral
    fn deltas(&self, category: &str) -> CategoryDelta;
}

/// Fixed table of per-category deltas
#[derive(Debug, Clone, Default)]
pub struct StatRuleTable;

impl StatRuleTable {
    pub fn new() -> Self {
        StatRuleTable
    }
}

impl Categorizer for StatRuleTable {
    fn deltas(&self, category: &str) -> CategoryDelta {
        STAT_RULES
            .iter()
            .find(|(label, _, _)| *label == category)
            .map(|(_, health, happiness)| CategoryDelta::new(*health, *happiness))
            .unwrap_or_default()
    }
}
