use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the `Loot` sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootItem {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub max_qty: u32,
    pub scarcity: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<LootItem>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<LootItem>) -> Self {
        let mut kept: Vec<LootItem> = Vec::with_capacity(items.len());
        let mut index = HashMap::new();
        for mut item in items {
            item.name = item.name.trim().to_string();
            if index.contains_key(&item.name) {
                continue;
            }
            index.insert(item.name.clone(), kept.len());
            kept.push(item);
        }
        Self { items: kept, index }
    }

    pub fn get(&self, name: &str) -> Option<&LootItem> {
        self.index.get(name.trim()).map(|&i| &self.items[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name.trim())
    }

    pub fn items(&self) -> &[LootItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One row of the `Loot box sizes` sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRule {
    pub name: String,
    pub max_items: u32,
    pub min_value: f64,
    pub max_value: f64,
    pub min_scarcity: u32,
    pub max_scarcity: u32,
}

impl BoxRule {
    /// Bounds are inclusive and apply to the item's unit value.
    pub fn admits(&self, item: &LootItem) -> bool {
        item.scarcity >= self.min_scarcity
            && item.scarcity <= self.max_scarcity
            && item.value >= self.min_value
            && item.value <= self.max_value
    }
}

/// A `Rarity | Item | Qty | Value | Weight` row, used for both rolled boxes
/// and aggregated inventories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootLine {
    pub scarcity: u32,
    pub item: String,
    pub qty: u32,
    pub value: f64,
    pub weight: f64,
}

impl LootLine {
    pub fn for_item(item: &LootItem, qty: u32) -> Self {
        Self {
            scarcity: item.scarcity,
            item: item.name.clone(),
            qty,
            value: round1(item.value * f64::from(qty)),
            weight: round1(item.weight * f64::from(qty)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LootTotals {
    pub value: f64,
    pub weight: f64,
}

impl LootTotals {
    pub fn of(lines: &[LootLine]) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            value: acc.value + line.value,
            weight: acc.weight + line.weight,
        })
    }

    pub fn weight_label(&self) -> String {
        format!("Total Weight: {:.1}", self.weight)
    }

    pub fn value_label(&self) -> String {
        format!("Total Value: {:.1}", self.value)
    }
}

/// Rounds to one decimal place, halves to even.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round_ties_even() / 10.0
}
