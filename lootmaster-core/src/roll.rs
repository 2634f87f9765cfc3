use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::catalog::{BoxRule, Catalog, LootItem, LootLine};
use crate::{LootError, Result};

/// Samples `min(max_items, eligible)` distinct catalog items admitted by
/// `rule`, each with a quantity in `1..=max_qty`.
pub fn roll_loot<R: Rng + ?Sized>(rule: &BoxRule, catalog: &Catalog, rng: &mut R) -> Vec<LootLine> {
    let mut eligible: Vec<&LootItem> = catalog
        .items()
        .iter()
        .filter(|item| rule.admits(item))
        .collect();

    let n = (rule.max_items as usize).min(eligible.len());
    let (chosen, _) = eligible.partial_shuffle(rng, n);

    let lines: Vec<LootLine> = chosen
        .iter()
        .map(|item| {
            let qty = rng.gen_range(1..=item.max_qty.max(1));
            LootLine::for_item(item, qty)
        })
        .collect();

    debug!(
        box_name = %rule.name,
        eligible = eligible.len(),
        rolled = lines.len(),
        "rolled loot box"
    );

    lines
}

pub fn roll_box<R: Rng + ?Sized>(
    box_name: &str,
    boxes: &[BoxRule],
    catalog: &Catalog,
    rng: &mut R,
) -> Result<Vec<LootLine>> {
    let rule = boxes
        .iter()
        .find(|b| b.name == box_name.trim())
        .ok_or_else(|| LootError::UnknownBox(box_name.to_string()))?;
    Ok(roll_loot(rule, catalog, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn catalog() -> Catalog {
        let mut items = Vec::new();
        for i in 0..10u32 {
            items.push(LootItem {
                name: format!("Item {i}"),
                value: f64::from(i) * 10.0,
                weight: 0.5,
                max_qty: i + 1,
                scarcity: i % 4,
            });
        }
        Catalog::new(items)
    }

    fn rule(max_items: u32) -> BoxRule {
        BoxRule {
            name: "Chest".to_string(),
            max_items,
            min_value: 10.0,
            max_value: 80.0,
            min_scarcity: 1,
            max_scarcity: 3,
        }
    }

    #[test]
    fn rolls_only_eligible_distinct_items() {
        let catalog = catalog();
        let rule = rule(4);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let lines = roll_loot(&rule, &catalog, &mut rng);
            assert_eq!(lines.len(), 4);
            let names: HashSet<_> = lines.iter().map(|l| l.item.clone()).collect();
            assert_eq!(names.len(), lines.len());
            for line in &lines {
                let item = catalog.get(&line.item).unwrap();
                assert!(rule.admits(item));
                assert!(line.qty >= 1 && line.qty <= item.max_qty);
                assert_eq!(line.value, crate::round1(item.value * f64::from(line.qty)));
            }
        }
    }

    #[test]
    fn caps_at_eligible_count() {
        // Items 1,2,3,5,6,7 have scarcity in 1..=3 and value in 10..=80.
        let lines = roll_loot(&rule(50), &catalog(), &mut StdRng::seed_from_u64(1));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn empty_when_nothing_eligible() {
        let mut r = rule(3);
        r.min_value = 1000.0;
        r.max_value = 2000.0;
        assert!(roll_loot(&r, &catalog(), &mut StdRng::seed_from_u64(1)).is_empty());
    }

    #[test]
    fn zero_max_items_rolls_nothing() {
        assert!(roll_loot(&rule(0), &catalog(), &mut StdRng::seed_from_u64(3)).is_empty());
    }

    #[test]
    fn seeded_rolls_repeat() {
        let catalog = catalog();
        let a = roll_loot(&rule(3), &catalog, &mut StdRng::seed_from_u64(42));
        let b = roll_loot(&rule(3), &catalog, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn every_eligible_item_gets_picked_eventually() {
        let catalog = catalog();
        let mut seen = HashSet::new();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            for line in roll_loot(&rule(1), &catalog, &mut rng) {
                seen.insert(line.item);
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn unknown_box_is_an_error() {
        let err = roll_box("Vault", &[rule(1)], &catalog(), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(LootError::UnknownBox(name)) if name == "Vault"));
    }
}
