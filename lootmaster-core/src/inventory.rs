use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{Catalog, LootLine};
use crate::workbook::CellValue;
use crate::{LootError, Result};

/// Top-level name of the aggregate owner in the `Players` sheet.
pub const PARTY: &str = "Party";
/// Top-level name of the row label column in the `Players` sheet.
pub const PLAYERS_COLUMN: &str = "Players";

pub(crate) fn is_reserved_name(name: &str) -> bool {
    let name = name.trim();
    name.eq_ignore_ascii_case(PARTY) || name.eq_ignore_ascii_case(PLAYERS_COLUMN)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Player(String),
    Party,
}

impl Owner {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case(PARTY) {
            Owner::Party
        } else {
            Owner::Player(name.to_string())
        }
    }

    fn includes(&self, player: &str) -> bool {
        match self {
            Owner::Party => true,
            Owner::Player(name) => name == player,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Player(name) => f.write_str(name),
            Owner::Party => f.write_str(PARTY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub player: String,
    pub item: String,
    pub qty: u32,
}

/// A signed change to one player's stack of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub player: String,
    pub item: String,
    pub change: i64,
}

/// A `Players` sheet column that does not belong to a player.
#[derive(Debug, Clone, PartialEq)]
pub struct PassthroughColumn {
    pub top: String,
    pub sub: String,
    pub cells: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridColumn {
    Passthrough(PassthroughColumn),
    Player(String),
}

/// The players grid: who exists, what they hold, and how the sheet was laid
/// out so it can be written back in the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    layout: Vec<GridColumn>,
    records: Vec<InventoryRecord>,
}

impl Inventory {
    pub fn new(players: &[&str]) -> Self {
        let mut inv = Self::default();
        for player in players {
            inv.push_player(player);
        }
        inv
    }

    pub(crate) fn from_parts(layout: Vec<GridColumn>, records: Vec<InventoryRecord>) -> Self {
        Self { layout, records }
    }

    pub(crate) fn push_player(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || is_reserved_name(name) || self.has_player(name) {
            return false;
        }
        self.layout.push(GridColumn::Player(name.to_string()));
        true
    }

    pub fn layout(&self) -> &[GridColumn] {
        &self.layout
    }

    pub fn records(&self) -> &[InventoryRecord] {
        &self.records
    }

    /// Player names sorted by name. The sheet order lives in [`Self::layout`].
    pub fn players(&self) -> Vec<&str> {
        let mut players: Vec<&str> = self
            .layout
            .iter()
            .filter_map(|c| match c {
                GridColumn::Player(name) => Some(name.as_str()),
                GridColumn::Passthrough(_) => None,
            })
            .collect();
        players.sort_unstable();
        players
    }

    pub fn owners(&self) -> Vec<Owner> {
        let mut owners: Vec<Owner> = self
            .players()
            .into_iter()
            .map(|p| Owner::Player(p.to_string()))
            .collect();
        owners.push(Owner::Party);
        owners
    }

    pub fn has_player(&self, name: &str) -> bool {
        self.layout
            .iter()
            .any(|c| matches!(c, GridColumn::Player(p) if p == name))
    }

    fn require_player(&self, name: &str) -> Result<()> {
        if self.has_player(name) {
            Ok(())
        } else {
            Err(LootError::UnknownPlayer(name.to_string()))
        }
    }

    fn require_owner(&self, owner: &Owner) -> Result<()> {
        match owner {
            Owner::Party => Ok(()),
            Owner::Player(name) => self.require_player(name),
        }
    }

    pub fn quantity_of(&self, owner: &Owner, item: &str) -> u32 {
        let item = item.trim();
        self.records
            .iter()
            .filter(|r| owner.includes(&r.player) && r.item == item)
            .fold(0, |acc: u32, r| acc.saturating_add(r.qty))
    }

    /// Sums quantities per item for `owner`. Rows are ordered by item name;
    /// items the catalog does not know are left out.
    pub fn aggregate(&self, owner: &Owner, catalog: &Catalog) -> Vec<LootLine> {
        let mut sums: BTreeMap<(&str, u32), u32> = BTreeMap::new();
        for record in self.records.iter().filter(|r| owner.includes(&r.player)) {
            let Some(item) = catalog.get(&record.item) else {
                continue;
            };
            let sum = sums.entry((item.name.as_str(), item.scarcity)).or_insert(0);
            *sum = sum.saturating_add(record.qty);
        }

        sums.into_iter()
            .filter(|(_, qty)| *qty > 0)
            .filter_map(|((name, _), qty)| catalog.get(name).map(|item| LootLine::for_item(item, qty)))
            .collect()
    }

    pub fn add(&mut self, player: &str, item: &str, qty: u32) -> Result<()> {
        let player = player.trim();
        let item = item.trim();
        self.require_player(player)?;
        if qty == 0 {
            return Err(LootError::InvalidQuantity);
        }

        self.check_room(player, item, qty)?;

        match self
            .records
            .iter_mut()
            .find(|r| r.player == player && r.item == item)
        {
            Some(record) => record.qty += qty,
            None => self.records.push(InventoryRecord {
                player: player.to_string(),
                item: item.to_string(),
                qty,
            }),
        }
        Ok(())
    }

    /// A player's stack of one item must fit a `u32`.
    fn check_room(&self, player: &str, item: &str, qty: u32) -> Result<()> {
        let held = self
            .records
            .iter()
            .filter(|r| r.player == player && r.item == item)
            .try_fold(qty, |acc, r| acc.checked_add(r.qty));
        match held {
            Some(_) => Ok(()),
            None => Err(LootError::QuantityOverflow {
                player: player.to_string(),
                item: item.to_string(),
            }),
        }
    }

    /// Takes `qty` from the player's earliest records for `item` first.
    pub fn remove(&mut self, player: &str, item: &str, qty: u32) -> Result<()> {
        let player = player.trim();
        let item = item.trim();
        self.require_player(player)?;
        if qty == 0 {
            return Err(LootError::InvalidQuantity);
        }

        let held = self.quantity_of(&Owner::Player(player.to_string()), item);
        if held < qty {
            return Err(LootError::InsufficientQuantity {
                player: player.to_string(),
                item: item.to_string(),
                held,
                wanted: qty,
            });
        }

        let mut remaining = qty;
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.player == player && r.item == item)
        {
            let taken = remaining.min(record.qty);
            record.qty -= taken;
            remaining -= taken;
            if remaining == 0 {
                break;
            }
        }
        self.records.retain(|r| r.qty > 0);
        Ok(())
    }

    /// Removes the whole stack of `item` from `owner`, every player for
    /// `Party`. Returns what was removed per player.
    pub fn drop_item(&mut self, owner: &Owner, item: &str) -> Result<Vec<InventoryDelta>> {
        let item = item.trim();
        self.require_owner(owner)?;

        let mut removed: Vec<InventoryDelta> = Vec::new();
        for record in self
            .records
            .iter()
            .filter(|r| owner.includes(&r.player) && r.item == item)
        {
            match removed.iter_mut().find(|d| d.player == record.player) {
                Some(delta) => delta.change -= i64::from(record.qty),
                None => removed.push(InventoryDelta {
                    player: record.player.clone(),
                    item: item.to_string(),
                    change: -i64::from(record.qty),
                }),
            }
        }

        if removed.iter().all(|d| d.change == 0) {
            return Err(LootError::ItemNotHeld {
                owner: owner.to_string(),
                item: item.to_string(),
            });
        }

        self.records
            .retain(|r| !(owner.includes(&r.player) && r.item == item));
        removed.retain(|d| d.change != 0);
        Ok(removed)
    }

    pub fn trade(&mut self, from: &str, to: &str, item: &str, qty: u32) -> Result<[InventoryDelta; 2]> {
        let from = from.trim();
        let to = to.trim();
        let item = item.trim();
        self.require_player(to)?;
        if from == to {
            return Err(LootError::InvalidTrade {
                player: from.to_string(),
                item: item.to_string(),
            });
        }

        if qty == 0 {
            return Err(LootError::InvalidQuantity);
        }
        self.check_room(to, item, qty)?;

        self.remove(from, item, qty)?;
        self.add(to, item, qty)?;

        let change = i64::from(qty);
        Ok([
            InventoryDelta {
                player: from.to_string(),
                item: item.to_string(),
                change: -change,
            },
            InventoryDelta {
                player: to.to_string(),
                item: item.to_string(),
                change,
            },
        ])
    }

    pub fn apply(&mut self, delta: &InventoryDelta) -> Result<()> {
        let qty = u32::try_from(delta.change.unsigned_abs()).map_err(|_| LootError::InvalidQuantity)?;
        if delta.change > 0 {
            self.add(&delta.player, &delta.item, qty)
        } else if delta.change < 0 {
            self.remove(&delta.player, &delta.item, qty)
        } else {
            Err(LootError::InvalidQuantity)
        }
    }

    /// Merges duplicate `(player, item)` records in first-seen order.
    /// Leaves the records untouched if a merged stack would not fit a `u32`.
    pub fn consolidate(&mut self) -> Result<()> {
        let mut merged: Vec<InventoryRecord> = Vec::with_capacity(self.records.len());
        for record in &self.records {
            match merged
                .iter_mut()
                .find(|m| m.player == record.player && m.item == record.item)
            {
                Some(m) => {
                    m.qty = m.qty.checked_add(record.qty).ok_or_else(|| LootError::QuantityOverflow {
                        player: record.player.clone(),
                        item: record.item.clone(),
                    })?;
                }
                None => merged.push(record.clone()),
            }
        }
        merged.retain(|r| r.qty > 0);
        self.records = merged;
        Ok(())
    }

    pub fn records_for<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a InventoryRecord> + 'a {
        self.records.iter().filter(move |r| r.player == player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LootItem;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            LootItem {
                name: "Rope".to_string(),
                value: 1.0,
                weight: 10.0,
                max_qty: 2,
                scarcity: 1,
            },
            LootItem {
                name: "Gem".to_string(),
                value: 50.0,
                weight: 0.1,
                max_qty: 3,
                scarcity: 4,
            },
        ])
    }

    fn inventory() -> Inventory {
        let mut inv = Inventory::new(&["Ada", "Bram"]);
        inv.records = vec![
            InventoryRecord { player: "Ada".into(), item: "Rope".into(), qty: 2 },
            InventoryRecord { player: "Bram".into(), item: "Gem".into(), qty: 1 },
            InventoryRecord { player: "Ada".into(), item: "Gem".into(), qty: 2 },
            InventoryRecord { player: "Ada".into(), item: "Rope".into(), qty: 1 },
            InventoryRecord { player: "Bram".into(), item: "Mystery".into(), qty: 4 },
        ];
        inv
    }

    #[test]
    fn reserved_names_are_not_players() {
        let mut inv = Inventory::new(&["Party", "Players", "Ada", "Ada"]);
        assert!(!inv.push_player(" "));
        assert_eq!(inv.players(), vec!["Ada"]);
        assert_eq!(inv.owners(), vec![Owner::Player("Ada".into()), Owner::Party]);
        assert_eq!(Owner::parse("party"), Owner::Party);
        assert!(!inv.push_player("party"));
        assert!(!inv.push_player(" PLAYERS "));
    }

    #[test]
    fn players_are_listed_by_name() {
        let inv = Inventory::new(&["Cyd", "Ada", "Bram"]);
        assert_eq!(inv.players(), vec!["Ada", "Bram", "Cyd"]);
        assert_eq!(
            inv.owners(),
            vec![
                Owner::Player("Ada".into()),
                Owner::Player("Bram".into()),
                Owner::Player("Cyd".into()),
                Owner::Party,
            ]
        );
        // The grid keeps the sheet order.
        assert_eq!(inv.layout()[0], GridColumn::Player("Cyd".into()));
    }

    #[test]
    fn oversized_stacks_are_refused() {
        let mut inv = Inventory::new(&["Ada", "Bram"]);
        inv.add("Ada", "Rope", 3_000_000_000).unwrap();
        let err = inv.add("Ada", "Rope", 3_000_000_000).unwrap_err();
        assert!(matches!(err, LootError::QuantityOverflow { .. }));
        assert_eq!(inv.quantity_of(&Owner::Player("Ada".into()), "Rope"), 3_000_000_000);

        // The trade fails before anything leaves Bram.
        inv.add("Bram", "Rope", 3_000_000_000).unwrap();
        assert!(matches!(
            inv.trade("Bram", "Ada", "Rope", 3_000_000_000),
            Err(LootError::QuantityOverflow { .. })
        ));
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Rope"), 3_000_000_000);
        assert_eq!(inv.quantity_of(&Owner::Party, "Rope"), u32::MAX);
        assert_eq!(inv.aggregate(&Owner::Party, &catalog())[0].qty, u32::MAX);
    }

    #[test]
    fn consolidate_refuses_oversized_stacks() {
        let mut inv = Inventory::new(&["Ada"]);
        inv.records = vec![
            InventoryRecord { player: "Ada".into(), item: "Gem".into(), qty: 3_000_000_000 },
            InventoryRecord { player: "Ada".into(), item: "Gem".into(), qty: 3_000_000_000 },
        ];
        assert!(matches!(inv.consolidate(), Err(LootError::QuantityOverflow { .. })));
        assert_eq!(inv.records().len(), 2);
    }

    #[test]
    fn aggregates_player_and_party() {
        let inv = inventory();
        let catalog = catalog();

        let ada = inv.aggregate(&Owner::Player("Ada".into()), &catalog);
        assert_eq!(ada.len(), 2);
        assert_eq!(ada[0].item, "Gem");
        assert_eq!(ada[0].qty, 2);
        assert_eq!(ada[0].value, 100.0);
        assert_eq!(ada[1].item, "Rope");
        assert_eq!(ada[1].qty, 3);
        assert_eq!(ada[1].weight, 30.0);

        let party = inv.aggregate(&Owner::Party, &catalog);
        assert_eq!(party.len(), 2);
        assert_eq!(party[0].qty, 3);
    }

    #[test]
    fn unknown_items_stay_out_of_aggregates() {
        let inv = inventory();
        let bram = inv.aggregate(&Owner::Player("Bram".into()), &catalog());
        assert_eq!(bram.len(), 1);
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Mystery"), 4);
    }

    #[test]
    fn add_merges_into_existing_stack() {
        let mut inv = inventory();
        inv.add("Bram", "Gem", 2).unwrap();
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Gem"), 3);
        assert_eq!(inv.records().len(), 5);

        inv.add("Bram", "Rope", 1).unwrap();
        assert_eq!(inv.records().len(), 6);

        assert!(matches!(inv.add("Cyd", "Rope", 1), Err(LootError::UnknownPlayer(_))));
        assert!(matches!(inv.add("Ada", "Rope", 0), Err(LootError::InvalidQuantity)));
    }

    #[test]
    fn remove_drains_earliest_records_first() {
        let mut inv = inventory();
        inv.remove("Ada", "Rope", 2).unwrap();
        let ropes: Vec<u32> = inv
            .records_for("Ada")
            .filter(|r| r.item == "Rope")
            .map(|r| r.qty)
            .collect();
        assert_eq!(ropes, vec![1]);

        let err = inv.remove("Ada", "Rope", 5).unwrap_err();
        assert!(matches!(err, LootError::InsufficientQuantity { held: 1, wanted: 5, .. }));
    }

    #[test]
    fn drop_for_party_clears_every_player() {
        let mut inv = inventory();
        let removed = inv.drop_item(&Owner::Party, "Gem").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].change, -1);
        assert_eq!(removed[1].change, -2);
        assert_eq!(inv.quantity_of(&Owner::Party, "Gem"), 0);

        assert!(matches!(
            inv.drop_item(&Owner::Player("Ada".into()), "Gem"),
            Err(LootError::ItemNotHeld { .. })
        ));
    }

    #[test]
    fn trade_moves_between_players() {
        let mut inv = inventory();
        let [out, inn] = inv.trade("Ada", "Bram", "Rope", 3).unwrap();
        assert_eq!(out.change, -3);
        assert_eq!(inn.change, 3);
        assert_eq!(inv.quantity_of(&Owner::Player("Ada".into()), "Rope"), 0);
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Rope"), 3);

        assert!(matches!(
            inv.trade("Ada", "Ada", "Gem", 1),
            Err(LootError::InvalidTrade { .. })
        ));
        // A failed trade leaves both sides untouched.
        assert!(inv.trade("Bram", "Ada", "Gem", 9).is_err());
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Gem"), 1);
    }

    #[test]
    fn apply_handles_signed_deltas() {
        let mut inv = inventory();
        inv.apply(&InventoryDelta { player: "Bram".into(), item: "Gem".into(), change: 2 }).unwrap();
        inv.apply(&InventoryDelta { player: "Bram".into(), item: "Gem".into(), change: -3 }).unwrap();
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Gem"), 0);
        assert!(inv
            .apply(&InventoryDelta { player: "Bram".into(), item: "Gem".into(), change: 0 })
            .is_err());
    }

    #[test]
    fn consolidate_sums_duplicates_in_order() {
        let mut inv = inventory();
        inv.consolidate().unwrap();
        let ada: Vec<(&str, u32)> = inv
            .records_for("Ada")
            .map(|r| (r.item.as_str(), r.qty))
            .collect();
        assert_eq!(ada, vec![("Rope", 3), ("Gem", 2)]);
        assert_eq!(inv.records().len(), 4);
    }
}
