use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;
use tracing::{debug, info};

use crate::catalog::{LootLine, LootTotals};
use crate::inventory::{InventoryDelta, Owner};
use crate::roll::roll_box;
use crate::workbook::Workbook;
use crate::{LootError, Result};

/// The state behind both windows: the loaded workbook, the box that was
/// rolled last, and inventory changes not yet written to disk.
pub struct LootSession {
    workbook: Workbook,
    rolled_box: Option<String>,
    rolled: Vec<LootLine>,
    pending: Vec<InventoryDelta>,
    rng: StdRng,
}

impl LootSession {
    pub fn new(workbook: Workbook, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            workbook,
            rolled_box: None,
            rolled: Vec::new(),
            pending: Vec::new(),
            rng,
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn rolled(&self) -> &[LootLine] {
        &self.rolled
    }

    pub fn rolled_box(&self) -> Option<&str> {
        self.rolled_box.as_deref()
    }

    pub fn rolled_totals(&self) -> LootTotals {
        LootTotals::of(&self.rolled)
    }

    pub fn pending(&self) -> &[InventoryDelta] {
        &self.pending
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn roll(&mut self, box_name: &str) -> Result<&[LootLine]> {
        let wb = &self.workbook;
        let lines = roll_box(box_name, &wb.boxes, &wb.catalog, &mut self.rng)?;
        info!(box_name, items = lines.len(), "rolled loot box");
        self.rolled = lines;
        self.rolled_box = Some(box_name.trim().to_string());
        Ok(&self.rolled)
    }

    pub fn owned(&self, owner: &Owner) -> Vec<LootLine> {
        self.workbook.inventory.aggregate(owner, &self.workbook.catalog)
    }

    pub fn owned_totals(&self, owner: &Owner) -> LootTotals {
        LootTotals::of(&self.owned(owner))
    }

    /// Moves one rolled line into `player`'s inventory.
    pub fn take(&mut self, item: &str, player: &str) -> Result<()> {
        let idx = self.rolled_index(item)?;
        let line = &self.rolled[idx];
        self.workbook.inventory.add(player, &line.item, line.qty)?;

        let line = self.rolled.remove(idx);
        debug!(player, item = %line.item, qty = line.qty, "took rolled item");
        self.pending.push(InventoryDelta {
            player: player.trim().to_string(),
            item: line.item,
            change: i64::from(line.qty),
        });
        Ok(())
    }

    pub fn take_all(&mut self, player: &str) -> Result<usize> {
        if !self.workbook.inventory.has_player(player.trim()) {
            return Err(LootError::UnknownPlayer(player.to_string()));
        }
        // Lines leave the box one at a time, so a failure keeps the rest.
        let mut count = 0;
        while let Some(line) = self.rolled.first() {
            self.workbook.inventory.add(player, &line.item, line.qty)?;
            let line = self.rolled.remove(0);
            self.pending.push(InventoryDelta {
                player: player.trim().to_string(),
                item: line.item,
                change: i64::from(line.qty),
            });
            count += 1;
        }
        info!(player, items = count, "took the whole loot box");
        Ok(count)
    }

    pub fn drop_rolled(&mut self, item: &str) -> Result<LootLine> {
        let idx = self.rolled_index(item)?;
        Ok(self.rolled.remove(idx))
    }

    pub fn drop_owned(&mut self, owner: &Owner, item: &str) -> Result<u32> {
        let removed = self.workbook.inventory.drop_item(owner, item)?;
        let total = removed.iter().map(|d| d.change.unsigned_abs() as u32).sum();
        debug!(%owner, item, qty = total, "dropped item");
        self.pending.extend(removed);
        Ok(total)
    }

    pub fn trade(&mut self, from: &str, to: &str, item: &str, qty: u32) -> Result<()> {
        let deltas = self.workbook.inventory.trade(from, to, item, qty)?;
        debug!(from, to, item, qty, "traded item");
        self.pending.extend(deltas);
        Ok(())
    }

    /// Moves `from`'s whole stack of `item` to `to`.
    pub fn trade_all(&mut self, from: &str, to: &str, item: &str) -> Result<u32> {
        let qty = self
            .workbook
            .inventory
            .quantity_of(&Owner::Player(from.trim().to_string()), item);
        if qty == 0 {
            return Err(LootError::ItemNotHeld {
                owner: from.to_string(),
                item: item.to_string(),
            });
        }
        self.trade(from, to, item, qty)?;
        Ok(qty)
    }

    pub fn apply(&mut self, delta: InventoryDelta) -> Result<()> {
        self.workbook.inventory.apply(&delta)?;
        self.pending.push(delta);
        Ok(())
    }

    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.workbook.save(path)?;
        self.pending.clear();
        Ok(())
    }

    fn rolled_index(&self, item: &str) -> Result<usize> {
        let item = item.trim();
        self.rolled
            .iter()
            .position(|l| l.item == item)
            .ok_or_else(|| LootError::NotRolled {
                item: item.to_string(),
            })
    }
}
