use rust_xlsxwriter::{Format, FormatAlign, Worksheet};
use std::path::Path;
use tracing::debug;

use crate::inventory::{GridColumn, Inventory};
use crate::workbook::{CellValue, RawSheet, Workbook, LOOT_SUBHEADER, QTY_SUBHEADER};
use crate::{LootError, Result};

const DATA_START_ROW: u32 = 2;
// Worksheet limits of the xlsx format.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

struct OutColumn {
    top: String,
    sub: String,
    cells: Vec<CellValue>,
}

pub(crate) fn write_workbook(workbook: &Workbook, path: &Path) -> Result<()> {
    let mut out = rust_xlsxwriter::Workbook::new();

    for name in &workbook.sheet_order {
        let sheet = out.add_worksheet();
        sheet.set_name(name)?;
        if Workbook::is_players_sheet(name) {
            write_players(sheet, &workbook.inventory)?;
        } else if let Some(raw) = workbook.raw_sheets.iter().find(|s| &s.name == name) {
            write_raw(sheet, raw)?;
        }
    }

    out.save(path)?;
    Ok(())
}

fn col_num(idx: usize) -> Result<u16> {
    if idx >= MAX_COLUMNS {
        return Err(LootError::OutOfRange {
            kind: "column",
            index: idx,
        });
    }
    Ok(idx as u16)
}

fn row_num(idx: usize) -> Result<u32> {
    if idx >= MAX_ROWS {
        return Err(LootError::OutOfRange {
            kind: "row",
            index: idx,
        });
    }
    Ok(idx as u32)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<()> {
    match value {
        CellValue::Empty => {}
        CellValue::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        CellValue::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        CellValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
    }
    Ok(())
}

fn write_raw(sheet: &mut Worksheet, raw: &RawSheet) -> Result<()> {
    let (row0, col0) = raw.origin;
    for (r, row) in raw.rows.iter().enumerate() {
        let row_idx = row_num(row0 as usize + r)?;
        for (c, value) in row.iter().enumerate() {
            write_cell(sheet, row_idx, col_num(col0 as usize + c)?, value)?;
        }
    }
    Ok(())
}

/// Lays the grid out column by column: passthrough columns as they were,
/// every player as a `Loot`/`Qty` pair.
fn grid_columns(inventory: &Inventory) -> Result<Vec<OutColumn>> {
    let mut consolidated = inventory.clone();
    consolidated.consolidate()?;

    let mut columns = Vec::new();
    for column in consolidated.layout() {
        match column {
            GridColumn::Passthrough(p) => columns.push(OutColumn {
                top: p.top.clone(),
                sub: p.sub.clone(),
                cells: p.cells.clone(),
            }),
            GridColumn::Player(name) => {
                let (items, qtys): (Vec<CellValue>, Vec<CellValue>) = consolidated
                    .records_for(name)
                    .map(|r| (CellValue::Text(r.item.clone()), CellValue::Number(f64::from(r.qty))))
                    .unzip();
                columns.push(OutColumn {
                    top: name.clone(),
                    sub: LOOT_SUBHEADER.to_string(),
                    cells: items,
                });
                columns.push(OutColumn {
                    top: name.clone(),
                    sub: QTY_SUBHEADER.to_string(),
                    cells: qtys,
                });
            }
        }
    }
    Ok(columns)
}

fn write_players(sheet: &mut Worksheet, inventory: &Inventory) -> Result<()> {
    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let columns = grid_columns(inventory)?;

    // Consecutive columns sharing a top-level name get one merged cell.
    let mut start = 0;
    while start < columns.len() {
        let top = &columns[start].top;
        let mut end = start;
        while end + 1 < columns.len() && !top.is_empty() && columns[end + 1].top == *top {
            end += 1;
        }
        if !top.is_empty() {
            if end > start {
                sheet.merge_range(0, col_num(start)?, 0, col_num(end)?, top, &header)?;
            } else {
                sheet.write_string_with_format(0, col_num(start)?, top, &header)?;
            }
        }
        start = end + 1;
    }

    for (c, column) in columns.iter().enumerate() {
        let col = col_num(c)?;
        if !column.sub.is_empty() {
            sheet.write_string_with_format(1, col, &column.sub, &header)?;
        }
        for (r, value) in column.cells.iter().enumerate() {
            write_cell(sheet, row_num(DATA_START_ROW as usize + r)?, col, value)?;
        }
    }

    debug!(columns = columns.len(), "wrote players grid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BoxRule, Catalog, LootItem};
    use crate::inventory::Owner;

    fn workbook() -> Workbook {
        let catalog = Catalog::new(vec![
            LootItem {
                name: "Rope".to_string(),
                value: 1.0,
                weight: 10.0,
                max_qty: 2,
                scarcity: 1,
            },
            LootItem {
                name: "Gem".to_string(),
                value: 50.5,
                weight: 0.1,
                max_qty: 3,
                scarcity: 4,
            },
        ]);
        let boxes = vec![BoxRule {
            name: "Small".to_string(),
            max_items: 2,
            min_value: 0.0,
            max_value: 100.0,
            min_scarcity: 1,
            max_scarcity: 4,
        }];
        let mut inventory = Inventory::new(&["Ada", "Bram", "Cyd"]);
        inventory.add("Ada", "Rope", 2).unwrap();
        inventory.add("Ada", "Gem", 1).unwrap();
        inventory.add("Bram", "Gem", 3).unwrap();
        Workbook::new(catalog, boxes, inventory)
    }

    #[test]
    fn round_trips_through_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loot.xlsx");
        let original = workbook();
        original.save(&path).unwrap();

        let (loaded, report) = Workbook::open(&path).unwrap();
        assert!(report.is_empty(), "{:?}", report.issues);
        assert_eq!(loaded.catalog.items(), original.catalog.items());
        assert_eq!(loaded.boxes, original.boxes);
        assert_eq!(loaded.inventory.players(), vec!["Ada", "Bram", "Cyd"]);
        assert_eq!(loaded.inventory.records(), original.inventory.records());
        assert_eq!(loaded.sheet_order, original.sheet_order);
    }

    #[test]
    fn writes_back_consolidated_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loot.xlsx");
        workbook().save(&path).unwrap();

        let (mut loaded, _) = Workbook::open(&path).unwrap();
        loaded.inventory.trade("Bram", "Cyd", "Gem", 2).unwrap();
        loaded.inventory.drop_item(&Owner::Player("Ada".into()), "Rope").unwrap();
        loaded.save(&path).unwrap();

        let (reloaded, report) = Workbook::open(&path).unwrap();
        assert!(report.is_empty());
        let inv = &reloaded.inventory;
        assert_eq!(inv.quantity_of(&Owner::Player("Ada".into()), "Rope"), 0);
        assert_eq!(inv.quantity_of(&Owner::Player("Bram".into()), "Gem"), 1);
        assert_eq!(inv.quantity_of(&Owner::Player("Cyd".into()), "Gem"), 2);
        assert_eq!(inv.quantity_of(&Owner::Party, "Gem"), 4);
    }

    #[test]
    fn skipped_player_columns_survive_save() {
        let text = |s: &str| CellValue::Text(s.to_string());
        let players = RawSheet {
            name: "Players".to_string(),
            origin: (0, 0),
            rows: vec![
                vec![text("Ada"), CellValue::Empty, CellValue::Empty, text("Cyd"), text("Ada2")],
                vec![text("Loot"), text("Qty"), text("Notes"), text("Loot"), text("Notes")],
                vec![text("Rope"), CellValue::Number(1.0), text("sharp"), text("Gem"), text("keep me")],
            ],
        };
        let mut sheets = workbook().raw_sheets.clone();
        sheets.push(players);
        let (wb, _) = Workbook::from_sheets(sheets).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loot.xlsx");
        wb.save(&path).unwrap();

        let (reloaded, _) = Workbook::open(&path).unwrap();
        assert_eq!(reloaded.inventory.layout(), wb.inventory.layout());
        assert_eq!(reloaded.inventory.quantity_of(&Owner::Player("Ada".into()), "Rope"), 1);

        let columns = grid_columns(&reloaded.inventory).unwrap();
        let cells: Vec<(&str, &str)> = columns.iter().map(|c| (c.top.as_str(), c.sub.as_str())).collect();
        assert_eq!(
            cells,
            vec![("Ada", "Loot"), ("Ada", "Qty"), ("Ada", "Notes"), ("Cyd", "Loot"), ("Ada2", "Notes")]
        );
        assert_eq!(columns[3].cells, vec![text("Gem")]);
        assert_eq!(columns[4].cells, vec![text("keep me")]);
    }

    #[test]
    fn positions_past_the_sheet_limits_are_refused() {
        assert_eq!(col_num(16_383).unwrap(), 16_383);
        assert!(matches!(col_num(16_384), Err(LootError::OutOfRange { kind: "column", .. })));
        assert!(matches!(row_num(1_048_576), Err(LootError::OutOfRange { kind: "row", .. })));
    }

    #[test]
    fn grid_keeps_passthrough_position() {
        let players = RawSheet {
            name: "Players".to_string(),
            origin: (0, 0),
            rows: vec![
                vec![
                    CellValue::Text("Players".into()),
                    CellValue::Text("Ada".into()),
                    CellValue::Empty,
                ],
                vec![
                    CellValue::Empty,
                    CellValue::Text("Loot".into()),
                    CellValue::Text("Qty".into()),
                ],
                vec![
                    CellValue::Number(1.0),
                    CellValue::Text("Rope".into()),
                    CellValue::Number(1.0),
                ],
                vec![
                    CellValue::Number(2.0),
                    CellValue::Text("Rope".into()),
                    CellValue::Number(2.0),
                ],
            ],
        };
        let base = workbook();
        let mut sheets = base.raw_sheets.clone();
        sheets.push(players);
        let (wb, _) = Workbook::from_sheets(sheets).unwrap();

        let columns = grid_columns(&wb.inventory).unwrap();
        let tops: Vec<&str> = columns.iter().map(|c| c.top.as_str()).collect();
        assert_eq!(tops, vec!["Players", "Ada", "Ada"]);
        assert_eq!(columns[0].cells.len(), 2);
        // The two Rope rows collapse into one.
        assert_eq!(columns[1].cells, vec![CellValue::Text("Rope".into())]);
        assert_eq!(columns[2].cells, vec![CellValue::Number(3.0)]);
    }
}
