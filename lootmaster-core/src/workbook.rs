//! Reading the loot workbook.
//!
//! The workbook carries three sheets: `Loot` (the item catalog),
//! `Loot box sizes` (box rules) and `Players`, a wide grid with two header
//! rows where every player owns a `Loot` column and a `Qty` column under a
//! merged name cell. Missing sheets or columns are hard errors; bad rows are
//! skipped and reported through [`LoadReport`].

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::catalog::{BoxRule, Catalog, LootItem};
use crate::inventory::{is_reserved_name, GridColumn, Inventory, InventoryRecord, PassthroughColumn};
use crate::{writer, LootError, Result};

pub const LOOT_SHEET: &str = "Loot";
pub const BOXES_SHEET: &str = "Loot box sizes";
pub const PLAYERS_SHEET: &str = "Players";

pub const LOOT_SUBHEADER: &str = "Loot";
pub const QTY_SUBHEADER: &str = "Qty";

// First alias is the canonical header written for new workbooks.
const ITEM_COLS: &[&str] = &["Item"];
const VALUE_COLS: &[&str] = &["Value(GP)", "Value (GP)", "Value"];
const WEIGHT_COLS: &[&str] = &["Weight"];
const MAX_COLS: &[&str] = &["Max", "MaxQty", "Max Qty"];
const SCARCITY_COLS: &[&str] = &["Item scarecity", "Item scarcity", "Scarcity"];

const BOX_NAME_COLS: &[&str] = &["Loot box name", "BoxName"];
const MAX_ITEMS_COLS: &[&str] = &["Max total items", "MaxItems"];
const MIN_VALUE_COLS: &[&str] = &["Min box value", "MinValue"];
const MAX_VALUE_COLS: &[&str] = &["Max box value", "MaxValue"];
const MIN_SCARCITY_COLS: &[&str] = &["Min scarecity", "Min scarcity", "MinScarcity"];
const MAX_SCARCITY_COLS: &[&str] = &["Max scarecity", "Max scarcity", "MaxScarcity"];

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) if s.trim().is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(e.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Trimmed, non-empty text. Whole numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Empty | CellValue::Bool(_) => return None,
        };
        n.is_finite().then_some(n)
    }

    pub fn as_whole(&self) -> Option<u32> {
        let n = self.as_number()?;
        if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
            return None;
        }
        Some(n as u32)
    }
}

/// A sheet kept cell for cell so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    /// Zero-based (row, column) of the first stored cell.
    pub origin: (u32, u32),
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    fn from_range(name: &str, range: &Range<Data>) -> Self {
        let origin = range.start().unwrap_or((0, 0));
        let rows = range
            .rows()
            .map(|row| row.iter().map(CellValue::from_data).collect())
            .collect();
        Self {
            name: name.to_string(),
            origin,
            rows,
        }
    }

    fn excel_row(&self, idx: usize) -> u32 {
        self.origin.0 + idx as u32 + 1
    }

    fn header(&self) -> &[CellValue] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

fn cell(row: &[CellValue], col: usize) -> &CellValue {
    row.get(col).unwrap_or(&EMPTY_CELL)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadIssue {
    pub sheet: String,
    /// One-based spreadsheet row, when the issue belongs to a row.
    pub row: Option<u32>,
    pub message: String,
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} row {}: {}", self.sheet, row, self.message),
            None => write!(f, "{}: {}", self.sheet, self.message),
        }
    }
}

/// Problems that were recovered from while loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    fn push(&mut self, sheet: &str, row: Option<u32>, message: impl Into<String>) {
        let issue = LoadIssue {
            sheet: sheet.to_string(),
            row,
            message: message.into(),
        };
        warn!("{issue}");
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub catalog: Catalog,
    pub boxes: Vec<BoxRule>,
    pub inventory: Inventory,
    pub(crate) sheet_order: Vec<String>,
    pub(crate) raw_sheets: Vec<RawSheet>,
}

impl Workbook {
    /// Builds a workbook from scratch with the canonical sheet layout.
    pub fn new(catalog: Catalog, boxes: Vec<BoxRule>, inventory: Inventory) -> Self {
        let loot_sheet = RawSheet {
            name: LOOT_SHEET.to_string(),
            origin: (0, 0),
            rows: std::iter::once(header_row(&[
                ITEM_COLS[0],
                VALUE_COLS[0],
                WEIGHT_COLS[0],
                MAX_COLS[0],
                SCARCITY_COLS[0],
            ]))
            .chain(catalog.items().iter().map(|item| {
                vec![
                    CellValue::Text(item.name.clone()),
                    CellValue::Number(item.value),
                    CellValue::Number(item.weight),
                    CellValue::Number(f64::from(item.max_qty)),
                    CellValue::Number(f64::from(item.scarcity)),
                ]
            }))
            .collect(),
        };

        let boxes_sheet = RawSheet {
            name: BOXES_SHEET.to_string(),
            origin: (0, 0),
            rows: std::iter::once(header_row(&[
                BOX_NAME_COLS[0],
                MAX_ITEMS_COLS[0],
                MIN_VALUE_COLS[0],
                MAX_VALUE_COLS[0],
                MIN_SCARCITY_COLS[0],
                MAX_SCARCITY_COLS[0],
            ]))
            .chain(boxes.iter().map(|rule| {
                vec![
                    CellValue::Text(rule.name.clone()),
                    CellValue::Number(f64::from(rule.max_items)),
                    CellValue::Number(rule.min_value),
                    CellValue::Number(rule.max_value),
                    CellValue::Number(f64::from(rule.min_scarcity)),
                    CellValue::Number(f64::from(rule.max_scarcity)),
                ]
            }))
            .collect(),
        };

        Self {
            catalog,
            boxes,
            inventory,
            sheet_order: vec![
                LOOT_SHEET.to_string(),
                BOXES_SHEET.to_string(),
                PLAYERS_SHEET.to_string(),
            ],
            raw_sheets: vec![loot_sheet, boxes_sheet],
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<(Self, LoadReport)> {
        let path = path.as_ref();
        let mut xlsx: Xlsx<_> = open_workbook(path)?;

        let mut sheets = Vec::new();
        for name in xlsx.sheet_names().to_vec() {
            let range = xlsx.worksheet_range(&name)?;
            sheets.push(RawSheet::from_range(&name, &range));
        }

        let (workbook, report) = Self::from_sheets(sheets).map_err(|err| match err {
            LootError::MissingSheet { sheet, .. } => LootError::MissingSheet {
                path: path.to_path_buf(),
                sheet,
            },
            other => other,
        })?;

        info!(
            path = %path.display(),
            items = workbook.catalog.len(),
            boxes = workbook.boxes.len(),
            players = workbook.inventory.players().len(),
            issues = report.len(),
            "loaded workbook"
        );
        Ok((workbook, report))
    }

    pub fn from_sheets(sheets: Vec<RawSheet>) -> Result<(Self, LoadReport)> {
        let mut report = LoadReport::default();

        let find = |wanted: &str| -> Result<usize> {
            sheets
                .iter()
                .position(|s| s.name.trim().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| LootError::MissingSheet {
                    path: Default::default(),
                    sheet: wanted.to_string(),
                })
        };
        let loot_idx = find(LOOT_SHEET)?;
        let boxes_idx = find(BOXES_SHEET)?;
        let players_idx = find(PLAYERS_SHEET)?;

        let catalog = parse_catalog(&sheets[loot_idx], &mut report)?;
        let boxes = parse_boxes(&sheets[boxes_idx], &mut report)?;
        let inventory = parse_players(&sheets[players_idx], &catalog, &mut report);

        let sheet_order: Vec<String> = sheets.iter().map(|s| s.name.clone()).collect();
        let players_name = sheets[players_idx].name.clone();
        let raw_sheets = sheets
            .into_iter()
            .filter(|s| s.name != players_name)
            .collect();

        Ok((
            Self {
                catalog,
                boxes,
                inventory,
                sheet_order,
                raw_sheets,
            },
            report,
        ))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        writer::write_workbook(self, path)?;
        info!(path = %path.display(), "saved workbook");
        Ok(())
    }

    pub fn box_rule(&self, name: &str) -> Option<&BoxRule> {
        self.boxes.iter().find(|b| b.name == name.trim())
    }

    pub fn box_names(&self) -> Vec<&str> {
        self.boxes.iter().map(|b| b.name.as_str()).collect()
    }

    pub(crate) fn is_players_sheet(name: &str) -> bool {
        name.trim().eq_ignore_ascii_case(PLAYERS_SHEET)
    }
}

fn header_row(names: &[&str]) -> Vec<CellValue> {
    names.iter().map(|n| CellValue::Text(n.to_string())).collect()
}

fn normalize_header(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

struct Columns {
    by_name: HashMap<String, usize>,
}

impl Columns {
    fn new(header: &[CellValue]) -> Self {
        let mut by_name = HashMap::new();
        for (idx, cell) in header.iter().enumerate() {
            if let Some(text) = cell.as_text() {
                by_name.entry(normalize_header(&text)).or_insert(idx);
            }
        }
        Self { by_name }
    }

    fn find(&self, sheet: &str, aliases: &[&str]) -> Result<usize> {
        aliases
            .iter()
            .find_map(|a| self.by_name.get(&normalize_header(a)).copied())
            .ok_or_else(|| LootError::MissingColumn {
                sheet: sheet.to_string(),
                column: aliases[0].to_string(),
            })
    }
}

fn parse_catalog(sheet: &RawSheet, report: &mut LoadReport) -> Result<Catalog> {
    let cols = Columns::new(sheet.header());
    let item_col = cols.find(LOOT_SHEET, ITEM_COLS)?;
    let value_col = cols.find(LOOT_SHEET, VALUE_COLS)?;
    let weight_col = cols.find(LOOT_SHEET, WEIGHT_COLS)?;
    let max_col = cols.find(LOOT_SHEET, MAX_COLS)?;
    let scarcity_col = cols.find(LOOT_SHEET, SCARCITY_COLS)?;

    let mut items: Vec<LootItem> = Vec::new();
    for (idx, row) in sheet.rows.iter().enumerate().skip(1) {
        let excel_row = Some(sheet.excel_row(idx));
        let Some(name) = cell(row, item_col).as_text() else {
            continue;
        };

        let Some(value) = cell(row, value_col).as_number().filter(|v| *v >= 0.0) else {
            report.push(LOOT_SHEET, excel_row, format!("{name:?}: value is not a number >= 0"));
            continue;
        };
        let weight_cell = cell(row, weight_col);
        let weight = if weight_cell.is_empty() {
            0.0
        } else {
            match weight_cell.as_number().filter(|w| *w >= 0.0) {
                Some(w) => w,
                None => {
                    report.push(LOOT_SHEET, excel_row, format!("{name:?}: weight is not a number >= 0"));
                    continue;
                }
            }
        };
        let Some(max_qty) = cell(row, max_col).as_whole().filter(|m| *m >= 1) else {
            report.push(LOOT_SHEET, excel_row, format!("{name:?}: max quantity is not a whole number >= 1"));
            continue;
        };
        let Some(scarcity) = cell(row, scarcity_col).as_whole() else {
            report.push(LOOT_SHEET, excel_row, format!("{name:?}: scarcity is not a whole number"));
            continue;
        };

        if items.iter().any(|i| i.name == name) {
            report.push(LOOT_SHEET, excel_row, format!("duplicate item {name:?} ignored"));
            continue;
        }

        items.push(LootItem {
            name,
            value,
            weight,
            max_qty,
            scarcity,
        });
    }

    debug!(items = items.len(), "parsed loot catalog");
    Ok(Catalog::new(items))
}

fn parse_boxes(sheet: &RawSheet, report: &mut LoadReport) -> Result<Vec<BoxRule>> {
    let cols = Columns::new(sheet.header());
    let name_col = cols.find(BOXES_SHEET, BOX_NAME_COLS)?;
    let max_items_col = cols.find(BOXES_SHEET, MAX_ITEMS_COLS)?;
    let min_value_col = cols.find(BOXES_SHEET, MIN_VALUE_COLS)?;
    let max_value_col = cols.find(BOXES_SHEET, MAX_VALUE_COLS)?;
    let min_scarcity_col = cols.find(BOXES_SHEET, MIN_SCARCITY_COLS)?;
    let max_scarcity_col = cols.find(BOXES_SHEET, MAX_SCARCITY_COLS)?;

    let mut boxes: Vec<BoxRule> = Vec::new();
    for (idx, row) in sheet.rows.iter().enumerate().skip(1) {
        let excel_row = Some(sheet.excel_row(idx));
        let Some(name) = cell(row, name_col).as_text() else {
            continue;
        };

        let max_items = cell(row, max_items_col).as_whole();
        let min_value = cell(row, min_value_col).as_number();
        let max_value = cell(row, max_value_col).as_number();
        let min_scarcity = cell(row, min_scarcity_col).as_whole();
        let max_scarcity = cell(row, max_scarcity_col).as_whole();

        let (Some(max_items), Some(min_value), Some(max_value), Some(min_scarcity), Some(max_scarcity)) =
            (max_items, min_value, max_value, min_scarcity, max_scarcity)
        else {
            report.push(BOXES_SHEET, excel_row, format!("box {name:?} has a missing or malformed number"));
            continue;
        };

        if min_value > max_value || min_scarcity > max_scarcity {
            report.push(BOXES_SHEET, excel_row, format!("box {name:?} has a minimum above its maximum"));
            continue;
        }

        if boxes.iter().any(|b| b.name == name) {
            report.push(BOXES_SHEET, excel_row, format!("duplicate box {name:?} ignored"));
            continue;
        }

        boxes.push(BoxRule {
            name,
            max_items,
            min_value,
            max_value,
            min_scarcity,
            max_scarcity,
        });
    }

    debug!(boxes = boxes.len(), "parsed loot box sizes");
    Ok(boxes)
}

enum ColumnKind {
    Passthrough { top: String, sub: String },
    Player { name: String, sub: String },
}

#[derive(Default)]
struct PlayerColumns {
    loot: Option<usize>,
    qty: Option<usize>,
}

fn passthrough(top: &str, sub: &str, rows: &[Vec<CellValue>], col: usize) -> GridColumn {
    let mut cells: Vec<CellValue> = rows.iter().map(|row| cell(row, col).clone()).collect();
    while cells.last().is_some_and(CellValue::is_empty) {
        cells.pop();
    }
    GridColumn::Passthrough(PassthroughColumn {
        top: top.to_string(),
        sub: sub.to_string(),
        cells,
    })
}

fn parse_players(sheet: &RawSheet, catalog: &Catalog, report: &mut LoadReport) -> Inventory {
    if sheet.rows.len() < 2 {
        report.push(PLAYERS_SHEET, None, "sheet is missing its two header rows, no players loaded");
        let header = sheet.header();
        let layout = (0..header.len())
            .map(|col| passthrough(&cell(header, col).as_text().unwrap_or_default(), "", &[], col))
            .collect();
        return Inventory::from_parts(layout, Vec::new());
    }

    let width = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);
    let top_row = &sheet.rows[0];
    let sub_row = &sheet.rows[1];
    let data_rows = &sheet.rows[2..];

    // Merged name cells only carry text in their first column.
    let mut kinds: Vec<ColumnKind> = Vec::with_capacity(width);
    let mut current_top = String::new();
    for col in 0..width {
        if let Some(top) = cell(top_row, col).as_text() {
            current_top = top;
        }
        let sub = cell(sub_row, col).as_text().unwrap_or_default();
        if current_top.is_empty() || is_reserved_name(&current_top) {
            kinds.push(ColumnKind::Passthrough {
                top: current_top.clone(),
                sub,
            });
        } else {
            kinds.push(ColumnKind::Player {
                name: current_top.clone(),
                sub,
            });
        }
    }

    let mut groups: Vec<(String, PlayerColumns)> = Vec::new();
    for (col, kind) in kinds.iter().enumerate() {
        let ColumnKind::Player { name, sub } = kind else {
            continue;
        };
        let idx = match groups.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                groups.push((name.clone(), PlayerColumns::default()));
                groups.len() - 1
            }
        };
        let group = &mut groups[idx].1;
        let slot = if sub.eq_ignore_ascii_case(LOOT_SUBHEADER) {
            &mut group.loot
        } else if sub.eq_ignore_ascii_case(QTY_SUBHEADER) {
            &mut group.qty
        } else {
            report.push(PLAYERS_SHEET, None, format!("{name}: column {sub:?} is not a player column, kept as is"));
            continue;
        };
        if slot.is_some() {
            report.push(PLAYERS_SHEET, None, format!("{name}: second {sub:?} column kept as is"));
        } else {
            *slot = Some(col);
        }
    }

    let mut valid: Vec<(String, usize, usize)> = Vec::new();
    for (name, cols) in &groups {
        match (cols.loot, cols.qty) {
            (Some(loot), Some(qty)) => valid.push((name.clone(), loot, qty)),
            _ => report.push(
                PLAYERS_SHEET,
                None,
                format!("player {name} has no {LOOT_SUBHEADER}/{QTY_SUBHEADER} column pair, columns kept as is"),
            ),
        }
    }

    // Only the parsed Loot/Qty pairs are rebuilt on save; every other
    // column goes back out cell for cell.
    let mut layout: Vec<GridColumn> = Vec::new();
    for (col, kind) in kinds.iter().enumerate() {
        match kind {
            ColumnKind::Passthrough { top, sub } => layout.push(passthrough(top, sub, data_rows, col)),
            ColumnKind::Player { name, sub } => match valid.iter().find(|(n, _, _)| n == name) {
                Some((_, loot, qty)) if col == (*loot).min(*qty) => {
                    layout.push(GridColumn::Player(name.clone()));
                }
                Some((_, loot, qty)) if col == *loot || col == *qty => {}
                _ => layout.push(passthrough(name, sub, data_rows, col)),
            },
        }
    }

    let mut records: Vec<InventoryRecord> = Vec::new();
    for (name, loot_col, qty_col) in &valid {
        for (offset, row) in data_rows.iter().enumerate() {
            let excel_row = Some(sheet.excel_row(offset + 2));
            let item_cell = cell(row, *loot_col);
            let qty_cell = cell(row, *qty_col);
            let Some(item) = item_cell.as_text() else {
                continue;
            };
            if qty_cell.is_empty() {
                continue;
            }
            let Some(qty) = qty_cell.as_whole().filter(|q| *q >= 1) else {
                report.push(PLAYERS_SHEET, excel_row, format!("{name}: quantity of {item:?} is not a whole number >= 1"));
                continue;
            };
            let stack = records
                .iter()
                .filter(|r| r.player == *name && r.item == item)
                .try_fold(qty, |acc, r| acc.checked_add(r.qty));
            if stack.is_none() {
                report.push(PLAYERS_SHEET, excel_row, format!("{name}: total quantity of {item:?} is too large"));
                continue;
            }
            if !catalog.contains(&item) {
                report.push(PLAYERS_SHEET, excel_row, format!("{name}: {item:?} is not in the loot catalog"));
            }
            records.push(InventoryRecord {
                player: name.clone(),
                item,
                qty,
            });
        }
    }

    debug!(players = valid.len(), records = records.len(), "parsed players grid");
    Inventory::from_parts(layout, records)
}
