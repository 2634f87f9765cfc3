use std::path::PathBuf;
use thiserror::Error;

mod catalog;
pub mod config;
mod inventory;
mod roll;
mod session;
pub mod workbook;
mod writer;

pub use catalog::{round1, BoxRule, Catalog, LootItem, LootLine, LootTotals};
pub use config::AppConfig;
pub use inventory::{Inventory, InventoryDelta, InventoryRecord, Owner, PARTY, PLAYERS_COLUMN};
pub use roll::{roll_box, roll_loot};
pub use session::LootSession;
pub use workbook::{CellValue, LoadIssue, LoadReport, Workbook};

#[derive(Debug, Error)]
pub enum LootError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("could not write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
    #[error("workbook {} has no sheet named {sheet:?}", path.display())]
    MissingSheet { path: PathBuf, sheet: String },
    #[error("sheet {sheet:?} has no {column:?} column")]
    MissingColumn { sheet: String, column: String },
    #[error("unknown loot box: {0}")]
    UnknownBox(String),
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    #[error("{item:?} is not in the rolled loot box")]
    NotRolled { item: String },
    #[error("{owner} holds no {item:?}")]
    ItemNotHeld { owner: String, item: String },
    #[error("{player} holds {held} x {item:?}, cannot remove {wanted}")]
    InsufficientQuantity {
        player: String,
        item: String,
        held: u32,
        wanted: u32,
    },
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("cannot trade {item:?} from {player} to themselves")]
    InvalidTrade { player: String, item: String },
    #[error("{player} cannot hold that many {item:?}")]
    QuantityOverflow { player: String, item: String },
    #[error("{kind} {index} is out of range for a worksheet")]
    OutOfRange { kind: &'static str, index: usize },
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LootError>;
