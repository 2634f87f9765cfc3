use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lootmaster_core::config::WORKBOOK_ENV;
use lootmaster_core::{
    AppConfig, InventoryDelta, LootError, LootLine, LootSession, LootTotals, Owner, Workbook,
};

#[derive(Debug, Parser)]
#[command(name = "lootmaster", version, about = "Roll loot boxes and manage party inventories")]
struct Args {
    /// Loot workbook (.xlsx). Defaults to the last workbook used.
    #[arg(long, global = true, env = WORKBOOK_ENV)]
    workbook: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the loot box sizes
    Boxes,
    /// List the players
    Players,
    /// Roll a loot box
    Roll {
        #[arg(long = "box")]
        box_name: String,
        /// RNG seed for a repeatable roll
        #[arg(long)]
        seed: Option<u64>,
        /// Give everything rolled to this player and save
        #[arg(long, value_name = "PLAYER")]
        take_all: Option<String>,
    },
    /// Show a player's inventory, or the whole party's
    Inventory {
        #[arg(long, default_value = "Party")]
        owner: String,
    },
    /// Add items to a player's inventory and save
    Give {
        #[arg(long)]
        player: String,
        #[arg(long)]
        item: String,
        #[arg(long, default_value_t = 1)]
        qty: u32,
    },
    /// Remove a whole stack from a player (or every player with Party) and save
    Drop {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        item: String,
    },
    /// Move items between two players and save
    Trade {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        item: String,
        /// Defaults to the whole stack
        #[arg(long)]
        qty: Option<u32>,
    },
    /// Load the workbook and report anything that was skipped
    Check,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_table(lines: &[LootLine]) {
    println!(
        "{:<7} {:<32} {:>5} {:>10} {:>10}",
        "Rarity", "Item", "Qty", "Value", "Weight"
    );
    for line in lines {
        println!(
            "{:<7} {:<32} {:>5} {:>10.1} {:>10.1}",
            line.scarcity, line.item, line.qty, line.value, line.weight
        );
    }
    let totals = LootTotals::of(lines);
    println!("{}    {}", totals.weight_label(), totals.value_label());
}

fn run(args: Args) -> lootmaster_core::Result<()> {
    let mut config = AppConfig::load();
    let path = config.resolve_workbook(args.workbook.as_deref());
    let (workbook, report) = Workbook::open(&path)?;
    config.workbook_path = Some(path.clone());

    if !report.is_empty() && !matches!(args.command, Command::Check) {
        eprintln!(
            "{} row(s) skipped or flagged, run `check` for details",
            report.len()
        );
    }

    match args.command {
        Command::Check => {
            println!(
                "{}: {} items, {} boxes, {} players",
                path.display(),
                workbook.catalog.len(),
                workbook.boxes.len(),
                workbook.inventory.players().len()
            );
            if report.is_empty() {
                println!("No problems found.");
            }
            for issue in &report.issues {
                println!("  {issue}");
            }
        }
        Command::Boxes => {
            println!(
                "{:<24} {:>9} {:>10} {:>10} {:>7} {:>7}",
                "Loot box", "Max items", "Min value", "Max value", "Min sc.", "Max sc."
            );
            for rule in &workbook.boxes {
                println!(
                    "{:<24} {:>9} {:>10} {:>10} {:>7} {:>7}",
                    rule.name,
                    rule.max_items,
                    rule.min_value,
                    rule.max_value,
                    rule.min_scarcity,
                    rule.max_scarcity
                );
            }
        }
        Command::Players => {
            for player in workbook.inventory.players() {
                println!("{player}");
            }
        }
        Command::Roll {
            box_name,
            seed,
            take_all,
        } => {
            let mut session = LootSession::new(workbook, seed);
            let lines = session.roll(&box_name)?.to_vec();
            println!("Roll {box_name}");
            print_table(&lines);
            config.last_box = Some(box_name);

            if let Some(player) = take_all {
                let taken = session.take_all(&player)?;
                session.save(&path)?;
                println!("{player} took {taken} item(s); saved {}", path.display());
                config.last_player = Some(player);
            }
        }
        Command::Inventory { owner } => {
            let owner = Owner::parse(&owner);
            if let Owner::Player(name) = &owner {
                if !workbook.inventory.has_player(name) {
                    return Err(LootError::UnknownPlayer(name.clone()));
                }
            }
            let session = LootSession::new(workbook, None);
            println!("Inventory of {owner}");
            print_table(&session.owned(&owner));
        }
        Command::Give { player, item, qty } => {
            let mut session = LootSession::new(workbook, None);
            session.apply(InventoryDelta {
                player: player.clone(),
                item: item.clone(),
                change: i64::from(qty),
            })?;
            session.save(&path)?;
            println!("Gave {qty} x {item} to {player}");
        }
        Command::Drop { owner, item } => {
            let owner = Owner::parse(&owner);
            let mut session = LootSession::new(workbook, None);
            let qty = session.drop_owned(&owner, &item)?;
            session.save(&path)?;
            println!("{owner} dropped {qty} x {item}");
        }
        Command::Trade {
            from,
            to,
            item,
            qty,
        } => {
            let mut session = LootSession::new(workbook, None);
            let moved = match qty {
                Some(qty) => {
                    session.trade(&from, &to, &item, qty)?;
                    qty
                }
                None => session.trade_all(&from, &to, &item)?,
            };
            session.save(&path)?;
            println!("{from} gave {moved} x {item} to {to}");
        }
    }

    if let Err(err) = config.save() {
        tracing::warn!(%err, "could not remember settings");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_roll_with_global_flags() {
        let args = Args::try_parse_from([
            "lootmaster",
            "roll",
            "--box",
            "Small chest",
            "--seed",
            "9",
            "--workbook",
            "party.xlsx",
        ])
        .unwrap();
        assert_eq!(args.workbook, Some(PathBuf::from("party.xlsx")));
        match args.command {
            Command::Roll {
                box_name,
                seed,
                take_all,
            } => {
                assert_eq!(box_name, "Small chest");
                assert_eq!(seed, Some(9));
                assert!(take_all.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn inventory_defaults_to_party() {
        let args = Args::try_parse_from(["lootmaster", "inventory"]).unwrap();
        assert!(matches!(args.command, Command::Inventory { owner } if owner == "Party"));
    }
}
