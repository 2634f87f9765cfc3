use eframe::egui;
use egui_extras::{Column, TableBuilder};
use rand::Rng;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lootmaster_core::{AppConfig, LoadReport, LootLine, LootSession, LootTotals, Owner, Workbook};

const ROLL_HEADERS: [&str; 7] = ["Rarity", "Item", "Qty", "Value", "Weight", "Take", "Drop"];
const OWNED_HEADERS: [&str; 7] = ["Rarity", "Item", "Qty", "Value", "Weight", "Trade", "Drop"];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum WindowTab {
    BoxGenerator,
    Inventory,
}

enum RowAction {
    Take(String),
    DropRolled(String),
    Trade(String),
    DropOwned(String),
}

type LoadResult = std::result::Result<(Workbook, LoadReport), String>;

struct LootMasterApp {
    current_tab: WindowTab,
    config: AppConfig,
    workbook_path: String,
    loaded_path: Option<PathBuf>,
    discard_armed: bool,
    seed_text: String,
    applied_seed: Option<u64>,

    session: Option<LootSession>,
    box_choice: String,
    player_choice: String,
    owner_choice: Owner,
    trade_target: String,

    is_loading: bool,
    log: String,
    load_rx: Option<mpsc::Receiver<(PathBuf, LoadResult)>>,
}

impl Default for LootMasterApp {
    fn default() -> Self {
        let seed = rand::thread_rng().gen::<u64>();
        let config = AppConfig::load();
        let workbook_path = config.resolve_workbook(None).display().to_string();

        Self {
            current_tab: WindowTab::BoxGenerator,
            box_choice: config.last_box.clone().unwrap_or_default(),
            player_choice: config.last_player.clone().unwrap_or_default(),
            config,
            workbook_path,
            loaded_path: None,
            discard_armed: false,
            seed_text: seed.to_string(),
            applied_seed: None,

            session: None,
            owner_choice: Owner::Party,
            trade_target: String::new(),

            is_loading: false,
            log: String::new(),
            load_rx: None,
        }
    }
}

impl LootMasterApp {
    fn push_log(&mut self, msg: impl AsRef<str>) {
        if !self.log.is_empty() {
            self.log.push('\n');
        }
        self.log.push_str(msg.as_ref());
    }

    fn start_load(&mut self) {
        let path = PathBuf::from(self.workbook_path.trim());
        let (tx, rx) = mpsc::channel();
        self.load_rx = Some(rx);
        self.is_loading = true;
        self.push_log(format!("Loading {}...", path.display()));

        thread::spawn(move || {
            let result = Workbook::open(&path).map_err(|e| e.to_string());
            let _ = tx.send((path, result));
        });
    }

    fn finish_load(&mut self, path: PathBuf, result: LoadResult) {
        self.is_loading = false;
        match result {
            Ok((workbook, report)) => {
                for issue in &report.issues {
                    self.push_log(format!("Skipped: {issue}"));
                }
                let players: Vec<String> = workbook
                    .inventory
                    .players()
                    .iter()
                    .map(|p| p.to_string())
                    .collect();
                if workbook.box_rule(&self.box_choice).is_none() {
                    self.box_choice = workbook.box_names().first().map(|s| s.to_string()).unwrap_or_default();
                }
                if !players.contains(&self.player_choice) {
                    self.player_choice = players.first().cloned().unwrap_or_default();
                }
                if !players.contains(&self.trade_target) {
                    self.trade_target = players.first().cloned().unwrap_or_default();
                }
                if let Owner::Player(name) = &self.owner_choice {
                    if !players.contains(name) {
                        self.owner_choice = Owner::Party;
                    }
                }

                self.push_log(format!(
                    "Loaded {} items, {} loot boxes and {} players.",
                    workbook.catalog.len(),
                    workbook.boxes.len(),
                    players.len()
                ));
                let seed = self.seed_text.trim().parse::<u64>().ok();
                self.applied_seed = seed;
                self.session = Some(LootSession::new(workbook, seed));

                self.workbook_path = path.display().to_string();
                self.loaded_path = Some(path.clone());
                self.config.workbook_path = Some(path);
                self.remember();
            }
            Err(e) => {
                error!(path = %path.display(), "load failed: {e}");
                self.push_log(format!("Could not load {}: {e}", path.display()));
            }
        }
    }

    /// Asks twice before a reload throws away unsaved changes.
    fn request_load(&mut self) {
        let pending = self.session.as_ref().map_or(0, |s| s.pending().len());
        if pending > 0 && !self.discard_armed {
            self.discard_armed = true;
            warn!(pending, "reload requested with unsaved changes");
            self.push_log(format!(
                "{pending} unsaved change(s) would be lost. Save first, or Reload again to discard them."
            ));
            return;
        }
        self.discard_armed = false;
        self.start_load();
    }

    fn save(&mut self) {
        self.discard_armed = false;
        let Some(path) = self.loaded_path.clone() else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let pending = session.pending().len();
        match session.save(&path) {
            Ok(()) => self.push_log(format!("Saved {pending} change(s) to {}.", path.display())),
            Err(e) => self.push_log(format!("Save failed: {e}")),
        }
    }

    fn remember(&mut self) {
        self.config.last_box = Some(self.box_choice.clone()).filter(|s| !s.is_empty());
        self.config.last_player = Some(self.player_choice.clone()).filter(|s| !s.is_empty());
        if let Err(e) = self.config.save() {
            self.push_log(format!("Could not save settings: {e}"));
        }
    }

    fn roll(&mut self) {
        let seed = self.seed_text.trim().parse::<u64>().ok();
        let box_name = self.box_choice.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(seed) = seed.filter(|s| Some(*s) != self.applied_seed) {
            session.reseed(seed);
            self.applied_seed = Some(seed);
        }

        info!("Roll {box_name}");
        let msg = match session.roll(&box_name) {
            Ok(lines) => format!("Rolled {} item(s) from {box_name}.", lines.len()),
            Err(e) => format!("Roll failed: {e}"),
        };
        self.push_log(msg);
        self.remember();
    }

    fn apply(&mut self, action: RowAction) {
        let player = self.player_choice.clone();
        let owner = self.owner_choice.clone();
        let target = self.trade_target.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let msg = match action {
            RowAction::Take(item) => match session.take(&item, &player) {
                Ok(()) => format!("{player} took {item}."),
                Err(e) => format!("Take failed: {e}"),
            },
            RowAction::DropRolled(item) => match session.drop_rolled(&item) {
                Ok(line) => format!("Dropped {} x {} from the box.", line.qty, line.item),
                Err(e) => format!("Drop failed: {e}"),
            },
            RowAction::Trade(item) => match &owner {
                Owner::Player(from) => match session.trade_all(from, &target, &item) {
                    Ok(qty) => format!("{from} gave {qty} x {item} to {target}."),
                    Err(e) => format!("Trade failed: {e}"),
                },
                Owner::Party => "Pick a single player to trade from.".to_string(),
            },
            RowAction::DropOwned(item) => match session.drop_owned(&owner, &item) {
                Ok(qty) => format!("{owner} dropped {qty} x {item}."),
                Err(e) => format!("Drop failed: {e}"),
            },
        };
        self.push_log(msg);
    }

    fn totals_row(ui: &mut egui::Ui, totals: LootTotals) {
        ui.horizontal(|ui| {
            ui.label(totals.weight_label());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(totals.value_label());
            });
        });
    }

    fn loot_table(
        ui: &mut egui::Ui,
        headers: &[&str; 7],
        lines: &[LootLine],
        first: fn(String) -> RowAction,
        second: fn(String) -> RowAction,
        actions: &mut Vec<RowAction>,
    ) {
        TableBuilder::new(ui)
            .striped(true)
            .columns(Column::auto().at_least(48.0), 5)
            .column(Column::auto())
            .column(Column::remainder())
            .header(20.0, |mut header| {
                for title in headers {
                    header.col(|ui| {
                        ui.strong(*title);
                    });
                }
            })
            .body(|mut body| {
                for line in lines {
                    body.row(22.0, |mut row| {
                        row.col(|ui| {
                            ui.label(line.scarcity.to_string());
                        });
                        row.col(|ui| {
                            ui.label(line.item.as_str());
                        });
                        row.col(|ui| {
                            ui.label(line.qty.to_string());
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}", line.value));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}", line.weight));
                        });
                        row.col(|ui| {
                            if ui.button(headers[5]).clicked() {
                                actions.push(first(line.item.clone()));
                            }
                        });
                        row.col(|ui| {
                            let drop = egui::Button::new(
                                egui::RichText::new(headers[6]).color(egui::Color32::WHITE),
                            )
                            .fill(egui::Color32::from_rgb(0xF5, 0x55, 0x55));
                            if ui.add(drop).clicked() {
                                actions.push(second(line.item.clone()));
                            }
                        });
                    });
                }
            });
    }

    fn box_generator_ui(&mut self, ui: &mut egui::Ui, actions: &mut Vec<RowAction>) {
        let Some(session) = self.session.as_ref() else {
            ui.label("Load a workbook to roll loot.");
            return;
        };
        let boxes: Vec<String> = session.workbook().box_names().iter().map(|s| s.to_string()).collect();
        let players: Vec<String> = session
            .workbook()
            .inventory
            .players()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rolled = session.rolled().to_vec();
        let totals = session.rolled_totals();

        let mut roll_clicked = false;
        let mut take_all_clicked = false;

        ui.horizontal(|ui| {
            ui.label("Loot Box:");
            egui::ComboBox::from_id_source("box_choice")
                .selected_text(self.box_choice.as_str())
                .show_ui(ui, |ui| {
                    for name in &boxes {
                        ui.selectable_value(&mut self.box_choice, name.clone(), name.as_str());
                    }
                });
            ui.label("Seed:");
            ui.text_edit_singleline(&mut self.seed_text);
            if ui.button("Random seed").clicked() {
                self.seed_text = rand::thread_rng().gen::<u64>().to_string();
            }
            roll_clicked = ui.button("Roll").clicked();
        });

        ui.separator();

        ui.horizontal(|ui| {
            ui.label("Player:");
            egui::ComboBox::from_id_source("player_choice")
                .selected_text(self.player_choice.as_str())
                .show_ui(ui, |ui| {
                    for name in &players {
                        ui.selectable_value(&mut self.player_choice, name.clone(), name.as_str());
                    }
                });
            take_all_clicked = ui
                .add_enabled(!rolled.is_empty(), egui::Button::new("Take All"))
                .clicked();
        });

        Self::totals_row(ui, totals);
        ui.separator();
        Self::loot_table(ui, &ROLL_HEADERS, &rolled, RowAction::Take, RowAction::DropRolled, actions);

        if roll_clicked {
            self.roll();
        }
        if take_all_clicked {
            let player = self.player_choice.clone();
            if let Some(session) = self.session.as_mut() {
                let msg = match session.take_all(&player) {
                    Ok(n) => format!("{player} took {n} item(s)."),
                    Err(e) => format!("Take All failed: {e}"),
                };
                self.push_log(msg);
                self.remember();
            }
        }
    }

    fn inventory_ui(&mut self, ui: &mut egui::Ui, actions: &mut Vec<RowAction>) {
        let Some(session) = self.session.as_ref() else {
            ui.label("Load a workbook to see inventories.");
            return;
        };
        let owners = session.workbook().inventory.owners();
        let players: Vec<String> = session
            .workbook()
            .inventory
            .players()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let owned = session.owned(&self.owner_choice);
        let totals = LootTotals::of(&owned);

        ui.horizontal(|ui| {
            ui.label("Player:");
            egui::ComboBox::from_id_source("owner_choice")
                .selected_text(self.owner_choice.to_string())
                .show_ui(ui, |ui| {
                    for owner in &owners {
                        ui.selectable_value(&mut self.owner_choice, owner.clone(), owner.to_string());
                    }
                });
            ui.label("Trade to:");
            egui::ComboBox::from_id_source("trade_target")
                .selected_text(self.trade_target.as_str())
                .show_ui(ui, |ui| {
                    for name in &players {
                        ui.selectable_value(&mut self.trade_target, name.clone(), name.as_str());
                    }
                });
        });

        Self::totals_row(ui, totals);
        ui.separator();
        Self::loot_table(ui, &OWNED_HEADERS, &owned, RowAction::Trade, RowAction::DropOwned, actions);
    }
}

impl eframe::App for LootMasterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(rx) = self.load_rx.as_ref() {
            if let Ok((path, result)) = rx.try_recv() {
                self.load_rx = None;
                self.finish_load(path, result);
            }
        }

        egui::TopBottomPanel::bottom("log").resizable(true).show(ctx, |ui| {
            ui.label("Log:");
            egui::ScrollArea::vertical()
                .id_source("log_scroll")
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    ui.monospace(&self.log);
                });
        });

        let mut actions: Vec<RowAction> = Vec::new();
        let mut load_clicked = false;
        let mut save_clicked = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Workbook:");
                ui.text_edit_singleline(&mut self.workbook_path);
                if ui.button("Browse...").clicked() {
                    let mut dialog = rfd::FileDialog::new().add_filter("Excel workbook", &["xlsx"]);
                    if let Some(parent) = PathBuf::from(self.workbook_path.trim()).parent() {
                        if parent.is_dir() {
                            dialog = dialog.set_directory(parent);
                        }
                    }
                    if let Some(path) = dialog.pick_file() {
                        self.workbook_path = path.display().to_string();
                        load_clicked = true;
                    }
                }
                if ui.add_enabled(!self.is_loading, egui::Button::new("Reload")).clicked() {
                    load_clicked = true;
                }

                let pending = self.session.as_ref().map_or(0, |s| s.pending().len());
                let label = if pending > 0 {
                    format!("Save ({pending} pending)")
                } else {
                    "Save".to_string()
                };
                let target = self
                    .loaded_path
                    .as_ref()
                    .map_or_else(String::new, |p| format!("Writes {}", p.display()));
                if ui
                    .add_enabled(self.session.is_some() && !self.is_loading, egui::Button::new(label))
                    .on_hover_text(target)
                    .clicked()
                {
                    save_clicked = true;
                }
            });

            ui.separator();

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.current_tab, WindowTab::BoxGenerator, "Loot Box Generator");
                ui.selectable_value(&mut self.current_tab, WindowTab::Inventory, "Player Inventory");
            });

            ui.separator();

            match self.current_tab {
                WindowTab::BoxGenerator => self.box_generator_ui(ui, &mut actions),
                WindowTab::Inventory => self.inventory_ui(ui, &mut actions),
            }
        });

        for action in actions {
            self.apply(action);
        }
        if save_clicked {
            self.save();
        }
        if load_clicked && !self.is_loading {
            self.request_load();
        }

        if self.is_loading {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Loot Master")
            .with_inner_size([760.0, 560.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Loot Master",
        native_options,
        Box::new(|cc| {
            // Dark theme with brighter text for the tables.
            cc.egui_ctx.set_visuals(egui::Visuals::dark());

            let mut style = (*cc.egui_ctx.style()).clone();
            style.visuals.override_text_color = Some(egui::Color32::from_rgb(240, 240, 240));
            cc.egui_ctx.set_style(style);

            let mut app = LootMasterApp::default();
            if PathBuf::from(app.workbook_path.trim()).exists() {
                app.start_load();
            }
            Box::new(app)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lootmaster_core::{Catalog, Inventory, InventoryDelta};

    fn app_with_change() -> LootMasterApp {
        let workbook = Workbook::new(Catalog::new(Vec::new()), Vec::new(), Inventory::new(&["Ada"]));
        let mut session = LootSession::new(workbook, Some(1));
        session
            .apply(InventoryDelta {
                player: "Ada".into(),
                item: "Rope".into(),
                change: 1,
            })
            .unwrap();
        LootMasterApp {
            session: Some(session),
            ..Default::default()
        }
    }

    #[test]
    fn save_writes_the_loaded_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = dir.path().join("loaded.xlsx");
        let typed = dir.path().join("typed.xlsx");
        let mut app = app_with_change();
        app.loaded_path = Some(loaded.clone());
        app.workbook_path = typed.display().to_string();

        app.save();
        assert!(loaded.exists());
        assert!(!typed.exists());
        assert_eq!(app.session.as_ref().map(|s| s.pending().len()), Some(0));
    }

    #[test]
    fn reload_with_pending_changes_needs_a_second_click() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_change();
        app.workbook_path = dir.path().join("missing.xlsx").display().to_string();

        app.request_load();
        assert!(!app.is_loading);
        assert!(app.log.contains("unsaved change(s) would be lost"));

        app.request_load();
        assert!(app.is_loading);
        assert!(!app.discard_armed);
    }
}
