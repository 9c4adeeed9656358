use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::ui;
use resource_gantt::board::{self, Quiet};
use resource_gantt::io::{csv_import, file, JsonFileBackend};
use resource_gantt::model::{Operation, OperationStatus, Resource, ResourceId};
use resource_gantt::{
    BoardConfig, MemoryBackend, Notice, ReschedulePort, ScheduleBoard, Settlement, SnapshotSource, Strategy,
    StrategyOutcome, Submission,
};

/// Side panel requests, applied after the panel closure releases `self`.
enum PanelAction {
    None,
    Reorder { resource: ResourceId, from: usize, to: usize },
    CommitOutcome,
    DiscardOutcome,
}

/// Main application state.
pub struct SchedulerApp {
    pub board: ScheduleBoard,
    source: Arc<dyn SnapshotSource>,
    pub file_path: Option<PathBuf>,
    config_path: PathBuf,

    /// Strategy result waiting for the user to commit or discard it.
    pub pending_outcome: Option<StrategyOutcome>,
    pub show_about: bool,

    // Status message
    pub status_message: String,
    shown_notice: Option<Notice>,

    runtime: Runtime,
    settled_tx: mpsc::UnboundedSender<Settlement>,
    settled_rx: mpsc::UnboundedReceiver<Settlement>,
}

impl SchedulerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime) -> Self {
        // Register Phosphor icon font as a fallback so icons render inline with text
        let mut fonts = egui::FontDefinitions::default();
        egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
        cc.egui_ctx.set_fonts(fonts);

        let config_path = BoardConfig::default_path();
        let config = BoardConfig::load(&config_path);
        let (operations, resources) = Self::sample_schedule(Utc::now());
        let backend = Arc::new(MemoryBackend::new(operations, resources));
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        let mut app = Self {
            board: ScheduleBoard::new(config, backend.clone(), Arc::new(Quiet)),
            source: backend,
            file_path: None,
            config_path,
            pending_outcome: None,
            show_about: false,
            status_message: "Ready".to_string(),
            shown_notice: None,
            runtime,
            settled_tx,
            settled_rx,
        };
        app.refresh();
        app
    }

    /// A small demo shop floor starting at the current hour.
    fn sample_schedule(now: DateTime<Utc>) -> (Vec<Operation>, Vec<Resource>) {
        let base = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        let at = |minutes: i64| base + Duration::minutes(minutes);

        let resources = vec![
            Resource::new("SAW-1", "Band saw"),
            Resource::new("CNC-1", "CNC mill").bottleneck(),
            Resource::new("WELD-1", "Welding cell"),
            Resource::new("PAINT", "Paint line").parallel(),
            Resource::new("CNC-2", "Old mill").inactive(),
        ];

        let mut cut = Operation::new("op-10", "Cut blanks", 60).on("SAW-1").starting_at(at(0));
        cut.status = OperationStatus::InProgress;
        cut.completion_percentage = 40;

        let operations = vec![
            cut,
            Operation::new("op-20", "Mill housing", 90)
                .on("CNC-1")
                .starting_at(at(90))
                .with_priority(2)
                .after("op-10"),
            Operation::new("op-30", "Weld frame", 120)
                .on("WELD-1")
                .starting_at(at(60))
                .after("op-10"),
            Operation::new("op-40", "Mill bracket", 45)
                .on("CNC-1")
                .starting_at(at(210))
                .with_priority(1),
            Operation::new("op-50", "Paint frame", 60)
                .on("PAINT")
                .starting_at(at(210))
                .after("op-30")
                .due_by(at(8 * 60)),
            Operation::new("op-60", "Paint housing", 60)
                .on("PAINT")
                .starting_at(at(240))
                .after("op-20"),
            Operation::new("op-70", "Legacy fixture", 30).on("CNC-2").starting_at(at(120)),
            Operation::new("op-80", "Deburr spares", 30).with_priority(8),
        ];
        (operations, resources)
    }

    // --- Backends ---

    fn install_backend<B>(&mut self, backend: Arc<B>, file_path: Option<PathBuf>)
    where
        B: ReschedulePort + SnapshotSource + 'static,
    {
        let mut board = ScheduleBoard::new(self.board.config().clone(), backend.clone(), Arc::new(Quiet));
        board.set_zoom(self.board.zoom());
        self.board = board;
        self.source = backend;
        self.file_path = file_path;
        self.pending_outcome = None;
        self.refresh();
    }

    /// Re-fetch the snapshot from the current backend.
    pub fn refresh(&mut self) {
        let source = Arc::clone(&self.source);
        if let Err(e) = self.runtime.block_on(self.board.load(source.as_ref())) {
            self.status_message = format!("Cannot refresh: {}", e);
        }
        self.sync_status();
    }

    pub fn open_snapshot(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Schedule snapshot", &["json"])
            .pick_file()
        {
            match JsonFileBackend::open(&path) {
                Ok(backend) => self.install_backend(Arc::new(backend), Some(path)),
                Err(e) => self.status_message = format!("Error loading: {}", e),
            }
        }
    }

    pub fn save_snapshot_as(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Schedule snapshot", &["json"])
            .set_file_name("schedule.json")
            .save_file()
        else {
            return;
        };
        let state = self.board.state();
        let operations: Vec<Operation> = state.operations().cloned().collect();
        let resources: Vec<Resource> = state.resources().cloned().collect();
        match JsonFileBackend::create(&path, operations, resources) {
            Ok(backend) => {
                self.install_backend(Arc::new(backend), Some(path));
                self.status_message = "Schedule saved".to_string();
            }
            Err(e) => self.status_message = format!("Error saving: {}", e),
        }
    }

    /// Export the current view without switching backends.
    pub fn export_snapshot(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Schedule snapshot", &["json"])
            .set_file_name("schedule-export.json")
            .save_file()
        {
            let state = self.board.state();
            let operations: Vec<Operation> = state.operations().cloned().collect();
            let resources: Vec<Resource> = state.resources().cloned().collect();
            self.status_message = match file::save_snapshot(&operations, &resources, &path) {
                Ok(()) => format!("Exported {} operations", operations.len()),
                Err(e) => format!("Export failed: {}", e),
            };
        }
    }

    pub fn import_csv(&mut self) {
        if self.board.state().operation_count() > 0 {
            let confirm = rfd::MessageDialog::new()
                .set_title("Import CSV")
                .set_description("This will replace the current schedule. Continue?")
                .set_buttons(rfd::MessageButtons::YesNo)
                .show();
            if confirm != rfd::MessageDialogResult::Yes {
                return;
            }
        }

        let Some(path) = rfd::FileDialog::new()
            .add_filter("CSV Files", &["csv", "txt"])
            .pick_file()
        else {
            return;
        };
        match csv_import::import_csv(&path) {
            Ok((parsed, skipped)) => {
                // Keep the known resources; referenced ones we have never seen
                // get a lane of their own.
                let mut resources: Vec<Resource> = self.board.state().resources().cloned().collect();
                for rid in parsed.accepted.iter().filter_map(|o| o.resource_id.as_ref()) {
                    if !resources.iter().any(|r| &r.id == rid) {
                        resources.push(Resource::new(rid.as_str(), rid.as_str()));
                    }
                }
                let count = parsed.accepted.len();
                let quarantined = parsed.quarantined.len();
                self.install_backend(Arc::new(MemoryBackend::new(parsed.accepted, resources)), None);
                self.status_message = if skipped + quarantined > 0 {
                    format!("Imported {} operations ({} rows skipped)", count, skipped + quarantined)
                } else {
                    format!("Imported {} operations", count)
                };
            }
            Err(e) => self.status_message = format!("CSV import failed: {}", e),
        }
    }

    // --- Scheduling ---

    pub fn apply_strategy(&mut self, strategy: Strategy) {
        match self.board.apply_strategy(strategy, Utc::now()) {
            Ok(outcome) => {
                self.status_message = if strategy.reschedules() {
                    format!("{}: {} operation(s) would move", strategy, outcome.changed.len())
                } else {
                    format!("{}: {} critical operation(s)", strategy, outcome.critical.len())
                };
                self.pending_outcome = strategy.reschedules().then_some(outcome);
            }
            Err(_) => {
                self.pending_outcome = None;
                self.sync_status();
            }
        }
    }

    pub fn commit_pending(&mut self, ctx: &egui::Context) {
        let Some(outcome) = self.pending_outcome.take() else { return };
        match self.board.commit_outcome(&outcome) {
            Ok(Some(submission)) => self.dispatch(submission, ctx),
            Ok(None) => self.status_message = format!("{}: nothing to commit", outcome.strategy),
            Err(e) => {
                self.status_message = e.to_string();
                self.pending_outcome = Some(outcome);
            }
        }
        self.sync_status();
    }

    pub fn toggle_critical_marking(&mut self) {
        let mut config = self.board.config().clone();
        config.mark_critical_path = !config.mark_critical_path;
        if let Err(e) = config.save(&self.config_path) {
            tracing::warn!(error = %e, "could not save settings");
        }
        self.board.set_config(config);
    }

    pub fn reset_sequence(&mut self) {
        match self.board.reset_sequence() {
            Ok(()) => self.status_message = "Sequence reset".to_string(),
            Err(e) => self.status_message = e.to_string(),
        }
    }

    pub fn zoom_in(&mut self) {
        self.board.set_zoom(self.board.zoom() * 1.25);
    }

    pub fn zoom_out(&mut self) {
        self.board.set_zoom(self.board.zoom() / 1.25);
    }

    // --- Commits ---

    /// Run a submission on the runtime; its settlement comes back through the channel.
    fn dispatch(&mut self, submission: Submission, ctx: &egui::Context) {
        let port = self.board.port();
        let limit = self.board.config().commit_timeout();
        let tx = self.settled_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let settlement = board::submit(port.as_ref(), submission, limit).await;
            let _ = tx.send(settlement);
            ctx.request_repaint();
        });
    }

    fn poll_settlements(&mut self) {
        while let Ok(settlement) = self.settled_rx.try_recv() {
            self.board.settle(settlement);
        }
    }

    /// Show the board's latest notice once.
    fn sync_status(&mut self) {
        let notice = self.board.last_notice();
        if notice != self.shown_notice.as_ref() {
            if let Some(notice) = notice {
                let icon = if notice.is_error() {
                    egui_phosphor::regular::WARNING
                } else {
                    egui_phosphor::regular::CHECK
                };
                self.status_message = format!("{} {}", icon, notice);
            }
            self.shown_notice = notice.cloned();
        }
    }

    fn show_lanes(&self, ui: &mut egui::Ui) -> PanelAction {
        let mut action = PanelAction::None;

        if let Some(outcome) = &self.pending_outcome {
            ui.label(
                egui::RichText::new(format!("{} proposal", outcome.strategy))
                    .strong()
                    .color(ui::theme::TEXT_PRIMARY),
            );
            ui.label(format!("{} operation(s) move", outcome.changed.len()));
            if !outcome.flagged.is_empty() {
                ui.colored_label(
                    ui::theme::NOTICE_ERROR,
                    format!("{} on inactive or unknown resources", outcome.flagged.len()),
                );
            }
            ui.horizontal(|ui| {
                if ui.button(format!("{} Commit", egui_phosphor::regular::CHECK)).clicked() {
                    action = PanelAction::CommitOutcome;
                }
                if ui.button(format!("{} Discard", egui_phosphor::regular::X)).clicked() {
                    action = PanelAction::DiscardOutcome;
                }
            });
            ui.separator();
        }

        egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
            let state = self.board.state();
            for resource in state.resources() {
                let lane = state.lane_operations(&resource.id);
                let header = format!("{} ({})", resource.name, lane.len());
                egui::CollapsingHeader::new(header)
                    .id_salt(("lane", resource.id.as_str()))
                    .default_open(true)
                    .show(ui, |ui| {
                        for (i, op) in lane.iter().enumerate() {
                            ui.horizontal(|ui| {
                                let up = ui.add_enabled(i > 0, egui::Button::new(egui_phosphor::regular::ARROW_UP).small());
                                let down = ui.add_enabled(
                                    i + 1 < lane.len(),
                                    egui::Button::new(egui_phosphor::regular::ARROW_DOWN).small(),
                                );
                                if up.clicked() {
                                    action = PanelAction::Reorder {
                                        resource: resource.id.clone(),
                                        from: i,
                                        to: i - 1,
                                    };
                                }
                                if down.clicked() {
                                    action = PanelAction::Reorder {
                                        resource: resource.id.clone(),
                                        from: i,
                                        to: i + 1,
                                    };
                                }
                                let time = op.start.map(|s| s.format("%H:%M").to_string()).unwrap_or_default();
                                ui.label(egui::RichText::new(time).color(ui::theme::TEXT_DIM));
                                ui.label(&op.name);
                            });
                        }
                    });
            }

            let unscheduled = state.unscheduled();
            if !unscheduled.is_empty() {
                ui.separator();
                ui.label(
                    egui::RichText::new(format!("{} Unscheduled", egui_phosphor::regular::TRAY))
                        .color(ui::theme::TEXT_SECONDARY),
                );
                for op in unscheduled {
                    ui.label(format!("{} · {} min", op.name, op.duration_minutes));
                }
            }
        });

        action
    }
}

impl eframe::App for SchedulerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ui::theme::apply_theme(ctx);
        self.poll_settlements();

        let should_refresh = ctx.input(|i| i.modifiers.ctrl && i.key_pressed(egui::Key::R));
        if should_refresh {
            self.refresh();
        }

        // Top panel: toolbar
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui::toolbar::show_toolbar(self, ui);
        });

        // Bottom panel: status bar
        egui::TopBottomPanel::bottom("status_bar")
            .exact_height(ui::theme::status_bar_height())
            .frame(
                egui::Frame::default()
                    .fill(ui::theme::status_bar_bg())
                    .inner_margin(egui::Margin::symmetric(10.0, 0.0)),
            )
            .show(ctx, |ui| {
                ui.horizontal_centered(|ui| {
                    let color = match self.board.last_notice() {
                        Some(n) if n.is_error() && self.shown_notice.as_ref() == Some(n) => ui::theme::NOTICE_ERROR,
                        _ => ui::theme::TEXT_SECONDARY,
                    };
                    ui.label(
                        egui::RichText::new(&self.status_message)
                            .font(ui::theme::font_status())
                            .color(color),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(
                            egui::RichText::new(format!("Operations: {}", self.board.state().operation_count()))
                                .size(10.5)
                                .color(ui::theme::TEXT_DIM),
                        );
                        ui.label(egui::RichText::new(" · ").size(10.5).color(ui::theme::TEXT_DIM));
                        ui.label(
                            egui::RichText::new(format!("Zoom: {:.0}%", self.board.zoom() * 100.0))
                                .size(10.5)
                                .color(ui::theme::TEXT_DIM),
                        );
                        if self.board.phase() == board::BoardPhase::Committing {
                            ui.label(egui::RichText::new(" · ").size(10.5).color(ui::theme::TEXT_DIM));
                            ui.spinner();
                        }
                    });
                });
            });

        // Left panel: lane sequences
        let mut action = PanelAction::None;
        egui::SidePanel::left("lane_panel")
            .default_width(260.0)
            .min_width(180.0)
            .resizable(true)
            .frame(
                egui::Frame::default()
                    .fill(ui::theme::BG_PANEL)
                    .inner_margin(egui::Margin::same(8.0))
                    .stroke(egui::Stroke::new(1.0, ui::theme::BORDER_SUBTLE)),
            )
            .show(ctx, |ui| {
                action = self.show_lanes(ui);
            });

        match action {
            PanelAction::Reorder { resource, from, to } => match self.board.reorder_lane(&resource, from, to) {
                Ok(Some(submission)) => self.dispatch(submission, ctx),
                Ok(None) => {}
                Err(e) => self.status_message = e.to_string(),
            },
            PanelAction::CommitOutcome => self.commit_pending(ctx),
            PanelAction::DiscardOutcome => {
                self.pending_outcome = None;
                self.status_message = "Proposal discarded".to_string();
            }
            PanelAction::None => {}
        }

        // Central panel: schedule board
        let board_frame = egui::Frame::default()
            .fill(ui::theme::BG_DARK)
            .inner_margin(egui::Margin::ZERO);
        egui::CentralPanel::default().frame(board_frame).show(ctx, |ui| {
            let interaction = ui::board_view::show_board(&mut self.board, Utc::now(), ui);
            if let Some(submission) = interaction.submission {
                self.dispatch(submission, ctx);
            }
            if let Some(err) = interaction.refused {
                self.status_message = err.to_string();
            }
        });

        self.sync_status();

        if self.show_about {
            egui::Window::new("About")
                .collapsible(false)
                .resizable(false)
                .open(&mut self.show_about)
                .show(ctx, |ui| {
                    ui.heading("Resource Gantt");
                    ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                    ui.label("Drag operations between resource lanes to reschedule them.");
                    ui.label("Drag a block's right edge to change its duration. Esc cancels a drag.");
                });
        }
    }
}
