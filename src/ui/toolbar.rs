use crate::app::SchedulerApp;
use crate::ui::theme;
use egui::{menu, RichText, Ui};
use resource_gantt::Strategy;

/// Render the top toolbar / menu bar.
pub fn show_toolbar(app: &mut SchedulerApp, ui: &mut Ui) {
    let ctx = ui.ctx().clone();
    menu::bar(ui, |ui| {
        ui.menu_button(RichText::new("  File  ").font(theme::font_menu()), |ui| {
            if ui.button("  Open Snapshot...").clicked() {
                app.open_snapshot();
                ui.close_menu();
            }
            if ui.button("  Save Snapshot As...").clicked() {
                app.save_snapshot_as();
                ui.close_menu();
            }
            if ui.button("  Export Snapshot...").clicked() {
                app.export_snapshot();
                ui.close_menu();
            }
            ui.separator();
            if ui.button("  Import CSV...").clicked() {
                app.import_csv();
                ui.close_menu();
            }
            ui.separator();
            if ui.button("  Refresh          Ctrl+R").clicked() {
                app.refresh();
                ui.close_menu();
            }
        });

        ui.menu_button(RichText::new("  View  ").font(theme::font_menu()), |ui| {
            if ui.button("  Zoom In        Ctrl+Scroll ↑").clicked() {
                app.zoom_in();
                ui.close_menu();
            }
            if ui.button("  Zoom Out      Ctrl+Scroll ↓").clicked() {
                app.zoom_out();
                ui.close_menu();
            }
        });

        ui.menu_button(RichText::new("  Schedule  ").font(theme::font_menu()), |ui| {
            for strategy in Strategy::ALL {
                if ui.button(format!("  {}", strategy)).clicked() {
                    app.apply_strategy(strategy);
                    ui.close_menu();
                }
            }
            ui.separator();
            let can_commit = app.pending_outcome.is_some();
            if ui
                .add_enabled(can_commit, egui::Button::new("  Commit Proposal"))
                .clicked()
            {
                app.commit_pending(&ctx);
                ui.close_menu();
            }
            let mut mark = app.board.config().mark_critical_path;
            if ui.checkbox(&mut mark, "Mark critical path").clicked() {
                app.toggle_critical_marking();
                ui.close_menu();
            }
            ui.separator();
            if ui.button("  Reset Sequence").clicked() {
                app.reset_sequence();
                ui.close_menu();
            }
        });

        ui.menu_button(RichText::new("  Help  ").font(theme::font_menu()), |ui| {
            if ui.button("About").clicked() {
                app.show_about = true;
                ui.close_menu();
            }
        });

        // Right-aligned backend name
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let source = match &app.file_path {
                Some(path) => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                None => "in-memory schedule".to_string(),
            };
            ui.label(RichText::new(source).size(11.0).weak());
        });
    });
}
