#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resource_gantt=info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([800.0, 400.0])
            .with_title("Resource Gantt"),
        ..Default::default()
    };

    eframe::run_native(
        "Resource Gantt",
        options,
        Box::new(|cc| Ok(Box::new(app::SchedulerApp::new(cc, runtime)))),
    )?;
    Ok(())
}
