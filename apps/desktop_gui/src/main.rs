//! PolyInsights desktop client.
//!
//! The UI thread owns the egui app; a dedicated backend thread owns all
//! network clients and the workbench controller. The two sides talk over
//! bounded crossbeam channels.

mod backend_bridge;
mod controller;
mod ui;

use backend_bridge::commands::BackendCommand;
use controller::events::UiEvent;
use crossbeam_channel::bounded;
use ui::app::{PersistedAppSettings, PolyInsightsApp, SETTINGS_STORAGE_KEY};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    backend_bridge::runtime::spawn_backend_thread(cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("PolyInsights")
            .with_inner_size([1180.0, 780.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "PolyInsights",
        options,
        Box::new(move |cc| {
            let persisted = cc
                .storage
                .and_then(|storage| storage.get_string(SETTINGS_STORAGE_KEY))
                .and_then(|raw| serde_json::from_str::<PersistedAppSettings>(&raw).ok());
            Ok(Box::new(PolyInsightsApp::new(cmd_tx, ui_rx, persisted)))
        }),
    )
}
