//! UI layer: app shell, pages, and the PDF export capture path.

pub mod app;

pub use app::{PolyInsightsApp, SETTINGS_STORAGE_KEY};
