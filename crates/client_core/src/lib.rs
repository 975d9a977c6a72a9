//! Client-side logic for the PolyInsights desktop apps: the query workbench
//! state machine, the webhook analysis backend, and thin clients for the
//! external auth provider and record store.

pub mod auth;
pub mod config;
pub mod export;
pub mod records;
pub mod report_markup;
pub mod webhook;
pub mod workbench;

pub use auth::{resolve_route, AuthClient, AuthSession, AuthenticatedUser, Route};
pub use config::{load_settings, Settings};
pub use records::{owned_report_listing, OwnedReport, RecordStoreClient};
pub use report_markup::{parse_report, ReportBlock};
pub use webhook::{truncate_preview, WebhookClient, WebhookError};
pub use workbench::{
    AnalysisBackend, MissingAnalysisBackend, SessionMeta, ViewState, WorkbenchController,
    WorkbenchSession, WorkbenchSnapshot,
};
