//! Bridge between the UI thread and the tokio worker that owns the network
//! clients.

pub mod commands;
pub mod runtime;
