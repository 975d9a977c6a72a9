//! Command orchestration helpers from UI actions to backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) {
    let cmd_name = match &cmd {
        BackendCommand::ExchangeSignInCode { .. } => "exchange_sign_in_code",
        BackendCommand::RestoreSession { .. } => "restore_session",
        BackendCommand::SignOut => "sign_out",
        BackendCommand::SubmitQuestion { .. } => "submit_question",
        BackendCommand::GenerateReport => "generate_report",
        BackendCommand::ResetWorkbench => "reset_workbench",
        BackendCommand::PreviewQuestion { .. } => "preview_question",
        BackendCommand::LoadDashboard => "load_dashboard",
        BackendCommand::LoadHistory => "load_history",
        BackendCommand::LoadReportDetail { .. } => "load_report_detail",
    };

    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued ui->backend command"),
        Err(TrySendError::Full(_)) => {
            *status = "UI command queue is full; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status =
                "Backend command processor disconnected (possible startup/runtime failure); restart the app"
                    .to_string();
        }
    }
}
