//! Backend commands queued from UI to backend worker.

use shared::domain::ReportId;

pub enum BackendCommand {
    /// Exchanges an OAuth callback code pasted by the user for a session.
    ExchangeSignInCode { code: String },
    /// Re-validates a persisted access token on startup.
    RestoreSession { access_token: String },
    SignOut,
    SubmitQuestion { question: String },
    GenerateReport,
    ResetWorkbench,
    /// Signed-out landing teaser.
    PreviewQuestion { question: String },
    LoadDashboard,
    LoadHistory,
    LoadReportDetail { report_id: ReportId },
}
