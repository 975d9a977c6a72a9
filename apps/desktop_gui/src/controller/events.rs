//! UI/backend events and error modeling for the desktop controller.

use client_core::{AuthSession, OwnedReport, WorkbenchSnapshot};
use shared::protocol::ReportRow;

pub enum UiEvent {
    SignedIn { session: AuthSession },
    /// A persisted token could not be re-validated; the app stays signed out
    /// without surfacing an error banner.
    SessionRestoreFailed,
    SignedOut,
    Error(UiError),
    Workbench(WorkbenchSnapshot),
    PreviewLoaded(String),
    PreviewFailed(String),
    DashboardLoaded(Vec<OwnedReport>),
    HistoryLoaded(Vec<OwnedReport>),
    ReportDetailLoaded { report: ReportRow, question: String },
    /// The report does not exist or its parent query belongs to someone else.
    ReportDetailMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SignIn,
    Workbench,
    Records,
    General,
}

pub fn classify_sign_in_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("backend worker startup failure") || lower.contains("failed to build backend runtime")
    {
        "Backend worker startup failure; verify local app environment and retry.".to_string()
    } else if lower.contains("failed to connect")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        "Auth provider unreachable; check network and retry sign-in.".to_string()
    } else {
        format!("Sign-in error: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("forbidden")
            || message_lower.contains("session expired")
            || message_lower.contains("invalid token")
            || message_lower.contains("row level security")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("transport")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth && self.context != UiErrorContext::SignIn
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_store_tokens_force_reauth() {
        let err = UiError::from_message(
            UiErrorContext::Records,
            "record store rejected the request: JWT expired (401)",
        );
        assert_eq!(err.category(), UiErrorCategory::Auth);
        assert!(err.requires_reauth());
    }

    #[test]
    fn rejected_sign_in_codes_do_not_loop_back_to_sign_in() {
        let err = UiError::from_message(
            UiErrorContext::SignIn,
            "auth provider rejected the request: invalid token",
        );
        assert_eq!(err.category(), UiErrorCategory::Auth);
        assert!(!err.requires_reauth());
    }

    #[test]
    fn classifies_backend_disconnect_as_transport_error() {
        let err = UiError::from_message(
            UiErrorContext::General,
            "Backend command processor disconnected (possible startup/runtime failure)",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(!err.requires_reauth());
    }

    #[test]
    fn sign_in_failures_get_a_friendly_summary() {
        assert_eq!(
            classify_sign_in_failure("auth request failed: connection refused"),
            "Auth provider unreachable; check network and retry sign-in."
        );
        assert!(classify_sign_in_failure("code expired").starts_with("Sign-in error:"));
    }
}
