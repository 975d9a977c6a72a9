use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

/// Error payload returned by the auth and record-store collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_payload_round_trips_snake_case_codes() {
        let raw = r#"{"code": "rate_limited", "message": "slow down"}"#;
        let parsed: ApiError = serde_json::from_str(raw).expect("parse");
        assert!(matches!(parsed.code, ErrorCode::RateLimited));
        assert_eq!(parsed.message, "slow down");

        let json =
            serde_json::to_value(ApiError::new(ErrorCode::Forbidden, "no")).expect("serialize");
        assert_eq!(json["code"], "forbidden");
    }
}
