use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::ledger::LogEntry;

// =============================================================================
// CREATE MONITOR
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMonitorRequest {
    #[validate(url(message = "url must be an absolute URL"), length(max = 768))]
    pub url: String,
    /// Literal text fragment to look for
    #[serde(default, rename = "match")]
    pub match_text: String,
    /// CSS selector; takes precedence over `match` when non-empty
    #[serde(default)]
    pub selector: Option<String>,
    /// One of 1, 3, 6, 12; checked by the handler
    pub interval_hours: u32,
    #[validate(email(message = "Invalid email format"))]
    pub email_to: String,
    #[serde(default)]
    pub email_message: Option<String>,
    #[serde(default)]
    pub access_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMonitorResponse {
    pub ok: bool,
    pub monitor_id: String,
    pub monitor_url: String,
    pub created: bool,
}

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StatusResponse {
    Inactive {
        active: bool,
    },
    Active {
        active: bool,
        url: String,
        #[serde(rename = "match")]
        match_value: String,
        match_type: &'static str,
        email_to: String,
        interval_hours: u32,
        last_check: Option<DateTime<Utc>>,
        next_check: Option<DateTime<Utc>>,
    },
}

pub type LogsResponse = Vec<LogEntry>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}
