//! Result records printed on success, and the one-line failure diagnostic.

use std::fmt::Display;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{IcaError, Result};
use crate::types::Action;

/// Process exit code for any failed command.
pub const EXIT_FAILURE: i32 = 1;

const STATUS_OK: &str = "ok";

/// Outcome of `upload`, `download` and `action approve`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: String,
    pub action_id: String,
    /// Controller transaction; empty when none was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ica_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ica_owner_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Absolute path of the uploaded file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl WorkflowResult {
    pub fn ok(action_id: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            action_id: action_id.into(),
            ..Default::default()
        }
    }
}

/// Outcome of `action status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatusReport {
    pub status: String,
    pub action_id: String,
    pub state: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub creator: String,
    pub price: String,
    pub block_height: i64,
    /// Unix seconds.
    pub expires_at: i64,
    /// Only present for storage actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Standard base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_pubkey: Option<String>,
}

impl From<&Action> for ActionStatusReport {
    fn from(action: &Action) -> Self {
        use base64::Engine;

        Self {
            status: STATUS_OK.to_string(),
            action_id: action.id.clone(),
            state: action.state.to_string(),
            action_type: action.action_type.to_string(),
            creator: action.creator.clone(),
            price: action.price.clone(),
            block_height: action.block_height,
            expires_at: action.expiration_time.timestamp(),
            is_public: action.metadata.is_public(),
            app_pubkey: action
                .app_pubkey
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(|key| base64::engine::general_purpose::STANDARD.encode(key)),
        }
    }
}

/// Pretty JSON with two-space indentation.
pub fn to_json<T: Serialize>(record: &T) -> Result<String> {
    serde_json::to_string_pretty(record)
        .map_err(|e| IcaError::InvalidInput(format!("encode result: {e}")))
}

/// Write one record followed by a newline.
pub fn emit<T: Serialize, W: Write>(mut out: W, record: &T) -> Result<()> {
    let json = to_json(record)?;
    writeln!(out, "{json}").map_err(|e| IcaError::io("<stdout>", e))?;
    out.flush().map_err(|e| IcaError::io("<stdout>", e))
}

/// Collapse an error into a single diagnostic line.
pub fn failure_line(err: impl Display) -> String {
    let text = err.to_string();
    let mut line = String::with_capacity(text.len());
    for part in text.split(['\n', '\r']).map(str::trim).filter(|p| !p.is_empty()) {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(part);
    }
    format!("Error: {line}")
}
