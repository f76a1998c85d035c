//! Stable control-plane envelope: every command response is
//! `{ok, error?, code?, hint?, details?}`, regardless of which command
//! produced it. Unknown commands and every `SyncError` render through
//! this one shape so callers never branch on command-specific payloads.

use serde::Serialize;
use serde_json::Value;

use fppsync_core::SyncError;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Envelope {
    pub fn ok(details: Value) -> Self {
        Self {
            ok: true,
            error: None,
            code: None,
            hint: None,
            details: Some(details),
        }
    }

    pub fn from_error(err: &SyncError) -> Self {
        Self {
            ok: false,
            error: Some(err.to_string()),
            code: Some(err.kind().as_code()),
            hint: err.hint(),
            details: None,
        }
    }

    #[allow(dead_code)]
    pub fn unknown_action(name: &str) -> Self {
        Self {
            ok: false,
            error: Some(format!("unknown action: {name}")),
            code: Some("unknown_action"),
            hint: None,
            details: None,
        }
    }

    /// Exit code 0 on success, otherwise the error's own code.
    pub fn exit_code(&self, err: Option<&SyncError>) -> i32 {
        if self.ok {
            return 0;
        }
        err.map(|e| e.kind().exit_code()).unwrap_or(2)
    }
}
