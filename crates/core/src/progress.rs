//! Progress wire frames and the canonical snapshot they fold into.
//!
//! Two wire shapes exist:
//! - event-stream frames: `{type, progress?, status?, current_step?, doc_id?, result_id?}`
//!   where `type` is one of `progress | snapshot | heartbeat | ping`
//! - socket messages: `{progress?, status?}`
//!
//! Upstream is loosely typed (`progress` may arrive as a string). Parsing
//! fails soft: a field that cannot be understood is "no update", and only a
//! frame that is not a JSON object at all is rejected.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FrameError;

/// Status reported before any frame has arrived.
pub const INITIAL_STATUS: &str = "pending";

/// Status value that marks a job terminal on its own.
pub const COMPLETED_STATUS: &str = "completed";

// =============================================================================
// Partial updates (parsed from the wire)
// =============================================================================

/// Fields carried by one data-bearing frame. `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Option<f64>,
    pub status: Option<String>,
    pub current_step: Option<String>,
    pub result_id: Option<String>,
}

impl ProgressUpdate {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            progress: obj.get("progress").and_then(parse_percent),
            status: obj.get("status").and_then(text),
            current_step: obj.get("current_step").and_then(text),
            result_id: obj
                .get("result_id")
                .and_then(text)
                .or_else(|| obj.get("doc_id").and_then(text)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One decoded event-stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Progress(ProgressUpdate),
    Snapshot(ProgressUpdate),
    Heartbeat(ProgressUpdate),
    /// Keep-alive only.
    Ping,
    /// Well-formed, but of a kind this client does not know.
    Unknown(String),
}

impl StreamFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value.as_object().ok_or(FrameError::NotObject)?;
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();

        Ok(match kind {
            "progress" => StreamFrame::Progress(ProgressUpdate::from_object(obj)),
            "snapshot" => StreamFrame::Snapshot(ProgressUpdate::from_object(obj)),
            "heartbeat" => StreamFrame::Heartbeat(ProgressUpdate::from_object(obj)),
            "ping" => StreamFrame::Ping,
            other => StreamFrame::Unknown(other.to_string()),
        })
    }

    /// The data this frame carries, if it is data-bearing.
    pub fn update(&self) -> Option<&ProgressUpdate> {
        match self {
            StreamFrame::Progress(u) | StreamFrame::Snapshot(u) | StreamFrame::Heartbeat(u) => Some(u),
            StreamFrame::Ping | StreamFrame::Unknown(_) => None,
        }
    }
}

/// Decode a socket message. Extra fields are ignored.
pub fn parse_socket_message(text: &str) -> Result<ProgressUpdate, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(FrameError::NotObject)?;
    Ok(ProgressUpdate::from_object(obj))
}

/// Accepts numbers and numeric strings (`"40"`, `" 40.5 "`, `"40%"`).
/// Non-finite or unparseable values yield `None`; the rest is clamped to [0, 100].
fn parse_percent(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim_end().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(0.0, 100.0))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Canonical snapshot (what controllers expose)
// =============================================================================

/// Protocol-independent progress state of one job. Last write wins per field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub progress_percent: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            progress_percent: 0.0,
            status: INITIAL_STATUS.to_string(),
            current_step: None,
            result_id: None,
        }
    }
}

impl ProgressSnapshot {
    /// Fold an update in. Returns whether anything changed.
    pub fn apply(&mut self, update: &ProgressUpdate) -> bool {
        let before = self.clone();
        if let Some(progress) = update.progress {
            self.progress_percent = progress;
        }
        if let Some(status) = &update.status {
            self.status = status.clone();
        }
        if let Some(step) = &update.current_step {
            self.current_step = Some(step.clone());
        }
        if let Some(result_id) = &update.result_id {
            self.result_id = Some(result_id.clone());
        }
        *self != before
    }

    /// `completed` status or full progress, either one is enough.
    pub fn is_terminal(&self) -> bool {
        self.status.eq_ignore_ascii_case(COMPLETED_STATUS) || self.progress_percent >= 100.0
    }
}
