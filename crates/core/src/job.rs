//! Tracked job records and registration input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of server-side work a job represents.
///
/// Serialized as its wire tag. Unknown tags round-trip unchanged through
/// `Other`, so a newer producer never loses records on an older client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    Document,
    FlashcardSet,
    Other(String),
}

impl JobKind {
    pub fn as_str(&self) -> &str {
        match self {
            JobKind::Document => "document",
            JobKind::FlashcardSet => "flashcard-set",
            JobKind::Other(tag) => tag,
        }
    }
}

impl Default for JobKind {
    fn default() -> Self {
        JobKind::Other(String::new())
    }
}

impl From<String> for JobKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "document" => JobKind::Document,
            "flashcard-set" => JobKind::FlashcardSet,
            _ => JobKind::Other(tag),
        }
    }
}

impl From<&str> for JobKind {
    fn from(tag: &str) -> Self {
        JobKind::from(tag.to_string())
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier as handed over by a producer: either a string or a bare
/// JSON number. Normalized to a string before it enters the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    /// Canonical string form, or `None` for falsy ids (`""` or `0`).
    pub fn normalize(&self) -> Option<String> {
        match self {
            RawId::Text(s) if s.is_empty() => None,
            RawId::Text(s) => Some(s.clone()),
            RawId::Number(n) if n.as_f64() == Some(0.0) => None,
            RawId::Number(n) => Some(n.to_string()),
        }
    }

    fn from_value(value: &Value) -> Option<RawId> {
        match value {
            Value::String(s) => Some(RawId::Text(s.clone())),
            Value::Number(n) => Some(RawId::Number(n.clone())),
            _ => None,
        }
    }
}

impl From<&str> for RawId {
    fn from(id: &str) -> Self {
        RawId::Text(id.to_string())
    }
}

impl From<String> for RawId {
    fn from(id: String) -> Self {
        RawId::Text(id)
    }
}

impl From<u64> for RawId {
    fn from(id: u64) -> Self {
        RawId::Number(id.into())
    }
}

impl From<i64> for RawId {
    fn from(id: i64) -> Self {
        RawId::Number(id.into())
    }
}

/// Registration input, as returned by the upload flow that created the job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(rename = "type", default)]
    pub kind: JobKind,
    #[serde(default)]
    pub project_id: Option<RawId>,
    #[serde(default)]
    pub doc_id: Option<RawId>,
}

impl NewJob {
    pub fn new(id: impl Into<RawId>, kind: JobKind) -> Self {
        Self {
            id: Some(id.into()),
            kind,
            project_id: None,
            doc_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<RawId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_doc(mut self, doc_id: impl Into<RawId>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }
}

/// A job the user is waiting on. This is the persisted unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: JobKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Epoch millis stamped at registration. Only used for staleness.
    pub created_at: i64,
}

impl JobRecord {
    /// Build a record from untrusted persisted JSON.
    ///
    /// Returns `None` for anything that is not an object, has no usable `id`,
    /// or has no numeric `createdAt`. Identifier fields written by older
    /// clients as numbers are coerced to strings.
    pub fn from_persisted(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(RawId::from_value)?.normalize()?;
        let created_at = obj.get("createdAt").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        })?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map(JobKind::from)
            .unwrap_or_default();
        let optional_id = |key: &str| {
            obj.get(key)
                .and_then(RawId::from_value)
                .and_then(|raw| raw.normalize())
        };

        Some(Self {
            id,
            kind,
            project_id: optional_id("projectId"),
            doc_id: optional_id("docId"),
            created_at,
        })
    }
}
