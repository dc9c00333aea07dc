//! Wire Models
//!
//! Request and response bodies exchanged with the repository backend. These
//! mirror the backend's JSON exactly; client-only bookkeeping (message IDs,
//! streaming flags) lives in [`crate::conversation`] instead.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Repository lifecycle
// ============================================================================

/// Lifecycle status of an ingestion job
///
/// `Completed` and `Failed` are terminal: once observed, nothing polls again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// Cloning, parsing, and indexing
    Processing,
    /// Indexed and ready for chat
    Completed,
    /// Ingestion failed; see the record's `error`
    Failed,
}

impl RepoStatus {
    /// Whether no further transitions can happen
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name of this status
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Server-side view of one repository ingestion job
///
/// Never patched field by field on the client: every fetch replaces the whole
/// record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Server-assigned unique ID
    pub repo_id: String,
    /// Repository URL as submitted
    pub repo_url: String,
    /// Current lifecycle status
    pub status: RepoStatus,
    /// Fraction of files processed, in `[0, 1]` (advisory)
    #[serde(default)]
    pub progress: Option<f64>,
    /// Files discovered (advisory)
    #[serde(default)]
    pub total_files: Option<u64>,
    /// Files processed so far (advisory)
    #[serde(default)]
    pub processed_files: Option<u64>,
    /// When the job was submitted
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// When the job reached `completed`
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure description when `status` is `failed`
    #[serde(default)]
    pub error: Option<String>,
}

impl RepositoryRecord {
    /// Create a freshly queued record (used by tests and the mock backend)
    pub fn queued(repo_id: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            repo_url: repo_url.into(),
            status: RepoStatus::Queued,
            progress: None,
            total_files: None,
            processed_files: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Same record with a different status
    #[must_use]
    pub fn with_status(mut self, status: RepoStatus) -> Self {
        self.status = status;
        self
    }

    /// Same record with a different creation time
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the job has reached a terminal status
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress in `[0, 1]`, treating an absent value as zero
    #[must_use]
    pub fn progress_fraction(&self) -> f64 {
        self.progress.unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Short display name: last URL path segment without `.git`
    #[must_use]
    pub fn display_name(&self) -> &str {
        let trimmed = self.repo_url.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        last.strip_suffix(".git").unwrap_or(last)
    }
}

/// Body of `GET list`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RepositoryListResponse {
    /// All known repositories, in backend order
    #[serde(default)]
    pub repositories: Vec<RepositoryRecord>,
}

/// Body of `POST ingest`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Repository to clone and index
    pub repo_url: String,
    /// Branch to index (backend default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Response of `POST ingest`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Server-assigned ID of the new job
    pub repo_id: String,
    /// Initial status (normally `queued`)
    pub status: RepoStatus,
    /// Human-readable acknowledgement, when the backend sends one
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Chat
// ============================================================================

/// A span of source code the backend retrieved for an answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReference {
    /// Path relative to the repository root
    pub file_path: String,
    /// First line of the snippet (1-based)
    pub start_line: u32,
    /// Last line of the snippet (inclusive)
    pub end_line: u32,
    /// The snippet text
    pub code_snippet: String,
}

impl CodeReference {
    /// Syntax-highlighting language derived from the file extension
    #[must_use]
    pub fn language(&self) -> &'static str {
        let ext = self
            .file_path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" => "python",
            "js" | "jsx" => "javascript",
            "ts" | "tsx" => "typescript",
            "java" => "java",
            "go" => "go",
            "rs" => "rust",
            "cpp" => "cpp",
            "c" => "c",
            _ => "text",
        }
    }

    /// `path:start-end` label
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Backend answer
    Assistant,
}

/// One prior turn as sent in `conversation_history`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent it
    pub role: MessageRole,
    /// Full text
    pub content: String,
    /// References attached to an assistant answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_references: Vec<CodeReference>,
}

/// Body of `POST chat/stream` and `POST chat/query`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Repository to answer from
    pub repo_id: String,
    /// The new user message
    pub message: String,
    /// Prior turns only (never includes `message` itself)
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

/// Response of `POST chat/query`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Complete answer text
    pub message: String,
    /// Retrieved code spans
    #[serde(default)]
    pub code_references: Vec<CodeReference>,
}

// ============================================================================
// Timestamp decoding
// ============================================================================

/// Parse RFC 3339, or a naive ISO-8601 datetime interpreted as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|n| n.and_utc()))
}

/// Accepts RFC 3339 strings, naive ISO-8601 strings, or Unix milliseconds
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => {
            let ms = n.as_i64().ok_or_else(|| D::Error::custom("invalid timestamp"))?;
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| D::Error::custom("timestamp out of range"))
        }
        Value::String(s) => parse_timestamp(&s)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s}"))),
        _ => Err(D::Error::custom("timestamp must be a number or string")),
    }
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let ms = n.as_i64().ok_or_else(|| D::Error::custom("invalid timestamp"))?;
            Ok(DateTime::from_timestamp_millis(ms))
        }
        Value::String(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s}"))),
        _ => Err(D::Error::custom("timestamp must be a number, string, or null")),
    }
}
