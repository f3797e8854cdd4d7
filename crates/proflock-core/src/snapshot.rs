//! Server-reported job status snapshots.
//!
//! A [`StatusSnapshot`] is one point-in-time view of the most relevant
//! analysis job, as returned by either the job-scoped or the global status
//! endpoint. Field names on the wire are camelCase. An empty response body
//! (HTTP 204) decodes to `None`, meaning no job is tracked by the server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::SubmissionId;

/// How much submission context is sent to the analysis model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadMode {
    #[default]
    Minimal,
    Enriched,
    Full,
}

impl PayloadMode {
    /// Wire name, as used in the `mode` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadMode::Minimal => "MINIMAL",
            PayloadMode::Enriched => "ENRICHED",
            PayloadMode::Full => "FULL",
        }
    }
}

impl fmt::Display for PayloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MINIMAL" => Ok(PayloadMode::Minimal),
            "ENRICHED" => Ok(PayloadMode::Enriched),
            "FULL" => Ok(PayloadMode::Full),
            _ => Err(CoreError::UnknownMode(s.to_string())),
        }
    }
}

/// Lifecycle status of a server-side analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// `DONE` and `FAILED` end a job; `RUNNING` does not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Server-reported view of one analysis job.
///
/// Timestamps are kept as the ISO 8601 strings the server sends; the client
/// never does arithmetic on them; cooldown timing is driven by
/// `remaining_lock_seconds` and the local countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default)]
    pub submission_id: Option<SubmissionId>,
    pub status: JobStatus,
    #[serde(default)]
    pub mode: Option<PayloadMode>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub expire_at: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    /// Signed so that zero and negative server values survive decoding.
    #[serde(default)]
    pub remaining_lock_seconds: Option<i64>,
}

impl StatusSnapshot {
    /// Decodes a status response body.
    ///
    /// An empty body or a literal `null` yields `Ok(None)`.
    pub fn from_body(body: &[u8]) -> Result<Option<StatusSnapshot>, CoreError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        let parsed: Option<StatusSnapshot> = serde_json::from_slice(body)?;
        Ok(parsed)
    }

    /// Remaining cooldown in whole seconds, if strictly positive.
    pub fn positive_remaining(&self) -> Option<u32> {
        match self.remaining_lock_seconds {
            Some(r) if r > 0 => Some(u32::try_from(r).unwrap_or(u32::MAX)),
            _ => None,
        }
    }
}
