//! Client error types.
//!
//! [`ClientError`] is the unified error type for the coordinator. Only
//! submission errors ever reach callers; failures inside the polling loops
//! are logged and dropped at the tick that produced them.

use proflock_core::{CoreError, SubmissionId};

/// Errors surfaced by the analysis API and the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced an HTTP response (connect, timeout, body read).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// The response body was not a valid status snapshot.
    #[error(transparent)]
    Decode(#[from] CoreError),

    /// A new analysis was refused because the lock is held.
    #[error("analysis lock is held{}", held_by(.source_submission_id))]
    Locked {
        source_submission_id: Option<SubmissionId>,
    },

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session has not finished initialising or is signed out.
    #[error("session is not authenticated")]
    Unauthenticated,
}

fn held_by(source: &Option<SubmissionId>) -> String {
    match source {
        Some(id) => format!(" by submission {}", id),
        None => String::new(),
    }
}
