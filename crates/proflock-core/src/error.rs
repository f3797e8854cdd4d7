//! Core error types for proflock-core.

use thiserror::Error;

/// Errors produced while decoding server payloads or parsing user input.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status payload did not match the expected wire shape.
    #[error("malformed status snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),

    /// A payload mode name was not one of MINIMAL, ENRICHED, FULL.
    #[error("unknown payload mode '{0}', expected MINIMAL/ENRICHED/FULL")]
    UnknownMode(String),
}
