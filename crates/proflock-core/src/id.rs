//! Identifier newtypes.
//!
//! Submission ids are opaque strings issued by the backend. Wrapping them
//! keeps a submission id from being passed where a mode name or token is
//! expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-issued submission identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        SubmissionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        SubmissionId(s.to_string())
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        SubmissionId(s)
    }
}
