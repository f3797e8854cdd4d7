//! Core domain types for the analysis-lock coordinator.
//!
//! This crate defines the server-reported [`StatusSnapshot`], the
//! client-inferred [`LockState`], and [`reconcile`], the pure function that
//! maps one onto the other. Nothing here performs I/O or owns a timer; the
//! runtime side lives in `proflock-client`.

pub mod error;
pub mod id;
pub mod lock;
pub mod reconcile;
pub mod snapshot;

pub use error::CoreError;
pub use id::SubmissionId;
pub use lock::{format_countdown, LockPhase, LockState, LockView};
pub use reconcile::reconcile;
pub use snapshot::{JobStatus, PayloadMode, StatusSnapshot};
