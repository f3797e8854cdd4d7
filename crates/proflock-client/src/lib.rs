//! Runtime side of the analysis-lock coordinator.
//!
//! [`AnalysisLockCoordinator`] owns one [`LockStateStore`] and the three
//! timer-driven components that feed it: the 1 s [`CountdownTicker`], the
//! job-scoped [`StatusPoller`] and the [`GlobalStatusRefresher`]. Every
//! mutation of the lock goes through the store.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod countdown;
pub mod error;
pub mod hard_poll;
pub mod refresher;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AnalysisApi, HttpAnalysisApi, SubmitOptions};
pub use config::{ClientConfig, Intervals};
pub use coordinator::AnalysisLockCoordinator;
pub use countdown::CountdownTicker;
pub use error::ClientError;
pub use hard_poll::{CompletionCallback, StatusPoller};
pub use refresher::{GlobalStatusRefresher, RefreshOutcome, RefreshTrigger, Visibility};
pub use session::{SessionGate, SessionState};
pub use store::LockStateStore;
