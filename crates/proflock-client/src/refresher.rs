//! Global status refresh: the 15-second soft poll plus event triggers.
//!
//! The global endpoint is not scoped to a submission, so it also surfaces
//! locks created by other tabs or users. It is consulted:
//!
//! - every `period` while the lock is in a known cooldown,
//! - on route changes, window focus and the tab becoming visible,
//! - once session initialisation completes, and again on every later
//!   sign-in or sign-out.
//!
//! Nothing is fetched before initialisation completes; a signed-out session
//! force-clears the lock instead of fetching. Responses are discarded while
//! this coordinator's own hard poll is tracking a running job (see
//! [`LockStateStore::set_from_global`]).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use proflock_core::LockState;

use crate::api::AnalysisApi;
use crate::hard_poll::StatusPoller;
use crate::session::{SessionGate, SessionState};
use crate::store::LockStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Why a global refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    RouteChange,
    Focus,
    Visibility(Visibility),
    SessionChanged,
    Periodic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The response was reconciled into the store.
    Applied(LockState),
    /// The response lost to the hard poll's running observation.
    Discarded,
    /// Nothing was fetched (session still initialising, or tab hidden).
    Skipped,
    /// The session is signed out; the lock was cleared.
    Cleared,
    /// The fetch failed; the next trigger or tick retries.
    Failed,
}

struct RefreshCore<A> {
    api: Arc<A>,
    store: Arc<LockStateStore>,
    session: SessionGate,
    poller: Arc<StatusPoller<A>>,
}

impl<A: AnalysisApi> RefreshCore<A> {
    async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        if trigger == RefreshTrigger::Visibility(Visibility::Hidden) {
            return RefreshOutcome::Skipped;
        }

        match self.session.current() {
            SessionState::Initializing => {
                tracing::debug!(?trigger, "Session not initialised; global refresh skipped");
                RefreshOutcome::Skipped
            }
            SessionState::Anonymous => {
                if self.store.current().locked || self.poller.is_polling() {
                    tracing::warn!(?trigger, "Session signed out; clearing analysis lock");
                }
                self.poller.cancel();
                self.store.clear();
                RefreshOutcome::Cleared
            }
            SessionState::Authenticated { .. } => match self.api.global_status().await {
                Ok(snapshot) => match self.store.set_from_global(snapshot.as_ref()) {
                    Some(state) => RefreshOutcome::Applied(state),
                    None => RefreshOutcome::Discarded,
                },
                Err(err) => {
                    tracing::debug!(?trigger, error = %err, "Global status fetch failed");
                    RefreshOutcome::Failed
                }
            },
        }
    }
}

pub struct GlobalStatusRefresher<A> {
    core: Arc<RefreshCore<A>>,
    soft_poll: JoinHandle<()>,
    session_watch: JoinHandle<()>,
}

impl<A: AnalysisApi> GlobalStatusRefresher<A> {
    /// Spawns the soft-poll and session-watch tasks.
    pub fn spawn(
        api: Arc<A>,
        store: Arc<LockStateStore>,
        session: SessionGate,
        poller: Arc<StatusPoller<A>>,
        period: Duration,
    ) -> Self {
        let core = Arc::new(RefreshCore {
            api,
            store,
            session,
            poller,
        });
        let soft_poll = tokio::spawn(soft_poll(Arc::clone(&core), period));
        let session_watch = tokio::spawn(watch_session(Arc::clone(&core)));
        GlobalStatusRefresher {
            core,
            soft_poll,
            session_watch,
        }
    }

    /// Runs one global refresh now.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        self.core.refresh(trigger).await
    }

    pub fn stop(&self) {
        self.soft_poll.abort();
        self.session_watch.abort();
    }
}

impl<A> Drop for GlobalStatusRefresher<A> {
    fn drop(&mut self) {
        self.soft_poll.abort();
        self.session_watch.abort();
    }
}

/// Polls the global endpoint while the lock is in cooldown.
///
/// The interval is recreated only when cooldown eligibility flips, not on
/// every countdown step, so at most one soft-poll timer exists.
async fn soft_poll<A: AnalysisApi>(core: Arc<RefreshCore<A>>, period: Duration) {
    let mut rx = core.store.subscribe();
    loop {
        if !rx.borrow_and_update().in_cooldown() {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    core.refresh(RefreshTrigger::Periodic).await;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            if !rx.borrow_and_update().in_cooldown() {
                break;
            }
        }
    }
}

/// Performs the start-up refresh once initialisation completes, then a
/// refresh on every later session change.
async fn watch_session<A: AnalysisApi>(core: Arc<RefreshCore<A>>) {
    let mut rx = core.session.subscribe();
    let mut trigger = RefreshTrigger::Startup;
    loop {
        rx.borrow_and_update();
        if core.session.is_initialized() {
            core.refresh(trigger).await;
            trigger = RefreshTrigger::SessionChanged;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
