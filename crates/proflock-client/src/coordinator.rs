//! Consumer-facing analysis-lock coordinator.
//!
//! [`AnalysisLockCoordinator`] wires one [`LockStateStore`] to its
//! [`CountdownTicker`], [`StatusPoller`] and [`GlobalStatusRefresher`].
//! UI code reads [`LockView`] to gate the "submit for analysis" control and
//! render the countdown badge, submits jobs, and forwards navigation, focus
//! and visibility events as [`RefreshTrigger`]s.
//!
//! Dropping the coordinator aborts every task it started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use proflock_core::{LockState, LockView, SubmissionId};

use crate::api::{AnalysisApi, HttpAnalysisApi, SubmitOptions};
use crate::config::{ClientConfig, Intervals};
use crate::countdown::CountdownTicker;
use crate::error::ClientError;
use crate::hard_poll::{CompletionCallback, StatusPoller};
use crate::refresher::{GlobalStatusRefresher, RefreshOutcome, RefreshTrigger};
use crate::session::SessionGate;
use crate::store::LockStateStore;

pub struct AnalysisLockCoordinator<A: AnalysisApi = HttpAnalysisApi> {
    store: Arc<LockStateStore>,
    session: SessionGate,
    poller: Arc<StatusPoller<A>>,
    ticker: CountdownTicker,
    refresher: GlobalStatusRefresher<A>,
    /// Submission whose POST and first status fetch are still in flight.
    pending_submit: Mutex<Option<SubmissionId>>,
}

/// Releases the pending-submit reservation when the submit call ends,
/// including when its future is dropped.
struct SubmitReservation<'a> {
    slot: &'a Mutex<Option<SubmissionId>>,
}

impl Drop for SubmitReservation<'_> {
    fn drop(&mut self) {
        *lock_pending(self.slot) = None;
    }
}

fn lock_pending(slot: &Mutex<Option<SubmissionId>>) -> MutexGuard<'_, Option<SubmissionId>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnalysisLockCoordinator<HttpAnalysisApi> {
    /// Starts a coordinator talking to the backend named in `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &ClientConfig, session: SessionGate) -> Result<Self, ClientError> {
        let api = HttpAnalysisApi::new(config, session.clone())?;
        Ok(Self::start(api, session, config.intervals))
    }
}

impl<A: AnalysisApi> AnalysisLockCoordinator<A> {
    /// Creates the unlocked store and spawns the countdown, soft-poll and
    /// session-watch tasks. The start-up global refresh runs as soon as the
    /// session has finished initialising.
    pub fn start(api: A, session: SessionGate, intervals: Intervals) -> Self {
        let api = Arc::new(api);
        let store = Arc::new(LockStateStore::new());
        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&api),
            Arc::clone(&store),
            intervals.hard_poll,
        ));
        let ticker = CountdownTicker::spawn(Arc::clone(&store), intervals.countdown_tick);
        let refresher = GlobalStatusRefresher::spawn(
            api,
            Arc::clone(&store),
            session.clone(),
            Arc::clone(&poller),
            intervals.soft_poll,
        );

        AnalysisLockCoordinator {
            store,
            session,
            poller,
            ticker,
            refresher,
            pending_submit: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> LockView {
        self.store.current().view()
    }

    pub fn state(&self) -> LockState {
        self.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.store.subscribe()
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    /// Submits a new analysis job and starts its hard poll.
    ///
    /// Refused without a network call while the lock is held, while another
    /// submission from this coordinator is still being created, or when the
    /// session is not authenticated. Server rejections are returned as
    /// [`ClientError::Http`] and leave no poll running.
    pub async fn submit_analysis(
        &self,
        submission_id: SubmissionId,
        options: SubmitOptions,
        on_done: CompletionCallback,
    ) -> Result<(), ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::Unauthenticated);
        }
        let _reservation = self.reserve_submit(&submission_id)?;
        self.poller.submit(submission_id, options, on_done).await
    }

    /// Claims the right to submit. Held until the POST and the first status
    /// fetch are done, by which point the store reflects the new job.
    fn reserve_submit(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SubmitReservation<'_>, ClientError> {
        let mut pending = lock_pending(&self.pending_submit);
        if let Some(other) = pending.as_ref() {
            return Err(ClientError::Locked {
                source_submission_id: Some(other.clone()),
            });
        }
        let current = self.store.current();
        if current.locked {
            return Err(ClientError::Locked {
                source_submission_id: current.source_submission_id,
            });
        }
        *pending = Some(submission_id.clone());
        Ok(SubmitReservation {
            slot: &self.pending_submit,
        })
    }

    /// Starts (or restarts) the hard poll for an already submitted job.
    pub async fn start_polling(&self, submission_id: SubmissionId, on_done: CompletionCallback) {
        self.poller.start(submission_id, on_done).await;
    }

    /// Runs an immediate global refresh.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        self.refresher.refresh(trigger).await
    }

    pub fn is_hard_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Stops the hard poll and forces the lock open.
    pub fn clear_lock(&self) {
        self.poller.cancel();
        self.store.clear();
    }

    /// Aborts every task. The last observed state stays readable.
    pub fn dispose(&self) {
        self.poller.cancel();
        self.ticker.stop();
        self.refresher.stop();
        tracing::debug!("Analysis lock coordinator disposed");
    }
}

impl<A: AnalysisApi> Drop for AnalysisLockCoordinator<A> {
    fn drop(&mut self) {
        self.poller.cancel();
    }
}
