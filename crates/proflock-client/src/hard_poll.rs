//! Job-scoped hard poll.
//!
//! After a submission the [`StatusPoller`] fetches that job's status once,
//! then every `period` until it sees `DONE` or `FAILED`, reconciling each
//! response into the store. At most one poll is live per poller: `start`
//! claims the slot with a fresh generation before its first await, and any
//! response that arrives for an older generation is dropped unapplied. Per-tick
//! fetch errors are logged and the loop simply waits for the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use proflock_core::{StatusSnapshot, SubmissionId};

use crate::api::{AnalysisApi, SubmitOptions};
use crate::error::ClientError;
use crate::store::LockStateStore;

/// Invoked exactly once with the terminal snapshot of a polled job.
pub type CompletionCallback = Box<dyn FnOnce(StatusSnapshot) + Send + 'static>;

struct ActivePoll {
    generation: u64,
    submission_id: SubmissionId,
    /// `None` while the immediate fetch is still in flight.
    handle: Option<JoinHandle<()>>,
}

type Slot = Mutex<Option<ActivePoll>>;

/// Result of applying one job-scoped response.
enum Step {
    /// A newer poll owns the slot; nothing was applied.
    Superseded,
    Continue,
    Finished(StatusSnapshot),
}

pub struct StatusPoller<A> {
    api: Arc<A>,
    store: Arc<LockStateStore>,
    period: Duration,
    active: Arc<Slot>,
    generation: AtomicU64,
}

impl<A: AnalysisApi> StatusPoller<A> {
    pub fn new(api: Arc<A>, store: Arc<LockStateStore>, period: Duration) -> Self {
        StatusPoller {
            api,
            store,
            period,
            active: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates the job, then starts polling it.
    ///
    /// A failed submission is returned to the caller and no poll is started.
    pub async fn submit(
        &self,
        submission_id: SubmissionId,
        options: SubmitOptions,
        on_done: CompletionCallback,
    ) -> Result<(), ClientError> {
        self.api.submit(&submission_id, &options).await?;
        tracing::info!(
            submission_id = %submission_id,
            mode = %options.mode,
            force = options.force,
            retry = options.retry,
            "Analysis submitted"
        );
        self.start(submission_id, on_done).await;
        Ok(())
    }

    /// Fetches the job's status once, then polls until it is terminal.
    ///
    /// The previous poll is superseded before the first fetch is sent. If
    /// the immediate fetch is already terminal the callback fires right away
    /// and no loop is started. A failed immediate fetch is logged and left
    /// to the loop. If another `start` claims the poller while the fetch is
    /// in flight, this call returns without applying anything and drops
    /// `on_done` unfired.
    pub async fn start(&self, submission_id: SubmissionId, on_done: CompletionCallback) {
        let generation = self.claim(&submission_id);

        match self.api.job_status(&submission_id).await {
            Ok(snapshot) => {
                match observe(&self.active, generation, &self.store, &submission_id, snapshot) {
                    Step::Continue => {}
                    Step::Superseded => {
                        tracing::debug!(
                            submission_id = %submission_id,
                            "Hard poll superseded before its first response"
                        );
                        return;
                    }
                    Step::Finished(done) => {
                        tracing::info!(
                            submission_id = %submission_id,
                            status = %done.status,
                            "Analysis finished before hard poll started"
                        );
                        on_done(done);
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::debug!(
                    submission_id = %submission_id,
                    error = %err,
                    "Initial status fetch failed; polling anyway"
                );
            }
        }

        self.spawn_loop(generation, submission_id, on_done);
    }

    /// Aborts the running poll, if any, and releases its tracking marker.
    pub fn cancel(&self) {
        let previous = lock_slot(&self.active).take();
        if let Some(previous) = previous {
            if let Some(handle) = previous.handle {
                handle.abort();
            }
            self.store.release_job(&previous.submission_id);
            tracing::debug!(submission_id = %previous.submission_id, "Hard poll cancelled");
        }
    }

    pub fn is_polling(&self) -> bool {
        lock_slot(&self.active).as_ref().is_some_and(|poll| {
            poll.handle
                .as_ref()
                .map_or(true, |handle| !handle.is_finished())
        })
    }

    #[cfg(test)]
    fn polled_submission(&self) -> Option<SubmissionId> {
        lock_slot(&self.active)
            .as_ref()
            .map(|poll| poll.submission_id.clone())
    }

    /// Makes `submission_id` the owner of the slot and returns its generation.
    fn claim(&self, submission_id: &SubmissionId) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = lock_slot(&self.active).replace(ActivePoll {
            generation,
            submission_id: submission_id.clone(),
            handle: None,
        });
        if let Some(previous) = previous {
            if let Some(handle) = previous.handle {
                handle.abort();
            }
            if previous.submission_id != *submission_id {
                self.store.release_job(&previous.submission_id);
            }
            tracing::debug!(
                previous = %previous.submission_id,
                next = %submission_id,
                "Hard poll superseded"
            );
        }
        generation
    }

    fn spawn_loop(&self, generation: u64, submission_id: SubmissionId, on_done: CompletionCallback) {
        // Hold the slot while spawning so the handle is recorded before the
        // task can observe anything.
        let mut active = lock_slot(&self.active);
        let Some(poll) = active.as_mut().filter(|poll| poll.generation == generation) else {
            return;
        };
        poll.handle = Some(tokio::spawn(poll_until_terminal(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            Arc::clone(&self.active),
            generation,
            submission_id,
            self.period,
            on_done,
        )));
    }
}

impl<A> Drop for StatusPoller<A> {
    fn drop(&mut self) {
        if let Some(handle) = lock_slot(&self.active).take().and_then(|poll| poll.handle) {
            handle.abort();
        }
    }
}

async fn poll_until_terminal<A: AnalysisApi>(
    api: Arc<A>,
    store: Arc<LockStateStore>,
    slot: Arc<Slot>,
    generation: u64,
    submission_id: SubmissionId,
    period: Duration,
    on_done: CompletionCallback,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match api.job_status(&submission_id).await {
            Ok(snapshot) => match observe(&slot, generation, &store, &submission_id, snapshot) {
                Step::Continue => {}
                Step::Superseded => return,
                Step::Finished(done) => {
                    tracing::info!(
                        submission_id = %submission_id,
                        status = %done.status,
                        error = ?done.error,
                        "Analysis finished"
                    );
                    on_done(done);
                    return;
                }
            },
            Err(err) => {
                tracing::debug!(
                    submission_id = %submission_id,
                    error = %err,
                    "Hard poll tick failed; retrying next tick"
                );
            }
        }
    }
}

/// Reconciles one response if `generation` still owns the slot.
///
/// The ownership check, the store write and releasing the slot on a terminal
/// status happen under the slot lock, so a concurrent `start` either sees
/// this response applied or prevents it.
fn observe(
    slot: &Slot,
    generation: u64,
    store: &LockStateStore,
    submission_id: &SubmissionId,
    snapshot: Option<StatusSnapshot>,
) -> Step {
    let mut active = lock_slot(slot);
    if !active.as_ref().is_some_and(|poll| poll.generation == generation) {
        return Step::Superseded;
    }
    store.set_from_job(submission_id, snapshot.as_ref());
    match snapshot {
        Some(done) if done.status.is_terminal() => {
            *active = None;
            Step::Finished(done)
        }
        _ => Step::Continue,
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<ActivePoll>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
