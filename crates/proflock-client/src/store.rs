//! Single owner of the analysis lock.
//!
//! [`LockStateStore`] holds the coordinator's one [`LockState`] in a
//! `tokio::sync::watch` channel. It is the only writer: network observations
//! arrive through the reconciling entrypoints, the countdown through
//! [`LockStateStore::decrement`]. Each write is a single `send_if_modified`
//! call, so a reconciliation and a countdown step never interleave mid-update
//! and subscribers are only woken by real changes.
//!
//! The store also keeps the hard-poll tracking marker: the submission whose
//! job-scoped poll most recently observed `RUNNING`. While it is set, global
//! refresh responses are discarded; see [`LockStateStore::set_from_global`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use proflock_core::{reconcile, LockPhase, LockState, StatusSnapshot, SubmissionId};

pub struct LockStateStore {
    tx: watch::Sender<LockState>,
    tracked_job: Mutex<Option<SubmissionId>>,
}

impl LockStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LockState::unlocked());
        LockStateStore {
            tx,
            tracked_job: Mutex::new(None),
        }
    }

    pub fn current(&self) -> LockState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.tx.subscribe()
    }

    /// Reconciles a snapshot into the lock without touching hard-poll tracking.
    pub fn set_from_snapshot(
        &self,
        context_id: Option<&SubmissionId>,
        snapshot: Option<&StatusSnapshot>,
    ) -> LockState {
        self.apply(|prev| reconcile(prev, context_id, snapshot))
    }

    /// Reconciles a job-scoped observation from the hard poll.
    ///
    /// A `RUNNING` observation marks `submission_id` as tracked; anything
    /// else releases the marker.
    pub fn set_from_job(
        &self,
        submission_id: &SubmissionId,
        snapshot: Option<&StatusSnapshot>,
    ) -> LockState {
        let mut tracked = self.tracked();
        let running = snapshot.is_some_and(|s| !s.status.is_terminal());
        *tracked = running.then(|| submission_id.clone());
        self.apply(|prev| reconcile(prev, Some(submission_id), snapshot))
    }

    /// Reconciles a global (unscoped) observation.
    ///
    /// Returns `None` when the response was discarded because this
    /// coordinator's hard poll last saw its job `RUNNING`: the job-scoped
    /// stream is authoritative until it reports a terminal status or is
    /// cancelled.
    pub fn set_from_global(&self, snapshot: Option<&StatusSnapshot>) -> Option<LockState> {
        let tracked = self.tracked();
        if let Some(job) = tracked.as_ref() {
            tracing::debug!(
                tracked = %job,
                global = ?snapshot.and_then(|s| s.submission_id.as_ref()),
                "Discarding global status while hard poll tracks a running job"
            );
            return None;
        }
        let context_id = snapshot.and_then(|s| s.submission_id.clone());
        Some(self.apply(|prev| reconcile(prev, context_id.as_ref(), snapshot)))
    }

    /// Drops the tracking marker if it still belongs to `submission_id`.
    pub fn release_job(&self, submission_id: &SubmissionId) {
        let mut tracked = self.tracked();
        if tracked.as_ref() == Some(submission_id) {
            *tracked = None;
        }
    }

    pub fn tracked_job(&self) -> Option<SubmissionId> {
        self.tracked().clone()
    }

    /// Forces the lock open and releases hard-poll tracking.
    pub fn clear(&self) -> LockState {
        let mut tracked = self.tracked();
        *tracked = None;
        self.apply(|_| LockState::unlocked())
    }

    /// One countdown step. Only the countdown ticker calls this.
    pub fn decrement(&self) -> LockState {
        self.apply(LockState::tick)
    }

    fn apply(&self, next: impl FnOnce(&LockState) -> LockState) -> LockState {
        let mut before = LockPhase::Idle;
        let mut after = LockPhase::Idle;
        self.tx.send_if_modified(|state| {
            let updated = next(&*state);
            before = state.phase();
            after = updated.phase();
            if updated == *state {
                return false;
            }
            *state = updated;
            true
        });
        if std::mem::discriminant(&before) != std::mem::discriminant(&after) {
            tracing::info!(from = ?before, to = ?after, "Analysis lock phase changed");
        }
        self.current()
    }

    fn tracked(&self) -> MutexGuard<'_, Option<SubmissionId>> {
        self.tracked_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LockStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snapshot, terminal};
    use proflock_core::JobStatus;

    #[test]
    fn starts_unlocked() {
        let store = LockStateStore::new();
        assert_eq!(store.current(), LockState::unlocked());
        assert_eq!(store.tracked_job(), None);
    }

    #[test]
    fn job_running_then_terminal_moves_tracking() {
        let store = LockStateStore::new();
        let id = SubmissionId::new("sub-1");

        let state = store.set_from_job(&id, Some(&snapshot("sub-1", JobStatus::Running)));
        assert!(state.locked);
        assert_eq!(store.tracked_job(), Some(id.clone()));

        let state = store.set_from_job(&id, Some(&terminal("sub-1", 30)));
        assert_eq!(state.remaining, Some(30));
        assert_eq!(store.tracked_job(), None);
    }

    #[test]
    fn global_empty_is_discarded_while_tracking() {
        let store = LockStateStore::new();
        let id = SubmissionId::new("sub-1");
        store.set_from_job(&id, Some(&snapshot("sub-1", JobStatus::Running)));

        assert_eq!(store.set_from_global(None), None);
        assert!(store.current().locked);

        store.release_job(&id);
        let state = store.set_from_global(None).unwrap();
        assert!(!state.locked);
    }

    #[test]
    fn global_uses_snapshot_id_as_context() {
        let store = LockStateStore::new();
        let state = store
            .set_from_global(Some(&snapshot("other-tab", JobStatus::Running)))
            .unwrap();
        assert_eq!(
            state.source_submission_id,
            Some(SubmissionId::new("other-tab"))
        );
    }

    #[test]
    fn release_ignores_other_submissions() {
        let store = LockStateStore::new();
        let id = SubmissionId::new("sub-1");
        store.set_from_job(&id, Some(&snapshot("sub-1", JobStatus::Running)));
        store.release_job(&SubmissionId::new("sub-2"));
        assert_eq!(store.tracked_job(), Some(id));
    }

    #[test]
    fn clear_unlocks_and_releases() {
        let store = LockStateStore::new();
        let id = SubmissionId::new("sub-1");
        store.set_from_job(&id, Some(&snapshot("sub-1", JobStatus::Running)));
        assert_eq!(store.clear(), LockState::unlocked());
        assert_eq!(store.tracked_job(), None);
    }

    #[test]
    fn decrement_counts_down_to_unlock() {
        let store = LockStateStore::new();
        store.set_from_snapshot(None, Some(&terminal("sub-1", 2)));
        assert_eq!(store.decrement().remaining, Some(1));
        assert!(!store.decrement().locked);
        assert_eq!(store.decrement(), LockState::unlocked());
    }

    #[tokio::test]
    async fn subscribers_are_not_woken_by_no_op_writes() {
        let store = LockStateStore::new();
        let mut rx = store.subscribe();
        store.decrement();
        store.set_from_snapshot(None, None);
        assert!(!rx.has_changed().unwrap());

        store.set_from_snapshot(None, Some(&terminal("sub-1", 10)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().remaining, Some(10));
    }
}
