//! Maps a status snapshot onto the next lock state.
//!
//! [`reconcile`] is the only way network observations become lock state.
//! It is deterministic and side-effect free so every rule can be exercised
//! with literal inputs.

use crate::id::SubmissionId;
use crate::lock::LockState;
use crate::snapshot::{JobStatus, StatusSnapshot};

/// Computes the lock state that follows `prev` after observing `snapshot`.
///
/// `context_id` is the submission the caller was asking about (the hard
/// poll's submission, or the global snapshot's own id). Rules, first match
/// wins:
///
/// 1. no snapshot: unlocked.
/// 2. `RUNNING`: locked without a countdown.
/// 3. terminal with no positive `remainingLockSeconds`: unlocked, even when
///    `isLocked` is still true.
/// 4. terminal, `isLocked`, positive remaining: cooldown. The countdown is
///    the max of the reported and the previously held value, so a slower
///    response cannot shrink a cooldown a fresher one already extended.
/// 5. anything else: unlocked.
pub fn reconcile(
    prev: &LockState,
    context_id: Option<&SubmissionId>,
    snapshot: Option<&StatusSnapshot>,
) -> LockState {
    let Some(snapshot) = snapshot else {
        return LockState::unlocked();
    };

    match snapshot.status {
        JobStatus::Running => LockState {
            locked: true,
            mode: snapshot.mode,
            until: None,
            remaining: None,
            source_submission_id: context_id
                .cloned()
                .or_else(|| snapshot.submission_id.clone()),
        },
        JobStatus::Done | JobStatus::Failed => {
            let Some(reported) = snapshot.positive_remaining() else {
                return LockState::unlocked();
            };
            if !snapshot.is_locked {
                return LockState::unlocked();
            }

            let held = if prev.locked { prev.remaining } else { None };
            let remaining = held.map_or(reported, |held| held.max(reported));

            LockState {
                locked: true,
                mode: snapshot.mode,
                until: snapshot.expire_at.clone(),
                remaining: Some(remaining),
                source_submission_id: context_id
                    .cloned()
                    .or_else(|| snapshot.submission_id.clone())
                    .or_else(|| prev.source_submission_id.clone()),
            }
        }
    }
}
