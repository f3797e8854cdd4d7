//! Client-inferred analysis lock.
//!
//! [`LockState`] is the single value the coordinator keeps per instance.
//! The server never reports a lock object directly; the lock is derived from
//! job snapshots by [`crate::reconcile`] and aged locally by [`LockState::tick`].

use serde::Serialize;

use crate::id::SubmissionId;
use crate::snapshot::PayloadMode;

/// The analysis lock as seen by this client.
///
/// Invariants:
/// - `remaining` is unsigned, so it can never be negative.
/// - an unlocked state carries no mode, expiry, countdown or source.
/// - a running job carries `remaining == None`; a countdown only exists
///   during the post-completion cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LockState {
    pub locked: bool,
    pub mode: Option<PayloadMode>,
    /// Absolute cooldown expiry as reported by the server. Informational.
    pub until: Option<String>,
    /// Seconds left in the cooldown.
    pub remaining: Option<u32>,
    pub source_submission_id: Option<SubmissionId>,
}

/// Phase of the global lock state machine.
///
/// `Idle -> Running` on submit, `Running -> Cooldown | Idle` on a terminal
/// status, `Cooldown -> Idle` when the countdown runs out, and any phase
/// back to `Idle` on a no-job response. There is no terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    Idle,
    Running,
    Cooldown { remaining: u32 },
}

impl LockState {
    pub fn unlocked() -> Self {
        LockState::default()
    }

    pub fn phase(&self) -> LockPhase {
        match (self.locked, self.remaining) {
            (false, _) => LockPhase::Idle,
            (true, None) => LockPhase::Running,
            (true, Some(remaining)) => LockPhase::Cooldown { remaining },
        }
    }

    /// True while a local countdown should be driven.
    pub fn in_cooldown(&self) -> bool {
        matches!(self.phase(), LockPhase::Cooldown { .. })
    }

    /// One countdown step.
    ///
    /// Outside a cooldown the state is returned unchanged. A step that
    /// reaches zero unlocks immediately instead of waiting for the next poll.
    pub fn tick(&self) -> LockState {
        match self.phase() {
            LockPhase::Cooldown { remaining } if remaining <= 1 => LockState::unlocked(),
            LockPhase::Cooldown { remaining } => LockState {
                remaining: Some(remaining - 1),
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    /// The read-only slice UI consumers gate on.
    pub fn view(&self) -> LockView {
        LockView {
            locked: self.locked,
            mode: self.mode,
            remaining: self.remaining,
        }
    }
}

/// Consumer-facing projection of [`LockState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockView {
    pub locked: bool,
    pub mode: Option<PayloadMode>,
    pub remaining: Option<u32>,
}

impl LockView {
    /// Whether a new analysis may be submitted.
    pub fn can_submit(&self) -> bool {
        !self.locked
    }

    /// Text for the header countdown badge, or `None` when nothing is locked.
    pub fn badge(&self) -> Option<String> {
        if !self.locked {
            return None;
        }
        Some(match self.remaining {
            Some(seconds) => format!("Analysis cooldown {}", format_countdown(seconds)),
            None => "Analysis running…".to_string(),
        })
    }
}

/// Formats seconds as `m:ss`.
pub fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cooldown(remaining: u32) -> LockState {
        LockState {
            locked: true,
            mode: Some(PayloadMode::Enriched),
            until: Some("2025-01-10T10:03:30Z".to_string()),
            remaining: Some(remaining),
            source_submission_id: Some(SubmissionId::new("sub-1")),
        }
    }

    #[test]
    fn tick_from_one_unlocks() {
        assert_eq!(cooldown(1).tick(), LockState::unlocked());
    }

    #[test]
    fn four_ticks_from_five_leave_one() {
        let mut state = cooldown(5);
        for _ in 0..4 {
            state = state.tick();
        }
        assert!(state.locked);
        assert_eq!(state.remaining, Some(1));
        assert_eq!(state.mode, Some(PayloadMode::Enriched));
        assert_eq!(state.source_submission_id, Some(SubmissionId::new("sub-1")));
    }

    #[test]
    fn tick_outside_cooldown_is_a_noop() {
        let running = LockState {
            locked: true,
            mode: Some(PayloadMode::Full),
            ..LockState::default()
        };
        assert_eq!(running.tick(), running);
        assert_eq!(LockState::unlocked().tick(), LockState::unlocked());
    }

    #[test]
    fn phases() {
        assert_eq!(LockState::unlocked().phase(), LockPhase::Idle);
        let running = LockState {
            locked: true,
            ..LockState::default()
        };
        assert_eq!(running.phase(), LockPhase::Running);
        assert_eq!(cooldown(7).phase(), LockPhase::Cooldown { remaining: 7 });
    }

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(120), "2:00");
        assert_eq!(format_countdown(61), "1:01");
        assert_eq!(format_countdown(9), "0:09");
        assert_eq!(format_countdown(3600), "60:00");
    }

    #[test]
    fn badge_text() {
        assert_eq!(LockState::unlocked().view().badge(), None);
        let running = LockState {
            locked: true,
            ..LockState::default()
        };
        assert_eq!(running.view().badge().as_deref(), Some("Analysis running…"));
        assert_eq!(
            cooldown(120).view().badge().as_deref(),
            Some("Analysis cooldown 2:00")
        );
        assert!(!cooldown(3).view().can_submit());
        assert!(LockState::unlocked().view().can_submit());
    }
}
