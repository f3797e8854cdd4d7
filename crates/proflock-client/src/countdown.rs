//! Local 1-second cooldown countdown.
//!
//! One supervisor task per coordinator watches the store. Entering a
//! cooldown creates the interval, leaving it drops the interval, so there is
//! never more than one countdown timer however often the lock flips. The
//! first decrement happens one period after entering the cooldown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::store::LockStateStore;

pub struct CountdownTicker {
    handle: JoinHandle<()>,
}

impl CountdownTicker {
    pub fn spawn(store: Arc<LockStateStore>, period: Duration) -> Self {
        let handle = tokio::spawn(run(store, period));
        CountdownTicker { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(store: Arc<LockStateStore>, period: Duration) {
    let mut rx = store.subscribe();
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
                    let state = store.decrement();
                    if !state.locked {
                        tracing::info!("Analysis cooldown elapsed");
                    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snapshot, terminal};
    use proflock_core::{JobStatus, LockState};

    async fn advance(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_once_per_period_and_unlocks() {
        let store = Arc::new(LockStateStore::new());
        let _ticker = CountdownTicker::spawn(Arc::clone(&store), Duration::from_secs(1));
        tokio::task::yield_now().await;

        store.set_from_snapshot(None, Some(&terminal("sub-1", 5)));
        tokio::task::yield_now().await;

        advance(4).await;
        let state = store.current();
        assert!(state.locked);
        assert_eq!(state.remaining, Some(1));

        advance(1).await;
        assert_eq!(store.current(), LockState::unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_is_not_counted_down() {
        let store = Arc::new(LockStateStore::new());
        let _ticker = CountdownTicker::spawn(Arc::clone(&store), Duration::from_secs(1));
        store.set_from_snapshot(None, Some(&snapshot("sub-1", JobStatus::Running)));
        tokio::task::yield_now().await;

        advance(10).await;
        let state = store.current();
        assert!(state.locked);
        assert_eq!(state.remaining, None);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_transitions_do_not_stack_timers() {
        let store = Arc::new(LockStateStore::new());
        let _ticker = CountdownTicker::spawn(Arc::clone(&store), Duration::from_secs(1));
        tokio::task::yield_now().await;

        for _ in 0..5 {
            store.set_from_snapshot(None, Some(&terminal("sub-1", 30)));
            tokio::task::yield_now().await;
            store.clear();
            tokio::task::yield_now().await;
        }
        store.set_from_snapshot(None, Some(&terminal("sub-1", 30)));
        tokio::task::yield_now().await;

        advance(3).await;
        assert_eq!(store.current().remaining, Some(27));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_ticker_no_longer_decrements() {
        let store = Arc::new(LockStateStore::new());
        let ticker = CountdownTicker::spawn(Arc::clone(&store), Duration::from_secs(1));
        store.set_from_snapshot(None, Some(&terminal("sub-1", 10)));
        tokio::task::yield_now().await;

        ticker.stop();
        advance(3).await;
        assert_eq!(store.current().remaining, Some(10));
    }
}
