//! In-memory [`AnalysisApi`] with scripted replies for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proflock_core::{JobStatus, PayloadMode, StatusSnapshot, SubmissionId};

use crate::api::{AnalysisApi, SubmitOptions};
use crate::error::ClientError;

pub(crate) fn snapshot(id: &str, status: JobStatus) -> StatusSnapshot {
    StatusSnapshot {
        submission_id: Some(SubmissionId::new(id)),
        status,
        mode: Some(PayloadMode::Enriched),
        error: None,
        created_at: Some("2025-01-10T10:00:00Z".to_string()),
        updated_at: Some("2025-01-10T10:00:00Z".to_string()),
        expire_at: None,
        is_locked: true,
        remaining_lock_seconds: None,
    }
}

pub(crate) fn terminal(id: &str, remaining: i64) -> StatusSnapshot {
    StatusSnapshot {
        expire_at: Some("2025-01-10T10:02:00Z".to_string()),
        remaining_lock_seconds: Some(remaining),
        ..snapshot(id, JobStatus::Done)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Snapshot(Option<StatusSnapshot>),
    Fail,
}

impl Reply {
    fn into_result(self) -> Result<Option<StatusSnapshot>, ClientError> {
        match self {
            Reply::Snapshot(snapshot) => Ok(snapshot),
            Reply::Fail => Err(ClientError::Http {
                status: 503,
                detail: "scripted failure".to_string(),
            }),
        }
    }
}

/// Replies are consumed in order; the last one repeats once the queue is
/// down to a single entry. An empty queue answers "no job".
#[derive(Default)]
pub(crate) struct ScriptedApi {
    job: Mutex<VecDeque<Reply>>,
    global: Mutex<VecDeque<Reply>>,
    submit_failure: Mutex<Option<(u16, String)>>,
    submit_delay: Mutex<Option<Duration>>,
    job_delays: Mutex<HashMap<String, Duration>>,
    /// Shared so it stays readable after the api moves into a coordinator.
    pub submit_calls: Arc<AtomicUsize>,
    pub job_calls: AtomicUsize,
    pub global_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn push_job(&self, reply: Reply) {
        self.job.lock().unwrap().push_back(reply);
    }

    pub fn push_global(&self, reply: Reply) {
        self.global.lock().unwrap().push_back(reply);
    }

    pub fn fail_submit(&self, status: u16, detail: &str) {
        *self.submit_failure.lock().unwrap() = Some((status, detail.to_string()));
    }

    /// Every submit sleeps for `delay` before answering.
    pub fn delay_submit(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Status fetches for `id` sleep for `delay` before answering.
    pub fn delay_job(&self, id: &str, delay: Duration) {
        self.job_delays
            .lock()
            .unwrap()
            .insert(id.to_string(), delay);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn next(queue: &Mutex<VecDeque<Reply>>) -> Reply {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(Reply::Snapshot(None))
        }
    }
}

impl AnalysisApi for ScriptedApi {
    async fn submit(
        &self,
        _submission_id: &SubmissionId,
        _options: &SubmitOptions,
    ) -> Result<(), ClientError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.submit_failure.lock().unwrap().clone() {
            Some((status, detail)) => Err(ClientError::Http { status, detail }),
            None => Ok(()),
        }
    }

    async fn job_status(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<StatusSnapshot>, ClientError> {
        self.job_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .job_delays
            .lock()
            .unwrap()
            .get(submission_id.as_str())
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::next(&self.job).into_result()
    }

    async fn global_status(&self) -> Result<Option<StatusSnapshot>, ClientError> {
        self.global_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.global).into_result()
    }
}
