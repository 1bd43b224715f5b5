//! Client-side lifecycle tracking for a single detection job.
//!
//! A [`JobStatusTracker`] fetches the job's record once on [`start`], then keeps
//! exactly one repeating poll alive for as long as the backend reports the job
//! as `pending` or `processing`. The first successfully fetched terminal status
//! (`completed` or `error`) cancels the poll; nothing else does. Failed fetches
//! leave both the last good record and the poll untouched and surface a
//! dismissible notice instead.
//!
//! Fetches for one tracker are serialized: a timer tick that finds a fetch in
//! flight is skipped. Every fetch captures the session epoch when issued and
//! its response is dropped if the session was stopped or restarted meanwhile.
//!
//! [`start`]: JobStatusTracker::start

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::models::job::{JobId, JobRecord, JobStatus};
use crate::services::api::ApiError;
use crate::services::timer::{schedule_repeating, PollHandle, Tick};

/// Interval between status polls of an active job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Source of job records. Implemented over HTTP by `DetectionClient`.
#[async_trait]
pub trait JobStatusClient: Send + Sync {
    async fn fetch_status(&self, job_id: JobId) -> Result<JobRecord, ApiError>;
}

/// Transient, dismissible report of a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchNotice {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything a view needs to render the tracked job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSnapshot {
    pub job_id: Option<JobId>,
    pub record: Option<JobRecord>,
    pub notice: Option<FetchNotice>,
    pub polling: bool,
}

impl TrackerSnapshot {
    pub fn status(&self) -> Option<JobStatus> {
        self.record.as_ref().map(|r| r.status)
    }

    /// Progress estimate for display; recomputed from `now` on every call.
    pub fn progress(&self, now: DateTime<Utc>) -> Option<f64> {
        self.record.as_ref().map(|r| r.estimate_progress(now))
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some_and(|s| s.is_terminal())
    }
}

/// What happened to one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A record was stored and the polling decision re-evaluated.
    Applied(JobStatus),
    /// The fetch failed; the previous record and timer were kept.
    Failed,
    /// The response was older than the record already shown.
    Stale,
    /// A timer tick found another fetch still in flight.
    Skipped,
    /// The tracker was stopped (or restarted) before the response could be used.
    Inactive,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Invalid job id: {0}")]
    InvalidJobId(JobId),
}

#[derive(Debug, Clone, Copy)]
enum FetchOrigin {
    Start,
    Timer,
    Manual,
}

impl FetchOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

struct Session {
    job_id: JobId,
    epoch: u64,
    poll: Option<PollHandle>,
}

impl Session {
    fn cancel_poll(&mut self) -> bool {
        match self.poll.take() {
            Some(handle) => {
                handle.cancel();
                metrics::gauge!("detection_active_pollers").decrement(1.0);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct TrackerState {
    last_epoch: u64,
    session: Option<Session>,
}

struct Shared {
    client: Arc<dyn JobStatusClient>,
    interval: Duration,
    state: Mutex<TrackerState>,
    in_flight: AsyncMutex<()>,
    snapshot: watch::Sender<TrackerSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_session(&self) -> Option<(JobId, u64)> {
        self.lock().session.as_ref().map(|s| (s.job_id, s.epoch))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().session.as_ref().is_some_and(|s| s.epoch == epoch)
    }

    async fn fetch(self: &Arc<Self>, origin: FetchOrigin) -> FetchOutcome {
        let Some((job_id, epoch)) = self.live_session() else {
            return FetchOutcome::Inactive;
        };

        let _in_flight = match origin {
            FetchOrigin::Timer => match self.in_flight.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    metrics::counter!("detection_polls_skipped_total").increment(1);
                    tracing::debug!(job_id, "Status fetch still in flight, skipping tick");
                    return FetchOutcome::Skipped;
                }
            },
            FetchOrigin::Start | FetchOrigin::Manual => self.in_flight.lock().await,
        };

        if !self.is_current(epoch) {
            return FetchOutcome::Inactive;
        }

        tracing::trace!(job_id, origin = origin.as_str(), "Fetching job status");
        let result = self.client.fetch_status(job_id).await;

        let mut state = self.lock();
        let Some(session) = state.session.as_mut().filter(|s| s.epoch == epoch) else {
            tracing::debug!(job_id, "Tracker stopped while fetch was in flight, dropping response");
            return FetchOutcome::Inactive;
        };

        let outcome = match result {
            Ok(record) if record.id == job_id => self.apply(session, record),
            Ok(record) => self.fail(
                job_id,
                origin,
                format!("Received job {} while tracking job {}", record.id, job_id),
            ),
            Err(error) => self.fail(job_id, origin, error.to_string()),
        };

        let label = match outcome {
            FetchOutcome::Applied(_) => "applied",
            FetchOutcome::Failed => "failed",
            _ => "stale",
        };
        metrics::counter!("detection_status_fetches_total", "outcome" => label).increment(1);
        outcome
    }

    fn apply(self: &Arc<Self>, session: &mut Session, record: JobRecord) -> FetchOutcome {
        let stale = self
            .snapshot
            .borrow()
            .record
            .as_ref()
            .is_some_and(|current| record.is_staler_than(current));
        if stale {
            tracing::warn!(
                job_id = session.job_id,
                status = %record.status,
                "Discarding out-of-order job record"
            );
            return FetchOutcome::Stale;
        }

        let status = record.status;
        self.decide_polling(session, status);
        let polling = session.poll.is_some();

        self.snapshot.send_modify(|snapshot| {
            snapshot.record = Some(record);
            snapshot.notice = None;
            snapshot.polling = polling;
        });
        FetchOutcome::Applied(status)
    }

    fn fail(&self, job_id: JobId, origin: FetchOrigin, message: String) -> FetchOutcome {
        tracing::warn!(
            job_id,
            origin = origin.as_str(),
            error = %message,
            "Status fetch failed, keeping last known record"
        );
        let notice = FetchNotice {
            message,
            at: Utc::now(),
        };
        self.snapshot.send_modify(|snapshot| snapshot.notice = Some(notice));
        FetchOutcome::Failed
    }

    fn decide_polling(self: &Arc<Self>, session: &mut Session, status: JobStatus) {
        if status.is_terminal() {
            if session.cancel_poll() {
                tracing::info!(job_id = session.job_id, %status, "Job finished, polling stopped");
            }
        } else if session.poll.is_none() {
            let weak = Arc::downgrade(self);
            session.poll = Some(schedule_repeating(self.interval, move || {
                poll_tick(weak.clone())
            }));
            metrics::gauge!("detection_active_pollers").increment(1.0);
            tracing::info!(
                job_id = session.job_id,
                interval_secs = self.interval.as_secs_f64(),
                "Polling started"
            );
        }
    }
}

fn poll_tick(shared: Weak<Shared>) -> Tick {
    Box::pin(async move {
        if let Some(shared) = shared.upgrade() {
            shared.fetch(FetchOrigin::Timer).await;
        }
    })
}

/// Watches one detection job until it reaches a terminal state.
///
/// The poll timer is owned exclusively by the tracker and cancelled by
/// [`stop`](Self::stop) or when the tracker is dropped.
pub struct JobStatusTracker {
    shared: Arc<Shared>,
}

impl JobStatusTracker {
    pub fn new(client: Arc<dyn JobStatusClient>, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(TrackerSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                client,
                interval,
                state: Mutex::new(TrackerState::default()),
                in_flight: AsyncMutex::new(()),
                snapshot,
            }),
        }
    }

    pub fn with_default_interval(client: Arc<dyn JobStatusClient>) -> Self {
        Self::new(client, DEFAULT_POLL_INTERVAL)
    }

    /// Begin tracking `job_id` with an immediate fetch.
    ///
    /// Any previous session on this tracker is ended first. A failed initial
    /// fetch is reported through the outcome and the snapshot notice; it is not
    /// retried.
    pub async fn start(&self, job_id: JobId) -> Result<FetchOutcome, TrackerError> {
        if job_id <= 0 {
            return Err(TrackerError::InvalidJobId(job_id));
        }

        {
            let mut state = self.shared.lock();
            if let Some(mut previous) = state.session.take() {
                previous.cancel_poll();
            }
            state.last_epoch += 1;
            let epoch = state.last_epoch;
            state.session = Some(Session {
                job_id,
                epoch,
                poll: None,
            });
            self.shared.snapshot.send_replace(TrackerSnapshot {
                job_id: Some(job_id),
                ..TrackerSnapshot::default()
            });
        }

        tracing::info!(job_id, "Tracking detection job");
        Ok(self.shared.fetch(FetchOrigin::Start).await)
    }

    /// One out-of-band fetch. Never adds or resets a timer.
    pub async fn refresh(&self) -> FetchOutcome {
        self.shared.fetch(FetchOrigin::Manual).await
    }

    /// Cancel polling and end the session. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if let Some(mut session) = state.session.take() {
            let was_polling = session.cancel_poll();
            tracing::debug!(job_id = session.job_id, was_polling, "Tracker stopped");
        }
        self.shared.snapshot.send_if_modified(|snapshot| {
            if snapshot.polling {
                snapshot.polling = false;
                true
            } else {
                false
            }
        });
    }

    pub fn dismiss_notice(&self) {
        self.shared
            .snapshot
            .send_if_modified(|snapshot| snapshot.notice.take().is_some());
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver notified on every change to the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.shared
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.poll.is_some())
    }

    pub fn progress(&self, now: DateTime<Utc>) -> Option<f64> {
        self.shared.snapshot.borrow().progress(now)
    }
}

impl Drop for JobStatusTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
