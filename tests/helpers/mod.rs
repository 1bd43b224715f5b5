//! Test helper utilities shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use vision_tech_client::models::job::{JobId, JobRecord, JobStatus};
use vision_tech_client::services::api::ApiError;
use vision_tech_client::services::tracker::{JobStatusClient, TrackerSnapshot};

/// How the fake service answers one status fetch.
#[derive(Debug, Clone)]
pub enum Reply {
    Record(JobRecord),
    Fail(String),
    Delayed(Duration, Box<Reply>),
}

/// `JobStatusClient` that answers from a script.
///
/// Replies are consumed in order; once the script runs dry the last reply is
/// repeated, the way a real backend keeps returning the same state.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    calls: watch::Sender<usize>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let (calls, _) = watch::channel(0);
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls,
        }
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }

    /// Wait (in paused test time) until at least `n` fetches were issued.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.calls.subscribe();
        tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|c| *c >= n))
            .await
            .unwrap_or_else(|_| panic!("expected {n} fetches, saw {}", self.calls()))
            .expect("call counter dropped");
    }

    fn next_reply(&self) -> Option<Reply> {
        let mut last = self.last.lock().unwrap();
        match self.script.lock().unwrap().pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                Some(reply)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl JobStatusClient for ScriptedClient {
    async fn fetch_status(&self, job_id: JobId) -> Result<JobRecord, ApiError> {
        let reply = self.next_reply();
        self.calls.send_modify(|c| *c += 1);

        let mut reply = reply.ok_or_else(|| ApiError::Status {
            status: 404,
            detail: format!("no scripted reply for job {job_id}"),
        })?;

        loop {
            match reply {
                Reply::Record(record) => return Ok(record),
                Reply::Fail(detail) => return Err(ApiError::Status { status: 503, detail }),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

pub fn record(id: JobId, status: JobStatus) -> JobRecord {
    let now = Utc::now();
    let created_at = now - ChronoDuration::minutes(15);
    let started_at = match status {
        JobStatus::Pending => None,
        _ => Some(now - ChronoDuration::minutes(5)),
    };
    let completed_at = status.is_terminal().then_some(now);

    JobRecord {
        id,
        video_id: 7,
        model_name: "yolov8n".to_string(),
        parameters: None,
        status,
        created_by: 1,
        created_at,
        started_at,
        completed_at,
        error_message: (status == JobStatus::Error).then(|| "Detection failed".to_string()),
    }
}

pub fn pending(id: JobId) -> Reply {
    Reply::Record(record(id, JobStatus::Pending))
}

/// A processing record whose run started `elapsed_secs` ago.
pub fn processing(id: JobId, elapsed_secs: i64) -> Reply {
    let mut job = record(id, JobStatus::Processing);
    job.started_at = Some(Utc::now() - ChronoDuration::seconds(elapsed_secs));
    Reply::Record(job)
}

pub fn completed(id: JobId) -> Reply {
    Reply::Record(record(id, JobStatus::Completed))
}

pub fn failed(id: JobId) -> Reply {
    Reply::Record(record(id, JobStatus::Error))
}

pub fn network_error() -> Reply {
    Reply::Fail("connection reset by peer".to_string())
}

pub fn delayed(delay: Duration, reply: Reply) -> Reply {
    Reply::Delayed(delay, Box::new(reply))
}

/// Wait until the tracker's snapshot satisfies `predicate`.
pub async fn wait_for_snapshot(
    rx: &mut watch::Receiver<TrackerSnapshot>,
    predicate: impl FnMut(&TrackerSnapshot) -> bool,
) -> TrackerSnapshot {
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate))
        .await
        .expect("snapshot condition not reached")
        .expect("tracker dropped")
        .clone()
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
