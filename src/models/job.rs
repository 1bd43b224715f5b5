use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::timestamp;

/// Identifier of a detection job (serial integer issued by the backend).
pub type JobId = i64;

/// Nominal duration of a detection job, used for the progress ramp.
const NOMINAL_JOB_MINUTES: f64 = 10.0;

/// Ceiling for estimated progress while the backend still reports `processing`.
const PROCESSING_PROGRESS_CAP: f64 = 90.0;

/// Lifecycle state of a detection job, as reported by the backend.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// `completed` and `error` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Snapshot of one detection job as returned by `GET /detection/jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub video_id: i64,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    pub status: JobStatus,
    pub created_by: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl JobRecord {
    /// Client-side progress estimate in percent.
    ///
    /// Terminal jobs read 100 (finished, not necessarily successful) and pending
    /// jobs read 0. A processing job ramps linearly over a nominal ten minute run
    /// from `started_at`, capped at 90 so the bar never claims completion before
    /// the backend does.
    pub fn estimate_progress(&self, now: DateTime<Utc>) -> f64 {
        match self.status {
            JobStatus::Completed | JobStatus::Error => 100.0,
            JobStatus::Pending => 0.0,
            JobStatus::Processing => match self.started_at {
                Some(started) => {
                    let elapsed_minutes =
                        (now - started).num_milliseconds() as f64 / 60_000.0;
                    (elapsed_minutes / NOMINAL_JOB_MINUTES * 100.0)
                        .clamp(0.0, PROCESSING_PROGRESS_CAP)
                }
                None => 0.0,
            },
        }
    }

    /// Ordering key used to reject out-of-order responses.
    fn recency(&self) -> (u8, Option<DateTime<Utc>>) {
        match self.status {
            JobStatus::Pending => (0, Some(self.created_at)),
            JobStatus::Processing => (1, self.started_at),
            JobStatus::Completed | JobStatus::Error => (2, self.completed_at),
        }
    }

    /// True when `self` describes an earlier point in the job's life than `applied`.
    pub fn is_staler_than(&self, applied: &JobRecord) -> bool {
        self.recency() < applied.recency()
    }
}

/// Body of `POST /detection/videos/{video_id}/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 100))]
    pub model_name: String,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}
