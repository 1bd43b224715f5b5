use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use crate::app_state::AppState;
use crate::commands::{format_time, CommandResult};
use crate::models::job::{CreateJobRequest, JobId, JobRecord, JobStatus};
use crate::services::api::ApiError;
use crate::services::tracker::{FetchOutcome, TrackerSnapshot};

const PROGRESS_BAR_WIDTH: usize = 24;

/// Text progress bar, e.g. `[############------------]  50%`.
pub fn progress_bar(percent: f64) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * PROGRESS_BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled),
        percent
    )
}

/// Jobs that were watched to the end, and how many could not be.
#[derive(Debug, Default)]
pub struct WatchSummary {
    pub finished: Vec<JobRecord>,
    pub failures: usize,
}

impl WatchSummary {
    /// True when every job was tracked to a successful completion.
    pub fn all_completed(&self) -> bool {
        self.failures == 0 && self.finished.iter().all(|job| job.status == JobStatus::Completed)
    }
}

/// Returns the status line for `snapshot` unless it repeats `last`.
pub fn next_status_line(
    last: &mut Option<String>,
    snapshot: &TrackerSnapshot,
    now: DateTime<Utc>,
) -> Option<String> {
    let line = status_line(snapshot, now);
    if last.as_deref() == Some(line.as_str()) {
        return None;
    }
    *last = Some(line.clone());
    Some(line)
}

/// One-line summary of a tracker snapshot.
pub fn status_line(snapshot: &TrackerSnapshot, now: DateTime<Utc>) -> String {
    let job = snapshot
        .job_id
        .map(|id| format!("job {id}"))
        .unwrap_or_else(|| "job ?".to_string());

    let Some(record) = &snapshot.record else {
        return format!("{job}: loading");
    };

    let mut line = format!(
        "{job}: {:<10} {} model={}",
        record.status.to_string().to_uppercase(),
        progress_bar(record.estimate_progress(now)),
        record.model_name
    );
    if let Some(message) = &record.error_message {
        line.push_str(&format!(" error=\"{message}\""));
    }
    line
}

pub fn print_job(job: &JobRecord) {
    println!("Job {} ({})", job.id, job.status.to_string().to_uppercase());
    println!("  video:     {}", job.video_id);
    println!("  model:     {}", job.model_name);
    if let Some(parameters) = &job.parameters {
        println!("  params:    {parameters}");
    }
    println!("  created:   {}", format_time(job.created_at));
    if let Some(started) = job.started_at {
        println!("  started:   {}", format_time(started));
    }
    if let Some(completed) = job.completed_at {
        println!("  completed: {}", format_time(completed));
    }
    if let Some(message) = &job.error_message {
        println!("  error:     {message}");
    }
}

pub async fn submit(
    state: &AppState,
    video_id: i64,
    model_name: String,
    parameters: Option<serde_json::Value>,
) -> CommandResult<JobRecord> {
    let request = CreateJobRequest {
        model_name,
        parameters,
    };
    let job = state.detection.create_job(video_id, &request).await?;
    println!("Submitted job {} for video {} using {}", job.id, video_id, job.model_name);
    Ok(job)
}

pub async fn status(state: &AppState, job_id: JobId) -> CommandResult {
    let job = state.detection.get_job(job_id).await?;
    print_job(&job);
    if job.status == JobStatus::Processing {
        println!("  progress:  {}", progress_bar(job.estimate_progress(Utc::now())));
    }
    Ok(())
}

pub async fn list_for_video(state: &AppState, video_id: i64) -> CommandResult {
    let jobs = state.detection.list_jobs_for_video(video_id).await?;
    if jobs.is_empty() {
        println!("No detection jobs for video {video_id}");
        return Ok(());
    }
    println!("{:>8}  {:<11} {:<18} {}", "JOB", "STATUS", "MODEL", "CREATED");
    for job in &jobs {
        println!(
            "{:>8}  {:<11} {:<18} {}",
            job.id,
            job.status,
            job.model_name,
            format_time(job.created_at)
        );
    }
    Ok(())
}

pub async fn cancel(state: &AppState, job_id: JobId) -> CommandResult {
    let job = state.detection.cancel_job(job_id).await?;
    println!("Job {} is now {}", job.id, job.status);
    Ok(())
}

/// Track one job until it finishes, printing every change.
pub async fn watch_job(state: &AppState, job_id: JobId) -> CommandResult<TrackerSnapshot> {
    let tracker = state.tracker();
    let mut updates = tracker.subscribe();

    if tracker.start(job_id).await? == FetchOutcome::Failed {
        let reason = tracker
            .snapshot()
            .notice
            .map(|n| n.message)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("Could not load job {job_id}: {reason}").into());
    }

    let mut last_line = None;
    loop {
        let snapshot = updates.borrow_and_update().clone();

        if let Some(notice) = &snapshot.notice {
            eprintln!("job {job_id}: fetch failed ({}), retrying on next poll", notice.message);
            if !state.session.is_valid() {
                return Err(Box::new(ApiError::Unauthenticated));
            }
            tracker.dismiss_notice();
        }

        if let Some(line) = next_status_line(&mut last_line, &snapshot, Utc::now()) {
            println!("{line}");
        }

        if snapshot.is_finished() {
            tracker.stop();
            return Ok(snapshot);
        }

        if updates.changed().await.is_err() {
            return Ok(snapshot);
        }
    }
}

/// Watch several jobs concurrently, each with its own tracker.
///
/// Fails only when no job could be tracked at all; partial failures are
/// counted in the summary.
pub async fn watch_many(state: &AppState, job_ids: &[JobId]) -> CommandResult<WatchSummary> {
    let mut tasks = JoinSet::new();
    for &job_id in job_ids {
        let state = state.clone();
        tasks.spawn(async move { (job_id, watch_job(&state, job_id).await) });
    }

    let mut summary = WatchSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            (_, Ok(snapshot)) => summary.finished.extend(snapshot.record),
            (job_id, Err(e)) => {
                summary.failures += 1;
                tracing::error!(job_id, error = %e, "Stopped watching job");
            }
        }
    }

    if summary.failures > 0 && summary.finished.is_empty() {
        return Err(format!("Failed to watch {} job(s)", summary.failures).into());
    }
    Ok(summary)
}
