use std::path::{Path, PathBuf};

use crate::app_state::AppState;
use crate::commands::CommandResult;
use crate::models::detection::{ExportFormat, FrameQuery, ObjectQuery, Timeline};
use crate::models::job::JobId;

pub async fn models(state: &AppState) -> CommandResult {
    let models = state.detection.list_models().await?;
    for model in &models {
        println!("{:<18} {} ({})", model.id, model.name, model.kind);
        println!("{:<18} {}", "", model.description);
        if !model.classes.is_empty() {
            println!("{:<18} classes: {}", "", model.classes.join(", "));
        }
    }
    Ok(())
}

/// Render a timeline as one text lane per class, scaled to `width` columns.
pub fn render_timeline(timeline: &Timeline, width: usize) -> Vec<String> {
    let span = timeline.span();
    let lanes = timeline.events_by_class();
    let label_width = lanes.keys().map(|k| k.len()).max().unwrap_or(0);

    let column = |time: f64| -> usize {
        if span <= 0.0 {
            return 0;
        }
        (((time / span) * width as f64).floor() as usize).min(width.saturating_sub(1))
    };

    lanes
        .iter()
        .map(|(class_name, events)| {
            let mut lane = vec!['.'; width];
            for event in events {
                let (start, end) = (column(event.start_time), column(event.end_time));
                for cell in lane.iter_mut().take(end + 1).skip(start) {
                    *cell = '#';
                }
            }
            format!(
                "{:<label_width$} |{}| {}",
                class_name,
                lane.into_iter().collect::<String>(),
                events.len()
            )
        })
        .collect()
}

pub async fn timeline(state: &AppState, job_id: JobId) -> CommandResult {
    let timeline = state.detection.timeline(job_id).await?;
    if timeline.events.is_empty() {
        println!("No timeline events for job {job_id}");
        return Ok(());
    }

    println!("Timeline for job {} (0s .. {:.1}s)", job_id, timeline.span());
    for line in render_timeline(&timeline, 60) {
        println!("{line}");
    }
    Ok(())
}

pub async fn frames(state: &AppState, job_id: JobId, query: FrameQuery) -> CommandResult {
    let frames = state.detection.frames(job_id, &query).await?;
    for frame in &frames {
        let classes: Vec<String> = frame
            .detections
            .iter()
            .map(|d| format!("{} {:.2}", d.class_name, d.confidence))
            .collect();
        println!(
            "frame {:>6} @ {:>8.2}s  {}",
            frame.frame_number,
            frame.timestamp,
            classes.join(", ")
        );
    }
    println!("{} frame(s)", frames.len());
    Ok(())
}

pub async fn objects(state: &AppState, job_id: JobId, query: ObjectQuery) -> CommandResult {
    let objects = state.detection.objects(job_id, &query).await?;
    for object in &objects {
        println!(
            "{:<14} {:.2}  frame {:>6} @ {:>8.2}s  {}",
            object.class_name,
            object.confidence,
            object.frame_number,
            object.timestamp,
            object.thumbnail_url
        );
    }
    println!("{} object(s)", objects.len());
    Ok(())
}

pub fn default_export_path(job_id: JobId, format: ExportFormat) -> PathBuf {
    PathBuf::from(format!("detection_job_{}.{}", job_id, format.file_extension()))
}

/// Request an export and save it to `output` (or a default file name).
pub async fn export(
    state: &AppState,
    job_id: JobId,
    format: ExportFormat,
    output: Option<&Path>,
) -> CommandResult<PathBuf> {
    if !state.detection.capabilities().supports(format) {
        let available: Vec<String> = state
            .detection
            .export_formats()
            .iter()
            .map(ToString::to_string)
            .collect();
        return Err(format!(
            "Export format '{}' is not available; choose one of: {}",
            format,
            available.join(", ")
        )
        .into());
    }

    let ticket = state.detection.export(job_id, format).await?;
    tracing::info!(job_id, %format, message = %ticket.message, "Export prepared");

    let bytes = state.detection.download(job_id, format).await?;
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_export_path(job_id, format));
    tokio::fs::write(&path, &bytes).await?;

    println!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}
