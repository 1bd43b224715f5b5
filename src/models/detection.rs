use std::collections::BTreeMap;

use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::models::job::JobId;

/// A detection model offered by `GET /detection/models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionModel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// One object found in a frame. `bbox` is `[x, y, width, height]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
    #[serde(default)]
    pub track_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameDetection {
    pub job_id: JobId,
    pub video_id: i64,
    pub frame_number: i64,
    pub timestamp: f64,
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub motion_areas: Option<Vec<Vec<f64>>>,
}

/// A tracked object's presence interval on the video timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub class_name: String,
    pub track_id: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub first_frame: i64,
    pub last_frame: i64,
    pub confidence: f64,
}

impl TimelineEvent {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub job_id: JobId,
    pub video_id: i64,
    pub events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Events grouped into one lane per class name, lanes sorted by name and
    /// events within a lane by start time.
    pub fn events_by_class(&self) -> BTreeMap<&str, Vec<&TimelineEvent>> {
        let mut lanes: BTreeMap<&str, Vec<&TimelineEvent>> = BTreeMap::new();
        for event in &self.events {
            lanes.entry(event.class_name.as_str()).or_default().push(event);
        }
        for lane in lanes.values_mut() {
            lane.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }
        lanes
    }

    /// Latest end time across all events, or 0 for an empty timeline.
    pub fn span(&self) -> f64 {
        self.events.iter().map(|e| e.end_time).fold(0.0, f64::max)
    }
}

/// A cropped detection returned by `GET /detection/jobs/{id}/objects`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectThumbnail {
    /// Stored as `_id` by the service.
    #[serde(alias = "_id")]
    pub id: String,
    pub job_id: JobId,
    pub video_id: i64,
    pub frame_number: i64,
    pub timestamp: f64,
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
    #[serde(default)]
    pub track_id: Option<i64>,
    pub thumbnail_url: String,
}

/// Paging and time-window filter for frame detections.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct FrameQuery {
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,

    #[garde(range(min = 1, max = 1000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[garde(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,

    #[garde(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

/// Filter for detected object thumbnails.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct ObjectQuery {
    #[garde(length(min = 1, max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[garde(range(min = 0.0, max = 1.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    #[garde(range(min = 1, max = 1000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Result export formats understood by the service.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, EnumIter, Display, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Video,
}

impl ExportFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Video => "mp4",
        }
    }
}

/// Which export formats this deployment of the service can produce.
///
/// Annotated video export is not implemented by every backend, so it is off
/// unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportCapabilities {
    pub video: bool,
}

impl Default for ExportCapabilities {
    fn default() -> Self {
        Self { video: false }
    }
}

impl ExportCapabilities {
    pub fn supports(&self, format: ExportFormat) -> bool {
        match format {
            ExportFormat::Json | ExportFormat::Csv => true,
            ExportFormat::Video => self.video,
        }
    }
}

/// Response of `POST /detection/jobs/{id}/export`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportTicket {
    pub status: String,
    pub message: String,
    pub download_url: String,
}
