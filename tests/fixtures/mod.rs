//! Response bodies captured from the detection service.
//!
//! Timestamps are naive, exactly as the service serializes them.
#![allow(dead_code)]

use serde_json::{json, Value};

pub const ACCESS_TOKEN: &str = "test-access-token";

pub fn token_body() -> Value {
    json!({ "access_token": ACCESS_TOKEN, "token_type": "bearer" })
}

pub fn user_body() -> Value {
    json!({
        "id": 1,
        "username": "analyst",
        "email": "analyst@example.com",
        "first_name": "Dana",
        "last_name": "Reyes",
        "is_active": true,
        "role_id": 2,
        "role": { "id": 2, "name": "analyst" }
    })
}

pub fn pending_job_body(id: i64) -> Value {
    json!({
        "id": id,
        "video_id": 7,
        "model_name": "yolov8n",
        "parameters": { "conf": 0.4 },
        "status": "pending",
        "created_by": 1,
        "created_at": "2024-05-01T09:30:00.123456",
        "started_at": null,
        "completed_at": null,
        "error_message": null
    })
}

pub fn completed_job_body(id: i64) -> Value {
    json!({
        "id": id,
        "video_id": 7,
        "model_name": "yolov8n",
        "parameters": null,
        "status": "completed",
        "created_by": 1,
        "created_at": "2024-05-01T09:30:00",
        "started_at": "2024-05-01T09:31:00",
        "completed_at": "2024-05-01T09:38:12.5",
        "error_message": null
    })
}

pub fn validation_body() -> Value {
    json!({
        "detail": [
            { "loc": ["body", "model_name"], "msg": "unknown model", "type": "value_error" }
        ]
    })
}

pub fn timeline_body(job_id: i64) -> Value {
    json!({
        "job_id": job_id,
        "video_id": 7,
        "events": [
            { "type": "object", "class_name": "person", "track_id": 1, "start_time": 0.0,
              "end_time": 4.5, "first_frame": 0, "last_frame": 135, "confidence": 0.91 },
            { "type": "object", "class_name": "car", "track_id": 2, "start_time": 2.0,
              "end_time": 9.0, "first_frame": 60, "last_frame": 270, "confidence": 0.87 },
            { "type": "object", "class_name": "person", "track_id": 3, "start_time": 6.0,
              "end_time": 8.0, "first_frame": 180, "last_frame": 240, "confidence": 0.78 }
        ]
    })
}

/// Object documents exactly as stored: the id lives in `_id`.
pub fn objects_body(job_id: i64) -> Value {
    json!([
        {
            "_id": "665f0c2a9b1e4d0012ab34cd",
            "job_id": job_id,
            "video_id": 7,
            "frame_number": 120,
            "timestamp": 4.0,
            "class_id": 0,
            "class_name": "person",
            "confidence": 0.93,
            "bbox": [10.0, 20.0, 110.0, 220.0],
            "track_id": 3,
            "thumbnail_url": format!("/static/thumbnails/{job_id}/665f0c2a9b1e4d0012ab34cd.jpg")
        }
    ])
}

pub fn frames_body(job_id: i64) -> Value {
    json!([
        {
            "job_id": job_id,
            "video_id": 7,
            "frame_number": 30,
            "timestamp": 1.0,
            "detections": [
                { "class_id": 2, "class_name": "car", "confidence": 0.88,
                  "bbox": [5.0, 5.0, 50.0, 40.0], "track_id": 2 }
            ]
        }
    ])
}

pub fn export_ticket_body(job_id: i64, format: &str) -> Value {
    json!({
        "status": "success",
        "message": format!("Export in {format} format is ready"),
        "download_url": format!("/api/v1/detection/jobs/{job_id}/download?format={format}")
    })
}
