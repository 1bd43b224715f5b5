use async_trait::async_trait;
use garde::Validate;
use reqwest::Method;
use strum::IntoEnumIterator;

use crate::models::detection::{
    DetectionModel, ExportCapabilities, ExportFormat, ExportTicket, FrameDetection,
    FrameQuery, ObjectQuery, ObjectThumbnail, Timeline,
};
use crate::models::job::{CreateJobRequest, JobId, JobRecord};
use crate::services::api::{ApiClient, ApiError};
use crate::services::tracker::JobStatusClient;

/// Client for the `/detection` endpoints.
pub struct DetectionClient {
    api: ApiClient,
    capabilities: ExportCapabilities,
}

impl DetectionClient {
    pub fn new(api: ApiClient, capabilities: ExportCapabilities) -> Self {
        Self { api, capabilities }
    }

    pub fn capabilities(&self) -> ExportCapabilities {
        self.capabilities
    }

    /// Export formats this deployment can produce, in display order.
    pub fn export_formats(&self) -> Vec<ExportFormat> {
        ExportFormat::iter()
            .filter(|f| self.capabilities.supports(*f))
            .collect()
    }

    pub async fn list_models(&self) -> Result<Vec<DetectionModel>, ApiError> {
        self.api.get_json("/detection/models").await
    }

    /// Queue a detection run. The returned job starts out `pending`.
    pub async fn create_job(
        &self,
        video_id: i64,
        request: &CreateJobRequest,
    ) -> Result<JobRecord, ApiError> {
        request.validate()?;
        let job: JobRecord = self
            .api
            .post_json(&format!("/detection/videos/{video_id}/jobs"), request)
            .await?;
        tracing::info!(
            job_id = job.id,
            video_id,
            model = %job.model_name,
            "Detection job created"
        );
        Ok(job)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<JobRecord, ApiError> {
        self.api.get_json(&format!("/detection/jobs/{job_id}")).await
    }

    pub async fn list_jobs_for_video(&self, video_id: i64) -> Result<Vec<JobRecord>, ApiError> {
        self.api
            .get_json(&format!("/detection/videos/{video_id}/jobs"))
            .await
    }

    pub async fn cancel_job(&self, job_id: JobId) -> Result<JobRecord, ApiError> {
        let job: JobRecord = self
            .api
            .post_empty(&format!("/detection/jobs/{job_id}/cancel"))
            .await?;
        tracing::info!(job_id, status = %job.status, "Detection job cancel requested");
        Ok(job)
    }

    pub async fn frames(
        &self,
        job_id: JobId,
        query: &FrameQuery,
    ) -> Result<Vec<FrameDetection>, ApiError> {
        query.validate()?;
        self.api
            .get_json_with_query(&format!("/detection/jobs/{job_id}/frames"), query)
            .await
    }

    pub async fn timeline(&self, job_id: JobId) -> Result<Timeline, ApiError> {
        self.api
            .get_json(&format!("/detection/jobs/{job_id}/timeline"))
            .await
    }

    pub async fn objects(
        &self,
        job_id: JobId,
        query: &ObjectQuery,
    ) -> Result<Vec<ObjectThumbnail>, ApiError> {
        query.validate()?;
        self.api
            .get_json_with_query(&format!("/detection/jobs/{job_id}/objects"), query)
            .await
    }

    /// Ask the service to prepare an export and return where to fetch it.
    pub async fn export(
        &self,
        job_id: JobId,
        format: ExportFormat,
    ) -> Result<ExportTicket, ApiError> {
        self.ensure_supported(format)?;
        let request = self
            .api
            .authorized(Method::POST, &format!("/detection/jobs/{job_id}/export"))?
            .query(&[("format", format.to_string())]);
        self.api.send_json(request).await
    }

    /// Download exported results as raw bytes.
    pub async fn download(&self, job_id: JobId, format: ExportFormat) -> Result<Vec<u8>, ApiError> {
        self.ensure_supported(format)?;
        let request = self
            .api
            .authorized(Method::GET, &format!("/detection/jobs/{job_id}/download"))?
            .query(&[("format", format.to_string())]);

        let bytes = match self.api.send(request).await {
            Ok(response) => response.bytes().await?,
            Err(ApiError::NotImplemented(detail)) => {
                tracing::warn!(job_id, %format, %detail, "Export format not implemented by server");
                return Err(ApiError::UnsupportedFormat(format));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(job_id, %format, bytes = bytes.len(), "Export downloaded");
        Ok(bytes.to_vec())
    }

    fn ensure_supported(&self, format: ExportFormat) -> Result<(), ApiError> {
        if self.capabilities.supports(format) {
            Ok(())
        } else {
            Err(ApiError::UnsupportedFormat(format))
        }
    }
}

#[async_trait]
impl JobStatusClient for DetectionClient {
    async fn fetch_status(&self, job_id: JobId) -> Result<JobRecord, ApiError> {
        self.get_job(job_id).await
    }
}
