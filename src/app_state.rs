use std::sync::Arc;

use crate::config::ClientConfig;
use crate::services::{
    api::{ApiClient, ApiError},
    auth::AuthClient,
    detection::DetectionClient,
    session::SessionContext,
    tracker::JobStatusTracker,
};

/// Shared client state passed to all command handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ClientConfig>,
    pub session: SessionContext,
    pub auth: Arc<AuthClient>,
    pub detection: Arc<DetectionClient>,
}

impl AppState {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let session = SessionContext::new();
        let api = ApiClient::new(&config.api_url, session.clone(), config.request_timeout())?;

        let auth = AuthClient::new(api.clone(), config.token_ttl());
        let detection = DetectionClient::new(api, config.export_capabilities());

        Ok(Self {
            config: Arc::new(config),
            session,
            auth: Arc::new(auth),
            detection: Arc::new(detection),
        })
    }

    /// Establish a session from the configured token, or else the configured credentials.
    pub async fn sign_in(&self) -> Result<(), ApiError> {
        if self.session.is_valid() {
            return Ok(());
        }

        let user = match (&self.config.token, &self.config.username, &self.config.password) {
            (Some(token), _, _) => self.auth.resume(token).await?,
            (None, Some(username), Some(password)) => self.auth.login(username, password).await?,
            _ => return Err(ApiError::Unauthenticated),
        };

        tracing::debug!(user_id = user.id, admin = user.is_admin(), "Session ready");
        Ok(())
    }

    /// A tracker polling at the configured interval.
    pub fn tracker(&self) -> JobStatusTracker {
        JobStatusTracker::new(self.detection.clone(), self.config.poll_interval())
    }
}
