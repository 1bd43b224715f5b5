use chrono::Duration;
use garde::Validate;
use reqwest::Method;

use crate::models::auth::{LoginRequest, TokenResponse, User};
use crate::services::api::{ApiClient, ApiError};

/// Login and current-user calls against `/auth`.
pub struct AuthClient {
    api: ApiClient,
    token_ttl: Duration,
}

impl AuthClient {
    pub fn new(api: ApiClient, token_ttl: Duration) -> Self {
        Self { api, token_ttl }
    }

    /// Exchange credentials for a token and initialize the shared session.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let token: TokenResponse = self
            .api
            .send_json(self.api.anonymous(Method::POST, "/auth/login")?.json(&request))
            .await?;
        self.api.session().init_from_login(&token, self.token_ttl);

        let user = self.current_user().await?;
        tracing::info!(user_id = user.id, username = %user.username, "Logged in");
        Ok(user)
    }

    /// Adopt a token issued elsewhere, then confirm the server accepts it.
    pub async fn resume(&self, access_token: &str) -> Result<User, ApiError> {
        let token = TokenResponse {
            access_token: access_token.to_string(),
            token_type: "bearer".to_string(),
            expires_in: None,
        };
        self.api.session().init_from_login(&token, self.token_ttl);
        self.test_token().await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.api.get_json("/auth/me").await
    }

    pub async fn test_token(&self) -> Result<User, ApiError> {
        self.api.post_empty("/auth/test-token").await
    }

    pub fn logout(&self) {
        self.api.session().clear();
        tracing::info!("Logged out");
    }
}
