use garde::Validate;
use serde::{Deserialize, Serialize};

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 100))]
    pub username: String,

    #[garde(length(min = 1))]
    pub password: String,
}

/// Access token issued by the service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, when the service reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Role summary embedded in the current-user view. Only `name` is relied on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleSummary {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// The authenticated user, as returned by `GET /auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub role_id: i64,
    #[serde(default)]
    pub role: Option<RoleSummary>,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_ref().is_some_and(|r| r.name == "admin")
    }
}
