use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

static PROFILE_CLIENT: OnceCell<Arc<ProfileClient>> = OnceCell::const_new();

/// Client for the profile service that knows users' display names.
/// Requests are signed with a short-lived service token.
#[derive(Debug)]
pub struct ProfileClient {
    client: Client,
    base_url: String,
    jwt_secret: String,
    service_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

/// Subset of a user profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    pub fn best_display_name(&self) -> Option<String> {
        [&self.display_name, &self.name, &self.email]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug)]
pub enum ProfileClientError {
    Token(jsonwebtoken::errors::Error),
    Http(reqwest::Error),
}

impl fmt::Display for ProfileClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileClientError::Token(e) => write!(f, "Failed to sign service token: {}", e),
            ProfileClientError::Http(e) => write!(f, "Profile service request failed: {}", e),
        }
    }
}

impl std::error::Error for ProfileClientError {}

impl From<reqwest::Error> for ProfileClientError {
    fn from(e: reqwest::Error) -> Self {
        ProfileClientError::Http(e)
    }
}

impl ProfileClient {
    pub fn new(base_url: String, jwt_secret: String, service_name: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            service_name,
        })
    }

    fn generate_token(&self) -> Result<String, ProfileClientError> {
        // 1 minute expiration
        let expiration = (Utc::now() + Duration::seconds(60)).timestamp();

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.jwt_secret.as_bytes()))
            .map_err(ProfileClientError::Token)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, ProfileClientError> {
        let token = self.generate_token()?;
        let url = format!("{}/users/{}/profile", self.base_url, user_id);
        let profile = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile)
    }
}

/// Initialize the global ProfileClient
pub fn init_profile_client(base_url: String, jwt_secret: String, service_name: String) -> Result<(), String> {
    let client = ProfileClient::new(base_url, jwt_secret, service_name)
        .map_err(|e| format!("Failed to build profile client: {}", e))?;
    PROFILE_CLIENT
        .set(Arc::new(client))
        .map_err(|_| "ProfileClient already initialized".to_string())
}

/// Get the global ProfileClient instance
pub fn get_profile_client() -> Option<Arc<ProfileClient>> {
    PROFILE_CLIENT.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_name_then_email() {
        let profile = UserProfile {
            display_name: Some("  ".to_string()),
            name: None,
            email: Some("ana@example.org".to_string()),
        };
        assert_eq!(profile.best_display_name().as_deref(), Some("ana@example.org"));
        assert_eq!(UserProfile::default().best_display_name(), None);
    }
}
