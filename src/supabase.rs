//! # Auth Provider
//!
//! Sessions and identities live in Supabase Auth. The API only verifies
//! access tokens, forwards sign-in/sign-up and removes identities when an
//! account is deleted. Handlers see the [`AuthProvider`] trait so tests can
//! swap the HTTP client for a fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;

/// Address of the Supabase CLI's local stack, used by `local`/`test`
/// profiles when no URL is configured.
pub const LOCAL_SUPABASE_URL: &str = "http://127.0.0.1:54321";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("auth provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("auth provider is not configured for {0}")]
    NotConfigured(&'static str),
    #[error("auth provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected auth provider response ({status})")]
    Unexpected { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: ProviderUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Auto-confirmed account, already signed in.
    Session(Session),
    /// Account created; the user must confirm their email first.
    ConfirmationRequired(ProviderUser),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolves an access token. `Ok(None)` means the token is not valid.
    async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, AuthProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthProviderError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthProviderError>;

    /// Removes the identity. Requires the service-role key.
    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthProviderError>;
}

/// Supabase Auth (GoTrue) REST client.
#[derive(Clone)]
pub struct SupabaseAuth {
    http: Client,
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
}

impl SupabaseAuth {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        service_role_key: Option<String>,
    ) -> Result<Self, AuthProviderError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AuthProviderError> {
        let base_url = config
            .supabase_url
            .clone()
            .unwrap_or_else(|| LOCAL_SUPABASE_URL.to_string());
        Self::new(
            base_url,
            config.supabase_anon_key.clone().unwrap_or_default(),
            config.supabase_service_role_key.clone(),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn public(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }
}

#[derive(Debug, Deserialize)]
struct SignUpBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    user: Option<ProviderUser>,
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    email: Option<String>,
}

impl SignUpBody {
    fn into_outcome(self) -> Option<SignUpOutcome> {
        match (self.access_token, self.user) {
            (Some(access_token), Some(user)) => Some(SignUpOutcome::Session(Session {
                access_token,
                refresh_token: self.refresh_token,
                expires_in: self.expires_in,
                token_type: self.token_type,
                user,
            })),
            (None, Some(user)) => Some(SignUpOutcome::ConfirmationRequired(user)),
            (_, None) => self.id.map(|id| {
                SignUpOutcome::ConfirmationRequired(ProviderUser {
                    id,
                    email: self.email,
                })
            }),
        }
    }
}

/// GoTrue has used `error_description`, `msg`, `message` and `error` over
/// time; take the first present.
fn provider_message(body: &Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .map(str::to_owned)
}

async fn rejection(response: reqwest::Response) -> AuthProviderError {
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    match provider_message(&body) {
        Some(message) => AuthProviderError::Rejected { status, message },
        None => AuthProviderError::Unexpected { status },
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, AuthProviderError> {
        let response = self
            .public(self.http.get(self.endpoint("user")))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => {
                tracing::warn!(status = status.as_u16(), "token verification failed upstream");
                Err(AuthProviderError::Unexpected {
                    status: status.as_u16(),
                })
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthProviderError> {
        let response = self
            .public(self.http.post(self.endpoint("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            let message =
                provider_message(&body).unwrap_or_else(|| "Invalid login credentials".to_string());
            return Err(AuthProviderError::InvalidCredentials(message));
        }
        Err(rejection(response).await)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthProviderError> {
        let response = self
            .public(self.http.post(self.endpoint("signup")))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(response).await);
        }

        let body: SignUpBody = response.json().await?;
        body.into_outcome().ok_or(AuthProviderError::Unexpected {
            status: status.as_u16(),
        })
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthProviderError> {
        let service_key = self
            .service_role_key
            .as_deref()
            .ok_or(AuthProviderError::NotConfigured("admin user deletion"))?;

        let response = self
            .http
            .delete(self.endpoint(&format!("admin/users/{user_id}")))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .send()
            .await?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }
}
