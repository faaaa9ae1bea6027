//! HTTP client for the Rolodink API, as used by the content script and popup.

use std::rc::Rc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::storage::{
    ACCESS_TOKEN_KEY, CACHED_CONNECTIONS_KEY, DISMISSED_VERSION_KEY, ExtensionStorage,
    REFRESH_TOKEN_KEY, Settings, StorageError,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("not signed in")]
    NotSignedIn,
    #[error("session expired")]
    Unauthorized,
    #[error("server responded {status}")]
    Status { status: u16, message: Option<String> },
}

impl ClientError {
    pub fn is_context_invalidated(&self) -> bool {
        match self {
            ClientError::Storage(err) => err.is_context_invalidated(),
            other => other.to_string().to_ascii_lowercase().contains("invalidated"),
        }
    }

    /// Message sent by the server, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub linked_in_url: String,
    #[serde(default)]
    pub meeting_place: Option<String>,
    #[serde(default)]
    pub user_company_at_the_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_company_at_the_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewConnection {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            meeting_place: None,
            user_company_at_the_time: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Connection),
    /// The server already holds this profile for the user (HTTP 409).
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub current_version: String,
    pub latest_version: String,
    pub minimum_version: String,
    pub update_available: bool,
    pub update_required: bool,
    pub download_url: String,
    #[serde(default)]
    pub release_notes: Option<String>,
}

pub struct ApiClient<S> {
    http: reqwest::Client,
    base_url: String,
    storage: Rc<S>,
}

impl<S: ExtensionStorage> ApiClient<S> {
    pub fn new(base_url: impl Into<String>, storage: Rc<S>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
        }
    }

    /// Builds a client against the base URL configured in the popup.
    pub async fn from_settings(storage: Rc<S>) -> Result<Self, ClientError> {
        let settings = Settings::load(storage.as_ref()).await?;
        Ok(Self::new(settings.api_base_url, storage))
    }

    pub async fn settings(&self) -> Result<Settings, StorageError> {
        Settings::load(self.storage.as_ref()).await
    }

    pub async fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_string(ACCESS_TOKEN_KEY).await
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Looks up the caller's note for an already normalized profile URL.
    pub async fn find_by_url(&self, token: &str, url: &str) -> Result<Option<Connection>, ClientError> {
        let response = self
            .request(Method::GET, "/api/connections", Some(token))
            .query(&[("url", url)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(error_from_response(response).await),
        }
    }

    pub async fn create(&self, token: &str, connection: &NewConnection) -> Result<CreateOutcome, ClientError> {
        let response = self
            .request(Method::POST, "/api/connections", Some(token))
            .json(connection)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            status if status.is_success() => Ok(CreateOutcome::Created(response.json().await?)),
            _ => Err(error_from_response(response).await),
        }
    }

    pub async fn list(&self, token: &str) -> Result<Vec<Connection>, ClientError> {
        let response = self
            .request(Method::GET, "/api/connections", Some(token))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Replaces `cachedConnections` with the server's list.
    pub async fn refresh_cache(&self) -> Result<usize, ClientError> {
        let token = self.access_token().await?.ok_or(ClientError::NotSignedIn)?;
        let connections = self.list(&token).await?;
        let count = connections.len();
        self.storage
            .set(CACHED_CONNECTIONS_KEY, json!(connections))
            .await?;
        log::debug!("cached {count} connections");
        Ok(count)
    }

    /// Signs in and stores the issued tokens.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let response = self
            .request(Method::POST, "/api/auth/signin", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let SessionEnvelope { session } = response.json().await?;
        self.storage
            .set(ACCESS_TOKEN_KEY, json!(session.access_token))
            .await?;
        match &session.refresh_token {
            Some(refresh) => self.storage.set(REFRESH_TOKEN_KEY, json!(refresh)).await?,
            None => self.storage.remove(REFRESH_TOKEN_KEY).await?,
        }
        log::info!("signed in");
        Ok(session)
    }

    /// Forgets the session and every cached note.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, CACHED_CONNECTIONS_KEY] {
            self.storage.remove(key).await?;
        }
        log::info!("signed out");
        Ok(())
    }

    /// Returns version details when the user should be told about an update.
    ///
    /// A dismissed release stays quiet unless it is required.
    pub async fn check_version(&self, current: &str) -> Result<Option<VersionInfo>, ClientError> {
        let response = self
            .request(Method::GET, "/api/version", None)
            .query(&[("version", current)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let info: VersionInfo = response.json().await?;
        if info.update_required {
            return Ok(Some(info));
        }
        if !info.update_available {
            return Ok(None);
        }

        let dismissed = self.storage.get_string(DISMISSED_VERSION_KEY).await?;
        if dismissed.as_deref() == Some(info.latest_version.as_str()) {
            Ok(None)
        } else {
            Ok(Some(info))
        }
    }

    pub async fn dismiss_version(&self, version: &str) -> Result<(), ClientError> {
        self.storage
            .set(DISMISSED_VERSION_KEY, json!(version))
            .await?;
        Ok(())
    }
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return ClientError::Unauthorized;
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| {
            ["message", "error"]
                .iter()
                .find_map(|field| body.get(*field).and_then(Value::as_str).map(str::to_owned))
        });

    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}
