//! Extension-local key/value storage.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "supabaseAccessToken";
pub const REFRESH_TOKEN_KEY: &str = "supabaseRefreshToken";
pub const CACHED_CONNECTIONS_KEY: &str = "cachedConnections";
pub const API_BASE_URL_KEY: &str = "apiBaseUrl";
pub const CONTEXT_FIELD_ENABLED_KEY: &str = "contextFieldEnabled";
pub const DISMISSED_VERSION_KEY: &str = "dismissedVersion";

pub const DEFAULT_API_BASE_URL: &str = "https://rolodink.app";

/// Error reported by the browser storage area. The message is kept verbatim
/// because the only reliable signal of a reloaded extension is its text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {message}")]
pub struct StorageError {
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the extension was reloaded underneath a still-open tab.
    pub fn is_context_invalidated(&self) -> bool {
        self.message.to_ascii_lowercase().contains("invalidated")
    }
}

#[async_trait(?Send)]
pub trait ExtensionStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .get(key)
            .await?
            .and_then(|value| value.as_str().map(str::to_owned))
            .filter(|value| !value.is_empty()))
    }
}

/// Which extension API namespace the page exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserTarget {
    /// `chrome.storage.local`. Returns promises under Manifest V3 only.
    Chrome,
    /// `browser.storage.local`.
    Firefox,
}

impl BrowserTarget {
    /// Firefox also defines a `chrome` alias, so `browser` wins when both exist.
    pub fn detect(has_browser_global: bool, has_chrome_global: bool) -> Option<Self> {
        match (has_browser_global, has_chrome_global) {
            (true, _) => Some(BrowserTarget::Firefox),
            (false, true) => Some(BrowserTarget::Chrome),
            (false, false) => None,
        }
    }

    pub fn global_name(self) -> &'static str {
        match self {
            BrowserTarget::Chrome => "chrome",
            BrowserTarget::Firefox => "browser",
        }
    }
}

/// User-tunable settings persisted by the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub context_field_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            context_field_enabled: true,
        }
    }
}

impl Settings {
    pub async fn load<S: ExtensionStorage + ?Sized>(storage: &S) -> Result<Self, StorageError> {
        let defaults = Settings::default();
        let api_base_url = storage
            .get_string(API_BASE_URL_KEY)
            .await?
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        let context_field_enabled = storage
            .get(CONTEXT_FIELD_ENABLED_KEY)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(defaults.context_field_enabled);

        Ok(Self {
            api_base_url,
            context_field_enabled,
        })
    }
}

/// In-process storage. Used when no extension namespace is available and by
/// the tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<String, Value>>,
    failure: RefCell<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.borrow_mut() = Some(message.into());
    }

    fn check(&self) -> Result<(), StorageError> {
        match self.failure.borrow().as_ref() {
            Some(message) => Err(StorageError::new(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait(?Send)]
impl ExtensionStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check()?;
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check()?;
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}
