//! Origin whitelist for the browser extension.
//!
//! Only the configured extension ids pass, plus localhost in development
//! profiles. Rejected origins get no `Access-Control-Allow-Origin`.

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;
use crate::telemetry::TRACE_ID_HEADER;

const EXTENSION_SCHEMES: [&str; 2] = ["chrome-extension://", "moz-extension://"];
const LOCAL_HOSTS: [&str; 2] = ["http://localhost", "http://127.0.0.1"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    extension_ids: Vec<String>,
    allow_localhost: bool,
}

impl OriginPolicy {
    pub fn new(extension_ids: Vec<String>, allow_localhost: bool) -> Self {
        Self {
            extension_ids,
            allow_localhost,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.allowed_extension_ids.clone(), config.is_development())
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let extension_id = EXTENSION_SCHEMES
            .iter()
            .find_map(|scheme| origin.strip_prefix(scheme));
        if let Some(id) = extension_id {
            return self.extension_ids.iter().any(|allowed| allowed == id);
        }

        self.allow_localhost && is_local_origin(origin)
    }
}

/// `http://localhost` or `http://127.0.0.1`, optionally with a numeric port.
fn is_local_origin(origin: &str) -> bool {
    LOCAL_HOSTS.iter().any(|host| match origin.strip_prefix(host) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    })
}

pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let policy = OriginPolicy::from_config(config);
    tracing::info!(
        extension_ids = ?config.allowed_extension_ids,
        allow_localhost = config.is_development(),
        "CORS origin policy"
    );

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| {
                origin
                    .to_str()
                    .is_ok_and(|origin| policy.is_allowed(origin))
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([
            RETRY_AFTER,
            TRACE_ID_HEADER,
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
        ])
        .allow_credentials(true)
}
