//! Extension update check.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::AppConfig;
use crate::error::{ApiError, internal_error, validation_error};
use crate::version::ExtensionVersion;

#[derive(Debug, Deserialize, IntoParams)]
pub struct VersionQuery {
    /// Version the extension is running, `major.minor.patch`.
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub current_version: String,
    pub latest_version: String,
    pub minimum_version: String,
    pub update_available: bool,
    pub update_required: bool,
    pub download_url: String,
    pub release_notes: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/version",
    params(VersionQuery),
    responses(
        (status = 200, description = "Update status for the given version", body = VersionResponse),
        (status = 400, description = "Missing or malformed version", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "version"
)]
pub async fn check_version(
    State(config): State<Arc<AppConfig>>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<VersionResponse>, ApiError> {
    let raw = query.version.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(validation_error(
            "Version parameter is required",
            serde_json::json!({ "version": "Version is required" }),
        ));
    }
    let current: ExtensionVersion = raw.parse().map_err(|_| {
        validation_error(
            "Invalid version format",
            serde_json::json!({ "version": "Expected major.minor.patch" }),
        )
    })?;

    Ok(Json(version_status(&config, current)?))
}

/// Compares `current` against the configured release versions.
pub fn version_status(
    config: &AppConfig,
    current: ExtensionVersion,
) -> Result<VersionResponse, ApiError> {
    // Both are checked when the configuration loads.
    let parse = |raw: &str| {
        raw.parse::<ExtensionVersion>().map_err(|err| {
            tracing::error!(error = %err, "configured extension version is invalid");
            internal_error()
        })
    };
    let latest = parse(&config.latest_extension_version)?;
    let minimum = parse(&config.minimum_extension_version)?;

    Ok(VersionResponse {
        current_version: current.to_string(),
        latest_version: latest.to_string(),
        minimum_version: minimum.to_string(),
        update_available: current < latest,
        update_required: current < minimum,
        download_url: config.extension_download_url.clone(),
        release_notes: config.extension_release_notes.clone(),
    })
}
