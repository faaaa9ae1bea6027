//! # Connections API Handlers
//!
//! CRUD over the caller's saved LinkedIn profiles. Every call is scoped to
//! the authenticated user; someone else's connection answers 404 exactly
//! like a missing one.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use metrics::counter;
use rolodink_extension::profile::{normalize_profile_url, sanitize};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::connection::ConnectionInfo;
use crate::repositories::connection::{ConnectionChanges, NewConnection};
use crate::repositories::{ConnectionRepository, UserRepository};
use crate::server::AppState;
use crate::telemetry::{
    METRIC_CONNECTIONS_CREATED, METRIC_CONNECTIONS_DELETED, METRIC_CONNECTIONS_UPDATED,
};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CONTEXT_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 5000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConnectionQuery {
    /// Profile URL; normalized before lookup. Omit to list everything.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub meeting_place: Option<String>,
    pub user_company_at_the_time: Option<String>,
    pub notes: Option<String>,
}

/// Absent fields are left alone; empty strings clear optional fields.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConnectionRequest {
    /// Connection id. Anything that is not a UUID is treated as missing.
    pub id: String,
    pub name: Option<String>,
    pub meeting_place: Option<String>,
    pub user_company_at_the_time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteConnectionResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NameChangeInfo {
    pub id: Uuid,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanNamesResponse {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub changes: Vec<NameChangeInfo>,
}

/// Looks up the caller's connection for a profile URL, or lists them all
#[utoipa::path(
    get,
    path = "/api/connections",
    security(("bearer_auth" = [])),
    params(ConnectionQuery),
    responses(
        (status = 200, description = "The matching connection, or every connection newest first when no url is given", body = ConnectionInfo),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "No connection for this url", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn get_connections(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ConnectionQuery>,
) -> Result<Response, ApiError> {
    let repo = ConnectionRepository::new(state.db.clone());

    match query.url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            let url = normalize_profile_url(url);
            let connection = repo
                .find_owned_by_url(user.id, &url)
                .await?
                .ok_or_else(|| not_found("Connection"))?;
            Ok(Json(ConnectionInfo::from(connection)).into_response())
        }
        None => {
            let connections: Vec<ConnectionInfo> = repo
                .list_owned(user.id)
                .await?
                .into_iter()
                .map(ConnectionInfo::from)
                .collect();
            Ok(Json(connections).into_response())
        }
    }
}

/// Saves a LinkedIn profile for the caller
#[utoipa::path(
    post,
    path = "/api/connections",
    security(("bearer_auth" = [])),
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Profile already saved", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateConnectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConnectionInfo>), ApiError> {
    let Json(body) = payload?;
    let new = validate_create(user.id, body)?;

    UserRepository::new(state.db.clone())
        .ensure(user.id, &user.email_or_placeholder())
        .await?;
    let created = ConnectionRepository::new(state.db.clone())
        .create(new)
        .await?;

    counter!(METRIC_CONNECTIONS_CREATED).increment(1);
    tracing::info!(user_id = %user.id, connection_id = %created.id, "connection created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Updates fields of one of the caller's connections
#[utoipa::path(
    patch,
    path = "/api/connections",
    security(("bearer_auth" = [])),
    request_body = UpdateConnectionRequest,
    responses(
        (status = 200, description = "Connection updated", body = ConnectionInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn update_connection(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateConnectionRequest>, JsonRejection>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let Json(body) = payload?;
    let id = parse_connection_id(&body.id)?;
    let changes = validate_update(body)?;

    let repo = ConnectionRepository::new(state.db.clone());
    let updated = if changes.is_empty() {
        repo.find_owned(user.id, id)
            .await?
            .ok_or_else(|| not_found("Connection"))?
    } else {
        repo.update_owned(user.id, id, changes).await?
    };

    counter!(METRIC_CONNECTIONS_UPDATED).increment(1);
    Ok(Json(updated.into()))
}

/// Deletes one of the caller's connections
#[utoipa::path(
    delete,
    path = "/api/connections/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Connection deleted", body = DeleteConnectionResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteConnectionResponse>, ApiError> {
    let id = parse_connection_id(&id)?;

    ConnectionRepository::new(state.db.clone())
        .delete_owned(user.id, id)
        .await?;

    counter!(METRIC_CONNECTIONS_DELETED).increment(1);
    tracing::info!(user_id = %user.id, connection_id = %id, "connection deleted");
    Ok(Json(DeleteConnectionResponse { success: true }))
}

/// Re-sanitizes every stored name of the caller
#[utoipa::path(
    post,
    path = "/api/connections/clean-names",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Names cleaned", body = CleanNamesResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn clean_names(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CleanNamesResponse>, ApiError> {
    let report = ConnectionRepository::new(state.db.clone())
        .clean_names(user.id)
        .await?;

    let updated = report.changes.len();
    tracing::info!(user_id = %user.id, total = report.total, updated, "cleaned connection names");

    Ok(Json(CleanNamesResponse {
        total: report.total,
        updated,
        unchanged: report.total - updated,
        changes: report
            .changes
            .into_iter()
            .map(|change| NameChangeInfo {
                id: change.id,
                before: change.before,
                after: change.after,
            })
            .collect(),
    }))
}

/// Only `linkedin.com` (or a subdomain) profile pages under `/in/`.
pub fn is_linkedin_profile_url(raw: &str) -> bool {
    let Ok(url) = url::Url::parse(raw) else {
        return false;
    };
    let host_ok = url
        .host_str()
        .is_some_and(|host| host == "linkedin.com" || host.ends_with(".linkedin.com"));

    matches!(url.scheme(), "http" | "https")
        && host_ok
        && url
            .path()
            .strip_prefix("/in/")
            .is_some_and(|slug| !slug.trim_matches('/').is_empty())
}

fn validate_create(owner_id: Uuid, body: CreateConnectionRequest) -> Result<NewConnection, ApiError> {
    let mut errors = Map::new();

    let name = body.name.as_deref().map(sanitize).unwrap_or_default();
    if name.is_empty() {
        errors.insert("name".into(), json!("Name is required"));
    } else {
        check_len(&mut errors, "name", &name, MAX_NAME_LEN);
    }

    let url = body
        .url
        .as_deref()
        .map(normalize_profile_url)
        .unwrap_or_default();
    if url.is_empty() {
        errors.insert("url".into(), json!("URL is required"));
    } else if !is_linkedin_profile_url(&url) {
        errors.insert("url".into(), json!("URL must be a LinkedIn profile"));
    }

    let meeting_place = non_empty(body.meeting_place);
    let company = non_empty(body.user_company_at_the_time);
    let notes = non_empty(body.notes);
    check_optional(&mut errors, "meetingPlace", &meeting_place, MAX_CONTEXT_LEN);
    check_optional(&mut errors, "userCompanyAtTheTime", &company, MAX_CONTEXT_LEN);
    check_optional(&mut errors, "notes", &notes, MAX_NOTES_LEN);

    if !errors.is_empty() {
        return Err(validation_error("Validation failed", Value::Object(errors)));
    }

    Ok(NewConnection {
        owner_id,
        name,
        linkedin_url: url,
        meeting_place,
        user_company_at_the_time: company,
        notes,
    })
}

fn validate_update(body: UpdateConnectionRequest) -> Result<ConnectionChanges, ApiError> {
    let mut errors = Map::new();

    let name = body.name.as_deref().map(sanitize);
    match &name {
        Some(name) if name.is_empty() => {
            errors.insert("name".into(), json!("Name cannot be empty"));
        }
        Some(name) => check_len(&mut errors, "name", name, MAX_NAME_LEN),
        None => {}
    }

    let meeting_place = body.meeting_place.map(|value| non_empty(Some(value)));
    let company = body.user_company_at_the_time.map(|value| non_empty(Some(value)));
    let notes = body.notes.map(|value| non_empty(Some(value)));
    check_optional(&mut errors, "meetingPlace", &meeting_place.clone().flatten(), MAX_CONTEXT_LEN);
    check_optional(&mut errors, "userCompanyAtTheTime", &company.clone().flatten(), MAX_CONTEXT_LEN);
    check_optional(&mut errors, "notes", &notes.clone().flatten(), MAX_NOTES_LEN);

    if !errors.is_empty() {
        return Err(validation_error("Validation failed", Value::Object(errors)));
    }

    Ok(ConnectionChanges {
        name,
        meeting_place,
        user_company_at_the_time: company,
        notes,
    })
}

/// A malformed id cannot name an owned row.
fn parse_connection_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| not_found("Connection"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_len(errors: &mut Map<String, Value>, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.insert(
            field.to_string(),
            json!(format!("Must be at most {max} characters")),
        );
    }
}

fn check_optional(errors: &mut Map<String, Value>, field: &str, value: &Option<String>, max: usize) {
    if let Some(value) = value {
        check_len(errors, field, value, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str, url: &str) -> CreateConnectionRequest {
        CreateConnectionRequest {
            name: Some(name.to_string()),
            url: Some(url.to_string()),
            meeting_place: None,
            user_company_at_the_time: None,
            notes: None,
        }
    }

    #[test]
    fn recognises_profile_urls() {
        assert!(is_linkedin_profile_url("https://www.linkedin.com/in/jane-doe"));
        assert!(is_linkedin_profile_url("https://linkedin.com/in/jane-doe/"));
        assert!(!is_linkedin_profile_url("https://www.linkedin.com/company/acme"));
        assert!(!is_linkedin_profile_url("https://www.linkedin.com/in/"));
        assert!(!is_linkedin_profile_url("https://evil-linkedin.com/in/jane"));
        assert!(!is_linkedin_profile_url("ftp://linkedin.com/in/jane"));
        assert!(!is_linkedin_profile_url("not a url"));
    }

    #[test]
    fn create_sanitizes_and_normalizes() {
        let owner = Uuid::new_v4();
        let new = validate_create(
            owner,
            create("(3) Jane Doe", "https://www.linkedin.com/in/jane-doe/?trk=feed#top"),
        )
        .unwrap();

        assert_eq!(new.owner_id, owner);
        assert_eq!(new.name, "Jane Doe");
        assert_eq!(new.linkedin_url, "https://www.linkedin.com/in/jane-doe");
    }

    #[test]
    fn create_reports_every_invalid_field() {
        let mut body = create("   ", "https://example.com/jane");
        body.notes = Some("x".repeat(MAX_NOTES_LEN + 1));

        let err = validate_create(Uuid::new_v4(), body).unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let details = err.details.unwrap();
        assert!(details.get("name").is_some());
        assert!(details.get("url").is_some());
        assert!(details.get("notes").is_some());
    }

    #[test]
    fn update_clears_blank_optional_fields() {
        let changes = validate_update(UpdateConnectionRequest {
            id: Uuid::new_v4().to_string(),
            name: None,
            meeting_place: Some("".to_string()),
            user_company_at_the_time: Some(" Acme ".to_string()),
            notes: None,
        })
        .unwrap();

        assert_eq!(changes.name, None);
        assert_eq!(changes.meeting_place, Some(None));
        assert_eq!(changes.user_company_at_the_time, Some(Some("Acme".to_string())));
        assert_eq!(changes.notes, None);
    }

    #[test]
    fn update_rejects_a_name_that_sanitizes_away() {
        let err = validate_update(UpdateConnectionRequest {
            id: Uuid::new_v4().to_string(),
            name: Some("(12)".to_string()),
            meeting_place: None,
            user_company_at_the_time: None,
            notes: None,
        })
        .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
