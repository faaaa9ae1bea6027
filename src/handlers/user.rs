//! # Account Handlers
//!
//! Data export and account erasure for the signed-in user.

use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthUser, is_placeholder_email};
use crate::error::{ApiError, internal_error};
use crate::models::connection::ConnectionInfo;
use crate::repositories::{ConnectionRepository, UserRepository};
use crate::server::AppState;
use crate::telemetry::METRIC_ACCOUNTS_DELETED;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportedUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountExport {
    #[schema(value_type = String, format = DateTime)]
    pub exported_at: DateTime<Utc>,
    pub user: ExportedUser,
    /// Connections the account holds, including any left out by the cap.
    pub connection_count: u64,
    pub truncated: bool,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub deleted_connections: u64,
}

pub fn export_filename(exported_at: DateTime<Utc>) -> String {
    format!("rolodink-export-{}.json", exported_at.format("%Y-%m-%d"))
}

/// Downloads everything stored for the caller as a JSON attachment
#[utoipa::path(
    get,
    path = "/api/user/export",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account export", body = AccountExport),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "account"
)]
pub async fn export_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let connections = ConnectionRepository::new(state.db.clone());
    let stored_user = UserRepository::new(state.db.clone()).find(user.id).await?;

    let connection_count = connections.count_owned(user.id).await?;
    let (rows, truncated) = connections
        .export_owned(user.id, state.config.export_max_connections)
        .await?;
    if truncated {
        tracing::warn!(
            user_id = %user.id,
            connection_count,
            limit = state.config.export_max_connections,
            "export truncated"
        );
    }

    let exported_at = Utc::now();
    let export = AccountExport {
        exported_at,
        user: ExportedUser {
            id: user.id,
            email: user.email.clone().or_else(|| {
                stored_user
                    .as_ref()
                    .map(|row| row.email.clone())
                    .filter(|email| !is_placeholder_email(email))
            }),
            created_at: stored_user.map(|row| row.created_at.with_timezone(&Utc)),
        },
        connection_count,
        truncated,
        connections: rows.into_iter().map(ConnectionInfo::from).collect(),
    };

    let disposition = format!("attachment; filename=\"{}\"", export_filename(exported_at));
    let mut response = Json(export).into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Erases the caller's connections and account
#[utoipa::path(
    delete,
    path = "/api/user/delete",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account deleted", body = DeleteAccountResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError),
        (status = 500, description = "Deletion failed and was rolled back", body = ApiError)
    ),
    tag = "account"
)]
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DeleteAccountResponse>, ApiError> {
    let users = UserRepository::new(state.db.clone());

    // Users who never saved anything have no local row yet.
    users
        .ensure(user.id, &user.email_or_placeholder())
        .await
        .map_err(|err| {
            tracing::error!(user_id = %user.id, error = %err, "account deletion failed");
            internal_error()
        })?;

    let deleted_connections = users.delete_account(user.id).await.map_err(|err| {
        tracing::error!(user_id = %user.id, error = %err, "account deletion rolled back");
        internal_error()
    })?;

    if let Err(err) = state.auth.delete_user(user.id).await {
        tracing::error!(
            user_id = %user.id,
            error = %err,
            "auth identity removal failed after account deletion"
        );
    }

    counter!(METRIC_ACCOUNTS_DELETED).increment(1);
    tracing::info!(user_id = %user.id, deleted_connections, "account deleted");
    Ok(Json(DeleteAccountResponse {
        success: true,
        deleted_connections,
    }))
}
