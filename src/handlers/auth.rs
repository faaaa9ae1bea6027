//! Sign-in and sign-up, forwarded to the auth provider.

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};
use crate::server::AppState;
use crate::supabase::{ProviderUser, Session, SignUpOutcome};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    pub session: Session,
}

/// `session` is null while the email still needs confirming.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignUpResponse {
    pub session: Option<Session>,
    pub user: ProviderUser,
}

#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, ApiError> {
    let Json(body) = payload?;
    let (email, password) = credentials(body)?;

    let session = state.auth.sign_in(&email, &password).await?;
    tracing::info!(user_id = %session.user.id, "user signed in");
    Ok(Json(SignInResponse { session }))
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Account created", body = SignUpResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SignUpResponse>, ApiError> {
    let Json(body) = payload?;
    let (email, password) = credentials(body)?;

    let response = match state.auth.sign_up(&email, &password).await? {
        SignUpOutcome::Session(session) => SignUpResponse {
            user: session.user.clone(),
            session: Some(session),
        },
        SignUpOutcome::ConfirmationRequired(user) => SignUpResponse {
            session: None,
            user,
        },
    };
    tracing::info!(
        user_id = %response.user.id,
        confirmed = response.session.is_some(),
        "user signed up"
    );
    Ok(Json(response))
}

fn credentials(body: CredentialsRequest) -> Result<(String, String), ApiError> {
    let email = body.email.map(|e| e.trim().to_string()).unwrap_or_default();
    let password = body.password.unwrap_or_default();

    let mut errors = Map::new();
    if email.is_empty() {
        errors.insert("email".into(), json!("Email is required"));
    } else if !email.contains('@') {
        errors.insert("email".into(), json!("Email is invalid"));
    }
    if password.is_empty() {
        errors.insert("password".into(), json!("Password is required"));
    }

    if errors.is_empty() {
        Ok((email, password))
    } else {
        Err(validation_error(
            "Email and password are required",
            Value::Object(errors),
        ))
    }
}
