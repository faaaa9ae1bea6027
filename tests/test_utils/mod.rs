//! Test utilities for database and API testing.
//!
//! In-memory SQLite with migrations applied, a token-table auth provider and
//! helpers for driving the router with `oneshot`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use rolodink::config::AppConfig;
use rolodink::server::{AppState, create_app};
use rolodink::supabase::{AuthProvider, AuthProviderError, ProviderUser, Session, SignUpOutcome};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn execute(db: &DatabaseConnection, sql: &str) -> Result<()> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        sql.to_string(),
    ))
    .await?;
    Ok(())
}

pub async fn count_rows(db: &DatabaseConnection, table: &str) -> Result<i64> {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no row"))?;
    Ok(row.try_get("", "n")?)
}

/// Auth provider backed by a fixed `token -> user` table.
#[derive(Default)]
pub struct FakeAuthProvider {
    pub users: Mutex<HashMap<String, ProviderUser>>,
    pub deleted: Mutex<Vec<Uuid>>,
    pub fail_deletes: bool,
}

impl FakeAuthProvider {
    pub fn with_user(self, token: &str, id: Uuid, email: &str) -> Self {
        self.users.lock().unwrap().insert(
            token.to_string(),
            ProviderUser {
                id,
                email: Some(email.to_string()),
            },
        );
        self
    }

    pub fn with_user_without_email(self, token: &str, id: Uuid) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(token.to_string(), ProviderUser { id, email: None });
        self
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn get_user(&self, token: &str) -> Result<Option<ProviderUser>, AuthProviderError> {
        Ok(self.users.lock().unwrap().get(token).cloned())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthProviderError> {
        let users = self.users.lock().unwrap();
        let found = users
            .iter()
            .find(|(_, user)| user.email.as_deref() == Some(email));
        match found {
            Some((token, user)) if password == "correct horse" => Ok(Session {
                access_token: token.clone(),
                refresh_token: Some(format!("refresh-{token}")),
                expires_in: Some(3600),
                token_type: Some("bearer".to_string()),
                user: user.clone(),
            }),
            _ => Err(AuthProviderError::InvalidCredentials(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, AuthProviderError> {
        Ok(SignUpOutcome::ConfirmationRequired(ProviderUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        }))
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthProviderError> {
        if self.fail_deletes {
            return Err(AuthProviderError::Unexpected { status: 500 });
        }
        self.deleted.lock().unwrap().push(user_id);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<FakeAuthProvider>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn new(auth: FakeAuthProvider) -> Result<Self> {
        Self::with_config(AppConfig::default(), auth).await
    }

    pub async fn with_config(config: AppConfig, auth: FakeAuthProvider) -> Result<Self> {
        let db = setup_test_db().await?;
        let auth = Arc::new(auth);
        let state = AppState::new(config, db, auth.clone());
        let db = state.db.clone();
        Ok(Self {
            router: create_app(state),
            db,
            auth,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }
}
