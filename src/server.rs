//! # Server Configuration
//!
//! Router assembly, shared state and the serve loop for the Rolodink API.
//!
//! Layering, outermost first: CORS, trace id, then per route group the rate
//! limiter and (for user data) authentication.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::cors::cors_layer;
use crate::handlers;
use crate::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::supabase::AuthProvider;
use crate::telemetry::trace_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<dyn AuthProvider>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State with a fresh in-memory rate limiter sized from `config`.
    pub fn new(config: AppConfig, db: DatabaseConnection, auth: Arc<dyn AuthProvider>) -> Self {
        let rate_limiter = RateLimiter::in_memory(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_seconds),
        );
        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            auth,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/connections",
            get(handlers::connections::get_connections)
                .post(handlers::connections::create_connection)
                .patch(handlers::connections::update_connection),
        )
        .route(
            "/api/connections/clean-names",
            post(handlers::connections::clean_names),
        )
        .route(
            "/api/connections/{id}",
            delete(handlers::connections::delete_connection),
        )
        .route("/api/user/export", get(handlers::user::export_account))
        .route("/api/user/delete", delete(handlers::user::delete_account))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/api/auth/signin", post(handlers::auth::sign_in))
        .route("/api/auth/signup", post(handlers::auth::sign_up))
        .route("/api/version", get(handlers::version::check_version))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_middleware))
        .layer(cors)
}

/// Serves until Ctrl+C or SIGTERM, then stops background tasks.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    auth: Arc<dyn AuthProvider>,
) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let profile = config.profile.clone();
    let state = AppState::new(config, db, auth);

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        state
            .rate_limiter
            .as_ref()
            .clone()
            .run_sweeper(shutdown.clone()),
    );

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        tracing::warn!(error = %err, "rate limit sweeper did not stop cleanly");
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::auth::sign_in,
        crate::handlers::auth::sign_up,
        crate::handlers::connections::get_connections,
        crate::handlers::connections::create_connection,
        crate::handlers::connections::update_connection,
        crate::handlers::connections::delete_connection,
        crate::handlers::connections::clean_names,
        crate::handlers::user::export_account,
        crate::handlers::user::delete_account,
        crate::handlers::version::check_version,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::auth::CredentialsRequest,
            crate::handlers::auth::SignInResponse,
            crate::handlers::auth::SignUpResponse,
            crate::supabase::Session,
            crate::supabase::ProviderUser,
            crate::models::connection::ConnectionInfo,
            crate::handlers::connections::CreateConnectionRequest,
            crate::handlers::connections::UpdateConnectionRequest,
            crate::handlers::connections::DeleteConnectionResponse,
            crate::handlers::connections::CleanNamesResponse,
            crate::handlers::connections::NameChangeInfo,
            crate::handlers::user::AccountExport,
            crate::handlers::user::ExportedUser,
            crate::handlers::user::DeleteAccountResponse,
            crate::handlers::version::VersionResponse,
        )
    ),
    modifiers(&BearerAuth),
    info(
        title = "Rolodink API",
        description = "Notes on the LinkedIn people you meet",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/",
            "/health",
            "/api/auth/signin",
            "/api/auth/signup",
            "/api/connections",
            "/api/connections/{id}",
            "/api/connections/clean-names",
            "/api/user/export",
            "/api/user/delete",
            "/api/version",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
        assert!(
            doc.components
                .unwrap()
                .security_schemes
                .contains_key("bearer_auth")
        );
    }
}
