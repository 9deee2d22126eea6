mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::oauth::{
    authorize_callback_handler, authorize_handler, consent_check_handler, consent_revoke_handler,
    jwks_handler, openid_configuration_handler, revoke_handler, token_handler, userinfo_handler,
};
use crate::middleware::bearer_auth_middleware;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION") })
}

async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse { status: "ready", version: env!("CARGO_PKG_VERSION") }))
}

/// Builds the router for the authorization server core:
///
/// - `GET /oauth/authorize`, `POST /oauth/authorize/callback` — authorization code front door,
///   delegating consent UI to a collaborator.
/// - `POST /oauth/token` — authorization_code / refresh_token / client_credentials grants.
/// - `POST /oauth/revoke` — RFC 7009 revocation.
/// - `GET /oauth/userinfo` — bearer-protected, gated on the token's granted scopes.
/// - `GET /.well-known/jwks.json`, `GET /.well-known/openid-configuration` — key and discovery
///   documents a resource server or client needs to talk to this core.
pub fn create_router(state: AppState) -> Router {
    let oauth_public_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/authorize/callback", axum::routing::post(authorize_callback_handler))
        .route("/token", axum::routing::post(token_handler))
        .route("/revoke", axum::routing::post(revoke_handler))
        .route("/consent/check", get(consent_check_handler))
        .route("/consent/revoke", axum::routing::post(consent_revoke_handler));

    let oauth_protected_routes = Router::new()
        .route("/userinfo", get(userinfo_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), bearer_auth_middleware));

    let wellknown_routes = Router::new()
        .route("/jwks.json", get(jwks_handler))
        .route("/openid-configuration", get(openid_configuration_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .nest("/oauth", oauth_public_routes)
        .nest("/oauth", oauth_protected_routes)
        .nest("/.well-known", wellknown_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    let addr = config.socket_addr();
    let state = AppState::new(pool, config)?;
    let app = create_router(state);

    tracing::info!("auth server v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown...");
        },
    }
}
