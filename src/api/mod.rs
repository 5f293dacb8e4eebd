use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::services::{AccountService, ForumService, Mailer};
use crate::state::SharedState;

pub mod auth;
mod error;
mod forums;
mod observability;
mod system;
mod types;
mod users;
mod validation;

pub use auth::RequestContext;
pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn account_service(&self) -> &Arc<dyn AccountService> {
        &self.shared.account_service
    }

    #[must_use]
    pub fn forum_service(&self) -> &Arc<dyn ForumService> {
        &self.shared.forum_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Same as [`create_app_state_from_config`] with an explicit mail transport.
pub async fn create_app_state_with_mailer(
    config: Config,
    mailer: Arc<dyn Mailer>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_mailer(config, mailer).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, secure_cookies, inactivity_minutes) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_inactivity_minutes,
        )
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            inactivity_minutes,
        )));

    // Guards run context -> login -> admin.
    let api_router = Router::new()
        .merge(create_admin_router())
        .merge(create_member_router())
        .merge(create_public_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::context_middleware,
        ))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
}

fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(users::register))
        .route("/users", get(users::latest))
        .route("/users/activate", get(users::activate_from_query))
        .route("/users/activate/{code}", get(users::activate))
        .route(
            "/users/activate_new_email/{code}",
            get(users::confirm_email),
        )
        .route("/users/forgot_password", post(users::forgot_password))
        .route(
            "/users/reset_password/{code}",
            get(users::check_reset_code).post(users::reset_password),
        )
        .route("/users/{permalink}", get(users::show))
        .route("/session", post(auth::login))
        .route("/session", delete(auth::logout))
        .route("/forums", get(forums::list))
        .route("/forums/{forum}/moderators", get(forums::moderators))
        .route("/system/health/live", get(system::health_live))
        .route("/system/health/ready", get(system::health_ready))
}

fn create_member_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(users::hub))
        .route(
            "/users/{permalink}/change_password",
            put(users::change_password),
        )
        .route("/users/{permalink}/change_email", put(users::change_email))
        .route("/forums/{forum}/moderation", get(forums::moderation))
        .route_layer(middleware::from_fn(auth::require_login))
}

fn create_admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{permalink}/suspend", put(users::suspend))
        .route("/users/{permalink}/unsuspend", put(users::unsuspend))
        .route("/users/{permalink}", delete(users::soft_delete))
        .route("/users/{permalink}/purge", delete(users::purge))
        .route("/forums", post(forums::create))
        .route(
            "/forums/{forum}/moderators/{permalink}",
            put(forums::grant_moderator).delete(forums::revoke_moderator),
        )
        .route("/system/audit", get(system::get_audit))
        .route("/metrics", get(observability::get_metrics))
        // Added last, so it runs first.
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn(auth::require_login))
}
