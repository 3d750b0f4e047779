//! Router configuration and route composition.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use duva_core::AppError;

use crate::auth::require_api_key;
use crate::config::ServerConfig;
use crate::handlers::{accounts, configurations, files, health};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// # Errors
///
/// Returns `AppError::ConfigError` when the rate limit settings are zero.
pub fn create_router(state: AppState, config: &ServerConfig) -> Result<Router, AppError> {
    let public_routes = Router::new().route("/health", get(health::health_check));

    let protected_routes = Router::new()
        .route("/servers", post(accounts::create_server))
        .route("/servers/:id", get(accounts::get_server))
        .route("/users", post(accounts::create_user))
        .route(
            "/users/:user_id/configurations",
            get(configurations::list_configurations).post(configurations::create_configuration),
        )
        .route(
            "/configurations/:id",
            get(configurations::get_configuration)
                .patch(configurations::update_configuration)
                .delete(configurations::delete_configuration),
        )
        .route(
            "/users/:user_id/files",
            get(files::list_files).post(files::create_file),
        )
        .route(
            "/files/:id",
            get(files::get_file)
                .patch(files::update_file)
                .delete(files::delete_file),
        )
        .route("/files/:id/sync", post(files::sync_file))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let api_routes = public_routes.merge(protected_routes);

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_rps.into())
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| {
                AppError::ConfigError("rate limit and burst must be positive".to_string())
            })?,
    );

    let cors_layer = build_cors_layer(&config.cors_origins);

    Ok(Router::new()
        .nest("/api/v1", api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware layers (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(GovernorLayer {
            config: governor_config,
        })
        .with_state(state))
}

/// `"*"` allows any origin, otherwise a comma separated allow list.
fn build_cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .max_age(Duration::from_secs(3600));

    if origins == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(allowed)
    }
}
