//! Upstream server and user registration.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::dto::{CreateServerRequest, CreateUserRequest, ServerResponse, UserResponse};
use crate::error::ApiError;
use crate::state::AppState;

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Register an upstream server and its OAuth client credentials.
#[utoipa::path(
    post,
    path = "/api/v1/servers",
    request_body = CreateServerRequest,
    responses(
        (status = 201, description = "Server registered", body = ServerResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Server already registered"),
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
pub async fn create_server(
    State(state): State<AppState>,
    Json(request): Json<CreateServerRequest>,
) -> Result<(StatusCode, Json<ServerResponse>), ApiError> {
    require(&request.client_id, "client_id")?;
    require(&request.client_secret, "client_secret")?;
    let scheme_ok = request.url.starts_with("https://") || request.url.starts_with("http://");
    if !scheme_ok {
        return Err(ApiError::BadRequest(format!(
            "Invalid URL: {}",
            request.url
        )));
    }

    let secret = state.cipher.encrypt(&request.client_secret)?;
    let server = state
        .accounts
        .create_server(&request.url, &request.client_id, &secret)
        .await?;
    info!(server_id = server.id, url = %server.url, "Server registered");

    Ok((StatusCode::CREATED, Json(server.into())))
}

/// Fetch a registered server.
#[utoipa::path(
    get,
    path = "/api/v1/servers/{id}",
    params(("id" = i64, Path, description = "Server ID")),
    responses(
        (status = 200, description = "Server", body = ServerResponse),
        (status = 404, description = "Server not found"),
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ServerResponse>, ApiError> {
    let server = state
        .accounts
        .get_server(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Server not found: {}", id)))?;

    Ok(Json(server.into()))
}

/// Create a user, or replace the stored tokens of an existing one.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User stored", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Server not found"),
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    require(&request.username, "username")?;
    require(&request.refresh_token, "refresh_token")?;

    let refresh = state.cipher.encrypt(&request.refresh_token)?;
    let access = request
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| state.cipher.encrypt(t))
        .transpose()?;

    let user = state
        .accounts
        .upsert_user(request.server_id, &request.username, &refresh, access.as_ref())
        .await?;
    info!(user_id = user.id, server_id = user.server_id, "User credentials stored");

    Ok((StatusCode::CREATED, Json(user.into())))
}
