//! BI publish configuration endpoints.
//!
//! Every create and update signs in to the BI server before anything is
//! stored, so a saved configuration has worked at least once.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use duva_core::{AccountStore, NewPublishTarget, PublishClient, PublishTarget, PublishTargetStore};

use crate::dto::{ConfigurationResponse, CreateConfigurationRequest, UpdateConfigurationRequest};
use crate::error::ApiError;
use crate::state::AppState;

async fn load_target(state: &AppState, id: i64) -> Result<PublishTarget, ApiError> {
    state
        .sync_service
        .targets()
        .get_target(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Configuration not found: {}", id)))
}

/// List a user's publish configurations.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/configurations",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Configurations", body = Vec<ConfigurationResponse>),
    ),
    security(("bearer" = [])),
    tag = "configurations"
)]
pub async fn list_configurations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ConfigurationResponse>>, ApiError> {
    let targets = state.sync_service.targets().list_targets(user_id).await?;
    Ok(Json(targets.into_iter().map(Into::into).collect()))
}

/// Validate and store a publish configuration.
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/configurations",
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = CreateConfigurationRequest,
    responses(
        (status = 201, description = "Configuration stored", body = ConfigurationResponse),
        (status = 400, description = "BI server rejected the configuration"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer" = [])),
    tag = "configurations"
)]
pub async fn create_configuration(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<CreateConfigurationRequest>,
) -> Result<(StatusCode, Json<ConfigurationResponse>), ApiError> {
    if state.accounts.get_account(user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User not found: {}", user_id)));
    }

    let new = NewPublishTarget {
        user_id,
        server_address: request.server_address,
        site_name: request.site_name,
        token_name: request.token_name,
        token_value: state.cipher.encrypt(&request.token_value)?,
        project_name: request.project_name,
        export_settings: request.export_settings.unwrap_or_default(),
    };

    let candidate = PublishTarget {
        id: 0,
        user_id,
        server_address: new.server_address.clone(),
        site_name: new.site_name.clone(),
        token_name: new.token_name.clone(),
        token_value: new.token_value.clone(),
        project_name: new.project_name.clone(),
        export_settings: new.export_settings.clone(),
    };
    state.sync_service.publisher().validate(&candidate).await?;

    let target = state.sync_service.targets().create_target(&new).await?;
    info!(target_id = target.id, user_id, "Publish configuration stored");

    Ok((StatusCode::CREATED, Json(target.into())))
}

/// Fetch one publish configuration.
#[utoipa::path(
    get,
    path = "/api/v1/configurations/{id}",
    params(("id" = i64, Path, description = "Configuration ID")),
    responses(
        (status = 200, description = "Configuration", body = ConfigurationResponse),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearer" = [])),
    tag = "configurations"
)]
pub async fn get_configuration(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConfigurationResponse>, ApiError> {
    Ok(Json(load_target(&state, id).await?.into()))
}

/// Apply a partial update, re-validating against the BI server.
#[utoipa::path(
    patch,
    path = "/api/v1/configurations/{id}",
    params(("id" = i64, Path, description = "Configuration ID")),
    request_body = UpdateConfigurationRequest,
    responses(
        (status = 200, description = "Configuration updated", body = ConfigurationResponse),
        (status = 400, description = "BI server rejected the configuration"),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearer" = [])),
    tag = "configurations"
)]
pub async fn update_configuration(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateConfigurationRequest>,
) -> Result<Json<ConfigurationResponse>, ApiError> {
    let mut target = load_target(&state, id).await?;

    if let Some(address) = request.server_address {
        target.server_address = address;
    }
    if let Some(site) = request.site_name {
        target.site_name = site;
    }
    if let Some(name) = request.token_name {
        target.token_name = name;
    }
    if let Some(value) = request.token_value {
        target.token_value = state.cipher.encrypt(&value)?;
    }
    if let Some(project) = request.project_name {
        target.project_name = project;
    }
    if let Some(settings) = request.export_settings {
        target.export_settings = settings;
    }

    state.sync_service.publisher().validate(&target).await?;
    state.sync_service.targets().update_target(&target).await?;

    Ok(Json(target.into()))
}

/// Delete a publish configuration. Files using it stop publishing.
#[utoipa::path(
    delete,
    path = "/api/v1/configurations/{id}",
    params(("id" = i64, Path, description = "Configuration ID")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearer" = [])),
    tag = "configurations"
)]
pub async fn delete_configuration(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.sync_service.targets().delete_target(id).await? {
        return Err(ApiError::NotFound(format!("Configuration not found: {}", id)));
    }
    info!(target_id = id, "Publish configuration deleted");
    Ok(StatusCode::NO_CONTENT)
}
