//! Tracked file endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use duva_core::{FileStore, FileUpdate, SyncRequest, TrackedFile};

use crate::dto::{CreateFileRequest, FileQuery, FileResponse, SyncResponse, UpdateFileRequest};
use crate::error::ApiError;
use crate::state::AppState;

async fn respond(state: &AppState, file: TrackedFile) -> Result<FileResponse, ApiError> {
    let link = state.sync_service.download_link(&file).await?;
    Ok(FileResponse::new(file, link))
}

async fn load_file(state: &AppState, id: i64) -> Result<TrackedFile, ApiError> {
    state
        .sync_service
        .files()
        .get_file(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File not found: {}", id)))
}

/// List a user's tracked files.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/files",
    params(("user_id" = i64, Path, description = "User ID"), FileQuery),
    responses(
        (status = 200, description = "Tracked files", body = Vec<FileResponse>),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<FileQuery>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = state
        .sync_service
        .files()
        .list_files(user_id, query.form_id)
        .await?;

    let mut responses = Vec::with_capacity(files.len());
    for file in files {
        responses.push(respond(&state, file).await?);
    }
    Ok(Json(responses))
}

/// Start tracking an upstream form.
///
/// Answers 200 with the existing file if the form is already tracked.
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/files",
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = CreateFileRequest,
    responses(
        (status = 201, description = "File tracked", body = FileResponse),
        (status = 200, description = "Form already tracked", body = FileResponse),
        (status = 400, description = "Encrypted form or invalid configuration"),
        (status = 404, description = "User, form or configuration not found"),
        (status = 502, description = "Upstream server unavailable"),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn create_file(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<CreateFileRequest>,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let existing = state
        .sync_service
        .files()
        .find_by_form(user_id, request.form_id)
        .await?;
    if let Some(file) = existing {
        return Ok((StatusCode::OK, Json(respond(&state, file).await?)));
    }

    let file = state
        .sync_service
        .register_file(
            user_id,
            request.form_id,
            request.publish_target_id,
            request.sync_now,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(respond(&state, file).await?)))
}

/// Fetch one tracked file with its download link.
#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "Tracked file", body = FileResponse),
        (status = 404, description = "File not found"),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FileResponse>, ApiError> {
    let file = load_file(&state, id).await?;
    Ok(Json(respond(&state, file).await?))
}

/// Change the publish target or (de)activate the schedule.
#[utoipa::path(
    patch,
    path = "/api/v1/files/{id}",
    params(("id" = i64, Path, description = "File ID")),
    request_body = UpdateFileRequest,
    responses(
        (status = 200, description = "File updated", body = FileResponse),
        (status = 404, description = "File or configuration not found"),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateFileRequest>,
) -> Result<Json<FileResponse>, ApiError> {
    let update = FileUpdate {
        publish_target_id: request.publish_target_id,
        is_active: request.is_active,
    };
    let file = state.sync_service.update_file(id, update).await?;
    Ok(Json(respond(&state, file).await?))
}

/// Stop tracking a form and delete its stored extract.
#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "File not found"),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.sync_service.delete_file(id).await? {
        return Err(ApiError::NotFound(format!("File not found: {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Queue an immediate sync.
///
/// Answers 202 without queueing anything while a run is already queued or
/// in progress.
#[utoipa::path(
    post,
    path = "/api/v1/files/{id}/sync",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "Sync queued", body = SyncResponse),
        (status = 202, description = "A sync is already on-going", body = SyncResponse),
        (status = 400, description = "Publish configuration is invalid"),
        (status = 404, description = "File not found"),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn sync_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<SyncResponse>), ApiError> {
    let (status, message) = match state.sync_service.request_sync(id).await? {
        SyncRequest::Enqueued => (StatusCode::OK, "Sync queued"),
        SyncRequest::AlreadyInProgress => {
            (StatusCode::ACCEPTED, "File syncing is currently on-going")
        }
    };

    Ok((
        status,
        Json(SyncResponse {
            message: message.to_string(),
        }),
    ))
}
