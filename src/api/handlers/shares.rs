use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::files::blob_response;
use crate::api::middleware::auth::ShareCaller;
use crate::models::Identity;
use crate::services::share_service::{CleanupCriteria, NewShare, ShareDetails, ShareService};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateShareRequest {
    /// Defaults to true
    pub require_login: Option<bool>,
    /// Admin only; forces login
    pub allow_username: Option<String>,
    #[validate(range(min = 1, max = 1000, message = "max_views must be between 1 and 1000"))]
    pub max_views: Option<i64>,
    /// One of 1, 7, 30; defaults to 7
    pub expires_in_days: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateShareResponse {
    pub share_token: String,
    pub preview_path: String,
    pub requires_login: bool,
    pub allow_username: Option<String>,
    pub max_views: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ShareMetaResponse {
    pub token: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub description: String,
    pub owner: String,
    pub requires_login: bool,
    pub allow_username: Option<String>,
    pub max_views: Option<i32>,
    pub remaining_views: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub stream_path: String,
    pub download_path: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ShareListItem {
    pub token: String,
    pub filename: String,
    pub file_owner: String,
    pub creator: String,
    pub require_login: bool,
    pub allow_username: Option<String>,
    pub max_views: Option<i32>,
    pub view_count: i32,
    pub remaining_views: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CleanupRequest {
    pub remove_expired: bool,
    pub remove_missing_file: bool,
    pub remove_exhausted: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub deleted: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl From<ShareDetails> for ShareMetaResponse {
    fn from(details: ShareDetails) -> Self {
        let ShareDetails {
            share,
            file,
            owner,
            allowed_user,
        } = details;
        Self {
            remaining_views: share.remaining_views(),
            stream_path: format!("/api/shares/{}/stream", share.token),
            download_path: format!("/api/shares/{}/download", share.token),
            token: share.token,
            filename: file.filename,
            mime_type: file.mime_type,
            size: file.size,
            description: file.description,
            owner: owner.map(|u| u.username).unwrap_or_default(),
            requires_login: share.require_login,
            allow_username: allowed_user.map(|u| u.username),
            max_views: share.max_views,
            expires_at: share.expires_at,
            created_at: share.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/files/{id}/share",
    params(("id" = String, Path, description = "File ID")),
    request_body = CreateShareRequest,
    responses(
        (status = 200, description = "Share created", body = CreateShareResponse),
        (status = 400, description = "Invalid limits or expiry"),
        (status = 403, description = "Not the owner, or receiver restriction by a non-admin"),
        (status = 404, description = "File or receiver not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn create_share(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(file_id): Path<String>,
    body: Bytes,
) -> Result<Json<CreateShareResponse>, AppError> {
    // An empty body means all defaults
    let payload: CreateShareRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateShareRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?
    };
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let details = ShareService::create_share(
        &state.db,
        &identity,
        &file_id,
        NewShare {
            require_login: payload.require_login,
            allow_username: payload.allow_username,
            max_views: payload.max_views,
            expires_in_days: payload.expires_in_days,
        },
    )
    .await?;

    let share = details.share;
    Ok(Json(CreateShareResponse {
        preview_path: format!("/preview/{}", share.token),
        share_token: share.token,
        requires_login: share.require_login,
        allow_username: details.allowed_user.map(|u| u.username),
        max_views: share.max_views,
        expires_at: share.expires_at,
    }))
}

#[utoipa::path(
    get,
    path = "/api/shares/{token}",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Share metadata; does not count as a view", body = ShareMetaResponse),
        (status = 401, description = "Login required or invalid token"),
        (status = 403, description = "Restricted to another user"),
        (status = 404, description = "Share or file not found"),
        (status = 410, description = "Share expired or exhausted")
    ),
    tag = "shares"
)]
pub async fn get_share(
    State(state): State<AppState>,
    caller: ShareCaller,
    Path(token): Path<String>,
) -> Result<Json<ShareMetaResponse>, AppError> {
    let details = ShareService::find(&state.db, &token).await?;
    let identity = caller.identify(&state).await?;
    let details = ShareService::get_metadata(details, identity.as_ref())?;
    Ok(Json(details.into()))
}

#[utoipa::path(
    get,
    path = "/api/shares/{token}/stream",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Shared content inline; consumes one view"),
        (status = 401, description = "Login required or invalid token"),
        (status = 403, description = "Restricted to another user"),
        (status = 404, description = "Share, file or content not found"),
        (status = 410, description = "Share expired or exhausted")
    ),
    tag = "shares"
)]
pub async fn stream_share(
    State(state): State<AppState>,
    caller: ShareCaller,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let details = ShareService::find(&state.db, &token).await?;
    let identity = caller.identify(&state).await?;
    let (file, reader) =
        ShareService::consume(&state.db, state.storage.as_ref(), details, identity.as_ref())
            .await?;
    blob_response(&file, reader, true)
}

#[utoipa::path(
    get,
    path = "/api/shares/{token}/download",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Shared content as attachment; consumes one view"),
        (status = 401, description = "Login required or invalid token"),
        (status = 403, description = "Restricted to another user"),
        (status = 404, description = "Share, file or content not found"),
        (status = 410, description = "Share expired or exhausted")
    ),
    tag = "shares"
)]
pub async fn download_share(
    State(state): State<AppState>,
    caller: ShareCaller,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let details = ShareService::find(&state.db, &token).await?;
    let identity = caller.identify(&state).await?;
    let (file, reader) =
        ShareService::consume(&state.db, state.storage.as_ref(), details, identity.as_ref())
            .await?;
    blob_response(&file, reader, false)
}

/// Links from the previous URL scheme are no longer served.
pub async fn legacy_share(Path(_token): Path<String>) -> AppError {
    AppError::Gone("share links have moved, use the new preview link".to_string())
}

#[utoipa::path(
    get,
    path = "/api/admin/shares",
    responses(
        (status = 200, description = "All shares, newest first", body = Vec<ShareListItem>),
        (status = 403, description = "Admin role required")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn list_shares(State(state): State<AppState>) -> Result<Json<Vec<ShareListItem>>, AppError> {
    let listings = ShareService::list_shares(&state.db).await?;
    let username = |u: Option<crate::entities::users::Model>| u.map(|u| u.username);

    Ok(Json(
        listings
            .into_iter()
            .map(|l| ShareListItem {
                remaining_views: l.share.remaining_views(),
                token: l.share.token,
                filename: l.file.map(|f| f.filename).unwrap_or_default(),
                file_owner: username(l.file_owner).unwrap_or_default(),
                creator: username(l.creator).unwrap_or_default(),
                require_login: l.share.require_login,
                allow_username: username(l.allowed_user),
                max_views: l.share.max_views,
                view_count: l.share.view_count,
                expires_at: l.share.expires_at,
                created_at: l.share.created_at,
            })
            .collect(),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/admin/shares/{token}",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Share revoked (also when it did not exist)", body = MessageResponse),
        (status = 403, description = "Admin role required")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn revoke_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    ShareService::revoke_share(&state.db, &token).await?;
    Ok(Json(MessageResponse {
        message: "share revoked".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/shares/cleanup",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Number of shares removed", body = CleanupResponse),
        (status = 400, description = "No criterion enabled"),
        (status = 403, description = "Admin role required")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn cleanup_shares(
    State(state): State<AppState>,
    Json(payload): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, AppError> {
    let deleted = ShareService::cleanup(
        &state.db,
        state.storage.as_ref(),
        CleanupCriteria {
            remove_expired: payload.remove_expired,
            remove_missing_file: payload.remove_missing_file,
            remove_exhausted: payload.remove_exhausted,
        },
    )
    .await?;

    Ok(Json(CleanupResponse { deleted }))
}
