use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::shares::MessageResponse;
use crate::entities::users;
use crate::models::Identity;
use crate::services::api_key_service::{ApiKeyListing, ApiKeyService, NewApiKey};
use crate::services::auth_gate::API_KEY_HEADER;
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub scopes: Vec<String>,
    pub bound_user_id: String,
    pub expires_in_days: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeyUser {
    pub id: String,
    pub username: String,
}

impl From<users::Model> for ApiKeyUser {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub key_preview: String,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub bound_user: Option<ApiKeyUser>,
    pub created_by: Option<ApiKeyUser>,
}

impl From<ApiKeyListing> for ApiKeyResponse {
    fn from(listing: ApiKeyListing) -> Self {
        let key = listing.key;
        Self {
            scopes: key.scope_list(),
            id: key.id,
            name: key.name,
            key_preview: key.key_preview,
            revoked: key.revoked,
            expires_at: key.expires_at,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            bound_user: listing.bound_user.map(ApiKeyUser::from),
            created_by: listing.created_by.map(ApiKeyUser::from),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub key: ApiKeyResponse,
    /// Only ever returned here
    pub plain_key: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct VerifyApiKeyRequest {
    pub api_key: String,
    pub scope: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VerifyApiKeyResponse {
    pub valid: bool,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub bound_user: ApiKeyUser,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/admin/apikeys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 200, description = "Key created; plaintext shown once", body = CreateApiKeyResponse),
        (status = 400, description = "Invalid name, scopes or expiry"),
        (status = 404, description = "Bound user not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (listing, plain_key) = ApiKeyService::create_key(
        &state.db,
        &identity.user_id,
        NewApiKey {
            name: payload.name,
            scopes: payload.scopes,
            bound_user_id: payload.bound_user_id,
            expires_in_days: payload.expires_in_days,
        },
    )
    .await?;

    Ok(Json(CreateApiKeyResponse {
        key: listing.into(),
        plain_key,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/apikeys",
    responses(
        (status = 200, description = "All keys, newest first, masked", body = Vec<ApiKeyResponse>),
        (status = 403, description = "Admin role required")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let keys = ApiKeyService::list_keys(&state.db).await?;
    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/admin/apikeys/{id}",
    params(("id" = String, Path, description = "API key ID")),
    responses(
        (status = 200, description = "Key revoked", body = MessageResponse),
        (status = 404, description = "Key not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    ApiKeyService::revoke_key(&state.db, &id).await?;
    Ok(Json(MessageResponse {
        message: "API key revoked".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/apikeys/verify",
    request_body = VerifyApiKeyRequest,
    responses(
        (status = 200, description = "Key is usable for the scope", body = VerifyApiKeyResponse),
        (status = 400, description = "No key supplied"),
        (status = 401, description = "Unknown, revoked or unbound key"),
        (status = 403, description = "Expired key or missing scope")
    ),
    tag = "apikeys"
)]
pub async fn verify_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyApiKeyResponse>, AppError> {
    // Header-only calls are allowed, so a body that does not parse is ignored
    let payload: VerifyApiKeyRequest = serde_json::from_slice(&body).unwrap_or_default();

    let secret = if payload.api_key.trim().is_empty() {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    } else {
        payload.api_key
    };

    let (key, user) = ApiKeyService::verify(&state.db, &secret, Some(&payload.scope)).await?;

    Ok(Json(VerifyApiKeyResponse {
        valid: true,
        scopes: key.scope_list(),
        expires_at: key.expires_at,
        bound_user: user.into(),
        message: "API key is valid".to_string(),
    }))
}
