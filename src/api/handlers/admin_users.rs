use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::auth::UserResponse;
use crate::api::handlers::shares::MessageResponse;
use crate::models::{Identity, Role};
use crate::services::user_service::UserService;
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 64, message = "username must be 1-64 characters"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    /// "admin" or "user"; defaults to "user"
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    /// Left empty to generate one
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordResponse {
    pub password: String,
}

fn parse_role(role: &str) -> Result<Role, AppError> {
    role.parse()
        .map_err(|_| AppError::BadRequest("role must be admin or user".to_string()))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid username, password or role"),
        (status = 409, description = "Username already exists")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let role = match payload.role.as_deref().map(str::trim) {
        Some(role) if !role.is_empty() => parse_role(role)?,
        _ => Role::User,
    };

    let user = UserService::create_user(&state.db, &payload.username, &payload.password, role)
        .await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = Vec<UserResponse>),
        (status = 403, description = "Admin role required")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = UserService::list_users(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Cannot delete yourself"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Would remove the last admin")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    UserService::delete_user(&state.db, state.storage.as_ref(), &identity.user_id, &id).await?;
    Ok(Json(MessageResponse {
        message: "user deleted".to_string(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/role",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Would remove the last admin")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let role = parse_role(&payload.role)?;
    let user = UserService::set_role(&state.db, &id, role).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/reset-password",
    params(("id" = String, Path, description = "User ID")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "New password, shown once", body = ResetPasswordResponse),
        (status = 404, description = "User not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    let payload: ResetPasswordRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ResetPasswordRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?
    };

    let password = UserService::reset_password(&state.db, &id, payload.password).await?;
    Ok(Json(ResetPasswordResponse { password }))
}
