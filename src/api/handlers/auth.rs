use crate::AppState;
use crate::api::error::AppError;
use crate::entities::users;
use crate::models::Role;
use crate::services::user_service::UserService;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserResponse {
    fn from(user: users::Model) -> Self {
        Self {
            role: user.role(),
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (token, user) = UserService::login(
        &state.db,
        &state.config.jwt_secret,
        &payload.username,
        &payload.password,
    )
    .await?;

    tracing::info!("🔓 User '{}' logged in", user.username);

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}
