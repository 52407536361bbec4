pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::handlers::{admin_users, api_keys, auth, files, health, shares};
use crate::api::middleware::auth::{auth_middleware, require_admin, upload_auth_middleware};
use crate::config::AppConfig;
use crate::services::storage::StorageService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login,
        files::upload_file,
        files::list_files,
        files::get_file,
        files::download_file,
        files::stream_file,
        files::delete_file,
        shares::create_share,
        shares::get_share,
        shares::stream_share,
        shares::download_share,
        shares::list_shares,
        shares::revoke_share,
        shares::cleanup_shares,
        admin_users::create_user,
        admin_users::list_users,
        admin_users::delete_user,
        admin_users::update_role,
        admin_users::reset_password,
        api_keys::create_api_key,
        api_keys::list_api_keys,
        api_keys::revoke_api_key,
        api_keys::verify_api_key,
        health::health_check,
    ),
    components(
        schemas(
            models::Role,
            models::FileState,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::UserResponse,
            files::UploadResponse,
            files::FileResponse,
            files::DeleteFileResponse,
            shares::CreateShareRequest,
            shares::CreateShareResponse,
            shares::ShareMetaResponse,
            shares::ShareListItem,
            shares::CleanupRequest,
            shares::CleanupResponse,
            shares::MessageResponse,
            admin_users::CreateUserRequest,
            admin_users::UpdateRoleRequest,
            admin_users::ResetPasswordRequest,
            admin_users::ResetPasswordResponse,
            api_keys::CreateApiKeyRequest,
            api_keys::CreateApiKeyResponse,
            api_keys::ApiKeyResponse,
            api_keys::ApiKeyUser,
            api_keys::VerifyApiKeyRequest,
            api_keys::VerifyApiKeyResponse,
            health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "files", description = "File management endpoints"),
        (name = "shares", description = "Public share links"),
        (name = "apikeys", description = "API key verification"),
        (name = "admin", description = "Administration endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", post(auth::login))
        .route("/apikeys/verify", post(api_keys::verify_api_key))
        .route("/shares/:token", get(shares::get_share))
        .route("/shares/:token/stream", get(shares::stream_share))
        .route("/shares/:token/download", get(shares::download_share));

    // Add 10MB buffer for multipart overhead
    let upload = Router::new()
        .route("/files", post(files::upload_file))
        .layer(DefaultBodyLimit::max(
            state.config.max_file_size + 10 * 1024 * 1024,
        ))
        .route_layer(from_fn_with_state(state.clone(), upload_auth_middleware));

    let authenticated = Router::new()
        .route("/files", get(files::list_files))
        .route("/files/:id", get(files::get_file).delete(files::delete_file))
        .route("/files/:id/download", get(files::download_file))
        .route("/files/:id/stream", get(files::stream_file))
        .route("/files/:id/share", post(shares::create_share))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .route(
            "/admin/users",
            get(admin_users::list_users).post(admin_users::create_user),
        )
        .route("/admin/users/:id", delete(admin_users::delete_user))
        .route("/admin/users/:id/role", patch(admin_users::update_role))
        .route(
            "/admin/users/:id/reset-password",
            post(admin_users::reset_password),
        )
        .route(
            "/admin/apikeys",
            get(api_keys::list_api_keys).post(api_keys::create_api_key),
        )
        .route("/admin/apikeys/:id", delete(api_keys::revoke_api_key))
        .route("/admin/shares", get(shares::list_shares))
        .route("/admin/shares/cleanup", post(shares::cleanup_shares))
        .route("/admin/shares/:token", delete(shares::revoke_share))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .merge(public)
        .merge(upload)
        .merge(authenticated)
        .merge(admin);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/share/:token", get(shares::legacy_share))
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
