use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ApiScope, Identity};
use crate::services::auth_gate::AuthGate;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Uri, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

/// Requires a bearer token and stores the caller as an `Identity` extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = AuthGate::bearer(&state.db, &state.config.jwt_secret)
        .require(req.headers(), req.uri())
        .await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Like [`auth_middleware`] but also accepts an `X-API-Key` with upload scope.
pub async fn upload_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = AuthGate::bearer_or_api_key(
        &state.db,
        &state.config.jwt_secret,
        ApiScope::FilesUpload,
    )
    .require(req.headers(), req.uri())
    .await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Must run after one of the authenticating middlewares.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.is_admin() => Ok(next.run(req).await),
        Some(_) => Err(AppError::Forbidden("admin role required".to_string())),
        None => Err(AppError::Unauthorized("authentication required".to_string())),
    }
}

/// Credentials of a caller on routes that also serve anonymous visitors.
///
/// Verification is deferred to [`ShareCaller::identify`] so the handler can
/// resolve the addressed resource first.
#[derive(Debug, Clone)]
pub struct ShareCaller {
    headers: HeaderMap,
    uri: Uri,
}

impl ShareCaller {
    /// No credential yields `None`; a credential that fails to verify is
    /// rejected with 401 instead of being ignored.
    pub async fn identify(&self, state: &AppState) -> Result<Option<Identity>, AppError> {
        AuthGate::bearer(&state.db, &state.config.jwt_secret)
            .identify(&self.headers, &self.uri)
            .await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ShareCaller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ShareCaller {
            headers: parts.headers.clone(),
            uri: parts.uri.clone(),
        })
    }
}
