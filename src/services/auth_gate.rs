//! Turns request credentials into an [`Identity`].

use crate::api::error::AppError;
use crate::entities::prelude::Users;
use crate::models::{ApiScope, Identity};
use crate::services::api_key_service::ApiKeyService;
use crate::utils::auth::validate_jwt;
use async_trait::async_trait;
use axum::http::{HeaderMap, Uri, header::AUTHORIZATION};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;

pub const API_KEY_HEADER: &str = "x-api-key";

/// One authentication scheme.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the request carries no credential for this scheme.
    /// A credential that is present but invalid is an error.
    async fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Result<Option<Identity>, AppError>;
}

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

/// JWT from `Authorization: Bearer`, or from `?token=` when no header is sent.
pub struct BearerResolver {
    db: DatabaseConnection,
    jwt_secret: String,
}

impl BearerResolver {
    pub fn new(db: DatabaseConnection, jwt_secret: impl Into<String>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
        }
    }

    fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<Option<String>, AppError> {
        if let Some(value) = headers.get(AUTHORIZATION) {
            let malformed = || AppError::Unauthorized("invalid Authorization header".to_string());
            let value = value.to_str().map_err(|_| malformed())?;
            let (scheme, token) = value.trim().split_once(' ').ok_or_else(malformed)?;
            if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
                return Err(malformed());
            }
            return Ok(Some(token.trim().to_string()));
        }

        let query = uri.query().unwrap_or_default();
        Ok(serde_urlencoded::from_str::<AuthQuery>(query)
            .ok()
            .and_then(|q| q.token)
            .filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl IdentityResolver for BearerResolver {
    async fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Result<Option<Identity>, AppError> {
        let Some(token) = Self::extract_token(headers, uri)? else {
            return Ok(None);
        };

        let claims = validate_jwt(&token, &self.jwt_secret)
            .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;

        // Check if user still exists in DB
        let user = Users::find_by_id(claims.sub.as_str())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

        Ok(Some(Identity::new(user.id.clone(), user.role())))
    }
}

/// `X-API-Key` header checked against one required scope.
pub struct ApiKeyResolver {
    db: DatabaseConnection,
    scope: ApiScope,
}

impl ApiKeyResolver {
    pub fn new(db: DatabaseConnection, scope: ApiScope) -> Self {
        Self { db, scope }
    }
}

#[async_trait]
impl IdentityResolver for ApiKeyResolver {
    async fn resolve(&self, headers: &HeaderMap, _uri: &Uri) -> Result<Option<Identity>, AppError> {
        let Some(secret) = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let (_, user) = ApiKeyService::authenticate(&self.db, secret, self.scope).await?;
        Ok(Some(Identity::new(user.id.clone(), user.role())))
    }
}

/// Tries each scheme in order; the first credential found decides.
pub struct AuthGate {
    resolvers: Vec<Box<dyn IdentityResolver>>,
}

impl AuthGate {
    pub fn new(resolvers: Vec<Box<dyn IdentityResolver>>) -> Self {
        Self { resolvers }
    }

    /// Bearer tokens only.
    pub fn bearer(db: &DatabaseConnection, jwt_secret: &str) -> Self {
        Self::new(vec![Box::new(BearerResolver::new(db.clone(), jwt_secret))])
    }

    /// Bearer tokens first, then API keys holding `scope`.
    pub fn bearer_or_api_key(db: &DatabaseConnection, jwt_secret: &str, scope: ApiScope) -> Self {
        Self::new(vec![
            Box::new(BearerResolver::new(db.clone(), jwt_secret)),
            Box::new(ApiKeyResolver::new(db.clone(), scope)),
        ])
    }

    /// `Ok(None)` when no scheme found a credential.
    pub async fn identify(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<Option<Identity>, AppError> {
        for resolver in &self.resolvers {
            if let Some(identity) = resolver.resolve(headers, uri).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    pub async fn require(&self, headers: &HeaderMap, uri: &Uri) -> Result<Identity, AppError> {
        self.identify(headers, uri)
            .await?
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
    }
}
