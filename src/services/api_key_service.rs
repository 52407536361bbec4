use crate::api::error::AppError;
use crate::entities::{api_keys, prelude::*, users};
use crate::models::ApiScope;
use crate::utils::hash::{hash_api_key, mask_key};
use chrono::{Duration, Utc};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::HashMap;
use uuid::Uuid;

const SECRET_PREFIX: &str = "ch_";
const SECRET_BYTES: usize = 24;

pub struct NewApiKey {
    pub name: String,
    pub scopes: Vec<String>,
    pub bound_user_id: String,
    pub expires_in_days: Option<i64>,
}

/// Listing row: the key plus the usernames it refers to.
pub struct ApiKeyListing {
    pub key: api_keys::Model,
    pub bound_user: Option<users::Model>,
    pub created_by: Option<users::Model>,
}

pub struct ApiKeyService;

impl ApiKeyService {
    /// `ch_` followed by 48 hex characters.
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{SECRET_PREFIX}{}", hex::encode(bytes))
    }

    /// Stores a new key and returns it with its plaintext secret.
    /// The plaintext is never retrievable again.
    pub async fn create_key(
        db: &DatabaseConnection,
        creator_id: &str,
        request: NewApiKey,
    ) -> Result<(ApiKeyListing, String), AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name is required".to_string()));
        }

        let scopes: Vec<String> = request
            .scopes
            .iter()
            .map(|s| s.trim().to_string())
            .collect();
        if scopes.is_empty() || !scopes.iter().all(|s| ApiScope::is_grantable(s)) {
            return Err(AppError::BadRequest(format!(
                "scopes must be a non-empty subset of [{}, {}]",
                ApiScope::FilesUpload,
                ApiScope::WILDCARD
            )));
        }

        let expires_at = match request.expires_in_days {
            Some(days) if days <= 0 => {
                return Err(AppError::BadRequest(
                    "expires_in_days must be positive".to_string(),
                ));
            }
            Some(days) => Some(Utc::now() + Duration::days(days)),
            None => None,
        };

        let bound_user = Users::find_by_id(request.bound_user_id.as_str())
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("bound user not found".to_string()))?;
        let created_by = Users::find_by_id(creator_id).one(db).await?;

        let secret = Self::generate_secret();
        let key = api_keys::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            hashed_key: Set(hash_api_key(&secret)),
            key_preview: Set(mask_key(&secret)),
            scopes: Set(scopes.join(",")),
            expires_at: Set(expires_at),
            revoked: Set(false),
            bound_user_id: Set(Some(bound_user.id.clone())),
            created_by_id: Set(created_by.as_ref().map(|u| u.id.clone())),
            last_used_at: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        tracing::info!(
            "🔐 API key '{}' created for user '{}'",
            key.name,
            bound_user.username
        );

        Ok((
            ApiKeyListing {
                key,
                bound_user: Some(bound_user),
                created_by,
            },
            secret,
        ))
    }

    pub async fn list_keys(db: &DatabaseConnection) -> Result<Vec<ApiKeyListing>, AppError> {
        let keys = ApiKeys::find()
            .order_by_desc(api_keys::Column::CreatedAt)
            .all(db)
            .await?;

        let users: HashMap<String, users::Model> = Users::find()
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        let lookup = |id: &Option<String>| id.as_ref().and_then(|id| users.get(id)).cloned();

        Ok(keys
            .into_iter()
            .map(|key| ApiKeyListing {
                bound_user: lookup(&key.bound_user_id),
                created_by: lookup(&key.created_by_id),
                key,
            })
            .collect())
    }

    /// Marks a key revoked. Revoking twice is fine.
    pub async fn revoke_key(db: &DatabaseConnection, key_id: &str) -> Result<(), AppError> {
        let key = ApiKeys::find_by_id(key_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("API key not found".to_string()))?;

        if !key.revoked {
            let mut active: api_keys::ActiveModel = key.into();
            active.revoked = Set(true);
            active.update(db).await?;
            tracing::info!("🚫 API key {} revoked", key_id);
        }
        Ok(())
    }

    /// Resolves a presented secret to the key and its bound user.
    ///
    /// Unknown or revoked keys and keys without a bound user are
    /// `Unauthorized`; expired keys and missing scopes are `Forbidden`.
    pub async fn authenticate(
        db: &DatabaseConnection,
        secret: &str,
        scope: ApiScope,
    ) -> Result<(api_keys::Model, users::Model), AppError> {
        Self::resolve(db, secret, scope.as_str()).await
    }

    async fn resolve(
        db: &DatabaseConnection,
        secret: &str,
        scope: &str,
    ) -> Result<(api_keys::Model, users::Model), AppError> {
        let key = ApiKeys::find()
            .filter(api_keys::Column::HashedKey.eq(hash_api_key(secret)))
            .one(db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid API key".to_string()))?;

        if key.revoked {
            return Err(AppError::Unauthorized("API key has been revoked".to_string()));
        }
        if key.is_expired(Utc::now()) {
            return Err(AppError::Forbidden("API key has expired".to_string()));
        }
        if !key.grants(scope) {
            return Err(AppError::Forbidden(format!(
                "API key lacks the {scope} scope"
            )));
        }

        let bound_user = match &key.bound_user_id {
            Some(id) => Users::find_by_id(id.as_str()).one(db).await?,
            None => None,
        }
        .ok_or_else(|| AppError::Unauthorized("API key has no bound user".to_string()))?;

        Self::touch_last_used(db, &key.id);
        Ok((key, bound_user))
    }

    /// Same checks as [`Self::authenticate`] with the scope given by name.
    pub async fn verify(
        db: &DatabaseConnection,
        secret: &str,
        scope: Option<&str>,
    ) -> Result<(api_keys::Model, users::Model), AppError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(AppError::BadRequest(
                "missing X-API-Key header or api_key field".to_string(),
            ));
        }

        let scope = scope
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ApiScope::FilesUpload.as_str());

        Self::resolve(db, secret, scope).await
    }

    /// Records key usage in the background; failures are only logged.
    fn touch_last_used(db: &DatabaseConnection, key_id: &str) {
        let db = db.clone();
        let key_id = key_id.to_string();
        tokio::spawn(async move {
            let update = api_keys::ActiveModel {
                id: Set(key_id.clone()),
                last_used_at: Set(Some(Utc::now())),
                ..Default::default()
            };
            if let Err(e) = update.update(&db).await {
                tracing::warn!("Failed to record API key usage for {}: {}", key_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_shape() {
        let secret = ApiKeyService::generate_secret();
        assert!(secret.starts_with("ch_"));
        assert_eq!(secret.len(), 3 + SECRET_BYTES * 2);
        assert!(secret[3..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, ApiKeyService::generate_secret());
    }
}
