use crate::api::error::AppError;
use crate::entities::{files, prelude::*, shares, users};
use crate::models::Identity;
use crate::services::file_service::FileService;
use crate::services::share_policy;
use crate::services::storage::{BlobReader, StorageService};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::HashMap;
use uuid::Uuid;

pub const MAX_SHARE_VIEWS: i64 = 1000;
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;
pub const ALLOWED_EXPIRY_DAYS: [i64; 3] = [1, 7, 30];

#[derive(Debug, Default, Clone)]
pub struct NewShare {
    pub require_login: Option<bool>,
    pub allow_username: Option<String>,
    pub max_views: Option<i64>,
    pub expires_in_days: Option<i64>,
}

/// A share together with the rows its responses mention.
pub struct ShareDetails {
    pub share: shares::Model,
    pub file: files::Model,
    pub owner: Option<users::Model>,
    pub allowed_user: Option<users::Model>,
}

pub struct ShareListing {
    pub share: shares::Model,
    pub file: Option<files::Model>,
    pub file_owner: Option<users::Model>,
    pub creator: Option<users::Model>,
    pub allowed_user: Option<users::Model>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupCriteria {
    pub remove_expired: bool,
    pub remove_missing_file: bool,
    pub remove_exhausted: bool,
}

impl CleanupCriteria {
    pub fn all() -> Self {
        Self {
            remove_expired: true,
            remove_missing_file: true,
            remove_exhausted: true,
        }
    }

    pub fn any(&self) -> bool {
        self.remove_expired || self.remove_missing_file || self.remove_exhausted
    }
}

pub struct ShareService;

impl ShareService {
    /// Generate a URL-safe random token for share links
    pub fn generate_token() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..24).map(|_| rng.r#gen()).collect();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Deadline for a requested lifetime; only 1, 7 and 30 days are offered.
    pub fn compute_expires_at(
        days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppError> {
        let days = days.unwrap_or(DEFAULT_EXPIRY_DAYS);
        if !ALLOWED_EXPIRY_DAYS.contains(&days) {
            return Err(AppError::BadRequest(
                "expires_in_days must be one of 1, 7, 30".to_string(),
            ));
        }
        Ok(now + Duration::days(days))
    }

    /// Create a share link for an active file
    pub async fn create_share(
        db: &DatabaseConnection,
        requester: &Identity,
        file_id: &str,
        request: NewShare,
    ) -> Result<ShareDetails, AppError> {
        let (file, owner) = FileService::get(db, file_id).await?;

        if !requester.is_admin() && file.owner_id != requester.user_id {
            return Err(AppError::Forbidden(
                "no permission to share this file".to_string(),
            ));
        }

        let mut require_login = request.require_login.unwrap_or(true);

        let allow_username = request
            .allow_username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let allowed_user = match allow_username {
            Some(name) => {
                if !requester.is_admin() {
                    return Err(AppError::Forbidden(
                        "only admins can restrict the receiver".to_string(),
                    ));
                }
                let user = Users::find()
                    .filter(users::Column::Username.eq(name))
                    .one(db)
                    .await?
                    .ok_or_else(|| AppError::NotFound("receiver user not found".to_string()))?;
                require_login = true;
                Some(user)
            }
            None => None,
        };

        let max_views = match request.max_views {
            Some(n) if !(1..=MAX_SHARE_VIEWS).contains(&n) => {
                return Err(AppError::BadRequest(format!(
                    "max_views must be between 1 and {MAX_SHARE_VIEWS}"
                )));
            }
            Some(n) => Some(n as i32),
            None => None,
        };

        let now = Utc::now();
        let expires_at = Self::compute_expires_at(request.expires_in_days, now)?;

        let share = shares::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            token: Set(Self::generate_token()),
            file_id: Set(file.id.clone()),
            creator_id: Set(Some(requester.user_id.clone())),
            require_login: Set(require_login),
            allowed_user_id: Set(allowed_user.as_ref().map(|u| u.id.clone())),
            max_views: Set(max_views),
            view_count: Set(0),
            expires_at: Set(Some(expires_at)),
            created_at: Set(now),
        }
        .insert(db)
        .await?;

        tracing::info!("🔗 Share created for '{}'", file.filename);

        Ok(ShareDetails {
            share,
            file,
            owner,
            allowed_user,
        })
    }

    /// Looks up a share and its file. A file that was removed or
    /// soft-deleted makes the share unusable.
    /// Resolves a share token to the share and its active file.
    pub async fn find(db: &DatabaseConnection, token: &str) -> Result<ShareDetails, AppError> {
        let (share, file) = Shares::find()
            .filter(shares::Column::Token.eq(token))
            .find_also_related(Files)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("share not found".to_string()))?;

        let file = file
            .filter(files::Model::is_active)
            .ok_or_else(|| AppError::NotFound("shared file no longer exists".to_string()))?;

        let owner = Users::find_by_id(file.owner_id.as_str()).one(db).await?;
        let allowed_user = match &share.allowed_user_id {
            Some(id) => Users::find_by_id(id.as_str()).one(db).await?,
            None => None,
        };

        Ok(ShareDetails {
            share,
            file,
            owner,
            allowed_user,
        })
    }

    /// Share metadata for a caller. Never counts as a view.
    pub fn get_metadata(
        details: ShareDetails,
        identity: Option<&Identity>,
    ) -> Result<ShareDetails, AppError> {
        share_policy::evaluate(&details.share, Utc::now(), identity)?;
        Ok(details)
    }

    /// Spends one view and opens the shared content.
    ///
    /// The view stays spent when the blob turns out to be missing.
    pub async fn consume(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        details: ShareDetails,
        identity: Option<&Identity>,
    ) -> Result<(files::Model, BlobReader), AppError> {
        share_policy::evaluate(&details.share, Utc::now(), identity)?;

        Self::consume_view(db, &details.share.id).await?;

        let reader = FileService::open_blob(storage, &details.file)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::NotFound("shared file content is missing".to_string())
                }
                other => other,
            })?;
        Ok((details.file, reader))
    }

    /// Single conditional increment; zero affected rows means the quota is spent.
    pub async fn consume_view(db: &DatabaseConnection, share_id: &str) -> Result<(), AppError> {
        let result = Shares::update_many()
            .col_expr(
                shares::Column::ViewCount,
                Expr::col(shares::Column::ViewCount).add(1),
            )
            .filter(shares::Column::Id.eq(share_id))
            .filter(
                Condition::any()
                    .add(shares::Column::MaxViews.is_null())
                    .add(Expr::col(shares::Column::ViewCount).lt(Expr::col(shares::Column::MaxViews))),
            )
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Gone("share view limit reached".to_string()));
        }
        Ok(())
    }

    /// All shares, newest first.
    pub async fn list_shares(db: &DatabaseConnection) -> Result<Vec<ShareListing>, AppError> {
        let shares = Shares::find()
            .find_also_related(Files)
            .order_by_desc(shares::Column::CreatedAt)
            .all(db)
            .await?;

        let users: HashMap<String, users::Model> = Users::find()
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        let lookup = |id: Option<&String>| id.and_then(|id| users.get(id)).cloned();

        Ok(shares
            .into_iter()
            .map(|(share, file)| ShareListing {
                file_owner: lookup(file.as_ref().map(|f| &f.owner_id)),
                creator: lookup(share.creator_id.as_ref()),
                allowed_user: lookup(share.allowed_user_id.as_ref()),
                file,
                share,
            })
            .collect())
    }

    /// Deletes a share by token; absent tokens are not an error.
    pub async fn revoke_share(db: &DatabaseConnection, token: &str) -> Result<(), AppError> {
        let result = Shares::delete_many()
            .filter(shares::Column::Token.eq(token))
            .exec(db)
            .await?;
        if result.rows_affected > 0 {
            tracing::info!("🚫 Share {} revoked", token);
        }
        Ok(())
    }

    /// Removes every share matching at least one enabled criterion.
    pub async fn cleanup(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        criteria: CleanupCriteria,
    ) -> Result<u64, AppError> {
        if !criteria.any() {
            return Err(AppError::BadRequest(
                "at least one cleanup criterion is required".to_string(),
            ));
        }

        let now = Utc::now();
        let shares = Shares::find().find_also_related(Files).all(db).await?;

        let mut doomed = Vec::new();
        for (share, file) in shares {
            let matches = (criteria.remove_expired && share.is_expired(now))
                || (criteria.remove_exhausted && share.is_exhausted())
                || (criteria.remove_missing_file && Self::file_missing(storage, file).await?);
            if matches {
                doomed.push(share.id);
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }

        let result = Shares::delete_many()
            .filter(shares::Column::Id.is_in(doomed))
            .exec(db)
            .await?;

        tracing::info!("🧹 Share cleanup removed {} share(s)", result.rows_affected);
        Ok(result.rows_affected)
    }

    async fn file_missing(
        storage: &dyn StorageService,
        file: Option<files::Model>,
    ) -> Result<bool, AppError> {
        match file {
            Some(file) if file.is_active() => Ok(!storage.file_exists(&file.storage_key).await?),
            _ => Ok(true),
        }
    }
}
