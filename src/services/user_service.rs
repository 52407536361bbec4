use crate::api::error::AppError;
use crate::entities::{files, prelude::*, users};
use crate::models::Role;
use crate::services::storage::StorageService;
use crate::utils::auth::create_jwt;
use crate::utils::password::{generate_password, hash_password, verify_password};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

pub const MAX_USERNAME_LEN: usize = 64;

/// Guard repeated inside the write so two concurrent demotions cannot both pass.
const OTHER_ADMIN_EXISTS: &str = "(SELECT COUNT(*) FROM users WHERE role = ? AND id <> ?) >= 1";

pub struct UserService;

impl UserService {
    /// Check credentials and issue a bearer token.
    pub async fn login(
        db: &DatabaseConnection,
        jwt_secret: &str,
        username: &str,
        password: &str,
    ) -> Result<(String, users::Model), AppError> {
        let invalid = || AppError::Unauthorized("invalid credentials".to_string());

        let user = Users::find()
            .filter(users::Column::Username.eq(username.trim()))
            .one(db)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }

        let token = create_jwt(&user.id, user.role(), jwt_secret)?;
        Ok((token, user))
    }

    pub async fn create_user(
        db: &DatabaseConnection,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<users::Model, AppError> {
        let username = username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::BadRequest(format!(
                "username must be 1-{MAX_USERNAME_LEN} characters"
            )));
        }
        if password.is_empty() {
            return Err(AppError::BadRequest("password is required".to_string()));
        }

        let taken = Users::find()
            .filter(users::Column::Username.eq(username))
            .count(db)
            .await?;
        if taken > 0 {
            return Err(AppError::Conflict("username already exists".to_string()));
        }

        let user = users::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            username: Set(username.to_string()),
            password_hash: Set(hash_password(password)?),
            role: Set(role.as_str().to_string()),
            created_at: Set(Utc::now()),
        };

        let user = user.insert(db).await.map_err(|e| {
            // A concurrent insert can still hit the unique index
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AppError::Conflict("username already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        tracing::info!("👤 Created user '{}' ({})", user.username, role);
        Ok(user)
    }

    pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<users::Model>, AppError> {
        let users = Users::find()
            .order_by_desc(users::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(users)
    }

    pub async fn set_role(
        db: &DatabaseConnection,
        user_id: &str,
        role: Role,
    ) -> Result<users::Model, AppError> {
        let user = Self::find_user(db, user_id).await?;

        if user.role().is_admin() && !role.is_admin() {
            Self::ensure_admin_will_remain(db, &user).await?;

            let result = Users::update_many()
                .col_expr(users::Column::Role, Expr::value(role.as_str()))
                .filter(users::Column::Id.eq(user_id))
                .filter(Expr::cust_with_values(
                    OTHER_ADMIN_EXISTS,
                    [Role::Admin.as_str(), user_id],
                ))
                .exec(db)
                .await?;
            if result.rows_affected == 0 {
                return Err(Self::last_admin_error());
            }
        } else {
            let mut active: users::ActiveModel = user.into();
            active.role = Set(role.as_str().to_string());
            active.update(db).await?;
        }

        tracing::info!("🔑 Role of user {} set to {}", user_id, role);
        Self::find_user(db, user_id).await
    }

    /// Removes an account. Its files go with it, blobs best-effort.
    pub async fn delete_user(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        requester_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        if requester_id == user_id {
            return Err(AppError::BadRequest(
                "you cannot delete your own account".to_string(),
            ));
        }

        let user = Self::find_user(db, user_id).await?;

        let owned = Files::find()
            .filter(files::Column::OwnerId.eq(user_id))
            .all(db)
            .await?;

        let mut delete = Users::delete_many().filter(users::Column::Id.eq(user_id));
        if user.role().is_admin() {
            Self::ensure_admin_will_remain(db, &user).await?;
            delete = delete.filter(Expr::cust_with_values(
                OTHER_ADMIN_EXISTS,
                [Role::Admin.as_str(), user_id],
            ));
        }

        let result = delete.exec(db).await?;
        if result.rows_affected == 0 {
            return Err(if user.role().is_admin() {
                Self::last_admin_error()
            } else {
                AppError::NotFound("user not found".to_string())
            });
        }

        for file in owned {
            if let Err(e) = storage.delete_file(&file.storage_key).await {
                tracing::warn!("⚠️  Failed to remove blob {}: {}", file.storage_key, e);
            }
        }

        tracing::info!("🗑️ Deleted user '{}'", user.username);
        Ok(())
    }

    /// Sets a new password, generating one when none is given. Returns the plaintext.
    pub async fn reset_password(
        db: &DatabaseConnection,
        user_id: &str,
        password: Option<String>,
    ) -> Result<String, AppError> {
        let user = Self::find_user(db, user_id).await?;

        // Stored exactly as chosen; only an empty value means "generate"
        let password = password
            .filter(|p| !p.is_empty())
            .unwrap_or_else(generate_password);

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(hash_password(&password)?);
        active.update(db).await?;

        Ok(password)
    }

    pub async fn find_user(
        db: &DatabaseConnection,
        user_id: &str,
    ) -> Result<users::Model, AppError> {
        Users::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))
    }

    async fn ensure_admin_will_remain(
        db: &DatabaseConnection,
        target: &users::Model,
    ) -> Result<(), AppError> {
        if !target.role().is_admin() {
            return Ok(());
        }
        let others = Users::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .filter(users::Column::Id.ne(target.id.as_str()))
            .count(db)
            .await?;
        if others < 1 {
            return Err(Self::last_admin_error());
        }
        Ok(())
    }

    fn last_admin_error() -> AppError {
        AppError::InvalidState("at least one admin must remain".to_string())
    }
}
