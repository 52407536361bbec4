use crate::config::AppConfig;
use crate::entities::{prelude::*, users};
use crate::models::Role;
use crate::utils::password::hash_password;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Makes sure at least one administrator exists.
pub async fn seed_admin(db: &DatabaseConnection, config: &AppConfig) -> anyhow::Result<()> {
    let admins = Users::find()
        .filter(users::Column::Role.eq(Role::Admin.as_str()))
        .count(db)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    if let Some(existing) = Users::find()
        .filter(users::Column::Username.eq(config.admin_user.as_str()))
        .one(db)
        .await?
    {
        let mut active: users::ActiveModel = existing.into();
        active.role = Set(Role::Admin.as_str().to_string());
        active.update(db).await?;
        warn!("⚠️  Promoted existing user '{}' to admin", config.admin_user);
        return Ok(());
    }

    info!("🌱 Seeding initial admin account...");
    users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        username: Set(config.admin_user.clone()),
        password_hash: Set(hash_password(&config.admin_pass)?),
        role: Set(Role::Admin.as_str().to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    warn!(
        "⚠️  Created admin '{}' with the configured password, change it after first login",
        config.admin_user
    );
    Ok(())
}
