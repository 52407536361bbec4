use crate::config::AppConfig;
use crate::entities::{api_keys, files, shares, users};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &AppConfig) -> anyhow::Result<DatabaseConnection> {
    let db = connect(&config.database_url).await?;

    run_migrations(&db).await?;

    crate::infrastructure::seed::seed_admin(&db, config).await?;

    Ok(db)
}

pub async fn connect(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", db_url);

    if let Some(path) = sqlite_file_path(db_url) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    Ok(db)
}

fn sqlite_file_path(db_url: &str) -> Option<&str> {
    let rest = db_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next()?;
    (!path.is_empty() && path != ":memory:").then_some(path)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Order matters for foreign keys: users first, shares last
    let stmts = vec![
        (
            "users",
            schema
                .create_table_from_entity(users::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "api_keys",
            schema
                .create_table_from_entity(api_keys::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "files",
            schema
                .create_table_from_entity(files::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "shares",
            schema
                .create_table_from_entity(shares::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        db.execute(builder.build(&stmt)).await?;
        info!("   - Table '{}' checked/created", name);
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_files_owner_id ON files(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_files_state ON files(state)",
        "CREATE INDEX IF NOT EXISTS idx_shares_file_id ON shares(file_id)",
        "CREATE INDEX IF NOT EXISTS idx_shares_expires_at ON shares(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_api_keys_bound_user_id ON api_keys(bound_user_id)",
    ];

    for query in indexes {
        db.execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await?;
    }

    Ok(())
}
