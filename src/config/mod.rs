use anyhow::Context;
use std::env;

/// Runtime configuration for the hub
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port for the API server (default: 8080)
    pub port: u16,

    /// SeaORM connection string (default: "sqlite://data/app.db?mode=rwc")
    pub database_url: String,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// Blob backend: "local" or "s3" (default: "local")
    pub storage_backend: String,

    /// Directory for the local blob backend (default: "uploads")
    pub upload_dir: String,

    /// S3/MinIO endpoint, only read when storage_backend is "s3"
    pub minio_endpoint: Option<String>,
    pub minio_access_key: Option<String>,
    pub minio_secret_key: Option<String>,
    pub minio_bucket: Option<String>,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Seeded administrator when no admin exists yet
    pub admin_user: String,
    pub admin_pass: String,

    /// Interval of the background share cleanup, 0 disables it (default: 0)
    pub share_cleanup_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://data/app.db?mode=rwc".to_string(),
            jwt_secret: "replace-me".to_string(),
            storage_backend: "local".to_string(),
            upload_dir: "uploads".to_string(),
            minio_endpoint: None,
            minio_access_key: None,
            minio_secret_key: None,
            minio_bucket: None,
            max_file_size: 256 * 1024 * 1024, // 256 MB
            admin_user: "admin".to_string(),
            admin_pass: "admin123".to_string(),
            share_cleanup_interval_secs: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.storage_backend),

            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),

            minio_endpoint: env::var("MINIO_ENDPOINT").ok(),
            minio_access_key: env::var("MINIO_ACCESS_KEY").ok(),
            minio_secret_key: env::var("MINIO_SECRET_KEY").ok(),
            minio_bucket: env::var("MINIO_BUCKET").ok(),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            admin_user: env::var("ADMIN_USER")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.admin_user),

            admin_pass: env::var("ADMIN_PASS")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.admin_pass),

            share_cleanup_interval_secs: env::var("SHARE_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.share_cleanup_interval_secs),
        }
    }

    /// Create config for development (local disk, relaxed secret)
    pub fn development() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
            ..Self::default()
        }
    }

    /// Create config for production (secret must come from the environment)
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .context("CRITICAL: JWT_SECRET must be set")?;
        Ok(Self {
            jwt_secret,
            ..Self::from_env()
        })
    }

    /// `APP_ENV=production` selects [`Self::production`], anything else [`Self::from_env`].
    pub fn load() -> anyhow::Result<Self> {
        match env::var("APP_ENV").as_deref() {
            Ok("production") => Self::production(),
            _ => Ok(Self::from_env()),
        }
    }

    pub fn uses_s3(&self) -> bool {
        self.storage_backend == "s3"
    }
}
