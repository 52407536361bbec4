use crate::api::error::AppError;
use crate::entities::{files, prelude::*, users};
use crate::models::{FileState, Identity};
use crate::services::storage::{BlobReader, StorageService, UploadReader};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// A blob already written to storage, waiting for its metadata row.
#[derive(Debug)]
pub struct StoredBlob {
    pub filename: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size: i64,
}

pub struct FileService;

impl FileService {
    /// Streams an uploaded file part into storage.
    pub async fn store_file(
        storage: &dyn StorageService,
        filename: &str,
        content_type: Option<&str>,
        reader: UploadReader<'_>,
    ) -> Result<StoredBlob, AppError> {
        let filename = Self::base_name(filename);
        let storage_key = format!("{}-{filename}", Self::key_stamp());
        // Unparseable client types fall back to octet-stream
        let mime_type = content_type
            .and_then(|c| c.trim().parse::<mime::Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
            .to_string();

        let size = Self::write_blob(storage, &storage_key, reader).await?;
        Ok(StoredBlob {
            filename,
            storage_key,
            mime_type,
            size,
        })
    }

    /// Stores pasted text as a `.txt` blob.
    pub async fn store_text(
        storage: &dyn StorageService,
        text: &str,
    ) -> Result<StoredBlob, AppError> {
        let filename = format!("text-{}.txt", Self::key_stamp());
        let size = Self::write_blob(storage, &filename, Box::new(text.as_bytes())).await?;
        Ok(StoredBlob {
            storage_key: filename.clone(),
            filename,
            mime_type: mime::TEXT_PLAIN_UTF_8.to_string(),
            size,
        })
    }

    /// Removes a stored blob that will not get a metadata row.
    pub async fn discard(storage: &dyn StorageService, blob: &StoredBlob) {
        if let Err(e) = storage.delete_file(&blob.storage_key).await {
            tracing::warn!("Failed to remove orphan blob {}: {}", blob.storage_key, e);
        }
    }

    /// Inserts the metadata row for a stored blob. The blob is removed if the insert fails.
    pub async fn record(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        owner_id: &str,
        blob: StoredBlob,
        description: Option<String>,
    ) -> Result<files::Model, AppError> {
        let file = files::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            owner_id: Set(owner_id.to_string()),
            filename: Set(blob.filename.clone()),
            storage_key: Set(blob.storage_key.clone()),
            size: Set(blob.size),
            mime_type: Set(blob.mime_type.clone()),
            description: Set(description.unwrap_or_default()),
            state: Set(FileState::Active.as_str().to_string()),
            created_at: Set(Utc::now()),
            deleted_at: Set(None),
        };

        match file.insert(db).await {
            Ok(file) => {
                tracing::info!("📤 Uploaded '{}' ({} bytes)", file.filename, file.size);
                Ok(file)
            }
            Err(e) => {
                Self::discard(storage, &blob).await;
                Err(e.into())
            }
        }
    }

    /// Active files, newest first, with their owners.
    pub async fn list(
        db: &DatabaseConnection,
    ) -> Result<Vec<(files::Model, Option<users::Model>)>, AppError> {
        let files = Files::find()
            .filter(files::Column::State.eq(FileState::Active.as_str()))
            .find_also_related(Users)
            .order_by_desc(files::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(files)
    }

    pub async fn get(
        db: &DatabaseConnection,
        file_id: &str,
    ) -> Result<(files::Model, Option<users::Model>), AppError> {
        Files::find_by_id(file_id)
            .filter(files::Column::State.eq(FileState::Active.as_str()))
            .find_also_related(Users)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("file not found".to_string()))
    }

    /// Opens the blob of an active file.
    pub async fn open(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        file_id: &str,
    ) -> Result<(files::Model, BlobReader), AppError> {
        let (file, _) = Self::get(db, file_id).await?;
        let reader = Self::open_blob(storage, &file).await?;
        Ok((file, reader))
    }

    pub async fn open_blob(
        storage: &dyn StorageService,
        file: &files::Model,
    ) -> Result<BlobReader, AppError> {
        storage
            .open_file(&file.storage_key)
            .await?
            .ok_or_else(|| AppError::NotFound("file content is missing".to_string()))
    }

    /// Users soft-delete their own active files; admins purge any file.
    pub async fn delete(
        db: &DatabaseConnection,
        storage: &dyn StorageService,
        requester: &Identity,
        file_id: &str,
    ) -> Result<FileState, AppError> {
        if requester.is_admin() {
            let file = Files::find_by_id(file_id)
                .one(db)
                .await?
                .ok_or_else(|| AppError::NotFound("file not found".to_string()))?;

            Files::delete_by_id(file.id.as_str()).exec(db).await?;
            if let Err(e) = storage.delete_file(&file.storage_key).await {
                tracing::warn!("⚠️  Failed to remove blob {}: {}", file.storage_key, e);
            }
            tracing::info!("🗑️ Purged file '{}'", file.filename);
            return Ok(FileState::Purged);
        }

        let file = Files::find_by_id(file_id)
            .filter(files::Column::OwnerId.eq(requester.user_id.as_str()))
            .filter(files::Column::State.eq(FileState::Active.as_str()))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("file not found".to_string()))?;

        let mut active: files::ActiveModel = file.into();
        active.state = Set(FileState::SoftDeleted.as_str().to_string());
        active.deleted_at = Set(Some(Utc::now()));
        active.update(db).await?;

        Ok(FileState::SoftDeleted)
    }

    async fn write_blob(
        storage: &dyn StorageService,
        storage_key: &str,
        reader: UploadReader<'_>,
    ) -> Result<i64, AppError> {
        match storage.upload_stream(storage_key, reader).await {
            Ok(written) => Ok(written as i64),
            Err(e) => {
                if let Err(cleanup) = storage.delete_file(storage_key).await {
                    tracing::warn!("Failed to remove partial blob {}: {}", storage_key, cleanup);
                }
                Err(AppError::Internal(format!("blob write failed: {e}")))
            }
        }
    }

    fn key_stamp() -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    }

    /// Strips any client-side directory part from an uploaded name.
    fn base_name(name: &str) -> String {
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        match base {
            "" | "." | ".." => "upload.bin".to_string(),
            other => other.to_string(),
        }
    }
}
