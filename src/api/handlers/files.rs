use crate::AppState;
use crate::api::error::AppError;
use crate::entities::{files, users};
use crate::models::{FileState, Identity};
use crate::services::file_service::{FileService, StoredBlob};
use crate::services::storage::{BlobReader, StorageService};
use crate::utils::http::content_disposition;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub description: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl FileResponse {
    fn new(file: files::Model, owner: Option<users::Model>) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            size: file.size,
            mime_type: file.mime_type,
            description: file.description,
            owner: owner.map(|u| u.username).unwrap_or_default(),
            created_at: file.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponse {
    pub id: String,
    pub state: FileState,
}

/// Streams a blob with the stored MIME type.
pub(crate) fn blob_response(
    file: &files::Model,
    reader: BlobReader,
    inline: bool,
) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(inline, &file.filename),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

#[utoipa::path(
    post,
    path = "/api/files",
    request_body(content = Object, description = "Either a `file` part or a `text` field, plus an optional `description`", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Neither or both of file and text given"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "API key lacks the upload scope")
    ),
    security(("jwt" = []), ("api_key" = [])),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let storage = state.storage.as_ref();
    let mut stored: Option<StoredBlob> = None;

    let fields = read_upload_fields(storage, &mut multipart, &mut stored).await;
    let (text, description) = match fields {
        Ok(fields) => fields,
        Err(e) => {
            if let Some(blob) = &stored {
                FileService::discard(storage, blob).await;
            }
            return Err(e);
        }
    };

    let blob = match (stored, text) {
        (Some(blob), None) => blob,
        (None, Some(text)) => FileService::store_text(storage, &text).await?,
        (None, None) => {
            return Err(AppError::BadRequest("file or text is required".to_string()));
        }
        (Some(blob), Some(_)) => {
            FileService::discard(storage, &blob).await;
            return Err(AppError::BadRequest(
                "send either a file or text, not both".to_string(),
            ));
        }
    };

    let file = FileService::record(&state.db, storage, &identity.user_id, blob, description).await?;

    Ok(Json(UploadResponse {
        id: file.id,
        filename: file.filename,
    }))
}

/// Walks the form. The `file` part is streamed into storage as soon as it arrives.
async fn read_upload_fields(
    storage: &dyn StorageService,
    multipart: &mut Multipart,
    stored: &mut Option<StoredBlob>,
) -> Result<(Option<String>, Option<String>), AppError> {
    let mut text: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if stored.is_some() {
                    return Err(AppError::BadRequest(
                        "only one file per upload".to_string(),
                    ));
                }
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field.content_type().map(str::to_string);
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                *stored = Some(
                    FileService::store_file(
                        storage,
                        &filename,
                        content_type.as_deref(),
                        Box::new(reader),
                    )
                    .await?,
                );
            }
            "text" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                text = Some(value).filter(|t| !t.is_empty());
            }
            "description" => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    Ok((text, description))
}

#[utoipa::path(
    get,
    path = "/api/files",
    responses(
        (status = 200, description = "Active files, newest first", body = Vec<FileResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileResponse>>, AppError> {
    let files = FileService::list(&state.db).await?;
    Ok(Json(
        files
            .into_iter()
            .map(|(file, owner)| FileResponse::new(file, owner))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 404, description = "File not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let (file, owner) = FileService::get(&state.db, &id).await?;
    Ok(Json(FileResponse::new(file, owner)))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content as attachment"),
        (status = 404, description = "File or content not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (file, reader) = FileService::open(&state.db, state.storage.as_ref(), &id).await?;
    blob_response(&file, reader, false)
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/stream",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content inline"),
        (status = 404, description = "File or content not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn stream_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (file, reader) = FileService::open(&state.db, state.storage.as_ref(), &id).await?;
    blob_response(&file, reader, true)
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "Soft-deleted (owner) or purged (admin)", body = DeleteFileResponse),
        (status = 404, description = "File not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<DeleteFileResponse>, AppError> {
    let file_state = FileService::delete(&state.db, state.storage.as_ref(), &identity, &id).await?;
    Ok(Json(DeleteFileResponse {
        id,
        state: file_state,
    }))
}
