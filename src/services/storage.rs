use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Readable blob body handed to streaming responses.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Request body being written into storage.
pub type UploadReader<'a> = Box<dyn AsyncRead + Unpin + Send + 'a>;

/// S3 multipart part size; bodies that fit in one part go through a single put.
const S3_PART_SIZE: usize = 8 * 1024 * 1024;

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams `reader` into the blob at `key` and returns the bytes written.
    async fn upload_stream<'a>(&self, key: &str, reader: UploadReader<'a>) -> Result<u64>;
    async fn delete_file(&self, key: &str) -> Result<()>;
    async fn file_exists(&self, key: &str) -> Result<bool>;
    /// Opens a blob for reading. `Ok(None)` means the blob is absent.
    async fn open_file(&self, key: &str) -> Result<Option<BlobReader>>;
}

/// Blobs kept as plain files under a base directory.
pub struct LocalStorageService {
    base_dir: PathBuf,
}

impl LocalStorageService {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Keys are flat names; anything that could escape the base dir is rejected.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let candidate = Path::new(key);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.base_dir.join(candidate)),
            _ => Err(anyhow::anyhow!("invalid storage key: {key}")),
        }
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload_stream<'a>(&self, key: &str, mut reader: UploadReader<'a>) -> Result<u64> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let mut file = tokio::fs::File::create(&path).await?;

        let copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => file.flush().await.map(|_| n),
            Err(e) => Err(e),
        };
        match copied {
            Ok(n) => Ok(n),
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Failed to remove partial blob {}: {}", key, cleanup);
                }
                Err(e.into())
            }
        }
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }

    async fn open_file(&self, key: &str) -> Result<Option<BlobReader>> {
        match tokio::fs::File::open(self.path_for(key)?).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Sends `buffer[..filled]` as part 1, then the rest of `reader`, and completes the upload.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        reader: &mut UploadReader<'_>,
        mut buffer: Vec<u8>,
        mut filled: usize,
    ) -> Result<u64> {
        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut total_size = 0u64;

        while filled > 0 {
            total_size += filled as u64;
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(buffer[..filled].to_vec()))
                .part_number(part_number)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            part_number += 1;
            filled = fill_chunk(reader, &mut buffer).await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(total_size)
    }
}

/// Reads until `buffer` is full or the reader ends. Returns the bytes read.
async fn fill_chunk(reader: &mut UploadReader<'_>, buffer: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < buffer.len() {
        let read = reader.read(&mut buffer[n..]).await?;
        if read == 0 {
            break;
        }
        n += read;
    }
    Ok(n)
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn upload_stream<'a>(&self, key: &str, mut reader: UploadReader<'a>) -> Result<u64> {
        let mut buffer = vec![0u8; S3_PART_SIZE];
        let first = fill_chunk(&mut reader, &mut buffer).await?;

        if first < S3_PART_SIZE {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(buffer[..first].to_vec()))
                .send()
                .await?;
            return Ok(first as u64);
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?
            .to_string();

        match self
            .upload_parts(key, &upload_id, &mut reader, buffer, first)
            .await
        {
            Ok(total) => Ok(total),
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!("Failed to abort multipart upload {}: {}", key, abort);
                }
                Err(e)
            }
        }
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn open_file(&self, key: &str) -> Result<Option<BlobReader>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(output) => Ok(Some(Box::pin(output.body.into_async_read()))),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }
}
