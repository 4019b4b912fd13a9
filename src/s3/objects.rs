use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectIdentifier;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, FailedItem, Result};
use crate::s3::gateway::{
    BucketInfo, ByteSource, DeleteResult, ObjectMetadata, ObjectStore, ObjectSummary,
    PrefixListing, ProgressCallback,
};

const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024; // 5MB
const PART_SIZE: usize = 5 * 1024 * 1024; // 5MB per part
const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024; // 64KB chunks
const DELETE_BATCH_SIZE: usize = 1000; // S3 delete_objects limit

/// `ObjectStore` over an aws-sdk-s3 client.
#[derive(Clone)]
pub struct S3Gateway {
    client: Arc<Client>,
}

impl S3Gateway {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn list_keys_with_prefix(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);

            if let Some(p) = prefix {
                request = request.prefix(p);
            }

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        source: ByteSource,
        content_type: Option<&str>,
        total_bytes: u64,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<()> {
        let path = match source {
            ByteSource::File(path) => path,
            ByteSource::Memory(data) => {
                return self.upload_single(bucket, key, data, content_type, total_bytes, progress).await
            }
        };

        let mut create = self.client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = content_type {
            create = create.content_type(ct);
        }
        let create_response = create.send().await?;

        let s3_upload_id = create_response
            .upload_id()
            .ok_or_else(|| AppError::Backend("No upload ID returned".into()))?
            .to_string();

        let mut file = tokio::fs::File::open(&path).await?;

        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut bytes_uploaded: u64 = 0;

        loop {
            let mut buffer = vec![0u8; PART_SIZE];
            let bytes_read = read_full(&mut file, &mut buffer).await?;

            if bytes_read == 0 {
                break;
            }

            buffer.truncate(bytes_read);

            let upload_part_response = match self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(&s3_upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    // Attempt to abort on failure
                    let _ = self
                        .client
                        .abort_multipart_upload()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(&s3_upload_id)
                        .send()
                        .await;
                    return Err(AppError::Backend(format!("{:?}", e)));
                }
            };

            bytes_uploaded += bytes_read as u64;
            if let Some(cb) = progress {
                cb.on_progress(bytes_uploaded, total_bytes);
            }

            completed_parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            part_number += 1;
        }

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&s3_upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await?;

        Ok(())
    }

    async fn upload_single(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        total_bytes: u64,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body));
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }
        request.send().await?;

        // Single-part uploads report one chunk boundary, at the end
        if let Some(cb) = progress {
            cb.on_progress(total_bytes, total_bytes);
        }
        Ok(())
    }
}

/// Fill `buf` as far as the reader allows, so every part but the last is full-size.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn to_chrono(d: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(d.secs(), d.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Gateway {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self.client.list_buckets().send().await?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| {
                b.name().map(|name| BucketInfo {
                    name: name.to_string(),
                    creation_date: b.creation_date().and_then(to_chrono),
                })
            })
            .collect())
    }

    async fn list_all_keys(&self, bucket: &str) -> Result<Vec<String>> {
        self.list_keys_with_prefix(bucket, None).await
    }

    async fn list_keys_under(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list_keys_with_prefix(bucket, Some(prefix)).await
    }

    async fn list_prefixed(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<PrefixListing> {
        let mut listing = PrefixListing::default();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .delimiter(delimiter);

            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await?;

            listing
                .objects
                .extend(response.contents().iter().filter_map(|obj| {
                    let key = obj.key()?;
                    Some(ObjectSummary {
                        key: key.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified: obj.last_modified().and_then(to_chrono),
                    })
                }));

            listing.prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|cp| cp.prefix().map(|p| p.to_string())),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(listing)
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let response = self.client.head_object().bucket(bucket).key(key).send().await?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(|s| s.to_string()),
            last_modified: response.last_modified().and_then(to_chrono),
        })
    }

    async fn get_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<u64> {
        let response = self.client.get_object().bucket(bucket).key(key).send().await?;
        let total_bytes = response.content_length().unwrap_or(0).max(0) as u64;

        let mut body = response.body.into_async_read();
        let mut bytes_downloaded: u64 = 0;
        let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];

        loop {
            let bytes_read = body.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }

            sink.write_all(&buffer[..bytes_read]).await?;
            bytes_downloaded += bytes_read as u64;

            if let Some(cb) = progress {
                cb.on_progress(bytes_downloaded, total_bytes);
            }
        }

        sink.flush().await?;
        Ok(bytes_downloaded)
    }

    async fn get_object_head(&self, bucket: &str, key: &str, max_bytes: u64) -> Result<Vec<u8>> {
        if max_bytes == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes=0-{}", max_bytes - 1))
            .send()
            .await?;
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Backend(format!("Failed to read body: {}", e)))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        source: ByteSource,
        content_type: Option<&str>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<()> {
        let total_bytes = source.len().await?;

        if total_bytes > MULTIPART_THRESHOLD {
            self.upload_multipart(bucket, key, source, content_type, total_bytes, progress)
                .await
        } else {
            let body = source.read_all().await?;
            self.upload_single(bucket, key, body, content_type, total_bytes, progress)
                .await
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client.delete_object().bucket(bucket).key(key).send().await?;
        Ok(())
    }

    async fn delete_objects_by_prefix(&self, bucket: &str, prefix: &str) -> Result<DeleteResult> {
        let keys = self.list_keys_with_prefix(bucket, Some(prefix)).await?;

        let mut result = DeleteResult::default();
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let objects_to_delete: Vec<ObjectIdentifier> = chunk
                .iter()
                .filter_map(|key| ObjectIdentifier::builder().key(key).build().ok())
                .collect();

            let delete = aws_sdk_s3::types::Delete::builder()
                .set_objects(Some(objects_to_delete))
                .build()
                .map_err(|e| {
                    AppError::Backend(format!("Failed to build delete request: {:?}", e))
                })?;

            let response = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await?;

            result.deleted += response.deleted().len();
            result.errors.extend(response.errors().iter().map(|err| {
                FailedItem::new(
                    err.key().unwrap_or_default(),
                    err.message().unwrap_or_default(),
                )
            }));
        }

        Ok(result)
    }

    async fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        let copy_source = format!("{}/{}", bucket, urlencoding::encode(source_key));

        self.client
            .copy_object()
            .bucket(bucket)
            .key(dest_key)
            .copy_source(copy_source)
            .send()
            .await?;
        Ok(())
    }
}
