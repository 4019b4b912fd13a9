//! The object-store surface the core depends on.
//!
//! Keys are flat strings; `/` is only lexical. Implementations must treat every
//! call as a remote, possibly slow, possibly failing operation.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::error::{FailedItem, Result};

/// Callback for byte-level transfer progress.
pub trait ProgressCallback: Send + Sync {
    /// Called on every chunk boundary with the running byte count.
    fn on_progress(&self, bytes_transferred: u64, total_bytes: u64);
}

impl<F> ProgressCallback for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, bytes_transferred: u64, total_bytes: u64) {
        self(bytes_transferred, total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// One object from a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One level of a delimited listing: the objects directly under the prefix and
/// the sub-prefixes ("folders"), each ending with the delimiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixListing {
    pub objects: Vec<ObjectSummary>,
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted: usize,
    pub errors: Vec<FailedItem>,
}

/// Where upload bytes come from.
#[derive(Debug, Clone)]
pub enum ByteSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

impl ByteSource {
    pub async fn len(&self) -> Result<u64> {
        match self {
            ByteSource::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
            ByteSource::Memory(data) => Ok(data.len() as u64),
        }
    }

    /// Base name of a file source; names upload items and their keys.
    pub fn name(&self) -> Option<String> {
        match self {
            ByteSource::File(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string()),
            ByteSource::Memory(_) => None,
        }
    }

    pub async fn read_all(self) -> Result<Vec<u8>> {
        match self {
            ByteSource::File(path) => Ok(tokio::fs::read(&path).await?),
            ByteSource::Memory(data) => Ok(data),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Every key in the bucket, no prefix or delimiter restriction.
    async fn list_all_keys(&self, bucket: &str) -> Result<Vec<String>>;

    /// Every key starting with `prefix`, at any depth.
    async fn list_keys_under(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let keys = self.list_all_keys(bucket).await?;
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    /// Keys exactly one level below `prefix`, plus sub-prefixes.
    async fn list_prefixed(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<PrefixListing>;

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Streams the object into `sink`, returning the number of bytes written.
    async fn get_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<u64>;

    /// The first `max_bytes` bytes of the object.
    async fn get_object_head(&self, bucket: &str, key: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.get_object_bytes(bucket, key, &mut buffer, None).await?;
        buffer.truncate(max_bytes as usize);
        Ok(buffer)
    }

    async fn put_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        source: ByteSource,
        content_type: Option<&str>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn delete_objects_by_prefix(&self, bucket: &str, prefix: &str) -> Result<DeleteResult>;

    async fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()>;

    /// Copy followed by delete of the source. Not atomic: a failed delete
    /// leaves both keys in place.
    async fn move_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.copy_object(bucket, source_key, dest_key).await?;
        self.delete_object(bucket, source_key).await
    }
}
