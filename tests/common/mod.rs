//! In-memory object store for driving the core without a backend.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bucket_navigator::error::{AppError, FailedItem, Result};
use bucket_navigator::s3::gateway::{
    BucketInfo, ByteSource, DeleteResult, ObjectMetadata, ObjectStore, ObjectSummary,
    PrefixListing, ProgressCallback,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

/// Operations failure can be injected into, per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Put,
    Get,
    Copy,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Mock object store: bucket -> key -> object.
#[derive(Clone, Default)]
pub struct MockStore {
    objects: Arc<Mutex<HashMap<String, BTreeMap<String, StoredObject>>>>,
    failures: Arc<Mutex<HashSet<(Op, String)>>>,
    /// Listings of these prefixes wait until the gate is opened.
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    /// Number of whole-bucket key listings served.
    full_listings: Arc<AtomicUsize>,
    chunk_size: usize,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            chunk_size: 4,
            ..Default::default()
        }
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default();
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.insert_typed(bucket, key, data, None);
    }

    pub fn insert_typed(&self, bucket: &str, key: &str, data: &[u8], content_type: Option<&str>) {
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    content_type: content_type.map(str::to_string),
                },
            );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.data.clone())
    }

    pub fn fail_on(&self, op: Op, key: &str) {
        self.failures.lock().unwrap().insert((op, key.to_string()));
    }

    pub fn full_listings(&self) -> usize {
        self.full_listings.load(Ordering::SeqCst)
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Hold listings of `prefix` until the returned gate is notified.
    pub fn gate_listing(&self, prefix: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(prefix.to_string(), gate.clone());
        gate
    }

    fn check(&self, op: Op, key: &str) -> Result<()> {
        if self.failures.lock().unwrap().contains(&(op, key.to_string())) {
            return Err(AppError::Backend(format!("injected {:?} failure for {}", op, key)));
        }
        Ok(())
    }

    fn bucket_missing(bucket: &str) -> AppError {
        AppError::Backend(format!("NoSuchBucket: {}", bucket))
    }

    fn report_chunks(&self, total: u64, progress: Option<&dyn ProgressCallback>) {
        if let Some(cb) = progress {
            let mut done = 0u64;
            while done < total {
                done = (done + self.chunk_size as u64).min(total);
                cb.on_progress(done, total);
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let objects = self.objects.lock().unwrap();
        let mut names: Vec<&String> = objects.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| BucketInfo {
                name: name.clone(),
                creation_date: None,
            })
            .collect())
    }

    async fn list_all_keys(&self, bucket: &str) -> Result<Vec<String>> {
        self.full_listings.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        objects
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .ok_or_else(|| Self::bucket_missing(bucket))
    }

    async fn list_keys_under(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().unwrap();
        let bucket_objects = objects.get(bucket).ok_or_else(|| Self::bucket_missing(bucket))?;
        Ok(bucket_objects
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn list_prefixed(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<PrefixListing> {
        let gate = self.gates.lock().unwrap().get(prefix).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let objects = self.objects.lock().unwrap();
        let bucket_objects = objects.get(bucket).ok_or_else(|| Self::bucket_missing(bucket))?;

        let mut listing = PrefixListing::default();
        let mut prefixes = BTreeSet::new();
        for (key, object) in bucket_objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find(delimiter) {
                Some(idx) => {
                    prefixes.insert(format!("{}{}", prefix, &rest[..idx + delimiter.len()]));
                }
                None => listing.objects.push(ObjectSummary {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: None,
                }),
            }
        }
        listing.prefixes = prefixes.into_iter().collect();
        Ok(listing)
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| ObjectMetadata {
                key: key.to_string(),
                size: o.data.len() as u64,
                content_type: o.content_type.clone(),
                last_modified: None,
            })
            .ok_or_else(|| AppError::Backend(format!("NoSuchKey: {}", key)))
    }

    async fn get_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<u64> {
        self.check(Op::Get, key)?;
        let data = self
            .data(bucket, key)
            .ok_or_else(|| AppError::Backend(format!("NoSuchKey: {}", key)))?;

        sink.write_all(&data).await?;
        sink.flush().await?;
        self.report_chunks(data.len() as u64, progress);
        Ok(data.len() as u64)
    }

    async fn put_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        source: ByteSource,
        content_type: Option<&str>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<()> {
        self.check(Op::Put, key)?;
        let data = source.read_all().await?;
        self.report_chunks(data.len() as u64, progress);
        self.insert_typed(bucket, key, &data, content_type);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.check(Op::Delete, key)?;
        if let Some(b) = self.objects.lock().unwrap().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    async fn delete_objects_by_prefix(&self, bucket: &str, prefix: &str) -> Result<DeleteResult> {
        let keys: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();

        let mut result = DeleteResult::default();
        for key in keys {
            match self.delete_object(bucket, &key).await {
                Ok(()) => result.deleted += 1,
                Err(e) => result.errors.push(FailedItem::new(key, e)),
            }
        }
        Ok(result)
    }

    async fn copy_object(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<()> {
        self.check(Op::Copy, source_key)?;
        let mut objects = self.objects.lock().unwrap();
        let b = objects
            .get_mut(bucket)
            .ok_or_else(|| Self::bucket_missing(bucket))?;
        let object = b
            .get(source_key)
            .cloned()
            .ok_or_else(|| AppError::Backend(format!("NoSuchKey: {}", source_key)))?;
        b.insert(dest_key.to_string(), object);
        Ok(())
    }
}
