//! In-memory `ObjectStorageClient` implementation.
//!
//! Keys are kept in lexical order per bucket. Besides plain storage it can:
//!
//! - split listings into small pages to exercise continuation tokens
//! - fail the next call(s) of a given operation with an injected error
//! - count calls per operation
//! - lag the visibility of mutations: for `n` probe reads after a mutation,
//!   `get_object` and `list_objects` still report the previous state of the
//!   mutated key (simulated eventual consistency). Content reads and copies
//!   always see the latest state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::{BucketInfo, ListPage, ObjectInfo, ObjectStorageClient};
use crate::types::{ListRequest, UploadSource};

/// Default maximum number of items per listing page.
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 1000;

/// Operations of the in-memory client, for counters and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    GetBucket,
    InsertBucket,
    DeleteBucket,
    GetObject,
    ListObjects,
    InsertObject,
    GetObjectToFile,
    ReadObject,
    DeleteObject,
    CopyObject,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
    updated: i64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct Lagging {
    /// State reported while the mutation is not yet visible.
    previous: Option<StoredObject>,
    reads_left: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    lagging: HashMap<(String, String), Lagging>,
    failures: HashMap<MemoryOperation, VecDeque<StorageError>>,
    calls: HashMap<MemoryOperation, u64>,
    generation: u64,
}

impl MemoryState {
    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, op: MemoryOperation) -> Result<(), StorageError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bucket(&self, bucket: &str) -> Result<&BTreeMap<String, StoredObject>, StorageError> {
        self.buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))
    }

    fn bucket_mut(
        &mut self,
        bucket: &str,
    ) -> Result<&mut BTreeMap<String, StoredObject>, StorageError> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))
    }

    /// Record a mutation of `(bucket, key)` whose previous state was `previous`.
    fn note_mutation(&mut self, lag: u32, bucket: &str, key: &str, previous: Option<StoredObject>) {
        if lag == 0 {
            return;
        }
        let entry = self
            .lagging
            .entry((bucket.to_string(), key.to_string()))
            .or_insert(Lagging {
                previous,
                reads_left: lag,
            });
        entry.reads_left = lag;
    }

    /// The state of a key as seen by a probe read. Consumes one lagged read.
    fn visible(&mut self, bucket: &str, key: &str) -> Option<StoredObject> {
        let id: (String, String) = (bucket.to_string(), key.to_string());
        if let Some(lagging) = self.lagging.get_mut(&id) {
            if lagging.reads_left > 0 {
                lagging.reads_left -= 1;
                return lagging.previous.clone();
            }
            self.lagging.remove(&id);
        }
        self.buckets.get(bucket).and_then(|b| b.get(key)).cloned()
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// In-memory object store.
#[derive(Debug)]
pub struct MemoryStorageClient {
    state: Mutex<MemoryState>,
    page_size: usize,
    visibility_lag: u32,
}

impl Default for MemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageClient {
    /// Create an empty store with no buckets.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_MEMORY_PAGE_SIZE,
            visibility_lag: 0,
        }
    }

    /// Create the given bucket.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.lock().buckets.entry(bucket.into()).or_default();
        self
    }

    /// Limit listing pages to `page_size` items.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Hide each mutation from the next `reads` probe reads of its key.
    pub fn with_visibility_lag(mut self, reads: u32) -> Self {
        self.visibility_lag = reads;
        self
    }

    /// Make the next call of `op` fail with `err`. Multiple injections queue up.
    ///
    /// # Arguments
    /// * `op` - Operation to fail
    /// * `err` - Error to return
    pub fn fail_next(&self, op: MemoryOperation, err: StorageError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Number of calls made to `op` so far (including failed ones).
    pub fn call_count(&self, op: MemoryOperation) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// All keys currently stored in a bucket, ignoring visibility lag.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw content of an object, ignoring visibility lag.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.data.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Error for a missing bucket, with a Cloud Storage style JSON body.
fn missing_bucket(bucket: &str) -> StorageError {
    let message: String = format!("The specified bucket {} does not exist.", bucket);
    let body: serde_json::Value = serde_json::json!({
        "error": {
            "code": 404,
            "message": message,
            "errors": [{ "domain": "global", "reason": "notFound", "message": message }]
        }
    });
    StorageError::Api {
        status: 404,
        code: None,
        message: None,
        body: body.to_string(),
    }
}

fn object_info(bucket: &str, key: &str, object: &StoredObject) -> ObjectInfo {
    ObjectInfo {
        bucket: bucket.to_string(),
        name: key.to_string(),
        size: object.data.len() as u64,
        content_type: object.content_type.clone(),
        updated: Some(object.updated),
        etag: Some(object.generation.to_string()),
    }
}

#[async_trait]
impl ObjectStorageClient for MemoryStorageClient {
    async fn get_bucket(&self, bucket: &str) -> Result<Option<BucketInfo>, StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::GetBucket)?;
        Ok(state.buckets.contains_key(bucket).then(|| BucketInfo {
            name: bucket.to_string(),
        }))
    }

    async fn insert_bucket(&self, _project_id: &str, bucket: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::InsertBucket)?;
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::Api {
                status: 409,
                code: Some("conflict".into()),
                message: Some(format!("Bucket {} already exists", bucket)),
                body: String::new(),
            });
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::DeleteBucket)?;
        if !state.bucket(bucket)?.is_empty() {
            return Err(StorageError::Api {
                status: 409,
                code: Some("conflict".into()),
                message: Some(format!("Bucket {} is not empty", bucket)),
                body: String::new(),
            });
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectInfo>, StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::GetObject)?;
        Ok(state
            .visible(bucket, key)
            .map(|object| object_info(bucket, key, &object)))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: &ListRequest,
    ) -> Result<ListPage, StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::ListObjects)?;

        let mut keys: Vec<String> = state
            .bucket(bucket)?
            .keys()
            .filter(|k| k.starts_with(&request.prefix))
            .cloned()
            .collect();
        let lagged: Vec<String> = state
            .lagging
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(&request.prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.extend(lagged);
        keys.sort();
        keys.dedup();

        let limit: usize = request
            .max_results
            .map(|m| (m as usize).min(self.page_size))
            .unwrap_or(self.page_size)
            .max(1);

        let mut items: Vec<ObjectInfo> = Vec::new();
        let mut next_page_token: Option<String> = None;
        let start_after: Option<&str> = request.page_token.as_deref();

        for key in keys
            .iter()
            .filter(|k| start_after.map_or(true, |token| k.as_str() > token))
        {
            let Some(object) = state.visible(bucket, key) else {
                continue;
            };
            if items.len() == limit {
                next_page_token = items.last().map(|i: &ObjectInfo| i.name.clone());
                break;
            }
            items.push(object_info(bucket, key, &object));
        }

        Ok(ListPage {
            items,
            next_page_token,
        })
    }

    async fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        source: &UploadSource,
        content_type: Option<&str>,
    ) -> Result<ObjectInfo, StorageError> {
        {
            let mut state = self.lock();
            state.enter(MemoryOperation::InsertObject)?;
            state.bucket(bucket)?;
        }

        let data: Vec<u8> = source.read_all().await?;

        let mut state = self.lock();
        let generation: u64 = state.next_generation();
        let object = StoredObject {
            data,
            content_type: content_type.map(str::to_string),
            updated: now_secs(),
            generation,
        };
        let info: ObjectInfo = object_info(bucket, key, &object);
        let previous: Option<StoredObject> = state.bucket_mut(bucket)?.insert(key.to_string(), object);
        state.note_mutation(self.visibility_lag, bucket, key, previous);
        Ok(info)
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<u64, StorageError> {
        let data: Vec<u8> = {
            let mut state = self.lock();
            state.enter(MemoryOperation::GetObjectToFile)?;
            state
                .bucket(bucket)?
                .get(key)
                .map(|o| o.data.clone())
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
        };

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
        }
        tokio::fs::write(file_path, &data)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        Ok(data.len() as u64)
    }

    async fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::ReadObject)?;
        state
            .bucket(bucket)?
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::DeleteObject)?;
        let previous: StoredObject =
            state
                .bucket_mut(bucket)?
                .remove(key)
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
        state.note_mutation(self.visibility_lag, bucket, key, Some(previous));
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.enter(MemoryOperation::CopyObject)?;
        let mut object: StoredObject = state
            .bucket(src_bucket)?
            .get(src_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: src_bucket.to_string(),
                key: src_key.to_string(),
            })?;
        object.generation = state.next_generation();
        object.updated = now_secs();
        let previous: Option<StoredObject> = state
            .bucket_mut(dest_bucket)?
            .insert(dest_key.to_string(), object);
        state.note_mutation(self.visibility_lag, dest_bucket, dest_key, previous);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(data: &str) -> UploadSource {
        UploadSource::Bytes(data.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let client = MemoryStorageClient::new().with_bucket("b");
        let info = client
            .insert_object("b", "a/x.txt", &bytes("hello"), Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(info.size, 5);

        let found = client.get_object("b", "a/x.txt").await.unwrap().unwrap();
        assert_eq!(found.bucket, "b");
        assert_eq!(found.name, "a/x.txt");
        assert_eq!(found.content_type.as_deref(), Some("text/plain"));
        assert!(client.get_object("b", "a/y.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_into_missing_bucket_fails_with_json_body() {
        let client = MemoryStorageClient::new();
        let err = client
            .insert_object("nope", "k", &bytes("x"), None)
            .await
            .unwrap_err();
        match err {
            StorageError::Api { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("notFound"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_paginates_in_key_order() {
        let client = MemoryStorageClient::new().with_bucket("b").with_page_size(2);
        for key in ["p/c", "p/a", "p/b", "q/z"] {
            client.insert_object("b", key, &bytes("1"), None).await.unwrap();
        }

        let first = client
            .list_objects("b", &ListRequest::prefix("p/"))
            .await
            .unwrap();
        let names: Vec<&str> = first.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["p/a", "p/b"]);
        assert!(first.next_page_token.is_some());

        let second = client
            .list_objects(
                "b",
                &ListRequest::prefix("p/").with_page_token(first.next_page_token),
            )
            .await
            .unwrap();
        let names: Vec<&str> = second.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["p/c"]);
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_respects_max_results() {
        let client = MemoryStorageClient::new().with_bucket("b");
        for key in ["a", "b", "c"] {
            client.insert_object("b", key, &bytes("1"), None).await.unwrap();
        }
        let page = client
            .list_objects("b", &ListRequest::prefix("").with_max_results(1))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_visibility_lag_hides_new_object() {
        let client = MemoryStorageClient::new()
            .with_bucket("b")
            .with_visibility_lag(2);
        client.insert_object("b", "k", &bytes("x"), None).await.unwrap();

        assert!(client.get_object("b", "k").await.unwrap().is_none());
        assert!(client.get_object("b", "k").await.unwrap().is_none());
        assert!(client.get_object("b", "k").await.unwrap().is_some());
        // Content reads are strongly consistent
        assert_eq!(client.read_object("b", "k").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_visibility_lag_keeps_deleted_object_listed() {
        let client = MemoryStorageClient::new().with_bucket("b");
        client.insert_object("b", "d/k", &bytes("x"), None).await.unwrap();

        let client = client.with_visibility_lag(1);
        client.delete_object("b", "d/k").await.unwrap();

        let page = client.list_objects("b", &ListRequest::prefix("d/")).await.unwrap();
        assert_eq!(page.items.len(), 1);
        let page = client.list_objects("b", &ListRequest::prefix("d/")).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_counters() {
        let client = MemoryStorageClient::new().with_bucket("b");
        client.fail_next(
            MemoryOperation::GetObject,
            StorageError::NetworkError {
                message: "reset".into(),
                retryable: true,
            },
        );

        assert!(client.get_object("b", "k").await.is_err());
        assert!(client.get_object("b", "k").await.is_ok());
        assert_eq!(client.call_count(MemoryOperation::GetObject), 2);
        assert_eq!(client.call_count(MemoryOperation::ListObjects), 0);
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let client = MemoryStorageClient::new().with_bucket("b");
        client.insert_object("b", "src", &bytes("data"), None).await.unwrap();
        client.copy_object("b", "src", "b", "dst").await.unwrap();
        assert_eq!(client.object_data("b", "dst").unwrap(), b"data");

        client.delete_object("b", "src").await.unwrap();
        assert_eq!(client.keys("b"), vec!["dst".to_string()]);

        let err = client.delete_object("b", "src").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_objects_stops_at_first_failure() {
        let client = MemoryStorageClient::new().with_bucket("b");
        for key in ["a", "b", "c"] {
            client.insert_object("b", key, &bytes("1"), None).await.unwrap();
        }
        client.fail_next(
            MemoryOperation::DeleteObject,
            StorageError::Other {
                message: "boom".into(),
            },
        );

        let keys: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert!(client.delete_objects("b", &keys).await.is_err());
        assert_eq!(client.keys("b").len(), 3);

        client.delete_objects("b", &keys).await.unwrap();
        assert!(client.keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_get_object_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = MemoryStorageClient::new().with_bucket("b");
        client.insert_object("b", "k", &bytes("payload"), None).await.unwrap();

        let dest = dir.path().join("nested/out.bin");
        let written = client.get_object_to_file("b", "k", &dest).await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let client = MemoryStorageClient::new();
        assert!(client.get_bucket("b").await.unwrap().is_none());
        client.insert_bucket("proj", "b").await.unwrap();
        assert!(client.get_bucket("b").await.unwrap().is_some());
        assert!(client.insert_bucket("proj", "b").await.is_err());
        client.delete_bucket("b").await.unwrap();
        assert!(client.get_bucket("b").await.unwrap().is_none());
    }
}
