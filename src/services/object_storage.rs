//! Object storage backends for model files.
//!
//! Model files live in an object store addressed by string keys such as
//! `tenants/{tenant}/models/{model}/versions/{version}/{name}.stl`:
//!
//! - **Filesystem**: keys map to paths under a base directory; download URLs
//!   are HMAC-signed links served by an external web server.
//! - **S3**: any S3-compatible service; download URLs are presigned.
//!
//! The backend is configured via `[storage]` in the config.

use std::{collections::HashMap, future::Future, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "s3-storage")]
use crate::config::S3StorageConfig;
use crate::config::{FilesystemStorageConfig, ObjectStorageBackend, StorageConfig};

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum ObjectStorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type ObjectStorageResult<T> = Result<T, ObjectStorageError>;

/// A key that could not be deleted, with the backend's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub key: String,
    pub error: String,
}

/// Outcome of a batch delete. Keys that were already absent count as deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteFilesResult {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDelete>,
}

impl DeleteFilesResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: DeleteFilesResult) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilesPage {
    pub files: Vec<StoredObject>,
    /// Pass back to fetch the next page. Set only when `is_truncated`.
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// Trait for object storage backends.
///
/// Implementations must be `Send + Sync` to support async contexts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object, replacing any existing object at `key`.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> ObjectStorageResult<()>;

    async fn exists(&self, key: &str) -> ObjectStorageResult<bool>;

    /// Time-limited URL from which the object can be downloaded directly.
    async fn generate_download_url(&self, key: &str, ttl_minutes: u32)
    -> ObjectStorageResult<String>;

    /// Delete many objects. Per-key failures are reported, not raised;
    /// an `Err` means the backend could not be reached at all.
    async fn delete_files(&self, keys: &[String]) -> ObjectStorageResult<DeleteFilesResult>;

    /// List objects under `prefix` in key order.
    async fn list_files(
        &self,
        prefix: &str,
        limit: usize,
        continuation_token: Option<String>,
    ) -> ObjectStorageResult<ListFilesPage>;

    /// Bucket (or logical store name) recorded on file rows.
    fn bucket(&self) -> &str;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

/// Run a storage call under a deadline.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> ObjectStorageResult<T>
where
    F: Future<Output = ObjectStorageResult<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ObjectStorageError::Timeout(timeout))?
}

fn validate_key(key: &str) -> ObjectStorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part == ".." || part == ".")
    {
        return Err(ObjectStorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Filesystem object storage backend.
///
/// Objects are stored as `{base_path}/{key}`. Writes go to a hidden temp file
/// that is renamed into place, so readers never see partial content.
pub struct FilesystemObjectStorage {
    config: FilesystemStorageConfig,
}

impl FilesystemObjectStorage {
    pub fn new(config: FilesystemStorageConfig) -> ObjectStorageResult<Self> {
        let storage = Self { config };

        // Ensure the storage directory exists if create_dir is enabled
        if storage.config.create_dir {
            let path = PathBuf::from(&storage.config.path);
            if !path.exists() {
                info!(path = %storage.config.path, "Creating object storage directory");
                std::fs::create_dir_all(&path)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(
                        &path,
                        std::fs::Permissions::from_mode(storage.config.dir_mode),
                    )?;
                }
            }
        }

        Ok(storage)
    }

    fn object_path(&self, key: &str) -> ObjectStorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.config.object_path(key))
    }

    fn sign(&self, secret: &str, key: &str, expires: i64) -> ObjectStorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ObjectStorageError::Config(format!("Invalid signing secret: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a download signature produced by `generate_download_url`.
    ///
    /// Always `false` when no signing secret is configured.
    pub fn verify_download_signature(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(secret) = &self.config.signing_secret else {
            return false;
        };
        if now.timestamp() > expires {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    async fn ensure_parent(&self, path: &std::path::Path) -> ObjectStorageResult<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if tokio::fs::metadata(parent).await.is_ok() {
            return Ok(());
        }
        tokio::fs::create_dir_all(parent).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                parent,
                std::fs::Permissions::from_mode(self.config.dir_mode),
            )
            .await?;
        }
        Ok(())
    }

    /// Every stored key below `dir`, unsorted. Hidden temp files are skipped.
    async fn walk(&self, dir: PathBuf) -> ObjectStorageResult<Vec<StoredObject>> {
        let base = PathBuf::from(&self.config.path);
        let mut stack = vec![dir];
        let mut objects = Vec::new();

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    stack.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                objects.push(StoredObject {
                    key,
                    size_bytes: metadata.len() as i64,
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        Ok(objects)
    }
}

#[async_trait]
impl ObjectStorage for FilesystemObjectStorage {
    #[instrument(skip(self, data, metadata), fields(size = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> ObjectStorageResult<()> {
        let path = self.object_path(key)?;
        debug!(key, content_type, path = %path.display(), "Storing object on filesystem");
        self.ensure_parent(&path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ObjectStorageError::InvalidKey(key.to_string()))?;
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        tokio::fs::write(&temp_path, &data).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &temp_path,
                std::fs::Permissions::from_mode(self.config.file_mode),
            )
            .await?;
        }

        tokio::fs::rename(&temp_path, &path).await?;

        debug!(key, metadata_entries = metadata.len(), "Object stored");
        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectStorageResult<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn generate_download_url(
        &self,
        key: &str,
        ttl_minutes: u32,
    ) -> ObjectStorageResult<String> {
        validate_key(key)?;
        let base = self.config.public_base_url.trim_end_matches('/');

        match &self.config.signing_secret {
            Some(secret) => {
                let expires =
                    (Utc::now() + chrono::Duration::minutes(i64::from(ttl_minutes))).timestamp();
                let signature = self.sign(secret, key, expires)?;
                Ok(format!(
                    "{}/{}?expires={}&signature={}",
                    base, key, expires, signature
                ))
            }
            None => Ok(format!("{}/{}", base, key)),
        }
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_files(&self, keys: &[String]) -> ObjectStorageResult<DeleteFilesResult> {
        let mut result = DeleteFilesResult::default();

        for key in keys {
            let path = match self.object_path(key) {
                Ok(path) => path,
                Err(e) => {
                    result.failed.push(FailedDelete {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match tokio::fs::remove_file(&path).await {
                Ok(()) => result.deleted.push(key.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(key, "Object already absent");
                    result.deleted.push(key.clone());
                }
                Err(e) => {
                    warn!(key, error = %e, "Failed to delete object");
                    result.failed.push(FailedDelete {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    async fn list_files(
        &self,
        prefix: &str,
        limit: usize,
        continuation_token: Option<String>,
    ) -> ObjectStorageResult<ListFilesPage> {
        // Walk from the deepest directory fully named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            PathBuf::from(&self.config.path)
        } else {
            self.object_path(dir_part)?
        };

        let mut objects: Vec<StoredObject> = self
            .walk(start)
            .await?
            .into_iter()
            .filter(|o| o.key.starts_with(prefix))
            .filter(|o| {
                continuation_token
                    .as_deref()
                    .is_none_or(|after| o.key.as_str() > after)
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let is_truncated = objects.len() > limit;
        objects.truncate(limit);
        let continuation_token = if is_truncated {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListFilesPage {
            files: objects,
            continuation_token,
            is_truncated,
        })
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

/// S3-compatible object storage backend.
///
/// Supports AWS S3, MinIO, Cloudflare R2 and other S3-compatible services.
///
/// Requires the `s3-storage` feature.
#[cfg(feature = "s3-storage")]
pub struct S3ObjectStorage {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

/// Maximum keys accepted by one DeleteObjects request.
#[cfg(feature = "s3-storage")]
const S3_DELETE_BATCH: usize = 1000;

#[cfg(feature = "s3-storage")]
impl S3ObjectStorage {
    pub async fn new(config: S3StorageConfig) -> ObjectStorageResult<Self> {
        info!(bucket = %config.bucket, "Initializing S3 object storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None, // session token
                None, // expiry
                "printshelf-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { config, client })
    }

    async fn delete_batch(&self, keys: &[String]) -> ObjectStorageResult<DeleteFilesResult> {
        use aws_sdk_s3::types::{Delete, ObjectIdentifier};

        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(self.config.object_key(key))
                    .build()
                    .map_err(|e| ObjectStorageError::S3(e.to_string()))
            })
            .collect::<ObjectStorageResult<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| ObjectStorageError::S3(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.config.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| ObjectStorageError::S3(e.to_string()))?;

        // Quiet mode reports only failures.
        let failed: Vec<FailedDelete> = output
            .errors()
            .iter()
            .filter_map(|err| {
                err.key().map(|object_key| FailedDelete {
                    key: self.config.logical_key(object_key).to_string(),
                    error: err
                        .message()
                        .or(err.code())
                        .unwrap_or("unknown error")
                        .to_string(),
                })
            })
            .collect();

        let deleted = keys
            .iter()
            .filter(|key| !failed.iter().any(|f| &f.key == *key))
            .cloned()
            .collect();

        Ok(DeleteFilesResult { deleted, failed })
    }
}

#[cfg(feature = "s3-storage")]
#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    #[instrument(skip(self, data, metadata), fields(size = data.len(), bucket = %self.config.bucket))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> ObjectStorageResult<()> {
        validate_key(key)?;
        let object_key = self.config.object_key(key);
        debug!(key, object_key = %object_key, "Storing object in S3");

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .content_type(content_type)
            .set_metadata(Some(metadata.clone()))
            .body(aws_sdk_s3::primitives::ByteStream::from(data));

        if let Some(storage_class) = &self.config.storage_class {
            request = request.storage_class(storage_class.as_str().into());
        }

        request.send().await.map_err(|e| {
            warn!(key, error = %e, "Failed to upload to S3");
            ObjectStorageError::S3(e.to_string())
        })?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectStorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(self.config.object_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(ObjectStorageError::S3(e.to_string()))
                }
            }
        }
    }

    async fn generate_download_url(
        &self,
        key: &str,
        ttl_minutes: u32,
    ) -> ObjectStorageResult<String> {
        let presigning = aws_sdk_s3::presigning::PresigningConfig::expires_in(
            Duration::from_secs(u64::from(ttl_minutes) * 60),
        )
        .map_err(|e| ObjectStorageError::Config(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.config.object_key(key))
            .presigned(presigning)
            .await
            .map_err(|e| ObjectStorageError::S3(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    #[instrument(skip(self, keys), fields(count = keys.len(), bucket = %self.config.bucket))]
    async fn delete_files(&self, keys: &[String]) -> ObjectStorageResult<DeleteFilesResult> {
        let mut result = DeleteFilesResult::default();
        for chunk in keys.chunks(S3_DELETE_BATCH) {
            result.merge(self.delete_batch(chunk).await?);
        }
        Ok(result)
    }

    async fn list_files(
        &self,
        prefix: &str,
        limit: usize,
        continuation_token: Option<String>,
    ) -> ObjectStorageResult<ListFilesPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(self.config.object_key(prefix))
            .max_keys(limit.min(1000) as i32)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| ObjectStorageError::S3(e.to_string()))?;

        let files = output
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|object_key| StoredObject {
                    key: self.config.logical_key(object_key).to_string(),
                    size_bytes: obj.size().unwrap_or(0),
                    last_modified: obj
                        .last_modified()
                        .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())),
                })
            })
            .collect();

        let is_truncated = output.is_truncated() == Some(true);
        Ok(ListFilesPage {
            files,
            continuation_token: if is_truncated {
                output.next_continuation_token().map(|s| s.to_string())
            } else {
                None
            },
            is_truncated,
        })
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Create an object storage backend from configuration.
pub async fn create_object_storage(
    config: &StorageConfig,
) -> ObjectStorageResult<Arc<dyn ObjectStorage>> {
    match config.backend {
        ObjectStorageBackend::Filesystem => {
            let fs_config = config.filesystem_or_default();
            info!(path = %fs_config.path, "Using filesystem object storage backend");
            Ok(Arc::new(FilesystemObjectStorage::new(fs_config)?))
        }
        #[cfg(feature = "s3-storage")]
        ObjectStorageBackend::S3 => {
            let s3_config = config.s3.clone().ok_or_else(|| {
                ObjectStorageError::Config("S3 backend requires [storage.s3] config".to_string())
            })?;
            info!(bucket = %s3_config.bucket, "Using S3 object storage backend");
            Ok(Arc::new(S3ObjectStorage::new(s3_config).await?))
        }
        #[cfg(not(feature = "s3-storage"))]
        ObjectStorageBackend::S3 => Err(ObjectStorageError::Config(
            "S3 object storage backend requires the 's3-storage' feature. \
                Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fs_config(dir: &TempDir, secret: Option<&str>) -> FilesystemStorageConfig {
        FilesystemStorageConfig {
            path: dir.path().to_string_lossy().to_string(),
            signing_secret: secret.map(str::to_string),
            ..FilesystemStorageConfig::default()
        }
    }

    async fn put(storage: &FilesystemObjectStorage, key: &str, body: &'static [u8]) {
        storage
            .put(key, Bytes::from_static(body), "model/stl", &HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_exists_delete() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemObjectStorage::new(fs_config(&dir, None)).unwrap();

        put(&storage, "tenants/t1/models/m1/a.stl", b"solid a").await;
        assert!(storage.exists("tenants/t1/models/m1/a.stl").await.unwrap());
        assert!(!storage.exists("tenants/t1/models/m1/b.stl").await.unwrap());

        let keys = vec![
            "tenants/t1/models/m1/a.stl".to_string(),
            "tenants/t1/models/m1/missing.stl".to_string(),
        ];
        let result = storage.delete_files(&keys).await.unwrap();
        assert_eq!(result.deleted, keys);
        assert!(result.is_complete());
        assert!(!storage.exists("tenants/t1/models/m1/a.stl").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemObjectStorage::new(fs_config(&dir, None)).unwrap();

        let result = storage
            .put(
                "../escape.stl",
                Bytes::from_static(b"x"),
                "model/stl",
                &HashMap::new(),
            )
            .await;
        assert!(matches!(result, Err(ObjectStorageError::InvalidKey(_))));

        let result = storage
            .delete_files(&["/etc/passwd".to_string()])
            .await
            .unwrap();
        assert_eq!(result.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_pages_in_key_order() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemObjectStorage::new(fs_config(&dir, None)).unwrap();

        put(&storage, "tenants/t1/models/m2/b.stl", b"bb").await;
        put(&storage, "tenants/t1/models/m1/a.stl", b"a").await;
        put(&storage, "tenants/t1/models/m1/c.3mf", b"ccc").await;
        put(&storage, "tenants/t2/models/m9/z.stl", b"z").await;

        let first = storage.list_files("tenants/t1/", 2, None).await.unwrap();
        let keys: Vec<&str> = first.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["tenants/t1/models/m1/a.stl", "tenants/t1/models/m1/c.3mf"]
        );
        assert!(first.is_truncated);
        assert_eq!(first.files[1].size_bytes, 3);

        let second = storage
            .list_files("tenants/t1/", 2, first.continuation_token)
            .await
            .unwrap();
        assert_eq!(second.files.len(), 1);
        assert_eq!(second.files[0].key, "tenants/t1/models/m2/b.stl");
        assert!(!second.is_truncated);
        assert!(second.continuation_token.is_none());

        let empty = storage.list_files("tenants/t3/", 10, None).await.unwrap();
        assert!(empty.files.is_empty());
    }

    #[tokio::test]
    async fn test_signed_download_url() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemObjectStorage::new(fs_config(&dir, Some("s3cret"))).unwrap();
        let key = "tenants/t1/models/m1/a.stl";

        let url = storage.generate_download_url(key, 15).await.unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        assert!(parsed.path().ends_with(key));

        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        let expires: i64 = params["expires"].parse().unwrap();
        let signature = &params["signature"];

        assert!(storage.verify_download_signature(key, expires, signature, Utc::now()));
        assert!(!storage.verify_download_signature("tenants/t1/other.stl", expires, signature, Utc::now()));
        let later = Utc::now() + chrono::Duration::minutes(16);
        assert!(!storage.verify_download_signature(key, expires, signature, later));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_error() {
        let result: ObjectStorageResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ObjectStorageError::Timeout(_))));
    }

    #[test]
    fn test_backends_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FilesystemObjectStorage>();
        #[cfg(feature = "s3-storage")]
        assert_send_sync::<S3ObjectStorage>();
    }
}
