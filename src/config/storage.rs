//! Object storage configuration for model files.
//!
//! Supports two backends:
//! - **Filesystem**: Store objects under a local directory (default)
//! - **S3**: Store objects in S3-compatible object storage
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! request_timeout_secs = 30
//!
//! [storage.s3]
//! bucket = "printshelf-models"
//! region = "us-east-1"
//! # Credentials via env vars AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
//! # or IAM role
//!
//! [storage.filesystem]
//! path = "/var/lib/printshelf/objects"
//! public_base_url = "https://files.printshelf.example/objects"
//! signing_secret = "${PRINTSHELF_URL_SECRET}"
//! ```

use serde::{Deserialize, Serialize};

/// Object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Storage backend to use.
    #[serde(default)]
    pub backend: ObjectStorageBackend,

    /// Per-call timeout for storage operations, in seconds.
    /// A timed-out call is treated as a failure of that single item.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// S3 configuration (required when backend = "s3").
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,

    /// Filesystem configuration. Defaults apply when omitted.
    #[serde(default)]
    pub filesystem: Option<FilesystemStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStorageBackend::default(),
            request_timeout_secs: default_request_timeout_secs(),
            s3: None,
            filesystem: None,
        }
    }
}

impl StorageConfig {
    /// Validate the storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("storage.request_timeout_secs must be greater than 0".to_string());
        }
        match self.backend {
            ObjectStorageBackend::Filesystem => self.filesystem_or_default().validate(),
            ObjectStorageBackend::S3 => match &self.s3 {
                Some(s3) => s3.validate(),
                None => Err("S3 storage backend requires [storage.s3] configuration".to_string()),
            },
        }
    }

    /// Filesystem settings, falling back to defaults when the table is absent.
    pub fn filesystem_or_default(&self) -> FilesystemStorageConfig {
        self.filesystem.clone().unwrap_or_default()
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStorageBackend {
    /// Objects live under a local directory, keyed by relative path.
    #[default]
    Filesystem,

    /// S3-compatible object storage (AWS S3, MinIO, R2, ...).
    S3,
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// AWS region (e.g., "us-east-1").
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Example for MinIO: "http://localhost:9000"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// AWS secret access key.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and some S3-compatible services.
    #[serde(default)]
    pub force_path_style: bool,

    /// Key prefix for all stored objects, e.g. "prod/".
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Storage class for new objects.
    #[serde(default)]
    pub storage_class: Option<String>,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("key_prefix", &self.key_prefix)
            .field("storage_class", &self.storage_class)
            .finish()
    }
}

impl S3StorageConfig {
    /// Validate S3 configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("S3 bucket name cannot be empty".to_string());
        }
        // Region is required unless using a custom endpoint
        if self.region.is_none() && self.endpoint.is_none() {
            return Err("S3 requires either 'region' or 'endpoint' to be specified".to_string());
        }
        Ok(())
    }

    /// Full object key for a logical storage key.
    pub fn object_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                format!("{}/{}", prefix, key)
            }
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from an object key returned by a listing.
    pub fn logical_key<'a>(&self, object_key: &'a str) -> &'a str {
        match &self.key_prefix {
            Some(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                object_key
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .unwrap_or(object_key)
            }
            None => object_key,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Base directory. Objects are stored as `{path}/{key}`.
    pub path: String,

    /// Logical bucket name recorded on file rows.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Create the directory if it doesn't exist.
    #[serde(default = "default_true")]
    pub create_dir: bool,

    /// File permissions (Unix mode) for new files.
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,

    /// Directory permissions (Unix mode) for new directories.
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,

    /// Base URL under which a web server exposes the storage directory.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Secret used to sign download URLs. Unsigned URLs are generated when unset.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

impl FilesystemStorageConfig {
    /// Validate filesystem configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("Filesystem storage path cannot be empty".to_string());
        }
        if self.bucket.is_empty() {
            return Err("Filesystem storage bucket name cannot be empty".to_string());
        }
        url::Url::parse(&self.public_base_url)
            .map_err(|e| format!("Invalid storage.filesystem.public_base_url: {}", e))?;
        Ok(())
    }

    /// Full path for a storage key.
    pub fn object_path(&self, key: &str) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.path).join(key)
    }
}

impl Default for FilesystemStorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/objects".to_string(),
            bucket: default_bucket(),
            create_dir: true,
            file_mode: default_file_mode(),
            dir_mode: default_dir_mode(),
            public_base_url: default_public_base_url(),
            signing_secret: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bucket() -> String {
    "local".to_string()
}

fn default_file_mode() -> u32 {
    0o600
}

fn default_dir_mode() -> u32 {
    0o700
}

fn default_public_base_url() -> String {
    "http://localhost:8080/objects".to_string()
}
