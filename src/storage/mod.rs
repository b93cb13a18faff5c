//! File storage
//!
//! Uploads go to named buckets on an external object store that returns a
//! public URL. Each bucket has a size limit and an extension allow-list that
//! is checked before any bytes leave the service.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{ConnectError, Result};

const MIB: usize = 1024 * 1024;

/// Upload bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    PitchDecks,
    ProjectImages,
    ProjectVideos,
    KycDocuments,
    Avatars,
}

/// Size and extension constraints for a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    pub max_bytes: usize,
    pub extensions: &'static [&'static str],
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::PitchDecks => "pitch-decks",
            Bucket::ProjectImages => "project-images",
            Bucket::ProjectVideos => "project-videos",
            Bucket::KycDocuments => "kyc-documents",
            Bucket::Avatars => "avatars",
        }
    }

    pub fn policy(&self) -> BucketPolicy {
        match self {
            Bucket::PitchDecks => BucketPolicy {
                max_bytes: 20 * MIB,
                extensions: &["pdf", "ppt", "pptx"],
            },
            Bucket::ProjectImages => BucketPolicy {
                max_bytes: 5 * MIB,
                extensions: &["jpg", "jpeg", "png", "webp"],
            },
            Bucket::ProjectVideos => BucketPolicy {
                max_bytes: 100 * MIB,
                extensions: &["mp4", "mov", "webm"],
            },
            Bucket::KycDocuments => BucketPolicy {
                max_bytes: 10 * MIB,
                extensions: &["pdf", "jpg", "jpeg", "png"],
            },
            Bucket::Avatars => BucketPolicy {
                max_bytes: 2 * MIB,
                extensions: &["jpg", "jpeg", "png", "webp"],
            },
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pitch-decks" => Ok(Bucket::PitchDecks),
            "project-images" => Ok(Bucket::ProjectImages),
            "project-videos" => Ok(Bucket::ProjectVideos),
            "kyc-documents" => Ok(Bucket::KycDocuments),
            "avatars" => Ok(Bucket::Avatars),
            other => Err(format!("unknown bucket '{}'", other)),
        }
    }
}

/// Lower-cased extension of a file name
pub fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Check a file against the bucket policy. Returns the normalized extension.
pub fn validate_upload(bucket: Bucket, file_name: &str, size: usize) -> Result<String> {
    let policy = bucket.policy();

    if size == 0 {
        return Err(ConnectError::validation("file", "Le fichier est vide"));
    }

    if size > policy.max_bytes {
        return Err(ConnectError::validation(
            "file",
            format!(
                "Le fichier dépasse la taille maximale de {} Mo",
                policy.max_bytes / MIB
            ),
        ));
    }

    match extension(file_name) {
        Some(ext) if policy.extensions.contains(&ext.as_str()) => Ok(ext),
        _ => Err(ConnectError::validation(
            "file",
            format!(
                "Format non accepté. Formats autorisés : {}",
                policy.extensions.join(", ")
            ),
        )),
    }
}

/// Content-addressed object path under the owner's folder
pub fn object_path(owner_id: &str, content: &[u8], ext: &str) -> String {
    let digest = hex::encode(Sha256::digest(content));
    format!("{}/{}.{}", owner_id, &digest[..32], ext)
}

pub fn content_type(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Object store returning public URLs
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: Bucket, path: &str, content: Bytes, content_type: &str)
        -> Result<String>;
}

/// Validate, address and upload a file in one step
pub async fn upload_file(
    storage: &dyn ObjectStorage,
    bucket: Bucket,
    owner_id: &str,
    file_name: &str,
    content: Bytes,
) -> Result<String> {
    let ext = validate_upload(bucket, file_name, content.len())?;
    let path = object_path(owner_id, &content, &ext);
    debug!(bucket = %bucket, path = %path, size = content.len(), "Uploading file");
    storage.upload(bucket, &path, content, content_type(&ext)).await
}

/// Configuration for the HTTP object store
#[derive(Debug, Clone)]
pub struct HttpStorageConfig {
    /// Base URL of the storage API (uploads go to `{base}/object/{bucket}/{path}`)
    pub base_url: String,
    /// Base URL for public reads; defaults to `{base}/object/public`
    pub public_url: Option<String>,
    pub service_key: Option<String>,
    pub request_timeout: Duration,
}

/// Object store reached over HTTP
pub struct HttpObjectStorage {
    config: HttpStorageConfig,
    http_client: reqwest::Client,
}

impl HttpObjectStorage {
    pub fn new(config: HttpStorageConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("growest-connect/0.1")
            .build()
            .unwrap_or_default();

        info!(base_url = %config.base_url, "HTTP object storage configured");
        Self {
            config,
            http_client,
        }
    }

    fn encoded_path(path: &str) -> String {
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        let base = self
            .config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("{}/object/public", self.config.base_url.trim_end_matches('/')));
        format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            bucket,
            Self::encoded_path(path)
        )
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/object/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            bucket,
            Self::encoded_path(path)
        );

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(content);
        if let Some(key) = &self.config.service_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::Storage(format!(
                "HTTP {} from storage: {}",
                status, body
            )));
        }

        Ok(self.public_url(bucket, path))
    }
}

/// In-process object store for dev mode and tests
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: DashMap<(Bucket, String), Bytes>,
}

impl MemoryObjectStorage {
    pub fn get(&self, bucket: Bucket, path: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket, path.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        content: Bytes,
        _content_type: &str,
    ) -> Result<String> {
        self.objects.insert((bucket, path.to_string()), content);
        Ok(format!("memory://{}/{}", bucket, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_names_round_trip() {
        for bucket in [
            Bucket::PitchDecks,
            Bucket::ProjectImages,
            Bucket::ProjectVideos,
            Bucket::KycDocuments,
            Bucket::Avatars,
        ] {
            assert_eq!(bucket.as_str().parse::<Bucket>().unwrap(), bucket);
        }
    }

    #[test]
    fn test_rejects_oversize() {
        let err = validate_upload(Bucket::Avatars, "me.png", 2 * MIB + 1).unwrap_err();
        assert_eq!(err.field(), Some("file"));
        assert!(validate_upload(Bucket::Avatars, "me.png", 2 * MIB).is_ok());
    }

    #[test]
    fn test_rejects_unknown_extension() {
        assert!(validate_upload(Bucket::KycDocuments, "id.webp", 10).is_err());
        assert!(validate_upload(Bucket::PitchDecks, "deck", 10).is_err());
        assert_eq!(
            validate_upload(Bucket::KycDocuments, "ID.PDF", 10).unwrap(),
            "pdf"
        );
    }

    #[test]
    fn test_rejects_empty_file() {
        assert!(validate_upload(Bucket::ProjectVideos, "demo.mp4", 0).is_err());
    }

    #[test]
    fn test_object_path_is_content_addressed() {
        let a = object_path("u1", b"hello", "pdf");
        let b = object_path("u1", b"hello", "pdf");
        let c = object_path("u1", b"other", "pdf");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("u1/"));
        assert!(a.ends_with(".pdf"));
    }

    #[test]
    fn test_public_url_encodes_segments() {
        let storage = HttpObjectStorage::new(HttpStorageConfig {
            base_url: "https://files.example.com/storage/v1/".into(),
            public_url: None,
            service_key: None,
            request_timeout: Duration::from_secs(5),
        });
        assert_eq!(
            storage.public_url(Bucket::Avatars, "u 1/a.png"),
            "https://files.example.com/storage/v1/object/public/avatars/u%201/a.png"
        );
    }

    #[tokio::test]
    async fn test_upload_file_validates_before_upload() {
        let storage = MemoryObjectStorage::default();
        let err = upload_file(
            &storage,
            Bucket::ProjectImages,
            "u1",
            "x.gif",
            Bytes::from_static(b"gif"),
        )
        .await;
        assert!(err.is_err());
        assert!(storage.is_empty());

        let url = upload_file(
            &storage,
            Bucket::ProjectImages,
            "u1",
            "x.png",
            Bytes::from_static(b"png"),
        )
        .await
        .unwrap();
        assert!(url.starts_with("memory://project-images/u1/"));
        assert_eq!(storage.len(), 1);
    }
}
