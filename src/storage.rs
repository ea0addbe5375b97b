use async_trait::async_trait;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed blob store for profile images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
}

pub fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn valid_hash(hash: &str) -> bool {
    hash.len() >= 2 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------- local filesystem ----------------
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("BOARD_IMAGE_DIR").unwrap_or_else(|_| "data/images".into()))
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(hash)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        if !valid_hash(hash) { return Err(ImageStoreError::Other(format!("invalid hash '{hash}'"))); }
        let path = self.path_for(hash);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| ImageStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("failed to write image {}: {e}", path.display());
            ImageStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        if !valid_hash(hash) { return Err(ImageStoreError::NotFound); }
        let bytes = tokio::fs::read(self.path_for(hash)).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImageStoreError::NotFound,
            _ => ImageStoreError::Other(e.to_string()),
        })?;
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
}

// ---------------- S3 / MinIO ----------------
#[cfg(feature = "s3-store")]
pub struct S3ImageStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

#[cfg(feature = "s3-store")]
impl S3ImageStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "board-avatars".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing for MinIO without wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);

        if client.head_bucket().bucket(&bucket).send().await.is_err() {
            client
                .create_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("failed to ensure bucket '{bucket}': {e}"))?;
            info!("created bucket '{bucket}'");
        }
        Ok(Self { bucket, client, prefix: "avatars".into() })
    }

    fn key_for(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.prefix, &hash[0..2], hash)
    }
}

#[cfg(feature = "s3-store")]
#[async_trait]
impl ImageStore for S3ImageStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        if !valid_hash(hash) { return Err(ImageStoreError::Other(format!("invalid hash '{hash}'"))); }
        let key = self.key_for(hash);
        if self.client.head_object().bucket(&self.bucket).key(&key).send().await.is_ok() {
            return Err(ImageStoreError::Duplicate);
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime)
            .send()
            .await
            .map_err(|e| {
                error!("put_object failed hash={hash} key={key} bucket={} err={:?}", self.bucket, e);
                ImageStoreError::Other(e.to_string())
            })?;
        Ok(())
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        if !valid_hash(hash) { return Err(ImageStoreError::NotFound); }
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(hash))
            .send()
            .await
            .map_err(|_| ImageStoreError::NotFound)?;
        let data = obj.body.collect().await.map_err(|e| ImageStoreError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
}

/// S3 when the `s3-store` feature is on and `S3_ENDPOINT` is set, local disk otherwise.
pub async fn build_image_store() -> anyhow::Result<Arc<dyn ImageStore>> {
    #[cfg(feature = "s3-store")]
    if std::env::var("S3_ENDPOINT").is_ok() {
        let store = S3ImageStore::new().await?;
        info!("using S3 image store");
        return Ok(Arc::new(store));
    }
    let store = FsImageStore::from_env();
    info!("using filesystem image store at {}", store.root.display());
    Ok(Arc::new(store))
}
