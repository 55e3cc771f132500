use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::errors::{IngestError, IngestResult};
use crate::types::ArchiveLocation;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Write-once durable storage for ingestion results.
#[async_trait]
pub trait ArchiveWriter: Send + Sync {
    async fn write(
        &self,
        location: &ArchiveLocation,
        content: Vec<u8>,
        content_type: &str,
    ) -> IngestResult<()>;
}

#[derive(Clone, Debug)]
pub struct S3Archive {
    /// Inner S3 client
    inner: aws_sdk_s3::Client,
}

impl S3Archive {
    pub fn new(inner: aws_sdk_s3::Client) -> Self {
        Self { inner }
    }

    /// Builds a client for `region` from the ambient AWS credential chain.
    pub async fn from_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config))
    }
}

#[async_trait]
impl ArchiveWriter for S3Archive {
    #[tracing::instrument(skip(self, content), fields(bytes = content.len()))]
    async fn write(
        &self,
        location: &ArchiveLocation,
        content: Vec<u8>,
        content_type: &str,
    ) -> IngestResult<()> {
        self.inner
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| {
                IngestError::Transient(format!(
                    "writing {location}: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
