use crate::archive::S3Archive;
use crate::cli::{Cli, Command};
use crate::config::{IngestConfig, OAuthSettings};
use crate::gmail::{GmailClient, RetryingSource};
use crate::ingest::Ingestor;
use crate::oauth;
use crate::response::InvocationResponse;
use crate::types::IngestRequest;
use anyhow::{Context, Result};
use tracing::{info, warn};

pub type LiveIngestor = Ingestor<RetryingSource<GmailClient>, S3Archive>;

/// Wires the production adapters from configuration.
pub async fn build_ingestor(config: &IngestConfig) -> LiveIngestor {
    if config.bucket.is_none() {
        warn!("S3_BUCKET_NAME not configured; ingestion will fail at the archive step");
    }
    let source = RetryingSource::new(
        GmailClient::new(config.gmail_api_base_url.clone()),
        config.retry,
    );
    let archive = S3Archive::from_region(&config.region).await;
    Ingestor::new(source, archive, config)
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Authorize { user_id } => authorize(user_id).await,
        Command::Ingest {
            user_id,
            access_token,
            refresh_token,
        } => {
            let request = IngestRequest {
                user_id,
                access_token,
                refresh_token,
            };
            ingest(&request).await
        }
    }
}

async fn authorize(user_id: String) -> Result<()> {
    let settings = OAuthSettings::from_env().context("loading Google OAuth settings")?;
    let token = oauth::authorize_via_loopback(&settings).await?;
    if token.refresh_token.is_none() {
        warn!("Google did not return a refresh token; enable GOOGLE_OAUTH_FORCE_CONSENT to force one");
    }
    info!(user_id = %user_id, expires_at = ?token.expires_at, "Gmail access granted");

    let request = IngestRequest {
        user_id,
        access_token: token.access_token,
        refresh_token: token.refresh_token,
    };
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

async fn ingest(request: &IngestRequest) -> Result<()> {
    let config = IngestConfig::from_env().context("loading ingest configuration")?;
    let ingestor = build_ingestor(&config).await;
    let response = InvocationResponse::from_result(ingestor.run(request).await);
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status_code != 200 {
        anyhow::bail!("ingestion failed with status {}", response.status_code);
    }
    Ok(())
}
