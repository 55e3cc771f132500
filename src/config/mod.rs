use std::env;
use std::time::Duration;

use crate::errors::{IngestError, IngestResult};

/// Hard ceiling on candidates listed per invocation.
pub const MAX_CANDIDATES: u32 = 50;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1";

/// How the orchestrator treats individual message fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Any failed fetch fails the whole invocation.
    #[default]
    AllOrNothing,
    /// Failed fetches are dropped and counted; authorization failures still abort.
    SkipFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per upstream call, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
        }
    }
}

/// Runtime settings for one ingestion deployment. Read once at startup; the
/// destination bucket stays optional so a missing bucket surfaces as a
/// config error at archive time rather than preventing startup.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub bucket: Option<String>,
    pub region: String,
    pub gmail_api_base_url: String,
    pub max_results: u32,
    pub deadline: Duration,
    pub retry: RetryPolicy,
    pub fetch_policy: FetchPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            gmail_api_base_url: DEFAULT_GMAIL_API_BASE_URL.to_string(),
            max_results: MAX_CANDIDATES,
            deadline: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            fetch_policy: FetchPolicy::AllOrNothing,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bucket = lookup("S3_BUCKET_NAME").filter(|b| !b.trim().is_empty());
        let region = lookup("AWS_REGION").unwrap_or(defaults.region);
        let gmail_api_base_url = lookup("GMAIL_API_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.gmail_api_base_url);
        url::Url::parse(&gmail_api_base_url).map_err(|e| {
            IngestError::Config(format!("invalid GMAIL_API_BASE_URL {gmail_api_base_url}: {e}"))
        })?;

        let max_results = parse_var::<u32, _>(&lookup, "INGEST_MAX_RESULTS")?
            .unwrap_or(defaults.max_results)
            .clamp(1, MAX_CANDIDATES);
        let deadline = parse_var::<u64, _>(&lookup, "INGEST_DEADLINE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.deadline);
        let retry = RetryPolicy {
            max_attempts: parse_var::<u32, _>(&lookup, "INGEST_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts)
                .max(1),
            initial_delay: parse_var::<u64, _>(&lookup, "INGEST_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_delay),
        };
        let fetch_policy = match parse_flag(&lookup, "INGEST_SKIP_FAILED_FETCHES")? {
            Some(true) => FetchPolicy::SkipFailed,
            _ => FetchPolicy::AllOrNothing,
        };

        Ok(Self {
            bucket,
            region,
            gmail_api_base_url,
            max_results,
            deadline,
            retry,
            fetch_policy,
        })
    }
}

/// Google OAuth client settings, only needed by the consent flow.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Sends `prompt=consent` so every authorization yields a fresh refresh token.
    pub force_consent: bool,
}

impl OAuthSettings {
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup("GOOGLE_CLIENT_ID")
            .ok_or_else(|| IngestError::Config("GOOGLE_CLIENT_ID missing".into()))?;
        let client_secret = lookup("GOOGLE_CLIENT_SECRET")
            .ok_or_else(|| IngestError::Config("GOOGLE_CLIENT_SECRET missing".into()))?;
        let redirect_uri =
            lookup("GOOGLE_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let force_consent = parse_flag(&lookup, "GOOGLE_OAUTH_FORCE_CONSENT")?.unwrap_or(true);

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            force_consent,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> IngestResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| IngestError::Config(format!("invalid {key}={raw}: {e}"))),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> IngestResult<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(IngestError::Config(format!("invalid {key}={raw}: expected a boolean"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = IngestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bucket, None);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.max_results, 50);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.fetch_policy, FetchPolicy::AllOrNothing);
    }

    #[test]
    fn max_results_is_clamped_to_candidate_cap() {
        let config =
            IngestConfig::from_lookup(lookup_from(&[("INGEST_MAX_RESULTS", "500")])).unwrap();
        assert_eq!(config.max_results, MAX_CANDIDATES);
    }

    #[test]
    fn blank_bucket_counts_as_unset() {
        let config = IngestConfig::from_lookup(lookup_from(&[("S3_BUCKET_NAME", "  ")])).unwrap();
        assert_eq!(config.bucket, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "receipts"),
            ("GMAIL_API_BASE_URL", "http://localhost:9000/gmail/v1/"),
            ("INGEST_RETRY_ATTEMPTS", "0"),
            ("INGEST_RETRY_DELAY_MS", "10"),
            ("INGEST_SKIP_FAILED_FETCHES", "true"),
        ]))
        .unwrap();
        assert_eq!(config.bucket.as_deref(), Some("receipts"));
        assert_eq!(config.gmail_api_base_url, "http://localhost:9000/gmail/v1");
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.fetch_policy, FetchPolicy::SkipFailed);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = IngestConfig::from_lookup(lookup_from(&[("INGEST_DEADLINE_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn oauth_settings_require_client_credentials() {
        let err = OAuthSettings::from_lookup(lookup_from(&[("GOOGLE_CLIENT_ID", "id")]))
            .unwrap_err();
        assert_eq!(err, IngestError::Config("GOOGLE_CLIENT_SECRET missing".into()));
    }

    #[test]
    fn oauth_consent_prompt_is_configurable() {
        let settings = OAuthSettings::from_lookup(lookup_from(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert!(settings.force_consent);

        let settings = OAuthSettings::from_lookup(lookup_from(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_OAUTH_FORCE_CONSENT", "0"),
        ]))
        .unwrap();
        assert!(!settings.force_consent);
    }
}
