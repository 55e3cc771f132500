use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::IngestError;

const ARCHIVE_PREFIX: &str = "gmail-inbox";

/// One invocation's input. Missing or null fields deserialize as empty so
/// that validation, not parsing, decides whether the request is usable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageFilter {
    pub since_epoch_seconds: i64,
    pub keyword_expression: String,
}

impl MessageFilter {
    /// Server-side search query understood by the message store.
    pub fn query(&self) -> String {
        format!("after:{} {}", self.since_epoch_seconds, self.keyword_expression)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageSummary {
    pub id: String,
}

/// Provider message document exactly as returned by a full fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMessage(pub serde_json::Value);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub snippet: String,
    pub label_ids: Vec<String>,
}

/// The archived document. Field order and names are consumed downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub user_id: String,
    pub fetched_at: String,
    pub email_count: usize,
    pub emails: Vec<MessageRecord>,
}

impl IngestResult {
    pub fn new(user_id: &str, fetched_at: DateTime<Utc>, emails: Vec<MessageRecord>) -> Self {
        Self {
            user_id: user_id.to_string(),
            fetched_at: iso_timestamp(fetched_at),
            email_count: emails.len(),
            emails,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveLocation {
    pub bucket: String,
    pub key: String,
}

impl ArchiveLocation {
    /// Builds the write-once key for an invocation. Fails before anything is
    /// written when no bucket is configured.
    pub fn new(
        bucket: Option<&str>,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Self, IngestError> {
        let bucket = bucket
            .filter(|b| !b.is_empty())
            .ok_or_else(|| IngestError::Config("S3 bucket not configured".into()))?;
        let stamp = iso_timestamp(at).replace([':', '.'], "-");
        Ok(Self {
            bucket: bucket.to_string(),
            key: format!("{ARCHIVE_PREFIX}/{user_id}/{stamp}.json"),
        })
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// What the caller learns about a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestOutcome {
    pub email_count: usize,
    pub skipped_count: usize,
    pub location: ArchiveLocation,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2025-03-01T09:15:42.120Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 15, 42).unwrap() + chrono::Duration::milliseconds(120)
    }

    #[test]
    fn archive_key_replaces_colons_and_dots() {
        let location = ArchiveLocation::new(Some("receipts"), "u1", at()).unwrap();
        assert_eq!(location.key, "gmail-inbox/u1/2025-03-01T09-15-42-120Z.json");
        assert_eq!(
            location.to_string(),
            "s3://receipts/gmail-inbox/u1/2025-03-01T09-15-42-120Z.json"
        );
    }

    #[test]
    fn archive_location_requires_bucket() {
        let err = ArchiveLocation::new(None, "u1", at()).unwrap_err();
        assert_eq!(err, IngestError::Config("S3 bucket not configured".into()));
    }

    #[test]
    fn result_count_tracks_emails() {
        let emails = vec![MessageRecord::default(), MessageRecord::default()];
        let result = IngestResult::new("u1", at(), emails);
        assert_eq!(result.email_count, 2);
        assert_eq!(result.fetched_at, "2025-03-01T09:15:42.120Z");
    }

    #[test]
    fn result_serializes_with_camel_case_fields() {
        let record = MessageRecord {
            id: "m1".into(),
            thread_id: "t1".into(),
            label_ids: vec!["INBOX".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(IngestResult::new("u1", at(), vec![record])).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["emailCount"], 1);
        assert_eq!(json["emails"][0]["threadId"], "t1");
        assert_eq!(json["emails"][0]["labelIds"][0], "INBOX");
    }

    #[test]
    fn request_tolerates_missing_fields() {
        let req: IngestRequest = serde_json::from_str(r#"{"userId":"u1"}"#).unwrap();
        assert_eq!(req.user_id, "u1");
        assert!(req.access_token.is_empty());
        assert!(req.refresh_token.is_none());
    }

    #[test]
    fn null_fields_deserialize_as_missing() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"userId":"u1","accessToken":null,"refreshToken":null}"#)
                .unwrap();
        assert_eq!(req.user_id, "u1");
        assert!(req.access_token.is_empty());
        assert!(req.refresh_token.is_none());

        let req: IngestRequest =
            serde_json::from_str(r#"{"userId":null,"accessToken":"tok"}"#).unwrap();
        assert!(req.user_id.is_empty());
        assert_eq!(req.access_token, "tok");
    }
}
