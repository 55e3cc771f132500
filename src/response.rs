//! Renders ingestion outcomes into the invocation response returned to the
//! caller. This is the only place errors become status codes.
use serde::Serialize;

use crate::errors::{IngestError, IngestResult};
use crate::types::IngestOutcome;

const SUCCESS_MESSAGE: &str = "Gmail data successfully ingested to S3";
const AUTH_FAILURE: &str = "Gmail authorization expired or revoked";
const GENERIC_FAILURE: &str = "Failed to process Gmail request";

/// `body` carries a JSON document encoded as a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    #[serde(rename_all = "camelCase")]
    Success {
        message: String,
        email_count: usize,
        s3_location: String,
        #[serde(skip_serializing_if = "is_zero")]
        skipped_count: usize,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl InvocationResponse {
    pub fn from_result(result: IngestResult<IngestOutcome>) -> Self {
        match result {
            Ok(outcome) => Self::success(&outcome),
            Err(err) => Self::failure(&err),
        }
    }

    pub fn success(outcome: &IngestOutcome) -> Self {
        Self::render(
            200,
            ResponseBody::Success {
                message: SUCCESS_MESSAGE.to_string(),
                email_count: outcome.email_count,
                s3_location: outcome.location.to_string(),
                skipped_count: outcome.skipped_count,
            },
        )
    }

    pub fn failure(err: &IngestError) -> Self {
        let (status, error, details) = match err {
            IngestError::Validation(msg) => (400, msg.clone(), None),
            IngestError::Config(msg) => (500, msg.clone(), None),
            IngestError::Auth(_) => (401, AUTH_FAILURE.to_string(), Some(err.to_string())),
            _ => (500, GENERIC_FAILURE.to_string(), Some(err.to_string())),
        };
        Self::render(status, ResponseBody::Failure { error, details })
    }

    fn render(status_code: u16, body: ResponseBody) -> Self {
        // ResponseBody only holds strings and integers
        let body = serde_json::to_string(&body).unwrap_or_default();
        Self { status_code, body }
    }
}
