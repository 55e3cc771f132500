//! One-shot ingestion: list candidate messages, fetch them all, normalize,
//! and archive the result as a single JSON document.
use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveWriter, JSON_CONTENT_TYPE};
use crate::config::{FetchPolicy, IngestConfig};
use crate::errors::{IngestError, IngestResult};
use crate::extract::extract_record;
use crate::filter::build_filter;
use crate::gmail::EmailSource;
use crate::types::{
    ArchiveLocation, IngestOutcome, IngestRequest, IngestResult as ArchivedResult, MessageRecord,
    MessageSummary, RawMessage,
};

pub const MISSING_PARAMETERS: &str = "Missing required parameters: userId and accessToken";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Filtering,
    Listing,
    Fetching,
    Normalizing,
    Archiving,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Filtering => "filtering",
            Stage::Listing => "listing",
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::Archiving => "archiving",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct Ingestor<S, A> {
    source: S,
    archive: A,
    bucket: Option<String>,
    max_results: u32,
    deadline: Duration,
    fetch_policy: FetchPolicy,
}

impl<S: EmailSource, A: ArchiveWriter> Ingestor<S, A> {
    pub fn new(source: S, archive: A, config: &IngestConfig) -> Self {
        Self {
            source,
            archive,
            bucket: config.bucket.clone(),
            max_results: config.max_results,
            deadline: config.deadline,
            fetch_policy: config.fetch_policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Runs one invocation. Every failure aborts the whole invocation; nothing
    /// is archived unless all earlier stages succeeded.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn run(&self, request: &IngestRequest) -> IngestResult<IngestOutcome> {
        let mut stage = Stage::Validating;
        let started = Instant::now();

        let result = match validate(request) {
            Err(e) => Err(e),
            Ok(()) => {
                info!(
                    has_refresh_token = request.refresh_token.is_some(),
                    "Processing Gmail request"
                );
                match tokio::time::timeout(self.deadline, self.ingest(request, &mut stage)).await {
                    Ok(result) => result,
                    Err(_) => Err(IngestError::DeadlineExceeded(self.deadline)),
                }
            }
        };

        match &result {
            Ok(outcome) => info!(
                email_count = outcome.email_count,
                skipped = outcome.skipped_count,
                location = %outcome.location,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Gmail ingestion completed"
            ),
            Err(e) => fail(&mut stage, e, started),
        }
        result
    }

    async fn ingest(
        &self,
        request: &IngestRequest,
        stage: &mut Stage,
    ) -> IngestResult<IngestOutcome> {
        let token = request.access_token.as_str();

        advance(stage, Stage::Filtering);
        let filter = build_filter(Utc::now());
        debug!(query = %filter.query(), "Built message filter");

        advance(stage, Stage::Listing);
        let candidates = self
            .source
            .list_candidates(token, &filter, self.max_results)
            .await?;
        info!(candidates = candidates.len(), "Found potential transaction emails");

        advance(stage, Stage::Fetching);
        let (raws, skipped_count) = self.fetch_all(token, &candidates).await?;

        advance(stage, Stage::Normalizing);
        let emails: Vec<MessageRecord> = raws.iter().map(extract_record).collect();
        let fetched_at = Utc::now();
        let archived = ArchivedResult::new(&request.user_id, fetched_at, emails);

        advance(stage, Stage::Archiving);
        let location = ArchiveLocation::new(self.bucket.as_deref(), &request.user_id, fetched_at)?;
        let content = serde_json::to_vec(&archived)
            .map_err(|e| IngestError::Protocol(format!("serializing ingest result: {e}")))?;
        info!(
            email_count = archived.email_count,
            bucket = %location.bucket,
            "Saving emails to archive"
        );
        self.archive
            .write(&location, content, JSON_CONTENT_TYPE)
            .await?;

        advance(stage, Stage::Done);
        Ok(IngestOutcome {
            email_count: archived.email_count,
            skipped_count,
            location,
        })
    }

    /// Fetches every candidate concurrently. Results come back in listing
    /// order regardless of completion order.
    async fn fetch_all(
        &self,
        token: &str,
        candidates: &[MessageSummary],
    ) -> IngestResult<(Vec<RawMessage>, usize)> {
        let fetches = candidates
            .iter()
            .map(|candidate| self.source.fetch_full(token, &candidate.id));

        match self.fetch_policy {
            FetchPolicy::AllOrNothing => Ok((try_join_all(fetches).await?, 0)),
            FetchPolicy::SkipFailed => {
                let results = join_all(fetches).await;
                let mut fetched = Vec::with_capacity(results.len());
                let mut skipped = 0;
                for (candidate, result) in candidates.iter().zip(results) {
                    match result {
                        Ok(raw) => fetched.push(raw),
                        Err(e @ IngestError::Auth(_)) => return Err(e),
                        Err(e) => {
                            warn!(message_id = %candidate.id, error = %e, "Skipping message that failed to fetch");
                            skipped += 1;
                        }
                    }
                }
                Ok((fetched, skipped))
            }
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Ingestion stage");
    *stage = next;
}

// Logs where the invocation stopped and moves it to the terminal state.
fn fail(stage: &mut Stage, err: &IngestError, started: Instant) {
    warn!(
        failed_stage = %stage,
        error = %err,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Gmail ingestion failed"
    );
    *stage = Stage::Failed;
}

fn validate(request: &IngestRequest) -> IngestResult<()> {
    if request.user_id.is_empty() || request.access_token.is_empty() {
        return Err(IngestError::Validation(MISSING_PARAMETERS.into()));
    }
    Ok(())
}
