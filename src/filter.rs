//! Coarse server-side pre-filter for commerce and transaction emails.
use chrono::{DateTime, Duration, Utc};

use crate::types::MessageFilter;

const LOOKBACK_DAYS: i64 = 30;

const SENDER_FRAGMENTS: &[&str] = &["amazon", "uber", "starbucks", "receipt", "order"];
const SUBJECT_TERMS: &[&str] = &["receipt", "order", "invoice", "payment"];

pub fn build_filter(now: DateTime<Utc>) -> MessageFilter {
    let since = now - Duration::days(LOOKBACK_DAYS);

    let terms: Vec<String> = SENDER_FRAGMENTS
        .iter()
        .map(|s| format!("from:*{s}*"))
        .chain(SUBJECT_TERMS.iter().map(|s| format!("subject:{s}")))
        .collect();

    MessageFilter {
        since_epoch_seconds: since.timestamp(),
        keyword_expression: format!("({})", terms.join(" OR ")),
    }
}
