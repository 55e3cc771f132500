use serde_json::Value;

use crate::types::{MessageRecord, RawMessage};

/// Normalizes a provider message into the archived record shape. Anything
/// missing or of an unexpected type becomes an empty value; this never fails.
#[tracing::instrument(skip(raw), level = "debug")]
pub fn extract_record(raw: &RawMessage) -> MessageRecord {
    let doc = &raw.0;
    let headers = doc
        .get("payload")
        .and_then(|p| p.get("headers"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    MessageRecord {
        id: string_field(doc, "id"),
        thread_id: string_field(doc, "threadId"),
        subject: header(headers, "Subject"),
        from: header(headers, "From"),
        to: header(headers, "To"),
        date: header(headers, "Date"),
        snippet: string_field(doc, "snippet"),
        label_ids: doc
            .get("labelIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn string_field(doc: &Value, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// First header whose name matches case-insensitively wins.
fn header(headers: &[Value], name: &str) -> String {
    headers
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_headers_and_metadata() {
        let raw = RawMessage(json!({
            "id": "m1",
            "threadId": "t1",
            "snippet": "Your order has shipped",
            "labelIds": ["INBOX", "CATEGORY_UPDATES"],
            "payload": {
                "headers": [
                    {"name": "Subject", "value": "Order #123"},
                    {"name": "From", "value": "Shop <orders@shop.example>"},
                    {"name": "To", "value": "me@example.com"},
                    {"name": "Date", "value": "Sat, 1 Mar 2025 09:15:42 +0000"}
                ]
            }
        }));

        let record = extract_record(&raw);
        assert_eq!(record.id, "m1");
        assert_eq!(record.thread_id, "t1");
        assert_eq!(record.subject, "Order #123");
        assert_eq!(record.from, "Shop <orders@shop.example>");
        assert_eq!(record.to, "me@example.com");
        assert_eq!(record.date, "Sat, 1 Mar 2025 09:15:42 +0000");
        assert_eq!(record.snippet, "Your order has shipped");
        assert_eq!(record.label_ids, vec!["INBOX", "CATEGORY_UPDATES"]);
    }

    #[test]
    fn missing_subject_becomes_empty() {
        let raw = RawMessage(json!({
            "id": "m1",
            "payload": {"headers": [{"name": "From", "value": "a@b.c"}]}
        }));
        let record = extract_record(&raw);
        assert_eq!(record.subject, "");
        assert_eq!(record.from, "a@b.c");
        assert!(record.label_ids.is_empty());
    }

    #[test]
    fn header_lookup_ignores_case_and_prefers_first() {
        let raw = RawMessage(json!({
            "payload": {"headers": [
                {"name": "subject", "value": "first"},
                {"name": "SUBJECT", "value": "second"}
            ]}
        }));
        assert_eq!(extract_record(&raw).subject, "first");
    }

    #[test]
    fn malformed_shapes_fall_back_to_defaults() {
        let raw = RawMessage(json!({
            "id": 42,
            "labelIds": "INBOX",
            "payload": {"headers": {"name": "Subject"}}
        }));
        assert_eq!(extract_record(&raw), MessageRecord::default());

        assert_eq!(
            extract_record(&RawMessage(json!(null))),
            MessageRecord::default()
        );
    }
}
