//! Tolerant extraction of typed fields from raw log records.
//!
//! Records arrive as opaque JSON payloads whose fields migrate between a few
//! known nesting levels depending on the message kind: directly on the
//! `message` body, one level inside `message.proposal.message` (PrePrepare,
//! Prepare and Commit wrap a decision-order payload), or inside
//! `message.payload`. Extraction is table-driven: an ordered list of JSON
//! pointer paths per logical field, first integer-typed hit wins. A
//! non-integer value at a higher-priority path does not suppress checking
//! lower-priority paths.
//!
//! Normalization is a pure function of the payload and the current replica
//! count; it performs no I/O.

use serde_json::Value;

/// Log-category marker an outer record must carry to count as a protocol
/// message event. Anything else is unrelated log traffic and is discarded.
const CATEGORY_MARKER: &str = "message-event";

const KIND_PATHS: &[&str] = &["/message/kind", "/kind"];
const PARTICIPANT_PATHS: &[&str] = &["/participant", "/message/participant"];
const RECEIVER_PATHS: &[&str] = &["/receiver", "/message/receiver"];
const VIEW_PATHS: &[&str] = &[
    "/message/view",
    "/message/proposal/message/view",
    "/message/payload/view",
];
const ORDER_PATHS: &[&str] = &[
    "/message/order",
    "/message/proposal/message/order",
    "/message/payload/order",
];
const RANK_PATHS: &[&str] = &[
    "/message/rank",
    "/message/proposal/message/rank",
    "/message/payload/rank",
];
const INDEX_PATHS: &[&str] = &[
    "/message/index",
    "/message/proposal/message/index",
    "/message/payload/index",
];
const TIMESTAMP_PATHS: &[&str] = &["/timestamp", "/message/timestamp"];

/// Fields extracted from one raw record. All fields except `kind` are
/// best-effort.
#[derive(Debug, Clone)]
pub struct NormalizedFields {
    /// Raw kind tag; mapped to a canonical phase by the envelope builder.
    pub kind: String,
    /// Sender id, if the record names one.
    pub participant: Option<i64>,
    /// Resolved receiver id, if the receiver name was recognizable.
    pub receiver: Option<i64>,
    pub view: Option<i64>,
    /// Protocol sequence number (PrePrepare/Prepare/Commit/Reply).
    pub order: Option<i64>,
    /// Client-assigned round counter (ClientRequest/PrePrepare/Reply).
    pub rank: Option<i64>,
    /// Fine-grained tie-break within a phase.
    pub message_index: Option<i64>,
    /// Log timestamp in microseconds.
    pub timestamp: Option<u64>,
    /// The original nested message body, retained for output.
    pub raw_body: Value,
}

/// Parse one raw payload into [`NormalizedFields`], or discard it.
///
/// Discards: non-JSON payloads, non-object payloads, records without the
/// protocol log-category marker, and records with no resolvable kind.
pub fn normalize(raw: &[u8], replica_count: u32) -> Option<NormalizedFields> {
    let record: Value = serde_json::from_slice(raw).ok()?;
    if !record.is_object() {
        return None;
    }
    if record.pointer("/category").and_then(Value::as_str) != Some(CATEGORY_MARKER) {
        return None;
    }

    let kind = first_str(&record, KIND_PATHS)?.to_string();
    let receiver = first_str(&record, RECEIVER_PATHS)
        .and_then(|name| resolve_receiver_name(name, replica_count));

    let raw_body = record
        .pointer("/message")
        .cloned()
        .unwrap_or_else(|| record.clone());

    Some(NormalizedFields {
        kind,
        participant: first_int(&record, PARTICIPANT_PATHS),
        receiver,
        view: first_int(&record, VIEW_PATHS),
        order: first_int(&record, ORDER_PATHS),
        rank: first_int(&record, RANK_PATHS),
        message_index: first_int(&record, INDEX_PATHS),
        timestamp: first_int(&record, TIMESTAMP_PATHS).and_then(|t| u64::try_from(t).ok()),
        raw_body,
    })
}

/// Resolve a receiver name of the form `replica-<n>` or `client-<n>` to a
/// participant id. Replicas map to index `n - 1` (zero-floored); clients are
/// offset past the replica range. Any other shape is unknown.
pub fn resolve_receiver_name(name: &str, replica_count: u32) -> Option<i64> {
    if let Some(n) = name.strip_prefix("replica-").and_then(|s| s.parse::<i64>().ok()) {
        return Some((n - 1).max(0));
    }
    if let Some(n) = name.strip_prefix("client-").and_then(|s| s.parse::<i64>().ok()) {
        return Some(i64::from(replica_count) + (n - 1).max(0));
    }
    None
}

/// First integer-typed value among the given pointer paths.
fn first_int(record: &Value, paths: &[&str]) -> Option<i64> {
    paths
        .iter()
        .find_map(|path| record.pointer(path).and_then(Value::as_i64))
}

/// First string-typed value among the given pointer paths.
fn first_str<'a>(record: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| record.pointer(path).and_then(Value::as_str))
}
