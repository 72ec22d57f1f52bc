use plan_engine::TraceEntry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Digests over one orchestration trace. The shape digest covers only who
/// talked to whom, in order, so replays of the same plan compare equal even
/// when the returned data differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceAudit {
    pub entries: usize,
    pub shape_digest: Option<String>,
    pub content_digest: Option<String>,
}

impl TraceAudit {
    pub fn of(trace: &[TraceEntry]) -> Self {
        Self {
            entries: trace.len(),
            shape_digest: shape_digest(trace),
            content_digest: content_digest(trace),
        }
    }

    pub fn same_shape(&self, other: &TraceAudit) -> bool {
        self.shape_digest == other.shape_digest
    }
}

pub fn shape_digest(trace: &[TraceEntry]) -> Option<String> {
    let hashes: Vec<String> = trace
        .iter()
        .map(|entry| {
            hash_json(&json!({
                "sender": entry.sender,
                "recipient": entry.recipient,
            }))
        })
        .collect();
    root_hash(b"helpdesk-trace-shape-v1", &hashes)
}

pub fn content_digest(trace: &[TraceEntry]) -> Option<String> {
    let hashes: Vec<String> = trace
        .iter()
        .map(|entry| {
            hash_json(&json!({
                "sender": entry.sender,
                "recipient": entry.recipient,
                "content": entry.content,
            }))
        })
        .collect();
    root_hash(b"helpdesk-trace-content-v1", &hashes)
}

fn root_hash(domain: &[u8], hashes: &[String]) -> Option<String> {
    if hashes.is_empty() {
        return None;
    }

    let mut digest = Sha256::new();
    digest.update(domain);
    for hash in hashes {
        digest.update(hash.as_bytes());
    }
    Some(hex::encode(digest.finalize()))
}

fn hash_json(value: &serde_json::Value) -> String {
    let mut sha = Sha256::new();
    sha.update(value.to_string().as_bytes());
    hex::encode(sha.finalize())
}
