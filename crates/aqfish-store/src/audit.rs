use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use aqfish_domain::{ApplicationStatus, ApplicationUid, NodeUid};

/// Serialize `value` to canonical JSON (object keys sorted) and return its
/// SHA-256 hex digest. Used by the cluster layer to tell an idempotent
/// re-arrival of a known UID from a divergent-body conflict (§4.5).
pub fn compute_desired_hash<T: Serialize>(value: &T) -> String {
    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    let canonical = sort_json_keys(v);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    format!("{digest:x}")
}

fn sort_json_keys(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_json_keys).collect())
        }
        other => other,
    }
}

/// An append-only log entry recording a store-level event, independent of
/// the per-Application `ApplicationState` history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    ApplicationStateWritten {
        id: Uuid,
        at: DateTime<Utc>,
        application_uid: ApplicationUid,
        status: ApplicationStatus,
    },
    VoteCast {
        id: Uuid,
        at: DateTime<Utc>,
        application_uid: ApplicationUid,
        node_uid: NodeUid,
        available: bool,
    },
    ResourceConflictResolved {
        id: Uuid,
        at: DateTime<Utc>,
        application_uid: ApplicationUid,
        winner_node: NodeUid,
        loser_node: NodeUid,
    },
    CleanupSwept {
        id: Uuid,
        at: DateTime<Utc>,
        applications_removed: usize,
        labels_removed: usize,
    },
}

impl AuditEvent {
    pub fn application_uid(&self) -> Option<ApplicationUid> {
        match self {
            AuditEvent::ApplicationStateWritten { application_uid, .. } => Some(*application_uid),
            AuditEvent::VoteCast { application_uid, .. } => Some(*application_uid),
            AuditEvent::ResourceConflictResolved { application_uid, .. } => Some(*application_uid),
            AuditEvent::CleanupSwept { .. } => None,
        }
    }
}
