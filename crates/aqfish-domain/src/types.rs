use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Defines a UID newtype over `Uuid` whose first 6 bytes always carry the
/// originating Node's prefix (I5), with the two entry points every
/// constructor goes through: `new_derived` and `prefix_of`.
macro_rules! define_uid {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_derived(node_prefix: [u8; 6]) -> Self {
                let mut bytes = *Uuid::new_v4().as_bytes();
                bytes[..6].copy_from_slice(&node_prefix);
                $name(Uuid::from_bytes(bytes))
            }

            pub fn prefix_of(&self) -> [u8; 6] {
                let mut p = [0u8; 6];
                p.copy_from_slice(&self.0.as_bytes()[..6]);
                p
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map($name)
                    .map_err(|_| DomainError::InvalidUid(s.to_string()))
            }
        }
    };
}

define_uid!(NodeUid);
define_uid!(LabelUid);
define_uid!(ApplicationUid);
define_uid!(ApplicationStateUid);
define_uid!(VoteUid);
define_uid!(ApplicationResourceUid);
define_uid!(ApplicationTaskUid);

impl NodeUid {
    /// A node's own UID is self-derived: its prefix is its own leading bytes.
    pub fn new_root() -> Self {
        NodeUid(Uuid::new_v4())
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    pub cpu_limit: Option<u32>,
    pub ram_limit: Option<u32>,
    pub node_slots_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uid: NodeUid,
    pub name: String,
    pub location: String,
    /// Long-term public key; peers pin against this per node name.
    pub pubkey: Vec<u8>,
    pub address: Option<String>,
    pub capacity: NodeCapacity,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub shutdown_pending: bool,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// A node's Votes are always unavailable while in maintenance (§4.5, §4.8).
    pub fn votes_available(&self) -> bool {
        !self.maintenance
    }
}

// ── Label & Definition ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequest {
    pub cpu: u32,
    pub ram: u32,
    #[serde(default)]
    pub disks: u32,
}

impl ResourceRequest {
    pub fn fits_within(&self, other: &ResourceRequest) -> bool {
        self.cpu <= other.cpu && self.ram <= other.ram && self.disks <= other.disks
    }

    pub fn saturating_add(&self, other: &ResourceRequest) -> ResourceRequest {
        ResourceRequest {
            cpu: self.cpu.saturating_add(other.cpu),
            ram: self.ram.saturating_add(other.ram),
            disks: self.disks.saturating_add(other.disks),
        }
    }
}

/// A (driver, resources, options) triple inside a Label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub provider: String,
    /// Named sub-instance of `provider` (e.g. `test/dev`), or None for the default instance.
    pub instance: Option<String>,
    pub resources: ResourceRequest,
    /// Opaque driver options (`fail_allocate`, `delay_available_capacity`, `is_remote`, …).
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Definition {
    /// The registry key this definition resolves to: `provider` or `provider/instance`.
    pub fn driver_key(&self) -> String {
        match &self.instance {
            Some(i) => format!("{}/{}", self.provider, i),
            None => self.provider.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub uid: LabelUid,
    pub name: String,
    /// 0 = temporary, >=1 = versioned and immutable.
    pub version: i64,
    pub owner_name: String,
    pub visible_for: Vec<String>,
    pub remove_at: Option<DateTime<Utc>>,
    /// Ordered candidate definitions; first-fit policy (§4.2).
    pub definitions: Vec<Definition>,
    pub created_at: DateTime<Utc>,
}

impl Label {
    pub fn is_versioned(&self) -> bool {
        self.version >= 1
    }

    pub fn is_temporary(&self) -> bool {
        self.version == 0
    }

    /// I6: eligible for sweeper cleanup.
    pub fn is_eligible_for_cleanup(&self, now: DateTime<Utc>) -> bool {
        self.is_temporary() && self.remove_at.is_some_and(|r| r <= now)
    }

    /// Enforces §4.7's non-privileged Label create/update constraints.
    pub fn validate_for_create(
        &self,
        now: DateTime<Utc>,
        label_remove_at_max: Duration,
        caller_name: &str,
        caller_groups: &[String],
        privileged: bool,
    ) -> Result<(), DomainError> {
        if self.definitions.is_empty() {
            return Err(DomainError::NoDefinitions);
        }
        if privileged {
            return Ok(());
        }
        if self.version != 0 {
            return Err(DomainError::InvalidLabelVersion(self.version));
        }
        let remove_at = self
            .remove_at
            .ok_or(DomainError::TemporaryLabelMissingRemoveAt)?;
        let min = now + Duration::seconds(30);
        let max = now + label_remove_at_max;
        if remove_at < min || remove_at > max {
            return Err(DomainError::RemoveAtOutOfRange {
                remove_at: remove_at.timestamp(),
                min: min.timestamp(),
                max: max.timestamp(),
            });
        }
        if self.visible_for.is_empty() {
            return Err(DomainError::VisibleForEmpty);
        }
        for entry in &self.visible_for {
            if entry != caller_name && !caller_groups.contains(entry) {
                return Err(DomainError::VisibleForNotOwned(entry.clone()));
            }
        }
        Ok(())
    }

    /// `name` may never change across an update (§4.7).
    pub fn validate_for_update(&self, previous: &Label) -> Result<(), DomainError> {
        if self.name != previous.name {
            return Err(DomainError::LabelNameImmutable);
        }
        Ok(())
    }
}

// ── Application & FSM ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub uid: ApplicationUid,
    #[serde(rename = "labelUID")]
    pub label_uid: LabelUid,
    pub owner_name: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    New,
    Elected,
    Allocated,
    Deallocate,
    Deallocated,
    Recalled,
    Error,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deallocated | Self::Recalled | Self::Error)
    }

    /// Valid direct transitions per the FSM edges (§4.1). ERROR is reachable
    /// from any state; all other edges are named explicitly.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        if next == Error {
            return true;
        }
        matches!(
            (self, next),
            (New, Elected)
                | (New, Recalled)
                | (Elected, Allocated)
                | (Elected, New)
                | (Allocated, Deallocate)
                | (Deallocate, Deallocated)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Elected => "ELECTED",
            Self::Allocated => "ALLOCATED",
            Self::Deallocate => "DEALLOCATE",
            Self::Deallocated => "DEALLOCATED",
            Self::Recalled => "RECALLED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Append-only; the most recent entry for an Application UID is its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    pub uid: ApplicationStateUid,
    #[serde(rename = "applicationUID")]
    pub application_uid: ApplicationUid,
    pub status: ApplicationStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// ── Vote ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub uid: VoteUid,
    #[serde(rename = "applicationUID")]
    pub application_uid: ApplicationUid,
    #[serde(rename = "nodeUID")]
    pub node_uid: NodeUid,
    pub available: bool,
    /// Cryptographically-random tie-break value.
    pub rand: u32,
    pub created_at: DateTime<Utc>,
}

// ── ApplicationResource ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResource {
    pub uid: ApplicationResourceUid,
    #[serde(rename = "applicationUID")]
    pub application_uid: ApplicationUid,
    #[serde(rename = "nodeUID")]
    pub node_uid: NodeUid,
    pub definition_index: usize,
    pub identifier: String,
    pub hw_addr: Option<String>,
    pub metadata: serde_json::Value,
    pub authentication: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ── ApplicationTask ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationTaskStatus {
    New,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTask {
    pub uid: ApplicationTaskUid,
    #[serde(rename = "applicationUID")]
    pub application_uid: ApplicationUid,
    /// e.g. "snapshot", "restart".
    pub task: String,
    pub status: ApplicationTaskStatus,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_uid_carries_node_prefix() {
        let prefix = [1, 2, 3, 4, 5, 6];
        let uid = ApplicationUid::new_derived(prefix);
        assert_eq!(uid.prefix_of(), prefix);
    }

    #[test]
    fn new_fsm_transitions() {
        use ApplicationStatus::*;
        assert!(New.can_transition_to(Elected));
        assert!(New.can_transition_to(Recalled));
        assert!(New.can_transition_to(Error));
        assert!(!New.can_transition_to(Allocated));
        assert!(!New.can_transition_to(Deallocated));
    }

    #[test]
    fn elected_fsm_transitions() {
        use ApplicationStatus::*;
        assert!(Elected.can_transition_to(Allocated));
        assert!(Elected.can_transition_to(New));
        assert!(!Elected.can_transition_to(Recalled));
    }

    #[test]
    fn terminal_states() {
        use ApplicationStatus::*;
        assert!(Deallocated.is_terminal());
        assert!(Recalled.is_terminal());
        assert!(Error.is_terminal());
        assert!(!New.is_terminal());
        assert!(!Allocated.is_terminal());
    }

    #[test]
    fn resource_request_fit() {
        let limit = ResourceRequest { cpu: 4, ram: 8, disks: 1 };
        let req = ResourceRequest { cpu: 2, ram: 4, disks: 0 };
        assert!(req.fits_within(&limit));
        let too_big = ResourceRequest { cpu: 5, ram: 9, disks: 0 };
        assert!(!too_big.fits_within(&limit));
    }

    fn sample_label(version: i64, visible_for: Vec<String>, remove_at: Option<DateTime<Utc>>) -> Label {
        Label {
            uid: LabelUid::new_derived([0; 6]),
            name: "ubuntu".into(),
            version,
            owner_name: "alice".into(),
            visible_for,
            remove_at,
            definitions: vec![Definition {
                provider: "test".into(),
                instance: None,
                resources: ResourceRequest { cpu: 1, ram: 2, disks: 0 },
                options: serde_json::Value::Null,
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn non_privileged_create_requires_version_zero() {
        let label = sample_label(1, vec!["alice".into()], Some(Utc::now() + Duration::seconds(60)));
        let err = label
            .validate_for_create(Utc::now(), Duration::seconds(3600), "alice", &[], false)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidLabelVersion(1)));
    }

    #[test]
    fn non_privileged_create_requires_remove_at_in_range() {
        let now = Utc::now();
        let label = sample_label(0, vec!["alice".into()], Some(now + Duration::seconds(5)));
        let err = label
            .validate_for_create(now, Duration::seconds(3600), "alice", &[], false)
            .unwrap_err();
        assert!(matches!(err, DomainError::RemoveAtOutOfRange { .. }));
    }

    #[test]
    fn non_privileged_create_requires_owned_visible_for() {
        let now = Utc::now();
        let label = sample_label(0, vec!["bob".into()], Some(now + Duration::seconds(60)));
        let err = label
            .validate_for_create(now, Duration::seconds(3600), "alice", &[], false)
            .unwrap_err();
        assert!(matches!(err, DomainError::VisibleForNotOwned(_)));
    }

    #[test]
    fn non_privileged_create_accepts_own_group() {
        let now = Utc::now();
        let label = sample_label(0, vec!["team-a".into()], Some(now + Duration::seconds(60)));
        label
            .validate_for_create(now, Duration::seconds(3600), "alice", &["team-a".to_string()], false)
            .unwrap();
    }

    #[test]
    fn privileged_create_skips_all_checks() {
        let label = sample_label(5, vec![], None);
        label
            .validate_for_create(Utc::now(), Duration::seconds(3600), "admin", &[], true)
            .unwrap();
    }

    #[test]
    fn update_rejects_name_change() {
        let original = sample_label(1, vec![], None);
        let mut updated = original.clone();
        updated.name = "debian".into();
        assert!(matches!(
            updated.validate_for_update(&original),
            Err(DomainError::LabelNameImmutable)
        ));
    }
}
