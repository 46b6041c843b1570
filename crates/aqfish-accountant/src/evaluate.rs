use aqfish_domain::{Definition, Label, ResourceRequest};

use crate::error::CapacityError;

/// Snapshot of this node's global slot budget, counting locally-owned
/// non-terminal Applications (I4, §4.2a).
#[derive(Debug, Clone, Copy)]
pub struct NodeSlots {
    pub limit: Option<u32>,
    pub occupied: u32,
}

impl NodeSlots {
    fn has_room(&self) -> bool {
        match self.limit {
            Some(limit) => self.occupied < limit,
            None => true,
        }
    }
}

/// What the driver registry and its configuration say about hosting one
/// Definition right now. The accountant never talks to a driver directly —
/// the caller resolves this per definition (§4.2b-d) and the function below
/// stays a pure decision over the resulting facts.
#[derive(Debug, Clone, Copy)]
pub struct DriverProbe {
    pub enabled: bool,
    pub maintenance: bool,
    /// Remote-mode drivers participate without local CPU/RAM quota enforcement (§4.4).
    pub is_remote: bool,
    /// `Driver::available_capacity(definition)`; 0 means cannot host now.
    pub available_capacity: u32,
    /// Resources already committed to this driver instance by owned, non-terminal Resources.
    pub owned: ResourceRequest,
    /// Driver-instance resource ceiling; `None` means unlimited.
    pub limit: Option<ResourceRequest>,
}

impl DriverProbe {
    fn is_available_for(&self, requested: &ResourceRequest) -> bool {
        if !self.enabled || self.maintenance {
            return false;
        }
        if self.available_capacity == 0 {
            return false;
        }
        if self.is_remote {
            return true;
        }
        match &self.limit {
            Some(limit) => self.owned.saturating_add(requested).fits_within(limit),
            None => true,
        }
    }
}

/// The winning definition plus the driver's own reported score, so callers
/// (the election coordinator) can fold it into a Vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitnessResult {
    pub definition_index: usize,
    pub driver_score: u32,
}

/// First-fit evaluation over a Label's ordered Definitions (§4.2).
///
/// `probe` is called once per definition, in order, and must resolve driver
/// enablement, maintenance state, and current resource usage for that
/// definition's `driver_key()`. The first definition whose probe reports
/// availability wins; its index is returned so it can be persisted as
/// `ApplicationResource::definition_index`.
pub fn evaluate(
    node_slots: NodeSlots,
    label: &Label,
    mut probe: impl FnMut(&Definition) -> DriverProbe,
) -> Result<FitnessResult, CapacityError> {
    if label.definitions.is_empty() {
        return Err(CapacityError::NoDefinitions);
    }
    if let Some(limit) = node_slots.limit {
        if !node_slots.has_room() {
            return Err(CapacityError::NodeSlotsExhausted {
                occupied: node_slots.occupied,
                limit,
            });
        }
    }

    for (index, definition) in label.definitions.iter().enumerate() {
        let result = probe(definition);
        if result.is_available_for(&definition.resources) {
            return Ok(FitnessResult {
                definition_index: index,
                driver_score: result.available_capacity,
            });
        }
    }

    Err(CapacityError::NoAvailableDefinition {
        tried: label.definitions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqfish_domain::LabelUid;
    use chrono::Utc;

    fn label_with(resources: Vec<ResourceRequest>) -> Label {
        Label {
            uid: LabelUid::new_derived([0; 6]),
            name: "test".into(),
            version: 1,
            owner_name: "alice".into(),
            visible_for: vec![],
            remove_at: None,
            definitions: resources
                .into_iter()
                .enumerate()
                .map(|(i, resources)| Definition {
                    provider: "test".into(),
                    instance: Some(format!("inst{i}")),
                    resources,
                    options: serde_json::Value::Null,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn open_probe(available_capacity: u32) -> impl FnMut(&Definition) -> DriverProbe {
        move |_| DriverProbe {
            enabled: true,
            maintenance: false,
            is_remote: false,
            available_capacity,
            owned: ResourceRequest::default(),
            limit: Some(ResourceRequest { cpu: 4, ram: 8, disks: 0 }),
        }
    }

    #[test]
    fn picks_first_fitting_definition() {
        let label = label_with(vec![
            ResourceRequest { cpu: 4, ram: 8, disks: 0 },
            ResourceRequest { cpu: 2, ram: 4, disks: 0 },
        ]);
        let slots = NodeSlots { limit: None, occupied: 0 };
        let result = evaluate(slots, &label, open_probe(5)).unwrap();
        assert_eq!(result.definition_index, 0);
    }

    #[test]
    fn skips_over_limit_definitions() {
        let label = label_with(vec![
            ResourceRequest { cpu: 8, ram: 16, disks: 0 },
            ResourceRequest { cpu: 2, ram: 4, disks: 0 },
        ]);
        let slots = NodeSlots { limit: None, occupied: 0 };
        let result = evaluate(slots, &label, open_probe(5)).unwrap();
        assert_eq!(result.definition_index, 1);
    }

    #[test]
    fn fails_when_node_slots_exhausted() {
        let label = label_with(vec![ResourceRequest { cpu: 1, ram: 1, disks: 0 }]);
        let slots = NodeSlots { limit: Some(2), occupied: 2 };
        let err = evaluate(slots, &label, open_probe(5)).unwrap_err();
        assert!(matches!(err, CapacityError::NodeSlotsExhausted { .. }));
    }

    #[test]
    fn fails_when_no_definition_available() {
        let label = label_with(vec![ResourceRequest { cpu: 99, ram: 99, disks: 0 }]);
        let slots = NodeSlots { limit: None, occupied: 0 };
        let err = evaluate(slots, &label, open_probe(5)).unwrap_err();
        assert!(matches!(err, CapacityError::NoAvailableDefinition { tried: 1 }));
    }

    #[test]
    fn remote_driver_ignores_local_limit() {
        let label = label_with(vec![ResourceRequest { cpu: 999, ram: 999, disks: 0 }]);
        let slots = NodeSlots { limit: None, occupied: 0 };
        let probe = |_: &Definition| DriverProbe {
            enabled: true,
            maintenance: false,
            is_remote: true,
            available_capacity: 1,
            owned: ResourceRequest::default(),
            limit: Some(ResourceRequest { cpu: 4, ram: 8, disks: 0 }),
        };
        let result = evaluate(slots, &label, probe).unwrap();
        assert_eq!(result.definition_index, 0);
    }

    #[test]
    fn disabled_driver_is_skipped() {
        let label = label_with(vec![ResourceRequest { cpu: 1, ram: 1, disks: 0 }]);
        let slots = NodeSlots { limit: None, occupied: 0 };
        let probe = |_: &Definition| DriverProbe {
            enabled: false,
            maintenance: false,
            is_remote: false,
            available_capacity: 5,
            owned: ResourceRequest::default(),
            limit: None,
        };
        let err = evaluate(slots, &label, probe).unwrap_err();
        assert!(matches!(err, CapacityError::NoAvailableDefinition { .. }));
    }
}
