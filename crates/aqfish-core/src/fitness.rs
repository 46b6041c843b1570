use std::sync::Arc;

use aqfish_accountant::{evaluate, DriverProbe, FitnessResult, NodeSlots};
use aqfish_config::DriversConfig;
use aqfish_domain::{Definition, Label, NodeUid, ResourceRequest};
use aqfish_driver::DriverRegistry;
use aqfish_store::StateStore;

use crate::error::CoreError;

/// Bridges the live driver registry, configuration, and store into the pure
/// [`aqfish_accountant::evaluate`] decision (§4.2). Each definition's probe
/// is resolved fresh so a driver going into maintenance mid-run is honored
/// on the next pickup-loop tick.
pub struct Fitness<'a> {
    pub store: &'a Arc<dyn StateStore>,
    pub registry: &'a Arc<DriverRegistry>,
    pub drivers_config: &'a DriversConfig,
    pub node_uid: NodeUid,
}

impl Fitness<'_> {
    /// Sum of resources already committed to `driver_key` by this node's
    /// own non-terminal Applications (§4.2d).
    async fn owned_for_driver(&self, driver_key: &str) -> Result<ResourceRequest, CoreError> {
        let mut owned = ResourceRequest::default();
        for resource in self.store.list_application_resources_by_node(&self.node_uid).await? {
            let Some(app) = self.store.get_application(&resource.application_uid).await? else {
                continue;
            };
            let Some(status) = self.store.current_status(&resource.application_uid).await? else {
                continue;
            };
            if status.is_terminal() {
                continue;
            }
            let Some(label) = self.store.get_label(&app.label_uid).await? else {
                continue;
            };
            let Some(definition) = label.definitions.get(resource.definition_index) else {
                continue;
            };
            if definition.driver_key() == driver_key {
                owned = owned.saturating_add(&definition.resources);
            }
        }
        Ok(owned)
    }

    async fn probe(&self, definition: &Definition) -> Result<DriverProbe, CoreError> {
        let key = definition.driver_key();
        let cfg = self.drivers_config.get(&key);
        let Some(cfg) = cfg else {
            return Ok(DriverProbe {
                enabled: false,
                maintenance: false,
                is_remote: false,
                available_capacity: 0,
                owned: ResourceRequest::default(),
                limit: None,
            });
        };

        let driver = match self.registry.for_key(&key) {
            Ok(driver) => driver,
            Err(_) => {
                return Ok(DriverProbe {
                    enabled: false,
                    maintenance: false,
                    is_remote: cfg.is_remote,
                    available_capacity: 0,
                    owned: ResourceRequest::default(),
                    limit: None,
                })
            }
        };

        let available_capacity = driver.available_capacity(definition).await?.0;
        let limit = match (cfg.cpu_limit, cfg.ram_limit) {
            (None, None) => None,
            (cpu, ram) => Some(ResourceRequest {
                cpu: cpu.unwrap_or(u32::MAX),
                ram: ram.unwrap_or(u32::MAX),
                disks: u32::MAX,
            }),
        };

        Ok(DriverProbe {
            enabled: true,
            maintenance: false,
            is_remote: cfg.is_remote || driver.is_remote(),
            available_capacity,
            owned: self.owned_for_driver(&key).await?,
            limit,
        })
    }

    /// Evaluate `label`'s definitions in order and return the first fit
    /// (§4.2). `node_slots` is the caller's current global-slot snapshot.
    pub async fn evaluate(
        &self,
        node_slots: NodeSlots,
        label: &Label,
    ) -> Result<FitnessResult, CoreError> {
        let mut probes = Vec::with_capacity(label.definitions.len());
        for definition in &label.definitions {
            probes.push(self.probe(definition).await?);
        }
        let mut iter = probes.into_iter();
        Ok(evaluate(node_slots, label, move |_| {
            iter.next().expect("one probe per definition")
        })?)
    }
}
