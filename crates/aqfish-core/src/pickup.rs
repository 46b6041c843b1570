use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use aqfish_accountant::NodeSlots;
use aqfish_config::{Config, DriversConfig, ElectionConfig};
use aqfish_domain::{
    Application, ApplicationResource, ApplicationResourceUid, ApplicationStatus, ApplicationUid,
    NodeUid,
};
use aqfish_driver::DriverRegistry;
use aqfish_store::{AuditEvent, StateStore};

use crate::election::{cast_vote, select_winner};
use crate::error::CoreError;
use crate::fitness::Fitness;
use crate::mailbox::ApplicationMailbox;

/// Drives every Application through the FSM of §4.1 on behalf of one node.
///
/// One `tick()` call is one cooperative pass: vote on newly-seen
/// Applications, close elections whose window has elapsed, allocate for
/// Applications this node won, and retire Applications in DEALLOCATE. The
/// caller is expected to invoke `tick()` on a timer or gossip notification;
/// this struct holds no background task of its own.
pub struct PickupLoop {
    store: Arc<dyn StateStore>,
    registry: Arc<DriverRegistry>,
    drivers_config: DriversConfig,
    election: ElectionConfig,
    allocation_retry: u32,
    node_slots_limit: Option<u32>,
    node_uid: NodeUid,
    maintenance: Arc<AtomicBool>,
    mailbox: Arc<ApplicationMailbox>,
    retry_counts: DashMap<ApplicationUid, AtomicU32>,
}

impl PickupLoop {
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<DriverRegistry>,
        config: &Config,
        node_uid: NodeUid,
        maintenance: Arc<AtomicBool>,
        mailbox: Arc<ApplicationMailbox>,
    ) -> Self {
        Self {
            store,
            registry,
            drivers_config: config.drivers.clone(),
            election: config.election.clone(),
            allocation_retry: config.allocation_retry,
            node_slots_limit: config.node_slots_limit,
            node_uid,
            maintenance,
            mailbox,
            retry_counts: DashMap::new(),
        }
    }

    /// Appends `status` as the Application's next state, validated against
    /// the FSM edges of §3/§4.1 and serialized per-Application against any
    /// concurrent append (e.g. an HTTP-triggered deallocate) through the
    /// shared mailbox (§5).
    async fn append_state(
        &self,
        application_uid: ApplicationUid,
        status: ApplicationStatus,
        description: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.mailbox
            .append_validated(&self.store, application_uid, status, self.node_uid.prefix_of(), description)
            .await
    }

    /// Replays recovery rules on startup (§4.1): ELECTED without a Resource
    /// re-enters NEW (the election was void); ALLOCATED is kept only if its
    /// Resource exists and the driver confirms it; everything terminal stays
    /// terminal; DEALLOCATE is left as-is for the next tick to retry.
    pub async fn recover_on_startup(&self) -> Result<(), CoreError> {
        for app in self.store.list_applications().await? {
            let Some(status) = self.store.current_status(&app.uid).await? else {
                continue;
            };
            match status {
                ApplicationStatus::Elected => {
                    if self.store.get_application_resource(&app.uid).await?.is_none() {
                        info!(application_uid = %app.uid, "recovery: ELECTED without Resource, reverting to NEW");
                        self.append_state(app.uid, ApplicationStatus::New, "recovered: election void").await?;
                    }
                }
                ApplicationStatus::Allocated => {
                    let Some(resource) = self.store.get_application_resource(&app.uid).await? else {
                        warn!(application_uid = %app.uid, "recovery: ALLOCATED without Resource, marking ERROR");
                        self.append_state(app.uid, ApplicationStatus::Error, "recovered: resource missing").await?;
                        continue;
                    };
                    if resource.node_uid != self.node_uid {
                        continue;
                    }
                    match self.registry.for_key(&resource_driver_key(&self.store, &app, &resource).await?) {
                        Ok(driver) => match driver.status(&resource).await {
                            Ok(_) => {}
                            Err(e) => {
                                warn!(application_uid = %app.uid, error = %e, "recovery: driver rejects resource, marking ERROR");
                                self.append_state(app.uid, ApplicationStatus::Error, format!("recovered: driver validation failed: {e}")).await?;
                            }
                        },
                        Err(e) => {
                            warn!(application_uid = %app.uid, error = %e, "recovery: driver not configured, marking ERROR");
                            self.append_state(app.uid, ApplicationStatus::Error, format!("recovered: {e}")).await?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// One cooperative pass over every Application (§4.1).
    pub async fn tick(&self) -> Result<(), CoreError> {
        for app in self.store.list_applications().await? {
            let Some(status) = self.store.current_status(&app.uid).await? else {
                continue;
            };
            match status {
                ApplicationStatus::New => self.process_new(&app).await?,
                ApplicationStatus::Elected => self.process_elected(&app).await?,
                ApplicationStatus::Deallocate => self.process_deallocate(&app).await?,
                _ => {}
            }
        }
        Ok(())
    }

    async fn process_new(&self, app: &Application) -> Result<(), CoreError> {
        let votes = self.store.list_votes(&app.uid).await?;
        let already_voted = votes.iter().any(|v| v.node_uid == self.node_uid);
        if !already_voted {
            let available = !self.maintenance.load(Ordering::Relaxed) && self.fitness_available(app).await?;
            let vote = cast_vote(self.node_uid, app.uid, available);
            self.store.append_vote(&vote).await?;
            self.store
                .append_event(&AuditEvent::VoteCast {
                    id: uuid::Uuid::new_v4(),
                    at: vote.created_at,
                    application_uid: app.uid,
                    node_uid: self.node_uid,
                    available,
                })
                .await?;
            debug!(application_uid = %app.uid, available, "cast vote");
        }

        let window_elapsed = chrono::Utc::now() - app.created_at
            >= chrono::Duration::from_std(self.election.vote_window).unwrap_or_default();
        if !window_elapsed {
            return Ok(());
        }

        let votes = self.store.list_votes(&app.uid).await?;
        let Some(winner) = select_winner(&votes) else {
            return Ok(());
        };
        if winner != self.node_uid {
            return Ok(());
        }
        self.append_state(app.uid, ApplicationStatus::Elected, "won election").await?;
        self.allocate(app).await
    }

    async fn fitness_available(&self, app: &Application) -> Result<bool, CoreError> {
        let Some(label) = self.store.get_label(&app.label_uid).await? else {
            return Ok(false);
        };
        let occupied = self.occupied_slots().await?;
        let fitness = Fitness {
            store: &self.store,
            registry: &self.registry,
            drivers_config: &self.drivers_config,
            node_uid: self.node_uid,
        };
        let slots = NodeSlots { limit: self.node_slots_limit, occupied };
        Ok(fitness.evaluate(slots, &label).await.is_ok())
    }

    async fn occupied_slots(&self) -> Result<u32, CoreError> {
        let mut count = 0u32;
        for resource in self.store.list_application_resources_by_node(&self.node_uid).await? {
            if let Some(status) = self.store.current_status(&resource.application_uid).await? {
                if !status.is_terminal() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn process_elected(&self, app: &Application) -> Result<(), CoreError> {
        if self.store.get_application_resource(&app.uid).await?.is_some() {
            return Ok(());
        }
        self.allocate(app).await
    }

    async fn allocate(&self, app: &Application) -> Result<(), CoreError> {
        let Some(label) = self.store.get_label(&app.label_uid).await? else {
            self.append_state(app.uid, ApplicationStatus::Error, "label missing").await?;
            return Ok(());
        };
        let occupied = self.occupied_slots().await?;
        let fitness = Fitness {
            store: &self.store,
            registry: &self.registry,
            drivers_config: &self.drivers_config,
            node_uid: self.node_uid,
        };
        let slots = NodeSlots { limit: self.node_slots_limit, occupied };
        let result = match fitness.evaluate(slots, &label).await {
            Ok(r) => r,
            Err(e) => {
                self.retry_or_error(app, &format!("no definition available: {e}")).await?;
                return Ok(());
            }
        };
        let definition = &label.definitions[result.definition_index];
        let driver = match self.registry.for_definition(definition) {
            Ok(d) => d,
            Err(e) => {
                self.retry_or_error(app, &e.to_string()).await?;
                return Ok(());
            }
        };

        match driver.allocate(app.uid, definition).await {
            Ok(allocated) => {
                let resource = ApplicationResource {
                    uid: ApplicationResourceUid::new_derived(self.node_uid.prefix_of()),
                    application_uid: app.uid,
                    node_uid: self.node_uid,
                    definition_index: result.definition_index,
                    identifier: allocated.identifier,
                    hw_addr: allocated.hw_addr,
                    metadata: allocated.metadata,
                    authentication: allocated.authentication,
                    created_at: chrono::Utc::now(),
                };
                self.store.upsert_application_resource(&resource).await?;
                self.append_state(app.uid, ApplicationStatus::Allocated, "allocated").await?;
                self.retry_counts.remove(&app.uid);
            }
            Err(e) => self.retry_or_error(app, &e.to_string()).await?,
        }
        Ok(())
    }

    async fn retry_or_error(&self, app: &Application, reason: &str) -> Result<(), CoreError> {
        let count = self
            .retry_counts
            .entry(app.uid)
            .or_insert_with(|| AtomicU32::new(0));
        let attempts = count.fetch_add(1, Ordering::Relaxed) + 1;
        if attempts > self.allocation_retry {
            warn!(application_uid = %app.uid, reason, "allocation retries exhausted, marking ERROR");
            self.append_state(app.uid, ApplicationStatus::Error, format!("allocation failed: {reason}")).await?;
        } else {
            warn!(application_uid = %app.uid, reason, attempts, "allocation failed, retrying");
            self.append_state(app.uid, ApplicationStatus::New, format!("retry {attempts}: {reason}")).await?;
        }
        Ok(())
    }

    async fn process_deallocate(&self, app: &Application) -> Result<(), CoreError> {
        let Some(resource) = self.store.get_application_resource(&app.uid).await? else {
            self.append_state(app.uid, ApplicationStatus::Deallocated, "no resource to release").await?;
            return Ok(());
        };
        if resource.node_uid != self.node_uid {
            return Ok(());
        }
        let Some(label) = self.store.get_label(&app.label_uid).await? else {
            self.append_state(app.uid, ApplicationStatus::Error, "label missing for deallocate").await?;
            return Ok(());
        };
        let Some(definition) = label.definitions.get(resource.definition_index) else {
            self.append_state(app.uid, ApplicationStatus::Error, "definition index out of range").await?;
            return Ok(());
        };
        let driver = match self.registry.for_definition(definition) {
            Ok(d) => d,
            Err(e) => {
                self.append_state(app.uid, ApplicationStatus::Error, e.to_string()).await?;
                return Ok(());
            }
        };
        match driver.deallocate(&resource).await {
            Ok(()) => {
                self.store.delete_application_resource(&app.uid).await?;
                self.append_state(app.uid, ApplicationStatus::Deallocated, "deallocated").await?;
            }
            Err(e) => warn!(application_uid = %app.uid, error = %e, "deallocate failed, will retry next tick"),
        }
        Ok(())
    }
}

async fn resource_driver_key(
    store: &Arc<dyn StateStore>,
    app: &Application,
    resource: &ApplicationResource,
) -> Result<String, CoreError> {
    let label = store
        .get_label(&app.label_uid)
        .await?
        .ok_or_else(|| CoreError::Internal("label missing during recovery".into()))?;
    let definition = label
        .definitions
        .get(resource.definition_index)
        .ok_or_else(|| CoreError::Internal("definition index out of range during recovery".into()))?;
    Ok(definition.driver_key())
}
