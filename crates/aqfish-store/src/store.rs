use async_trait::async_trait;

use aqfish_domain::{
    Application, ApplicationResource, ApplicationState, ApplicationStatus, ApplicationTask,
    ApplicationTaskUid, ApplicationUid, Label, LabelUid, Node, NodeUid, Vote,
};

use crate::audit::AuditEvent;
use crate::error::StoreError;

/// Durable store for every replicated entity kind (§4.6). Every externally
/// visible effect (state advance, driver call) is preceded by a successful
/// write here.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    // Node
    async fn get_node(&self, uid: &NodeUid) -> Result<Option<Node>, StoreError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;
    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError>;
    async fn delete_node(&self, uid: &NodeUid) -> Result<(), StoreError>;

    // Label
    async fn get_label(&self, uid: &LabelUid) -> Result<Option<Label>, StoreError>;
    async fn list_labels(&self) -> Result<Vec<Label>, StoreError>;
    async fn upsert_label(&self, label: &Label) -> Result<(), StoreError>;
    async fn delete_label(&self, uid: &LabelUid) -> Result<(), StoreError>;

    // Application
    async fn get_application(&self, uid: &ApplicationUid) -> Result<Option<Application>, StoreError>;
    async fn list_applications(&self) -> Result<Vec<Application>, StoreError>;
    async fn upsert_application(&self, app: &Application) -> Result<(), StoreError>;
    async fn delete_application(&self, uid: &ApplicationUid) -> Result<(), StoreError>;

    // ApplicationState — append-only; current status is the latest entry.
    async fn append_application_state(&self, state: &ApplicationState) -> Result<(), StoreError>;
    async fn list_application_states(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationState>, StoreError>;
    async fn current_status(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationStatus>, StoreError>;

    // Vote — immutable, at most one per (application, node) per round (I1),
    // enforced by the election coordinator, not the store.
    async fn append_vote(&self, vote: &Vote) -> Result<(), StoreError>;
    async fn list_votes(&self, application_uid: &ApplicationUid) -> Result<Vec<Vote>, StoreError>;

    // ApplicationResource — at most one per Application (I2, P2).
    async fn get_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationResource>, StoreError>;
    async fn list_application_resources_by_node(
        &self,
        node_uid: &NodeUid,
    ) -> Result<Vec<ApplicationResource>, StoreError>;
    async fn upsert_application_resource(
        &self,
        resource: &ApplicationResource,
    ) -> Result<(), StoreError>;
    async fn delete_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<(), StoreError>;

    // ApplicationTask
    async fn get_application_task(
        &self,
        uid: &ApplicationTaskUid,
    ) -> Result<Option<ApplicationTask>, StoreError>;
    async fn list_application_tasks(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationTask>, StoreError>;
    async fn upsert_application_task(&self, task: &ApplicationTask) -> Result<(), StoreError>;

    // Audit log
    async fn append_event(&self, event: &AuditEvent) -> Result<(), StoreError>;
    async fn list_events(
        &self,
        application_uid: Option<&ApplicationUid>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}
