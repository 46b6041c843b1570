use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use aqfish_domain::{
    Application, ApplicationResource, ApplicationState, ApplicationStatus, ApplicationTask,
    ApplicationTaskUid, ApplicationUid, Label, LabelUid, Node, NodeUid, Vote,
};

use crate::audit::AuditEvent;
use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<NodeUid, Node>,
    labels: HashMap<LabelUid, Label>,
    applications: HashMap<ApplicationUid, Application>,
    application_states: HashMap<ApplicationUid, Vec<ApplicationState>>,
    votes: HashMap<ApplicationUid, Vec<Vote>>,
    resources: HashMap<ApplicationUid, ApplicationResource>,
    tasks: HashMap<ApplicationUid, Vec<ApplicationTask>>,
    events: Vec<AuditEvent>,
}

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_node(&self, uid: &NodeUid) -> Result<Option<Node>, StoreError> {
        Ok(self.inner.read().await.nodes.get(uid).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.inner.read().await.nodes.values().cloned().collect())
    }

    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError> {
        self.inner.write().await.nodes.insert(node.uid, node.clone());
        Ok(())
    }

    async fn delete_node(&self, uid: &NodeUid) -> Result<(), StoreError> {
        self.inner.write().await.nodes.remove(uid);
        Ok(())
    }

    async fn get_label(&self, uid: &LabelUid) -> Result<Option<Label>, StoreError> {
        Ok(self.inner.read().await.labels.get(uid).cloned())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, StoreError> {
        Ok(self.inner.read().await.labels.values().cloned().collect())
    }

    async fn upsert_label(&self, label: &Label) -> Result<(), StoreError> {
        self.inner.write().await.labels.insert(label.uid, label.clone());
        Ok(())
    }

    async fn delete_label(&self, uid: &LabelUid) -> Result<(), StoreError> {
        self.inner.write().await.labels.remove(uid);
        Ok(())
    }

    async fn get_application(&self, uid: &ApplicationUid) -> Result<Option<Application>, StoreError> {
        Ok(self.inner.read().await.applications.get(uid).cloned())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        Ok(self.inner.read().await.applications.values().cloned().collect())
    }

    async fn upsert_application(&self, app: &Application) -> Result<(), StoreError> {
        self.inner.write().await.applications.insert(app.uid, app.clone());
        Ok(())
    }

    async fn delete_application(&self, uid: &ApplicationUid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.applications.remove(uid);
        guard.application_states.remove(uid);
        guard.votes.remove(uid);
        guard.resources.remove(uid);
        guard.tasks.remove(uid);
        Ok(())
    }

    async fn append_application_state(&self, state: &ApplicationState) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .application_states
            .entry(state.application_uid)
            .or_default()
            .push(state.clone());
        Ok(())
    }

    async fn list_application_states(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationState>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .application_states
            .get(application_uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn current_status(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationStatus>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .application_states
            .get(application_uid)
            .and_then(|states| states.last())
            .map(|s| s.status))
    }

    async fn append_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .votes
            .entry(vote.application_uid)
            .or_default()
            .push(*vote);
        Ok(())
    }

    async fn list_votes(&self, application_uid: &ApplicationUid) -> Result<Vec<Vote>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .votes
            .get(application_uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationResource>, StoreError> {
        Ok(self.inner.read().await.resources.get(application_uid).cloned())
    }

    async fn list_application_resources_by_node(
        &self,
        node_uid: &NodeUid,
    ) -> Result<Vec<ApplicationResource>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .resources
            .values()
            .filter(|r| &r.node_uid == node_uid)
            .cloned()
            .collect())
    }

    async fn upsert_application_resource(
        &self,
        resource: &ApplicationResource,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .resources
            .insert(resource.application_uid, resource.clone());
        Ok(())
    }

    async fn delete_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<(), StoreError> {
        self.inner.write().await.resources.remove(application_uid);
        Ok(())
    }

    async fn get_application_task(
        &self,
        uid: &ApplicationTaskUid,
    ) -> Result<Option<ApplicationTask>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .tasks
            .values()
            .flatten()
            .find(|t| &t.uid == uid)
            .cloned())
    }

    async fn list_application_tasks(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationTask>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .get(application_uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_application_task(&self, task: &ApplicationTask) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let tasks = guard.tasks.entry(task.application_uid).or_default();
        if let Some(existing) = tasks.iter_mut().find(|t| t.uid == task.uid) {
            *existing = task.clone();
        } else {
            tasks.push(task.clone());
        }
        Ok(())
    }

    async fn append_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn list_events(
        &self,
        application_uid: Option<&ApplicationUid>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let guard = self.inner.read().await;
        let filtered: Vec<AuditEvent> = guard
            .events
            .iter()
            .filter(|ev| match application_uid {
                Some(uid) => ev.application_uid().is_some_and(|id| &id == uid),
                None => true,
            })
            .cloned()
            .collect();
        let start = filtered.len().saturating_sub(limit as usize);
        Ok(filtered[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dummy_node(name: &str) -> Node {
        Node {
            uid: NodeUid::new_root(),
            name: name.to_string(),
            location: "local".into(),
            pubkey: vec![],
            address: None,
            capacity: aqfish_domain::NodeCapacity {
                cpu_limit: None,
                ram_limit: None,
                node_slots_limit: None,
            },
            maintenance: false,
            shutdown_pending: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_node() {
        let store = InMemoryStore::new();
        let node = dummy_node("node-a");
        store.upsert_node(&node).await.unwrap();
        let got = store.get_node(&node.uid).await.unwrap();
        assert_eq!(got.unwrap().name, "node-a");
    }

    #[tokio::test]
    async fn list_nodes() {
        let store = InMemoryStore::new();
        store.upsert_node(&dummy_node("a")).await.unwrap();
        store.upsert_node(&dummy_node("b")).await.unwrap();
        assert_eq!(store.list_nodes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn application_state_history_tracks_current_status() {
        let store = InMemoryStore::new();
        let app_uid = ApplicationUid::new_derived([0; 6]);
        store
            .append_application_state(&ApplicationState {
                uid: aqfish_domain::ApplicationStateUid::new_derived([0; 6]),
                application_uid: app_uid,
                status: ApplicationStatus::New,
                description: "created".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .append_application_state(&ApplicationState {
                uid: aqfish_domain::ApplicationStateUid::new_derived([0; 6]),
                application_uid: app_uid,
                status: ApplicationStatus::Elected,
                description: "won election".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.current_status(&app_uid).await.unwrap(),
            Some(ApplicationStatus::Elected)
        );
        assert_eq!(store.list_application_states(&app_uid).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_application_cascades() {
        let store = InMemoryStore::new();
        let app_uid = ApplicationUid::new_derived([0; 6]);
        store
            .upsert_application(&Application {
                uid: app_uid,
                label_uid: LabelUid::new_derived([0; 6]),
                owner_name: "alice".into(),
                metadata: serde_json::Value::Null,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .append_vote(&Vote {
                uid: aqfish_domain::VoteUid::new_derived([0; 6]),
                application_uid: app_uid,
                node_uid: NodeUid::new_root(),
                available: true,
                rand: 7,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store.delete_application(&app_uid).await.unwrap();
        assert!(store.get_application(&app_uid).await.unwrap().is_none());
        assert!(store.list_votes(&app_uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_filtered_by_application() {
        use uuid::Uuid;

        let store = InMemoryStore::new();
        let app_a = ApplicationUid::new_derived([0; 6]);
        let app_b = ApplicationUid::new_derived([1; 6]);
        store
            .append_event(&AuditEvent::ApplicationStateWritten {
                id: Uuid::new_v4(),
                at: Utc::now(),
                application_uid: app_a,
                status: ApplicationStatus::New,
            })
            .await
            .unwrap();
        store
            .append_event(&AuditEvent::ApplicationStateWritten {
                id: Uuid::new_v4(),
                at: Utc::now(),
                application_uid: app_b,
                status: ApplicationStatus::New,
            })
            .await
            .unwrap();

        assert_eq!(store.list_events(None, 100).await.unwrap().len(), 2);
        assert_eq!(store.list_events(Some(&app_a), 100).await.unwrap().len(), 1);
    }
}
