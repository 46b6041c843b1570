use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use aqfish_domain::{
    Application, ApplicationResource, ApplicationState, ApplicationStatus, ApplicationTask,
    ApplicationTaskUid, ApplicationUid, Label, LabelUid, Node, NodeUid, Vote,
};

use crate::audit::AuditEvent;
use crate::error::StoreError;
use crate::store::StateStore;

const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
const LABELS: TableDefinition<&str, &[u8]> = TableDefinition::new("labels");
const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");
const APPLICATION_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("application_states");
const VOTES: TableDefinition<&str, &[u8]> = TableDefinition::new("votes");
const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");
const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

fn internal<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent state store backed by a redb database file, one table per
/// entity kind (§4.6). Data survives process restarts.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`. Parent directories are
    /// created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(NODES).map_err(internal)?;
            wtxn.open_table(LABELS).map_err(internal)?;
            wtxn.open_table(APPLICATIONS).map_err(internal)?;
            wtxn.open_table(APPLICATION_STATES).map_err(internal)?;
            wtxn.open_table(VOTES).map_err(internal)?;
            wtxn.open_table(RESOURCES).map_err(internal)?;
            wtxn.open_table(TASKS).map_err(internal)?;
            wtxn.open_table(EVENTS).map_err(internal)?;
            wtxn.open_table(META).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn get_one<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(table).map_err(internal)?;
        match t.get(key).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list_all<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let t = rtxn.open_table(table).map_err(internal)?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn put_one<T: serde::Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(table).map_err(internal)?;
            t.insert(key, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn remove_one(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut t = wtxn.open_table(table).map_err(internal)?;
            t.remove(key).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn get_node(&self, uid: &NodeUid) -> Result<Option<Node>, StoreError> {
        self.get_one(NODES, &uid.to_string())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        self.list_all(NODES)
    }

    async fn upsert_node(&self, node: &Node) -> Result<(), StoreError> {
        self.put_one(NODES, &node.uid.to_string(), node)
    }

    async fn delete_node(&self, uid: &NodeUid) -> Result<(), StoreError> {
        self.remove_one(NODES, &uid.to_string())
    }

    async fn get_label(&self, uid: &LabelUid) -> Result<Option<Label>, StoreError> {
        self.get_one(LABELS, &uid.to_string())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, StoreError> {
        self.list_all(LABELS)
    }

    async fn upsert_label(&self, label: &Label) -> Result<(), StoreError> {
        self.put_one(LABELS, &label.uid.to_string(), label)
    }

    async fn delete_label(&self, uid: &LabelUid) -> Result<(), StoreError> {
        self.remove_one(LABELS, &uid.to_string())
    }

    async fn get_application(&self, uid: &ApplicationUid) -> Result<Option<Application>, StoreError> {
        self.get_one(APPLICATIONS, &uid.to_string())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        self.list_all(APPLICATIONS)
    }

    async fn upsert_application(&self, app: &Application) -> Result<(), StoreError> {
        self.put_one(APPLICATIONS, &app.uid.to_string(), app)
    }

    async fn delete_application(&self, uid: &ApplicationUid) -> Result<(), StoreError> {
        self.remove_one(APPLICATIONS, &uid.to_string())?;
        self.remove_one(APPLICATION_STATES, &uid.to_string())?;
        self.remove_one(VOTES, &uid.to_string())?;
        self.remove_one(RESOURCES, &uid.to_string())?;
        self.remove_one(TASKS, &uid.to_string())?;
        Ok(())
    }

    async fn append_application_state(&self, state: &ApplicationState) -> Result<(), StoreError> {
        let key = state.application_uid.to_string();
        let mut existing: Vec<ApplicationState> =
            self.get_one(APPLICATION_STATES, &key)?.unwrap_or_default();
        existing.push(state.clone());
        self.put_one(APPLICATION_STATES, &key, &existing)
    }

    async fn list_application_states(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationState>, StoreError> {
        Ok(self
            .get_one(APPLICATION_STATES, &application_uid.to_string())?
            .unwrap_or_default())
    }

    async fn current_status(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationStatus>, StoreError> {
        let states: Vec<ApplicationState> = self
            .get_one(APPLICATION_STATES, &application_uid.to_string())?
            .unwrap_or_default();
        Ok(states.last().map(|s| s.status))
    }

    async fn append_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        let key = vote.application_uid.to_string();
        let mut existing: Vec<Vote> = self.get_one(VOTES, &key)?.unwrap_or_default();
        existing.push(*vote);
        self.put_one(VOTES, &key, &existing)
    }

    async fn list_votes(&self, application_uid: &ApplicationUid) -> Result<Vec<Vote>, StoreError> {
        Ok(self.get_one(VOTES, &application_uid.to_string())?.unwrap_or_default())
    }

    async fn get_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Option<ApplicationResource>, StoreError> {
        self.get_one(RESOURCES, &application_uid.to_string())
    }

    async fn list_application_resources_by_node(
        &self,
        node_uid: &NodeUid,
    ) -> Result<Vec<ApplicationResource>, StoreError> {
        let all: Vec<ApplicationResource> = self.list_all(RESOURCES)?;
        Ok(all.into_iter().filter(|r| &r.node_uid == node_uid).collect())
    }

    async fn upsert_application_resource(
        &self,
        resource: &ApplicationResource,
    ) -> Result<(), StoreError> {
        self.put_one(RESOURCES, &resource.application_uid.to_string(), resource)
    }

    async fn delete_application_resource(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<(), StoreError> {
        self.remove_one(RESOURCES, &application_uid.to_string())
    }

    async fn get_application_task(
        &self,
        uid: &ApplicationTaskUid,
    ) -> Result<Option<ApplicationTask>, StoreError> {
        let all: Vec<ApplicationTask> = self
            .list_all::<Vec<ApplicationTask>>(TASKS)?
            .into_iter()
            .flatten()
            .collect();
        Ok(all.into_iter().find(|t| &t.uid == uid))
    }

    async fn list_application_tasks(
        &self,
        application_uid: &ApplicationUid,
    ) -> Result<Vec<ApplicationTask>, StoreError> {
        Ok(self.get_one(TASKS, &application_uid.to_string())?.unwrap_or_default())
    }

    async fn upsert_application_task(&self, task: &ApplicationTask) -> Result<(), StoreError> {
        let key = task.application_uid.to_string();
        let mut existing: Vec<ApplicationTask> = self.get_one(TASKS, &key)?.unwrap_or_default();
        if let Some(slot) = existing.iter_mut().find(|t| t.uid == task.uid) {
            *slot = task.clone();
        } else {
            existing.push(task.clone());
        }
        self.put_one(TASKS, &key, &existing)
    }

    async fn append_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(event)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut meta = wtxn.open_table(META).map_err(internal)?;
            let seq = meta.get("event_seq").map_err(internal)?.map(|g| g.value()).unwrap_or(0);
            let new_seq = seq + 1;
            meta.insert("event_seq", new_seq).map_err(internal)?;

            let mut events = wtxn.open_table(EVENTS).map_err(internal)?;
            events.insert(new_seq, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn list_events(
        &self,
        application_uid: Option<&ApplicationUid>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(EVENTS).map_err(internal)?;
        let mut all = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            let event: AuditEvent = serde_json::from_slice(v.value())?;
            match application_uid {
                Some(uid) if event.application_uid().is_some_and(|id| &id == uid) => all.push(event),
                Some(_) => {}
                None => all.push(event),
            }
        }
        let start = all.len().saturating_sub(limit as usize);
        Ok(all[start..].to_vec())
    }
}
