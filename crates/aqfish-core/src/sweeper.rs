use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use aqfish_store::{AuditEvent, StateStore};

use crate::error::CoreError;

/// Periodically deletes terminal Applications (and their derived objects)
/// past `cleanup_interval`, and temporary Labels past their `remove_at`
/// (§4.6, I6). Does nothing until `startup_grace` has elapsed since this
/// struct was constructed, so a just-restarted node's cluster reconciliation
/// has time to land before anything is removed.
pub struct CleanupSweeper {
    store: Arc<dyn StateStore>,
    cleanup_interval: Duration,
    startup_grace: Duration,
    started_at: Instant,
}

impl CleanupSweeper {
    pub fn new(store: Arc<dyn StateStore>, cleanup_interval: Duration, startup_grace: Duration) -> Self {
        Self {
            store,
            cleanup_interval,
            startup_grace,
            started_at: Instant::now(),
        }
    }

    fn past_startup_grace(&self) -> bool {
        self.started_at.elapsed() >= self.startup_grace
    }

    /// One sweep pass. A no-op while still inside the startup grace window.
    pub async fn sweep(&self) -> Result<(), CoreError> {
        if !self.past_startup_grace() {
            debug!("cleanup sweeper still within startup grace, skipping");
            return Ok(());
        }

        let now = Utc::now();
        let cleanup_threshold = chrono::Duration::from_std(self.cleanup_interval)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let mut applications_removed = 0usize;
        let mut labels_removed = 0usize;

        for app in self.store.list_applications().await? {
            let Some(status) = self.store.current_status(&app.uid).await? else {
                continue;
            };
            if !status.is_terminal() {
                continue;
            }
            let last_write = self
                .store
                .list_application_states(&app.uid)
                .await?
                .into_iter()
                .map(|s| s.created_at)
                .max()
                .unwrap_or(app.created_at);
            if now - last_write >= cleanup_threshold {
                self.store.delete_application(&app.uid).await?;
                applications_removed += 1;
                info!(application_uid = %app.uid, status = %status, "swept terminal application");
            }
        }

        for label in self.store.list_labels().await? {
            if label.is_eligible_for_cleanup(now) {
                self.store.delete_label(&label.uid).await?;
                labels_removed += 1;
                info!(label_uid = %label.uid, "swept expired temporary label");
            }
        }

        if applications_removed > 0 || labels_removed > 0 {
            self.store
                .append_event(&AuditEvent::CleanupSwept {
                    id: uuid::Uuid::new_v4(),
                    at: now,
                    applications_removed,
                    labels_removed,
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqfish_domain::{
        Application, ApplicationState, ApplicationStateUid, ApplicationStatus, ApplicationUid,
        Definition, Label, LabelUid, ResourceRequest,
    };
    use aqfish_store::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    fn app_with_status(uid: ApplicationUid, status: ApplicationStatus, created_at: chrono::DateTime<Utc>) -> (Application, ApplicationState) {
        let app = Application {
            uid,
            label_uid: LabelUid::new_derived([1; 6]),
            owner_name: "alice".into(),
            metadata: serde_json::Value::Null,
            created_at,
        };
        let state = ApplicationState {
            uid: ApplicationStateUid::new_derived([1; 6]),
            application_uid: uid,
            status,
            description: "test".into(),
            created_at,
        };
        (app, state)
    }

    #[tokio::test]
    async fn leaves_recently_terminal_applications_alone() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let uid = ApplicationUid::new_derived([1; 6]);
        let (app, state) = app_with_status(uid, ApplicationStatus::Deallocated, Utc::now());
        store.upsert_application(&app).await.unwrap();
        store.append_application_state(&state).await.unwrap();

        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(0));
        sweeper.sweep().await.unwrap();

        assert!(store.get_application(&uid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removes_terminal_applications_past_the_interval() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let uid = ApplicationUid::new_derived([1; 6]);
        let old = Utc::now() - ChronoDuration::hours(2);
        let (app, state) = app_with_status(uid, ApplicationStatus::Deallocated, old);
        store.upsert_application(&app).await.unwrap();
        store.append_application_state(&state).await.unwrap();

        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(0));
        sweeper.sweep().await.unwrap();

        assert!(store.get_application(&uid).await.unwrap().is_none());

        let events = store.list_events(None, 100).await.unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            aqfish_store::AuditEvent::CleanupSwept { applications_removed: 1, labels_removed: 0, .. }
        )));
    }

    #[tokio::test]
    async fn a_quiet_sweep_logs_no_event() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(0));
        sweeper.sweep().await.unwrap();
        assert!(store.list_events(None, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_terminal_applications_are_never_swept() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let uid = ApplicationUid::new_derived([1; 6]);
        let old = Utc::now() - ChronoDuration::hours(2);
        let (app, state) = app_with_status(uid, ApplicationStatus::Allocated, old);
        store.upsert_application(&app).await.unwrap();
        store.append_application_state(&state).await.unwrap();

        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(0));
        sweeper.sweep().await.unwrap();

        assert!(store.get_application(&uid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn startup_grace_defers_every_sweep() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let uid = ApplicationUid::new_derived([1; 6]);
        let old = Utc::now() - ChronoDuration::hours(2);
        let (app, state) = app_with_status(uid, ApplicationStatus::Deallocated, old);
        store.upsert_application(&app).await.unwrap();
        store.append_application_state(&state).await.unwrap();

        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(3600));
        sweeper.sweep().await.unwrap();

        assert!(store.get_application(&uid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_temporary_labels_are_removed_but_versioned_ones_survive() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let definitions = vec![Definition {
            provider: "test".into(),
            instance: None,
            resources: ResourceRequest { cpu: 1, ram: 1, disks: 0 },
            options: serde_json::Value::Null,
        }];

        let expired = Label {
            uid: LabelUid::new_derived([2; 6]),
            name: "temp".into(),
            version: 0,
            owner_name: "alice".into(),
            visible_for: vec!["alice".into()],
            remove_at: Some(Utc::now() - ChronoDuration::seconds(1)),
            definitions: definitions.clone(),
            created_at: Utc::now(),
        };
        let versioned = Label {
            uid: LabelUid::new_derived([3; 6]),
            name: "stable".into(),
            version: 1,
            owner_name: "alice".into(),
            visible_for: vec![],
            remove_at: None,
            definitions,
            created_at: Utc::now(),
        };
        store.upsert_label(&expired).await.unwrap();
        store.upsert_label(&versioned).await.unwrap();

        let sweeper = CleanupSweeper::new(store.clone(), Duration::from_secs(3600), Duration::from_secs(0));
        sweeper.sweep().await.unwrap();

        assert!(store.get_label(&expired.uid).await.unwrap().is_none());
        assert!(store.get_label(&versioned.uid).await.unwrap().is_some());
    }
}
