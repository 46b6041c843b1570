use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use aqfish_domain::{ApplicationState, ApplicationStateUid, ApplicationStatus, ApplicationUid};
use aqfish_store::{AuditEvent, StateStore};

use crate::error::CoreError;

/// One lock per Application UID, held across the read-current/validate/write
/// sequence of every state append (§4.1/§5). The pickup loop's own tick and
/// an HTTP-triggered deallocate both append through this, so they can never
/// race to append two divergent next states for the same Application.
#[derive(Default)]
pub struct ApplicationMailbox {
    locks: DashMap<ApplicationUid, Arc<Mutex<()>>>,
}

impl ApplicationMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, uid: ApplicationUid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(uid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Appends `next` as the current state of `application_uid`, rejecting it
    /// with `CoreError::InvalidStateTransition` unless it's a legal edge from
    /// whatever the store currently holds. A missing current state (the
    /// Application's first-ever state) is not a transition and is always
    /// accepted.
    pub async fn append_validated(
        &self,
        store: &Arc<dyn StateStore>,
        application_uid: ApplicationUid,
        next: ApplicationStatus,
        state_uid_prefix: [u8; 6],
        description: impl Into<String>,
    ) -> Result<(), CoreError> {
        let _guard = self.acquire(application_uid).await;
        if let Some(current) = store.current_status(&application_uid).await? {
            if !current.can_transition_to(next) {
                return Err(CoreError::InvalidStateTransition { from: current, to: next });
            }
        }
        let state = ApplicationState {
            uid: ApplicationStateUid::new_derived(state_uid_prefix),
            application_uid,
            status: next,
            description: description.into(),
            created_at: chrono::Utc::now(),
        };
        store.append_application_state(&state).await?;
        store
            .append_event(&AuditEvent::ApplicationStateWritten {
                id: uuid::Uuid::new_v4(),
                at: state.created_at,
                application_uid,
                status: next,
            })
            .await?;
        Ok(())
    }
}
