use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use aqfish_core::ApplicationMailbox;
use aqfish_domain::{
    Application, ApplicationResource, ApplicationState, ApplicationStatus, Label, Node, NodeUid, Vote,
};
use aqfish_store::{compute_desired_hash, AuditEvent, StateStore};

use crate::error::ClusterError;

/// One replicated object, addressed by UID, carried over the gossip wire
/// (§4.5). `ApplicationTask` is intentionally omitted: tasks are driven by
/// the owning node only and never need cross-node reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum GossipRecord {
    Node(Node),
    Label(Label),
    Application(Application),
    ApplicationState(ApplicationState),
    Vote(Vote),
    ApplicationResource(ApplicationResource),
}

/// A gossip envelope: one record plus the name and presented pubkey of the
/// node that produced it. `GossipClient::send` stamps `pubkey` with this
/// node's own identity before every push; the receiving node pins or
/// verifies it against the sending peer's known pubkey (§4.5, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    pub from: String,
    #[serde(default)]
    pub pubkey: Vec<u8>,
    pub record: GossipRecord,
}

/// Apply an inbound gossip record to the local store.
///
/// Arrival of an already-known UID is idempotent when the body matches, or a
/// conflict when it doesn't (§4.5). `ApplicationResource` conflicts follow
/// the resolution rule in §4.6 (earlier `createdAt` wins, ties broken by
/// Node UID order); every other conflict is logged and the existing record
/// is kept, since UIDs are write-once per §3 I5 and a divergent body for the
/// same UID indicates a stale replay rather than a legitimate update.
pub async fn apply_record(
    store: &Arc<dyn StateStore>,
    mailbox: &Arc<ApplicationMailbox>,
    node_uid: NodeUid,
    message: &GossipMessage,
) -> Result<(), ClusterError> {
    match &message.record {
        GossipRecord::Node(node) => {
            store.upsert_node(node).await?;
            Ok(())
        }
        GossipRecord::Label(label) => {
            store.upsert_label(label).await?;
            Ok(())
        }
        GossipRecord::Application(app) => {
            if let Some(existing) = store.get_application(&app.uid).await? {
                if compute_desired_hash(&existing) != compute_desired_hash(app) {
                    return Err(ClusterError::Conflict {
                        uid: app.uid.to_string(),
                        from: message.from.clone(),
                    });
                }
                return Ok(());
            }
            store.upsert_application(app).await?;
            Ok(())
        }
        GossipRecord::ApplicationState(state) => {
            store.append_application_state(state).await?;
            Ok(())
        }
        GossipRecord::Vote(vote) => {
            store.append_vote(vote).await?;
            Ok(())
        }
        GossipRecord::ApplicationResource(incoming) => {
            apply_resource_conflict(store, mailbox, node_uid, incoming).await
        }
    }
}

/// Two ApplicationResources for the same Application: keep the one whose
/// creating transition has the earlier `created_at`; ties broken by Node UID
/// order (§4.6). If this node held the losing resource, it is instructed to
/// Deallocate by appending that transition for the Application (the pickup
/// loop drives the actual driver call on its next tick).
async fn apply_resource_conflict(
    store: &Arc<dyn StateStore>,
    mailbox: &Arc<ApplicationMailbox>,
    node_uid: NodeUid,
    incoming: &ApplicationResource,
) -> Result<(), ClusterError> {
    let Some(existing) = store.get_application_resource(&incoming.application_uid).await? else {
        store.upsert_application_resource(incoming).await?;
        return Ok(());
    };
    if existing.uid == incoming.uid {
        return Ok(());
    }

    let incoming_wins = match incoming.created_at.cmp(&existing.created_at) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => incoming.node_uid.to_string() < existing.node_uid.to_string(),
    };
    let (winner_node, loser_node) = if incoming_wins {
        (incoming.node_uid, existing.node_uid)
    } else {
        (existing.node_uid, incoming.node_uid)
    };
    store
        .append_event(&AuditEvent::ResourceConflictResolved {
            id: uuid::Uuid::new_v4(),
            at: chrono::Utc::now(),
            application_uid: incoming.application_uid,
            winner_node,
            loser_node,
        })
        .await?;

    if incoming_wins {
        store.upsert_application_resource(incoming).await?;
        if existing.node_uid == node_uid {
            if let Err(e) = mailbox
                .append_validated(
                    store,
                    incoming.application_uid,
                    ApplicationStatus::Deallocate,
                    node_uid.prefix_of(),
                    "lost resource conflict, deallocating",
                )
                .await
            {
                warn!(
                    application_uid = %incoming.application_uid,
                    error = %e,
                    "could not move conflict loser to DEALLOCATE",
                );
            }
        }
    }
    Ok(())
}
