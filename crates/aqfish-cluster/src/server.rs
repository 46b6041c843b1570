use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use aqfish_core::ApplicationMailbox;
use aqfish_domain::NodeUid;
use aqfish_store::StateStore;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::gossip::{apply_record, GossipMessage};
use crate::peer::PeerRegistry;

#[derive(Clone)]
struct ClusterState {
    store: Arc<dyn StateStore>,
    peers: Arc<PeerRegistry>,
    mailbox: Arc<ApplicationMailbox>,
    node_uid: NodeUid,
    own_pubkey: Vec<u8>,
}

/// Inbound side of the gossip overlay: one endpoint that accepts pushed
/// records from any known peer, plus the pubkey-rotation escape hatch (§4.5,
/// §6 `PUT Node.{name}.Pubkey`). `mailbox` is the same `ApplicationMailbox`
/// the node's pickup loop uses, so a gossiped resource-conflict loss and a
/// local tick can't race to append divergent Application states.
pub fn build_cluster_router(
    store: Arc<dyn StateStore>,
    peers: Arc<PeerRegistry>,
    mailbox: Arc<ApplicationMailbox>,
    node_uid: NodeUid,
    own_pubkey: Vec<u8>,
) -> Router {
    let state = ClusterState { store, peers, mailbox, node_uid, own_pubkey };

    Router::new()
        .route("/cluster/gossip", post(post_gossip))
        .route("/cluster/peers/:name/pubkey", delete(clear_peer_pubkey))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every push is checked against the sending peer's pinned pubkey before its
/// record is applied (§4.5, §7): an unknown `from` has nothing to pin
/// against yet and is let through, a known peer whose presented key doesn't
/// match its pin is refused outright. The response carries this node's own
/// pubkey so the sender can pin it on its side of the same connection.
async fn post_gossip(
    State(state): State<ClusterState>,
    Json(message): Json<GossipMessage>,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    if let Some(peer) = state.peers.get(&message.from) {
        if let Err(e) = peer.verify_or_pin(&message.pubkey) {
            warn!(from = %message.from, error = %e, "gossip peer pubkey rejected");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    }

    let status = match apply_record(&state.store, &state.mailbox, state.node_uid, &message).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(from = %message.from, error = %e, "gossip record rejected");
            StatusCode::CONFLICT
        }
    };
    (
        status,
        [("x-aqfish-pubkey", hex_encode(&state.own_pubkey))],
    )
        .into_response()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn clear_peer_pubkey(
    State(state): State<ClusterState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> StatusCode {
    match state.peers.clear_pubkey(&name) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqfish_domain::{Application, ApplicationUid, LabelUid};
    use aqfish_store::InMemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::util::ServiceExt;

    fn test_router() -> Router {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let peers = Arc::new(PeerRegistry::new(false, 0));
        let mailbox = Arc::new(ApplicationMailbox::new());
        build_cluster_router(store, peers, mailbox, NodeUid::new_root(), vec![1, 2, 3])
    }

    #[tokio::test]
    async fn gossip_post_applies_new_record() {
        let router = test_router();
        let app = Application {
            uid: ApplicationUid::new_derived([0; 6]),
            label_uid: LabelUid::new_derived([0; 6]),
            owner_name: "alice".into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        let message = crate::gossip::GossipMessage {
            from: "b".into(),
            pubkey: vec![],
            record: crate::gossip::GossipRecord::Application(app),
        };
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cluster/gossip")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&message).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn known_peer_pubkey_is_pinned_then_enforced() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let peers = Arc::new(PeerRegistry::new(false, 0));
        peers.join("b", "http://b:8080");
        let mailbox = Arc::new(ApplicationMailbox::new());
        let router = build_cluster_router(store, peers, mailbox, NodeUid::new_root(), vec![9]);

        let app = Application {
            uid: ApplicationUid::new_derived([1; 6]),
            label_uid: LabelUid::new_derived([0; 6]),
            owner_name: "alice".into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        let first = crate::gossip::GossipMessage {
            from: "b".into(),
            pubkey: vec![1, 2, 3],
            record: crate::gossip::GossipRecord::Application(app.clone()),
        };
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cluster/gossip")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&first).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut other = app.clone();
        other.uid = ApplicationUid::new_derived([2; 6]);
        let rotated = crate::gossip::GossipMessage {
            from: "b".into(),
            pubkey: vec![4, 5, 6],
            record: crate::gossip::GossipRecord::Application(other),
        };
        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cluster/gossip")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&rotated).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn clear_pubkey_for_unknown_peer_is_404() {
        let router = test_router();
        let resp = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cluster/peers/ghost/pubkey")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
