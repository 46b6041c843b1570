use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("peer {name} pubkey mismatch: handshake refused")]
    PubkeyMismatch { name: String },

    #[error("peer {name} unreachable: {source}")]
    PeerUnreachable {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {0} is not known")]
    UnknownPeer(String),

    #[error("gossip record conflict for {uid}: divergent body from peer {from}")]
    Conflict { uid: String, from: String },

    #[error("store error: {0}")]
    Store(#[from] aqfish_store::StoreError),

    #[error("internal cluster error: {0}")]
    Internal(String),
}
