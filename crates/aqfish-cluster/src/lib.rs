pub mod client;
pub mod error;
pub mod gossip;
pub mod peer;
pub mod server;

pub use client::GossipClient;
pub use error::ClusterError;
pub use gossip::{apply_record, GossipMessage, GossipRecord};
pub use peer::{Peer, PeerRegistry};
pub use server::build_cluster_router;
