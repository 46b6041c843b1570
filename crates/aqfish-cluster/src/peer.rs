use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use dashmap::DashMap;

use aqfish_domain::Node;

use crate::error::ClusterError;

/// A known cluster peer, addressed by node name (§4.5).
///
/// `pinned_pubkey` is `None` until the first successful handshake, after
/// which every subsequent reconnect must match it. An operator clears it
/// (`PUT Node.{name}.Pubkey`) to permit rotation after cert loss.
pub struct Peer {
    pub name: String,
    pub address: String,
    pinned_pubkey: RwLock<Option<Vec<u8>>>,
    connected: AtomicBool,
}

impl Peer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            pinned_pubkey: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn pinned_pubkey(&self) -> Option<Vec<u8>> {
        self.pinned_pubkey.read().unwrap().clone()
    }

    /// Clears the pinned pubkey so the next handshake re-pins (rotation path).
    pub fn clear_pubkey(&self) {
        *self.pinned_pubkey.write().unwrap() = None;
    }

    /// Verify (and pin on first contact) the pubkey presented at handshake.
    ///
    /// Startup/reconnect never succeeds on a mismatch (§7); the caller must
    /// clear the stored pubkey before a rotated peer can reconnect.
    pub fn verify_or_pin(&self, presented: &[u8]) -> Result<(), ClusterError> {
        let mut guard = self.pinned_pubkey.write().unwrap();
        match guard.as_ref() {
            Some(pinned) if pinned.as_slice() == presented => Ok(()),
            Some(_) => Err(ClusterError::PubkeyMismatch { name: self.name.clone() }),
            None => {
                *guard = Some(presented.to_vec());
                Ok(())
            }
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// The set of peers this node knows about, plus the auto-connect soft cap
/// (§4.5). Explicit joins always succeed regardless of the cap; only
/// auto-discovered peers are capped.
pub struct PeerRegistry {
    peers: DashMap<String, std::sync::Arc<Peer>>,
    auto_connect: bool,
    auto_connect_cap: usize,
}

impl PeerRegistry {
    pub fn new(auto_connect: bool, auto_connect_cap: usize) -> Self {
        Self {
            peers: DashMap::new(),
            auto_connect,
            auto_connect_cap,
        }
    }

    /// Explicit join: always registers, bypassing the auto-connect cap.
    pub fn join(&self, name: impl Into<String>, address: impl Into<String>) -> std::sync::Arc<Peer> {
        let name = name.into();
        self.peers
            .entry(name.clone())
            .or_insert_with(|| std::sync::Arc::new(Peer::new(name, address)))
            .clone()
    }

    /// Offer a peer discovered via gossip of another node's Node records.
    /// Registered only while `cluster_auto` is on and the soft cap isn't
    /// already reached by connected auto-discovered peers.
    pub fn offer_auto(&self, node: &Node) -> Option<std::sync::Arc<Peer>> {
        if !self.auto_connect {
            return None;
        }
        if self.peers.contains_key(&node.name) {
            return self.peers.get(&node.name).map(|p| p.clone());
        }
        let connected = self.peers.iter().filter(|p| p.is_connected()).count();
        if connected >= self.auto_connect_cap {
            return None;
        }
        let address = node.address.clone()?;
        Some(self.join(node.name.clone(), address))
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<Peer>> {
        self.peers.get(name).map(|p| p.clone())
    }

    pub fn clear_pubkey(&self, name: &str) -> Result<(), ClusterError> {
        self.get(name)
            .ok_or_else(|| ClusterError::UnknownPeer(name.to_string()))
            .map(|p| p.clear_pubkey())
    }

    pub fn all(&self) -> Vec<std::sync::Arc<Peer>> {
        self.peers.iter().map(|p| p.clone()).collect()
    }
}
