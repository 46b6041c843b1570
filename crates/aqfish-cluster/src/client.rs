use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::ClusterError;
use crate::gossip::GossipMessage;
use crate::peer::Peer;

/// Reconnect schedule for a `PeerUnreachable` peer, capped at 30s (§7).
const BACKOFF_SCHEDULE_SECS: [u64; 6] = [1, 2, 4, 8, 16, 30];

/// Outbound side of the gossip overlay: pushes records to one peer, retrying
/// forever on transport failure with jittered backoff (§7, §4.5).
pub struct GossipClient {
    http: reqwest::Client,
    own_pubkey: Vec<u8>,
}

impl GossipClient {
    pub fn new(own_pubkey: Vec<u8>) -> Self {
        Self { http: reqwest::Client::new(), own_pubkey }
    }

    /// Send one record to `peer`, returning once the POST completes. Stamps
    /// the envelope with this node's own pubkey and pins/verifies the
    /// responding peer's pubkey against what was pinned for it before (§4.5,
    /// §7). Does not retry — callers that want the forever-retry behaviour
    /// use [`GossipClient::send_with_retry`].
    pub async fn send(&self, peer: &Peer, message: &GossipMessage) -> Result<(), ClusterError> {
        let mut message = message.clone();
        message.pubkey = self.own_pubkey.clone();

        let response = self
            .http
            .post(format!("{}/cluster/gossip", peer.address))
            .json(&message)
            .send()
            .await
            .map_err(|source| ClusterError::PeerUnreachable { name: peer.name.clone(), source })?
            .error_for_status()
            .map_err(|source| ClusterError::PeerUnreachable { name: peer.name.clone(), source })?;

        if let Some(presented) = response
            .headers()
            .get("x-aqfish-pubkey")
            .and_then(|v| v.to_str().ok())
            .and_then(|hex| hex_decode(hex))
        {
            peer.verify_or_pin(&presented)?;
        }
        Ok(())
    }

    /// Send with jittered exponential backoff, retrying indefinitely until
    /// it succeeds (peer disconnects are retried forever per §7).
    pub async fn send_with_retry(&self, peer: &Peer, message: &GossipMessage) {
        let mut attempt = 0usize;
        loop {
            match self.send(peer, message).await {
                Ok(()) => return,
                Err(e) => {
                    let base = BACKOFF_SCHEDULE_SECS[attempt.min(BACKOFF_SCHEDULE_SECS.len() - 1)];
                    let jitter_ms = rand::thread_rng().gen_range(0..500);
                    warn!(peer = %peer.name, error = %e, attempt, "gossip send failed, retrying");
                    tokio::time::sleep(Duration::from_secs(base) + Duration::from_millis(jitter_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Broadcast a record to every peer, fire-and-forget with retry.
    pub fn broadcast(self: &Arc<Self>, peers: Vec<Arc<Peer>>, message: GossipMessage) {
        for peer in peers {
            let client = self.clone();
            let message = message.clone();
            tokio::spawn(async move {
                client.send_with_retry(&peer, &message).await;
            });
        }
    }
}

impl Default for GossipClient {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
