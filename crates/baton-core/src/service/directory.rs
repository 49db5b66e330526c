//! Peer directory
//!
//! Membership registry of reachable peers, keyed by peer id. The local peer
//! is never an entry; the lock engine carries its own id. Remote peers are
//! exposed through [`RemotePeer`] handles that route calls over the shared
//! client manager.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use baton_api::{Message, PeerDirectory, PeerHandle, PeerId, PeerInfo, TokenSnapshot};
use baton_common::BatonError;

use super::peer_client::{PeerClientConfig, PeerClientManager};

/// Remote-call capability for one peer, backed by the cluster transport
pub struct RemotePeer {
    pub info: PeerInfo,
    clients: Arc<PeerClientManager>,
}

impl RemotePeer {
    pub fn new(info: PeerInfo, clients: Arc<PeerClientManager>) -> Self {
        Self { info, clients }
    }

    /// Send any wire message to this peer
    pub async fn send(&self, message: &Message) -> Result<(), BatonError> {
        self.clients.send(&self.info.address(), message).await
    }
}

#[async_trait]
impl PeerHandle for RemotePeer {
    async fn request_token(&self, time: u64, requester: PeerId) -> Result<(), BatonError> {
        self.send(&Message::RequestToken { time, requester }).await
    }

    async fn give_token(&self, snapshot: TokenSnapshot) -> Result<(), BatonError> {
        self.send(&Message::GiveToken { token: snapshot }).await
    }
}

/// Directory of all known remote peers
pub struct ClusterPeerDirectory {
    local: PeerInfo,
    peers: DashMap<PeerId, Arc<RemotePeer>>,
    clients: Arc<PeerClientManager>,
}

impl ClusterPeerDirectory {
    pub fn new(local: PeerInfo, config: PeerClientConfig) -> Self {
        let clients = Arc::new(PeerClientManager::new(local.address(), config));
        Self {
            local,
            peers: DashMap::new(),
            clients,
        }
    }

    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    /// Register every entry from the membership list; self and duplicate
    /// ids are skipped.
    pub fn seed(&self, infos: &[PeerInfo]) {
        for info in infos {
            self.add_peer(info.clone());
        }
        info!(
            "Peer directory seeded with {} remote peers (local: {})",
            self.peers.len(),
            self.local
        );
    }

    pub fn add_peer(&self, info: PeerInfo) {
        if info.id == self.local.id {
            return;
        }
        if self.peers.contains_key(&info.id) {
            warn!("Duplicate peer id {} in membership, keeping first entry", info.id);
            return;
        }
        let peer = Arc::new(RemotePeer::new(info, self.clients.clone()));
        self.peers.insert(peer.info.id, peer);
    }

    /// Address records of all known remote peers, in id order
    pub fn peer_infos(&self) -> Vec<PeerInfo> {
        let mut infos: Vec<PeerInfo> = self.peers.iter().map(|e| e.value().info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Send a message to every known peer; returns the ids whose delivery
    /// failed so the caller can prune them.
    pub async fn broadcast(&self, message: &Message) -> Vec<PeerId> {
        let peers: Vec<Arc<RemotePeer>> = self.peers.iter().map(|e| e.value().clone()).collect();
        let mut failed = Vec::new();
        for peer in peers {
            if let Err(e) = peer.send(message).await {
                warn!(
                    "Broadcast of {} to peer {} failed: {}",
                    message.kind(),
                    peer.info.id,
                    e
                );
                failed.push(peer.info.id);
            }
        }
        failed
    }

    /// Drop all cached connections
    pub fn close_all(&self) {
        self.clients.close_all();
    }
}

impl PeerDirectory for ClusterPeerDirectory {
    fn get_peer(&self, id: PeerId) -> Option<Arc<dyn PeerHandle>> {
        self.peers
            .get(&id)
            .map(|p| p.value().clone() as Arc<dyn PeerHandle>)
    }

    fn get_peers(&self) -> Vec<(PeerId, Arc<dyn PeerHandle>)> {
        let mut peers: Vec<(PeerId, Arc<dyn PeerHandle>)> = self
            .peers
            .iter()
            .map(|e| (*e.key(), e.value().clone() as Arc<dyn PeerHandle>))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        peers
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    fn remove_peer(&self, id: PeerId) {
        if let Some((_, peer)) = self.peers.remove(&id) {
            self.clients.remove_connection(&peer.info.address());
        }
    }
}
