//! Known remote nodes

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::api::PeerSnapshot;
use crate::runtime::Runtime;
use ethermesh_crypto::Address;

/// What a peer is to us
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    /// Named in the authenticated root topology; pinged unconditionally
    TrustAnchor,
    /// Everyone else; pinged only while recently active
    Ordinary,
}

/// A known remote node and its liveness bookkeeping
pub struct Peer {
    address: Address,
    trust_anchor: AtomicBool,
    endpoint: Mutex<Option<SocketAddr>>,
    last_receive: AtomicU64,
    last_send: AtomicU64,
    remote_version: Mutex<Option<(u16, u16, u16)>>,
}

impl Peer {
    pub(crate) fn new(address: Address, role: PeerRole, endpoint: Option<SocketAddr>) -> Self {
        Self {
            address,
            trust_anchor: AtomicBool::new(role == PeerRole::TrustAnchor),
            endpoint: Mutex::new(endpoint),
            last_receive: AtomicU64::new(0),
            last_send: AtomicU64::new(0),
            remote_version: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn role(&self) -> PeerRole {
        if self.trust_anchor.load(Ordering::Relaxed) {
            PeerRole::TrustAnchor
        } else {
            PeerRole::Ordinary
        }
    }

    pub(crate) fn set_role(&self, role: PeerRole) {
        self.trust_anchor
            .store(role == PeerRole::TrustAnchor, Ordering::Relaxed);
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        *lock(&self.endpoint)
    }

    pub(crate) fn set_endpoint(&self, endpoint: SocketAddr) {
        *lock(&self.endpoint) = Some(endpoint);
    }

    /// Record an authenticated-layer reception from this peer
    pub(crate) fn received(&self, now: u64) {
        self.last_receive.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn sent(&self, now: u64) {
        self.last_send.fetch_max(now, Ordering::Relaxed);
    }

    pub fn last_receive(&self) -> u64 {
        self.last_receive.load(Ordering::Relaxed)
    }

    pub fn last_send(&self) -> u64 {
        self.last_send.load(Ordering::Relaxed)
    }

    /// Recency predicate used to decide whether an ordinary peer is still
    /// worth keepalives
    pub fn alive(&self, now: u64, activity_timeout: u64) -> bool {
        let lr = self.last_receive();
        lr != 0 && now.saturating_sub(lr) < activity_timeout
    }

    pub fn remote_version(&self) -> Option<(u16, u16, u16)> {
        *lock(&self.remote_version)
    }

    pub(crate) fn set_remote_version(&self, version: (u16, u16, u16)) {
        *lock(&self.remote_version) = Some(version);
    }

    /// Send a ping toward this peer's endpoint, if one is known
    pub(crate) fn do_ping_and_keepalive(&self, rt: &Runtime, now: u64) {
        match self.endpoint() {
            Some(endpoint) => {
                rt.switch().send_ping(rt, endpoint, now);
                self.sent(now);
            }
            None => trace!(address = %self.address, "peer has no endpoint to ping"),
        }
    }

    pub(crate) fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            address: self.address,
            role: self.role(),
            endpoint: self.endpoint(),
            last_receive: self.last_receive(),
            last_send: self.last_send(),
            remote_version: self.remote_version(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_requires_recent_receive() {
        let peer = Peer::new(Address::from_u64(1), PeerRole::Ordinary, None);
        assert!(!peer.alive(1_000, 60_000));

        peer.received(1_000);
        assert!(peer.alive(2_000, 60_000));
        assert!(!peer.alive(62_000, 60_000));
    }

    #[test]
    fn test_received_keeps_maximum() {
        let peer = Peer::new(Address::from_u64(1), PeerRole::Ordinary, None);
        peer.received(5_000);
        peer.received(3_000);
        assert_eq!(peer.last_receive(), 5_000);
    }

    #[test]
    fn test_role_promotion() {
        let peer = Peer::new(Address::from_u64(1), PeerRole::Ordinary, None);
        assert_eq!(peer.role(), PeerRole::Ordinary);
        peer.set_role(PeerRole::TrustAnchor);
        assert_eq!(peer.role(), PeerRole::TrustAnchor);
    }
}
