//! Peer database
//!
//! Tracks every known peer by address, with an endpoint index for inbound
//! source resolution and the current trust-anchor set from the installed
//! root topology.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::peer::{Peer, PeerRole};
use crate::root_topology::RootTopology;
use ethermesh_crypto::Address;

/// The peer/path database
pub struct Topology {
    peers: Mutex<HashMap<Address, Arc<Peer>>>,
    endpoints: Mutex<HashMap<SocketAddr, Address>>,
    supernode_addresses: Mutex<Vec<Address>>,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            endpoints: Mutex::new(HashMap::new()),
            supernode_addresses: Mutex::new(Vec::new()),
        }
    }

    /// Install a root topology: create or promote its supernodes as trust
    /// anchors and demote anchors no longer named.
    pub(crate) fn set_supernodes(&self, root: &RootTopology) {
        let mut peers = lock(&self.peers);
        let mut endpoints = lock(&self.endpoints);
        let mut addresses = Vec::with_capacity(root.supernodes().len());

        for sn in root.supernodes() {
            addresses.push(sn.address);
            let peer = peers
                .entry(sn.address)
                .or_insert_with(|| Arc::new(Peer::new(sn.address, PeerRole::TrustAnchor, None)))
                .clone();
            peer.set_role(PeerRole::TrustAnchor);
            if let Some(first) = sn.endpoints.first() {
                peer.set_endpoint(*first);
            }
            for ep in &sn.endpoints {
                endpoints.insert(*ep, sn.address);
            }
        }

        for (addr, peer) in peers.iter() {
            if peer.role() == PeerRole::TrustAnchor && !addresses.contains(addr) {
                peer.set_role(PeerRole::Ordinary);
            }
        }

        info!(supernodes = addresses.len(), "root topology installed");
        *lock(&self.supernode_addresses) = addresses;
    }

    /// Addresses of the current trust anchors
    pub fn supernode_addresses(&self) -> Vec<Address> {
        lock(&self.supernode_addresses).clone()
    }

    pub fn peer(&self, address: Address) -> Option<Arc<Peer>> {
        lock(&self.peers).get(&address).cloned()
    }

    pub(crate) fn peer_by_endpoint(&self, endpoint: &SocketAddr) -> Option<Arc<Peer>> {
        let address = *lock(&self.endpoints).get(endpoint)?;
        self.peer(address)
    }

    /// Add an ordinary peer learned out of band (e.g. provisioned by the
    /// host). Existing entries keep their state but learn the endpoint.
    pub(crate) fn add_peer(&self, address: Address, endpoint: Option<SocketAddr>) -> Arc<Peer> {
        let peer = lock(&self.peers)
            .entry(address)
            .or_insert_with(|| Arc::new(Peer::new(address, PeerRole::Ordinary, None)))
            .clone();
        if let Some(ep) = endpoint {
            peer.set_endpoint(ep);
            lock(&self.endpoints).insert(ep, address);
        }
        peer
    }

    /// Visit every known peer. The set is snapshotted first, so the
    /// callback runs without the table lock held.
    pub(crate) fn each_peer(&self, mut f: impl FnMut(&Arc<Peer>)) {
        for peer in self.snapshot() {
            f(&peer);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Peer>> {
        lock(&self.peers).values().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }

    /// Drop ordinary peers that have been silent past expiration. Trust
    /// anchors are never dropped.
    pub(crate) fn clean(&self, now: u64, peer_expiration: u64) {
        let mut peers = lock(&self.peers);
        let before = peers.len();
        peers.retain(|_, peer| {
            peer.role() == PeerRole::TrustAnchor
                || now.saturating_sub(peer.last_receive()) < peer_expiration
        });
        let dropped = before - peers.len();

        if dropped > 0 {
            let mut endpoints = lock(&self.endpoints);
            endpoints.retain(|_, addr| peers.contains_key(addr));
            debug!(dropped, "expired silent peers");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::root_topology::SUPERNODES_KEY;

    fn root_with(entries: &[(&str, &str)]) -> RootTopology {
        let mut sub = Dictionary::new();
        for (addr, eps) in entries {
            sub.set(addr, eps);
        }
        let mut dict = Dictionary::new();
        dict.set(SUPERNODES_KEY, &sub.to_string());
        RootTopology::from_dictionary(&dict)
    }

    #[test]
    fn test_set_supernodes_creates_anchors() {
        let topology = Topology::new();
        topology.set_supernodes(&root_with(&[("1234567890", "10.0.0.1:9993")]));

        let addr = Address::from_u64(0x1234567890);
        assert_eq!(topology.supernode_addresses(), vec![addr]);

        let peer = topology.peer(addr).unwrap();
        assert_eq!(peer.role(), PeerRole::TrustAnchor);
        assert_eq!(peer.endpoint(), Some("10.0.0.1:9993".parse().unwrap()));

        let by_ep = topology
            .peer_by_endpoint(&"10.0.0.1:9993".parse().unwrap())
            .unwrap();
        assert_eq!(by_ep.address(), addr);
    }

    #[test]
    fn test_replaced_anchors_demoted() {
        let topology = Topology::new();
        topology.set_supernodes(&root_with(&[("1234567890", "10.0.0.1:9993")]));
        topology.set_supernodes(&root_with(&[("abcdef0123", "10.0.0.2:9993")]));

        let old = topology.peer(Address::from_u64(0x1234567890)).unwrap();
        assert_eq!(old.role(), PeerRole::Ordinary);
        assert_eq!(
            topology.supernode_addresses(),
            vec![Address::from_u64(0xabcdef0123)]
        );
    }

    #[test]
    fn test_clean_keeps_anchors_and_active_peers() {
        let topology = Topology::new();
        topology.set_supernodes(&root_with(&[("1234567890", "10.0.0.1:9993")]));

        let active = topology.add_peer(Address::from_u64(2), Some("10.0.0.2:1".parse().unwrap()));
        active.received(90_000);
        topology.add_peer(Address::from_u64(3), Some("10.0.0.3:1".parse().unwrap()));

        topology.clean(100_000, 600_000);
        assert_eq!(topology.peer_count(), 2);
        assert!(topology.peer(Address::from_u64(3)).is_none());
        assert!(topology
            .peer_by_endpoint(&"10.0.0.3:1".parse().unwrap())
            .is_none());
    }
}
