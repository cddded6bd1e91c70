//! External surface learning
//!
//! Peers echo back the source endpoint they observed for us. Recording
//! those observations per address family tells the node what it looks like
//! from outside NAT, which downstream path logic and the status surface
//! consume.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use ethermesh_crypto::Address;

/// Observation scope: one learned surface per address family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Scope {
    V4,
    V6,
}

impl Scope {
    fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() {
            Scope::V4
        } else {
            Scope::V6
        }
    }
}

/// Learned view of this node's externally visible endpoints
pub struct SelfAwareness {
    surfaces: Mutex<HashMap<Scope, (SocketAddr, u64)>>,
}

impl SelfAwareness {
    pub(crate) fn new() -> Self {
        Self {
            surfaces: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `reporter` observed us at `observed`. Returns true when
    /// this changes the learned surface for the scope.
    pub(crate) fn iam(&self, reporter: Address, observed: SocketAddr, now: u64) -> bool {
        let mut surfaces = lock(&self.surfaces);
        let scope = Scope::of(&observed);
        let changed = match surfaces.get(&scope) {
            Some((current, _)) => *current != observed,
            None => true,
        };
        surfaces.insert(scope, (observed, now));
        drop(surfaces);

        if changed {
            info!(%reporter, %observed, "external surface changed");
        }
        changed
    }

    /// Every currently learned external endpoint
    pub fn external_addresses(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> =
            lock(&self.surfaces).values().map(|(a, _)| *a).collect();
        addrs.sort();
        addrs
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
