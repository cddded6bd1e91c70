//! The runtime environment
//!
//! One bag of singletons shared by the node and its collaborators, owned
//! exclusively by the node and passed down by immutable reference. Shared
//! scalars (desperation, newest version seen) live here so both the façade
//! and the packet path can reach them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::anti_recursion::AntiRecursion;
use crate::api::Event;
use crate::config::NodeConfig;
use crate::hooks::{HostHooks, NetworkController};
use crate::multicaster::Multicaster;
use crate::self_awareness::SelfAwareness;
use crate::switch::Switch;
use crate::topology::Topology;
use ethermesh_crypto::Identity;

/// Singletons shared by the node and its collaborators.
///
/// Collaborator fields are declared in reverse construction order; drop
/// runs top to bottom, so teardown mirrors construction backwards.
pub struct Runtime {
    self_awareness: SelfAwareness,
    topology: Topology,
    anti_recursion: AntiRecursion,
    multicaster: Multicaster,
    switch: Switch,
    prng: Mutex<SmallRng>,
    controller: RwLock<Option<Arc<dyn NetworkController>>>,
    core_desperation: AtomicU32,
    newest_version_seen: Mutex<(u16, u16, u16)>,
    identity: Identity,
    config: NodeConfig,
    hooks: Arc<dyn HostHooks>,
}

impl Runtime {
    pub(crate) fn new(hooks: Arc<dyn HostHooks>, identity: Identity, config: NodeConfig) -> Self {
        let prng = Mutex::new(SmallRng::from_entropy());
        let switch = Switch::new();
        let multicaster = Multicaster::new();
        let anti_recursion = AntiRecursion::new();
        let topology = Topology::new();
        let self_awareness = SelfAwareness::new();

        Self {
            self_awareness,
            topology,
            anti_recursion,
            multicaster,
            switch,
            prng,
            controller: RwLock::new(None),
            core_desperation: AtomicU32::new(0),
            newest_version_seen: Mutex::new(crate::local_version()),
            identity,
            config,
            hooks,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub(crate) fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub(crate) fn hooks(&self) -> &dyn HostHooks {
        self.hooks.as_ref()
    }

    pub(crate) fn switch(&self) -> &Switch {
        &self.switch
    }

    pub(crate) fn topology(&self) -> &Topology {
        &self.topology
    }

    pub(crate) fn multicaster(&self) -> &Multicaster {
        &self.multicaster
    }

    pub(crate) fn anti_recursion(&self) -> &AntiRecursion {
        &self.anti_recursion
    }

    pub(crate) fn self_awareness(&self) -> &SelfAwareness {
        &self.self_awareness
    }

    pub(crate) fn post_event(&self, event: Event) {
        self.hooks.status_event(event);
    }

    /// Emit a datagram, remembering its tail for recursion detection. The
    /// core's current desperation rides along as the link hint.
    pub(crate) fn wire_send(&self, remote: SocketAddr, data: &[u8]) -> bool {
        self.anti_recursion.log_outgoing(data);
        self.hooks
            .wire_packet_send(remote, self.core_desperation(), data)
    }

    pub fn core_desperation(&self) -> u32 {
        self.core_desperation.load(Ordering::Relaxed)
    }

    pub(crate) fn set_core_desperation(&self, desperation: u32) {
        self.core_desperation.store(desperation, Ordering::Relaxed);
    }

    pub(crate) fn next_packet_id(&self) -> u64 {
        lock(&self.prng).gen()
    }

    pub fn newest_version_seen(&self) -> (u16, u16, u16) {
        *lock(&self.newest_version_seen)
    }

    /// Record a version some peer advertised; emits the saw-newer event
    /// once per strict lexicographic increase.
    pub(crate) fn post_newer_version_if_newer(&self, version: (u16, u16, u16)) -> bool {
        let newer = {
            let mut seen = lock(&self.newest_version_seen);
            if version > *seen {
                *seen = version;
                true
            } else {
                false
            }
        };
        if newer {
            self.post_event(Event::SawMoreRecentVersion);
        }
        newer
    }

    pub(crate) fn network_controller(&self) -> Option<Arc<dyn NetworkController>> {
        self.controller
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_network_controller(&self, controller: Option<Arc<dyn NetworkController>>) {
        *self.controller.write().unwrap_or_else(|e| e.into_inner()) = controller;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
