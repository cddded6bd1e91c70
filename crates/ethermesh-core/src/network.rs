//! A joined virtual network

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::api::{VirtualNetworkConfigOperation, VirtualNetworkSnapshot, VirtualNetworkStatus};
use crate::hooks::NetworkConfigAnswer;
use crate::mac::Mac;
use crate::multicaster::MulticastGroup;
use crate::runtime::Runtime;

/// Configuration of a virtual network, as issued by its controller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub mtu: u16,
    pub enable_broadcast: bool,
    /// Frames whose source cannot be attributed to a known peer are
    /// dropped on private networks
    pub private: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mtu: crate::MAX_FRAME_LEN as u16,
            enable_broadcast: true,
            private: true,
        }
    }
}

/// Why the controller last turned a configuration request down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigRefusal {
    NotFound,
    AccessDenied,
}

/// Membership state for one 64-bit-identified broadcast domain
pub struct Network {
    nwid: u64,
    /// Our MAC on this network, derived from our address
    mac: Mac,
    config: Mutex<Option<NetworkConfig>>,
    last_config_update: AtomicU64,
    last_config_request: AtomicU64,
    refusal: Mutex<Option<ConfigRefusal>>,
    subscriptions: Mutex<BTreeSet<MulticastGroup>>,
}

impl Network {
    pub(crate) fn new(rt: &Runtime, nwid: u64) -> Self {
        Self {
            nwid,
            mac: Mac::from_address(rt.identity().address(), nwid),
            config: Mutex::new(None),
            last_config_update: AtomicU64::new(0),
            last_config_request: AtomicU64::new(0),
            refusal: Mutex::new(None),
            subscriptions: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn nwid(&self) -> u64 {
        self.nwid
    }

    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub fn last_config_update(&self) -> u64 {
        self.last_config_update.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> VirtualNetworkStatus {
        match *lock(&self.refusal) {
            Some(ConfigRefusal::AccessDenied) => VirtualNetworkStatus::AccessDenied,
            Some(ConfigRefusal::NotFound) => VirtualNetworkStatus::NotFound,
            None => {
                if lock(&self.config).is_some() {
                    VirtualNetworkStatus::Ok
                } else {
                    VirtualNetworkStatus::RequestingConfiguration
                }
            }
        }
    }

    /// True while the controller refuses us admission; no traffic passes
    /// in either direction
    pub fn access_denied(&self) -> bool {
        *lock(&self.refusal) == Some(ConfigRefusal::AccessDenied)
    }

    /// Private networks drop frames from sources we cannot attribute to a
    /// known peer. A network is treated as private until a configuration
    /// says otherwise.
    pub fn is_private(&self) -> bool {
        lock(&self.config).as_ref().map_or(true, |c| c.private)
    }

    /// Ask for (or refresh) this network's configuration. Answered locally
    /// when a controller is installed; otherwise the request is recorded
    /// and retried by the background loop.
    pub(crate) fn request_configuration(&self, rt: &Runtime, now: u64) {
        self.last_config_request.store(now, Ordering::Relaxed);

        let controller = match rt.network_controller() {
            Some(c) => c,
            None => {
                trace!(nwid = format_args!("{:#018x}", self.nwid), "no controller for config request");
                return;
            }
        };

        match controller.network_config_request(rt.identity().address(), self.nwid) {
            NetworkConfigAnswer::Ok(config) => {
                let first = {
                    let mut slot = lock(&self.config);
                    let first = slot.is_none();
                    *slot = Some(config);
                    first
                };
                self.last_config_update.store(now, Ordering::Relaxed);
                *lock(&self.refusal) = None;

                let op = if first {
                    VirtualNetworkConfigOperation::Up
                } else {
                    VirtualNetworkConfigOperation::ConfigUpdate
                };
                rt.hooks().virtual_network_config(self.nwid, op, &self.external_config());
            }
            NetworkConfigAnswer::AccessDenied => {
                debug!(nwid = format_args!("{:#018x}", self.nwid), "controller refused us admission");
                *lock(&self.refusal) = Some(ConfigRefusal::AccessDenied);
            }
            NetworkConfigAnswer::NotFound => {
                debug!(nwid = format_args!("{:#018x}", self.nwid), "controller has no such network");
                *lock(&self.refusal) = Some(ConfigRefusal::NotFound);
            }
        }
    }

    pub(crate) fn multicast_subscribe(&self, rt: &Runtime, group: MulticastGroup, now: u64) {
        lock(&self.subscriptions).insert(group);
        rt.multicaster().subscribe(self.nwid, group, now);
    }

    pub(crate) fn multicast_unsubscribe(&self, rt: &Runtime, group: MulticastGroup) {
        lock(&self.subscriptions).remove(&group);
        rt.multicaster().unsubscribe(self.nwid, group);
    }

    /// Owned point-in-time copy of the externally visible state
    pub fn external_config(&self) -> VirtualNetworkSnapshot {
        let config = lock(&self.config).clone().unwrap_or_default();
        VirtualNetworkSnapshot {
            nwid: self.nwid,
            mac: self.mac,
            name: config.name,
            status: self.status(),
            mtu: config.mtu,
            enable_broadcast: config.enable_broadcast,
            multicast_subscriptions: lock(&self.subscriptions).iter().copied().collect(),
            last_config_update: self.last_config_update(),
        }
    }

    /// Tear down on leave: release multicast state and tell the host the
    /// network is gone. Runs after the network left the registry, so no
    /// lock is held across the hook.
    pub(crate) fn destroy(&self, rt: &Runtime) {
        let groups: Vec<MulticastGroup> = lock(&self.subscriptions).iter().copied().collect();
        for group in groups {
            rt.multicaster().unsubscribe(self.nwid, group);
        }
        rt.hooks().virtual_network_config(
            self.nwid,
            VirtualNetworkConfigOperation::Destroy,
            &self.external_config(),
        );
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
