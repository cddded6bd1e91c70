//! The node façade
//!
//! One long-lived object per embedding. The host drives it through three
//! entry points — wire packets in, virtual-Ethernet frames out, and the
//! background pass — each carrying the current wall-clock time and
//! returning the deadline by which the background pass must next run even
//! if no I/O arrives.
//!
//! Entry points are callable from multiple host threads. The background
//! pass serializes against itself on a dedicated mutex; the network
//! registry has its own. Neither the registry lock nor any collaborator
//! table lock is ever held while a host hook runs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::api::{Event, PeerSnapshot, ResultCode, StatusSnapshot, VirtualNetworkSnapshot};
use crate::config::NodeConfig;
use crate::dictionary::Dictionary;
use crate::error::{CoreError, CoreResult};
use crate::hooks::{HostHooks, NetworkController};
use crate::mac::Mac;
use crate::multicaster::MulticastGroup;
use crate::network::Network;
use crate::peer::PeerRole;
use crate::root_topology::{self, RootTopology};
use crate::runtime::Runtime;
use ethermesh_crypto::{Address, Identity};

/// Data-store blob holding the identity with its private half
pub const IDENTITY_SECRET_BLOB: &str = "identity.secret";

/// Data-store blob holding the shareable identity
pub const IDENTITY_PUBLIC_BLOB: &str = "identity.public";

/// Data-store blob holding a signed root-topology replacement
pub const ROOT_TOPOLOGY_BLOB: &str = "root-topology";

/// Cadence bookkeeping of the background pass, guarded by the
/// background-tasks mutex
struct BackgroundState {
    last_ping_check: u64,
    last_housekeeping_run: u64,
    start_time_after_inactivity: u64,
}

/// A peer-to-peer virtual-Ethernet node
pub struct Node {
    networks: Mutex<HashMap<u64, Arc<Network>>>,
    background: Mutex<BackgroundState>,
    now: AtomicU64,
    online: AtomicBool,
    // Owns the collaborators; dropped after node-level state above.
    rt: Runtime,
}

impl Node {
    /// Construct a node.
    ///
    /// Bootstraps the identity from the data store (generating and
    /// persisting a fresh one if absent, malformed or public-only), builds
    /// the collaborators, installs the root topology — the caller-supplied
    /// override if any, else an authenticated persisted document, else the
    /// compiled-in default — and posts [`Event::Up`].
    pub fn new(
        now: u64,
        hooks: Arc<dyn HostHooks>,
        config: NodeConfig,
        override_root_topology: Option<&str>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::BadParameter)?;

        let identity = bootstrap_identity(hooks.as_ref())?;
        info!(address = %identity.address(), "node identity ready");

        let rt = Runtime::new(hooks, identity, config);

        let root_dict = resolve_root_topology(&rt, override_root_topology);
        let root = RootTopology::from_dictionary(&root_dict);
        if root.is_empty() {
            warn!("root topology names no supernodes; running without trust anchors");
        }
        rt.topology().set_supernodes(&root);

        let node = Self {
            networks: Mutex::new(HashMap::new()),
            background: Mutex::new(BackgroundState {
                last_ping_check: now,
                last_housekeeping_run: now,
                start_time_after_inactivity: now,
            }),
            now: AtomicU64::new(now),
            online: AtomicBool::new(false),
            rt,
        };
        node.rt.post_event(Event::Up);
        Ok(node)
    }

    /// Feed one inbound wire datagram to the switch.
    ///
    /// Runs the background pass first if the deadline has been reached.
    /// Packet-layer failures are reported as [`ResultCode::PacketInvalid`]
    /// and never poison the node.
    pub fn process_wire_packet(
        &self,
        now: u64,
        source: SocketAddr,
        link_desperation: u32,
        data: &[u8],
        next_background_task_deadline: &mut u64,
    ) -> ResultCode {
        if link_desperation > 255 {
            return ResultCode::BadParameter;
        }
        if now >= *next_background_task_deadline {
            let rc = self.process_background_tasks(now, next_background_task_deadline);
            if rc != ResultCode::Ok {
                return rc;
            }
        } else {
            self.now.store(now, Ordering::Relaxed);
        }

        match self
            .rt
            .switch()
            .on_remote_packet(self, source, link_desperation, data, now)
        {
            Ok(()) => ResultCode::Ok,
            Err(e) => {
                debug!(%source, "dropping wire packet: {}", e);
                ResultCode::PacketInvalid
            }
        }
    }

    /// Feed one outbound virtual-Ethernet frame from the host tap.
    ///
    /// Returns [`ResultCode::NetworkNotFound`] if `nwid` is not joined;
    /// the registry lock linearizes this against a racing [`Node::leave`].
    #[allow(clippy::too_many_arguments)]
    pub fn process_virtual_network_frame(
        &self,
        now: u64,
        nwid: u64,
        source_mac: Mac,
        dest_mac: Mac,
        ether_type: u16,
        vlan_id: u16,
        data: &[u8],
        next_background_task_deadline: &mut u64,
    ) -> ResultCode {
        if data.len() > crate::MAX_FRAME_LEN {
            return ResultCode::BadParameter;
        }
        if now >= *next_background_task_deadline {
            let rc = self.process_background_tasks(now, next_background_task_deadline);
            if rc != ResultCode::Ok {
                return rc;
            }
        } else {
            self.now.store(now, Ordering::Relaxed);
        }

        let network = match self.network(nwid) {
            Some(nw) => nw,
            None => return ResultCode::NetworkNotFound,
        };
        match self.rt.switch().on_local_ethernet(
            &self.rt,
            &network,
            source_mac,
            dest_mac,
            ether_type,
            vlan_id,
            data,
            now,
        ) {
            Ok(()) => ResultCode::Ok,
            Err(e) => {
                warn!("frame dispatch failed: {}", e);
                ResultCode::FatalInternal
            }
        }
    }

    /// Run the periodic work: ping/keepalive fan-out, network-config
    /// refresh, housekeeping, desperation and deadline recomputation.
    ///
    /// Serialized against itself; a second caller blocks until the current
    /// pass finishes. Work that invokes host hooks against the registry
    /// (config refresh, status events) is snapshotted inside the locks and
    /// executed after they are released.
    pub fn process_background_tasks(
        &self,
        now: u64,
        next_background_task_deadline: &mut u64,
    ) -> ResultCode {
        self.now.store(now, Ordering::Relaxed);
        let mut deferred_events: Vec<Event> = Vec::new();
        let mut refresh: Vec<Arc<Network>> = Vec::new();

        {
            let mut bg = lock(&self.background);
            let config = self.rt.config();

            if now.saturating_sub(bg.last_ping_check) >= config.ping_check_interval {
                // A gap much longer than the cadence means the host stopped
                // calling us; treat the node as freshly woken rather than
                // counting the sleep as anchor silence.
                if now.saturating_sub(bg.last_ping_check) > config.ping_check_interval * 3 {
                    bg.start_time_after_inactivity = now;
                }
                bg.last_ping_check = now;

                let mut last_anchor_receive = 0u64;
                self.rt.topology().each_peer(|peer| match peer.role() {
                    PeerRole::TrustAnchor => {
                        peer.do_ping_and_keepalive(&self.rt, now);
                        last_anchor_receive = last_anchor_receive.max(peer.last_receive());
                    }
                    PeerRole::Ordinary => {
                        if peer.alive(now, config.peer_activity_timeout) {
                            peer.do_ping_and_keepalive(&self.rt, now);
                        }
                    }
                });

                let silence_start = bg.start_time_after_inactivity.max(last_anchor_receive);
                let desperation = now.saturating_sub(silence_start)
                    / (config.ping_check_interval * config.desperation_increment);
                self.rt
                    .set_core_desperation(desperation.min(u64::from(u32::MAX)) as u32);

                let have_anchors = !self.rt.topology().supernode_addresses().is_empty();
                let online = !have_anchors
                    || (last_anchor_receive != 0
                        && now.saturating_sub(last_anchor_receive)
                            <= config.ping_check_interval * 3);
                let was_online = self.online.swap(online, Ordering::Relaxed);
                if online != was_online {
                    deferred_events.push(if online { Event::Online } else { Event::Offline });
                }

                {
                    let networks = lock(&self.networks);
                    for network in networks.values() {
                        if now.saturating_sub(network.last_config_update())
                            >= config.network_autoconf_delay
                        {
                            refresh.push(Arc::clone(network));
                        }
                    }
                }
            }

            if now.saturating_sub(bg.last_housekeeping_run) >= config.housekeeping_period {
                bg.last_housekeeping_run = now;
                self.rt.topology().clean(now, config.peer_expiration);
                self.rt.multicaster().clean(now, config.multicast_expiration);
            }

            let switch_delay = self.rt.switch().do_timer_tasks(&self.rt, now);
            *next_background_task_deadline = now
                + config
                    .ping_check_interval
                    .min(switch_delay)
                    .max(config.timer_task_granularity);
        }

        for network in refresh {
            network.request_configuration(&self.rt, now);
        }
        for event in deferred_events {
            self.rt.post_event(event);
        }
        ResultCode::Ok
    }

    /// Join a network. Idempotent; a fresh membership immediately requests
    /// its configuration.
    pub fn join(&self, nwid: u64) -> ResultCode {
        let created = {
            let mut networks = lock(&self.networks);
            match networks.get(&nwid) {
                Some(_) => None,
                None => {
                    let network = Arc::new(Network::new(&self.rt, nwid));
                    networks.insert(nwid, Arc::clone(&network));
                    Some(network)
                }
            }
        };
        if let Some(network) = created {
            info!(nwid = format_args!("{:#018x}", nwid), "joined network");
            network.request_configuration(&self.rt, self.now.load(Ordering::Relaxed));
        }
        ResultCode::Ok
    }

    /// Leave a network. Idempotent. The network's destroy hook runs after
    /// removal, so a racing frame for the same nwid either dispatched
    /// before this linearized or reports not-found after it.
    pub fn leave(&self, nwid: u64) -> ResultCode {
        let removed = lock(&self.networks).remove(&nwid);
        if let Some(network) = removed {
            info!(nwid = format_args!("{:#018x}", nwid), "left network");
            network.destroy(&self.rt);
        }
        ResultCode::Ok
    }

    /// Announce interest in a multicast group on a joined network.
    /// Silently a no-op for unknown networks.
    pub fn multicast_subscribe(&self, nwid: u64, group_mac: Mac, adi: u32) -> ResultCode {
        let group = MulticastGroup { mac: group_mac, adi };
        if let Some(network) = self.network(nwid) {
            network.multicast_subscribe(&self.rt, group, self.now.load(Ordering::Relaxed));
        }
        ResultCode::Ok
    }

    /// Withdraw interest in a multicast group. Silently a no-op for
    /// unknown networks.
    pub fn multicast_unsubscribe(&self, nwid: u64, group_mac: Mac, adi: u32) -> ResultCode {
        let group = MulticastGroup { mac: group_mac, adi };
        if let Some(network) = self.network(nwid) {
            network.multicast_unsubscribe(&self.rt, group);
        }
        ResultCode::Ok
    }

    /// Point-in-time node status
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            address: self.rt.identity().address(),
            public_identity: self.rt.identity().to_public_string(),
            online: self.online.load(Ordering::Relaxed),
            core_desperation: self.rt.core_desperation(),
            peer_count: self.rt.topology().peer_count(),
            network_count: lock(&self.networks).len(),
            external_addresses: self.rt.self_awareness().external_addresses(),
            version: crate::local_version(),
        }
    }

    /// Owned snapshot of every known peer
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        self.rt
            .topology()
            .snapshot()
            .iter()
            .map(|peer| peer.snapshot())
            .collect()
    }

    /// Owned snapshot of every joined network, in no particular order
    pub fn networks(&self) -> Vec<VirtualNetworkSnapshot> {
        lock(&self.networks)
            .values()
            .map(|network| network.external_config())
            .collect()
    }

    /// Owned snapshot of one joined network, or `None` if not joined
    pub fn network_config(&self, nwid: u64) -> Option<VirtualNetworkSnapshot> {
        self.network(nwid).map(|network| network.external_config())
    }

    /// Install or clear the local network configuration master
    pub fn set_network_controller(&self, controller: Option<Arc<dyn NetworkController>>) {
        self.rt.set_network_controller(controller);
    }

    /// Record a version gossiped by a peer; emits
    /// [`Event::SawMoreRecentVersion`] once per strict increase.
    pub fn post_newer_version_if_newer(&self, major: u16, minor: u16, revision: u16) -> bool {
        self.rt.post_newer_version_if_newer((major, minor, revision))
    }

    /// The newest build version seen anywhere, starting at our own
    pub fn newest_version_seen(&self) -> (u16, u16, u16) {
        self.rt.newest_version_seen()
    }

    /// This node's short address
    pub fn address(&self) -> Address {
        self.rt.identity().address()
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub(crate) fn network(&self, nwid: u64) -> Option<Arc<Network>> {
        lock(&self.networks).get(&nwid).cloned()
    }
}

/// Load the identity from the data store, or generate and persist a fresh
/// one. Persistence failure of either blob is fatal to construction.
fn bootstrap_identity(hooks: &dyn HostHooks) -> CoreResult<Identity> {
    let blob = read_data_store(hooks, IDENTITY_SECRET_BLOB);
    if !blob.is_empty() {
        match String::from_utf8(blob) {
            Ok(text) => match text.parse::<Identity>() {
                Ok(identity) if identity.has_private() => return Ok(identity),
                Ok(_) => warn!("stored identity lacks its private half, regenerating"),
                Err(e) => warn!("stored identity is malformed ({}), regenerating", e),
            },
            Err(_) => warn!("stored identity is not text, regenerating"),
        }
    }

    let identity = Identity::generate();
    info!(address = %identity.address(), "generated new identity");
    let secret = identity.to_secret_string()?;
    if !hooks.data_store_put(IDENTITY_SECRET_BLOB, secret.as_bytes(), true) {
        return Err(CoreError::DataStoreFailed(IDENTITY_SECRET_BLOB.into()));
    }
    if !hooks.data_store_put(
        IDENTITY_PUBLIC_BLOB,
        identity.to_public_string().as_bytes(),
        false,
    ) {
        return Err(CoreError::DataStoreFailed(IDENTITY_PUBLIC_BLOB.into()));
    }
    Ok(identity)
}

/// Pick the root-topology document: caller override (trusted as-is), else
/// an authenticated persisted blob, else the compiled-in default.
fn resolve_root_topology(rt: &Runtime, override_root_topology: Option<&str>) -> Dictionary {
    if let Some(text) = override_root_topology {
        return Dictionary::parse(text);
    }

    let blob = read_data_store(rt.hooks(), ROOT_TOPOLOGY_BLOB);
    if !blob.is_empty() {
        match String::from_utf8(blob) {
            Ok(text) => {
                let dict = Dictionary::parse(&text);
                if root_topology::authenticate(&dict, &rt.config().root_topology_authority) {
                    debug!("using authenticated persisted root topology");
                    return dict;
                }
                warn!("persisted root topology failed authentication, using default");
                rt.post_event(Event::AuthenticationFailure);
            }
            Err(_) => {
                warn!("persisted root topology is not text, using default");
                rt.post_event(Event::AuthenticationFailure);
            }
        }
    }
    Dictionary::parse(&rt.config().default_root_topology)
}

/// Assemble a blob through the chunked read hook: keep requesting at a
/// running offset until the accumulated length reaches the advertised
/// total. Any absent or empty chunk yields an empty result.
fn read_data_store(hooks: &dyn HostHooks, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        match hooks.data_store_get(name, out.len() as u64) {
            Some(chunk) => {
                if chunk.data.is_empty() {
                    return Vec::new();
                }
                out.extend_from_slice(&chunk.data);
                if out.len() as u64 >= chunk.total_len {
                    return out;
                }
            }
            None => return Vec::new(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VirtualNetworkConfigOperation;
    use crate::hooks::DataChunk;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    struct TestHooks {
        store: Mutex<StdHashMap<String, (Vec<u8>, bool)>>,
        wire: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
        events: Mutex<Vec<Event>>,
        config_ops: Mutex<Vec<(u64, VirtualNetworkConfigOperation)>>,
    }

    impl TestHooks {
        fn wire_sends_to(&self, endpoint: &SocketAddr) -> usize {
            self.wire
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| to == endpoint)
                .count()
        }
    }

    impl HostHooks for TestHooks {
        fn data_store_get(&self, name: &str, read_offset: u64) -> Option<DataChunk> {
            let store = self.store.lock().unwrap();
            let (blob, _) = store.get(name)?;
            let offset = read_offset as usize;
            if offset > blob.len() {
                return None;
            }
            Some(DataChunk {
                data: blob[offset..].to_vec(),
                total_len: blob.len() as u64,
            })
        }

        fn data_store_put(&self, name: &str, data: &[u8], secure: bool) -> bool {
            self.store
                .lock()
                .unwrap()
                .insert(name.to_string(), (data.to_vec(), secure));
            true
        }

        fn wire_packet_send(&self, remote: SocketAddr, _link_desperation: u32, data: &[u8]) -> bool {
            self.wire.lock().unwrap().push((remote, data.to_vec()));
            true
        }

        fn virtual_network_frame(&self, _: u64, _: Mac, _: Mac, _: u16, _: u16, _: &[u8]) {}

        fn virtual_network_config(
            &self,
            nwid: u64,
            op: VirtualNetworkConfigOperation,
            _config: &crate::api::VirtualNetworkSnapshot,
        ) {
            self.config_ops.lock().unwrap().push((nwid, op));
        }

        fn status_event(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    const INTERVAL: u64 = crate::PING_CHECK_INTERVAL_MS;

    fn new_node(hooks: &Arc<TestHooks>, override_rt: &str) -> Node {
        Node::new(
            0,
            Arc::clone(hooks) as Arc<dyn HostHooks>,
            NodeConfig::default(),
            Some(override_rt),
        )
        .unwrap()
    }

    #[test]
    fn test_ordinary_peers_pinged_only_while_alive() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        let endpoint: SocketAddr = "10.9.9.9:7000".parse().unwrap();
        let peer = node
            .runtime()
            .topology()
            .add_peer(Address::from_u64(0x42), Some(endpoint));

        // Never heard from: the ping pass leaves it idle.
        let mut deadline = 0u64;
        let _ = node.process_background_tasks(INTERVAL, &mut deadline);
        assert_eq!(hooks.wire_sends_to(&endpoint), 0);

        // Recently heard from: it gets a keepalive.
        peer.received(INTERVAL + 1);
        let _ = node.process_background_tasks(2 * INTERVAL, &mut deadline);
        assert_eq!(hooks.wire_sends_to(&endpoint), 1);

        // Silent past the activity window: idle again.
        let later = 2 * INTERVAL + crate::PEER_ACTIVITY_TIMEOUT_MS;
        let _ = node.process_background_tasks(later, &mut deadline);
        assert_eq!(hooks.wire_sends_to(&endpoint), 1);
    }

    #[test]
    fn test_online_without_anchors() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        assert!(!node.status().online);

        let mut deadline = 0u64;
        let _ = node.process_background_tasks(INTERVAL, &mut deadline);
        assert!(node.status().online);
        assert!(hooks.events.lock().unwrap().contains(&Event::Online));
    }

    #[test]
    fn test_offline_until_anchor_heard() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(
            &hooks,
            "supernodes=aabbccddee=10.0.0.1:9993\\n\n",
        );

        let mut deadline = 0u64;
        let _ = node.process_background_tasks(INTERVAL, &mut deadline);
        assert!(!node.status().online);
        assert!(!hooks.events.lock().unwrap().contains(&Event::Online));

        // The anchor answers; the next pass reports online.
        let anchor = node
            .runtime()
            .topology()
            .peer(Address::from_u64(0xaabbccddee))
            .unwrap();
        anchor.received(INTERVAL + 5);
        let _ = node.process_background_tasks(2 * INTERVAL, &mut deadline);
        assert!(node.status().online);
        assert!(hooks.events.lock().unwrap().contains(&Event::Online));
    }

    #[test]
    fn test_housekeeping_expires_silent_peers() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        node.runtime()
            .topology()
            .add_peer(Address::from_u64(0x42), Some("10.9.9.9:7000".parse().unwrap()));
        assert_eq!(node.status().peer_count, 1);

        let mut deadline = 0u64;
        let _ = node.process_background_tasks(crate::PEER_EXPIRATION_MS + 1, &mut deadline);
        assert_eq!(node.status().peer_count, 0);
    }

    #[test]
    fn test_deadline_always_ahead_of_now() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        let mut deadline = 0u64;
        for step in 1..6u64 {
            let now = step * 3_000;
            let rc = node.process_background_tasks(now, &mut deadline);
            assert_eq!(rc, ResultCode::Ok);
            assert!(deadline > now);
            assert!(deadline - now >= crate::TIMER_TASK_GRANULARITY_MS);
        }
    }

    #[test]
    fn test_parked_frame_delivered_once_peer_appears() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        let _ = node.join(7);

        let dest_addr = Address::from_u64(0x42);
        let endpoint: SocketAddr = "10.9.9.9:7000".parse().unwrap();
        let src = Mac::from_address(node.address(), 7);
        let dst = Mac::from_address(dest_addr, 7);

        // The destination is unknown: the frame parks instead of sending.
        let mut deadline = u64::MAX;
        let rc = node.process_virtual_network_frame(
            1_000, 7, src, dst, 0x0800, 0, b"parked until peer known", &mut deadline,
        );
        assert_eq!(rc, ResultCode::Ok);
        assert_eq!(hooks.wire_sends_to(&endpoint), 0);

        // The peer appears; the next timer pass delivers the frame.
        node.runtime().topology().add_peer(dest_addr, Some(endpoint));
        let mut deadline = 0u64;
        let _ = node.process_background_tasks(2_000, &mut deadline);
        assert_eq!(hooks.wire_sends_to(&endpoint), 1);

        // One delivery only.
        let _ = node.process_background_tasks(3_000, &mut deadline);
        assert_eq!(hooks.wire_sends_to(&endpoint), 1);
    }

    #[test]
    fn test_excessive_link_desperation_rejected() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        let mut deadline = u64::MAX;
        let rc = node.process_wire_packet(
            1,
            "10.0.0.1:1".parse().unwrap(),
            256,
            &[],
            &mut deadline,
        );
        assert_eq!(rc, ResultCode::BadParameter);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let hooks = Arc::new(TestHooks::default());
        let node = new_node(&hooks, "");
        let _ = node.join(1);
        let mut deadline = u64::MAX;
        let rc = node.process_virtual_network_frame(
            1,
            1,
            Mac::from_u64(2),
            Mac::from_u64(3),
            0x0800,
            0,
            &vec![0u8; crate::MAX_FRAME_LEN + 1],
            &mut deadline,
        );
        assert_eq!(rc, ResultCode::BadParameter);
    }
}
