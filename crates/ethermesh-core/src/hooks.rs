//! Host embedding contract
//!
//! The node performs no I/O of its own. Everything durable or network-
//! facing goes through [`HostHooks`], supplied at construction and never
//! replaced. Hooks are invoked synchronously and with no core-owned lock
//! held, so a hook may call back into the node's query surface; it must
//! not synchronously re-enter `process_background_tasks`.

use std::net::SocketAddr;

use crate::api::{Event, VirtualNetworkConfigOperation, VirtualNetworkSnapshot};
use crate::mac::Mac;
use crate::network::NetworkConfig;
use ethermesh_crypto::Address;

/// One chunk of a stored blob, plus the blob's total length so the reader
/// knows whether to keep requesting.
#[derive(Clone, Debug)]
pub struct DataChunk {
    pub data: Vec<u8>,
    pub total_len: u64,
}

/// Callbacks the host provides to a node
pub trait HostHooks: Send + Sync {
    /// Read part of a named blob starting at `read_offset`. `None` means
    /// the blob is absent or unreadable.
    fn data_store_get(&self, name: &str, read_offset: u64) -> Option<DataChunk>;

    /// Atomically write a named blob. `secure` requests restricted
    /// permissions on the stored copy. Returns false on failure.
    fn data_store_put(&self, name: &str, data: &[u8], secure: bool) -> bool;

    /// Emit a datagram toward a remote node. `link_desperation` is the
    /// core's current escalation level for path selection. Returns false
    /// if the send was definitely not made.
    fn wire_packet_send(&self, remote: SocketAddr, link_desperation: u32, data: &[u8]) -> bool;

    /// Deliver a decoded Ethernet frame to the host's tap for `nwid`
    fn virtual_network_frame(
        &self,
        nwid: u64,
        source_mac: Mac,
        dest_mac: Mac,
        ether_type: u16,
        vlan_id: u16,
        data: &[u8],
    );

    /// Report a change to a joined network's configuration
    fn virtual_network_config(
        &self,
        nwid: u64,
        op: VirtualNetworkConfigOperation,
        config: &VirtualNetworkSnapshot,
    );

    /// Report a lifecycle or status event
    fn status_event(&self, event: Event);
}

/// Outcome of a configuration request to a controller
#[derive(Clone, Debug)]
pub enum NetworkConfigAnswer {
    /// The requester is admitted; here is the configuration
    Ok(NetworkConfig),
    /// The network exists but does not admit the requester (private
    /// networks admit only authorized members)
    AccessDenied,
    /// The controller serves no such network
    NotFound,
}

/// Optional host-side network configuration master.
///
/// When installed, a joined network's configuration requests are answered
/// locally instead of being deferred to the overlay.
pub trait NetworkController: Send + Sync {
    /// Decide whether `requester` may use `nwid` and with what
    /// configuration.
    fn network_config_request(&self, requester: Address, nwid: u64) -> NetworkConfigAnswer;
}
