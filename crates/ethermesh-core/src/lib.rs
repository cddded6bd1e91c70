//! Ethermesh Node Core
//!
//! The engine of a peer-to-peer virtual-Ethernet node. It multiplexes
//! 64-bit-identified overlay networks over an encrypted unicast transport:
//! - Node façade with a callback-based embedding interface
//! - Time-driven background loop (pings, housekeeping, deadlines)
//! - Network membership registry with join/leave/multicast semantics
//! - Root-of-trust bootstrap from a signed supernode document
//!
//! The host process owns all I/O: it feeds wire datagrams and tap frames in
//! through the three `process_*` entry points (each carrying the current
//! wall-clock time) and receives datagrams, decoded frames, configuration
//! changes and status events back through [`HostHooks`].

pub mod anti_recursion;
pub mod api;
pub mod config;
pub mod defaults;
pub mod dictionary;
pub mod error;
pub mod hooks;
pub mod mac;
pub mod multicaster;
pub mod network;
pub mod node;
pub mod peer;
pub mod root_topology;
pub mod runtime;
pub mod self_awareness;
pub mod switch;
pub mod topology;

pub use api::{
    version, Event, PeerSnapshot, ResultCode, StatusSnapshot, Version,
    VirtualNetworkConfigOperation, VirtualNetworkSnapshot, VirtualNetworkStatus,
    FEATURE_FLAG_OFFICIAL, FEATURE_FLAG_THREAD_SAFE,
};
pub use config::NodeConfig;
pub use dictionary::Dictionary;
pub use error::{CoreError, CoreResult};
pub use ethermesh_crypto::{Address, Identity};
pub use hooks::{DataChunk, HostHooks, NetworkConfigAnswer, NetworkController};
pub use mac::Mac;
pub use multicaster::MulticastGroup;
pub use network::NetworkConfig;
pub use node::Node;
pub use peer::PeerRole;
pub use root_topology::RootTopology;

/// Local build version, gossiped to peers and compared against versions
/// peers advertise.
pub const VERSION_MAJOR: u16 = 0;
pub const VERSION_MINOR: u16 = 9;
pub const VERSION_REVISION: u16 = 4;

/// How often the ping/keepalive pass of the background loop runs (ms)
pub const PING_CHECK_INTERVAL_MS: u64 = 10_000;

/// How often expired peer and multicast state is cleaned (ms)
pub const HOUSEKEEPING_PERIOD_MS: u64 = 120_000;

/// Floor on the background-task deadline so the host is never spun (ms)
pub const TIMER_TASK_GRANULARITY_MS: u64 = 500;

/// Desperation rises one level per this many ping intervals of
/// trust-anchor silence
pub const DESPERATION_INCREMENT: u64 = 2;

/// A joined network re-requests its configuration after this long (ms)
pub const NETWORK_AUTOCONF_DELAY_MS: u64 = 60_000;

/// An ordinary peer counts as alive if heard from within this window (ms)
pub const PEER_ACTIVITY_TIMEOUT_MS: u64 = 60_000;

/// Ordinary peers silent this long are dropped by housekeeping (ms)
pub const PEER_EXPIRATION_MS: u64 = 600_000;

/// Multicast subscriptions not renewed within this window expire (ms)
pub const MULTICAST_SUBSCRIPTION_EXPIRE_MS: u64 = 600_000;

/// Frames parked while awaiting a deliverable peer expire after this (ms)
pub const PENDING_FRAME_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on parked outbound frames
pub const MAX_PENDING_FRAMES: usize = 64;

/// Largest acceptable virtual-Ethernet frame payload
pub const MAX_FRAME_LEN: usize = 2800;

/// Largest acceptable wire datagram
pub const MAX_WIRE_PACKET_LEN: usize = 4096;

pub(crate) fn local_version() -> (u16, u16, u16) {
    (VERSION_MAJOR, VERSION_MINOR, VERSION_REVISION)
}
