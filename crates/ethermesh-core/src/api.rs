//! Embedding surface types
//!
//! Result codes, status events and the owned snapshot structs returned by
//! the query surface. Snapshots are point-in-time copies; they never alias
//! the node's live state and are released by ordinary `Drop`.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::mac::Mac;
use crate::multicaster::MulticastGroup;
use crate::peer::PeerRole;
use ethermesh_crypto::Address;

/// Outcome of an embedding-surface call.
///
/// `Fatal*` codes report a failure of the call, not of the node; the host
/// decides whether to destroy the node after one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum ResultCode {
    Ok,
    BadParameter,
    PacketInvalid,
    NetworkNotFound,
    FatalInternal,
    FatalOutOfMemory,
    FatalDataStoreFailed,
}

impl ResultCode {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ResultCode::FatalInternal | ResultCode::FatalOutOfMemory | ResultCode::FatalDataStoreFailed
        )
    }
}

/// Lifecycle and status events delivered through the status hook
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// The node constructed successfully and is ready for traffic
    Up,
    /// No trust anchor has been heard from recently
    Offline,
    /// A trust anchor is reachable again
    Online,
    /// The node is shutting down
    Down,
    /// Another node holds this node's address with a different identity
    FatalErrorIdentityCollision,
    /// A peer advertised a build newer than any seen so far
    SawMoreRecentVersion,
    /// Diagnostic trace output
    Trace,
    /// A persisted control document failed authentication
    AuthenticationFailure,
    /// An inbound packet was rejected as malformed
    InvalidPacket,
    /// A remote peer forwarded trace output
    RemoteTrace,
}

/// What happened to a network's externally visible configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualNetworkConfigOperation {
    /// First configuration arrived; the network is usable
    Up,
    /// An existing configuration was refreshed
    ConfigUpdate,
    /// The network is administratively down
    Down,
    /// The network was left and is being torn down
    Destroy,
}

/// Configuration state of a joined network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualNetworkStatus {
    RequestingConfiguration,
    Ok,
    AccessDenied,
    NotFound,
}

/// Point-in-time node status
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub address: Address,
    pub public_identity: String,
    pub online: bool,
    pub core_desperation: u32,
    pub peer_count: usize,
    pub network_count: usize,
    /// Externally observed endpoints reported by peers
    pub external_addresses: Vec<SocketAddr>,
    pub version: (u16, u16, u16),
}

/// Point-in-time view of one known peer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub address: Address,
    pub role: PeerRole,
    pub endpoint: Option<SocketAddr>,
    pub last_receive: u64,
    pub last_send: u64,
    pub remote_version: Option<(u16, u16, u16)>,
}

/// Point-in-time view of one joined network
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualNetworkSnapshot {
    pub nwid: u64,
    /// This node's MAC on the network
    pub mac: Mac,
    pub name: String,
    pub status: VirtualNetworkStatus,
    pub mtu: u16,
    pub enable_broadcast: bool,
    pub multicast_subscriptions: Vec<MulticastGroup>,
    pub last_config_update: u64,
}

/// Set on every build: entry points are safe to call from multiple threads
pub const FEATURE_FLAG_THREAD_SAFE: u64 = 1 << 0;

/// Set on official project builds
pub const FEATURE_FLAG_OFFICIAL: u64 = 1 << 1;

/// Build version and feature flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub revision: u16,
    pub feature_flags: u64,
}

/// The local build's version and feature flags
pub fn version() -> Version {
    let mut feature_flags = FEATURE_FLAG_THREAD_SAFE;
    if cfg!(feature = "official") {
        feature_flags |= FEATURE_FLAG_OFFICIAL;
    }
    Version {
        major: crate::VERSION_MAJOR,
        minor: crate::VERSION_MINOR,
        revision: crate::VERSION_REVISION,
        feature_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_codes() {
        assert!(!ResultCode::Ok.is_fatal());
        assert!(!ResultCode::NetworkNotFound.is_fatal());
        assert!(ResultCode::FatalInternal.is_fatal());
        assert!(ResultCode::FatalDataStoreFailed.is_fatal());
    }

    #[test]
    fn test_version_reports_thread_safety() {
        let v = version();
        assert_ne!(v.feature_flags & FEATURE_FLAG_THREAD_SAFE, 0);
        assert_eq!(
            (v.major, v.minor, v.revision),
            (crate::VERSION_MAJOR, crate::VERSION_MINOR, crate::VERSION_REVISION)
        );
    }
}
