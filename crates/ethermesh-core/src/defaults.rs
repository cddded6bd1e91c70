//! Compiled-in trust defaults
//!
//! Used when the host supplies no root-topology override and the data store
//! holds no authenticated replacement.

/// Default root topology: the project's well-known supernodes. Trusted
/// as-is; authentication applies only to documents loaded from the data
/// store.
pub const DEFAULT_ROOT_TOPOLOGY: &str =
    "supernodes=8a5c1e92bd=198.51.100.7:9993\\nd4f21b06ae=203.0.113.40:9993\\n\n";

/// Ed25519 verifying key that must have signed any `root-topology` blob
/// loaded from the data store.
pub const ROOT_TOPOLOGY_AUTHORITY: [u8; 32] = [
    0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66,
];
