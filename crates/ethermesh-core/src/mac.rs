//! Ethernet MAC addresses
//!
//! Participant MACs are not arbitrary: a node's MAC on a network is derived
//! from its 40-bit address and the network id, so the switch can recover
//! the destination node address from a frame's destination MAC without a
//! lookup table.

use std::fmt;

use serde::{Deserialize, Serialize};

use ethermesh_crypto::Address;

/// A 48-bit Ethernet MAC
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mac(u64);

/// Mixing ladder applied to the low 40 bits; XOR-based, so derivation and
/// recovery are the same operation.
fn mix(low40: u64, nwid: u64) -> u64 {
    let mut n = low40;
    for (to, from) in [(32u32, 8u32), (24, 16), (16, 24), (8, 32), (0, 40)] {
        n ^= ((nwid >> from) & 0xff) << to;
    }
    n & 0xff_ffff_ffff
}

impl Mac {
    /// Broadcast address ff:ff:ff:ff:ff:ff
    pub const BROADCAST: Mac = Mac(0xffff_ffff_ffff);

    /// Create from an integer, keeping the low 48 bits
    pub fn from_u64(n: u64) -> Self {
        Self(n & 0xffff_ffff_ffff)
    }

    /// The MAC as an integer
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Create from 6 big-endian bytes
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let mut n = 0u64;
        for b in bytes {
            n = (n << 8) | u64::from(b);
        }
        Self(n)
    }

    /// The MAC as 6 big-endian bytes
    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (i, b) in out.iter_mut().enumerate() {
            *b = (self.0 >> (8 * (5 - i))) as u8;
        }
        out
    }

    /// First octet of every participant MAC on `nwid`: locally
    /// administered, unicast, and varying with the network id.
    pub fn first_octet_for_network(nwid: u64) -> u8 {
        ((nwid & 0xfe) as u8) | 0x02
    }

    /// The MAC a node with `address` presents on network `nwid`
    pub fn from_address(address: Address, nwid: u64) -> Self {
        let first = u64::from(Self::first_octet_for_network(nwid));
        Self((first << 40) | mix(address.to_u64(), nwid))
    }

    /// Recover the node address behind this MAC on network `nwid`
    pub fn to_address(self, nwid: u64) -> Address {
        Address::from_u64(mix(self.0 & 0xff_ffff_ffff, nwid))
    }

    /// Group bit of the first octet
    pub fn is_multicast(self) -> bool {
        (self.0 >> 40) & 0x01 != 0
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip() {
        let mac = Mac::from_bytes([0x02, 0x1d, 0x9e, 0x00, 0x51, 0xfa]);
        assert_eq!(Mac::from_bytes(mac.to_bytes()), mac);
        assert_eq!(mac.to_string(), "02:1d:9e:00:51:fa");
    }

    #[test]
    fn test_address_derivation_roundtrip() {
        let nwid = 0x8056c2e21c000001u64;
        for raw in [0x1u64, 0x1234567890, 0xff_ffff_fffe] {
            let addr = Address::from_u64(raw);
            let mac = Mac::from_address(addr, nwid);
            assert_eq!(mac.to_address(nwid), addr);
            assert!(!mac.is_multicast());
        }
    }

    #[test]
    fn test_derived_macs_differ_across_networks() {
        let addr = Address::from_u64(0x1234567890);
        let a = Mac::from_address(addr, 1);
        let b = Mac::from_address(addr, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_multicast_and_broadcast() {
        assert!(Mac::BROADCAST.is_multicast());
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(Mac::from_bytes([0x01, 0, 0x5e, 0, 0, 0x01]).is_multicast());
        assert!(!Mac::from_bytes([0x02, 0, 0x5e, 0, 0, 0x01]).is_multicast());
    }
}
