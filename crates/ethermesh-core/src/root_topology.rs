//! Root topology: the signed supernode list
//!
//! A dictionary document naming the overlay's trust anchors. Each entry of
//! the `supernodes` sub-dictionary maps a node address to a comma-separated
//! endpoint list. A document loaded from the data store must carry a valid
//! `signature` entry from the configured authority; the compiled-in default
//! and a host-supplied override are trusted as-is.

use std::net::SocketAddr;
use std::str::FromStr;

use tracing::warn;

use crate::dictionary::Dictionary;
use ethermesh_crypto::{verify_signature, Address, CryptoResult, Identity, Signature};

/// Dictionary key holding the supernode sub-dictionary
pub const SUPERNODES_KEY: &str = "supernodes";

/// Dictionary key holding the authority signature
pub const SIGNATURE_KEY: &str = "signature";

/// One trust anchor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Supernode {
    pub address: Address,
    pub endpoints: Vec<SocketAddr>,
}

/// The parsed supernode set of a root-topology document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootTopology {
    supernodes: Vec<Supernode>,
}

impl RootTopology {
    /// Extract the supernode set from a document. Lenient: entries that do
    /// not parse are skipped with a warning, matching the treatment of any
    /// other damaged control input.
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let mut supernodes = Vec::new();
        let sub = dict.sub_dictionary(SUPERNODES_KEY).unwrap_or_default();
        for (addr_hex, endpoint_list) in sub.iter() {
            let address = match Address::from_str(addr_hex) {
                Ok(a) => a,
                Err(e) => {
                    warn!(entry = addr_hex, "skipping supernode with bad address: {}", e);
                    continue;
                }
            };
            let endpoints: Vec<SocketAddr> = endpoint_list
                .split(',')
                .filter_map(|ep| match ep.trim().parse() {
                    Ok(sa) => Some(sa),
                    Err(_) => {
                        warn!(%address, endpoint = ep, "skipping unparseable supernode endpoint");
                        None
                    }
                })
                .collect();
            if endpoints.is_empty() {
                warn!(%address, "skipping supernode with no usable endpoint");
                continue;
            }
            supernodes.push(Supernode { address, endpoints });
        }
        Self { supernodes }
    }

    pub fn supernodes(&self) -> &[Supernode] {
        &self.supernodes
    }

    pub fn is_empty(&self) -> bool {
        self.supernodes.is_empty()
    }
}

/// Check a document's authority signature. The signature covers the
/// canonical serialization of every entry except the signature itself.
pub fn authenticate(dict: &Dictionary, authority: &[u8; 32]) -> bool {
    let sig_hex = match dict.get(SIGNATURE_KEY) {
        Some(s) => s,
        None => return false,
    };
    let sig_bytes = match decode_hex(sig_hex) {
        Some(b) => b,
        None => return false,
    };
    let signature = match Signature::try_from_slice(&sig_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let mut unsigned = dict.clone();
    unsigned.remove(SIGNATURE_KEY);
    verify_signature(authority, unsigned.to_string().as_bytes(), &signature).is_ok()
}

/// Sign a document in place with an authority identity, replacing any
/// existing signature entry.
pub fn sign(dict: &mut Dictionary, authority: &Identity) -> CryptoResult<()> {
    dict.remove(SIGNATURE_KEY);
    let signature = authority.sign(dict.to_string().as_bytes())?;
    let hex: String = signature.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
    dict.set(SIGNATURE_KEY, &hex);
    Ok(())
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
