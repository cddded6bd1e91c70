//! Ethermesh Identity Primitives
//!
//! This crate provides the cryptographic identity of an ethermesh node:
//! - Ed25519 signing keypair for authentication
//! - X25519 agreement key material, consumed by the session layer
//! - The 40-bit short address derived from both public keys
//! - Signatures over control documents (e.g. the root topology)

pub mod error;
pub mod identity;
pub mod keys;

pub use error::{CryptoError, CryptoResult};
pub use identity::{verify_signature, Address, Identity, Signature};
pub use keys::{PublicKey, SecretKey};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::*;
    pub use crate::identity::*;
    pub use crate::keys::*;
}

/// Protocol constants
pub mod constants {
    /// Short node address size in bytes (40 bits)
    pub const ADDRESS_SIZE: usize = 5;

    /// X25519 key size in bytes
    pub const X25519_KEY_SIZE: usize = 32;

    /// Ed25519 public key size
    pub const ED25519_PUBKEY_SIZE: usize = 32;

    /// Ed25519 secret seed size
    pub const ED25519_SECRET_SIZE: usize = 32;

    /// Ed25519 signature size
    pub const SIGNATURE_SIZE: usize = 64;
}
