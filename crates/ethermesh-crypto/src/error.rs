//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur during identity operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key length provided
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Identity string could not be parsed
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignature,

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Operation requires the private half of an identity
    #[error("Identity has no private key")]
    MissingPrivateKey,
}

/// Result type for identity operations
pub type CryptoResult<T> = Result<T, CryptoError>;
