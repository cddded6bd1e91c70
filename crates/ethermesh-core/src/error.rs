//! Core errors
//!
//! Internal fallible paths use [`CoreError`] with `?`; the embedding entry
//! points are the catch boundary where errors become [`ResultCode`]s. No
//! error crosses the embedding surface as a panic.

use thiserror::Error;

use crate::api::ResultCode;

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Writing a blob through the host data store failed during bootstrap
    #[error("data store write failed: {0}")]
    DataStoreFailed(String),

    /// Identity material could not be parsed or used
    #[error("identity error: {0}")]
    Identity(#[from] ethermesh_crypto::CryptoError),

    /// A wire packet was malformed or otherwise unusable
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// The given network id is not joined
    #[error("network {0:#018x} not found")]
    NetworkNotFound(u64),

    /// A caller-supplied argument was unusable
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// Control payload encode/decode failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal invariant breach
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// The embedding-surface code this error maps to
    pub fn result_code(&self) -> ResultCode {
        match self {
            CoreError::DataStoreFailed(_) => ResultCode::FatalDataStoreFailed,
            CoreError::InvalidPacket(_) => ResultCode::PacketInvalid,
            CoreError::NetworkNotFound(_) => ResultCode::NetworkNotFound,
            CoreError::BadParameter(_) => ResultCode::BadParameter,
            CoreError::Serialization(_) => ResultCode::PacketInvalid,
            CoreError::Identity(_) | CoreError::Internal(_) => ResultCode::FatalInternal,
        }
    }
}
