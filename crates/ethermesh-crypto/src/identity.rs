//! Node Identity
//!
//! A node identity is an Ed25519 signing keypair plus an X25519 agreement
//! keypair, addressed by a 40-bit short address derived from the public
//! halves. Identities serialize to a colon-separated string form:
//!
//! `<address-hex>:0:<signing-pub-hex><agreement-pub-hex>[:<signing-sec-hex><agreement-sec-hex>]`
//!
//! The trailing secret section is present only in the durable secret form.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{
    Signature as Ed25519Sig, Signer, SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ADDRESS_SIZE, ED25519_PUBKEY_SIZE, ED25519_SECRET_SIZE, SIGNATURE_SIZE, X25519_KEY_SIZE,
};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PublicKey, SecretKey};

/// Serialized identity type marker; only type 0 (ed25519+x25519) exists.
const IDENTITY_TYPE_0: &str = "0";

/// A 40-bit short node address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(u64);

/// Ed25519 signature over a control document or payload
#[derive(Clone, Copy)]
pub struct Signature {
    bytes: [u8; SIGNATURE_SIZE],
}

/// The private half of an identity
#[derive(Clone)]
struct IdentitySecret {
    signing: SigningKey,
    agreement: SecretKey,
}

/// A node's identity, with or without its private half
#[derive(Clone)]
pub struct Identity {
    address: Address,
    signing_public: VerifyingKey,
    agreement_public: PublicKey,
    secret: Option<IdentitySecret>,
}

impl Address {
    /// Create from a 5-byte big-endian slice
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: ADDRESS_SIZE,
                actual: bytes.len(),
            });
        }
        let mut n = 0u64;
        for b in bytes {
            n = (n << 8) | u64::from(*b);
        }
        Ok(Self(n))
    }

    /// Create from an integer, keeping the low 40 bits
    pub fn from_u64(n: u64) -> Self {
        Self(n & 0xff_ffff_ffff)
    }

    /// The address as an integer
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// The address as 5 big-endian bytes
    pub fn to_bytes(self) -> [u8; ADDRESS_SIZE] {
        let mut out = [0u8; ADDRESS_SIZE];
        for (i, b) in out.iter_mut().enumerate() {
            *b = (self.0 >> (8 * (ADDRESS_SIZE - 1 - i))) as u8;
        }
        out
    }

    /// Reserved addresses are never assigned to identities
    pub fn is_reserved(self) -> bool {
        self.0 == 0 || (self.0 >> 32) == 0xff
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010x}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:010x})", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        if s.len() != ADDRESS_SIZE * 2 {
            return Err(CryptoError::MalformedIdentity(format!(
                "address must be {} hex characters",
                ADDRESS_SIZE * 2
            )));
        }
        let n = u64::from_str_radix(s, 16)
            .map_err(|_| CryptoError::MalformedIdentity("invalid address hex".into()))?;
        Ok(Self::from_u64(n))
    }
}

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self { bytes }
    }

    /// Try to create from a slice
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature);
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex_encode(&self.bytes[..4]))
    }
}

/// Derive the short address from the two public keys. Rehashes with a
/// counter until the result avoids the reserved prefixes.
fn derive_address(signing: &[u8; ED25519_PUBKEY_SIZE], agreement: &[u8; X25519_KEY_SIZE]) -> Address {
    let mut counter = 0u64;
    loop {
        let mut hasher = blake3::Hasher::new();
        hasher.update(signing);
        hasher.update(agreement);
        hasher.update(&counter.to_le_bytes());
        let digest = hasher.finalize();
        let addr = Address::from_bytes(&digest.as_bytes()[..ADDRESS_SIZE])
            .expect("digest longer than address");
        if !addr.is_reserved() {
            return addr;
        }
        counter += 1;
    }
}

impl Identity {
    /// Generate a new random identity with a private half
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let agreement = SecretKey::generate();
        let signing_public = signing.verifying_key();
        let agreement_public = agreement.public_key();
        let address = derive_address(&signing_public.to_bytes(), agreement_public.as_bytes());

        Self {
            address,
            signing_public,
            agreement_public,
            secret: Some(IdentitySecret { signing, agreement }),
        }
    }

    /// The node's short address
    pub fn address(&self) -> Address {
        self.address
    }

    /// True if the private half is present
    pub fn has_private(&self) -> bool {
        self.secret.is_some()
    }

    /// The Ed25519 verifying (public) key
    pub fn signing_key(&self) -> &VerifyingKey {
        &self.signing_public
    }

    /// Sign a message with the private half
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        let secret = self.secret.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
        let sig = secret.signing.sign(message);
        Ok(Signature::from_bytes(sig.to_bytes()))
    }

    /// Public string form (no secret material)
    pub fn to_public_string(&self) -> String {
        format!(
            "{}:{}:{}{}",
            self.address,
            IDENTITY_TYPE_0,
            hex_encode(&self.signing_public.to_bytes()),
            hex_encode(self.agreement_public.as_bytes()),
        )
    }

    /// Secret string form, suitable for durable storage with restricted
    /// permissions
    pub fn to_secret_string(&self) -> CryptoResult<String> {
        let secret = self.secret.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
        Ok(format!(
            "{}:{}{}",
            self.to_public_string(),
            hex_encode(&secret.signing.to_bytes()),
            hex_encode(&secret.agreement.to_bytes()),
        ))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_public_string())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Identity({}{})",
            self.address,
            if self.has_private() { ", private" } else { "" }
        )
    }
}

impl FromStr for Identity {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(CryptoError::MalformedIdentity(
                "expected 3 or 4 colon-separated fields".into(),
            ));
        }

        let address = Address::from_str(parts[0])?;
        if parts[1] != IDENTITY_TYPE_0 {
            return Err(CryptoError::MalformedIdentity(format!(
                "unknown identity type {:?}",
                parts[1]
            )));
        }

        let public = hex_decode(parts[2])?;
        if public.len() != ED25519_PUBKEY_SIZE + X25519_KEY_SIZE {
            return Err(CryptoError::MalformedIdentity(
                "public key section has wrong length".into(),
            ));
        }
        let mut signing_bytes = [0u8; ED25519_PUBKEY_SIZE];
        signing_bytes.copy_from_slice(&public[..ED25519_PUBKEY_SIZE]);
        let signing_public = VerifyingKey::from_bytes(&signing_bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let agreement_public = PublicKey::try_from_slice(&public[ED25519_PUBKEY_SIZE..])?;

        if derive_address(&signing_bytes, agreement_public.as_bytes()) != address {
            return Err(CryptoError::MalformedIdentity(
                "address does not match public keys".into(),
            ));
        }

        let secret = if parts.len() == 4 {
            let sec = hex_decode(parts[3])?;
            if sec.len() != ED25519_SECRET_SIZE + X25519_KEY_SIZE {
                return Err(CryptoError::MalformedIdentity(
                    "secret key section has wrong length".into(),
                ));
            }
            let mut signing_sec = [0u8; ED25519_SECRET_SIZE];
            signing_sec.copy_from_slice(&sec[..ED25519_SECRET_SIZE]);
            let mut agreement_sec = [0u8; X25519_KEY_SIZE];
            agreement_sec.copy_from_slice(&sec[ED25519_SECRET_SIZE..]);

            let signing = SigningKey::from_bytes(&signing_sec);
            if signing.verifying_key() != signing_public {
                return Err(CryptoError::MalformedIdentity(
                    "secret key does not match public key".into(),
                ));
            }
            let agreement = SecretKey::from_bytes(agreement_sec);
            if agreement.public_key() != agreement_public {
                return Err(CryptoError::MalformedIdentity(
                    "agreement secret does not match public key".into(),
                ));
            }
            Some(IdentitySecret { signing, agreement })
        } else {
            None
        };

        Ok(Self {
            address,
            signing_public,
            agreement_public,
            secret,
        })
    }
}

/// Verify a detached signature against a bare Ed25519 verifying key, as
/// used for control documents signed by a configured authority rather than
/// a full node identity.
pub fn verify_signature(
    public_key: &[u8; ED25519_PUBKEY_SIZE],
    message: &[u8],
    signature: &Signature,
) -> CryptoResult<()> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Ed25519Sig::from_bytes(signature.as_bytes());
    key.verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

// Helper functions for hex encoding/decoding
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(hex: &str) -> CryptoResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(CryptoError::MalformedIdentity("invalid hex length".into()));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CryptoError::MalformedIdentity("invalid hex character".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_has_private() {
        let identity = Identity::generate();
        assert!(identity.has_private());
        assert!(!identity.address().is_reserved());
    }

    #[test]
    fn test_secret_string_roundtrip() {
        let identity = Identity::generate();
        let secret = identity.to_secret_string().unwrap();
        let restored: Identity = secret.parse().unwrap();

        assert!(restored.has_private());
        assert_eq!(identity.address(), restored.address());
        assert_eq!(identity.to_public_string(), restored.to_public_string());
    }

    #[test]
    fn test_public_string_roundtrip() {
        let identity = Identity::generate();
        let public = identity.to_public_string();
        let restored: Identity = public.parse().unwrap();

        assert!(!restored.has_private());
        assert_eq!(identity.address(), restored.address());
        assert!(restored.to_secret_string().is_err());
    }

    #[test]
    fn test_sign_verify() {
        let identity = Identity::generate();
        let message = b"supernodes=...";
        let signature = identity.sign(message).unwrap();

        let key = identity.signing_key().to_bytes();
        assert!(verify_signature(&key, message, &signature).is_ok());
        assert!(verify_signature(&key, b"something else", &signature).is_err());

        let public: Identity = identity.to_public_string().parse().unwrap();
        assert_eq!(public.signing_key().to_bytes(), key);
        assert!(public.sign(message).is_err());
    }

    #[test]
    fn test_tampered_address_rejected() {
        let identity = Identity::generate();
        let mut s = identity.to_public_string();
        // Flip a character of the address section.
        let first = if s.starts_with('0') { "1" } else { "0" };
        s.replace_range(0..1, first);
        assert!(s.parse::<Identity>().is_err());
    }

    #[test]
    fn test_malformed_strings_rejected() {
        assert!("".parse::<Identity>().is_err());
        assert!("zzzz".parse::<Identity>().is_err());
        assert!("0123456789:7:aabb".parse::<Identity>().is_err());
    }

    #[test]
    fn test_address_bytes_roundtrip() {
        let addr = Address::from_u64(0x1234567890);
        assert_eq!(Address::from_bytes(&addr.to_bytes()).unwrap(), addr);
        assert_eq!(addr.to_string(), "1234567890");
        assert_eq!("1234567890".parse::<Address>().unwrap(), addr);
    }
}
