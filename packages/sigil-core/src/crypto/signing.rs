//! # Signing Module
//!
//! Ed25519 signatures over OpenPGP signature digests.
//!
//! OpenPGP never signs the message bytes directly: the signature packet
//! hashes the data plus a trailer, and the digest is what Ed25519 signs.
//!
//! ```text
//! data ──► Hasher ──► + hashed subpackets + trailer ──► digest ──► sign()
//! ```
//!
//! | Property | Value |
//! |----------|-------|
//! | Signature size | 64 bytes (R ‖ S) |
//! | Public key size | 32 bytes |
//! | Deterministic | Yes |

use ed25519_dalek::{Signature as Ed25519Signature, Signer};

use super::keys::{verifying_key_from_bytes, SigningKeyPair};
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = bytes.try_into().map_err(|_| {
            Error::MalformedPacket(format!(
                "Ed25519 signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

/// Sign a digest with a signing keypair
pub fn sign(keypair: &SigningKeyPair, digest: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(digest);
    Signature(sig.to_bytes())
}

/// Verify a signature over a digest
///
/// ## Returns
///
/// `Ok(true)` if valid, `Ok(false)` if the signature does not match, and an
/// error only when the public key itself is unusable.
pub fn verify(public_key: &[u8; 32], digest: &[u8], signature: &Signature) -> Result<bool> {
    let verifying_key = verifying_key_from_bytes(public_key)?;
    let sig = Ed25519Signature::from_bytes(&signature.0);
    Ok(verifying_key.verify_strict(digest, &sig).is_ok())
}

// ============================================================================
// TESTS
// ============================================================================
