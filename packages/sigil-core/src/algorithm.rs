//! # Algorithm Identifiers
//!
//! Typed OpenPGP algorithm ids and key capability flags.
//!
//! | Registry | Supported | Wire id |
//! |----------|-----------|---------|
//! | Symmetric | AES-128, AES-256 | 7, 9 |
//! | Hash | SHA-256, SHA-512 | 8, 10 |
//! | Public key | X25519, Ed25519 | 25, 27 |
//! | AEAD | GCM | 3 |
//! | Compression | Uncompressed, ZLIB | 0, 2 |
//!
//! Weak or legacy algorithms are deliberately absent: a value of these types
//! is always something Sigil can produce and consume.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

// ============================================================================
// SYMMETRIC
// ============================================================================

/// Symmetric cipher used for message encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymmetricKeyAlgorithm {
    /// AES with 128-bit key
    #[serde(rename = "AES_128")]
    Aes128,
    /// AES with 256-bit key
    #[serde(rename = "AES_256")]
    Aes256,
}

impl SymmetricKeyAlgorithm {
    /// OpenPGP algorithm id
    pub fn id(self) -> u8 {
        match self {
            SymmetricKeyAlgorithm::Aes128 => 7,
            SymmetricKeyAlgorithm::Aes256 => 9,
        }
    }

    /// Parse an OpenPGP algorithm id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            7 => Ok(SymmetricKeyAlgorithm::Aes128),
            9 => Ok(SymmetricKeyAlgorithm::Aes256),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "symmetric algorithm {}",
                other
            ))),
        }
    }

    /// Key length in bytes
    pub fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Aes128 => 16,
            SymmetricKeyAlgorithm::Aes256 => 32,
        }
    }
}

// ============================================================================
// HASH
// ============================================================================

/// Digest used for signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256
    #[serde(rename = "SHA256")]
    Sha256,
    /// SHA-512
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// OpenPGP algorithm id
    pub fn id(self) -> u8 {
        match self {
            HashAlgorithm::Sha256 => 8,
            HashAlgorithm::Sha512 => 10,
        }
    }

    /// Parse an OpenPGP algorithm id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            8 => Ok(HashAlgorithm::Sha256),
            10 => Ok(HashAlgorithm::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!("hash algorithm {}", other))),
        }
    }

    /// Start a fresh hashing context
    pub fn new_hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

/// Running hash context for one of the supported digests
#[derive(Clone)]
pub enum Hasher {
    /// SHA-256 context
    Sha256(Sha256),
    /// SHA-512 context
    Sha512(Sha512),
}

impl Hasher {
    /// Feed bytes into the context
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    /// Consume the context and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
        }
    }

    /// Algorithm of this context
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Hasher::Sha256(_) => HashAlgorithm::Sha256,
            Hasher::Sha512(_) => HashAlgorithm::Sha512,
        }
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Hasher").field(&self.algorithm()).finish()
    }
}

// ============================================================================
// PUBLIC KEY
// ============================================================================

/// Public key algorithm of a key or subkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKeyAlgorithm {
    /// X25519 key agreement (encryption)
    X25519,
    /// Ed25519 signatures
    Ed25519,
}

impl PublicKeyAlgorithm {
    /// OpenPGP algorithm id
    pub fn id(self) -> u8 {
        match self {
            PublicKeyAlgorithm::X25519 => 25,
            PublicKeyAlgorithm::Ed25519 => 27,
        }
    }

    /// Parse an OpenPGP algorithm id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            25 => Ok(PublicKeyAlgorithm::X25519),
            27 => Ok(PublicKeyAlgorithm::Ed25519),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "public key algorithm {}",
                other
            ))),
        }
    }

    /// Whether keys of this algorithm can wrap session keys
    pub fn can_encrypt(self) -> bool {
        matches!(self, PublicKeyAlgorithm::X25519)
    }

    /// Whether keys of this algorithm can produce signatures
    pub fn can_sign(self) -> bool {
        matches!(self, PublicKeyAlgorithm::Ed25519)
    }
}

// ============================================================================
// AEAD
// ============================================================================

/// AEAD mode used by version 2 encrypted data packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    /// Galois/Counter Mode
    #[serde(rename = "GCM")]
    Gcm,
}

impl AeadAlgorithm {
    /// OpenPGP algorithm id
    pub fn id(self) -> u8 {
        match self {
            AeadAlgorithm::Gcm => 3,
        }
    }

    /// Parse an OpenPGP algorithm id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            3 => Ok(AeadAlgorithm::Gcm),
            other => Err(Error::UnsupportedAlgorithm(format!("AEAD algorithm {}", other))),
        }
    }

    /// Nonce length in bytes
    pub fn nonce_size(self) -> usize {
        match self {
            AeadAlgorithm::Gcm => 12,
        }
    }

    /// Authentication tag length in bytes
    pub fn tag_size(self) -> usize {
        match self {
            AeadAlgorithm::Gcm => 16,
        }
    }
}

// ============================================================================
// COMPRESSION
// ============================================================================

/// Compression applied inside the encrypted data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// No compressed data packet is emitted
    #[serde(rename = "UNCOMPRESSED")]
    Uncompressed,
    /// RFC 1950 zlib stream
    #[serde(rename = "ZLIB")]
    Zlib,
}

impl CompressionAlgorithm {
    /// OpenPGP algorithm id
    pub fn id(self) -> u8 {
        match self {
            CompressionAlgorithm::Uncompressed => 0,
            CompressionAlgorithm::Zlib => 2,
        }
    }

    /// Parse an OpenPGP algorithm id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(CompressionAlgorithm::Uncompressed),
            2 => Ok(CompressionAlgorithm::Zlib),
            other => Err(Error::UnsupportedAlgorithm(format!(
                "compression algorithm {}",
                other
            ))),
        }
    }
}

// ============================================================================
// KEY FLAGS
// ============================================================================

bitflags! {
    /// Capabilities granted to a key or subkey
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyFlags: u8 {
        /// May certify other keys
        const CERTIFY_OTHER   = 0x01;
        /// May sign data
        const SIGN_DATA       = 0x02;
        /// May encrypt communications
        const ENCRYPT_COMMS   = 0x04;
        /// May encrypt storage
        const ENCRYPT_STORAGE = 0x08;
        /// May authenticate
        const AUTHENTICATION  = 0x20;
    }
}

impl KeyFlags {
    /// Whether either encryption flag is set
    pub fn can_encrypt(self) -> bool {
        self.intersects(KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE)
    }

    /// Whether the data signing flag is set
    pub fn can_sign(self) -> bool {
        self.contains(KeyFlags::SIGN_DATA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for alg in [SymmetricKeyAlgorithm::Aes128, SymmetricKeyAlgorithm::Aes256] {
            assert_eq!(SymmetricKeyAlgorithm::from_id(alg.id()).unwrap(), alg);
        }
        for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(HashAlgorithm::from_id(alg.id()).unwrap(), alg);
        }
        for alg in [PublicKeyAlgorithm::X25519, PublicKeyAlgorithm::Ed25519] {
            assert_eq!(PublicKeyAlgorithm::from_id(alg.id()).unwrap(), alg);
        }
        assert!(SymmetricKeyAlgorithm::from_id(2).is_err());
        assert!(HashAlgorithm::from_id(1).is_err());
        assert!(CompressionAlgorithm::from_id(1).is_err());
    }

    #[test]
    fn test_hasher_matches_direct_digest() {
        let mut hasher = HashAlgorithm::Sha256.new_hasher();
        hasher.update(b"abc");
        assert_eq!(hasher.finalize(), Sha256::digest(b"abc").to_vec());
    }

    #[test]
    fn test_key_flag_capabilities() {
        assert!(KeyFlags::ENCRYPT_STORAGE.can_encrypt());
        assert!(!KeyFlags::SIGN_DATA.can_encrypt());
        assert!((KeyFlags::CERTIFY_OTHER | KeyFlags::SIGN_DATA).can_sign());
    }
}
