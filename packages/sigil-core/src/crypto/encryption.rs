//! # Encryption Module
//!
//! AES-GCM primitives for the message body and for wrapping session keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SESSION KEY FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SessionKey::generate(alg)      random 16 or 32 bytes from OsRng        │
//! │           │                                                             │
//! │           ├──► wrapped once per recipient (PKESK)                       │
//! │           │      AES-256-GCM(kek, zero nonce, session key, aad=alg)     │
//! │           │                                                             │
//! │           └──► HKDF into the message key (SEIPD v2)                     │
//! │                  AES-GCM(message key, iv || chunk index, chunk)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A key-encryption key is derived fresh from an ephemeral X25519 exchange
//! for every recipient, so the fixed nonce used when wrapping never repeats
//! under one key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::algorithm::SymmetricKeyAlgorithm;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Fill a fixed-size array from the operating system RNG
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Per-message symmetric key
///
/// Zeroized when dropped.
#[derive(Clone)]
pub struct SessionKey {
    algorithm: SymmetricKeyAlgorithm,
    bytes: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    /// Generate a random session key for the given cipher
    pub fn generate(algorithm: SymmetricKeyAlgorithm) -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; algorithm.key_size()]);
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { algorithm, bytes }
    }

    /// Rebuild a session key recovered from a PKESK packet
    pub fn from_bytes(algorithm: SymmetricKeyAlgorithm, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != algorithm.key_size() {
            return Err(Error::MalformedPacket(format!(
                "session key is {} bytes, {:?} needs {}",
                bytes.len(),
                algorithm,
                algorithm.key_size()
            )));
        }
        Ok(Self {
            algorithm,
            bytes: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// Cipher this key belongs to
    pub fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.algorithm
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// AES-GCM instance keyed for one of the supported ciphers
pub enum AeadCipher {
    /// AES-128-GCM
    Aes128(Box<Aes128Gcm>),
    /// AES-256-GCM
    Aes256(Box<Aes256Gcm>),
}

impl AeadCipher {
    /// Key a cipher; `key` must match the algorithm's key size
    pub fn new(algorithm: SymmetricKeyAlgorithm, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidKey(format!("{:?} key has wrong length", algorithm));
        match algorithm {
            SymmetricKeyAlgorithm::Aes128 => Ok(AeadCipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            SymmetricKeyAlgorithm::Aes256 => Ok(AeadCipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
        }
    }

    /// Encrypt and authenticate, returning ciphertext followed by the tag
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = AesNonce::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let sealed = match self {
            AeadCipher::Aes128(cipher) => cipher.encrypt(nonce, payload),
            AeadCipher::Aes256(cipher) => cipher.encrypt(nonce, payload),
        };
        sealed.map_err(|_| Error::EncryptionFailed("AES-GCM encryption failed".into()))
    }

    /// Verify and decrypt `ciphertext || tag`
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = AesNonce::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let opened = match self {
            AeadCipher::Aes128(cipher) => cipher.decrypt(nonce, payload),
            AeadCipher::Aes256(cipher) => cipher.decrypt(nonce, payload),
        };
        opened.map_err(|_| Error::IntegrityCheck("authentication tag mismatch".into()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
