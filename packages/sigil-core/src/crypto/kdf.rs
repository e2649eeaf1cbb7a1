//! # Key Derivation
//!
//! Every symmetric key Sigil uses is derived, never used raw:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEY DERIVATION PATHS                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  X25519 shared secret                                                   │
//! │      └──► HKDF-SHA256(ikm = ephemeral ‖ recipient ‖ shared,             │
//! │                       info = "OpenPGP X25519")  → key-encryption key    │
//! │                                                                         │
//! │  Session key + 32-byte packet salt                                      │
//! │      └──► HKDF-SHA256(ikm = session key, salt = salt,                   │
//! │                       info = packet header)     → message key ‖ IV      │
//! │                                                                         │
//! │  Passphrase                                                             │
//! │      └──► S2K iterated+salted SHA-256          → secret key wrap key   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Aspect | Design Choice |
//! |--------|---------------|
//! | KDF Algorithm | HKDF-SHA256 |
//! | Key Separation | Distinct `info` per purpose |
//! | Passphrase hardening | Iterated+salted S2K, coded count |

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::encryption::random_bytes;
use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for wrapping session keys to an X25519 recipient
    pub const X25519_KEY_WRAP: &[u8] = b"OpenPGP X25519";
}

/// Derive the key-encryption key for one X25519 recipient
///
/// Binding both public keys into the input keeps a wrapped session key
/// from being replayed against a different recipient.
pub fn derive_key_encryption_key(
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
    shared_secret: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Zeroizing::new([0u8; 96]);
    ikm[..32].copy_from_slice(ephemeral_public);
    ikm[32..64].copy_from_slice(recipient_public);
    ikm[64..].copy_from_slice(shared_secret);

    let hkdf = Hkdf::<Sha256>::new(None, &ikm[..]);
    let mut kek = Zeroizing::new([0u8; 32]);
    hkdf.expand(domain::X25519_KEY_WRAP, &mut kek[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive key-encryption key".into()))?;

    Ok(kek)
}

/// Message key and nonce prefix for a version 2 encrypted data packet
pub struct MessageKeys {
    /// Symmetric key for the chunk cipher
    pub key: Zeroizing<Vec<u8>>,
    /// Leading nonce bytes; the chunk index fills the rest
    pub iv: [u8; 4],
}

/// Derive the message key and IV from the session key
///
/// `info` is the packet header (tag, version, cipher, AEAD mode, chunk
/// size), so changing any of them yields unrelated keys.
pub fn derive_message_keys(
    session_key: &[u8],
    salt: &[u8; 32],
    info: &[u8],
    key_size: usize,
) -> Result<MessageKeys> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), session_key);

    let mut okm = Zeroizing::new(vec![0u8; key_size + 4]);
    hkdf.expand(info, &mut okm[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive message key".into()))?;

    let mut iv = [0u8; 4];
    iv.copy_from_slice(&okm[key_size..]);
    Ok(MessageKeys {
        key: Zeroizing::new(okm[..key_size].to_vec()),
        iv,
    })
}

// ============================================================================
// STRING-TO-KEY
// ============================================================================

/// S2K specifier type for iterated and salted
pub const S2K_ITERATED_SALTED: u8 = 3;

/// Coded count used when none is requested (about 4 MiB hashed)
pub const DEFAULT_S2K_COUNT: u8 = 0xC0;

/// Iterated and salted string-to-key over SHA-256
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S2k {
    /// Random salt mixed into the passphrase
    pub salt: [u8; 8],
    /// One-octet coded iteration count
    pub coded_count: u8,
}

impl S2k {
    /// Fresh specifier with a random salt
    pub fn new(coded_count: u8) -> Self {
        Self {
            salt: random_bytes(),
            coded_count,
        }
    }

    /// Number of bytes fed through the hash
    pub fn count(&self) -> usize {
        let c = self.coded_count as usize;
        (16 + (c & 15)) << ((c >> 4) + 6)
    }

    /// Derive a 32-byte key from a passphrase
    pub fn derive(&self, passphrase: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut combined = Zeroizing::new(Vec::with_capacity(self.salt.len() + passphrase.len()));
        combined.extend_from_slice(&self.salt);
        combined.extend_from_slice(passphrase);

        // The salted passphrase is always hashed in full at least once.
        let mut remaining = self.count().max(combined.len());
        let mut hasher = Sha256::new();
        while remaining > 0 {
            let take = remaining.min(combined.len());
            hasher.update(&combined[..take]);
            remaining -= take;
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&hasher.finalize());
        key
    }
}

// ============================================================================
// TESTS
// ============================================================================
