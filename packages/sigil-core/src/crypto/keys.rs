//! # Key Pairs
//!
//! Raw Curve25519 key pairs backing OpenPGP key packets.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SigningKeyPair (Ed25519, algorithm 27)                         │   │
//! │  │  • Signs message digests                                        │   │
//! │  │  • Private key: 32 bytes (zeroized on drop)                     │   │
//! │  │  • Public key: 32 bytes, stored in the key packet               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EncryptionKeyPair (X25519, algorithm 25)                       │   │
//! │  │  • Unwraps session keys addressed to this key                   │   │
//! │  │  • Private key: 32 bytes (zeroized on drop)                     │   │
//! │  │  • Public key: 32 bytes, stored in the key packet               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the secret key bytes
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// X25519 encryption keypair for key agreement
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    /// Private encryption key (secret)
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    /// Public encryption key (derived from secret)
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Fails when the peer key is a low-order point, which would make the
    /// shared secret predictable.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(Error::InvalidKey("X25519 peer key is a low-order point".into()));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// Parse an Ed25519 public key, rejecting points that are not on the curve
pub fn verifying_key_from_bytes(bytes: &[u8; 32]) -> Result<VerifyingKey> {
    VerifyingKey::from_bytes(bytes)
        .map_err(|e| Error::InvalidKey(format!("Invalid Ed25519 public key: {}", e)))
}

// ============================================================================
// TESTS
// ============================================================================
