//! # Cryptography Module
//!
//! The primitives underneath the OpenPGP packets.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Ed25519        │   │  X25519         │   │  AES-GCM        │       │
//! │  │  signatures     │   │  key agreement  │   │  128 / 256      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │           │                     │                     │                 │
//! │           ▼                     ▼                     ▼                 │
//! │   Signature packets       PKESK packets        SEIPD v2 chunks          │
//! │                           (via HKDF kek)       (via HKDF msg key)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: All secret keys are zeroized when dropped
//! 2. **Constant-Time Operations**: Using dalek for constant-time crypto
//! 3. **Secure Random**: Using `rand::rngs::OsRng` for cryptographic randomness

mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encryption::{random_bytes, AeadCipher, SessionKey, NONCE_SIZE, TAG_SIZE};
pub use kdf::{
    derive_key_encryption_key, derive_message_keys, MessageKeys, S2k, DEFAULT_S2K_COUNT,
    S2K_ITERATED_SALTED,
};
pub use keys::{verifying_key_from_bytes, EncryptionKeyPair, SigningKeyPair};
pub use signing::{sign, verify, Signature, SIGNATURE_SIZE};

/// Size of Curve25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
