//! # Sigil Core
//!
//! Streaming OpenPGP encryption, signing, decryption and verification over
//! Curve25519 key rings.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SIGIL CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────┐              ┌──────────────────────────┐     │
//! │  │  encryption_signing  │              │ decryption_verification  │     │
//! │  │                      │              │                          │     │
//! │  │ - Recipient select   │   message    │ - Session key recovery   │     │
//! │  │ - One-pass signing   │ ───────────► │ - Chunk authentication   │     │
//! │  │ - Compress + encrypt │              │ - Signature checks       │     │
//! │  └──────────┬───────────┘              └────────────┬─────────────┘     │
//! │             │                                       │                   │
//! │             └─────────────────┬─────────────────────┘                   │
//! │                               │                                         │
//! │  ┌─────────────┐  ┌───────────┴─┐  ┌─────────────┐  ┌──────────────┐    │
//! │  │    Key      │  │   Packet    │  │   Crypto    │  │  Fingerprint │    │
//! │  │             │  │             │  │             │  │              │    │
//! │  │ - Rings     │  │ - Framing   │  │ - X25519    │  │ - v4 SHA-1   │    │
//! │  │ - Protector │  │ - PKESK     │  │ - Ed25519   │  │ - Key ids    │    │
//! │  │ - Generate  │  │ - SEIPD v2  │  │ - AES-GCM   │  │              │    │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type shared by every operation
//! - [`fingerprint`] - Fingerprints and key ids
//! - [`algorithm`] - Algorithm identifiers, hash contexts, key flags
//! - [`policy`] - Algorithm policy (serde-configurable)
//! - [`crypto`] - Primitive wrappers (keys, AEAD, signatures, KDFs)
//! - [`key`] - Keys, key rings, collections, protectors, generation
//! - [`packet`] - OpenPGP packet framing and packet types
//! - [`encryption_signing`] - Plaintext to encrypted message
//! - [`decryption_verification`] - Encrypted message to plaintext
//! - [`metadata`] - What a closed pipeline reports
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Session Key Wrapping (X25519 + HKDF + AES-256-GCM)            │
//! │  ───────────────────────────────────────────────────────────            │
//! │  A fresh session key per message, wrapped once for each recipient      │
//! │  encryption subkey under an ephemeral X25519 agreement.                │
//! │                                                                         │
//! │  Layer 2: Chunked AEAD (SEIPD v2)                                       │
//! │  ─────────────────────────────────                                      │
//! │  The message body is sealed in chunks; each chunk is authenticated     │
//! │  before any of its plaintext is released, and a final tag over the     │
//! │  total length catches truncation.                                      │
//! │                                                                         │
//! │  Layer 3: One-Pass Signatures (Ed25519)                                 │
//! │  ───────────────────────────────────────                                │
//! │  Signatures are computed while streaming and checked at close against  │
//! │  caller-supplied public keys.                                          │
//! │                                                                         │
//! │  Layer 4: Secret Keys at Rest (S2K + AES-256-GCM)                       │
//! │  ─────────────────────────────────────────────────                      │
//! │  Secret material can be sealed under a passphrase and is zeroized     │
//! │  when dropped.                                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::io::{Read, Write};
//! use sigil_core::*;
//!
//! let romeo = KeyRingBuilder::new("Romeo <romeo@example.com>").build()?;
//! let juliet = KeyRingBuilder::new("Juliet <juliet@example.com>").build()?;
//!
//! let mut message = Vec::new();
//! let mut encryptor = EncryptionBuilder::new(&mut message)
//!     .add_recipient(juliet.public_keys())
//!     .sign_with(&UnprotectedKeysProtector, romeo.secret_keys())
//!     .using_secure_algorithms()
//!     .build()?;
//! encryptor.write_all(b"Wherefore art thou Romeo?")?;
//! encryptor.close()?;
//! drop(encryptor);
//!
//! let secrets = SecretKeyRingCollection::from(juliet.secret_keys().clone());
//! let signers = PublicKeyRingCollection::from(romeo.public_keys().clone());
//! let mut decryptor = DecryptionBuilder::new(message.as_slice())
//!     .decrypt_with(&UnprotectedKeysProtector, &secrets)
//!     .verify_with(&signers)
//!     .build()?;
//! let mut plaintext = Vec::new();
//! decryptor.read_to_end(&mut plaintext)?;
//! decryptor.close()?;
//! assert!(decryptor.result()?.contains_verified_signature_from(romeo.public_keys()));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod algorithm;
pub mod crypto;
pub mod decryption_verification;
pub mod encryption_signing;
pub mod error;
pub mod fingerprint;
pub mod key;
pub mod metadata;
pub mod packet;
pub mod policy;
/// Timestamps and expiry arithmetic.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use algorithm::{
    AeadAlgorithm, CompressionAlgorithm, HashAlgorithm, KeyFlags, PublicKeyAlgorithm,
    SymmetricKeyAlgorithm,
};
pub use decryption_verification::{DecryptionBuilder, DecryptionStream};
pub use encryption_signing::{EncryptionBuilder, EncryptionStream};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, KeyId};
pub use key::{
    ring_contains_key_with_id, KeyRing, KeyRingBuilder, PassphraseProtector, PublicKey,
    PublicKeyRing, PublicKeyRingCollection, Ring, SecretKey, SecretKeyRing,
    SecretKeyRingCollection, SecretKeyRingProtector, UnlockedKey, UnprotectedKeysProtector,
};
pub use metadata::{OpenPgpMetadata, SignatureOutcome, SignatureStatus};
pub use policy::Policy;
