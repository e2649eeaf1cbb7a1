//! # Pipeline Results
//!
//! What a finished pipeline learned about the message. Both pipelines hand
//! out an [`OpenPgpMetadata`] once they are closed; before that the result
//! is `ResultNotReady`.
//!
//! | Field | Encryption | Decryption |
//! |-------|------------|------------|
//! | symmetric algorithm | chosen by policy | from the session key |
//! | compression | chosen by policy | from the compressed packet |
//! | recipient key ids | every wrapped subkey | every PKESK in the message |
//! | decryption key id | - | the key that recovered the session key |
//! | signer key ids | every signing subkey | every one-pass signature |
//! | signature outcomes | - | one per signature packet |

use std::collections::BTreeSet;

use crate::algorithm::{CompressionAlgorithm, HashAlgorithm, SymmetricKeyAlgorithm};
use crate::fingerprint::{Fingerprint, KeyId};
use crate::key::Ring;

/// Result of checking one signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Cryptographically valid for the supplied key
    Verified,
    /// A key was supplied but the signature does not check out
    Failed,
    /// No public key was supplied for the signer
    MissingKey,
}

/// One signature found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutcome {
    /// Issuer key id
    pub key_id: KeyId,
    /// Fingerprint of the key used to verify, when one was found
    pub fingerprint: Option<Fingerprint>,
    /// Digest algorithm of the signature
    pub hash_algorithm: HashAlgorithm,
    /// Signature creation time
    pub created: u32,
    /// Outcome of the check
    pub status: SignatureStatus,
}

impl SignatureOutcome {
    /// Whether the signature checked out
    pub fn is_verified(&self) -> bool {
        self.status == SignatureStatus::Verified
    }
}

/// Metadata of a closed encryption or decryption pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenPgpMetadata {
    pub(crate) symmetric_algorithm: Option<SymmetricKeyAlgorithm>,
    pub(crate) compression_algorithm: Option<CompressionAlgorithm>,
    pub(crate) recipient_key_ids: BTreeSet<KeyId>,
    pub(crate) decryption_key_id: Option<KeyId>,
    pub(crate) signer_key_ids: BTreeSet<KeyId>,
    pub(crate) signatures: Vec<SignatureOutcome>,
    pub(crate) integrity_protected: bool,
}

impl OpenPgpMetadata {
    /// Cipher protecting the message body
    pub fn symmetric_algorithm(&self) -> Option<SymmetricKeyAlgorithm> {
        self.symmetric_algorithm
    }

    /// Compression inside the encrypted data, if any was applied
    pub fn compression_algorithm(&self) -> Option<CompressionAlgorithm> {
        self.compression_algorithm
    }

    /// Key ids the session key was wrapped to
    pub fn recipient_key_ids(&self) -> &BTreeSet<KeyId> {
        &self.recipient_key_ids
    }

    /// Key that recovered the session key (decryption only)
    pub fn decryption_key_id(&self) -> Option<KeyId> {
        self.decryption_key_id
    }

    /// Key ids of every signer
    pub fn signer_key_ids(&self) -> &BTreeSet<KeyId> {
        &self.signer_key_ids
    }

    /// Per-signature outcomes, in message order (decryption only)
    pub fn signatures(&self) -> &[SignatureOutcome] {
        &self.signatures
    }

    /// Signatures that verified
    pub fn verified_signatures(&self) -> impl Iterator<Item = &SignatureOutcome> {
        self.signatures.iter().filter(|s| s.is_verified())
    }

    /// Fingerprints of every verified signer
    pub fn verified_signers(&self) -> BTreeSet<&Fingerprint> {
        self.verified_signatures()
            .filter_map(|s| s.fingerprint.as_ref())
            .collect()
    }

    /// Whether the message was encrypted to at least one recipient
    pub fn is_encrypted(&self) -> bool {
        self.symmetric_algorithm.is_some() && !self.recipient_key_ids.is_empty()
    }

    /// Whether any signer was announced
    pub fn is_signed(&self) -> bool {
        !self.signer_key_ids.is_empty()
    }

    /// At least one signature verified
    pub fn is_verified(&self) -> bool {
        self.verified_signatures().next().is_some()
    }

    /// The encrypted data was authenticated in full
    pub fn is_integrity_protected(&self) -> bool {
        self.integrity_protected
    }

    /// Whether a signature verified against a key held in `ring`
    pub fn contains_verified_signature_from<R: Ring + ?Sized>(&self, ring: &R) -> bool {
        let keys = ring.ring_keys();
        self.verified_signatures().any(|outcome| {
            keys.iter().any(|key| {
                key.key_id() == outcome.key_id
                    && outcome.fingerprint.as_ref() == Some(key.fingerprint())
            })
        })
    }
}
