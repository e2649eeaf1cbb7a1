//! Fresh key ring generation.
//!
//! A generated ring has an Ed25519 primary key that certifies and signs,
//! and one X25519 subkey for encryption, both created at the same instant.

use zeroize::Zeroizing;

use super::{KeyRing, SecretKey, SecretKeyRing};
use crate::algorithm::KeyFlags;
use crate::crypto::{EncryptionKeyPair, SigningKeyPair, DEFAULT_S2K_COUNT};
use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// Builder for a new key ring
pub struct KeyRingBuilder {
    user_id: String,
    passphrase: Option<Zeroizing<String>>,
    s2k_count: u8,
    created: Option<u32>,
    expires_after: Option<u32>,
}

impl KeyRingBuilder {
    /// Start a ring for `user_id` (for example `"Romeo <romeo@example.com>"`)
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            passphrase: None,
            s2k_count: DEFAULT_S2K_COUNT,
            created: None,
            expires_after: None,
        }
    }

    /// Protect every secret key with `passphrase`
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Store the secret keys unprotected
    pub fn without_passphrase(mut self) -> Self {
        self.passphrase = None;
        self
    }

    /// S2K coded count used when protecting
    pub fn with_s2k_count(mut self, coded_count: u8) -> Self {
        self.s2k_count = coded_count;
        self
    }

    /// Creation time for all keys (defaults to now)
    pub fn created_at(mut self, timestamp: u32) -> Self {
        self.created = Some(timestamp);
        self
    }

    /// Validity period in seconds after creation
    pub fn expires_after(mut self, seconds: u32) -> Self {
        self.expires_after = Some(seconds);
        self
    }

    /// Generate the keys
    pub fn build(self) -> Result<KeyRing> {
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidKey("user id must not be empty".into()));
        }
        let created = self.created.unwrap_or_else(now_timestamp);

        let signing = SigningKeyPair::generate();
        let encryption = EncryptionKeyPair::generate();

        let mut primary = SecretKey::ed25519_from_bytes(
            &signing.secret_bytes(),
            created,
            KeyFlags::CERTIFY_OTHER | KeyFlags::SIGN_DATA,
        );
        let mut subkey = SecretKey::x25519_from_bytes(
            &encryption.secret_bytes(),
            created,
            KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE,
        );

        if let Some(seconds) = self.expires_after {
            primary = primary.with_expiration(seconds);
            subkey = subkey.with_expiration(seconds);
        }

        if let Some(passphrase) = self.passphrase.as_ref().filter(|p| !p.is_empty()) {
            primary = primary.protect(passphrase.as_bytes(), self.s2k_count)?;
            subkey = subkey.protect(passphrase.as_bytes(), self.s2k_count)?;
        }

        let ring = SecretKeyRing::new(primary, vec![self.user_id], vec![subkey]);
        tracing::info!(
            fingerprint = %ring.fingerprint(),
            protected = ring.primary_key().is_protected(),
            "Generated key ring"
        );

        Ok(KeyRing::from_secret(ring))
    }
}

impl std::fmt::Debug for KeyRingBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRingBuilder")
            .field("user_id", &self.user_id)
            .field("protected", &self.passphrase.is_some())
            .field("created", &self.created)
            .field("expires_after", &self.expires_after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::PublicKeyAlgorithm;
    use crate::key::{PassphraseProtector, SecretKeyRingProtector, UnprotectedKeysProtector};

    #[test]
    fn test_generate_unprotected() {
        let ring = KeyRingBuilder::new("Romeo <romeo@example.com>")
            .created_at(1_700_000_000)
            .build()
            .unwrap();

        assert_eq!(ring.user_ids(), ["Romeo <romeo@example.com>".to_string()]);
        let public = ring.public_keys();
        assert_eq!(public.primary_key().algorithm(), PublicKeyAlgorithm::Ed25519);
        assert_eq!(public.subkeys().len(), 1);
        assert_eq!(
            public.encryption_key_at(1_700_000_001).unwrap().algorithm(),
            PublicKeyAlgorithm::X25519
        );

        for key in ring.secret_keys().keys() {
            assert!(UnprotectedKeysProtector.unlock(key).is_ok());
        }
    }

    #[test]
    fn test_generate_protected() {
        let ring = KeyRingBuilder::new("juliet@example.com")
            .with_passphrase("capulet")
            .with_s2k_count(0)
            .build()
            .unwrap();

        for key in ring.secret_keys().keys() {
            assert!(key.is_protected());
            assert!(PassphraseProtector::new("capulet").unlock(key).is_ok());
            assert!(PassphraseProtector::new("montague").unlock(key).is_err());
        }
    }

    #[test]
    fn test_expiring_ring() {
        let ring = KeyRingBuilder::new("tybalt@example.com")
            .created_at(1_000)
            .expires_after(100)
            .build()
            .unwrap();
        let public = ring.public_keys();
        assert!(public.signing_key_at(1_050).is_some());
        assert!(public.signing_key_at(1_100).is_none());
        assert!(public.encryption_key_at(2_000).is_none());
    }

    #[test]
    fn test_empty_user_id_rejected() {
        assert!(matches!(
            KeyRingBuilder::new("  ").build(),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_generated_rings_are_distinct() {
        let a = KeyRingBuilder::new("a@example.com").build().unwrap();
        let b = KeyRingBuilder::new("a@example.com").build().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
