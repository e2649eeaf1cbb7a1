//! Secret key material at rest and the protectors that unlock it.
//!
//! Protected keys are sealed with AES-256-GCM under a key stretched from a
//! passphrase by the iterated+salted S2K. The public key packet body is the
//! associated data, so sealed material cannot be moved onto another key.

use std::collections::HashMap;
use std::fmt;

use zeroize::Zeroizing;

use super::{PublicKey, SecretKey};
use crate::algorithm::{PublicKeyAlgorithm, SymmetricKeyAlgorithm};
use crate::crypto::{random_bytes, AeadCipher, EncryptionKeyPair, S2k, SigningKeyPair, NONCE_SIZE};
use crate::error::{Error, Result};
use crate::fingerprint::KeyId;

/// Secret half of a key as stored
#[derive(Clone)]
pub enum SecretMaterial {
    /// Raw 32-byte secret
    Unprotected(Zeroizing<[u8; 32]>),
    /// Secret sealed under a passphrase
    Protected(ProtectedMaterial),
}

/// Passphrase-sealed secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedMaterial {
    /// Passphrase derivation parameters
    pub s2k: S2k,
    /// GCM nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Sealed secret with its tag
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretMaterial::Unprotected(_) => f.write_str("Unprotected([REDACTED])"),
            SecretMaterial::Protected(material) => f.debug_tuple("Protected").field(material).finish(),
        }
    }
}

/// A secret key ready for use
pub enum UnlockedKey {
    /// Signing key
    Ed25519(SigningKeyPair),
    /// Decryption key
    X25519(EncryptionKeyPair),
}

impl UnlockedKey {
    /// Rebuild the key pair and check it against the public material
    fn from_secret(public: &PublicKey, secret: &[u8; 32]) -> Result<Self> {
        let (unlocked, derived) = match public.algorithm() {
            PublicKeyAlgorithm::Ed25519 => {
                let pair = SigningKeyPair::from_bytes(secret);
                let derived = pair.public_bytes();
                (UnlockedKey::Ed25519(pair), derived)
            }
            PublicKeyAlgorithm::X25519 => {
                let pair = EncryptionKeyPair::from_bytes(secret);
                let derived = pair.public_bytes();
                (UnlockedKey::X25519(pair), derived)
            }
        };

        if &derived != public.material() {
            return Err(Error::InvalidKey(format!(
                "secret material does not match public key {}",
                public.key_id()
            )));
        }
        Ok(unlocked)
    }

    /// Signing key pair, if this is an Ed25519 key
    pub fn into_signing(self) -> Option<SigningKeyPair> {
        match self {
            UnlockedKey::Ed25519(pair) => Some(pair),
            UnlockedKey::X25519(_) => None,
        }
    }

    /// Encryption key pair, if this is an X25519 key
    pub fn into_encryption(self) -> Option<EncryptionKeyPair> {
        match self {
            UnlockedKey::X25519(pair) => Some(pair),
            UnlockedKey::Ed25519(_) => None,
        }
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockedKey::Ed25519(pair) => f.debug_tuple("Ed25519").field(pair).finish(),
            UnlockedKey::X25519(pair) => f.debug_tuple("X25519").field(pair).finish(),
        }
    }
}

impl SecretKey {
    /// Seal this key's secret under `passphrase`
    ///
    /// ## Errors
    ///
    /// `InvalidKey` if the key is already protected.
    pub fn protect(&self, passphrase: &[u8], s2k_count: u8) -> Result<SecretKey> {
        let secret = match &self.material {
            SecretMaterial::Unprotected(secret) => secret,
            SecretMaterial::Protected(_) => {
                return Err(Error::InvalidKey(format!(
                    "key {} is already protected",
                    self.key_id()
                )))
            }
        };

        let s2k = S2k::new(s2k_count);
        let wrap_key = s2k.derive(passphrase);
        let cipher = AeadCipher::new(SymmetricKeyAlgorithm::Aes256, &wrap_key[..])?;
        let nonce: [u8; NONCE_SIZE] = random_bytes();
        let ciphertext = cipher.seal(&nonce, &secret[..], &self.public.packet_body())?;

        Ok(SecretKey {
            public: self.public.clone(),
            material: SecretMaterial::Protected(ProtectedMaterial {
                s2k,
                nonce,
                ciphertext,
            }),
        })
    }

    /// Unlock with a passphrase (ignored for unprotected keys)
    ///
    /// ## Errors
    ///
    /// `KeyUnlockFailed` when the passphrase is wrong.
    pub fn unlock_with_passphrase(&self, passphrase: &[u8]) -> Result<UnlockedKey> {
        match &self.material {
            SecretMaterial::Unprotected(secret) => UnlockedKey::from_secret(&self.public, secret),
            SecretMaterial::Protected(sealed) => {
                let wrap_key = sealed.s2k.derive(passphrase);
                let cipher = AeadCipher::new(SymmetricKeyAlgorithm::Aes256, &wrap_key[..])?;
                let plain = Zeroizing::new(
                    cipher
                        .open(&sealed.nonce, &sealed.ciphertext, &self.public.packet_body())
                        .map_err(|_| Error::KeyUnlockFailed(self.key_id()))?,
                );
                let secret: Zeroizing<[u8; 32]> = Zeroizing::new(
                    plain
                        .as_slice()
                        .try_into()
                        .map_err(|_| Error::KeyUnlockFailed(self.key_id()))?,
                );
                UnlockedKey::from_secret(&self.public, &secret)
            }
        }
    }

    /// Unlock a key stored without a passphrase
    pub fn unlock_unprotected(&self) -> Result<UnlockedKey> {
        match &self.material {
            SecretMaterial::Unprotected(secret) => UnlockedKey::from_secret(&self.public, secret),
            SecretMaterial::Protected(_) => Err(Error::KeyUnlockFailed(self.key_id())),
        }
    }
}

// ============================================================================
// PROTECTORS
// ============================================================================

/// Source of whatever is needed to unlock secret keys
pub trait SecretKeyRingProtector: Send + Sync {
    /// Unlock one secret key
    fn unlock(&self, key: &SecretKey) -> Result<UnlockedKey>;
}

/// Unlocks keys stored without a passphrase
#[derive(Debug, Clone, Copy, Default)]
pub struct UnprotectedKeysProtector;

impl SecretKeyRingProtector for UnprotectedKeysProtector {
    fn unlock(&self, key: &SecretKey) -> Result<UnlockedKey> {
        key.unlock_unprotected()
    }
}

/// Unlocks keys with passphrases, per key or one for all
#[derive(Default)]
pub struct PassphraseProtector {
    default: Option<Zeroizing<String>>,
    per_key: HashMap<KeyId, Zeroizing<String>>,
}

impl PassphraseProtector {
    /// One passphrase for every key
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            default: Some(Zeroizing::new(passphrase.into())),
            per_key: HashMap::new(),
        }
    }

    /// No passphrases yet; add them with [`with_key_passphrase`](Self::with_key_passphrase)
    pub fn for_keys() -> Self {
        Self::default()
    }

    /// Passphrase for one key id, taking precedence over the shared one
    pub fn with_key_passphrase(mut self, key_id: KeyId, passphrase: impl Into<String>) -> Self {
        self.per_key.insert(key_id, Zeroizing::new(passphrase.into()));
        self
    }

    fn passphrase_for(&self, key_id: KeyId) -> Option<&str> {
        self.per_key
            .get(&key_id)
            .or(self.default.as_ref())
            .map(|p| p.as_str())
    }
}

impl SecretKeyRingProtector for PassphraseProtector {
    fn unlock(&self, key: &SecretKey) -> Result<UnlockedKey> {
        if !key.is_protected() {
            return key.unlock_unprotected();
        }
        let passphrase = self
            .passphrase_for(key.key_id())
            .ok_or(Error::KeyUnlockFailed(key.key_id()))?;
        key.unlock_with_passphrase(passphrase.as_bytes())
    }
}

impl fmt::Debug for PassphraseProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseProtector")
            .field("shared", &self.default.is_some())
            .field("keys", &self.per_key.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeyFlags;

    // Minimum coded count keeps the tests fast.
    const FAST_S2K: u8 = 0;

    fn signing_key() -> SecretKey {
        SecretKey::ed25519_from_bytes(&[11; 32], 1_700_000_000, KeyFlags::SIGN_DATA)
    }

    #[test]
    fn test_protect_and_unlock() {
        let key = signing_key();
        let locked = key.protect(b"montague", FAST_S2K).unwrap();
        assert!(locked.is_protected());
        assert_eq!(locked.key_id(), key.key_id());

        let unlocked = locked.unlock_with_passphrase(b"montague").unwrap();
        let pair = unlocked.into_signing().unwrap();
        assert_eq!(&pair.public_bytes(), key.public_key().material());
    }

    #[test]
    fn test_wrong_passphrase() {
        let locked = signing_key().protect(b"montague", FAST_S2K).unwrap();
        assert!(matches!(
            locked.unlock_with_passphrase(b"capulet"),
            Err(Error::KeyUnlockFailed(id)) if id == locked.key_id()
        ));
    }

    #[test]
    fn test_protect_twice_fails() {
        let locked = signing_key().protect(b"a", FAST_S2K).unwrap();
        assert!(matches!(locked.protect(b"b", FAST_S2K), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_sealed_material_bound_to_key() {
        let locked = signing_key().protect(b"pw", FAST_S2K).unwrap();
        let other = SecretKey::ed25519_from_bytes(&[12; 32], 1_700_000_000, KeyFlags::SIGN_DATA);
        let moved = SecretKey::from_parts(other.public_key().clone(), locked.material().clone());
        assert!(moved.unlock_with_passphrase(b"pw").is_err());
    }

    #[test]
    fn test_mismatched_secret_rejected() {
        let key = signing_key();
        let wrong = SecretKey::from_parts(
            key.public_key().clone(),
            SecretMaterial::Unprotected(Zeroizing::new([99; 32])),
        );
        assert!(matches!(wrong.unlock_unprotected(), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_protectors() {
        let key = signing_key();
        let locked = key.protect(b"pw", FAST_S2K).unwrap();

        assert!(UnprotectedKeysProtector.unlock(&key).is_ok());
        assert!(matches!(
            UnprotectedKeysProtector.unlock(&locked),
            Err(Error::KeyUnlockFailed(_))
        ));

        assert!(PassphraseProtector::new("pw").unlock(&locked).is_ok());
        assert!(PassphraseProtector::new("pw").unlock(&key).is_ok());
        assert!(PassphraseProtector::for_keys().unlock(&locked).is_err());

        let per_key = PassphraseProtector::new("wrong").with_key_passphrase(locked.key_id(), "pw");
        assert!(per_key.unlock(&locked).is_ok());
    }

    #[test]
    fn test_debug_redacts() {
        let protector = PassphraseProtector::new("hunter2");
        assert!(!format!("{:?}", protector).contains("hunter2"));
        let material = SecretMaterial::Unprotected(Zeroizing::new([7; 32]));
        assert!(format!("{:?}", material).contains("REDACTED"));
    }
}
