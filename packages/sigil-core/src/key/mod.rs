//! # Keys and Key Rings
//!
//! Version 4 Curve25519 keys grouped into rings that share one identity.
//!
//! ## Ring Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            KEY RING                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyRing                                                                │
//! │  ├── PublicKeyRing                                                      │
//! │  │   ├── primary   Ed25519   CERTIFY_OTHER | SIGN_DATA                  │
//! │  │   ├── user ids  "Romeo <romeo@example.com>"                          │
//! │  │   └── subkeys   X25519    ENCRYPT_COMMS | ENCRYPT_STORAGE            │
//! │  │                                                                      │
//! │  └── SecretKeyRing                                                      │
//! │      └── same keys, each with secret material                          │
//! │          (unprotected, or sealed under a passphrase)                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Selection
//!
//! Keys are not typed by role. Each carries [`KeyFlags`]; the pipelines ask
//! a ring for its encryption or signing key, and the ring returns the most
//! recently created key that is valid now, has a compatible algorithm and
//! has the capability flag.
//!
//! | Capability | Algorithm | Flag |
//! |------------|-----------|------|
//! | Encrypt | X25519 | `ENCRYPT_COMMS` or `ENCRYPT_STORAGE` |
//! | Sign | Ed25519 | `SIGN_DATA` |

use std::fmt;

use zeroize::Zeroizing;

use crate::algorithm::{KeyFlags, PublicKeyAlgorithm};
use crate::crypto::{EncryptionKeyPair, SigningKeyPair};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, KeyId};
use crate::time::{is_expired, now_timestamp};

mod collection;
mod generation;
mod protection;

pub use collection::{PublicKeyRingCollection, SecretKeyRingCollection};
pub use generation::KeyRingBuilder;
pub use protection::{
    PassphraseProtector, ProtectedMaterial, SecretKeyRingProtector, SecretMaterial, UnlockedKey,
    UnprotectedKeysProtector,
};

/// Key packet version written and accepted
pub const KEY_VERSION: u8 = 4;

// ============================================================================
// PUBLIC KEY
// ============================================================================

/// A v4 public key or subkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    created: u32,
    algorithm: PublicKeyAlgorithm,
    material: [u8; 32],
    flags: KeyFlags,
    expires_after: Option<u32>,
    fingerprint: Fingerprint,
}

impl PublicKey {
    /// Create a public key from its parts
    pub fn new(
        algorithm: PublicKeyAlgorithm,
        material: [u8; 32],
        created: u32,
        flags: KeyFlags,
    ) -> Self {
        let fingerprint = Fingerprint::of_key_packet_body(&packet_body(created, algorithm, &material));
        Self {
            created,
            algorithm,
            material,
            flags,
            expires_after: None,
            fingerprint,
        }
    }

    /// Set a validity period in seconds after creation (0 = never expires)
    pub fn with_expiration(mut self, seconds: u32) -> Self {
        self.expires_after = Some(seconds);
        self
    }

    /// Serialized public key packet body (the fingerprint input)
    pub fn packet_body(&self) -> Vec<u8> {
        packet_body(self.created, self.algorithm, &self.material)
    }

    /// v4 fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Key id (low 64 bits of the fingerprint)
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    /// Key algorithm
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    /// Raw 32-byte public key
    pub fn material(&self) -> &[u8; 32] {
        &self.material
    }

    /// Creation time in Unix seconds
    pub fn created(&self) -> u32 {
        self.created
    }

    /// Capabilities granted to this key
    pub fn flags(&self) -> KeyFlags {
        self.flags
    }

    /// Validity period in seconds after creation, if limited
    pub fn expires_after(&self) -> Option<u32> {
        self.expires_after
    }

    /// Created no later than `now` and not yet expired
    pub fn is_valid_at(&self, now: u32) -> bool {
        self.created <= now && !is_expired(self.created, self.expires_after, now)
    }

    /// Algorithm and flags both allow wrapping session keys
    pub fn can_encrypt(&self) -> bool {
        self.algorithm.can_encrypt() && self.flags.can_encrypt()
    }

    /// Algorithm and flags both allow signing data
    pub fn can_sign(&self) -> bool {
        self.algorithm.can_sign() && self.flags.can_sign()
    }
}

fn packet_body(created: u32, algorithm: PublicKeyAlgorithm, material: &[u8; 32]) -> Vec<u8> {
    let mut body = Vec::with_capacity(6 + material.len());
    body.push(KEY_VERSION);
    body.extend_from_slice(&created.to_be_bytes());
    body.push(algorithm.id());
    body.extend_from_slice(material);
    body
}

/// Most recent key among `keys` that passes `wanted` and is valid at `now`
fn select<'k, K, F>(
    keys: impl Iterator<Item = &'k K>,
    public: F,
    now: u32,
    wanted: fn(&PublicKey) -> bool,
) -> Option<&'k K>
where
    K: 'k,
    F: Fn(&K) -> &PublicKey,
{
    keys.filter(|k| {
        let key = public(*k);
        wanted(key) && key.is_valid_at(now)
    })
    .max_by_key(|k| public(*k).created())
}

// ============================================================================
// SECRET KEY
// ============================================================================

/// A v4 secret key or subkey
#[derive(Clone)]
pub struct SecretKey {
    public: PublicKey,
    material: SecretMaterial,
}

impl SecretKey {
    /// Ed25519 key from a 32-byte secret seed
    pub fn ed25519_from_bytes(secret: &[u8; 32], created: u32, flags: KeyFlags) -> Self {
        let keypair = SigningKeyPair::from_bytes(secret);
        let public = PublicKey::new(
            PublicKeyAlgorithm::Ed25519,
            keypair.public_bytes(),
            created,
            flags,
        );
        Self {
            public,
            material: SecretMaterial::Unprotected(keypair.secret_bytes()),
        }
    }

    /// X25519 key from a 32-byte secret scalar
    pub fn x25519_from_bytes(secret: &[u8; 32], created: u32, flags: KeyFlags) -> Self {
        let keypair = EncryptionKeyPair::from_bytes(secret);
        let public = PublicKey::new(
            PublicKeyAlgorithm::X25519,
            keypair.public_bytes(),
            created,
            flags,
        );
        Self {
            public,
            material: SecretMaterial::Unprotected(Zeroizing::new(*secret)),
        }
    }

    /// Pair existing public key and secret material
    pub fn from_parts(public: PublicKey, material: SecretMaterial) -> Self {
        Self { public, material }
    }

    /// Same key with a validity period (seconds after creation)
    pub fn with_expiration(mut self, seconds: u32) -> Self {
        self.public = self.public.with_expiration(seconds);
        self
    }

    /// Public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Secret material, sealed or not
    pub fn material(&self) -> &SecretMaterial {
        &self.material
    }

    /// Key id of the public half
    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    /// Fingerprint of the public half
    pub fn fingerprint(&self) -> &Fingerprint {
        self.public.fingerprint()
    }

    /// Whether unlocking needs a passphrase
    pub fn is_protected(&self) -> bool {
        matches!(self.material, SecretMaterial::Protected(_))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_id", &self.key_id())
            .field("algorithm", &self.public.algorithm())
            .field("protected", &self.is_protected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RINGS
// ============================================================================

/// Anything holding a set of keys under one primary key
pub trait Ring {
    /// Public halves of every key, primary first
    fn ring_keys(&self) -> Vec<&PublicKey>;

    /// Fingerprint of the primary key
    fn primary_fingerprint(&self) -> &Fingerprint;
}

/// Whether `ring` holds a key (primary or subkey) with `key_id`
pub fn ring_contains_key_with_id<R: Ring + ?Sized>(ring: &R, key_id: KeyId) -> bool {
    ring.ring_keys().iter().any(|key| key.key_id() == key_id)
}

/// A public primary key with its user ids and subkeys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRing {
    primary: PublicKey,
    user_ids: Vec<String>,
    subkeys: Vec<PublicKey>,
}

impl PublicKeyRing {
    /// Ring from a primary key, its user ids and its subkeys
    pub fn new(primary: PublicKey, user_ids: Vec<String>, subkeys: Vec<PublicKey>) -> Self {
        Self {
            primary,
            user_ids,
            subkeys,
        }
    }

    /// Primary key
    pub fn primary_key(&self) -> &PublicKey {
        &self.primary
    }

    /// Subkeys, in insertion order
    pub fn subkeys(&self) -> &[PublicKey] {
        &self.subkeys
    }

    /// All keys, primary first
    pub fn keys(&self) -> impl Iterator<Item = &PublicKey> {
        std::iter::once(&self.primary).chain(self.subkeys.iter())
    }

    /// User ids bound to the primary key
    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        self.primary.fingerprint()
    }

    /// Primary key id
    pub fn key_id(&self) -> KeyId {
        self.primary.key_id()
    }

    /// Key with the given id, if this ring has one
    pub fn get_key(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.keys().find(|key| key.key_id() == key_id)
    }

    /// Most recent valid encryption-capable key
    pub fn encryption_key(&self) -> Option<&PublicKey> {
        self.encryption_key_at(now_timestamp())
    }

    /// Most recent encryption-capable key valid at `now`
    pub fn encryption_key_at(&self, now: u32) -> Option<&PublicKey> {
        select(self.keys(), |k| k, now, PublicKey::can_encrypt)
    }

    /// Most recent valid signing-capable key
    pub fn signing_key(&self) -> Option<&PublicKey> {
        self.signing_key_at(now_timestamp())
    }

    /// Most recent signing-capable key valid at `now`
    pub fn signing_key_at(&self, now: u32) -> Option<&PublicKey> {
        select(self.keys(), |k| k, now, PublicKey::can_sign)
    }
}

impl Ring for PublicKeyRing {
    fn ring_keys(&self) -> Vec<&PublicKey> {
        self.keys().collect()
    }

    fn primary_fingerprint(&self) -> &Fingerprint {
        self.fingerprint()
    }
}

/// A secret primary key with its user ids and secret subkeys
#[derive(Debug, Clone)]
pub struct SecretKeyRing {
    primary: SecretKey,
    user_ids: Vec<String>,
    subkeys: Vec<SecretKey>,
}

impl SecretKeyRing {
    /// Ring from a primary key, its user ids and its subkeys
    pub fn new(primary: SecretKey, user_ids: Vec<String>, subkeys: Vec<SecretKey>) -> Self {
        Self {
            primary,
            user_ids,
            subkeys,
        }
    }

    /// Primary key
    pub fn primary_key(&self) -> &SecretKey {
        &self.primary
    }

    /// Subkeys, in insertion order
    pub fn subkeys(&self) -> &[SecretKey] {
        &self.subkeys
    }

    /// All keys, primary first
    pub fn keys(&self) -> impl Iterator<Item = &SecretKey> {
        std::iter::once(&self.primary).chain(self.subkeys.iter())
    }

    /// User ids bound to the primary key
    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        self.primary.fingerprint()
    }

    /// Primary key id
    pub fn key_id(&self) -> KeyId {
        self.primary.key_id()
    }

    /// Secret key with the given id, if this ring has one
    pub fn get_key(&self, key_id: KeyId) -> Option<&SecretKey> {
        self.keys().find(|key| key.key_id() == key_id)
    }

    /// Most recent valid signing-capable secret key
    pub fn signing_key(&self) -> Option<&SecretKey> {
        self.signing_key_at(now_timestamp())
    }

    /// Most recent signing-capable secret key valid at `now`
    pub fn signing_key_at(&self, now: u32) -> Option<&SecretKey> {
        select(self.keys(), SecretKey::public_key, now, PublicKey::can_sign)
    }

    /// Most recent valid encryption-capable secret key
    pub fn encryption_key(&self) -> Option<&SecretKey> {
        select(self.keys(), SecretKey::public_key, now_timestamp(), PublicKey::can_encrypt)
    }

    /// The public key ring matching this secret ring
    pub fn to_public(&self) -> PublicKeyRing {
        PublicKeyRing {
            primary: self.primary.public.clone(),
            user_ids: self.user_ids.clone(),
            subkeys: self.subkeys.iter().map(|k| k.public.clone()).collect(),
        }
    }
}

impl Ring for SecretKeyRing {
    fn ring_keys(&self) -> Vec<&PublicKey> {
        self.keys().map(SecretKey::public_key).collect()
    }

    fn primary_fingerprint(&self) -> &Fingerprint {
        self.fingerprint()
    }
}

// ============================================================================
// KEY RING PAIR
// ============================================================================

/// Matching public and secret key rings for one identity
#[derive(Debug, Clone)]
pub struct KeyRing {
    public: PublicKeyRing,
    secret: SecretKeyRing,
}

impl KeyRing {
    /// Pair rings that hold the same keys
    ///
    /// ## Errors
    ///
    /// `InvalidKey` when the rings' keys differ.
    pub fn new(public: PublicKeyRing, secret: SecretKeyRing) -> Result<Self> {
        let public_fprs: Vec<&Fingerprint> = public.keys().map(PublicKey::fingerprint).collect();
        let secret_fprs: Vec<&Fingerprint> = secret.keys().map(SecretKey::fingerprint).collect();
        if public_fprs != secret_fprs {
            return Err(Error::InvalidKey(format!(
                "public ring {} does not match secret ring {}",
                public.fingerprint(),
                secret.fingerprint()
            )));
        }
        Ok(Self { public, secret })
    }

    /// Derive the public ring from a secret ring
    pub fn from_secret(secret: SecretKeyRing) -> Self {
        Self {
            public: secret.to_public(),
            secret,
        }
    }

    /// Public half
    pub fn public_keys(&self) -> &PublicKeyRing {
        &self.public
    }

    /// Secret half
    pub fn secret_keys(&self) -> &SecretKeyRing {
        &self.secret
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        self.public.fingerprint()
    }

    /// Primary key id
    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    /// User ids bound to the primary key
    pub fn user_ids(&self) -> &[String] {
        self.public.user_ids()
    }
}

impl Ring for KeyRing {
    fn ring_keys(&self) -> Vec<&PublicKey> {
        self.public.ring_keys()
    }

    fn primary_fingerprint(&self) -> &Fingerprint {
        self.fingerprint()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CREATED: u32 = 1_700_000_000;

    fn secret_ring(seed: u8) -> SecretKeyRing {
        let primary = SecretKey::ed25519_from_bytes(
            &[seed; 32],
            CREATED,
            KeyFlags::CERTIFY_OTHER | KeyFlags::SIGN_DATA,
        );
        let subkey = SecretKey::x25519_from_bytes(
            &[seed.wrapping_add(1); 32],
            CREATED,
            KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE,
        );
        SecretKeyRing::new(primary, vec!["romeo@example.com".into()], vec![subkey])
    }

    #[test]
    fn test_fingerprint_matches_packet_body() {
        let ring = secret_ring(1);
        let primary = ring.primary_key().public_key();
        assert_eq!(&Fingerprint::from_public_key(primary), primary.fingerprint());
        assert_eq!(primary.packet_body().len(), 38);
        assert_eq!(primary.packet_body()[5], 27);
    }

    #[test]
    fn test_capability_selection() {
        let public = secret_ring(1).to_public();
        let enc = public.encryption_key_at(CREATED + 10).unwrap();
        let sig = public.signing_key_at(CREATED + 10).unwrap();

        assert_eq!(enc.algorithm(), PublicKeyAlgorithm::X25519);
        assert_eq!(sig.algorithm(), PublicKeyAlgorithm::Ed25519);
        assert_eq!(sig.key_id(), public.key_id());
    }

    #[test]
    fn test_most_recent_valid_key_wins() {
        let flags = KeyFlags::ENCRYPT_COMMS;
        let old = SecretKey::x25519_from_bytes(&[2; 32], CREATED, flags);
        let newer = SecretKey::x25519_from_bytes(&[3; 32], CREATED + 100, flags);
        let expired = SecretKey::x25519_from_bytes(&[4; 32], CREATED + 200, flags).with_expiration(50);
        let future = SecretKey::x25519_from_bytes(&[5; 32], CREATED + 10_000, flags);
        let primary = SecretKey::ed25519_from_bytes(&[1; 32], CREATED, KeyFlags::SIGN_DATA);

        let ring = SecretKeyRing::new(
            primary,
            vec![],
            vec![old, newer.clone(), expired, future],
        )
        .to_public();

        let chosen = ring.encryption_key_at(CREATED + 1000).unwrap();
        assert_eq!(chosen.key_id(), newer.key_id());
    }

    #[test]
    fn test_flags_and_algorithm_must_agree() {
        // Encryption flag on a signing algorithm is not an encryption key
        let primary = SecretKey::ed25519_from_bytes(
            &[1; 32],
            CREATED,
            KeyFlags::SIGN_DATA | KeyFlags::ENCRYPT_COMMS,
        );
        let ring = SecretKeyRing::new(primary, vec![], vec![]).to_public();
        assert!(ring.encryption_key_at(CREATED).is_none());
        assert!(ring.signing_key_at(CREATED).is_some());
    }

    #[test]
    fn test_ring_contains_key_with_id() {
        let ring = KeyRing::from_secret(secret_ring(1));
        let sub_id = ring.public_keys().subkeys()[0].key_id();

        assert!(ring_contains_key_with_id(&ring, sub_id));
        assert!(ring_contains_key_with_id(ring.secret_keys(), ring.key_id()));
        assert!(ring_contains_key_with_id(ring.public_keys(), sub_id));
        assert!(!ring_contains_key_with_id(&ring, KeyId::new(42)));
    }

    #[test]
    fn test_key_ring_mismatch() {
        let a = secret_ring(1);
        let b = secret_ring(7);
        assert!(KeyRing::new(a.to_public(), a.clone()).is_ok());
        assert!(matches!(
            KeyRing::new(b.to_public(), a),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_secret_key_debug_hides_material() {
        let key = SecretKey::ed25519_from_bytes(&[9; 32], CREATED, KeyFlags::SIGN_DATA);
        let debug = format!("{:?}", key);
        assert!(debug.contains("SecretKey"));
        assert!(!debug.contains(&hex::encode([9u8; 32])));
    }
}
