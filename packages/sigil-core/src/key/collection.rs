//! Collections of key rings searched by key id.

use super::{ring_contains_key_with_id, PublicKey, PublicKeyRing, SecretKey, SecretKeyRing};
use crate::fingerprint::{Fingerprint, KeyId};

/// A set of public key rings (for example, known correspondents)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicKeyRingCollection {
    rings: Vec<PublicKeyRing>,
}

impl PublicKeyRingCollection {
    /// Collection holding `rings`
    pub fn new(rings: Vec<PublicKeyRing>) -> Self {
        Self { rings }
    }

    /// Append a ring
    pub fn add(&mut self, ring: PublicKeyRing) {
        self.rings.push(ring);
    }

    /// Rings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PublicKeyRing> {
        self.rings.iter()
    }

    /// Number of rings
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    /// Whether there are no rings
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// First ring holding a key with `key_id`
    pub fn get_ring(&self, key_id: KeyId) -> Option<&PublicKeyRing> {
        self.rings
            .iter()
            .find(|ring| ring_contains_key_with_id(*ring, key_id))
    }

    /// Ring whose primary key has `fingerprint`
    pub fn get_ring_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&PublicKeyRing> {
        self.rings.iter().find(|ring| ring.fingerprint() == fingerprint)
    }

    /// Key with `key_id` from any ring
    pub fn get_key(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.rings.iter().find_map(|ring| ring.get_key(key_id))
    }

    /// Whether any ring holds a key with `key_id`
    pub fn contains_key_id(&self, key_id: KeyId) -> bool {
        self.get_key(key_id).is_some()
    }
}

impl From<PublicKeyRing> for PublicKeyRingCollection {
    fn from(ring: PublicKeyRing) -> Self {
        Self { rings: vec![ring] }
    }
}

impl From<Vec<PublicKeyRing>> for PublicKeyRingCollection {
    fn from(rings: Vec<PublicKeyRing>) -> Self {
        Self { rings }
    }
}

impl FromIterator<PublicKeyRing> for PublicKeyRingCollection {
    fn from_iter<I: IntoIterator<Item = PublicKeyRing>>(iter: I) -> Self {
        Self {
            rings: iter.into_iter().collect(),
        }
    }
}

/// A set of secret key rings (the local user's keys)
#[derive(Debug, Clone, Default)]
pub struct SecretKeyRingCollection {
    rings: Vec<SecretKeyRing>,
}

impl SecretKeyRingCollection {
    /// Collection holding `rings`
    pub fn new(rings: Vec<SecretKeyRing>) -> Self {
        Self { rings }
    }

    /// Append a ring
    pub fn add(&mut self, ring: SecretKeyRing) {
        self.rings.push(ring);
    }

    /// Rings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SecretKeyRing> {
        self.rings.iter()
    }

    /// Number of rings
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    /// Whether there are no rings
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// First ring holding a key with `key_id`
    pub fn get_ring(&self, key_id: KeyId) -> Option<&SecretKeyRing> {
        self.rings
            .iter()
            .find(|ring| ring_contains_key_with_id(*ring, key_id))
    }

    /// Secret key with `key_id` from any ring
    pub fn get_key(&self, key_id: KeyId) -> Option<&SecretKey> {
        self.rings.iter().find_map(|ring| ring.get_key(key_id))
    }

    /// Whether any ring holds a key with `key_id`
    pub fn contains_key_id(&self, key_id: KeyId) -> bool {
        self.get_key(key_id).is_some()
    }
}

impl From<SecretKeyRing> for SecretKeyRingCollection {
    fn from(ring: SecretKeyRing) -> Self {
        Self { rings: vec![ring] }
    }
}

impl From<Vec<SecretKeyRing>> for SecretKeyRingCollection {
    fn from(rings: Vec<SecretKeyRing>) -> Self {
        Self { rings }
    }
}

impl FromIterator<SecretKeyRing> for SecretKeyRingCollection {
    fn from_iter<I: IntoIterator<Item = SecretKeyRing>>(iter: I) -> Self {
        Self {
            rings: iter.into_iter().collect(),
        }
    }
}
