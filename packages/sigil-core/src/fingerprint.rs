//! # Fingerprints and Key IDs
//!
//! OpenPGP v4 identity values.
//!
//! ## Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    V4 FINGERPRINT / KEY ID                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Public key packet body                                                │
//! │  ┌────────┬──────────────┬───────────┬──────────────────────┐          │
//! │  │ 0x04   │ created (u32)│ algorithm │ key material         │          │
//! │  └────────┴──────────────┴───────────┴──────────────────────┘          │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  SHA-1( 0x99 || u16be(body length) || body )                           │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  Fingerprint: 20 bytes, shown as 40 uppercase hex digits               │
//! │  4A4F48414E4E53454E20 4953204120 4E45524421                            │
//! │                                 └──────┬─────────┘                     │
//! │                                        ▼                               │
//! │  Key ID: low 8 bytes of the fingerprint (u64, big-endian)              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`Fingerprint`] parsed from user input accepts either case and always
//! renders in uppercase. Equality and ordering use the canonical value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Length of a v4 fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 20;

/// Length of a v4 fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_SIZE * 2;

/// Length of a key id in bytes
pub const KEY_ID_SIZE: usize = 8;

// ============================================================================
// KEY ID
// ============================================================================

/// 64-bit OpenPGP key id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(u64);

impl KeyId {
    /// Create from a raw 64-bit value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create from the 8 big-endian wire bytes
    pub fn from_bytes(bytes: [u8; KEY_ID_SIZE]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Big-endian wire bytes
    pub fn to_bytes(self) -> [u8; KEY_ID_SIZE] {
        self.0.to_be_bytes()
    }

    /// Raw 64-bit value
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl fmt::UpperHex for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for KeyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != KEY_ID_SIZE * 2 {
            return Err(Error::InvalidFormat(format!(
                "Key id must be {} hex characters, got {}",
                KEY_ID_SIZE * 2,
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidFormat(format!("Invalid key id hex '{}'", s)));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::InvalidFormat(format!("Invalid key id hex '{}': {}", s, e)))
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// OpenPGP v4 fingerprint
///
/// Stored in its canonical form: 40 uppercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    value: String,
}

impl Fingerprint {
    /// Parse a fingerprint from a hex string
    ///
    /// ## Validation
    ///
    /// - Must be exactly 40 characters
    /// - Every character must be in `[0-9A-Fa-f]`
    pub fn parse(hex_str: &str) -> Result<Self> {
        if hex_str.len() != FINGERPRINT_HEX_LEN {
            return Err(Error::InvalidFormat(format!(
                "Fingerprint must be {} hex characters, got {}",
                FINGERPRINT_HEX_LEN,
                hex_str.len()
            )));
        }

        if let Some(bad) = hex_str.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(Error::InvalidFormat(format!(
                "Fingerprint contains non-hex character '{}'",
                bad
            )));
        }

        Ok(Self {
            value: hex_str.to_ascii_uppercase(),
        })
    }

    /// Create from the raw 20 fingerprint bytes
    pub fn from_bytes(bytes: &[u8; FINGERPRINT_SIZE]) -> Self {
        Self {
            value: hex::encode_upper(bytes),
        }
    }

    /// Compute the v4 fingerprint of a public key packet body
    ///
    /// `body` is the serialized public key packet without its packet header.
    pub fn of_key_packet_body(body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(body);
        let digest: [u8; FINGERPRINT_SIZE] = hasher.finalize().into();
        Self::from_bytes(&digest)
    }

    /// Compute the fingerprint of a public key
    pub fn from_public_key(key: &crate::key::PublicKey) -> Self {
        Self::of_key_packet_body(&key.packet_body())
    }

    /// Raw fingerprint bytes
    pub fn to_bytes(&self) -> [u8; FINGERPRINT_SIZE] {
        let mut out = [0u8; FINGERPRINT_SIZE];
        // The canonical form is validated hex, so decoding cannot fail.
        if hex::decode_to_slice(&self.value, &mut out).is_err() {
            out = [0u8; FINGERPRINT_SIZE];
        }
        out
    }

    /// Key id: the low 64 bits of the fingerprint
    pub fn key_id(&self) -> KeyId {
        let bytes = self.to_bytes();
        let mut low = [0u8; KEY_ID_SIZE];
        low.copy_from_slice(&bytes[FINGERPRINT_SIZE - KEY_ID_SIZE..]);
        KeyId::from_bytes(low)
    }

    /// Canonical uppercase hex form
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Number of hex characters (always 40)
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Always false; present alongside [`Fingerprint::len`]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Character at `index`, if in range
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.value.as_bytes().get(index).map(|b| *b as char)
    }

    /// Characters in `start..end`, if the range is valid
    pub fn sub_sequence(&self, start: usize, end: usize) -> Option<&str> {
        if start > end {
            return None;
        }
        self.value.get(start..end)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Fingerprint {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.value
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl PartialEq<str> for Fingerprint {
    fn eq(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for Fingerprint {
    fn eq(&self, other: &&str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }
}

// ============================================================================
// TESTS
// ============================================================================
