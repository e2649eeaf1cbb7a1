//! # Signature Packets
//!
//! Version 4 Ed25519 document signatures (tag 2).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SIGNATURE PACKET (v4)                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  [4] [type] [27] [hash] [hashed len u16] [hashed subpackets]            │
//! │      [unhashed len u16] [unhashed subpackets]                           │
//! │      [left 16 bits of digest] [Ed25519 signature, 64 bytes]             │
//! │                                                                         │
//! │  Hashed:   creation time (2), issuer fingerprint (33)                   │
//! │  Unhashed: issuer key id (16)                                           │
//! │                                                                         │
//! │  digest = H(data ‖ [4 type alg hash len hashed] ‖ 0x04 0xFF u32be(n))   │
//! │  where n is the length of the bracketed trailer                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use super::Cursor;
use crate::algorithm::{HashAlgorithm, Hasher, PublicKeyAlgorithm};
use crate::crypto::{self, SigningKeyPair};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, KeyId, FINGERPRINT_SIZE};
use crate::key::PublicKey;

const VERSION: u8 = 4;

/// Signature over a binary document
pub const SIG_BINARY: u8 = 0x00;

/// Signature over a canonical text document
pub const SIG_TEXT: u8 = 0x01;

mod subpacket {
    pub const CREATION_TIME: u8 = 2;
    pub const ISSUER_KEY_ID: u8 = 16;
    pub const ISSUER_FINGERPRINT: u8 = 33;
    pub const CRITICAL: u8 = 0x80;
}

/// A parsed or freshly made document signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePacket {
    /// Signature type
    pub signature_type: u8,
    /// Digest algorithm
    pub hash_algorithm: HashAlgorithm,
    /// Signature creation time
    pub created: u32,
    /// Issuer fingerprint, when present
    pub issuer_fingerprint: Option<Fingerprint>,
    /// Issuer key id
    pub issuer: KeyId,
    hashed_area: Vec<u8>,
    unhashed_area: Vec<u8>,
    left16: [u8; 2],
    signature: crypto::Signature,
}

impl SignaturePacket {
    /// Finish `hasher` (already fed the signed data) and sign it
    pub fn sign(
        hasher: Hasher,
        keypair: &SigningKeyPair,
        signer: &PublicKey,
        created: u32,
    ) -> Self {
        let hash_algorithm = hasher.algorithm();

        let mut hashed_area = Vec::with_capacity(6 + 23);
        push_subpacket(&mut hashed_area, subpacket::CREATION_TIME, &created.to_be_bytes());
        let mut issuer_fpr = Vec::with_capacity(1 + FINGERPRINT_SIZE);
        issuer_fpr.push(VERSION);
        issuer_fpr.extend_from_slice(&signer.fingerprint().to_bytes());
        push_subpacket(&mut hashed_area, subpacket::ISSUER_FINGERPRINT, &issuer_fpr);

        let mut unhashed_area = Vec::with_capacity(10);
        push_subpacket(
            &mut unhashed_area,
            subpacket::ISSUER_KEY_ID,
            &signer.key_id().to_bytes(),
        );

        let digest = finish_digest(hasher, SIG_BINARY, &hashed_area);
        let signature = crypto::sign(keypair, &digest);

        Self {
            signature_type: SIG_BINARY,
            hash_algorithm,
            created,
            issuer_fingerprint: Some(signer.fingerprint().clone()),
            issuer: signer.key_id(),
            hashed_area,
            unhashed_area,
            left16: [digest[0], digest[1]],
            signature,
        }
    }

    /// Check the signature against `key`, given a hasher fed the signed data
    ///
    /// Returns `Ok(false)` for a signature that does not verify, and an
    /// error only when the key cannot be used at all.
    pub fn verify(&self, hasher: Hasher, key: &PublicKey) -> Result<bool> {
        if key.algorithm() != PublicKeyAlgorithm::Ed25519 {
            return Err(Error::InvalidKey(format!("key {} cannot verify", key.key_id())));
        }
        if hasher.algorithm() != self.hash_algorithm {
            return Ok(false);
        }
        if let Some(fpr) = &self.issuer_fingerprint {
            if fpr != key.fingerprint() {
                return Ok(false);
            }
        }

        let digest = finish_digest(hasher, self.signature_type, &self.hashed_area);
        if digest[..2] != self.left16 {
            return Ok(false);
        }
        crypto::verify(key.material(), &digest, &self.signature)
    }

    /// Serialize the packet body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.hashed_area.len() + self.unhashed_area.len() + 64);
        out.push(VERSION);
        out.push(self.signature_type);
        out.push(PublicKeyAlgorithm::Ed25519.id());
        out.push(self.hash_algorithm.id());
        out.extend_from_slice(&(self.hashed_area.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.hashed_area);
        out.extend_from_slice(&(self.unhashed_area.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.unhashed_area);
        out.extend_from_slice(&self.left16);
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    /// Parse a packet body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body, "signature");

        let version = cursor.u8()?;
        if version != VERSION {
            return Err(Error::MalformedPacket(format!("signature version {}", version)));
        }
        let signature_type = cursor.u8()?;
        if signature_type != SIG_BINARY && signature_type != SIG_TEXT {
            return Err(Error::MalformedPacket(format!(
                "signature type 0x{:02X} is not a document signature",
                signature_type
            )));
        }
        let algorithm = PublicKeyAlgorithm::from_id(cursor.u8()?)?;
        if algorithm != PublicKeyAlgorithm::Ed25519 {
            return Err(Error::UnsupportedAlgorithm(format!("{:?} signatures", algorithm)));
        }
        let hash_algorithm = HashAlgorithm::from_id(cursor.u8()?)?;

        let hashed_len = cursor.u16()? as usize;
        let hashed_area = cursor.bytes(hashed_len)?.to_vec();
        let unhashed_len = cursor.u16()? as usize;
        let unhashed_area = cursor.bytes(unhashed_len)?.to_vec();
        let left16 = cursor.array()?;
        let signature = crypto::Signature::from_slice(cursor.rest())?;

        let mut created = None;
        let mut issuer_fingerprint = None;
        let mut issuer_key_id = None;
        for (hashed, area) in [(true, &hashed_area), (false, &unhashed_area)] {
            for (kind, critical, data) in subpackets(area)? {
                match kind {
                    subpacket::CREATION_TIME if hashed => {
                        let bytes: [u8; 4] = data.try_into().map_err(|_| {
                            Error::MalformedPacket("bad creation time subpacket".into())
                        })?;
                        created = Some(u32::from_be_bytes(bytes));
                    }
                    subpacket::ISSUER_FINGERPRINT => {
                        if data.len() != 1 + FINGERPRINT_SIZE || data[0] != VERSION {
                            return Err(Error::MalformedPacket(
                                "bad issuer fingerprint subpacket".into(),
                            ));
                        }
                        let mut bytes = [0u8; FINGERPRINT_SIZE];
                        bytes.copy_from_slice(&data[1..]);
                        // A hashed fingerprint wins over an unhashed one.
                        if hashed || issuer_fingerprint.is_none() {
                            issuer_fingerprint = Some(Fingerprint::from_bytes(&bytes));
                        }
                    }
                    subpacket::ISSUER_KEY_ID => {
                        let bytes: [u8; 8] = data.try_into().map_err(|_| {
                            Error::MalformedPacket("bad issuer subpacket".into())
                        })?;
                        issuer_key_id = Some(KeyId::from_bytes(bytes));
                    }
                    _ if critical && hashed => {
                        return Err(Error::MalformedPacket(format!(
                            "unknown critical subpacket {}",
                            kind
                        )));
                    }
                    _ => {}
                }
            }
        }

        let created = created
            .ok_or_else(|| Error::MalformedPacket("signature has no creation time".into()))?;
        let issuer = issuer_fingerprint
            .as_ref()
            .map(Fingerprint::key_id)
            .or(issuer_key_id)
            .ok_or_else(|| Error::MalformedPacket("signature names no issuer".into()))?;

        Ok(Self {
            signature_type,
            hash_algorithm,
            created,
            issuer_fingerprint,
            issuer,
            hashed_area,
            unhashed_area,
            left16,
            signature,
        })
    }
}

/// Complete the digest with the v4 signature trailer
fn finish_digest(mut hasher: Hasher, signature_type: u8, hashed_area: &[u8]) -> Vec<u8> {
    let mut trailer = Vec::with_capacity(6 + hashed_area.len());
    trailer.push(VERSION);
    trailer.push(signature_type);
    trailer.push(PublicKeyAlgorithm::Ed25519.id());
    trailer.push(hasher.algorithm().id());
    trailer.extend_from_slice(&(hashed_area.len() as u16).to_be_bytes());
    trailer.extend_from_slice(hashed_area);

    hasher.update(&trailer);
    hasher.update(&[VERSION, 0xFF]);
    hasher.update(&(trailer.len() as u32).to_be_bytes());
    hasher.finalize()
}

fn push_subpacket(area: &mut Vec<u8>, kind: u8, data: &[u8]) {
    // Every subpacket written here is well under 192 bytes.
    area.push((data.len() + 1) as u8);
    area.push(kind);
    area.extend_from_slice(data);
}

/// Split a subpacket area into `(type, critical, data)` triples
fn subpackets(area: &[u8]) -> Result<Vec<(u8, bool, &[u8])>> {
    let mut cursor = Cursor::new(area, "signature subpacket");
    let mut out = Vec::new();
    while !cursor.is_empty() {
        let first = cursor.u8()? as usize;
        let len = match first {
            0..=191 => first,
            192..=254 => ((first - 192) << 8) + cursor.u8()? as usize + 192,
            _ => cursor.u32()? as usize,
        };
        if len == 0 {
            return Err(Error::MalformedPacket("empty signature subpacket".into()));
        }
        let body = cursor.bytes(len)?;
        let kind = body[0];
        out.push((kind & !subpacket::CRITICAL, kind & subpacket::CRITICAL != 0, &body[1..]));
    }
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================
