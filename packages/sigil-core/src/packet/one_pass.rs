//! One-pass signature packets (tag 4, version 3).
//!
//! Emitted before the literal data so a reader knows which digests to
//! compute while streaming; the matching signature packet follows the data.

use super::Cursor;
use crate::algorithm::{HashAlgorithm, PublicKeyAlgorithm};
use crate::error::{Error, Result};
use crate::fingerprint::KeyId;

const VERSION: u8 = 3;

/// Header announcing a signature that follows the signed data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnePassSignature {
    /// Signature type (0x00 binary document, 0x01 text)
    pub signature_type: u8,
    /// Digest the signer used
    pub hash_algorithm: HashAlgorithm,
    /// Signer key algorithm
    pub public_key_algorithm: PublicKeyAlgorithm,
    /// Key id of the signing key
    pub key_id: KeyId,
    /// False when another one-pass signature follows before the data
    pub last: bool,
}

impl OnePassSignature {
    /// Serialize the packet body
    pub fn to_bytes(&self) -> [u8; 13] {
        let mut out = [0u8; 13];
        out[0] = VERSION;
        out[1] = self.signature_type;
        out[2] = self.hash_algorithm.id();
        out[3] = self.public_key_algorithm.id();
        out[4..12].copy_from_slice(&self.key_id.to_bytes());
        out[12] = u8::from(self.last);
        out
    }

    /// Parse a packet body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body, "one-pass signature");
        let version = cursor.u8()?;
        if version != VERSION {
            return Err(Error::MalformedPacket(format!(
                "one-pass signature version {}",
                version
            )));
        }

        let ops = Self {
            signature_type: cursor.u8()?,
            hash_algorithm: HashAlgorithm::from_id(cursor.u8()?)?,
            public_key_algorithm: PublicKeyAlgorithm::from_id(cursor.u8()?)?,
            key_id: KeyId::from_bytes(cursor.array()?),
            last: cursor.u8()? != 0,
        };
        cursor.expect_end()?;
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ops = OnePassSignature {
            signature_type: 0,
            hash_algorithm: HashAlgorithm::Sha512,
            public_key_algorithm: PublicKeyAlgorithm::Ed25519,
            key_id: KeyId::new(0x0102030405060708),
            last: true,
        };
        let bytes = ops.to_bytes();
        assert_eq!(bytes, [3, 0, 10, 27, 1, 2, 3, 4, 5, 6, 7, 8, 1]);
        assert_eq!(OnePassSignature::parse(&bytes).unwrap(), ops);
    }

    #[test]
    fn test_rejects_bad_version_and_length() {
        let mut bytes = [3, 0, 10, 27, 1, 2, 3, 4, 5, 6, 7, 8, 1];
        assert!(OnePassSignature::parse(&bytes[..12]).is_err());
        bytes[0] = 4;
        assert!(OnePassSignature::parse(&bytes).is_err());
    }
}
