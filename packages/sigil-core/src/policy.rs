//! # Algorithm Policy
//!
//! Which algorithms an encryption run uses. [`Policy::default`] is the
//! "secure defaults" selection:
//!
//! | Setting | Default |
//! |---------|---------|
//! | Symmetric cipher | AES-256 |
//! | AEAD mode | GCM |
//! | Signature digest | SHA-512 |
//! | Compression | ZLIB |
//! | AEAD chunk size | 2^(10+6) = 64 KiB |
//!
//! Policies are plain data and can be loaded from JSON:
//!
//! ```ignore
//! let policy = Policy::from_json(r#"{ "symmetric_key_algorithm": "AES_128" }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::algorithm::{AeadAlgorithm, CompressionAlgorithm, HashAlgorithm, SymmetricKeyAlgorithm};
use crate::error::{Error, Result};

/// Largest chunk size octet allowed (chunk size 2^22 bytes)
pub const MAX_CHUNK_SIZE_OCTET: u8 = 16;

/// Default chunk size octet (chunk size 2^16 bytes)
pub const DEFAULT_CHUNK_SIZE_OCTET: u8 = 10;

/// Algorithm selection for the encryption pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Cipher for the message body
    pub symmetric_key_algorithm: SymmetricKeyAlgorithm,
    /// AEAD mode for the message body
    pub aead_algorithm: AeadAlgorithm,
    /// Digest for signatures
    pub hash_algorithm: HashAlgorithm,
    /// Compression applied before encryption
    pub compression_algorithm: CompressionAlgorithm,
    /// AEAD chunk size octet `c`; chunks hold `2^(c+6)` plaintext bytes
    pub aead_chunk_size: u8,
}

impl Policy {
    /// Strong defaults: AES-256/GCM, SHA-512, ZLIB
    pub fn secure_defaults() -> Self {
        Self {
            symmetric_key_algorithm: SymmetricKeyAlgorithm::Aes256,
            aead_algorithm: AeadAlgorithm::Gcm,
            hash_algorithm: HashAlgorithm::Sha512,
            compression_algorithm: CompressionAlgorithm::Zlib,
            aead_chunk_size: DEFAULT_CHUNK_SIZE_OCTET,
        }
    }

    /// Parse a policy from JSON; missing fields take their default
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Policy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy for values the wire format cannot express
    pub fn validate(&self) -> Result<()> {
        if self.aead_chunk_size > MAX_CHUNK_SIZE_OCTET {
            return Err(Error::CryptoSetup(format!(
                "AEAD chunk size octet {} exceeds maximum {}",
                self.aead_chunk_size, MAX_CHUNK_SIZE_OCTET
            )));
        }
        Ok(())
    }

    /// Plaintext bytes per AEAD chunk
    pub fn chunk_size(&self) -> usize {
        1usize << (self.aead_chunk_size as u32 + 6)
    }

    /// Builder-style cipher override
    pub fn with_symmetric_key_algorithm(mut self, algorithm: SymmetricKeyAlgorithm) -> Self {
        self.symmetric_key_algorithm = algorithm;
        self
    }

    /// Builder-style digest override
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Builder-style compression override
    pub fn with_compression_algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression_algorithm = algorithm;
        self
    }

    /// Builder-style chunk size override
    pub fn with_aead_chunk_size(mut self, octet: u8) -> Self {
        self.aead_chunk_size = octet;
        self
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::secure_defaults()
    }
}
