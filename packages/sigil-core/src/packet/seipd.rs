//! # Encrypted Data Packets
//!
//! Symmetrically encrypted integrity protected data, version 2 (tag 18):
//! chunked AEAD with a final tag binding the total length.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SEIPD v2 LAYOUT                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  [2] [sym] [aead] [chunk octet c] [salt 32]                             │
//! │  [chunk 0 ‖ tag] [chunk 1 ‖ tag] ... [last chunk ‖ tag] [final tag]     │
//! │                                                                         │
//! │  info      = [0xD2, 2, sym, aead, c]                                    │
//! │  key ‖ iv  = HKDF-SHA256(salt, session key, info)                       │
//! │  nonce(i)  = iv ‖ u64be(i)                                              │
//! │  chunk i   = AEAD(key, nonce(i), aad = info, plaintext[i])              │
//! │  final tag = AEAD(key, nonce(n), aad = info ‖ u64be(total), "")         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every chunk is authenticated before any of its plaintext is released.
//! Dropped, reordered or appended chunks change a nonce or the final
//! length and fail the final tag.

use std::io::{self, Read, Write};

use tracing::{debug, warn};

use crate::algorithm::{AeadAlgorithm, SymmetricKeyAlgorithm};
use crate::crypto::{derive_message_keys, random_bytes, AeadCipher, SessionKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::policy::MAX_CHUNK_SIZE_OCTET;

const VERSION: u8 = 2;

/// Packet tag with the new-format bits, as bound into the AEAD data
const TAG_OCTET: u8 = 0xC0 | 18;

const SALT_SIZE: usize = 32;

/// Keyed chunk cipher shared by both directions
struct ChunkCipher {
    cipher: AeadCipher,
    iv: [u8; 4],
    info: [u8; 5],
    chunk_size: usize,
}

impl ChunkCipher {
    fn new(
        session_key: &SessionKey,
        aead: AeadAlgorithm,
        chunk_octet: u8,
        salt: &[u8; SALT_SIZE],
    ) -> Result<Self> {
        let algorithm = session_key.algorithm();
        let info = [TAG_OCTET, VERSION, algorithm.id(), aead.id(), chunk_octet];
        let keys = derive_message_keys(session_key.as_bytes(), salt, &info, algorithm.key_size())?;

        Ok(Self {
            cipher: AeadCipher::new(algorithm, &keys.key)?,
            iv: keys.iv,
            info,
            chunk_size: 1usize << (chunk_octet as u32 + 6),
        })
    }

    fn nonce(&self, index: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&self.iv);
        nonce[4..].copy_from_slice(&index.to_be_bytes());
        nonce
    }

    fn final_aad(&self, total: u64) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..5].copy_from_slice(&self.info);
        aad[5..].copy_from_slice(&total.to_be_bytes());
        aad
    }
}

// ============================================================================
// ENCRYPTOR
// ============================================================================

/// Encrypts a packet stream into a SEIPD v2 body
pub struct AeadEncryptor<W: Write> {
    inner: W,
    cipher: ChunkCipher,
    buffer: Vec<u8>,
    chunk_index: u64,
    total: u64,
}

impl<W: Write> AeadEncryptor<W> {
    /// Write the packet header fields to `inner` and key the chunk cipher
    ///
    /// `inner` should already be positioned inside a tag 18 packet body.
    pub fn start(
        mut inner: W,
        session_key: &SessionKey,
        aead: AeadAlgorithm,
        chunk_octet: u8,
    ) -> Result<Self> {
        if chunk_octet > MAX_CHUNK_SIZE_OCTET {
            return Err(Error::CryptoSetup(format!("chunk size octet {}", chunk_octet)));
        }

        let salt: [u8; SALT_SIZE] = random_bytes();
        let cipher = ChunkCipher::new(session_key, aead, chunk_octet, &salt)?;

        inner.write_all(&[VERSION, session_key.algorithm().id(), aead.id(), chunk_octet])?;
        inner.write_all(&salt)?;

        Ok(Self {
            inner,
            buffer: Vec::with_capacity(cipher.chunk_size),
            cipher,
            chunk_index: 0,
            total: 0,
        })
    }

    fn seal_chunk(&mut self, len: usize) -> io::Result<()> {
        let nonce = self.cipher.nonce(self.chunk_index);
        let sealed = self
            .cipher
            .cipher
            .seal(&nonce, &self.buffer[..len], &self.cipher.info)
            .map_err(Error::into_io)?;
        self.inner.write_all(&sealed)?;
        self.buffer.drain(..len);
        self.chunk_index += 1;
        self.total += len as u64;
        Ok(())
    }

    /// Seal the last chunk, append the final tag and hand back the sink
    pub fn finish(mut self) -> io::Result<W> {
        while !self.buffer.is_empty() {
            let len = self.buffer.len().min(self.cipher.chunk_size);
            self.seal_chunk(len)?;
        }

        let nonce = self.cipher.nonce(self.chunk_index);
        let aad = self.cipher.final_aad(self.total);
        let final_tag = self
            .cipher
            .cipher
            .seal(&nonce, &[], &aad)
            .map_err(Error::into_io)?;
        self.inner.write_all(&final_tag)?;

        debug!(chunks = self.chunk_index, bytes = self.total, "Sealed encrypted data");
        Ok(self.inner)
    }
}

impl<W: Write> Write for AeadEncryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= self.cipher.chunk_size {
            self.seal_chunk(self.cipher.chunk_size)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ============================================================================
// DECRYPTOR
// ============================================================================

/// Decrypts and authenticates a SEIPD v2 body
pub struct AeadDecryptor<R: Read> {
    inner: R,
    cipher: ChunkCipher,
    ciphertext: Vec<u8>,
    plaintext: Vec<u8>,
    position: usize,
    chunk_index: u64,
    total: u64,
    eof: bool,
    verified: bool,
}

impl<R: Read> AeadDecryptor<R> {
    /// Read the packet header fields from `inner` and key the chunk cipher
    pub fn new(mut inner: R, session_key: &SessionKey) -> Result<Self> {
        let mut header = [0u8; 4 + SALT_SIZE];
        inner.read_exact(&mut header)?;

        if header[0] != VERSION {
            return Err(Error::UnsupportedAlgorithm(format!(
                "encrypted data packet version {}",
                header[0]
            )));
        }
        let algorithm = SymmetricKeyAlgorithm::from_id(header[1])?;
        if algorithm != session_key.algorithm() {
            return Err(Error::IntegrityCheck(
                "cipher differs from the one bound to the session key".into(),
            ));
        }
        let aead = AeadAlgorithm::from_id(header[2])?;
        let chunk_octet = header[3];
        if chunk_octet > MAX_CHUNK_SIZE_OCTET {
            return Err(Error::MalformedPacket(format!(
                "chunk size octet {}",
                chunk_octet
            )));
        }
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&header[4..]);

        let cipher = ChunkCipher::new(session_key, aead, chunk_octet, &salt)?;
        Ok(Self {
            inner,
            ciphertext: Vec::with_capacity(cipher.chunk_size + 2 * TAG_SIZE),
            cipher,
            plaintext: Vec::new(),
            position: 0,
            chunk_index: 0,
            total: 0,
            eof: false,
            verified: false,
        })
    }

    /// Whether the final tag has been checked
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Read until a full chunk plus one more tag is buffered, or the input ends
    fn fill(&mut self) -> io::Result<()> {
        let want = self.cipher.chunk_size + 2 * TAG_SIZE;
        let mut scratch = [0u8; 8192];
        while !self.eof && self.ciphertext.len() < want {
            let room = (want - self.ciphertext.len()).min(scratch.len());
            match self.inner.read(&mut scratch[..room]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.ciphertext.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(truncated().into_io());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn open_chunk(&mut self, len: usize) -> Result<()> {
        let nonce = self.cipher.nonce(self.chunk_index);
        let opened = self
            .cipher
            .cipher
            .open(&nonce, &self.ciphertext[..len], &self.cipher.info)
            .map_err(|_| {
                Error::IntegrityCheck(format!("chunk {} failed authentication", self.chunk_index))
            })?;
        self.ciphertext.drain(..len);
        self.chunk_index += 1;
        self.total += opened.len() as u64;
        self.plaintext = opened;
        self.position = 0;
        Ok(())
    }

    /// Decrypt the next chunk, or check the final tag at the end
    fn advance(&mut self) -> Result<()> {
        self.fill()?;

        let sealed_chunk = self.cipher.chunk_size + TAG_SIZE;
        if self.ciphertext.len() >= sealed_chunk + TAG_SIZE {
            return self.open_chunk(sealed_chunk);
        }
        if !self.eof {
            return Ok(());
        }

        if self.ciphertext.len() < TAG_SIZE {
            return Err(truncated());
        }
        let last = self.ciphertext.len() - TAG_SIZE;
        if last > 0 {
            if last <= TAG_SIZE {
                return Err(truncated());
            }
            self.open_chunk(last)?;
        }

        let nonce = self.cipher.nonce(self.chunk_index);
        let aad = self.cipher.final_aad(self.total);
        let tag_offset = self.ciphertext.len() - TAG_SIZE;
        self.cipher
            .cipher
            .open(&nonce, &self.ciphertext[tag_offset..], &aad)
            .map_err(|_| {
                warn!("Final authentication tag mismatch");
                Error::IntegrityCheck("final authentication tag mismatch".into())
            })?;
        self.ciphertext.clear();
        self.verified = true;
        debug!(chunks = self.chunk_index, bytes = self.total, "Encrypted data authenticated");
        Ok(())
    }

    /// Give back the packet body
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn truncated() -> Error {
    Error::IntegrityCheck("encrypted data is truncated".into())
}

impl<R: Read> Read for AeadDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.plaintext.len() {
            if self.verified || buf.is_empty() {
                return Ok(0);
            }
            self.advance().map_err(Error::into_io)?;
        }

        let n = buf.len().min(self.plaintext.len() - self.position);
        buf[..n].copy_from_slice(&self.plaintext[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(key: &SessionKey, chunk_octet: u8, data: &[u8]) -> Vec<u8> {
        let mut enc = AeadEncryptor::start(Vec::new(), key, AeadAlgorithm::Gcm, chunk_octet).unwrap();
        for piece in data.chunks(37) {
            enc.write_all(piece).unwrap();
        }
        enc.finish().unwrap()
    }

    fn decrypt(key: &SessionKey, body: &[u8]) -> Result<Vec<u8>> {
        let mut dec = AeadDecryptor::new(body, key)?;
        let mut out = Vec::new();
        dec.read_to_end(&mut out)?;
        assert!(dec.is_verified());
        Ok(out)
    }

    #[test]
    fn test_round_trip_sizes() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        // chunk octet 0 gives 64-byte chunks
        for len in [0usize, 1, 63, 64, 65, 128, 1000] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let body = encrypt(&key, 0, &data);
            assert_eq!(decrypt(&key, &body).unwrap(), data, "length {}", len);
        }
    }

    #[test]
    fn test_ciphertext_layout() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes128);
        let body = encrypt(&key, 0, &[0u8; 100]);
        // header + two sealed chunks + final tag
        assert_eq!(body.len(), 36 + (64 + 16) + (36 + 16) + 16);
        assert_eq!(&body[..4], &[2, 7, 3, 0]);
    }

    #[test]
    fn test_every_byte_is_authenticated() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let body = encrypt(&key, 0, &[5u8; 150]);
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x40;
            assert!(decrypt(&key, &tampered).is_err(), "byte {} not authenticated", i);
        }
    }

    #[test]
    fn test_truncation_detected() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let body = encrypt(&key, 0, &[5u8; 200]);
        for cut in [1usize, 16, 17, 80, body.len() - 36] {
            let result = decrypt(&key, &body[..body.len() - cut]);
            assert!(
                matches!(result, Err(Error::IntegrityCheck(_))),
                "cut {} gave {:?}",
                cut,
                result
            );
        }
    }

    #[test]
    fn test_dropped_chunk_detected() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let body = encrypt(&key, 0, &[5u8; 200]);
        let sealed = 64 + 16;
        let mut spliced = body[..36].to_vec();
        spliced.extend_from_slice(&body[36 + sealed..]);
        assert!(matches!(decrypt(&key, &spliced), Err(Error::IntegrityCheck(_))));
    }

    #[test]
    fn test_wrong_session_key() {
        let key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let other = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let body = encrypt(&key, 4, b"secret");
        assert!(matches!(decrypt(&other, &body), Err(Error::IntegrityCheck(_))));
    }
}
