//! # Encryption and Signing
//!
//! A streaming [`Write`] pipeline that turns plaintext into a signed,
//! encrypted OpenPGP message.
//!
//! ## Output Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ENCRYPTED MESSAGE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PKESK (recipient 1)    session key wrapped for an X25519 subkey       │
//! │  PKESK (recipient 2)                                                    │
//! │  SEIPD v2 ─────────────────────────────────────────────────────────┐    │
//! │  │ Compressed (ZLIB, optional) ──────────────────────────────────┐ │    │
//! │  │ │ One-pass signature (signer 1)                               │ │    │
//! │  │ │ One-pass signature (signer 2, last)                         │ │    │
//! │  │ │ Literal data          ◄── plaintext written here           │ │    │
//! │  │ │ Signature (signer 2)                                        │ │    │
//! │  │ │ Signature (signer 1)                                        │ │    │
//! │  │ └─────────────────────────────────────────────────────────────┘ │    │
//! │  │ final AEAD tag                                                  │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//!   EncryptionBuilder ──build()──► Open ──close()──► Closed ──result()──► metadata
//!                        │            │
//!                        │            └── write error ──► Failed
//!                        └── CryptoSetup / Signing
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let mut out = Vec::new();
//! let mut stream = EncryptionBuilder::new(&mut out)
//!     .add_recipient(juliet.public_keys())
//!     .sign_with(&UnprotectedKeysProtector, romeo.secret_keys())
//!     .using_secure_algorithms()
//!     .build()?;
//! stream.write_all(b"Wherefore art thou Romeo?")?;
//! stream.close()?;
//! assert!(stream.result()?.is_signed());
//! ```

use std::io::{self, Write};

use tracing::{debug, info};

use crate::algorithm::{CompressionAlgorithm, Hasher, PublicKeyAlgorithm};
use crate::crypto::{SessionKey, SigningKeyPair};
use crate::error::{Error, Result};
use crate::key::{PublicKey, PublicKeyRing, SecretKeyRing, SecretKeyRingProtector};
use crate::metadata::OpenPgpMetadata;
use crate::packet::compressed::Compressor;
use crate::packet::literal::LiteralHeader;
use crate::packet::one_pass::OnePassSignature;
use crate::packet::pkesk::PkeskPacket;
use crate::packet::seipd::AeadEncryptor;
use crate::packet::signature::{SignaturePacket, SIG_BINARY};
use crate::packet::{write_packet, PartialBodyWriter, Tag};
use crate::policy::Policy;
use crate::time::now_timestamp;

// ============================================================================
// BUILDER
// ============================================================================

/// Configures an [`EncryptionStream`]
pub struct EncryptionBuilder<'a, W: Write> {
    sink: W,
    recipients: Vec<&'a PublicKeyRing>,
    policy: Option<Policy>,
    signers: Vec<(&'a dyn SecretKeyRingProtector, &'a SecretKeyRing)>,
}

impl<'a, W: Write> EncryptionBuilder<'a, W> {
    /// Start configuring a pipeline that writes to `sink`
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            recipients: Vec::new(),
            policy: None,
            signers: Vec::new(),
        }
    }

    /// Encrypt to the ring's most recent valid encryption subkey
    pub fn add_recipient(mut self, ring: &'a PublicKeyRing) -> Self {
        self.recipients.push(ring);
        self
    }

    /// Encrypt to every ring in `rings`
    pub fn add_recipients(mut self, rings: impl IntoIterator<Item = &'a PublicKeyRing>) -> Self {
        self.recipients.extend(rings);
        self
    }

    /// AES-256, GCM, SHA-512 and ZLIB
    pub fn using_secure_algorithms(self) -> Self {
        self.using_policy(Policy::secure_defaults())
    }

    /// Use an explicit algorithm policy
    pub fn using_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sign with the ring's signing key, unlocked by `protector`
    ///
    /// May be called more than once; each signer gets its own one-pass
    /// signature.
    pub fn sign_with(
        mut self,
        protector: &'a dyn SecretKeyRingProtector,
        ring: &'a SecretKeyRing,
    ) -> Self {
        self.signers.push((protector, ring));
        self
    }

    /// Check the configuration, unlock signing keys and write the message
    /// header
    ///
    /// ## Errors
    ///
    /// - `CryptoSetup` with no policy, no recipients, or a ring lacking a
    ///   usable encryption or signing key
    /// - `Signing` when a signing key cannot be unlocked
    pub fn build(self) -> Result<EncryptionStream<W>> {
        let policy = self
            .policy
            .ok_or_else(|| Error::CryptoSetup("no algorithm policy configured".into()))?;
        policy.validate()?;

        if self.recipients.is_empty() {
            return Err(Error::CryptoSetup("no recipients configured".into()));
        }

        let now = now_timestamp();
        let recipient_keys = self
            .recipients
            .iter()
            .map(|ring| {
                ring.encryption_key_at(now).ok_or_else(|| {
                    Error::CryptoSetup(format!(
                        "recipient {} has no usable encryption key",
                        ring.fingerprint()
                    ))
                })
            })
            .collect::<Result<Vec<&PublicKey>>>()?;

        let signers = self
            .signers
            .iter()
            .map(|(protector, ring)| Signer::unlock(*protector, ring, &policy, now))
            .collect::<Result<Vec<Signer>>>()?;

        let session_key = SessionKey::generate(policy.symmetric_key_algorithm);
        let mut sink = self.sink;
        let mut metadata = OpenPgpMetadata {
            symmetric_algorithm: Some(policy.symmetric_key_algorithm),
            integrity_protected: true,
            ..Default::default()
        };

        for key in &recipient_keys {
            let pkesk = PkeskPacket::encrypt(&session_key, key)?;
            write_packet(&mut sink, Tag::PublicKeyEncryptedSessionKey, &pkesk.to_bytes())?;
            metadata.recipient_key_ids.insert(key.key_id());
            debug!(key_id = %key.key_id(), "Wrapped session key for recipient");
        }

        let encrypted = PartialBodyWriter::start(sink, Tag::SymEncryptedProtectedData)?;
        let encryptor = AeadEncryptor::start(
            encrypted,
            &session_key,
            policy.aead_algorithm,
            policy.aead_chunk_size,
        )?;
        let mut layer = match policy.compression_algorithm {
            CompressionAlgorithm::Zlib => {
                metadata.compression_algorithm = Some(CompressionAlgorithm::Zlib);
                Layer::Compressed(Compressor::start(encryptor)?)
            }
            CompressionAlgorithm::Uncompressed => Layer::Plain(encryptor),
        };

        for (index, signer) in signers.iter().enumerate() {
            let ops = OnePassSignature {
                signature_type: SIG_BINARY,
                hash_algorithm: policy.hash_algorithm,
                public_key_algorithm: PublicKeyAlgorithm::Ed25519,
                key_id: signer.public.key_id(),
                last: index + 1 == signers.len(),
            };
            write_packet(&mut layer, Tag::OnePassSignature, &ops.to_bytes())?;
            metadata.signer_key_ids.insert(signer.public.key_id());
        }

        let literal = LiteralHeader::binary().start(layer)?;

        info!(
            recipients = recipient_keys.len(),
            signers = signers.len(),
            cipher = ?policy.symmetric_key_algorithm,
            "Opened encryption stream"
        );

        Ok(EncryptionStream {
            state: State::Open(Box::new(Open {
                literal,
                signers,
                created: now,
                metadata,
            })),
        })
    }
}

// ============================================================================
// STREAM
// ============================================================================

/// Output of the encryption: either straight into the AEAD layer, or through
/// a compressed data packet first
enum Layer<W: Write> {
    Plain(AeadEncryptor<PartialBodyWriter<W>>),
    Compressed(Compressor<AeadEncryptor<PartialBodyWriter<W>>>),
}

impl<W: Write> Layer<W> {
    /// Close every packet and give back the sink
    fn finish(self) -> io::Result<W> {
        let encryptor = match self {
            Layer::Plain(encryptor) => encryptor,
            Layer::Compressed(compressor) => compressor.finish()?,
        };
        encryptor.finish()?.finish()
    }
}

impl<W: Write> Write for Layer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Layer::Plain(encryptor) => encryptor.write(buf),
            Layer::Compressed(compressor) => compressor.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Layer::Plain(encryptor) => encryptor.flush(),
            Layer::Compressed(compressor) => compressor.flush(),
        }
    }
}

/// An unlocked signing key and the running hash of the plaintext
struct Signer {
    keypair: SigningKeyPair,
    public: PublicKey,
    hasher: Hasher,
}

impl Signer {
    fn unlock(
        protector: &dyn SecretKeyRingProtector,
        ring: &SecretKeyRing,
        policy: &Policy,
        now: u32,
    ) -> Result<Self> {
        let key = ring.signing_key_at(now).ok_or_else(|| {
            Error::CryptoSetup(format!("signer {} has no usable signing key", ring.fingerprint()))
        })?;

        let keypair = protector
            .unlock(key)
            .map_err(|e| Error::Signing(format!("cannot unlock {}: {}", key.key_id(), e)))?
            .into_signing()
            .ok_or_else(|| Error::Signing(format!("key {} is not a signing key", key.key_id())))?;

        Ok(Self {
            keypair,
            public: key.public_key().clone(),
            hasher: policy.hash_algorithm.new_hasher(),
        })
    }
}

struct Open<W: Write> {
    literal: PartialBodyWriter<Layer<W>>,
    signers: Vec<Signer>,
    created: u32,
    metadata: OpenPgpMetadata,
}

impl<W: Write> Open<W> {
    fn finish(self) -> Result<(W, OpenPgpMetadata)> {
        let mut layer = self.literal.finish()?;

        // Signatures close in the reverse order of their one-pass headers.
        for signer in self.signers.into_iter().rev() {
            let signature =
                SignaturePacket::sign(signer.hasher, &signer.keypair, &signer.public, self.created);
            write_packet(&mut layer, Tag::Signature, &signature.to_bytes())?;
        }

        let mut sink = layer.finish()?;
        sink.flush()?;
        Ok((sink, self.metadata))
    }
}

enum State<W: Write> {
    Open(Box<Open<W>>),
    Closed { sink: W, metadata: OpenPgpMetadata },
    Failed(Error),
}

/// Plaintext goes in through [`Write`]; the encrypted message comes out in
/// the sink
///
/// Nothing is finalized on drop: an unclosed stream leaves an incomplete
/// message behind.
pub struct EncryptionStream<W: Write> {
    state: State<W>,
}

impl<W: Write> EncryptionStream<W> {
    /// Finish signatures, packets and the final AEAD tag, then flush
    ///
    /// Calling it again after success is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, State::Failed(Error::StreamClosed));
        match state {
            State::Open(open) => match open.finish() {
                Ok((sink, metadata)) => {
                    info!(signatures = metadata.signer_key_ids.len(), "Closed encryption stream");
                    self.state = State::Closed { sink, metadata };
                    Ok(())
                }
                Err(e) => {
                    self.state = State::Failed(e.clone());
                    Err(e)
                }
            },
            State::Failed(e) => {
                self.state = State::Failed(e.clone());
                Err(e)
            }
            closed @ State::Closed { .. } => {
                self.state = closed;
                Ok(())
            }
        }
    }

    /// Metadata of the finished message
    ///
    /// ## Errors
    ///
    /// `ResultNotReady` until [`close`](Self::close) succeeds; the stream's
    /// failure if it failed.
    pub fn result(&self) -> Result<&OpenPgpMetadata> {
        match &self.state {
            State::Closed { metadata, .. } => Ok(metadata),
            State::Open(_) => Err(Error::ResultNotReady),
            State::Failed(e) => Err(e.clone()),
        }
    }

    /// Whether the stream has been closed successfully
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed { .. })
    }

    /// Give back the sink once closed
    pub fn into_inner(self) -> Option<W> {
        match self.state {
            State::Closed { sink, .. } => Some(sink),
            _ => None,
        }
    }
}

impl<W: Write> Write for EncryptionStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let open = match &mut self.state {
            State::Open(open) => open,
            State::Closed { .. } => return Err(Error::StreamClosed.into_io()),
            State::Failed(e) => return Err(e.clone().into_io()),
        };

        match open.literal.write(buf) {
            Ok(written) => {
                for signer in &mut open.signers {
                    signer.hasher.update(&buf[..written]);
                }
                Ok(written)
            }
            Err(e) => {
                let error = Error::from(e);
                self.state = State::Failed(error.clone());
                Err(error.into_io())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Open(open) => open.literal.flush(),
            State::Closed { sink, .. } => sink.flush(),
            State::Failed(e) => Err(e.clone().into_io()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeyFlags;
    use crate::key::{PassphraseProtector, SecretKey, UnprotectedKeysProtector};
    use crate::packet::read_packet;

    const CREATED: u32 = 1_600_000_000;

    fn secret_ring(seed: u8) -> SecretKeyRing {
        let primary = SecretKey::ed25519_from_bytes(
            &[seed; 32],
            CREATED,
            KeyFlags::CERTIFY_OTHER | KeyFlags::SIGN_DATA,
        );
        let subkey = SecretKey::x25519_from_bytes(
            &[seed + 1; 32],
            CREATED,
            KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE,
        );
        SecretKeyRing::new(primary, vec![format!("user{}@example.com", seed)], vec![subkey])
    }

    #[test]
    fn test_result_not_ready_until_close() {
        let juliet = secret_ring(10).to_public();
        let mut out = Vec::new();
        let mut stream = EncryptionBuilder::new(&mut out)
            .add_recipient(&juliet)
            .using_secure_algorithms()
            .build()
            .unwrap();

        stream.write_all(b"hello").unwrap();
        assert_eq!(stream.result().unwrap_err(), Error::ResultNotReady);

        stream.close().unwrap();
        stream.close().unwrap();
        let result = stream.result().unwrap();
        assert!(result.is_encrypted());
        assert!(!result.is_signed());
        assert_eq!(
            result.recipient_key_ids().iter().copied().collect::<Vec<_>>(),
            vec![juliet.subkeys()[0].key_id()]
        );
        assert!(stream.write_all(b"more").is_err());
    }

    #[test]
    fn test_output_starts_with_pkesk_then_seipd() {
        let romeo = secret_ring(1).to_public();
        let juliet = secret_ring(10).to_public();

        let mut out = Vec::new();
        let mut stream = EncryptionBuilder::new(&mut out)
            .add_recipients([&romeo, &juliet])
            .using_secure_algorithms()
            .build()
            .unwrap();
        stream.write_all(&[0u8; 100_000]).unwrap();
        stream.close().unwrap();
        drop(stream);

        let mut input = out.as_slice();
        let (tag, _) = read_packet(&mut input).unwrap().unwrap();
        assert_eq!(tag, Tag::PublicKeyEncryptedSessionKey);
        let (tag, _) = read_packet(&mut input).unwrap().unwrap();
        assert_eq!(tag, Tag::PublicKeyEncryptedSessionKey);
        let (tag, _) = read_packet(&mut input).unwrap().unwrap();
        assert_eq!(tag, Tag::SymEncryptedProtectedData);
        assert!(read_packet(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_setup_errors() {
        let romeo = secret_ring(1);
        let juliet = romeo.to_public();

        let no_policy = EncryptionBuilder::new(Vec::new()).add_recipient(&juliet).build();
        assert!(matches!(no_policy, Err(Error::CryptoSetup(_))));

        let no_recipients = EncryptionBuilder::new(Vec::new()).using_secure_algorithms().build();
        assert!(matches!(no_recipients, Err(Error::CryptoSetup(_))));

        let sign_only = SecretKeyRing::new(
            SecretKey::ed25519_from_bytes(&[5; 32], CREATED, KeyFlags::SIGN_DATA),
            vec![],
            vec![],
        );
        let sign_only_public = sign_only.to_public();
        let no_encryption_key = EncryptionBuilder::new(Vec::new())
            .add_recipient(&sign_only_public)
            .using_secure_algorithms()
            .build();
        assert!(matches!(no_encryption_key, Err(Error::CryptoSetup(_))));

        let bad_chunk = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .using_policy(Policy::secure_defaults().with_aead_chunk_size(40))
            .build();
        assert!(matches!(bad_chunk, Err(Error::CryptoSetup(_))));
    }

    #[test]
    fn test_signer_without_signing_key() {
        let juliet = secret_ring(10).to_public();
        let encrypt_only = SecretKeyRing::new(
            SecretKey::x25519_from_bytes(&[7; 32], CREATED, KeyFlags::ENCRYPT_COMMS),
            vec![],
            vec![],
        );
        let result = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .sign_with(&UnprotectedKeysProtector, &encrypt_only)
            .using_secure_algorithms()
            .build();
        assert!(matches!(result, Err(Error::CryptoSetup(_))));
    }

    #[test]
    fn test_locked_signing_key() {
        let juliet = secret_ring(10).to_public();
        let romeo = secret_ring(1);
        let locked = SecretKeyRing::new(
            romeo.primary_key().protect(b"montague", 0).unwrap(),
            romeo.user_ids().to_vec(),
            romeo.subkeys().to_vec(),
        );

        let unprotected = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .sign_with(&UnprotectedKeysProtector, &locked)
            .using_secure_algorithms()
            .build();
        assert!(matches!(unprotected, Err(Error::Signing(_))));

        let wrong = PassphraseProtector::new("capulet");
        let wrong_passphrase = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .sign_with(&wrong, &locked)
            .using_secure_algorithms()
            .build();
        assert!(matches!(wrong_passphrase, Err(Error::Signing(_))));

        let right = PassphraseProtector::new("montague");
        let signed = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .sign_with(&right, &locked)
            .using_secure_algorithms()
            .build();
        assert!(signed.is_ok());
    }

    #[test]
    fn test_signed_metadata() {
        let romeo = secret_ring(1);
        let juliet = secret_ring(10).to_public();

        let mut stream = EncryptionBuilder::new(Vec::new())
            .add_recipient(&juliet)
            .sign_with(&UnprotectedKeysProtector, &romeo)
            .using_policy(
                Policy::secure_defaults()
                    .with_compression_algorithm(CompressionAlgorithm::Uncompressed),
            )
            .build()
            .unwrap();
        stream.write_all(b"But soft").unwrap();
        stream.close().unwrap();

        let result = stream.result().unwrap();
        assert!(result.is_signed());
        assert!(result.signer_key_ids().contains(&romeo.key_id()));
        assert_eq!(result.compression_algorithm(), None);
        assert!(stream.into_inner().is_some_and(|out| !out.is_empty()));
    }
}
