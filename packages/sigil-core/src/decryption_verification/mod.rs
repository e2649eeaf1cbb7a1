//! # Decryption and Verification
//!
//! A streaming [`Read`] pipeline that turns an encrypted OpenPGP message
//! back into plaintext and checks the signatures inside it.
//!
//! ## Processing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DECRYPTION PIPELINE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  first read()                                                           │
//! │  ├── collect PKESK packets                                              │
//! │  ├── find a local secret key by key id, unlock it, unwrap session key   │
//! │  ├── open SEIPD v2 (chunks are authenticated before release)            │
//! │  ├── open compressed packet, if any                                     │
//! │  ├── collect one-pass signatures, start one hash each                   │
//! │  └── open literal data                                                  │
//! │                                                                         │
//! │  read() ── literal bytes ──► caller, and into every hash                │
//! │                                                                         │
//! │  end of literal data                                                    │
//! │  ├── read trailing signatures, pair them with one-pass headers          │
//! │  ├── drain every layer; the final AEAD tag must verify                  │
//! │  └── nothing but marker packets may follow the encrypted data           │
//! │                                                                         │
//! │  close()                                                                │
//! │  └── verify each signature against the supplied public keys             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//!   Pending ──read──► Literal ──end of data──► Drained ──close──► Closed
//!      │                 │                        │
//!      └─────────────────┴──────── error ─────────┴──────────────► Failed
//! ```
//!
//! A failure is sticky: every later `read`, `close` and `result` reports it
//! again.

use std::io::{self, Read};

use tracing::{debug, info, warn};

use crate::algorithm::{CompressionAlgorithm, Hasher};
use crate::crypto::SessionKey;
use crate::error::{Error, Result};
use crate::fingerprint::KeyId;
use crate::key::{PublicKeyRingCollection, SecretKeyRingCollection, SecretKeyRingProtector};
use crate::metadata::{OpenPgpMetadata, SignatureOutcome, SignatureStatus};
use crate::packet::compressed::Decompressor;
use crate::packet::literal::LiteralHeader;
use crate::packet::one_pass::OnePassSignature;
use crate::packet::pkesk::PkeskPacket;
use crate::packet::seipd::AeadDecryptor;
use crate::packet::signature::SignaturePacket;
use crate::packet::{read_body, read_header, PacketBody, Tag};

// ============================================================================
// BUILDER
// ============================================================================

/// Configures a [`DecryptionStream`]
pub struct DecryptionBuilder<'a, R: Read> {
    source: R,
    decryption: Option<(&'a dyn SecretKeyRingProtector, &'a SecretKeyRingCollection)>,
    verification: Option<&'a PublicKeyRingCollection>,
    ignore_missing_public_keys: bool,
}

impl<'a, R: Read> DecryptionBuilder<'a, R> {
    /// Start configuring a pipeline reading from `source`
    pub fn new(source: R) -> Self {
        Self {
            source,
            decryption: None,
            verification: None,
            ignore_missing_public_keys: false,
        }
    }

    /// Secret keys to decrypt with, unlocked by `protector` when needed
    pub fn decrypt_with(
        mut self,
        protector: &'a dyn SecretKeyRingProtector,
        keys: &'a SecretKeyRingCollection,
    ) -> Self {
        self.decryption = Some((protector, keys));
        self
    }

    /// Public keys of the expected signers
    pub fn verify_with(mut self, keys: &'a PublicKeyRingCollection) -> Self {
        self.verification = Some(keys);
        self
    }

    /// Record signers without a supplied public key as unverified instead
    /// of failing
    pub fn ignore_missing_public_keys(mut self) -> Self {
        self.ignore_missing_public_keys = true;
        self
    }

    /// Create the stream; nothing is read until the first `read`
    ///
    /// ## Errors
    ///
    /// `CryptoSetup` when no decryption keys were given.
    pub fn build(self) -> Result<DecryptionStream<'a, R>> {
        let (protector, secret_keys) = self
            .decryption
            .ok_or_else(|| Error::CryptoSetup("no decryption keys configured".into()))?;
        if secret_keys.is_empty() {
            return Err(Error::CryptoSetup("decryption key collection is empty".into()));
        }

        Ok(DecryptionStream {
            keys: Keys {
                protector,
                secret_keys,
                public_keys: self.verification,
                ignore_missing_public_keys: self.ignore_missing_public_keys,
            },
            state: State::Pending(self.source),
        })
    }
}

// ============================================================================
// PLAINTEXT LAYERS
// ============================================================================

type EncryptedBody<R> = AeadDecryptor<PacketBody<R>>;

/// Decrypted packet stream, possibly behind a compressed data packet
enum PlaintextSource<R: Read> {
    Direct(EncryptedBody<R>),
    Stored(PacketBody<EncryptedBody<R>>),
    Compressed(Decompressor<PacketBody<EncryptedBody<R>>>),
}

impl<R: Read> PlaintextSource<R> {
    /// Read every layer to its end so the final tag gets checked
    fn finish(self) -> Result<()> {
        let mut decryptor = match self {
            PlaintextSource::Direct(decryptor) => decryptor,
            PlaintextSource::Stored(mut body) => {
                body.drain()?;
                body.into_inner()
            }
            PlaintextSource::Compressed(mut inflater) => {
                io::copy(&mut inflater, &mut io::sink())?;
                let mut body = inflater.into_inner();
                body.drain()?;
                body.into_inner()
            }
        };

        io::copy(&mut decryptor, &mut io::sink())?;
        if !decryptor.is_verified() {
            return Err(Error::IntegrityCheck(
                "encrypted data ended without a final tag".into(),
            ));
        }
        let mut body = decryptor.into_inner();
        body.drain()?;
        expect_end_of_message(body.into_inner())
    }
}

/// Only marker packets may follow the encrypted data packet
fn expect_end_of_message<R: Read>(mut source: R) -> Result<()> {
    while let Some(header) = read_header(&mut source)? {
        if header.tag != Tag::Marker {
            return Err(Error::MalformedPacket(format!(
                "unexpected {:?} packet after encrypted data",
                header.tag
            )));
        }
        read_body(&mut source, header.length)?;
    }
    Ok(())
}

impl<R: Read> Read for PlaintextSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlaintextSource::Direct(decryptor) => decryptor.read(buf),
            PlaintextSource::Stored(body) => body.read(buf),
            PlaintextSource::Compressed(inflater) => inflater.read(buf),
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

struct Keys<'a> {
    protector: &'a dyn SecretKeyRingProtector,
    secret_keys: &'a SecretKeyRingCollection,
    public_keys: Option<&'a PublicKeyRingCollection>,
    ignore_missing_public_keys: bool,
}

/// A one-pass signature and the hash it is accumulating
struct PendingSignature {
    header: OnePassSignature,
    hasher: Hasher,
}

struct Literal<R: Read> {
    body: PacketBody<PlaintextSource<R>>,
    pending: Vec<PendingSignature>,
    metadata: OpenPgpMetadata,
}

/// Fully read and authenticated; signatures not yet checked
struct Drained {
    signatures: Vec<(PendingSignature, SignaturePacket)>,
    metadata: OpenPgpMetadata,
}

enum State<R: Read> {
    Pending(R),
    Literal(Box<Literal<R>>),
    Drained(Box<Drained>),
    Closed(OpenPgpMetadata),
    Failed(Error),
}

/// Plaintext comes out through [`Read`]; [`close`](Self::close) yields the
/// verification result
pub struct DecryptionStream<'a, R: Read> {
    keys: Keys<'a>,
    state: State<R>,
}

impl<'a, R: Read> DecryptionStream<'a, R> {
    /// Read what is left, check the final tag and verify every signature
    ///
    /// Idempotent; a failure from reading or closing is returned every time.
    pub fn close(&mut self) -> Result<()> {
        let outcome = self.advance_to_drained().and_then(|()| self.verify());
        if let Err(e) = &outcome {
            self.state = State::Failed(e.clone());
        }
        outcome
    }

    /// Verification metadata
    ///
    /// ## Errors
    ///
    /// `ResultNotReady` until [`close`](Self::close) succeeds; the stream's
    /// failure if it failed.
    pub fn result(&self) -> Result<&OpenPgpMetadata> {
        match &self.state {
            State::Closed(metadata) => Ok(metadata),
            State::Failed(e) => Err(e.clone()),
            _ => Err(Error::ResultNotReady),
        }
    }

    /// Whether [`close`](Self::close) has succeeded
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed(_))
    }

    fn take_state(&mut self) -> State<R> {
        std::mem::replace(&mut self.state, State::Failed(Error::StreamClosed))
    }

    /// Drive the stream up to the literal data
    fn open_message(&mut self) -> Result<()> {
        match self.take_state() {
            State::Pending(source) => {
                let literal = open(&self.keys, source)?;
                self.state = State::Literal(Box::new(literal));
            }
            other => self.state = other,
        }
        Ok(())
    }

    /// Consume whatever plaintext is left and finish the message
    fn advance_to_drained(&mut self) -> Result<()> {
        self.open_message()?;
        match self.take_state() {
            State::Literal(mut literal) => {
                let literal_ref = &mut *literal;
                let mut hashing = HashingReader {
                    inner: &mut literal_ref.body,
                    pending: &mut literal_ref.pending,
                };
                io::copy(&mut hashing, &mut io::sink())?;
                self.state = State::Drained(Box::new(finish_literal(*literal)?));
                Ok(())
            }
            State::Failed(e) => {
                self.state = State::Failed(e.clone());
                Err(e)
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    /// Check drained signatures against the supplied keys
    fn verify(&mut self) -> Result<()> {
        match self.take_state() {
            State::Drained(drained) => {
                let metadata = verify_signatures(&self.keys, *drained)?;
                info!(
                    signed = metadata.is_signed(),
                    verified = metadata.is_verified(),
                    "Closed decryption stream"
                );
                self.state = State::Closed(metadata);
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}

impl<'a, R: Read> Read for DecryptionStream<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.open_message() {
            self.state = State::Failed(e.clone());
            return Err(e.into_io());
        }

        let read = match &mut self.state {
            State::Literal(literal) => {
                let literal = &mut **literal;
                let mut hashing = HashingReader {
                    inner: &mut literal.body,
                    pending: &mut literal.pending,
                };
                hashing.read(buf)
            }
            State::Drained(_) => return Ok(0),
            State::Closed(_) => return Err(Error::StreamClosed.into_io()),
            State::Failed(e) => return Err(e.clone().into_io()),
            State::Pending(_) => return Ok(0),
        };

        match read {
            Ok(0) => match self.advance_to_drained() {
                Ok(()) => Ok(0),
                Err(e) => {
                    self.state = State::Failed(e.clone());
                    Err(e.into_io())
                }
            },
            Ok(n) => Ok(n),
            Err(e) => {
                let error = Error::from(e);
                self.state = State::Failed(error.clone());
                Err(error.into_io())
            }
        }
    }
}

/// Feeds everything read through every pending signature hash
struct HashingReader<'s, R: Read> {
    inner: &'s mut PacketBody<PlaintextSource<R>>,
    pending: &'s mut [PendingSignature],
}

impl<'s, R: Read> Read for HashingReader<'s, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for signature in self.pending.iter_mut() {
            signature.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

// ============================================================================
// MESSAGE STRUCTURE
// ============================================================================

/// Parse up to the literal data, recovering the session key on the way
fn open<R: Read>(keys: &Keys<'_>, mut source: R) -> Result<Literal<R>> {
    let mut pkesks = Vec::new();
    let encrypted_length = loop {
        let header = read_header(&mut source)?
            .ok_or_else(|| Error::MalformedPacket("message holds no encrypted data".into()))?;
        match header.tag {
            Tag::PublicKeyEncryptedSessionKey => {
                let body = read_body(&mut source, header.length)?;
                match PkeskPacket::parse(&body) {
                    Ok(pkesk) => pkesks.push(pkesk),
                    Err(Error::UnsupportedAlgorithm(what)) => {
                        debug!(%what, "Skipping session key packet");
                    }
                    Err(e) => return Err(e),
                }
            }
            Tag::Marker => {
                read_body(&mut source, header.length)?;
            }
            Tag::SymEncryptedProtectedData => break header.length,
            other => {
                return Err(Error::MalformedPacket(format!(
                    "unexpected {:?} packet before encrypted data",
                    other
                )))
            }
        }
    };

    let mut metadata = OpenPgpMetadata {
        recipient_key_ids: pkesks.iter().map(|p| p.key_id).collect(),
        ..Default::default()
    };

    let (session_key, key_id) = recover_session_key(keys, &pkesks)?;
    metadata.decryption_key_id = Some(key_id);
    metadata.symmetric_algorithm = Some(session_key.algorithm());

    let decryptor = AeadDecryptor::new(PacketBody::new(source, encrypted_length), &session_key)?;
    open_plaintext(decryptor, metadata)
}

/// Unwrap the session key with the first PKESK a local key can open
fn recover_session_key(
    keys: &Keys<'_>,
    pkesks: &[PkeskPacket],
) -> Result<(SessionKey, KeyId)> {
    let mut last_error = None;

    for pkesk in pkesks {
        let Some(secret) = keys.secret_keys.get_key(pkesk.key_id) else {
            continue;
        };
        let keypair = match keys.protector.unlock(secret) {
            Ok(unlocked) => match unlocked.into_encryption() {
                Some(pair) => pair,
                None => continue,
            },
            Err(e) => {
                warn!(key_id = %pkesk.key_id, "Could not unlock decryption key");
                last_error = Some(e);
                continue;
            }
        };

        match pkesk.decrypt(&keypair) {
            Ok(session_key) => {
                debug!(key_id = %pkesk.key_id, "Recovered session key");
                return Ok((session_key, pkesk.key_id));
            }
            Err(e) => {
                warn!(key_id = %pkesk.key_id, error = %e, "Session key unwrap failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(Error::NoDecryptionKey))
}

/// Open the compressed layer (if any), the one-pass signatures and the
/// literal data header
fn open_plaintext<R: Read>(
    mut decryptor: EncryptedBody<R>,
    mut metadata: OpenPgpMetadata,
) -> Result<Literal<R>> {
    let first = read_header(&mut decryptor)?
        .ok_or_else(|| Error::MalformedPacket("encrypted data is empty".into()))?;

    let (mut source, mut next) = if first.tag == Tag::CompressedData {
        let mut body = PacketBody::new(decryptor, first.length);
        let mut algorithm = [0u8; 1];
        body.read_exact(&mut algorithm)?;
        let mut source = match CompressionAlgorithm::from_id(algorithm[0])? {
            CompressionAlgorithm::Zlib => {
                metadata.compression_algorithm = Some(CompressionAlgorithm::Zlib);
                PlaintextSource::Compressed(Decompressor::new(body))
            }
            CompressionAlgorithm::Uncompressed => PlaintextSource::Stored(body),
        };
        let next = read_header(&mut source)?;
        (source, next)
    } else {
        (PlaintextSource::Direct(decryptor), Some(first))
    };

    let mut pending = Vec::new();
    loop {
        let header =
            next.ok_or_else(|| Error::MalformedPacket("message holds no literal data".into()))?;
        match header.tag {
            Tag::OnePassSignature => {
                let ops = OnePassSignature::parse(&read_body(&mut source, header.length)?)?;
                metadata.signer_key_ids.insert(ops.key_id);
                pending.push(PendingSignature {
                    hasher: ops.hash_algorithm.new_hasher(),
                    header: ops,
                });
            }
            Tag::Marker => {
                read_body(&mut source, header.length)?;
            }
            Tag::LiteralData => {
                let mut body = PacketBody::new(source, header.length);
                let literal = LiteralHeader::read_from(&mut body)?;
                debug!(
                    format = %char::from(literal.format),
                    one_pass_signatures = pending.len(),
                    "Opened literal data"
                );
                return Ok(Literal {
                    body,
                    pending,
                    metadata,
                });
            }
            other => {
                return Err(Error::MalformedPacket(format!(
                    "unexpected {:?} packet before literal data",
                    other
                )))
            }
        }
        next = read_header(&mut source)?;
    }
}

/// Read the trailing signatures and drain every layer
fn finish_literal<R: Read>(literal: Literal<R>) -> Result<Drained> {
    let Literal {
        body,
        mut pending,
        mut metadata,
    } = literal;
    let mut source = body.into_inner();

    let mut signatures = Vec::new();
    while let Some(header) = read_header(&mut source)? {
        match header.tag {
            Tag::Signature => {
                signatures.push(SignaturePacket::parse(&read_body(&mut source, header.length)?)?);
            }
            Tag::Marker => {
                read_body(&mut source, header.length)?;
            }
            other => {
                return Err(Error::MalformedPacket(format!(
                    "unexpected {:?} packet after literal data",
                    other
                )))
            }
        }
    }

    source.finish()?;
    metadata.integrity_protected = true;
    debug!("Encrypted data integrity verified");

    if signatures.len() != pending.len() {
        return Err(Error::MalformedPacket(format!(
            "{} one-pass signatures but {} signatures",
            pending.len(),
            signatures.len()
        )));
    }

    // Signatures come back in the reverse order of their one-pass headers.
    let mut paired = Vec::with_capacity(signatures.len());
    for signature in signatures {
        let Some(ops) = pending.pop() else {
            break;
        };
        if ops.header.key_id != signature.issuer
            || ops.header.hash_algorithm != signature.hash_algorithm
        {
            return Err(Error::MalformedPacket(format!(
                "signature by {} does not match one-pass signature by {}",
                signature.issuer, ops.header.key_id
            )));
        }
        paired.push((ops, signature));
    }

    Ok(Drained {
        signatures: paired,
        metadata,
    })
}

/// Check each signature against the supplied public keys
fn verify_signatures(keys: &Keys<'_>, drained: Drained) -> Result<OpenPgpMetadata> {
    let Drained {
        signatures,
        mut metadata,
    } = drained;

    for (pending, signature) in signatures {
        let key = keys
            .public_keys
            .and_then(|collection| collection.get_key(signature.issuer));

        let outcome = match key {
            Some(key) => {
                let valid = key.can_sign()
                    && key.created() <= signature.created
                    && signature.verify(pending.hasher, key).unwrap_or(false);
                if !valid {
                    warn!(key_id = %signature.issuer, "Signature did not verify");
                }
                SignatureOutcome {
                    key_id: signature.issuer,
                    fingerprint: Some(key.fingerprint().clone()),
                    hash_algorithm: signature.hash_algorithm,
                    created: signature.created,
                    status: if valid {
                        SignatureStatus::Verified
                    } else {
                        SignatureStatus::Failed
                    },
                }
            }
            None if keys.ignore_missing_public_keys => {
                debug!(key_id = %signature.issuer, "No public key for signer, skipping");
                SignatureOutcome {
                    key_id: signature.issuer,
                    fingerprint: None,
                    hash_algorithm: signature.hash_algorithm,
                    created: signature.created,
                    status: SignatureStatus::MissingKey,
                }
            }
            None => {
                warn!(key_id = %signature.issuer, "No public key for signer");
                return Err(Error::UnresolvedSigner(signature.issuer));
            }
        };
        metadata.signatures.push(outcome);
    }

    Ok(metadata)
}

// ============================================================================
// TESTS
// ============================================================================
