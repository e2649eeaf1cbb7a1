//! End-to-end tests: encrypt and sign with one ring, decrypt and verify
//! with another.

mod common;

use std::io::{Read, Write};
use std::thread;

use common::{
    decrypt_and_verify, encrypt_and_sign, init_tracing, sample_data, JULIET, ROMEO, TYBALT,
};
use sigil_core::{
    ring_contains_key_with_id, CompressionAlgorithm, DecryptionBuilder, EncryptionBuilder,
    Error, HashAlgorithm, KeyRingBuilder, PassphraseProtector, Policy, PublicKeyRingCollection,
    SecretKeyRingCollection,
    SignatureStatus, SymmetricKeyAlgorithm, UnprotectedKeysProtector,
};

const PROLOGUE: &[u8] = b"Two households, both alike in dignity,\n\
In fair Verona, where we lay our scene,\n\
From ancient grudge break to new mutiny,\n\
Where civil blood makes civil hands unclean.\n";

// ============================================================================
// ROUND TRIPS
// ============================================================================

#[test]
fn test_round_trip_reports_all_flags() {
    init_tracing();
    let (message, encryption) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);

    assert!(encryption.is_encrypted());
    assert!(encryption.is_signed());
    assert_eq!(encryption.symmetric_algorithm(), Some(SymmetricKeyAlgorithm::Aes256));
    for key_id in encryption.signer_key_ids() {
        assert!(ring_contains_key_with_id(&*ROMEO, *key_id));
    }
    for key_id in encryption.recipient_key_ids() {
        assert!(ring_contains_key_with_id(&*JULIET, *key_id));
    }

    let (plaintext, result) = decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap();
    assert_eq!(plaintext, PROLOGUE);
    assert!(result.is_encrypted());
    assert!(result.is_signed());
    assert!(result.is_verified());
    assert!(result.is_integrity_protected());
    assert!(result.contains_verified_signature_from(ROMEO.public_keys()));
    assert!(!result.contains_verified_signature_from(JULIET.public_keys()));
    assert_eq!(result.recipient_key_ids(), encryption.recipient_key_ids());
    assert_eq!(result.signer_key_ids(), encryption.signer_key_ids());
    assert_eq!(
        result.decryption_key_id(),
        Some(JULIET.public_keys().subkeys()[0].key_id())
    );
    assert_eq!(result.compression_algorithm(), Some(CompressionAlgorithm::Zlib));
}

#[test]
fn test_round_trip_across_policies() {
    init_tracing();
    let data = sample_data(150_000);

    for symmetric in [SymmetricKeyAlgorithm::Aes128, SymmetricKeyAlgorithm::Aes256] {
        for hash in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            for compression in [CompressionAlgorithm::Zlib, CompressionAlgorithm::Uncompressed] {
                let policy = Policy::default()
                    .with_symmetric_key_algorithm(symmetric)
                    .with_hash_algorithm(hash)
                    .with_compression_algorithm(compression)
                    .with_aead_chunk_size(0);

                let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, policy, &data);
                let (plaintext, result) =
                    decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap();

                assert_eq!(plaintext, data, "{:?}/{:?}/{:?}", symmetric, hash, compression);
                assert_eq!(result.symmetric_algorithm(), Some(symmetric));
                assert_eq!(result.signatures()[0].hash_algorithm, hash);
                assert!(result.is_verified());
            }
        }
    }
}

#[test]
fn test_empty_plaintext() {
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), b"");
    let (plaintext, result) = decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap();
    assert!(plaintext.is_empty());
    assert!(result.is_verified());
}

#[test]
fn test_multiple_recipients_and_signers() {
    init_tracing();
    let mut stream = EncryptionBuilder::new(Vec::new())
        .add_recipient(JULIET.public_keys())
        .add_recipient(TYBALT.public_keys())
        .sign_with(&UnprotectedKeysProtector, ROMEO.secret_keys())
        .sign_with(&UnprotectedKeysProtector, TYBALT.secret_keys())
        .using_secure_algorithms()
        .build()
        .unwrap();
    stream.write_all(PROLOGUE).unwrap();
    stream.close().unwrap();
    assert_eq!(stream.result().unwrap().recipient_key_ids().len(), 2);
    let message = stream.into_inner().unwrap();

    for recipient in [&*JULIET, &*TYBALT] {
        let (plaintext, result) =
            decrypt_and_verify(&message, recipient, &[&ROMEO, &TYBALT], false).unwrap();
        assert_eq!(plaintext, PROLOGUE);
        assert_eq!(result.signatures().len(), 2);
        assert!(result.contains_verified_signature_from(ROMEO.public_keys()));
        assert!(result.contains_verified_signature_from(TYBALT.public_keys()));
    }

    assert!(matches!(
        decrypt_and_verify(&message, &ROMEO, &[&ROMEO], false),
        Err(Error::NoDecryptionKey)
    ));
}

#[test]
fn test_small_reads() {
    let data = sample_data(70_000);
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), &data);

    let secrets = SecretKeyRingCollection::from(JULIET.secret_keys().clone());
    let publics = PublicKeyRingCollection::from(ROMEO.public_keys().clone());
    let mut stream = DecryptionBuilder::new(message.as_slice())
        .decrypt_with(&UnprotectedKeysProtector, &secrets)
        .verify_with(&publics)
        .build()
        .unwrap();

    let mut plaintext = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        plaintext.extend_from_slice(&buf[..n]);
    }
    stream.close().unwrap();
    assert_eq!(plaintext, data);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_wrong_recipient() {
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);
    let result = decrypt_and_verify(&message, &TYBALT, &[&ROMEO], false);
    assert!(matches!(result, Err(Error::NoDecryptionKey)));
}

#[test]
fn test_missing_signer_key() {
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);

    let strict = decrypt_and_verify(&message, &JULIET, &[&TYBALT], false);
    assert_eq!(strict.unwrap_err(), Error::UnresolvedSigner(ROMEO.key_id()));

    let (plaintext, result) = decrypt_and_verify(&message, &JULIET, &[&TYBALT], true).unwrap();
    assert_eq!(plaintext, PROLOGUE);
    assert!(result.is_signed());
    assert!(!result.is_verified());
    assert_eq!(result.signatures()[0].status, SignatureStatus::MissingKey);
}

/// Errors a tampered message may produce
fn is_tamper_error(error: &Error) -> bool {
    matches!(
        error,
        Error::MalformedPacket(_)
            | Error::UnsupportedAlgorithm(_)
            | Error::IntegrityCheck(_)
            | Error::NoDecryptionKey
    )
}

#[test]
fn test_every_flipped_byte_is_detected() {
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);

    for index in 0..message.len() {
        let mut tampered = message.clone();
        tampered[index] ^= 0x01;
        match decrypt_and_verify(&tampered, &JULIET, &[&ROMEO], false) {
            Ok((plaintext, result)) => panic!(
                "byte {} flipped but decryption succeeded ({} bytes, verified: {})",
                index,
                plaintext.len(),
                result.is_verified()
            ),
            Err(error) => assert!(is_tamper_error(&error), "byte {}: {:?}", index, error),
        }
    }
}

#[test]
fn test_flipped_key_id_finds_no_key() {
    let (mut message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);
    // [tag] [len] [version] [key id ...]
    message[3] ^= 0x01;
    assert!(matches!(
        decrypt_and_verify(&message, &JULIET, &[&ROMEO], false),
        Err(Error::NoDecryptionKey)
    ));
}

#[test]
fn test_trailing_bytes_rejected() {
    let (mut message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), b"hello");
    message.extend_from_slice(b"\xff\xff garbage after the message");

    let error = decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap_err();
    assert!(matches!(error, Error::MalformedPacket(_)), "{:?}", error);
}

#[test]
fn test_appended_message_rejected() {
    let (mut message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), b"hello");
    let (second, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), b"again");
    message.extend_from_slice(&second);

    let error = decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap_err();
    assert!(matches!(error, Error::MalformedPacket(_)), "{:?}", error);
}

#[test]
fn test_sample_data_spans_several_chunks() {
    let data = sample_data(150_000);
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), &data);
    // Compression cannot shrink it, so the default 64 KiB chunks are exceeded.
    assert!(message.len() > data.len());
    assert!(message.len() > 2 * 65_536);
}

#[test]
fn test_tampered_chunk_is_integrity_failure() {
    let data = sample_data(150_000);
    let policy = Policy::default().with_compression_algorithm(CompressionAlgorithm::Uncompressed);
    let (mut message, _) = encrypt_and_sign(&ROMEO, &JULIET, policy, &data);

    let middle = message.len() / 2;
    message[middle] ^= 0x80;
    let error = decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap_err();
    assert!(matches!(error, Error::IntegrityCheck(_)), "{:?}", error);
}

#[test]
fn test_truncated_message_is_integrity_failure() {
    let data = sample_data(150_000);
    let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), &data);
    let len = message.len();

    for cut in [1, 16, 17, 100, len / 4, len / 2] {
        let truncated = &message[..len - cut];
        let error = decrypt_and_verify(truncated, &JULIET, &[&ROMEO], false).unwrap_err();
        assert!(matches!(error, Error::IntegrityCheck(_)), "cut {}: {:?}", cut, error);
    }
}

#[test]
fn test_integrity_failure_not_suppressed_by_ignore_missing() {
    let (mut message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), PROLOGUE);
    let last = message.len() - 1;
    message[last] ^= 0xFF;
    let error = decrypt_and_verify(&message, &JULIET, &[], true).unwrap_err();
    assert!(matches!(error, Error::IntegrityCheck(_)));
}

// ============================================================================
// PROTECTED KEYS
// ============================================================================

#[test]
fn test_passphrase_protected_rings() {
    init_tracing();
    let mercutio = KeyRingBuilder::new("Mercutio <mercutio@example.com>")
        .with_passphrase("queen mab")
        .with_s2k_count(0)
        .build()
        .unwrap();
    let protector = PassphraseProtector::new("queen mab");

    let mut stream = EncryptionBuilder::new(Vec::new())
        .add_recipient(mercutio.public_keys())
        .sign_with(&protector, mercutio.secret_keys())
        .using_secure_algorithms()
        .build()
        .unwrap();
    stream.write_all(PROLOGUE).unwrap();
    stream.close().unwrap();
    let message = stream.into_inner().unwrap();

    let secrets = SecretKeyRingCollection::from(mercutio.secret_keys().clone());
    let publics = PublicKeyRingCollection::from(mercutio.public_keys().clone());

    let mut unlocked = DecryptionBuilder::new(message.as_slice())
        .decrypt_with(&protector, &secrets)
        .verify_with(&publics)
        .build()
        .unwrap();
    let mut plaintext = Vec::new();
    unlocked.read_to_end(&mut plaintext).unwrap();
    unlocked.close().unwrap();
    assert_eq!(plaintext, PROLOGUE);
    assert!(unlocked.result().unwrap().is_verified());

    let wrong = PassphraseProtector::new("tybalt");
    let mut locked = DecryptionBuilder::new(message.as_slice())
        .decrypt_with(&wrong, &secrets)
        .verify_with(&publics)
        .build()
        .unwrap();
    assert!(matches!(locked.close(), Err(Error::KeyUnlockFailed(_))));
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_pipelines_share_rings() {
    init_tracing();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let data = sample_data(10_000 + i * 1_000);
                let (message, _) = encrypt_and_sign(&ROMEO, &JULIET, Policy::default(), &data);
                let (plaintext, result) =
                    decrypt_and_verify(&message, &JULIET, &[&ROMEO], false).unwrap();
                assert_eq!(plaintext, data);
                assert!(result.is_verified());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
