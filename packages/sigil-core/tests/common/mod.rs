//! Shared fixtures for the integration tests.
//!
//! Key rings are derived from fixed seeds so failures reproduce; they are
//! built once per test binary.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::Once;

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use sigil_core::{
    DecryptionBuilder, EncryptionBuilder, KeyFlags, KeyRing, OpenPgpMetadata, Policy,
    PublicKeyRingCollection, Result, SecretKey, SecretKeyRing, SecretKeyRingCollection,
    UnprotectedKeysProtector,
};

/// Creation time of every fixture key
pub const CREATED: u32 = 1_600_000_000;

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per process (`RUST_LOG` controls output)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn fixture_ring(user_id: &str, seed: u8) -> KeyRing {
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
    KeyRing::from_secret(SecretKeyRing::new(
        primary,
        vec![user_id.to_string()],
        vec![subkey],
    ))
}

pub static ROMEO: Lazy<KeyRing> = Lazy::new(|| fixture_ring("Romeo <romeo@example.com>", 0x21));

pub static JULIET: Lazy<KeyRing> = Lazy::new(|| fixture_ring("Juliet <juliet@example.com>", 0x42));

pub static TYBALT: Lazy<KeyRing> = Lazy::new(|| fixture_ring("Tybalt <tybalt@example.com>", 0x63));

/// Encrypt `plaintext` to `recipient`, signed by `sender`, writing in
/// uneven pieces
pub fn encrypt_and_sign(
    sender: &KeyRing,
    recipient: &KeyRing,
    policy: Policy,
    plaintext: &[u8],
) -> (Vec<u8>, OpenPgpMetadata) {
    let mut stream = EncryptionBuilder::new(Vec::new())
        .add_recipient(recipient.public_keys())
        .sign_with(&UnprotectedKeysProtector, sender.secret_keys())
        .using_policy(policy)
        .build()
        .expect("build encryption stream");
    for piece in plaintext.chunks(4099) {
        stream.write_all(piece).expect("write plaintext");
    }
    stream.close().expect("close encryption stream");
    let metadata = stream.result().expect("encryption result").clone();
    (stream.into_inner().expect("closed stream sink"), metadata)
}

/// Decrypt with `recipient`'s secret keys, verifying against `signers`
pub fn decrypt_and_verify(
    message: &[u8],
    recipient: &KeyRing,
    signers: &[&KeyRing],
    ignore_missing_public_keys: bool,
) -> Result<(Vec<u8>, OpenPgpMetadata)> {
    let secrets = SecretKeyRingCollection::from(recipient.secret_keys().clone());
    let publics: PublicKeyRingCollection = signers
        .iter()
        .map(|ring| ring.public_keys().clone())
        .collect();

    let mut builder = DecryptionBuilder::new(message)
        .decrypt_with(&UnprotectedKeysProtector, &secrets)
        .verify_with(&publics);
    if ignore_missing_public_keys {
        builder = builder.ignore_missing_public_keys();
    }
    let mut stream = builder.build()?;

    let mut plaintext = Vec::new();
    stream.read_to_end(&mut plaintext)?;
    stream.close()?;
    let metadata = stream.result()?.clone();
    Ok((plaintext, metadata))
}

/// Deterministic, incompressible test data (a SHA-256 counter stream)
pub fn sample_data(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter = 0u64;
    while out.len() < len {
        out.extend_from_slice(&Sha256::digest(counter.to_be_bytes()));
        counter += 1;
    }
    out.truncate(len);
    out
}
