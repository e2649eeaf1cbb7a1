//! Public-key encrypted session key packets (tag 1, version 3, X25519).
//!
//! ```text
//! ┌──────┬──────────┬─────┬────────────────┬─────┬─────┬──────────────────┐
//! │ 0x03 │ key id 8 │ 25  │ ephemeral 32   │ len │ sym │ wrapped key + tag│
//! └──────┴──────────┴─────┴────────────────┴─────┴─────┴──────────────────┘
//! ```
//!
//! The session key is sealed with AES-256-GCM under a key-encryption key
//! derived from a fresh ephemeral X25519 exchange with the recipient subkey.

use tracing::debug;

use super::Cursor;
use crate::algorithm::{PublicKeyAlgorithm, SymmetricKeyAlgorithm};
use crate::crypto::{
    derive_key_encryption_key, AeadCipher, EncryptionKeyPair, SessionKey, NONCE_SIZE,
};
use crate::error::{Error, Result};
use crate::fingerprint::KeyId;
use crate::key::PublicKey;

const VERSION: u8 = 3;

// A fresh key-encryption key per packet makes the fixed nonce safe.
const WRAP_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

/// A session key wrapped for one recipient subkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkeskPacket {
    /// Key id of the recipient subkey
    pub key_id: KeyId,
    /// Sender's ephemeral X25519 public key
    pub ephemeral: [u8; 32],
    /// Cipher the session key belongs to
    pub symmetric_algorithm: SymmetricKeyAlgorithm,
    /// Sealed session key
    pub wrapped_key: Vec<u8>,
}

impl PkeskPacket {
    /// Wrap `session_key` for an X25519 recipient subkey
    pub fn encrypt(session_key: &SessionKey, recipient: &PublicKey) -> Result<Self> {
        if recipient.algorithm() != PublicKeyAlgorithm::X25519 {
            return Err(Error::CryptoSetup(format!(
                "key {} cannot receive session keys",
                recipient.key_id()
            )));
        }

        let ephemeral = EncryptionKeyPair::generate();
        let ephemeral_public = ephemeral.public_bytes();
        let shared = ephemeral.diffie_hellman(recipient.material())?;
        let kek = derive_key_encryption_key(&ephemeral_public, recipient.material(), &shared)?;

        let algorithm = session_key.algorithm();
        let cipher = AeadCipher::new(SymmetricKeyAlgorithm::Aes256, &kek[..])?;
        let wrapped_key = cipher.seal(&WRAP_NONCE, session_key.as_bytes(), &[algorithm.id()])?;

        debug!(recipient = %recipient.key_id(), "Wrapped session key");

        Ok(Self {
            key_id: recipient.key_id(),
            ephemeral: ephemeral_public,
            symmetric_algorithm: algorithm,
            wrapped_key,
        })
    }

    /// Recover the session key with the recipient's unlocked subkey
    pub fn decrypt(&self, keypair: &EncryptionKeyPair) -> Result<SessionKey> {
        let recipient_public = keypair.public_bytes();
        let shared = keypair.diffie_hellman(&self.ephemeral)?;
        let kek = derive_key_encryption_key(&self.ephemeral, &recipient_public, &shared)?;

        let cipher = AeadCipher::new(SymmetricKeyAlgorithm::Aes256, &kek[..])?;
        let unwrapped = zeroize::Zeroizing::new(
            cipher
                .open(&WRAP_NONCE, &self.wrapped_key, &[self.symmetric_algorithm.id()])
                .map_err(|_| Error::IntegrityCheck("session key unwrap failed".into()))?,
        );

        SessionKey::from_bytes(self.symmetric_algorithm, &unwrapped)
    }

    /// Serialize the packet body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(44 + self.wrapped_key.len());
        out.push(VERSION);
        out.extend_from_slice(&self.key_id.to_bytes());
        out.push(PublicKeyAlgorithm::X25519.id());
        out.extend_from_slice(&self.ephemeral);
        out.push((1 + self.wrapped_key.len()) as u8);
        out.push(self.symmetric_algorithm.id());
        out.extend_from_slice(&self.wrapped_key);
        out
    }

    /// Parse a packet body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body, "session key");

        let version = cursor.u8()?;
        if version != VERSION {
            return Err(Error::MalformedPacket(format!(
                "session key packet version {}",
                version
            )));
        }
        let key_id = KeyId::from_bytes(cursor.array()?);
        let algorithm = PublicKeyAlgorithm::from_id(cursor.u8()?)?;
        if algorithm != PublicKeyAlgorithm::X25519 {
            return Err(Error::UnsupportedAlgorithm(format!(
                "{:?} session key encryption",
                algorithm
            )));
        }
        let ephemeral = cursor.array()?;

        let len = cursor.u8()? as usize;
        if len < 2 {
            return Err(Error::MalformedPacket("empty wrapped session key".into()));
        }
        let symmetric_algorithm = SymmetricKeyAlgorithm::from_id(cursor.u8()?)?;
        let wrapped_key = cursor.bytes(len - 1)?.to_vec();
        cursor.expect_end()?;

        Ok(Self {
            key_id,
            ephemeral,
            symmetric_algorithm,
            wrapped_key,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeyFlags;

    fn recipient() -> (EncryptionKeyPair, PublicKey) {
        let keypair = EncryptionKeyPair::from_bytes(&[11u8; 32]);
        let public = PublicKey::new(
            PublicKeyAlgorithm::X25519,
            keypair.public_bytes(),
            1_700_000_000,
            KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE,
        );
        (keypair, public)
    }

    #[test]
    fn test_wrap_unwrap() {
        let (keypair, public) = recipient();
        let session_key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);

        let packet = PkeskPacket::encrypt(&session_key, &public).unwrap();
        assert_eq!(packet.key_id, public.key_id());

        let parsed = PkeskPacket::parse(&packet.to_bytes()).unwrap();
        assert_eq!(parsed, packet);

        let recovered = parsed.decrypt(&keypair).unwrap();
        assert_eq!(recovered.as_bytes(), session_key.as_bytes());
        assert_eq!(recovered.algorithm(), SymmetricKeyAlgorithm::Aes256);
    }

    #[test]
    fn test_wrong_recipient_cannot_unwrap() {
        let (_, public) = recipient();
        let session_key = SessionKey::generate(SymmetricKeyAlgorithm::Aes128);
        let packet = PkeskPacket::encrypt(&session_key, &public).unwrap();

        let stranger = EncryptionKeyPair::from_bytes(&[12u8; 32]);
        assert!(matches!(
            packet.decrypt(&stranger),
            Err(Error::IntegrityCheck(_))
        ));
    }

    #[test]
    fn test_algorithm_byte_is_authenticated() {
        let (keypair, public) = recipient();
        let session_key = SessionKey::generate(SymmetricKeyAlgorithm::Aes128);
        let mut packet = PkeskPacket::encrypt(&session_key, &public).unwrap();

        packet.symmetric_algorithm = SymmetricKeyAlgorithm::Aes256;
        assert!(packet.decrypt(&keypair).is_err());
    }

    #[test]
    fn test_parse_rejects_truncation() {
        let (_, public) = recipient();
        let session_key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        let bytes = PkeskPacket::encrypt(&session_key, &public).unwrap().to_bytes();

        assert!(PkeskPacket::parse(&bytes[..bytes.len() - 1]).is_err());
        assert!(PkeskPacket::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn test_signing_key_is_rejected() {
        let public = PublicKey::new(
            PublicKeyAlgorithm::Ed25519,
            [1u8; 32],
            0,
            KeyFlags::SIGN_DATA,
        );
        let session_key = SessionKey::generate(SymmetricKeyAlgorithm::Aes256);
        assert!(matches!(
            PkeskPacket::encrypt(&session_key, &public),
            Err(Error::CryptoSetup(_))
        ));
    }
}
