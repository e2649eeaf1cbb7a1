//! # Error Handling
//!
//! This module provides the error type shared by every Sigil operation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Identity Errors                                                   │
//! │  │   └── InvalidFormat         - Malformed fingerprint / key id        │
//! │  │                                                                      │
//! │  ├── Key Errors                                                        │
//! │  │   ├── InvalidKey            - Inconsistent or unusable key material │
//! │  │   ├── KeyUnlockFailed       - Protector could not unlock a key      │
//! │  │   └── KeyDerivationFailed   - HKDF / S2K failure                    │
//! │  │                                                                      │
//! │  ├── Encryption Errors                                                 │
//! │  │   ├── CryptoSetup           - No usable recipient / signing key     │
//! │  │   ├── Signing               - Signing key could not be unlocked     │
//! │  │   └── EncryptionFailed      - AEAD seal failure                     │
//! │  │                                                                      │
//! │  ├── Decryption Errors                                                 │
//! │  │   ├── NoDecryptionKey       - No local secret key matches           │
//! │  │   ├── UnresolvedSigner      - Signer public key not supplied        │
//! │  │   ├── IntegrityCheck        - Tampering or truncation detected      │
//! │  │   ├── MalformedPacket       - Packet structure is invalid           │
//! │  │   └── UnsupportedAlgorithm  - Unknown algorithm identifier          │
//! │  │                                                                      │
//! │  └── Stream Errors                                                     │
//! │      ├── ResultNotReady        - Metadata requested before close       │
//! │      ├── StreamClosed          - Write/read after close                │
//! │      └── Io                    - Underlying sink/source failure        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Errors Crossing `std::io`
//!
//! The pipelines implement [`std::io::Read`] and [`std::io::Write`], so
//! failures discovered mid-stream have to travel as [`std::io::Error`]. They
//! carry the typed [`Error`] as their inner error and convert back losslessly:
//!
//! ```text
//!  Error::IntegrityCheck ──into_io()──► io::Error(InvalidData, inner)
//!                                          │
//!  Error::IntegrityCheck ◄──From────────────┘
//! ```

use std::io;

use thiserror::Error;

use crate::fingerprint::KeyId;

/// Result type alias for Sigil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sigil
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Identity Errors (100-199)
    // ========================================================================

    /// Malformed fingerprint or key id string
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    // ========================================================================
    // Key Errors (200-299)
    // ========================================================================

    /// Key material is inconsistent or unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A protector could not unlock a secret key
    #[error("Failed to unlock secret key {0}")]
    KeyUnlockFailed(KeyId),

    /// Key derivation failed
    #[error("Failed to derive key: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Encryption Errors (300-399)
    // ========================================================================

    /// No usable recipient or signing key for the requested operation
    #[error("Cannot set up encryption: {0}")]
    CryptoSetup(String),

    /// The protector cannot unlock the requested signing key
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    // ========================================================================
    // Decryption Errors (400-499)
    // ========================================================================

    /// No provided secret key matches any recipient of the message
    #[error("No secret key matches any recipient of the message")]
    NoDecryptionKey,

    /// A signer's public key was not supplied
    #[error("No public key supplied for signer {0}")]
    UnresolvedSigner(KeyId),

    /// Ciphertext was altered or truncated
    #[error("Integrity check failed: {0}")]
    IntegrityCheck(String),

    /// Packet structure is invalid
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Algorithm identifier is unknown or not supported here
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    // ========================================================================
    // Stream Errors (500-599)
    // ========================================================================

    /// Result metadata requested before the stream was closed
    #[error("Result is not available until the stream is closed")]
    ResultNotReady,

    /// Stream was used after it was closed
    #[error("Stream is already closed")]
    StreamClosed,

    /// Underlying sink or source failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Identity
    /// - 200-299: Keys
    /// - 300-399: Encryption
    /// - 400-499: Decryption
    /// - 500-599: Streams
    pub fn code(&self) -> i32 {
        match self {
            // Identity (100-199)
            Error::InvalidFormat(_) => 100,

            // Keys (200-299)
            Error::InvalidKey(_) => 200,
            Error::KeyUnlockFailed(_) => 201,
            Error::KeyDerivationFailed(_) => 202,

            // Encryption (300-399)
            Error::CryptoSetup(_) => 300,
            Error::Signing(_) => 301,
            Error::EncryptionFailed(_) => 302,

            // Decryption (400-499)
            Error::NoDecryptionKey => 400,
            Error::UnresolvedSigner(_) => 401,
            Error::IntegrityCheck(_) => 402,
            Error::MalformedPacket(_) => 403,
            Error::UnsupportedAlgorithm(_) => 404,

            // Streams (500-599)
            Error::ResultNotReady => 500,
            Error::StreamClosed => 501,
            Error::Io(_) => 502,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave nothing half-processed: the caller can fix
    /// the input (or supply other keys) and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::KeyUnlockFailed(_)
                | Error::NoDecryptionKey
                | Error::ResultNotReady
        )
    }

    /// Wrap this error for transport through `std::io` traits
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            Error::Io(_) => io::ErrorKind::Other,
            Error::StreamClosed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, self)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.get_ref().map_or(false, |inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(typed) = inner.downcast::<Error>() {
                    return *typed;
                }
            }
            return Error::Io("unrecoverable wrapped error".into());
        }

        match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::MalformedPacket("unexpected end of input".into())
            }
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidFormat(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidFormat("x".into()).code(), 100);
        assert_eq!(Error::KeyUnlockFailed(KeyId::new(1)).code(), 201);
        assert_eq!(Error::CryptoSetup("x".into()).code(), 300);
        assert_eq!(Error::NoDecryptionKey.code(), 400);
        assert_eq!(Error::IntegrityCheck("x".into()).code(), 402);
        assert_eq!(Error::ResultNotReady.code(), 500);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::InvalidFormat("bad".into()).is_recoverable());
        assert!(Error::NoDecryptionKey.is_recoverable());
        assert!(!Error::IntegrityCheck("tag".into()).is_recoverable());
        assert!(!Error::UnresolvedSigner(KeyId::new(7)).is_recoverable());
    }

    #[test]
    fn test_io_round_trip_preserves_variant() {
        let original = Error::IntegrityCheck("final tag mismatch".into());
        let io_err = original.clone().into_io();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let recovered: Error = io_err.into();
        assert_eq!(recovered, original);
    }

    #[test]
    fn test_plain_io_errors_convert() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, Error::Io(_)));

        let eof: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(eof, Error::MalformedPacket(_)));
    }
}
