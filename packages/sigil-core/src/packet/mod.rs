//! # Packet Layer
//!
//! OpenPGP framing: every message is a sequence of packets, each with a tag
//! and a body length.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          PACKET HEADER                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  New format (written):   [11tttttt] [length]                            │
//! │  Old format (read only): [10ttttll] [1, 2 or 4 length bytes | none]     │
//! │                                                                         │
//! │  New format length:                                                     │
//! │    0..=191          one octet                                           │
//! │    192..=8383       two octets  ((a - 192) << 8) + b + 192              │
//! │    0xFF + u32be     five octets                                         │
//! │    224..=254        partial: 2^(a & 0x1F) bytes, more parts follow      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Streamed packets (literal, compressed, encrypted data) use partial body
//! lengths so nothing has to be buffered whole. Small packets (session keys,
//! signatures, keys) are read into memory, capped at [`MAX_PACKET_SIZE`].

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub mod body;
pub mod compressed;
pub mod literal;
pub mod one_pass;
pub mod pkesk;
pub mod seipd;
pub mod signature;

pub use body::{PacketBody, PartialBodyWriter, PARTIAL_CHUNK_POWER};

/// Largest packet read fully into memory (1 MiB)
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

// ============================================================================
// TAGS
// ============================================================================

/// Packet types this crate reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Public-key encrypted session key
    PublicKeyEncryptedSessionKey,
    /// Signature
    Signature,
    /// One-pass signature
    OnePassSignature,
    /// Secret primary key
    SecretKey,
    /// Public primary key
    PublicKey,
    /// Secret subkey
    SecretSubkey,
    /// Compressed data
    CompressedData,
    /// Marker, ignored on input
    Marker,
    /// Literal data
    LiteralData,
    /// User id
    UserId,
    /// Public subkey
    PublicSubkey,
    /// Symmetrically encrypted integrity protected data
    SymEncryptedProtectedData,
}

impl Tag {
    /// Numeric packet tag
    pub fn id(self) -> u8 {
        match self {
            Tag::PublicKeyEncryptedSessionKey => 1,
            Tag::Signature => 2,
            Tag::OnePassSignature => 4,
            Tag::SecretKey => 5,
            Tag::PublicKey => 6,
            Tag::SecretSubkey => 7,
            Tag::CompressedData => 8,
            Tag::Marker => 10,
            Tag::LiteralData => 11,
            Tag::UserId => 13,
            Tag::PublicSubkey => 14,
            Tag::SymEncryptedProtectedData => 18,
        }
    }

    /// Parse a numeric packet tag
    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            1 => Tag::PublicKeyEncryptedSessionKey,
            2 => Tag::Signature,
            4 => Tag::OnePassSignature,
            5 => Tag::SecretKey,
            6 => Tag::PublicKey,
            7 => Tag::SecretSubkey,
            8 => Tag::CompressedData,
            10 => Tag::Marker,
            11 => Tag::LiteralData,
            13 => Tag::UserId,
            14 => Tag::PublicSubkey,
            18 => Tag::SymEncryptedProtectedData,
            other => {
                return Err(Error::MalformedPacket(format!("unsupported packet tag {}", other)))
            }
        })
    }
}

// ============================================================================
// LENGTHS
// ============================================================================

/// How a packet body is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// Exactly this many bytes
    Definite(usize),
    /// This many bytes, then another length header
    Partial(usize),
    /// Until the end of the input (old format only)
    Indeterminate,
}

/// A parsed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type
    pub tag: Tag,
    /// Length of the first body part
    pub length: BodyLength,
}

/// Write a new-format definite length
pub fn write_length<W: Write>(out: &mut W, len: usize) -> io::Result<()> {
    if len < 192 {
        out.write_all(&[len as u8])
    } else if len < 8384 {
        let adjusted = len - 192;
        out.write_all(&[((adjusted >> 8) + 192) as u8, (adjusted & 0xFF) as u8])
    } else {
        let len = u32::try_from(len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet body exceeds 4 GiB")
        })?;
        out.write_all(&[0xFF])?;
        out.write_all(&len.to_be_bytes())
    }
}

/// Write a new-format packet header with a definite length
pub fn write_header<W: Write>(out: &mut W, tag: Tag, len: usize) -> io::Result<()> {
    out.write_all(&[0xC0 | tag.id()])?;
    write_length(out, len)
}

/// Write a complete packet
pub fn write_packet<W: Write>(out: &mut W, tag: Tag, body: &[u8]) -> io::Result<()> {
    write_header(out, tag, body.len())?;
    out.write_all(body)
}

/// Read one byte, returning `None` at a clean end of input
fn read_optional_byte<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Read a new-format length (also used between partial body parts)
pub fn read_new_length<R: Read>(input: &mut R) -> io::Result<BodyLength> {
    let first = read_u8(input)?;
    Ok(match first {
        0..=191 => BodyLength::Definite(first as usize),
        192..=223 => {
            let second = read_u8(input)?;
            BodyLength::Definite((((first as usize) - 192) << 8) + second as usize + 192)
        }
        224..=254 => BodyLength::Partial(1usize << (first & 0x1F)),
        255 => {
            let mut len = [0u8; 4];
            input.read_exact(&mut len)?;
            BodyLength::Definite(u32::from_be_bytes(len) as usize)
        }
    })
}

/// Read a packet header, returning `None` at a clean end of input
pub fn read_header<R: Read>(input: &mut R) -> Result<Option<PacketHeader>> {
    let Some(first) = read_optional_byte(input)? else {
        return Ok(None);
    };

    if first & 0x80 == 0 {
        return Err(Error::MalformedPacket(format!(
            "invalid packet header octet 0x{:02X}",
            first
        )));
    }

    let header = if first & 0x40 != 0 {
        PacketHeader {
            tag: Tag::from_id(first & 0x3F)?,
            length: read_new_length(input)?,
        }
    } else {
        let tag = Tag::from_id((first >> 2) & 0x0F)?;
        let length = match first & 0x03 {
            0 => BodyLength::Definite(read_u8(input)? as usize),
            1 => {
                let mut len = [0u8; 2];
                input.read_exact(&mut len)?;
                BodyLength::Definite(u16::from_be_bytes(len) as usize)
            }
            2 => {
                let mut len = [0u8; 4];
                input.read_exact(&mut len)?;
                BodyLength::Definite(u32::from_be_bytes(len) as usize)
            }
            _ => BodyLength::Indeterminate,
        };
        PacketHeader { tag, length }
    };

    Ok(Some(header))
}

/// Read a whole (small) packet body into memory
pub fn read_body<R: Read>(input: &mut R, length: BodyLength) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut limited = PacketBody::new(input, length).take(MAX_PACKET_SIZE as u64 + 1);
    limited.read_to_end(&mut body)?;
    if body.len() > MAX_PACKET_SIZE {
        return Err(Error::MalformedPacket(format!(
            "packet exceeds {} bytes",
            MAX_PACKET_SIZE
        )));
    }
    Ok(body)
}

/// Read the next packet, skipping marker packets
pub fn read_packet<R: Read>(input: &mut R) -> Result<Option<(Tag, Vec<u8>)>> {
    loop {
        let Some(header) = read_header(input)? else {
            return Ok(None);
        };
        let body = read_body(input, header.length)?;
        if header.tag != Tag::Marker {
            return Ok(Some((header.tag, body)));
        }
    }
}

// ============================================================================
// BODY CURSOR
// ============================================================================

/// Bounds-checked cursor over an in-memory packet body
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    what: &'static str,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, what }
    }

    fn truncated(&self) -> Error {
        Error::MalformedPacket(format!("truncated {} packet", self.what))
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let (&first, rest) = self.data.split_first().ok_or_else(|| self.truncated())?;
        self.data = rest;
        Ok(first)
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(self.truncated());
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(Error::MalformedPacket(format!(
                "{} trailing bytes after {} packet",
                self.data.len(),
                self.what
            )))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_length(len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        write_length(&mut out, len).unwrap();
        out
    }

    #[test]
    fn test_length_encodings() {
        assert_eq!(encoded_length(0), vec![0]);
        assert_eq!(encoded_length(191), vec![191]);
        assert_eq!(encoded_length(192), vec![192, 0]);
        assert_eq!(encoded_length(8383), vec![223, 255]);
        assert_eq!(encoded_length(8384), vec![255, 0, 0, 0x20, 0xC0]);
    }

    #[test]
    fn test_length_boundaries_parse_back() {
        for len in [0usize, 1, 191, 192, 1000, 8383, 8384, 100_000] {
            let encoded = encoded_length(len);
            let parsed = read_new_length(&mut encoded.as_slice()).unwrap();
            assert_eq!(parsed, BodyLength::Definite(len));
        }
    }

    #[test]
    fn test_partial_length_octet() {
        let parsed = read_new_length(&mut [224 + 13u8].as_slice()).unwrap();
        assert_eq!(parsed, BodyLength::Partial(8192));
    }

    #[test]
    fn test_packet_round_trip() {
        let mut out = Vec::new();
        write_packet(&mut out, Tag::UserId, b"romeo@example.com").unwrap();
        assert_eq!(out[0], 0xC0 | 13);

        let mut input = out.as_slice();
        let (tag, body) = read_packet(&mut input).unwrap().unwrap();
        assert_eq!(tag, Tag::UserId);
        assert_eq!(body, b"romeo@example.com");
        assert!(read_packet(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_old_format_header() {
        // Old format, tag 11, one-octet length
        let data = [0x80 | (11 << 2), 3, b'a', b'b', b'c'];
        let mut input = &data[..];
        let header = read_header(&mut input).unwrap().unwrap();
        assert_eq!(header.tag, Tag::LiteralData);
        assert_eq!(header.length, BodyLength::Definite(3));
    }

    #[test]
    fn test_marker_packets_are_skipped() {
        let mut out = Vec::new();
        write_packet(&mut out, Tag::Marker, b"PGP").unwrap();
        write_packet(&mut out, Tag::UserId, b"juliet").unwrap();

        let (tag, _) = read_packet(&mut out.as_slice()).unwrap().unwrap();
        assert_eq!(tag, Tag::UserId);
    }

    #[test]
    fn test_invalid_header_octet() {
        let data = [0x01u8, 0x00];
        assert!(matches!(
            read_header(&mut &data[..]),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_truncated_body() {
        let data = [0xC0 | 13, 10, b'x'];
        assert!(read_packet(&mut &data[..]).is_err());
    }

    #[test]
    fn test_cursor_bounds() {
        let data = [1u8, 0, 2, 0, 0, 0, 3];
        let mut cursor = Cursor::new(&data, "test");
        assert_eq!(cursor.u8().unwrap(), 1);
        assert_eq!(cursor.u16().unwrap(), 2);
        assert_eq!(cursor.u32().unwrap(), 3);
        assert!(cursor.expect_end().is_ok());
        assert!(cursor.u8().is_err());
    }
}
