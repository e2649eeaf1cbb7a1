//! Literal data packets (tag 11).
//!
//! ```text
//! [format 'b'] [name len] [file name] [date u32] [data ...]
//! ```
//!
//! Sigil writes binary literals with an empty file name and a zero date;
//! the signature's creation time carries the timestamp instead.

use std::io::{self, Read, Write};

use super::{PartialBodyWriter, Tag};
use crate::error::{Error, Result};

/// Binary data format
pub const FORMAT_BINARY: u8 = b'b';

/// Header fields that precede the literal data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralHeader {
    /// Data format octet (`b`, `t`, `u`)
    pub format: u8,
    /// File name hint
    pub file_name: Vec<u8>,
    /// Modification date hint
    pub date: u32,
}

impl LiteralHeader {
    /// Header for anonymous binary data
    pub fn binary() -> Self {
        Self {
            format: FORMAT_BINARY,
            file_name: Vec::new(),
            date: 0,
        }
    }

    /// Open a literal packet on `out` and write this header into it
    pub fn start<W: Write>(&self, out: W) -> io::Result<PartialBodyWriter<W>> {
        let name_len = u8::try_from(self.file_name.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "literal file name too long")
        })?;

        let mut writer = PartialBodyWriter::start(out, Tag::LiteralData)?;
        writer.write_all(&[self.format, name_len])?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.date.to_be_bytes())?;
        Ok(writer)
    }

    /// Read the header from the start of a literal packet body
    pub fn read_from<R: Read>(body: &mut R) -> Result<Self> {
        let mut fixed = [0u8; 2];
        body.read_exact(&mut fixed)?;
        let format = fixed[0];
        if !matches!(format, b'b' | b't' | b'u' | b'm') {
            return Err(Error::MalformedPacket(format!(
                "unknown literal data format 0x{:02X}",
                format
            )));
        }

        let mut file_name = vec![0u8; fixed[1] as usize];
        body.read_exact(&mut file_name)?;
        let mut date = [0u8; 4];
        body.read_exact(&mut date)?;

        Ok(Self {
            format,
            file_name,
            date: u32::from_be_bytes(date),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{read_header, PacketBody};

    #[test]
    fn test_header_round_trip() {
        let header = LiteralHeader {
            format: b't',
            file_name: b"letter.txt".to_vec(),
            date: 1_700_000_000,
        };
        let mut writer = header.start(Vec::new()).unwrap();
        writer.write_all(b"Wherefore art thou").unwrap();
        let packet = writer.finish().unwrap();

        let mut input = packet.as_slice();
        let packet_header = read_header(&mut input).unwrap().unwrap();
        assert_eq!(packet_header.tag, Tag::LiteralData);

        let mut body = PacketBody::new(input, packet_header.length);
        assert_eq!(LiteralHeader::read_from(&mut body).unwrap(), header);

        let mut data = Vec::new();
        body.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"Wherefore art thou");
    }

    #[test]
    fn test_truncated_header() {
        let data = [b'b', 5, b'a'];
        assert!(LiteralHeader::read_from(&mut &data[..]).is_err());
    }

    #[test]
    fn test_unknown_format() {
        let data = [b'x', 0, 0, 0, 0, 0];
        assert!(matches!(
            LiteralHeader::read_from(&mut &data[..]),
            Err(Error::MalformedPacket(_))
        ));
    }
}
