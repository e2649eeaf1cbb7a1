//! Streaming packet bodies.
//!
//! [`PartialBodyWriter`] frames an open-ended body with partial lengths;
//! [`PacketBody`] reads one back, following part headers transparently.
//!
//! ```text
//! [tag] [0xED] 8192 bytes [0xED] 8192 bytes ... [definite len] last bytes
//! ```

use std::io::{self, Read, Write};

use super::{read_new_length, write_length, BodyLength, Tag};

/// Partial chunks hold `2^13 = 8192` bytes
pub const PARTIAL_CHUNK_POWER: u8 = 13;

const PARTIAL_CHUNK: usize = 1 << PARTIAL_CHUNK_POWER;

/// Writes one packet whose length is not known in advance
pub struct PartialBodyWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> PartialBodyWriter<W> {
    /// Write the packet tag and start the body
    pub fn start(mut inner: W, tag: Tag) -> io::Result<Self> {
        inner.write_all(&[0xC0 | tag.id()])?;
        Ok(Self {
            inner,
            buffer: Vec::with_capacity(PARTIAL_CHUNK),
        })
    }

    fn emit_full_parts(&mut self) -> io::Result<()> {
        let mut offset = 0;
        while self.buffer.len() - offset >= PARTIAL_CHUNK {
            self.inner.write_all(&[224 + PARTIAL_CHUNK_POWER])?;
            self.inner
                .write_all(&self.buffer[offset..offset + PARTIAL_CHUNK])?;
            offset += PARTIAL_CHUNK;
        }
        self.buffer.drain(..offset);
        Ok(())
    }

    /// Write the final definite-length part and hand back the sink
    pub fn finish(mut self) -> io::Result<W> {
        self.emit_full_parts()?;
        write_length(&mut self.inner, self.buffer.len())?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(self.inner)
    }

    /// The sink underneath
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for PartialBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= PARTIAL_CHUNK {
            self.emit_full_parts()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads one packet body, following partial length headers
pub struct PacketBody<R: Read> {
    inner: R,
    remaining: usize,
    last_part: bool,
    until_eof: bool,
}

impl<R: Read> PacketBody<R> {
    /// Body whose first part has the given length
    pub fn new(inner: R, length: BodyLength) -> Self {
        let (remaining, last_part, until_eof) = match length {
            BodyLength::Definite(len) => (len, true, false),
            BodyLength::Partial(len) => (len, false, false),
            BodyLength::Indeterminate => (0, true, true),
        };
        Self {
            inner,
            remaining,
            last_part,
            until_eof,
        }
    }

    /// Whether the whole body has been consumed
    pub fn is_done(&self) -> bool {
        !self.until_eof && self.remaining == 0 && self.last_part
    }

    /// Consume whatever is left of the body
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// The reader underneath
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Give back the reader, positioned after the bytes read so far
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PacketBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.until_eof {
            return self.inner.read(buf);
        }

        while self.remaining == 0 {
            if self.last_part {
                return Ok(0);
            }
            match read_new_length(&mut self.inner)? {
                BodyLength::Partial(len) => self.remaining = len,
                BodyLength::Definite(len) => {
                    self.remaining = len;
                    self.last_part = true;
                }
                BodyLength::Indeterminate => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "indeterminate length inside a partial body",
                    ))
                }
            }
        }

        let want = buf.len().min(self.remaining);
        let read = self.inner.read(&mut buf[..want])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "packet body ended early",
            ));
        }
        self.remaining -= read;
        Ok(read)
    }
}

// ============================================================================
// TESTS
// ============================================================================
