//! Compressed data packets (tag 8).
//!
//! The body is one algorithm octet followed by the compressed stream of the
//! packets it contains. Only ZLIB is produced; both directions stream
//! through `miniz_oxide` with bounded buffers.

use std::io::{self, Read, Write};

use miniz_oxide::deflate::core::{create_comp_flags_from_zip_params, CompressorOxide};
use miniz_oxide::inflate::stream::{inflate, InflateState};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

use super::{PartialBodyWriter, Tag};
use crate::algorithm::CompressionAlgorithm;

/// Compression level used for ZLIB output
pub const COMPRESSION_LEVEL: i32 = 6;

const BUFFER_SIZE: usize = 32 * 1024;

/// Streaming zlib compressor writing a compressed data packet
pub struct Compressor<W: Write> {
    inner: PartialBodyWriter<W>,
    state: Box<CompressorOxide>,
    out: Vec<u8>,
}

impl<W: Write> Compressor<W> {
    /// Open a compressed data packet on `out`
    pub fn start(out: W) -> io::Result<Self> {
        let mut inner = PartialBodyWriter::start(out, Tag::CompressedData)?;
        inner.write_all(&[CompressionAlgorithm::Zlib.id()])?;

        // Positive window bits select the zlib wrapper.
        let flags = create_comp_flags_from_zip_params(COMPRESSION_LEVEL, 15, 0);
        Ok(Self {
            inner,
            state: Box::new(CompressorOxide::new(flags)),
            out: vec![0u8; BUFFER_SIZE],
        })
    }

    fn run(&mut self, mut input: &[u8], flush: MZFlush) -> io::Result<()> {
        loop {
            let result =
                miniz_oxide::deflate::stream::deflate(&mut self.state, input, &mut self.out, flush);
            input = &input[result.bytes_consumed..];
            self.inner.write_all(&self.out[..result.bytes_written])?;

            match result.status {
                Ok(MZStatus::StreamEnd) => return Ok(()),
                Ok(_) if input.is_empty() && flush == MZFlush::None => return Ok(()),
                Ok(_) => {}
                Err(MZError::Buf) if input.is_empty() && flush == MZFlush::None => return Ok(()),
                Err(e) => {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("zlib compression failed: {:?}", e),
                    ))
                }
            }
        }
    }

    /// End the zlib stream and the packet, handing back the sink
    pub fn finish(mut self) -> io::Result<W> {
        self.run(&[], MZFlush::Finish)?;
        self.inner.finish()
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.run(buf, MZFlush::None)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming zlib decompressor over a compressed packet body
///
/// The caller reads the algorithm octet before handing the body over.
pub struct Decompressor<R: Read> {
    inner: R,
    state: Box<InflateState>,
    input: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> Decompressor<R> {
    /// Decompress a zlib stream read from `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: InflateState::new_boxed(DataFormat::Zlib),
            input: vec![0u8; BUFFER_SIZE],
            start: 0,
            end: 0,
            eof: false,
            finished: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        if self.start > 0 {
            self.input.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.input.len() {
            self.input.resize(self.input.len() * 2, 0);
        }
        let read = self.inner.read(&mut self.input[self.end..])?;
        if read == 0 {
            self.eof = true;
        }
        self.end += read;
        Ok(())
    }

    /// Give back the packet body, positioned after the zlib stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.finished {
            return Ok(0);
        }

        loop {
            if self.start == self.end && !self.eof {
                self.refill()?;
            }

            let result = inflate(
                &mut self.state,
                &self.input[self.start..self.end],
                buf,
                MZFlush::None,
            );
            self.start += result.bytes_consumed;

            match result.status {
                Ok(MZStatus::StreamEnd) => {
                    self.finished = true;
                    return Ok(result.bytes_written);
                }
                Ok(_) | Err(MZError::Buf) => {
                    if result.bytes_written > 0 {
                        return Ok(result.bytes_written);
                    }
                    if result.bytes_consumed == 0 {
                        if self.eof {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "compressed stream ended early",
                            ));
                        }
                        self.refill()?;
                    }
                }
                Err(e) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("corrupt compressed data: {:?}", e),
                    ))
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
