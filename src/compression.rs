//! Stream compression for archive artifacts
//!
//! Archives are tar streams, optionally wrapped in an LZ4 frame. The
//! compression choice is encoded in the artifact's extension so a store can
//! hold archives written with different settings and still be replayed.
//!
//! ## Formats
//!
//! - **None**: plain tar, extension `tar`
//! - **Lz4**: tar inside an LZ4 frame, extension `tar.lz4` (default)
//!
//! ## Examples
//!
//! ```rust
//! use snapchain::compression::ArchiveCompression;
//! use std::io::{Read, Write};
//!
//! let mut sink = ArchiveCompression::Lz4.wrap_writer(Vec::new());
//! sink.write_all(b"payload").unwrap();
//! let bytes = sink.finish().unwrap();
//!
//! let mut reader = ArchiveCompression::Lz4.wrap_reader(&bytes[..]);
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out).unwrap();
//! assert_eq!(out, b"payload");
//! ```

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::str::FromStr;

/// Compression applied to archive artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// Plain tar
    None,
    /// Tar wrapped in an LZ4 frame
    #[default]
    Lz4,
}

impl ArchiveCompression {
    /// All supported formats, used when recognising artifact names
    pub const ALL: [ArchiveCompression; 2] = [ArchiveCompression::Lz4, ArchiveCompression::None];

    /// File extension (without leading dot) for archives in this format
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveCompression::None => "tar",
            ArchiveCompression::Lz4 => "tar.lz4",
        }
    }

    /// Recognise the format from an artifact extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.extension() == ext)
    }

    /// Wrap a writer so that bytes written are compressed
    pub fn wrap_writer<W: Write>(&self, inner: W) -> CompressedWriter<W> {
        match self {
            ArchiveCompression::None => CompressedWriter::Plain(inner),
            ArchiveCompression::Lz4 => CompressedWriter::Lz4(FrameEncoder::new(inner)),
        }
    }

    /// Wrap a reader so that bytes read are decompressed
    pub fn wrap_reader<'a, R: Read + 'a>(&self, inner: R) -> Box<dyn Read + 'a> {
        match self {
            ArchiveCompression::None => Box::new(inner),
            ArchiveCompression::Lz4 => Box::new(FrameDecoder::new(inner)),
        }
    }
}

impl FromStr for ArchiveCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ArchiveCompression::None),
            "lz4" => Ok(ArchiveCompression::Lz4),
            other => Err(format!("unknown compression '{}', expected 'none' or 'lz4'", other)),
        }
    }
}

/// Writer that compresses according to an [`ArchiveCompression`]
///
/// `finish` must be called to terminate the LZ4 frame; dropping the writer
/// without finishing leaves a truncated stream.
pub enum CompressedWriter<W: Write> {
    /// Pass-through
    Plain(W),
    /// LZ4 frame encoder
    Lz4(FrameEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    /// Flush and terminate the stream, returning the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressedWriter::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            CompressedWriter::Lz4(encoder) => encoder.finish().map_err(io::Error::other),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(w) => w.write(buf),
            CompressedWriter::Lz4(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(w) => w.flush(),
            CompressedWriter::Lz4(e) => e.flush(),
        }
    }
}
