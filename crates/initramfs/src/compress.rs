//! Compression codec injection points.
//!
//! The core never decodes compressed data itself. The reader looks up a
//! decompressor factory in a [`CompressReaderMap`] keyed by the sniffed
//! [`Lookahead`], and the writer hands its sink to a caller-supplied
//! [`CompressWriterFn`]. Gzip and bzip2 factories are built in; xz,
//! zstd, lzma, lzo and lz4 plug in through the same types.
//!
//! When compressing with xz, review the kernel's notes on compression
//! options (Documentation/staging/xz.rst) to stay bootable.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use once_cell::sync::Lazy;

use crate::lookahead::Lookahead;

/// Builds a decompressing reader over the remaining stream.
pub type CompressReaderFn = for<'a> fn(Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>>;

/// Selects a [`CompressReaderFn`] by the sniffed compression type.
pub type CompressReaderMap = HashMap<Lookahead, CompressReaderFn>;

/// A compressing sink that may need to emit a stream trailer when the
/// archive writer closes.
pub trait CompressWrite: Write {
    /// Finish the compressed stream. The default is a plain flush,
    /// which suits codecs that finalize on drop.
    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Builds a compressing writer around the archive writer's sink. All
/// further archive output passes through it; a compressed segment can
/// only end at end-of-file.
pub type CompressWriterFn = for<'a> fn(Box<dyn Write + 'a>) -> io::Result<Box<dyn CompressWrite + 'a>>;

/// A gzip decompressor built on [`flate2`].
pub fn gzip_reader<'a>(r: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>> {
    Ok(Box::new(GzDecoder::new(r)))
}

/// A bzip2 decompressor built on the [`bzip2`] crate.
pub fn bzip2_reader<'a>(r: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>> {
    Ok(Box::new(BzDecoder::new(r)))
}

/// A gzip compressor built on [`flate2`], at the default level.
pub fn gzip_writer<'a>(w: Box<dyn Write + 'a>) -> io::Result<Box<dyn CompressWrite + 'a>> {
    Ok(Box::new(GzEncoder::new(w, flate2::Compression::default())))
}

impl<W: Write> CompressWrite for GzEncoder<W> {
    fn finish(&mut self) -> io::Result<()> {
        self.try_finish()
    }
}

static BUILTIN_COMPRESS_READERS: Lazy<CompressReaderMap> = Lazy::new(|| {
    HashMap::from([
        (Lookahead::Gzip, gzip_reader as CompressReaderFn),
        (Lookahead::Bzip2, bzip2_reader as CompressReaderFn),
    ])
});

/// The decompressor registry used when [`Reader::continue_compressed`]
/// is given no map.
///
/// Only gzip and bzip2 are registered. Callers needing further codecs
/// clone this into their own [`CompressReaderMap`] and insert entries
/// for them.
///
/// [`Reader::continue_compressed`]: crate::Reader::continue_compressed
pub fn builtin_compress_readers() -> &'static CompressReaderMap {
    &BUILTIN_COMPRESS_READERS
}
