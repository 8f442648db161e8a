//! Streaming archive reader.

use std::fmt;
use std::io::{self, Read, Write};

use log::trace;

use crate::compress::{builtin_compress_readers, CompressReaderMap};
use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::lookahead::Lookahead;
use crate::peek::PeekBuf;

/// How many bytes of padding to inspect per peek while skipping NULs.
const PADDING_WINDOW: usize = 64;

/// Pull-based reader for initramfs cpio streams.
///
/// [`next_header`] advances from member to member; between calls the
/// reader acts as a bounded [`Read`] over the current member's data,
/// reporting end-of-input once `data_size` bytes have been returned.
/// Unread data is discarded silently on the next advance.
///
/// Archives may be concatenated with zero padding in between, and a
/// stream may switch into a compressed segment; [`next_header`] then
/// fails with [`Error::CompressedContentAhead`] and
/// [`continue_compressed`] installs the matching decompressor.
///
/// The reader buffers internally but does not own the source: closing
/// it remains the caller's responsibility.
///
/// [`next_header`]: Reader::next_header
/// [`continue_compressed`]: Reader::continue_compressed
pub struct Reader<'r> {
    src: PeekBuf<'r>,
    /// Bytes consumed within the current stream segment. The data of
    /// the current member counts as consumed as soon as its header has
    /// been read, so alignment stays correct when data goes unread.
    nread: u64,
    /// Unread data bytes of the current member.
    remaining: u64,
}

/// What follows the current segment, as reported by
/// [`Reader::continue_compressed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSegment {
    /// The stream is exhausted.
    Eof,
    /// Uncompressed data follows; go back to [`Reader::next_header`].
    Plain(Lookahead),
    /// A decompressor for this compression type has been installed; go
    /// back to [`Reader::next_header`] for the decompressed members.
    Compressed(Lookahead),
}

impl<'r> Reader<'r> {
    pub fn new(src: impl Read + 'r) -> Reader<'r> {
        Reader {
            src: PeekBuf::new(src),
            nread: 0,
            remaining: 0,
        }
    }

    /// Advance to the next member header.
    ///
    /// Skips any zero padding in front of the header. Returns `Ok(None)`
    /// at end of input, [`Error::CompressedContentAhead`] when the next
    /// bytes open a recognized compression stream, and
    /// [`Error::UnknownInput`] on anything else.
    pub fn next_header(&mut self) -> Result<Option<Header>> {
        if !self.advance_to_header()? {
            return Ok(None);
        }

        let header_offset = self.nread;
        let mut hdr = Header::read_from(&mut self.src)?;
        self.nread += HEADER_SIZE as u64 + u64::from(hdr.filename_size);
        hdr.header_offset = header_offset;

        self.discard_align(4)?;

        hdr.data_offset = self.nread;
        self.remaining = u64::from(hdr.data_size);
        // Count the member data as consumed now; the next advance only
        // has to discard whatever the caller left unread.
        self.nread += self.remaining;

        Ok(Some(hdr))
    }

    /// Iterate headers until end of input or any error.
    ///
    /// The iterator is the error-blind equivalent of calling
    /// [`next_header`] until it stops; after it ends, use
    /// [`continue_compressed`] to tell a compressed-segment boundary
    /// from plain end-of-input. Callers that need member data or error
    /// details drive [`next_header`] directly.
    ///
    /// [`next_header`]: Reader::next_header
    /// [`continue_compressed`]: Reader::continue_compressed
    pub fn headers(&mut self) -> Headers<'_, 'r> {
        Headers { reader: self }
    }

    /// Copy the rest of the current member's data to `w`.
    pub fn copy_payload(&mut self, w: &mut impl Write) -> Result<u64> {
        let mut copied = 0u64;
        let mut buf = [0u8; 8192];

        while self.remaining > 0 {
            let want = self.remaining.min(buf.len() as u64) as usize;
            let n = match self.src.read(&mut buf[..want]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            w.write_all(&buf[..n]).map_err(Error::Io)?;
            self.remaining -= n as u64;
            copied += n as u64;
        }

        Ok(copied)
    }

    /// Attempt to continue into the start of a compressed segment.
    ///
    /// Discards unread member data and padding first. On a recognized
    /// compression magic, looks up a decompressor in `readers` (or in
    /// [`builtin_compress_readers`] when `None`), rebuilds the buffered
    /// view on top of it and resets the segment offset to 0, so
    /// subsequent header offsets are relative to the decompressed
    /// stream. Fails with [`Error::NoCompressReader`] when the map has
    /// no entry for the encountered compression type.
    pub fn continue_compressed(
        &mut self,
        readers: Option<&CompressReaderMap>,
    ) -> Result<NextSegment> {
        self.skip_unread_payload()?;
        self.discard_padding()?;

        let la = Lookahead::sniff(self.src.peek(6)?);

        if la.is_eof() {
            return Ok(NextSegment::Eof);
        }

        if !la.is_compression() {
            return Ok(NextSegment::Plain(la));
        }

        let readers = readers.unwrap_or_else(|| builtin_compress_readers());
        let Some(&make) = readers.get(&la) else {
            return Err(Error::NoCompressReader(la));
        };

        trace!("entering {la} compressed segment after {} bytes", self.nread);

        let src = std::mem::replace(&mut self.src, PeekBuf::new(io::empty()));
        self.src = PeekBuf::from_boxed(make(Box::new(src))?);
        self.nread = 0;

        Ok(NextSegment::Compressed(la))
    }

    /// Position the stream at the start of the next header, skipping
    /// padding. `Ok(false)` means clean end of input.
    fn advance_to_header(&mut self) -> Result<bool> {
        self.skip_unread_payload()?;

        loop {
            let la = Lookahead::sniff(self.src.peek(6)?);

            if la.is_compression() {
                return Err(Error::CompressedContentAhead);
            }

            match la {
                Lookahead::Eof => return Ok(false),
                Lookahead::Padding => self.discard_padding()?,
                Lookahead::CpioFile => return Ok(true),
                _ => return Err(Error::UnknownInput),
            }
        }
    }

    fn skip_unread_payload(&mut self) -> Result<()> {
        if self.remaining > 0 {
            // Already counted into nread when the header was read.
            let n = self.remaining;
            self.remaining = 0;
            self.src.discard(n)?;
        }
        Ok(())
    }

    fn discard_counted(&mut self, n: u64) -> Result<()> {
        if n > 0 {
            self.src.discard(n)?;
            self.nread += n;
        }
        Ok(())
    }

    /// Drop a run of NUL bytes, one peek window at a time. Linear in the
    /// padding length.
    fn discard_padding(&mut self) -> Result<()> {
        loop {
            let peek = self.src.peek(PADDING_WINDOW)?;
            let window = peek.len();
            let nuls = peek.iter().take_while(|&&b| b == 0).count();

            self.discard_counted(nuls as u64)?;

            if nuls < window || window == 0 {
                return Ok(());
            }
        }
    }

    /// Discard up to the next multiple of `align` of the segment offset.
    fn discard_align(&mut self, align: u64) -> Result<()> {
        let rem = self.nread % align;
        if rem > 0 {
            self.discard_counted(align - rem)?;
        }
        Ok(())
    }
}

impl Read for Reader<'_> {
    /// Read the current member's data, up to its `data_size`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = self.remaining.min(buf.len() as u64) as usize;
        let n = self.src.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("nread", &self.nread)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`Reader::headers`].
pub struct Headers<'a, 'r> {
    reader: &'a mut Reader<'r>,
}

impl Iterator for Headers<'_, '_> {
    type Item = Header;

    fn next(&mut self) -> Option<Header> {
        self.reader.next_header().ok().flatten()
    }
}
