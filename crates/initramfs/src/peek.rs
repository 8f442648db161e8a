//! Internal buffered reader with non-consuming lookahead.

use std::io::{self, ErrorKind, Read};

const BUF_SIZE: usize = 8192;

/// A buffered reader that can look ahead without consuming.
///
/// Unlike `BufRead::fill_buf`, [`PeekBuf::peek`] keeps refilling until
/// the requested window is available, and a clean end-of-input is not an
/// error: the returned slice is simply shorter than asked for. The
/// buffer itself implements [`Read`], serving buffered bytes first, so
/// it can be handed whole to a decompressor when a stream switches into
/// a compressed segment.
pub(crate) struct PeekBuf<'r> {
    inner: Box<dyn Read + 'r>,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl<'r> PeekBuf<'r> {
    pub fn new(inner: impl Read + 'r) -> PeekBuf<'r> {
        PeekBuf::from_boxed(Box::new(inner))
    }

    pub fn from_boxed(inner: Box<dyn Read + 'r>) -> PeekBuf<'r> {
        PeekBuf {
            inner,
            buf: vec![0u8; BUF_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.end - self.start
    }

    /// Return up to `n` bytes without consuming them. The result is
    /// shorter than `n` only when the source hit end-of-input.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        debug_assert!(n <= self.buf.len());

        while self.buffered() < n {
            if self.end == self.buf.len() {
                // Slide the window down to make room.
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }
            match self.inner.read(&mut self.buf[self.end..]) {
                Ok(0) => break,
                Ok(k) => self.end += k,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        let avail = self.buffered().min(n);
        Ok(&self.buf[self.start..self.start + avail])
    }

    /// Drop `n` already-peeked bytes.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.buffered());
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Discard exactly `n` bytes, reading past the buffer if necessary.
    /// A source that ends early is an `UnexpectedEof` error.
    pub fn discard(&mut self, n: u64) -> io::Result<()> {
        let buffered = (self.buffered() as u64).min(n);
        self.consume(buffered as usize);

        let mut rest = n - buffered;
        let mut scratch = [0u8; BUF_SIZE];
        while rest > 0 {
            let want = rest.min(scratch.len() as u64) as usize;
            match self.inner.read(&mut scratch[..want]) {
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(k) => rest -= k as u64,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl Read for PeekBuf<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffered() > 0 {
            let n = self.buffered().min(buf.len());
            buf[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
            self.consume(n);
            return Ok(n);
        }
        self.inner.read(buf)
    }
}
