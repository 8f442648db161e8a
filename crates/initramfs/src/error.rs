//! Stream-level error types.

use thiserror::Error;

use crate::header::HeaderError;
use crate::lookahead::Lookahead;

/// Errors from reading or writing an archive stream.
///
/// End of input is not represented here: the pull APIs signal it with
/// `Ok(None)` ([`Reader::next_header`]) or [`NextSegment::Eof`]
/// ([`Reader::continue_compressed`]).
///
/// [`Reader::next_header`]: crate::Reader::next_header
/// [`Reader::continue_compressed`]: crate::Reader::continue_compressed
/// [`NextSegment::Eof`]: crate::NextSegment::Eof
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header parse error.
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// The reader found a compression magic where a member header was
    /// expected; call [`Reader::continue_compressed`] to follow it.
    ///
    /// [`Reader::continue_compressed`]: crate::Reader::continue_compressed
    #[error("compressed content ahead")]
    CompressedContentAhead,

    /// The compression type of the next segment has no entry in the
    /// supplied reader map.
    #[error("no compression reader for {0}")]
    NoCompressReader(Lookahead),

    /// Unrecognized bytes where a member header was expected.
    #[error("unrecognized data where a member header was expected")]
    UnknownInput,

    /// A forced alignment value is not a multiple of 4.
    #[error("alignment {0} is not itself a multiple of 4")]
    BadAlignment(u64),

    /// The requested data alignment cannot be reached given the length
    /// of the member's filename.
    #[error("unable to align member data as requested given the filename")]
    BadDataAlignment,

    /// The writer is already producing a compressed stream.
    #[error("writer compression is already being applied")]
    AlreadyCompressed,

    /// Operation on a closed writer.
    #[error("writer is closed")]
    Closed,
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;
