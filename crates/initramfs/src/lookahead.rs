//! Short-peek classification of the next byte region in a stream.
//!
//! Recognizes the difference between cpio member headers, zero padding
//! and the compression schemes the kernel accepts for initramfs
//! segments; see the `RD_` and `INITRAMFS_COMPRESSION` options in the
//! kernel's `usr/Kconfig` and the magic table in `lib/decompress.c`.

use std::fmt;

use crate::header::Magic;

/// What kind of data begins at the current stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookahead {
    /// None of the recognized prefixes.
    Unknown,
    /// End of input.
    Eof,
    /// Zero padding.
    Padding,
    /// Start of a cpio member header.
    CpioFile,
    /// Start of gzip compressed data.
    Gzip,
    /// Start of bzip2 compressed data.
    Bzip2,
    /// Start of LZMA compressed data.
    Lzma,
    /// Start of XZ compressed data.
    Xz,
    /// Start of LZO compressed data.
    Lzo,
    /// Start of LZ4 compressed data.
    Lz4,
    /// Start of Zstd compressed data.
    Zstd,
}

/// Two-byte magic values identifying the start of compressed data or a
/// cpio member, matching the kernel's `lib/decompress.c`.
pub mod magic {
    /// Both `070701` and `070702` member headers start with `07`.
    pub const CPIO: u16 = 0x3037;
    pub const GZIP1: u16 = 0x1F8B;
    pub const GZIP2: u16 = 0x1F9E;
    pub const BZIP2: u16 = 0x425A;
    pub const LZMA: u16 = 0x5D00;
    pub const XZ: u16 = 0xFD37;
    pub const LZO: u16 = 0x894C;
    pub const LZ4: u16 = 0x0221;
    pub const ZSTD: u16 = 0x28B5;
}

/// Classify two bytes as one of the recognized magic values.
pub fn sniff_magic(peek: [u8; 2]) -> Option<u16> {
    match u16::from_be_bytes(peek) {
        m @ (magic::CPIO
        | magic::GZIP1
        | magic::GZIP2
        | magic::BZIP2
        | magic::LZMA
        | magic::XZ
        | magic::LZO
        | magic::LZ4
        | magic::ZSTD) => Some(m),
        _ => None,
    }
}

impl Lookahead {
    /// Classify a peeked prefix without consuming it.
    ///
    /// `peek` should hold the next 6 bytes of the stream, or as many as
    /// remain. Fewer than 2 bytes reads as end of input, and a `07`
    /// prefix needs all 6 bytes before it counts as a member header;
    /// with fewer available the stream cannot contain one.
    pub fn sniff(peek: &[u8]) -> Lookahead {
        if peek.len() < 2 {
            return Lookahead::Eof;
        }

        if peek[0] == 0 {
            return Lookahead::Padding;
        }

        match u16::from_be_bytes([peek[0], peek[1]]) {
            magic::CPIO => {
                if peek.len() < 6 {
                    Lookahead::Eof
                } else if peek[..6] == *Magic::Newc.wire_bytes()
                    || peek[..6] == *Magic::NewcCrc.wire_bytes()
                {
                    Lookahead::CpioFile
                } else {
                    Lookahead::Unknown
                }
            }
            magic::GZIP1 | magic::GZIP2 => Lookahead::Gzip,
            magic::BZIP2 => Lookahead::Bzip2,
            magic::LZMA => Lookahead::Lzma,
            magic::XZ => Lookahead::Xz,
            magic::LZO => Lookahead::Lzo,
            magic::LZ4 => Lookahead::Lz4,
            magic::ZSTD => Lookahead::Zstd,
            _ => Lookahead::Unknown,
        }
    }

    /// True when the lookahead marks the start of compressed data.
    pub fn is_compression(self) -> bool {
        matches!(
            self,
            Lookahead::Gzip
                | Lookahead::Bzip2
                | Lookahead::Lzma
                | Lookahead::Xz
                | Lookahead::Lzo
                | Lookahead::Lz4
                | Lookahead::Zstd
        )
    }

    /// True when the end of input was reached while looking ahead.
    pub fn is_eof(self) -> bool {
        self == Lookahead::Eof
    }
}

impl fmt::Display for Lookahead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lookahead::Unknown => "unknown",
            Lookahead::Eof => "EOF",
            Lookahead::Padding => "padding",
            Lookahead::CpioFile => "cpiofile",
            Lookahead::Gzip => "gzip",
            Lookahead::Bzip2 => "bzip2",
            Lookahead::Lzma => "lzma",
            Lookahead::Xz => "xz",
            Lookahead::Lzo => "lzo",
            Lookahead::Lz4 => "lz4",
            Lookahead::Zstd => "zstd",
        })
    }
}
