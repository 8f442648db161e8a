//! The cpio "newc" member header: textual wire codec and mode bits.
//!
//! A member header is 110 bytes of ASCII: a 6-byte magic followed by 13
//! fields of 8 hex digits, then the filename and a single NUL. The layout
//! is fixed by the kernel's [buffer format] documentation.
//!
//! [buffer format]: https://www.kernel.org/doc/html/latest/driver-api/early-userspace/buffer-format.html

use std::fmt;
use std::io::{self, Read, Write};
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use zerocopy::big_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of the fixed textual header prefix: 6 bytes of magic plus 13
/// fields of 8 hex digits each.
pub const HEADER_SIZE: usize = 110;

/// The sentinel filename that marks the end of an archive segment.
pub const TRAILER_FILENAME: &str = "TRAILER!!!";

/// Errors from parsing a member header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The 6-byte magic is neither `070701` nor `070702`.
    #[error("header contains a bad magic value")]
    BadMagic,

    /// A non-hexadecimal character at the given byte offset from the
    /// start of the header.
    #[error("invalid hex digit at header offset {0}")]
    InvalidByte(usize),

    /// The filename region does not contain a terminating NUL.
    #[error("filename field is missing its trailing NUL")]
    MalformedFilename,

    /// The filename is not valid UTF-8.
    #[error("invalid UTF-8 in filename: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Magic identifiers for cpio newc member headers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// `070701`: the "newc" format, without payload checksums.
    #[default]
    Newc,
    /// `070702`: "newc" with a byte-sum checksum of the payload.
    NewcCrc,
}

impl Magic {
    /// The 6 ASCII bytes of the magic as they appear on the wire.
    pub fn wire_bytes(self) -> &'static [u8; 6] {
        match self {
            Magic::Newc => b"070701",
            Magic::NewcCrc => b"070702",
        }
    }

    /// True when headers with this magic carry a payload checksum.
    pub fn has_checksum(self) -> bool {
        matches!(self, Magic::NewcCrc)
    }

    fn from_binary(b: [u8; 3]) -> Option<Magic> {
        match (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]) {
            0x070701 => Some(Magic::Newc),
            0x070702 => Some(Magic::NewcCrc),
            _ => None,
        }
    }

    fn to_binary(self) -> [u8; 3] {
        match self {
            Magic::Newc => [0x07, 0x07, 0x01],
            Magic::NewcCrc => [0x07, 0x07, 0x02],
        }
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magic::Newc => f.write_str("070701"),
            Magic::NewcCrc => f.write_str("070702"),
        }
    }
}

/// File mode and permission bits as stored in a member header.
///
/// The upper nibble (mask [`Mode::FILE_TYPE_MASK`]) selects the file
/// type; the low 12 bits are the permission and suid/sgid/sticky bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(pub u32);

impl Mode {
    /// Mask selecting the file-type nibble.
    pub const FILE_TYPE_MASK: Mode = Mode(0o170_000);
    /// File type for sockets.
    pub const SOCKET: Mode = Mode(0o140_000);
    /// File type for symbolic links; the member data is the link target.
    pub const SYMLINK: Mode = Mode(0o120_000);
    /// File type for regular files.
    pub const FILE: Mode = Mode(0o100_000);
    /// File type for block devices.
    pub const BLOCK_DEVICE: Mode = Mode(0o060_000);
    /// File type for directories.
    pub const DIR: Mode = Mode(0o040_000);
    /// File type for character devices.
    pub const CHAR_DEVICE: Mode = Mode(0o020_000);
    /// File type for named pipes.
    pub const FIFO: Mode = Mode(0o010_000);
    /// Set-user-ID bit.
    pub const SETUID: Mode = Mode(0o004_000);
    /// Set-group-ID bit.
    pub const SETGID: Mode = Mode(0o002_000);
    /// Sticky (restricted deletion) bit.
    pub const STICKY: Mode = Mode(0o001_000);
    /// Read/write/execute permission bits for user, group and other.
    pub const PERMS_MASK: Mode = Mode(0o000_777);

    /// The file-type nibble alone.
    pub fn file_type(self) -> Mode {
        self & Mode::FILE_TYPE_MASK
    }

    /// The permission bits alone (`mode & 0o777`).
    pub fn perms(self) -> u32 {
        self.0 & Mode::PERMS_MASK.0
    }

    pub fn is_socket(self) -> bool {
        self.file_type() == Mode::SOCKET
    }

    pub fn is_symlink(self) -> bool {
        self.file_type() == Mode::SYMLINK
    }

    pub fn is_file(self) -> bool {
        self.file_type() == Mode::FILE
    }

    pub fn is_block_device(self) -> bool {
        self.file_type() == Mode::BLOCK_DEVICE
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == Mode::DIR
    }

    pub fn is_char_device(self) -> bool {
        self.file_type() == Mode::CHAR_DEVICE
    }

    pub fn is_fifo(self) -> bool {
        self.file_type() == Mode::FIFO
    }

    pub fn is_setuid(self) -> bool {
        self.0 & Mode::SETUID.0 != 0
    }

    pub fn is_setgid(self) -> bool {
        self.0 & Mode::SETGID.0 != 0
    }

    pub fn is_sticky(self) -> bool {
        self.0 & Mode::STICKY.0 != 0
    }

    /// Replace the file-type nibble, leaving all other bits alone.
    pub fn set_file_type(&mut self, ftype: Mode) {
        self.0 = (self.0 & !Mode::FILE_TYPE_MASK.0) | (ftype.0 & Mode::FILE_TYPE_MASK.0);
    }

    /// Replace the permission bits, leaving all other bits alone.
    pub fn set_perms(&mut self, perms: u32) {
        self.0 = (self.0 & !Mode::PERMS_MASK.0) | (perms & Mode::PERMS_MASK.0);
    }

    /// Set the given bits.
    pub fn set_bits(&mut self, bits: Mode) {
        self.0 |= bits.0;
    }

    /// Clear the given bits.
    pub fn clear_bits(&mut self, bits: Mode) {
        self.0 &= !bits.0;
    }

    /// A copy of this mode with the permission bits replaced.
    pub fn with_perms(mut self, perms: u32) -> Mode {
        self.set_perms(perms);
        self
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Mode) -> Mode {
        Mode(self.0 | rhs.0)
    }
}

impl BitOr<u32> for Mode {
    type Output = Mode;

    fn bitor(self, rhs: u32) -> Mode {
        Mode(self.0 | rhs)
    }
}

impl BitOrAssign for Mode {
    fn bitor_assign(&mut self, rhs: Mode) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Mode {
    type Output = Mode;

    fn bitand(self, rhs: Mode) -> Mode {
        Mode(self.0 & rhs.0)
    }
}

impl From<u32> for Mode {
    fn from(bits: u32) -> Mode {
        Mode(bits)
    }
}

impl fmt::Display for Mode {
    /// Formats like the mode column of `ls -l`, e.g. `drwxr-x---`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ftype = match self.file_type() {
            Mode::SOCKET => 's',
            Mode::SYMLINK => 'l',
            Mode::BLOCK_DEVICE => 'b',
            Mode::DIR => 'd',
            Mode::CHAR_DEVICE => 'c',
            Mode::FIFO => 'p',
            _ => '-',
        };
        write!(f, "{ftype}")?;

        for shift in [6u32, 3, 0] {
            let bits = self.0 >> shift;
            write!(
                f,
                "{}{}{}",
                if bits & 0o4 != 0 { 'r' } else { '-' },
                if bits & 0o2 != 0 { 'w' } else { '-' },
                if bits & 0o1 != 0 { 'x' } else { '-' },
            )?;
        }

        Ok(())
    }
}

/// The fixed header fields after hex decoding: 3 bytes of magic followed
/// by 13 big-endian 32-bit fields.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 3],
    inode: U32,
    mode: U32,
    uid: U32,
    gid: U32,
    nlink: U32,
    mtime: U32,
    data_size: U32,
    major: U32,
    minor: U32,
    rmajor: U32,
    rminor: U32,
    filename_size: U32,
    checksum: U32,
}

// 6 bytes of magic text plus 13 fields of 8 hex digits, halved.
const _: () = assert!(std::mem::size_of::<RawHeader>() == HEADER_SIZE / 2);

/// A member file header within a cpio archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Byte offset of this header within the current stream segment.
    /// Only meaningful on headers produced by the reader.
    pub header_offset: u64,
    /// Byte offset of the member data within the current stream segment.
    /// Only meaningful on headers produced by the reader.
    pub data_offset: u64,

    pub magic: Magic,
    /// File inode number. The writer assigns one when this is zero and
    /// the header is not a trailer.
    pub inode: u32,
    /// File mode and permission bits.
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    /// Number of hard links. The writer raises zero to one.
    pub nlink: u32,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u32,
    /// Size of the member data following the header.
    pub data_size: u32,
    /// Major part of the owning filesystem's device number.
    pub major: u32,
    /// Minor part of the owning filesystem's device number.
    pub minor: u32,
    /// Major device number when the member is a device node.
    pub rmajor: u32,
    /// Minor device number when the member is a device node.
    pub rminor: u32,
    /// Length of the filename field including the trailing NUL.
    pub filename_size: u32,
    /// Byte-sum of the member data when the magic is `070702`, else 0.
    pub checksum: u32,

    /// Member filename, without the wire form's trailing NUL.
    pub filename: String,
}

impl Header {
    /// Read and decode the textual header and filename fields.
    ///
    /// Fails with [`HeaderError::InvalidByte`] on a non-hex character,
    /// [`HeaderError::BadMagic`] on an unrecognized magic, and
    /// [`HeaderError::MalformedFilename`] when the filename region has
    /// no trailing NUL.
    pub fn read_from(r: &mut impl Read) -> Result<Header, HeaderError> {
        let mut text = [0u8; HEADER_SIZE];
        r.read_exact(&mut text)?;

        let mut bin = [0u8; HEADER_SIZE / 2];
        hex::decode_to_slice(text, &mut bin[..]).map_err(|err| match err {
            hex::FromHexError::InvalidHexCharacter { index, .. } => HeaderError::InvalidByte(index),
            // Input and output lengths are fixed above.
            _ => HeaderError::InvalidByte(0),
        })?;

        // The buffer is exactly one RawHeader by construction.
        let raw = RawHeader::read_from_bytes(&bin).expect("sized above");

        let magic = Magic::from_binary(raw.magic).ok_or(HeaderError::BadMagic)?;

        let filename_size = raw.filename_size.get();
        let mut filename = vec![0u8; filename_size as usize];
        r.read_exact(&mut filename)?;

        let Some(nul) = filename.iter().position(|&b| b == 0) else {
            return Err(HeaderError::MalformedFilename);
        };
        filename.truncate(nul);
        let filename =
            String::from_utf8(filename).map_err(|err| HeaderError::from(err.utf8_error()))?;

        Ok(Header {
            header_offset: 0,
            data_offset: 0,
            magic,
            inode: raw.inode.get(),
            mode: Mode(raw.mode.get()),
            uid: raw.uid.get(),
            gid: raw.gid.get(),
            nlink: raw.nlink.get(),
            mtime: raw.mtime.get(),
            data_size: raw.data_size.get(),
            major: raw.major.get(),
            minor: raw.minor.get(),
            rmajor: raw.rmajor.get(),
            rminor: raw.rminor.get(),
            filename_size,
            checksum: raw.checksum.get(),
            filename,
        })
    }

    /// The wire length of this header: the fixed prefix plus the
    /// NUL-terminated filename.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.filename.len() + 1
    }

    /// Encode the textual header and filename fields.
    ///
    /// The emitted `filename_size` field is always recomputed from the
    /// filename.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.to_wire())
    }

    /// The encoded form of the header and filename fields.
    pub fn to_wire(&self) -> Vec<u8> {
        let raw = RawHeader {
            magic: self.magic.to_binary(),
            inode: U32::new(self.inode),
            mode: U32::new(self.mode.0),
            uid: U32::new(self.uid),
            gid: U32::new(self.gid),
            nlink: U32::new(self.nlink),
            mtime: U32::new(self.mtime),
            data_size: U32::new(self.data_size),
            major: U32::new(self.major),
            minor: U32::new(self.minor),
            rmajor: U32::new(self.rmajor),
            rminor: U32::new(self.rminor),
            filename_size: U32::new(self.filename.len() as u32 + 1),
            checksum: U32::new(self.checksum),
        };

        let mut out = Vec::with_capacity(self.wire_size());
        out.extend_from_slice(hex::encode_upper(raw.as_bytes()).as_bytes());
        out.extend_from_slice(self.filename.as_bytes());
        out.push(0);
        out
    }

    /// True when this header is the end-of-segment sentinel.
    pub fn is_trailer(&self) -> bool {
        self.filename == TRAILER_FILENAME
    }

    /// The canonical end-of-segment trailer header.
    pub fn trailer() -> Header {
        Header {
            magic: Magic::Newc,
            nlink: 1,
            filename_size: TRAILER_FILENAME.len() as u32 + 1,
            filename: TRAILER_FILENAME.to_string(),
            ..Header::default()
        }
    }

    /// Store a wall-clock time into the 32-bit seconds field. Times
    /// before the Unix epoch are stored as 0.
    pub fn set_mtime(&mut self, t: SystemTime) {
        self.mtime = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0);
    }
}

impl fmt::Display for Header {
    /// Formats similarly to a line of `ls -l` long listing output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:4}  {:4} {:4}  {:8}  {:10}  {}",
            self.mode, self.nlink, self.uid, self.gid, self.data_size, self.mtime, self.filename
        )
    }
}
