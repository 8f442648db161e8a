//! Read and write Linux kernel initramfs-style cpio "newc" archives.
//!
//! The [`Reader`] pulls member headers and data out of a byte stream and
//! the [`Writer`] produces one, following the kernel's [buffer format]:
//! textual hex headers (magic `070701` or `070702`), NUL-terminated
//! filenames, 4-byte alignment between records, and a `TRAILER!!!`
//! sentinel per segment. Multiple segments may be concatenated with
//! optional zero padding in between, and a segment may be compressed;
//! compression codecs themselves are injected by the caller (gzip and
//! bzip2 come built in, see [`builtin_compress_readers`]).
//!
//! Reading an archive:
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> initramfs::Result<()> {
//! let file = File::open("boot.initramfs").unwrap();
//! let mut reader = initramfs::Reader::new(BufReader::new(file));
//!
//! while let Some(hdr) = reader.next_header()? {
//!     println!("{hdr}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writing one:
//!
//! ```
//! use std::io::Write;
//!
//! # fn main() -> initramfs::Result<()> {
//! let mut out = Vec::new();
//! let mut writer = initramfs::Writer::new(&mut out);
//!
//! let mut hdr = initramfs::Header {
//!     mode: initramfs::Mode::FILE | 0o644,
//!     data_size: 6,
//!     filename: "etc/motd".to_string(),
//!     ..Default::default()
//! };
//! writer.write_header(&mut hdr)?;
//! writer.write_all(b"hello\n").map_err(initramfs::Error::Io)?;
//! writer.write_trailer()?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! [buffer format]: https://www.kernel.org/doc/html/latest/driver-api/early-userspace/buffer-format.html

mod checksum;
mod compress;
mod error;
mod header;
pub mod lookahead;
mod peek;
mod reader;
mod writer;

pub use checksum::{compute_checksum, reader_checksum};
pub use compress::{
    builtin_compress_readers, bzip2_reader, gzip_reader, gzip_writer, CompressReaderFn,
    CompressReaderMap, CompressWrite, CompressWriterFn,
};
pub use error::{Error, Result};
pub use header::{Header, HeaderError, Magic, Mode, HEADER_SIZE, TRAILER_FILENAME};
pub use lookahead::Lookahead;
pub use reader::{Headers, NextSegment, Reader};
pub use writer::{Writer, DEFAULT_MKDIR_PERM, START_COMPRESSION_ALIGNMENT};

/// Alignment for Intel x86 microcode update data, for use with
/// [`Writer::set_data_alignment`]. Current practice is a 16-byte
/// boundary, although this may only matter for older kernels.
pub const MICROCODE_DATA_ALIGNMENT: u64 = 16;

/// Directory the kernel searches for very early x86 microcode updates;
/// see the kernel's x86 microcode loader documentation.
pub const MICROCODE_X86_DIR: &str = "kernel/x86/microcode/";

/// Member path for AMD microcode in an early-load initramfs.
pub const MICROCODE_PATH_AUTHENTIC_AMD: &str = "kernel/x86/microcode/AuthenticAMD.bin";

/// Member path for Intel microcode in an early-load initramfs. Its
/// length is what makes [`Writer::set_data_alignment`] workable at
/// [`MICROCODE_DATA_ALIGNMENT`].
pub const MICROCODE_PATH_GENUINE_INTEL: &str = "kernel/x86/microcode/GenuineIntel.bin";
