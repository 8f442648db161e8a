//! End-to-end emit-then-reparse tests: archives produced by the writer
//! are read back with the reader and checked for the wire-format
//! guarantees (alignment, parent directories, segment boundaries,
//! compression transitions).

use std::io::{Read, Write};

use similar_asserts::assert_eq;

use initramfs::{
    compute_checksum, gzip_writer, Error, Header, Lookahead, Magic, Mode, NextSegment, Reader,
    Writer, MICROCODE_DATA_ALIGNMENT, MICROCODE_PATH_AUTHENTIC_AMD, MICROCODE_PATH_GENUINE_INTEL,
};

/// A member header for a regular file with the given payload size.
fn file_header(name: &str, data_len: usize) -> Header {
    Header {
        mode: Mode::FILE | 0o644,
        data_size: data_len as u32,
        filename: name.to_string(),
        ..Header::default()
    }
}

/// Emit the given (name, payload) members followed by a trailer.
fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);
    for (name, data) in files {
        let mut hdr = file_header(name, data.len());
        w.write_header(&mut hdr).unwrap();
        w.write_all(data).unwrap();
    }
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);
    out
}

/// Parse every member of the stream, collecting headers and payloads.
fn parse_all(reader: &mut Reader<'_>) -> Vec<(Header, Vec<u8>)> {
    let mut entries = Vec::new();
    while let Some(hdr) = reader.next_header().unwrap() {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        entries.push((hdr, data));
    }
    entries
}

fn names(entries: &[(Header, Vec<u8>)]) -> Vec<&str> {
    entries.iter().map(|(hdr, _)| hdr.filename.as_str()).collect()
}

// ============================================================================
// Literal scenarios
// ============================================================================

#[test]
fn test_single_file_roundtrip() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    let mut hdr = Header {
        mode: Mode::FILE | 0o644,
        mtime: 1_136_214_245,
        data_size: 13,
        filename: "helloworld.txt".to_string(),
        ..Header::default()
    };
    w.write_header(&mut hdr).unwrap();
    w.write_all(b"Hello World!\n").unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    assert_eq!(out.len() % 4, 0);

    let mut r = Reader::new(out.as_slice());
    let entries = parse_all(&mut r);
    assert_eq!(names(&entries), [".", "helloworld.txt", "TRAILER!!!"]);

    let (file, data) = &entries[1];
    assert_eq!(file.magic, Magic::Newc);
    assert_eq!(file.mode, Mode::FILE | 0o644);
    assert_eq!(file.uid, 0);
    assert_eq!(file.gid, 0);
    assert_eq!(file.nlink, 1);
    assert_eq!(file.mtime, 1_136_214_245);
    assert_eq!(file.data_size, 13);
    assert_eq!(data.as_slice(), b"Hello World!\n");

    assert!(entries[2].0.is_trailer());
    assert_eq!(r.continue_compressed(None).unwrap(), NextSegment::Eof);
}

#[test]
fn test_prepended_padding_is_skipped() {
    let archive = build_archive(&[("helloworld.txt", b"Hello World!\n")]);

    for pad in [1usize, 3, 512, 1024] {
        let mut padded = vec![0u8; pad];
        padded.extend_from_slice(&archive);

        let mut plain = Reader::new(archive.as_slice());
        let mut shifted = Reader::new(padded.as_slice());
        let expect = parse_all(&mut plain);
        let got = parse_all(&mut shifted);

        assert_eq!(names(&got), names(&expect), "pad {pad}");
        assert_eq!(got[1].1, expect[1].1, "pad {pad}");
    }
}

#[test]
fn test_parent_directory_emission_order() {
    let archive = build_archive(&[
        ("/lib/modules/kernel/drivers/net/e1000.ko", &[b'A'; 40]),
        ("/lib/linux/version", b"6.8\n"),
    ]);

    let mut r = Reader::new(archive.as_slice());
    let entries = parse_all(&mut r);
    assert_eq!(
        names(&entries),
        [
            ".",
            "lib",
            "lib/modules",
            "lib/modules/kernel",
            "lib/modules/kernel/drivers",
            "lib/modules/kernel/drivers/net",
            "lib/modules/kernel/drivers/net/e1000.ko",
            "lib/linux",
            "lib/linux/version",
            "TRAILER!!!",
        ]
    );

    // Auto-created directories come out with the default permissions.
    let lib = &entries[1].0;
    assert!(lib.mode.is_dir());
    assert_eq!(lib.mode.perms(), 0o700);
}

#[test]
fn test_single_deep_file_emits_each_parent_once() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    let mut first = file_header("a/b/c/d", 0);
    w.write_header(&mut first).unwrap();
    // A second member in the same tree re-emits nothing.
    let mut second = file_header("a/b/c/d2", 0);
    w.write_header(&mut second).unwrap();
    w.write_trailer().unwrap();

    // After a trailer, directory emission starts over.
    let mut third = file_header("a/b/e", 0);
    w.write_header(&mut third).unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::new(out.as_slice());
    let entries = parse_all(&mut r);
    assert_eq!(
        names(&entries),
        [
            ".",
            "a",
            "a/b",
            "a/b/c",
            "a/b/c/d",
            "a/b/c/d2",
            "TRAILER!!!",
            ".",
            "a",
            "a/b",
            "a/b/e",
            "TRAILER!!!",
        ]
    );
}

#[test]
fn test_microcode_data_alignment() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    // The AMD member also creates the kernel/x86/microcode directories,
    // so the alignment request below lands on the Intel header itself.
    let mut amd = file_header(MICROCODE_PATH_AUTHENTIC_AMD, 1024);
    amd.mode = Mode::FILE | 0o664;
    w.write_header(&mut amd).unwrap();
    w.write_all(&[0x11; 1024]).unwrap();

    w.set_data_alignment(MICROCODE_DATA_ALIGNMENT).unwrap();
    let mut intel = file_header(MICROCODE_PATH_GENUINE_INTEL, 3200);
    intel.mode = Mode::FILE | 0o664;
    w.write_header(&mut intel).unwrap();
    w.write_all(&[0x22; 3200]).unwrap();

    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::new(out.as_slice());
    let entries = parse_all(&mut r);

    let (intel, data) = entries
        .iter()
        .find(|(hdr, _)| hdr.filename == MICROCODE_PATH_GENUINE_INTEL)
        .unwrap();
    assert_eq!(intel.data_offset % MICROCODE_DATA_ALIGNMENT, 0);
    assert_eq!(intel.data_size, 3200);
    assert_eq!(data.len(), 3200);
}

#[test]
fn test_unreachable_data_alignment_fails() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    // Seed the root directory so the alignment applies to the next
    // member header rather than an auto-created one.
    let mut seed = file_header("seed", 0);
    w.write_header(&mut seed).unwrap();

    w.set_data_alignment(16).unwrap();

    // 110 + len("ab") + 1 = 113 is not a multiple of 4, so no amount of
    // leading padding can line the data up.
    let mut bad = file_header("ab", 0);
    assert!(matches!(
        w.write_header(&mut bad),
        Err(Error::BadDataAlignment)
    ));
}

#[test]
fn test_header_alignment() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    let mut seed = file_header("seed", 3);
    w.write_header(&mut seed).unwrap();
    w.write_all(b"abc").unwrap();

    w.set_header_alignment(64).unwrap();
    let mut aligned = file_header("aligned", 0);
    w.write_header(&mut aligned).unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::new(out.as_slice());
    let entries = parse_all(&mut r);
    let aligned = entries
        .iter()
        .map(|(hdr, _)| hdr)
        .find(|hdr| hdr.filename == "aligned")
        .unwrap();
    assert_eq!(aligned.header_offset % 64, 0);
}

// ============================================================================
// Wire-level guarantees
// ============================================================================

#[test]
fn test_four_byte_alignment_of_every_record() {
    let archive = build_archive(&[
        ("odd", b"x"),
        ("deep/nested/file.bin", &[7u8; 33]),
        ("another", b"yyyyy"),
    ]);
    assert_eq!(archive.len() % 4, 0);

    let mut r = Reader::new(archive.as_slice());
    for (hdr, _) in parse_all(&mut r) {
        assert_eq!(hdr.header_offset % 4, 0, "{}", hdr.filename);
        assert_eq!(hdr.data_offset % 4, 0, "{}", hdr.filename);
    }
}

#[test]
fn test_inode_monotonicity() {
    let archive = build_archive(&[
        ("a/one", b"1"),
        ("b/two", b"22"),
        ("c/three", b"333"),
    ]);

    let mut r = Reader::new(archive.as_slice());
    let inodes: Vec<u32> = parse_all(&mut r)
        .iter()
        .filter(|(hdr, _)| !hdr.is_trailer())
        .map(|(hdr, _)| hdr.inode)
        .collect();

    for pair in inodes.windows(2) {
        assert!(pair[0] < pair[1], "inodes not increasing: {inodes:?}");
    }
}

#[test]
fn test_checksum_field_roundtrip() {
    let payload = b"checksummed payload bytes";

    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);
    let mut hdr = Header {
        magic: Magic::NewcCrc,
        mode: Mode::FILE | 0o644,
        data_size: payload.len() as u32,
        checksum: compute_checksum(payload),
        filename: "summed".to_string(),
        ..Header::default()
    };
    w.write_header(&mut hdr).unwrap();
    w.write_all(payload).unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::new(out.as_slice());
    let entries = parse_all(&mut r);
    let (parsed, data) = entries
        .iter()
        .find(|(hdr, _)| hdr.filename == "summed")
        .unwrap();

    assert_eq!(parsed.magic, Magic::NewcCrc);
    assert!(parsed.magic.has_checksum());
    assert_eq!(parsed.checksum, compute_checksum(data));
}

// ============================================================================
// Concatenation and compression
// ============================================================================

#[test]
fn test_concatenated_archives_with_padding() {
    let first = build_archive(&[("x/y", b"first segment")]);
    let second = build_archive(&[("x/z", b"second segment")]);

    let mut stream = first;
    stream.extend_from_slice(&[0u8; 512]);
    stream.extend_from_slice(&second);

    let mut r = Reader::new(stream.as_slice());
    let entries = parse_all(&mut r);
    assert_eq!(
        names(&entries),
        [
            ".",
            "x",
            "x/y",
            "TRAILER!!!",
            ".",
            "x",
            "x/z",
            "TRAILER!!!",
        ]
    );
    assert_eq!(r.continue_compressed(None).unwrap(), NextSegment::Eof);
}

#[test]
fn test_compressed_segment_transition() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);

    let mut plain = file_header("plain.txt", 10);
    w.write_header(&mut plain).unwrap();
    w.write_all(b"uncompress").unwrap();
    w.write_trailer().unwrap();

    w.start_compression(gzip_writer).unwrap();

    let mut inner = file_header("inner.txt", 13);
    w.write_header(&mut inner).unwrap();
    w.write_all(b"inner payload").unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    // The compressed stream begins on a 512-byte boundary.
    let gzip_at = out
        .windows(2)
        .position(|pair| pair == [0x1f, 0x8b])
        .unwrap();
    assert_eq!(gzip_at % 512, 0);

    let mut r = Reader::new(out.as_slice());

    let mut outer = Vec::new();
    loop {
        match r.next_header() {
            Ok(Some(hdr)) => outer.push(hdr.filename),
            Err(Error::CompressedContentAhead) => break,
            other => panic!("expected compressed content, got {other:?}"),
        }
    }
    assert_eq!(outer, [".", "plain.txt", "TRAILER!!!"]);

    assert_eq!(
        r.continue_compressed(None).unwrap(),
        NextSegment::Compressed(Lookahead::Gzip)
    );

    let entries = parse_all(&mut r);
    assert_eq!(names(&entries), [".", "inner.txt", "TRAILER!!!"]);
    // Offsets restart inside the decompressed segment.
    assert_eq!(entries[0].0.header_offset, 0);
    assert_eq!(entries[1].1, b"inner payload");

    assert_eq!(r.continue_compressed(None).unwrap(), NextSegment::Eof);
}

#[test]
fn test_compressed_segment_without_codec_entry() {
    let mut out = Vec::new();
    let mut w = Writer::new(&mut out);
    w.write_trailer().unwrap();
    w.start_compression(gzip_writer).unwrap();
    w.write_trailer().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::new(out.as_slice());
    let trailer = r.next_header().unwrap().unwrap();
    assert!(trailer.is_trailer());
    assert!(matches!(
        r.next_header(),
        Err(Error::CompressedContentAhead)
    ));

    let empty = initramfs::CompressReaderMap::new();
    assert!(matches!(
        r.continue_compressed(Some(&empty)),
        Err(Error::NoCompressReader(Lookahead::Gzip))
    ));
}

#[test]
fn test_start_compression_twice_fails() {
    let mut w = Writer::new(Vec::new());
    w.start_compression(gzip_writer).unwrap();
    assert!(matches!(
        w.start_compression(gzip_writer),
        Err(Error::AlreadyCompressed)
    ));
}

// ============================================================================
// Property: arbitrary archives survive the round trip
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn name_strategy() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("valid regex")
    }

    fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..512)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_roundtrip_flat_archive(
            files in prop::collection::vec((name_strategy(), payload_strategy()), 1..8)
        ) {
            let mut out = Vec::new();
            let mut w = Writer::new(&mut out);
            for (i, (name, payload)) in files.iter().enumerate() {
                let mut hdr = Header {
                    mode: Mode::FILE | 0o640,
                    uid: i as u32,
                    gid: 2 * i as u32,
                    mtime: 1_700_000_000 + i as u32,
                    data_size: payload.len() as u32,
                    filename: name.clone(),
                    ..Header::default()
                };
                w.write_header(&mut hdr).unwrap();
                w.write_all(payload).unwrap();
            }
            w.write_trailer().unwrap();
            w.close().unwrap();
            drop(w);

            prop_assert_eq!(out.len() % 4, 0);

            let mut r = Reader::new(out.as_slice());
            let entries = parse_all(&mut r);

            // Leading "." directory, the files in order, then the trailer.
            prop_assert_eq!(entries.len(), files.len() + 2);
            prop_assert_eq!(entries[0].0.filename.as_str(), ".");
            prop_assert!(entries[entries.len() - 1].0.is_trailer());

            for (i, (name, payload)) in files.iter().enumerate() {
                let (hdr, data) = &entries[i + 1];
                prop_assert_eq!(&hdr.filename, name);
                prop_assert_eq!(hdr.mode, Mode::FILE | 0o640);
                prop_assert_eq!(hdr.uid, i as u32);
                prop_assert_eq!(hdr.gid, 2 * i as u32);
                prop_assert_eq!(hdr.nlink, 1);
                prop_assert_eq!(hdr.mtime, 1_700_000_000 + i as u32);
                prop_assert_eq!(hdr.data_size as usize, payload.len());
                prop_assert_eq!(data, payload);
                prop_assert_eq!(hdr.header_offset % 4, 0);
                prop_assert_eq!(hdr.data_offset % 4, 0);
            }
        }

        #[test]
        fn test_padding_prefix_is_transparent(pad in 0usize..2048) {
            let archive = build_archive(&[("file", b"payload")]);

            let mut padded = vec![0u8; pad];
            padded.extend_from_slice(&archive);

            let mut r = Reader::new(padded.as_slice());
            let entries = parse_all(&mut r);
            prop_assert_eq!(names(&entries), vec![".", "file", "TRAILER!!!"]);
        }
    }
}
