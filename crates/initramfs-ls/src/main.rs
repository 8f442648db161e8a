//! initramfs-ls - List the members of an initramfs cpio archive.
//!
//! Prints one long-listing line per member, resolving symlink targets
//! from the member data, and follows concatenated segments as well as
//! gzip/bzip2 compressed ones.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use initramfs::{Error, Header, NextSegment, Reader};

/// List the members of an initramfs cpio archive.
#[derive(Parser, Debug)]
#[command(name = "initramfs-ls", version, about)]
struct Cli {
    /// Archive file to list.
    archive: PathBuf,

    /// Hide trailer entries.
    #[arg(short = 'T', long)]
    hide_trailer: bool,

    /// Hide compressed-segment markers.
    #[arg(short = 'C', long)]
    hide_compression: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = File::open(&cli.archive)
        .with_context(|| format!("failed to open {:?}", cli.archive))?;
    let mut reader = Reader::new(BufReader::new(file));

    list(&mut reader, &cli).with_context(|| format!("failed to list {:?}", cli.archive))
}

fn list(reader: &mut Reader<'_>, cli: &Cli) -> Result<()> {
    loop {
        loop {
            let hdr = match reader.next_header() {
                Ok(Some(hdr)) => hdr,
                Ok(None) | Err(Error::CompressedContentAhead) => break,
                Err(err) => return Err(err.into()),
            };
            print_entry(reader, &hdr, cli)?;
        }

        match reader.continue_compressed(None)? {
            NextSegment::Eof => return Ok(()),
            NextSegment::Compressed(kind) => {
                if !cli.hide_compression {
                    println!("# compression {kind}");
                    println!();
                }
            }
            NextSegment::Plain(_) => {}
        }
    }
}

fn print_entry(reader: &mut Reader<'_>, hdr: &Header, cli: &Cli) -> Result<()> {
    if hdr.is_trailer() && cli.hide_trailer {
        return Ok(());
    }

    let mut suffix = String::new();
    if hdr.mode.is_symlink() {
        let mut target = Vec::new();
        reader.read_to_end(&mut target)?;
        suffix = format!(" -> {}", String::from_utf8_lossy(&target));
    }

    println!("{hdr}{suffix}");

    if hdr.is_trailer() {
        println!();
    }
    Ok(())
}
