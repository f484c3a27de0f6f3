//! I/O abstraction layer. `Io` is the one seam the parser uses to reach the
//! filesystem and the clock, so tests can swap in an in-memory filesystem or
//! a fixed clock without touching parser logic — the same role `Io` plays in
//! the codebase this crate is grounded on.

use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

pub mod binary_reader;

pub use binary_reader::{BinaryReader, Endianness};

/// Positioned (pread/pwrite-style) file access, so concurrent readers never
/// race on a shared file cursor.
pub trait FileExt: Send + Sync + 'static {
    fn len(&self) -> io::Result<u64>;
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
    fn sync_all(&self) -> io::Result<()>;

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut read = 0;
        while read != buf.len() {
            let n = self.read_at(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end-of-file"));
            }
            read += n;
        }
        Ok(())
    }

    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut written = 0;
        while written != buf.len() {
            written += self.write_at(&buf[written..], offset + written as u64)?;
        }
        Ok(())
    }
}

impl FileExt for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(nix::sys::uio::pread(self, buf, offset as i64)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        Ok(nix::sys::uio::pwrite(self, buf, offset as i64)?)
    }

    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }
}

/// The parser's only two ambient dependencies: a filesystem and a clock
/// (§9 "Global state"). Both have the fully enumerated init/serve/drain
/// lifecycle the spec calls for — `Io` itself is the "serve" surface; a host
/// constructs one at startup and drops it at shutdown.
pub trait Io: Send + Sync + 'static {
    type File: FileExt;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn open(&self, create_new: bool, read: bool, write: bool, path: &Path) -> io::Result<Self::File>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct StdIo(());

impl Io for StdIo {
    type File = File;

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn open(&self, create_new: bool, read: bool, write: bool, path: &Path) -> io::Result<Self::File> {
        std::fs::OpenOptions::new()
            .create_new(create_new)
            .create(!create_new && write)
            .read(read)
            .write(write)
            .open(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
