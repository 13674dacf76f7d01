//! Growable append-only byte file, the addressing substrate for every
//! higher layer: payload arena, row table and indexes are all just byte
//! ranges within one `BlobFile`.
use crate::error::{Error, Result};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

enum State {
    Writing(File),
    Mapped(Mmap),
}

/// Byte-addressed storage. Readable mapped or unmapped; writable only
/// while unmapped. `append` is atomic within the process (serialised by
/// the lock across seek-to-end + write).
pub struct BlobFile {
    path: std::path::PathBuf,
    state: RwLock<State>,
    size: RwLock<u64>,
}

impl BlobFile {
    /// Create (or truncate-open) a fresh blob file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(State::Writing(file)),
            size: RwLock::new(0),
        })
    }

    /// Current size of the underlying storage.
    pub fn size(&self) -> u64 {
        *self.size.read()
    }

    /// Append bytes, returning the offset at which they were written.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut state = self.state.write();
        let file = match &mut *state {
            State::Writing(f) => f,
            State::Mapped(_) => return Err(Error::State("append on mapped blob file".into())),
        };
        let off = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        *self.size.write() = off + bytes.len() as u64;
        Ok(off)
    }

    /// Overwrite bytes at `offset`. Used to patch the header once the
    /// image is complete.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let file = match &mut *state {
            State::Writing(f) => f,
            State::Mapped(_) => return Err(Error::State("write_at on mapped blob file".into())),
        };
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Random read of `len` bytes at `offset`. Works mapped or unmapped.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let state = self.state.read();
        match &*state {
            State::Mapped(m) => {
                let start = offset as usize;
                if start + len > m.len() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "read past end of mapped blob",
                    )));
                }
                Ok(m[start..start + len].to_vec())
            }
            State::Writing(f) => {
                let mut buf = vec![0u8; len];
                f.read_exact_at(&mut buf, offset)?;
                Ok(buf)
            }
        }
    }

    /// Memory-map the file for reading. Fails if the file is empty or
    /// already mapped.
    pub fn map(&self) -> Result<()> {
        let mut state = self.state.write();
        match &*state {
            State::Mapped(_) => return Err(Error::State("blob file already mapped".into())),
            State::Writing(f) => {
                if f.metadata()?.len() == 0 {
                    return Err(Error::State("cannot map an empty blob file".into()));
                }
                let mmap = unsafe { Mmap::map(f)? };
                *state = State::Mapped(mmap);
            }
        }
        Ok(())
    }

    /// Drop the memory map, returning the file to a writable state.
    pub fn unmap(&self) -> Result<()> {
        let mut state = self.state.write();
        if matches!(&*state, State::Writing(_)) {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *state = State::Writing(file);
        Ok(())
    }

    /// True while the blob is memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(&*self.state.read(), State::Mapped(_))
    }

    /// Read a little-endian `u64` at `offset`.
    pub fn read_u64_at(&self, offset: u64) -> Result<u64> {
        let bytes = self.read(offset, 8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Write a little-endian `u64` at `offset`.
    pub fn write_u64_at(&self, offset: u64, val: u64) -> Result<()> {
        self.write_at(offset, &val.to_le_bytes())
    }

    /// Append a NUL-terminated string, returning its offset.
    pub fn append_cstr(&self, bytes: &[u8]) -> Result<u64> {
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.extend_from_slice(bytes);
        buf.push(0);
        self.append(&buf)
    }

    /// Read a NUL-terminated string starting at `offset` (NUL excluded).
    pub fn read_cstr_at(&self, offset: u64) -> Result<Vec<u8>> {
        let state = self.state.read();
        match &*state {
            State::Mapped(m) => {
                let start = offset as usize;
                let end = m[start..]
                    .iter()
                    .position(|&b| b == 0)
                    .map(|p| start + p)
                    .ok_or_else(|| {
                        Error::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "unterminated string in blob",
                        ))
                    })?;
                Ok(m[start..end].to_vec())
            }
            State::Writing(f) => {
                let mut out = Vec::new();
                let mut pos = offset;
                let mut byte = [0u8; 1];
                loop {
                    f.read_exact_at(&mut byte, pos)?;
                    if byte[0] == 0 {
                        break;
                    }
                    out.push(byte[0]);
                    pos += 1;
                }
                Ok(out)
            }
        }
    }
}

/// Narrow contract for reading arena bytes, satisfied by both the
/// write-phase [`BlobFile`] (used by the loader) and the read-phase
/// [`crate::image::Image`] (used by queries). Lets column codecs work
/// identically during ingestion and during lookup.
pub trait ByteSource {
    fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8>;
    fn read_cstr(&self, offset: u64) -> Vec<u8>;
}

impl ByteSource for BlobFile {
    fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        self.read(offset, len).unwrap_or_default()
    }
    fn read_cstr(&self, offset: u64) -> Vec<u8> {
        self.read_cstr_at(offset).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn append_returns_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let b = BlobFile::create(&path).unwrap();
        let o1 = b.append(b"hello").unwrap();
        let o2 = b.append(b"world!").unwrap();
        assert_eq!(o1, 0);
        assert_eq!(o2, 5);
        assert_eq!(b.size(), 11);
        assert_eq!(b.read(o2, 6).unwrap(), b"world!");
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn map_requires_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let b = BlobFile::create(&path).unwrap();
        assert!(b.map().is_err());
        b.append(b"x").unwrap();
        assert!(b.map().is_ok());
        assert!(b.write_at(0, b"y").is_err());
    }

    #[test]
    fn cstr_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let b = BlobFile::create(&path).unwrap();
        let off = b.append_cstr(b"hello").unwrap();
        assert_eq!(b.read_cstr_at(off).unwrap(), b"hello");
        b.map().unwrap();
        assert_eq!(b.read_cstr_at(off).unwrap(), b"hello");
    }
}
