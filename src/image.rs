//! Structured accessor for the on-disk image described in `spec.md` §3.
//! "Offset 0 is the header" is a contract enforced here once, not a raw
//! pointer cast scattered through the rest of the crate.
use crate::blob::{BlobFile, ByteSource};
use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Byte size of the fixed header record: updated, primary_offset,
/// columns, indexes.count, indexes.offset — five `u64` words.
pub const HEADER_SIZE: u64 = 5 * 8;

pub struct IndexSpan {
    pub offset: u64,
    pub count: usize,
}

/// Immutable, mmapped on-disk artifact for one container. Outlives any
/// iterator built against it by construction (iterators hold an `Arc`).
pub struct Image {
    blob: BlobFile,
    pub updated: SystemTime,
    pub sources: Vec<(PathBuf, SystemTime)>,
    pub primary_offset: u64,
    pub n_cols: usize,
    pub row_count: usize,
    pub indexes: FxHashMap<usize, IndexSpan>,
}

impl Image {
    pub(crate) fn open(blob: BlobFile) -> Result<Self> {
        let updated_secs = blob.read_u64_at(0)?;
        let primary_offset = blob.read_u64_at(8)?;
        let n_cols = blob.read_u64_at(16)? as usize;
        let index_count = blob.read_u64_at(24)? as usize;
        let index_dir_offset = blob.read_u64_at(32)?;

        if primary_offset == 0 {
            return Err(Error::State("image header marks build incomplete".into()));
        }

        // Source manifest immediately follows the header.
        let mut sources = Vec::new();
        let mut pos = HEADER_SIZE;
        loop {
            let name = blob.read_cstr_at(pos)?;
            if name.is_empty() {
                pos += 1;
                break;
            }
            pos += name.len() as u64 + 1;
            let mtime = blob.read_u64_at(pos)?;
            pos += 8;
            sources.push((
                PathBuf::from(String::from_utf8_lossy(&name).into_owned()),
                UNIX_EPOCH + Duration::from_secs(mtime),
            ));
        }

        let row_count = blob.read_u64_at(primary_offset)? as usize;

        let mut indexes = FxHashMap::default();
        for i in 0..index_count {
            let rec_off = index_dir_offset + (i as u64) * 16;
            let col_id = blob.read_u64_at(rec_off)? as usize;
            let ix_off = blob.read_u64_at(rec_off + 8)?;
            let count = blob.read_u64_at(ix_off)? as usize;
            indexes.insert(
                col_id,
                IndexSpan {
                    offset: ix_off + 8,
                    count,
                },
            );
        }

        Ok(Self {
            blob,
            updated: UNIX_EPOCH + Duration::from_secs(updated_secs),
            sources,
            primary_offset,
            n_cols,
            row_count,
            indexes,
        })
    }

    /// First cell of row `row_ord` within the row table.
    fn row_start(&self, row_ord: usize) -> u64 {
        self.primary_offset + 8 + (row_ord as u64) * (self.n_cols as u64) * 8
    }

    /// Absolute byte offset of a row's start, for addressing from
    /// secondary indexes and custom handlers.
    pub fn row_addr(&self, row_ord: usize) -> u64 {
        self.row_start(row_ord)
    }

    /// Row ordinal for a raw row address, inverse of [`Image::row_addr`].
    pub fn row_ord_of(&self, addr: u64) -> usize {
        ((addr - self.primary_offset - 8) / ((self.n_cols as u64) * 8)) as usize
    }

    /// Read one cell (`col` within `0..n_cols`) from the row starting at
    /// `addr`.
    pub fn cell_at(&self, addr: u64, col: usize) -> u64 {
        self.blob
            .read_u64_at(addr + (col as u64) * 8)
            .unwrap_or(0)
    }

    pub fn row_cell(&self, row_ord: usize, col: usize) -> u64 {
        self.cell_at(self.row_start(row_ord), col)
    }

    /// Row address at position `pos` of the secondary index for `col_id`.
    pub fn index_row_addr(&self, col_id: usize, pos: usize) -> Option<u64> {
        let span = self.indexes.get(&col_id)?;
        if pos >= span.count {
            return None;
        }
        self.blob.read_u64_at(span.offset + (pos as u64) * 8).ok()
    }

    pub fn index_len(&self, col_id: usize) -> usize {
        self.indexes.get(&col_id).map(|s| s.count).unwrap_or(0)
    }
}

impl ByteSource for Image {
    fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        self.blob.read_bytes(offset, len)
    }
    fn read_cstr(&self, offset: u64) -> Vec<u8> {
        self.blob.read_cstr(offset)
    }
}
