//! Content-addressed payload storage over a [`BlobFile`].
use crate::blob::BlobFile;
use crate::error::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// FNV-1a 64 offset basis.
const FNV_OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
/// FNV-1a 64 prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Maps a byte payload to the offset of its first (and only) occurrence in
/// the arena. Guarded by a single mutex so ingestion can later be
/// parallelised across source files without redesign.
pub struct Deduplicator<'a> {
    blob: &'a BlobFile,
    index: Mutex<FxHashMap<(usize, u64), Vec<u64>>>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(blob: &'a BlobFile) -> Self {
        Self {
            blob,
            index: Mutex::new(FxHashMap::default()),
        }
    }

    /// Return the offset of `bytes` in the arena, writing it on first
    /// sight. Satisfies I5: repeated insertion of equal bytes always
    /// returns the offset of the first insertion.
    pub fn insert(&self, bytes: &[u8]) -> Result<u64> {
        let key = (bytes.len(), fnv1a(bytes));
        let mut index = self.index.lock();
        let candidates = index.entry(key).or_insert_with(Vec::new);
        for &off in candidates.iter() {
            if self.blob.read(off, bytes.len())? == bytes {
                return Ok(off);
            }
        }
        let off = self.blob.append(bytes)?;
        candidates.push(off);
        Ok(off)
    }

    /// Insert a NUL-terminated string (length = `strlen(s) + 1`).
    pub fn insert_cstr(&self, s: &[u8]) -> Result<u64> {
        let mut buf = Vec::with_capacity(s.len() + 1);
        buf.extend_from_slice(s);
        buf.push(0);
        self.insert(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_reuses_offset() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobFile::create(&dir.path().join("a.bin")).unwrap();
        let dedup = Deduplicator::new(&blob);
        let o1 = dedup.insert_cstr(b"hello").unwrap();
        let size_after_first = blob.size();
        let o2 = dedup.insert_cstr(b"hello").unwrap();
        assert_eq!(o1, o2);
        assert_eq!(blob.size(), size_after_first);
        let o3 = dedup.insert_cstr(b"world").unwrap();
        assert_ne!(o3, o1);
    }

    #[test]
    fn fnv_matches_reference_vector() {
        // FNV-1a 64 of the empty string is the offset basis.
        assert_eq!(fnv1a(b""), FNV_OFFSET);
    }
}
