//! Ingestion pipeline: reads CSV-dialect source files, merges them on the
//! primary key, deduplicates payloads, and writes the on-disk image
//! described in `spec.md` §3.
use crate::blob::BlobFile;
use crate::dedup::Deduplicator;
use crate::error::{Error, Result};
use crate::image::{Image, HEADER_SIZE};
use crate::schema::Schema;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Loader<'a> {
    schema: &'a Schema,
}

impl<'a> Loader<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Build a fresh image in `work_dir` and return it mapped and ready to
    /// publish. Construction is all-or-nothing: any error here must leave
    /// no partially-built image for the caller to mistake for a real one.
    pub fn build(&self, work_dir: &Path) -> Result<Image> {
        let sources = self.collect_sources()?;
        if sources.is_empty() {
            return Err(Error::NoSources);
        }

        let tmp_path = work_dir.join(format!(
            "{}-{}-{}.image.tmp",
            self.schema.name,
            std::process::id(),
            now_secs()
        ));
        let blob = BlobFile::create(&tmp_path)?;
        // Zeroed placeholder header: primary_offset == 0 marks "not ready"
        // even to an external observer of the half-written file (I3).
        blob.append(&[0u8; HEADER_SIZE as usize])?;

        for (path, mtime) in &sources {
            blob.append_cstr(path.to_string_lossy().as_bytes())?;
            blob.append(&mtime_secs(*mtime).to_le_bytes())?;
        }
        blob.append(&[0u8])?; // manifest terminator

        let dedup = Deduplicator::new(&blob);
        let n_cols = self.schema.n_cols();
        let primary_idx = self.schema.primary_indices();

        let mut order: Vec<Vec<u64>> = Vec::new();
        let mut merge_index: FxHashMap<Vec<u64>, usize> = FxHashMap::default();

        for (path, _mtime) in &sources {
            match self.load_file(path, &dedup, &mut order, &mut merge_index, &primary_idx, n_cols) {
                Ok(()) => {}
                Err(Error::Io(e)) => {
                    log::warn!("skipping unreadable source file {}: {e}", path.display());
                }
                Err(e) => return Err(e),
            }
        }

        order.sort_by(|a, b| self.compare_composite(&blob, &primary_idx, a, b));

        let primary_offset = blob.append(&(order.len() as u64).to_le_bytes())?;
        let mut row_addrs = Vec::with_capacity(order.len());
        for row in &order {
            let addr = blob.size();
            for cell in row {
                blob.append(&cell.to_le_bytes())?;
            }
            row_addrs.push(addr);
        }

        let index_cols = self.schema.index_indices();
        let mut index_dir: Vec<(usize, u64)> = Vec::with_capacity(index_cols.len());
        for &col in &index_cols {
            let kind = &*self.schema.columns[col].kind;
            let mut members: Vec<usize> = (0..order.len())
                .filter(|&i| !kind.is_null(order[i][col]))
                .collect();
            members.sort_by(|&i, &j| {
                let (a, b) = (order[i][col], order[j][col]);
                if kind.less(&blob, a, b) {
                    Ordering::Less
                } else if kind.less(&blob, b, a) {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            });
            let ix_off = blob.append(&(members.len() as u64).to_le_bytes())?;
            for i in members {
                blob.append(&row_addrs[i].to_le_bytes())?;
            }
            index_dir.push((col, ix_off));
        }

        let index_dir_offset = blob.size();
        for (col, off) in &index_dir {
            blob.append(&(*col as u64).to_le_bytes())?;
            blob.append(&off.to_le_bytes())?;
        }

        blob.write_u64_at(0, now_secs())?;
        blob.write_u64_at(8, primary_offset)?;
        blob.write_u64_at(16, n_cols as u64)?;
        blob.write_u64_at(24, index_dir.len() as u64)?;
        blob.write_u64_at(32, index_dir_offset)?;

        blob.map()?;
        Image::open(blob)
    }

    fn collect_sources(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(&self.schema.sources_from)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.schema.filespec.is_match(&name) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
            let mtime = meta.modified()?;
            found.push((entry.path().to_path_buf(), mtime));
        }
        found.sort();
        Ok(found)
    }

    fn load_file(
        &self,
        path: &Path,
        dedup: &Deduplicator,
        order: &mut Vec<Vec<u64>>,
        merge_index: &mut FxHashMap<Vec<u64>, usize>,
        primary_idx: &[usize],
        n_cols: usize,
    ) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        let header_line = match lines.next() {
            Some(l) => l,
            None => return Ok(()), // empty file: nothing to load, not an error.
        };
        let headers = split_csv(header_line).map_err(|msg| Error::Parse {
            path: path.to_path_buf(),
            msg,
        })?;
        let mapping: Vec<Option<usize>> = headers
            .iter()
            .map(|h| self.schema.col_index(h.trim()))
            .collect();

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Stop at the first empty line within a file. Preserved
                // from the original implementation unexplained; see
                // DESIGN.md.
                break;
            }
            let fields = split_csv(trimmed).map_err(|msg| Error::Parse {
                path: path.to_path_buf(),
                msg,
            })?;

            let mut row = vec![0u64; n_cols];
            for (i, col_opt) in mapping.iter().enumerate() {
                if let Some(col) = *col_opt {
                    let text = fields.get(i).map(|s| s.as_str()).unwrap_or("");
                    row[col] = self.schema.columns[col].kind.encode(dedup, text)?;
                }
            }

            let key: Vec<u64> = primary_idx.iter().map(|&c| row[c]).collect();
            if let Some(&idx) = merge_index.get(&key) {
                for (c, cell) in row.into_iter().enumerate() {
                    if !primary_idx.contains(&c) {
                        order[idx][c] = cell;
                    }
                }
            } else {
                merge_index.insert(key, order.len());
                order.push(row);
            }
        }
        Ok(())
    }

    fn compare_composite(
        &self,
        blob: &BlobFile,
        primary_idx: &[usize],
        a: &[u64],
        b: &[u64],
    ) -> Ordering {
        for &col in primary_idx {
            let kind = &*self.schema.columns[col].kind;
            let (ca, cb) = (a[col], b[col]);
            if kind.less(blob, ca, cb) {
                return Ordering::Less;
            }
            if kind.less(blob, cb, ca) {
                return Ordering::Greater;
            }
        }
        Ordering::Equal
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn mtime_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Split one CSV-dialect line into fields: `;` delimiter, `"..."` quoting
/// with no embedded-quote escape, whitespace after a delimiter skipped.
/// Mirrors the original loader's `split()` exactly (see DESIGN.md).
fn split_csv(line: &str) -> std::result::Result<Vec<String>, String> {
    let bytes = line.as_bytes();
    let n = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        if bytes[i] == b'"' {
            i += 1;
            let start = i;
            while i < n && bytes[i] != b'"' {
                i += 1;
            }
            if i >= n {
                return Err("unbalanced '\"' delimiter".to_string());
            }
            out.push(line[start..i].to_string());
            i += 1;
            while i < n && bytes[i] != b';' {
                i += 1;
            }
        } else {
            let start = i;
            while i < n && bytes[i] != b';' {
                i += 1;
            }
            out.push(line[start..i].to_string());
        }
        if i < n {
            i += 1; // skip delimiter
        } else {
            break;
        }
        while i < n && (bytes[i] as char).is_whitespace() {
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_basic() {
        assert_eq!(split_csv("1;alice;true").unwrap(), vec!["1", "alice", "true"]);
    }

    #[test]
    fn split_quoted_field() {
        assert_eq!(
            split_csv("1;\"hello; world\";x").unwrap(),
            vec!["1", "hello; world", "x"]
        );
    }

    #[test]
    fn split_unbalanced_quote_errors() {
        assert!(split_csv("1;\"oops").is_err());
    }

    #[test]
    fn split_skips_space_after_delimiter() {
        assert_eq!(split_csv("1;  alice").unwrap(), vec!["1", "alice"]);
    }

    /// P5: loading file A then file B merges on the primary key the same
    /// way a single concatenated file would, with later files winning on
    /// non-primary columns.
    #[test]
    fn primary_key_merge_across_files() {
        use crate::schema::descriptor::SchemaDescriptor;

        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        std::fs::create_dir_all(&src_dir).unwrap();
        // File "a" is alphabetically first, so it loads before "b" and "b"
        // should win on the overlapping key (id=2).
        std::fs::write(src_dir.join("a.csv"), "id;name\n1;alice\n2;bob-old\n").unwrap();
        std::fs::write(src_dir.join("b.csv"), "id;name\n2;bob-new\n3;carol\n").unwrap();

        let descriptor_json = format!(
            r#"{{"name":"people","sources-from":"{}","columns":[
                {{"name":"id","type":"uint","primary":true}},
                {{"name":"name","type":"string"}}
            ]}}"#,
            src_dir.to_string_lossy()
        );
        let descriptor = SchemaDescriptor::from_json(&descriptor_json).unwrap();
        let schema = Schema::from_descriptor(&descriptor).unwrap();
        let loader = Loader::new(&schema);
        let image = loader.build(dir.path()).unwrap();

        assert_eq!(image.row_count, 3);
        let names: Vec<String> = (0..image.row_count)
            .map(|r| schema.columns[1].to_string(&image, image.row_cell(r, 1)))
            .collect();
        assert_eq!(names, vec!["alice", "bob-new", "carol"]);
    }
}
