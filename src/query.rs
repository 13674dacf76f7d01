//! Query dispatcher: resolves a `"/<container>/<rest>"` request path into
//! rows pushed through a [`ResponseSink`] (§4.7).
pub mod netv4;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::iter::{Handler, RowIter};
use crate::registry::Registry;
use crate::schema::Schema;
use crate::sink::ResponseSink;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Resolve `path` against `registry` and drive `sink` with the result.
/// Key-not-found and empty-container cases are "no match" — zero rows,
/// not an error. Unknown container names and malformed paths are errors.
pub fn handle(registry: &Registry, path: &str, sink: &mut dyn ResponseSink) -> Result<()> {
    let trimmed = path.trim_start_matches('/');
    let mut top = trimmed.splitn(2, '/');
    let container_name = top.next().filter(|s| !s.is_empty()).ok_or(Error::NotFound)?;
    let rest = top.next().unwrap_or("");

    let container = registry.get(container_name).ok_or_else(|| {
        log::debug!("unknown container '{container_name}' in path '{path}'");
        Error::NotFound
    })?;
    let schema = container.schema.clone();

    let image = match container.image() {
        Some(image) => image,
        None => {
            sink.set_count(0);
            return Ok(());
        }
    };
    sink.set_last_modified(image.updated);
    if let Some(ttl) = schema.expires {
        if let Some(t) = image.updated.checked_add(ttl) {
            sink.set_expires(t);
        }
    }

    if rest.is_empty() {
        return emit(&schema, &image, RowIter::new(image.clone(), Handler::Primary), sink);
    }

    if let Some(netv4) = &schema.netv4 {
        if let Ok(addr) = rest.parse::<Ipv4Addr>() {
            return match netv4::lookup(&schema, &image, netv4, addr) {
                Some(addr) => emit_single(&schema, &image, addr, sink),
                None => {
                    sink.set_count(0);
                    Ok(())
                }
            };
        }
    }

    if let Some(n) = rest.strip_prefix("row/") {
        let ord: usize = n
            .parse::<usize>()
            .map_err(|_| Error::Schema(format!("malformed row ordinal '{n}'")))?
            .checked_sub(1)
            .ok_or_else(|| Error::Schema("row ordinals are 1-based".to_string()))?;
        return if ord < image.row_count {
            emit_single(&schema, &image, image.row_addr(ord), sink)
        } else {
            sink.set_count(0);
            Ok(())
        };
    }

    if let Some(needle) = rest.strip_prefix("contains/") {
        let addrs = scan_contains(&schema, &image, None, needle);
        return emit(&schema, &image, RowIter::new(image.clone(), Handler::Custom(addrs)), sink);
    }

    let mut parts = rest.splitn(2, '/');
    let first = parts.next().unwrap_or("");
    if let Some(col) = schema.col_index(first) {
        let remainder = parts.next().unwrap_or("");
        // `col/contains/text` scopes a substring scan to this column
        // regardless of whether the column carries a secondary index —
        // that restriction only applies to the `col/text` prefix lookup
        // below, which needs an index to search (spec.md §4.7).
        if let Some(needle) = remainder.strip_prefix("contains/") {
            let addrs = scan_contains(&schema, &image, Some(col), needle);
            return emit(&schema, &image, RowIter::new(image.clone(), Handler::Custom(addrs)), sink);
        }
        if schema.columns[col].index {
            return emit_column_prefix(&schema, &image, col, remainder, sink);
        }
    }

    let mut it = RowIter::new(image.clone(), Handler::Primary);
    emit_primary_prefix(&schema, &image, &mut it, rest, sink)
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.columns.iter().map(|c| c.name.clone()).collect()
}

fn push_row(schema: &Schema, image: &Image, addr: u64, sink: &mut dyn ResponseSink) {
    for (i, col) in schema.columns.iter().enumerate() {
        let cell = image.cell_at(addr, i);
        sink.push(&col.to_string(image, cell));
    }
}

/// A result that addresses exactly one row (`row/N`, a netv4 match) uses
/// the single-value protocol (`spec.md` §4.8): one named `set` call per
/// column rather than the tabular `begin`/`push` pair multi-row results
/// use.
fn emit_single(schema: &Schema, image: &Image, addr: u64, sink: &mut dyn ResponseSink) -> Result<()> {
    for (i, col) in schema.columns.iter().enumerate() {
        let cell = image.cell_at(addr, i);
        sink.set(&col.name, &col.to_string(image, cell));
    }
    sink.set_count(1);
    Ok(())
}

fn emit(schema: &Schema, image: &Image, mut it: RowIter, sink: &mut dyn ResponseSink) -> Result<()> {
    sink.begin(&column_names(schema));
    let mut count = 0usize;
    while it.advance() {
        let addr = it.current_addr().expect("advance() returned true");
        push_row(schema, image, addr, sink);
        count += 1;
    }
    sink.set_count(count);
    Ok(())
}

fn emit_primary_prefix(
    schema: &Schema,
    image: &Image,
    it: &mut RowIter,
    key: &str,
    sink: &mut dyn ResponseSink,
) -> Result<()> {
    it.seek_primary_prefix(schema, key);
    sink.begin(&column_names(schema));
    let mut count = 0usize;
    while it.advance() && it.matches_primary_prefix(schema, key) {
        let addr = it.current_addr().expect("advance() returned true");
        push_row(schema, image, addr, sink);
        count += 1;
    }
    sink.set_count(count);
    Ok(())
}

fn emit_column_prefix(
    schema: &Schema,
    image: &Image,
    col: usize,
    key: &str,
    sink: &mut dyn ResponseSink,
) -> Result<()> {
    let start = bisect_column(schema, image, col, key);
    sink.begin(&column_names(schema));
    let mut pos = start;
    let mut count = 0usize;
    while let Some(addr) = image.index_row_addr(col, pos) {
        let cell = image.cell_at(addr, col);
        let (ord, _) = schema.columns[col].compare_prefix(image, cell, key);
        if ord != std::cmp::Ordering::Equal {
            break;
        }
        push_row(schema, image, addr, sink);
        count += 1;
        pos += 1;
    }
    sink.set_count(count);
    Ok(())
}

fn bisect_column(schema: &Schema, image: &Image, col: usize, key: &str) -> usize {
    let mut lo = 0usize;
    let mut hi = image.index_len(col);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let addr = match image.index_row_addr(col, mid) {
            Some(a) => a,
            None => break,
        };
        let cell = image.cell_at(addr, col);
        let (ord, _) = schema.columns[col].compare_prefix(image, cell, key);
        if ord == std::cmp::Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn scan_contains(schema: &Schema, image: &Image, only_col: Option<usize>, needle: &str) -> Vec<u64> {
    let needle_lower = needle.to_ascii_lowercase();
    let cols: Vec<usize> = match only_col {
        Some(c) => vec![c],
        None => (0..schema.n_cols()).collect(),
    };
    let mut found = Vec::new();
    for row_ord in 0..image.row_count {
        let addr = image.row_addr(row_ord);
        let hit = cols.iter().any(|&c| {
            let cell = image.cell_at(addr, c);
            schema.columns[c]
                .to_string(image, cell)
                .to_ascii_lowercase()
                .contains(&needle_lower)
        });
        if hit {
            found.push(addr);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::schema::descriptor::SchemaDescriptor;
    use crate::sink::VecSink;
    use std::fs;

    fn setup(columns_json: &str, csv: &str) -> (Registry, Arc<crate::schema::Container>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("a.csv"), csv).unwrap();

        let descriptor_json = format!(
            r#"{{"name": "db", "sources-from": "{}", {}}}"#,
            src_dir.to_string_lossy(),
            columns_json
        );
        let descriptor = SchemaDescriptor::from_json(&descriptor_json).unwrap();
        let schema = Schema::from_descriptor(&descriptor).unwrap();
        let container = crate::schema::Container::new(schema);
        container.load(dir.path()).unwrap();
        std::mem::forget(dir);

        let registry = Registry::new();
        registry.register(container.clone());
        (registry, container)
    }

    #[test]
    fn basic_primary_search() {
        let (reg, _c) = setup(
            r#""columns": [{"name":"id","type":"uint","primary":true},{"name":"name","type":"string"}]"#,
            "id;name\n1;alice\n2;bob\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/1", &mut sink).unwrap();
        assert_eq!(sink.rows, vec![vec!["1".to_string(), "alice".to_string()]]);

        let mut sink2 = VecSink::default();
        handle(&reg, "/db/3", &mut sink2).unwrap();
        assert!(sink2.rows.is_empty());
    }

    #[test]
    fn composite_primary_prefix() {
        let (reg, _c) = setup(
            r#""columns": [
                {"name":"a","type":"uint","primary":true,"length":3,"zero-fill":true},
                {"name":"b","type":"uint","primary":true,"length":3,"zero-fill":true},
                {"name":"x","type":"string"}
            ]"#,
            "a;b;x\n1;1;p\n1;2;q\n2;1;r\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/001", &mut sink).unwrap();
        let xs: Vec<&str> = sink.rows.iter().map(|r| r[2].as_str()).collect();
        assert_eq!(xs, vec!["p", "q"]);
    }

    #[test]
    fn secondary_index_lookup() {
        let (reg, _c) = setup(
            r#""columns": [{"name":"ip","type":"ipv4","primary":true},{"name":"label","type":"string","index":true}]"#,
            "ip;label\n10.0.0.1;red\n10.0.0.2;red\n10.0.0.3;blue\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/label/red", &mut sink).unwrap();
        let ips: Vec<&str> = sink.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn substring_scan() {
        let (reg, _c) = setup(
            r#""columns": [{"name":"ip","type":"ipv4","primary":true},{"name":"label","type":"string","index":true}]"#,
            "ip;label\n10.0.0.1;red\n10.0.0.2;red\n10.0.0.3;blue\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/contains/0.0.2", &mut sink).unwrap();
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(sink.rows[0][0], "10.0.0.2");
    }

    /// `col/contains/text` scopes a substring scan to `col` even when
    /// `col` carries no secondary index — that restriction applies only
    /// to the plain `col/text` prefix-lookup case.
    #[test]
    fn contains_scoped_to_non_indexed_column() {
        let (reg, _c) = setup(
            r#""columns": [
                {"name":"id","type":"uint","primary":true},
                {"name":"label","type":"string"}
            ]"#,
            "id;label\n1;red-fox\n2;blue-fox\n3;red-wolf\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/label/contains/fox", &mut sink).unwrap();
        let ids: Vec<&str> = sink.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn netv4_longest_match() {
        let (reg, _c) = setup(
            r#""columns": [
                {"name":"net","type":"ipv4","primary":true,"index":true},
                {"name":"mask","type":"ipv4"},
                {"name":"owner","type":"string"}
            ],
            "search-engine": "netv4",
            "network-from": "net",
            "mask-from": "mask",
            "index": "net""#,
            "net;mask;owner\n10.0.0.0;255.0.0.0;acme\n10.1.0.0;255.255.0.0;acme-east\n",
        );
        // A netv4 match addresses exactly one row, so it goes through the
        // single-value `set` protocol rather than `begin`/`push`.
        let mut sink = VecSink::default();
        handle(&reg, "/db/10.1.2.3", &mut sink).unwrap();
        assert_eq!(field(&sink, "owner"), "acme-east");

        let mut sink2 = VecSink::default();
        handle(&reg, "/db/10.9.9.9", &mut sink2).unwrap();
        assert_eq!(field(&sink2, "owner"), "acme");
    }

    fn field<'a>(sink: &'a VecSink, name: &str) -> &'a str {
        sink.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("no field named '{name}' set"))
    }

    /// `row/N` addresses exactly one row and so also goes through the
    /// single-value `set` protocol.
    #[test]
    fn row_by_ordinal_uses_single_value_protocol() {
        let (reg, _c) = setup(
            r#""columns": [{"name":"id","type":"uint","primary":true},{"name":"name","type":"string"}]"#,
            "id;name\n1;alice\n2;bob\n",
        );
        let mut sink = VecSink::default();
        handle(&reg, "/db/row/2", &mut sink).unwrap();
        assert_eq!(sink.count, Some(1));
        assert!(sink.rows.is_empty());
        assert_eq!(field(&sink, "id"), "2");
        assert_eq!(field(&sink, "name"), "bob");
    }
}
