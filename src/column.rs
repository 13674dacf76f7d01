//! Column type family. Each [`ColumnType`] knows how to parse text into a
//! row-table cell (a single `u64` word — the value itself for fixed-width
//! scalars, an arena offset for variable-length strings), compare cells,
//! and render a cell back to text.
use crate::blob::ByteSource;
use crate::dedup::Deduplicator;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::net::Ipv4Addr;

/// Sentinel cell value meaning "no value stored here" — used by secondary
/// indexes to decide membership (I2) and by the netv4 engine.
pub const NULL_CELL: u64 = 0;

pub trait ColumnType: Send + Sync {
    /// 0 for variable-length strings, otherwise the scalar's byte width
    /// (always a full word here — see Design Notes on cell aliasing).
    fn fixed_size(&self) -> usize;

    /// Parse `text`, encode it, and return the cell value to store in the
    /// row table (deduplicating through `dedup` for variable-length data).
    fn encode(&self, dedup: &Deduplicator, text: &str) -> Result<u64>;

    /// Total order over two cells of this type, used for row-table and
    /// index sorting (I1, I2).
    fn less(&self, src: &dyn ByteSource, a: u64, b: u64) -> bool;

    /// Natural (unpadded) textual rendering of a cell.
    fn natural_string(&self, src: &dyn ByteSource, cell: u64) -> String;

    /// Numeric value of a cell, for columns with a numeric total order.
    /// `None` for strings.
    fn numeric(&self, src: &dyn ByteSource, cell: u64) -> Option<i128>;

    /// Parse `text` as this column's numeric domain. `None` for strings or
    /// on parse failure.
    fn parse_numeric(&self, text: &str) -> Option<i128>;

    /// Whether `cell` is the null/unset sentinel (I2).
    fn is_null(&self, cell: u64) -> bool {
        cell == NULL_CELL
    }
}

fn case_insensitive_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

pub struct Int32Column;
impl ColumnType for Int32Column {
    fn fixed_size(&self) -> usize {
        4
    }
    fn encode(&self, _dedup: &Deduplicator, text: &str) -> Result<u64> {
        let v: i32 = text
            .parse()
            .map_err(|_| Error::Value(format!("invalid int32 '{text}'")))?;
        Ok(v as u32 as u64)
    }
    fn less(&self, _src: &dyn ByteSource, a: u64, b: u64) -> bool {
        (a as u32 as i32) < (b as u32 as i32)
    }
    fn natural_string(&self, _src: &dyn ByteSource, cell: u64) -> String {
        (cell as u32 as i32).to_string()
    }
    fn numeric(&self, _src: &dyn ByteSource, cell: u64) -> Option<i128> {
        Some((cell as u32 as i32) as i128)
    }
    fn parse_numeric(&self, text: &str) -> Option<i128> {
        text.parse::<i32>().ok().map(|v| v as i128)
    }
}

pub struct UInt32Column;
impl ColumnType for UInt32Column {
    fn fixed_size(&self) -> usize {
        4
    }
    fn encode(&self, _dedup: &Deduplicator, text: &str) -> Result<u64> {
        let v: u32 = text
            .parse()
            .map_err(|_| Error::Value(format!("invalid uint32 '{text}'")))?;
        Ok(v as u64)
    }
    fn less(&self, _src: &dyn ByteSource, a: u64, b: u64) -> bool {
        (a as u32) < (b as u32)
    }
    fn natural_string(&self, _src: &dyn ByteSource, cell: u64) -> String {
        (cell as u32).to_string()
    }
    fn numeric(&self, _src: &dyn ByteSource, cell: u64) -> Option<i128> {
        Some((cell as u32) as i128)
    }
    fn parse_numeric(&self, text: &str) -> Option<i128> {
        text.parse::<u32>().ok().map(|v| v as i128)
    }
}

pub struct BoolColumn;
impl ColumnType for BoolColumn {
    fn fixed_size(&self) -> usize {
        1
    }
    fn encode(&self, _dedup: &Deduplicator, text: &str) -> Result<u64> {
        match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" => Ok(1),
            "0" | "false" | "f" | "no" | "" => Ok(0),
            _ => Err(Error::Value(format!("invalid bool '{text}'"))),
        }
    }
    fn less(&self, _src: &dyn ByteSource, a: u64, b: u64) -> bool {
        a < b
    }
    fn natural_string(&self, _src: &dyn ByteSource, cell: u64) -> String {
        if cell != 0 { "true" } else { "false" }.to_string()
    }
    fn numeric(&self, _src: &dyn ByteSource, cell: u64) -> Option<i128> {
        Some(cell as i128)
    }
    fn parse_numeric(&self, text: &str) -> Option<i128> {
        match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" => Some(1),
            "0" | "false" | "f" | "no" => Some(0),
            _ => None,
        }
    }
    fn is_null(&self, _cell: u64) -> bool {
        // Bool has no null sentinel distinct from `false`; it is never a
        // valid secondary-index column in practice, but if declared as
        // one, treat every row as present.
        false
    }
}

pub struct Ipv4Column;
impl ColumnType for Ipv4Column {
    fn fixed_size(&self) -> usize {
        4
    }
    fn encode(&self, _dedup: &Deduplicator, text: &str) -> Result<u64> {
        let addr: Ipv4Addr = text
            .trim()
            .parse()
            .map_err(|_| Error::Value(format!("invalid IPv4 literal '{text}'")))?;
        // Stored host-order so numeric cell ordering gives ascending-IP
        // ordering regardless of platform endianness.
        Ok(u32::from(addr) as u64)
    }
    fn less(&self, _src: &dyn ByteSource, a: u64, b: u64) -> bool {
        (a as u32) < (b as u32)
    }
    fn natural_string(&self, _src: &dyn ByteSource, cell: u64) -> String {
        Ipv4Addr::from(cell as u32).to_string()
    }
    fn numeric(&self, _src: &dyn ByteSource, cell: u64) -> Option<i128> {
        Some((cell as u32) as i128)
    }
    fn parse_numeric(&self, text: &str) -> Option<i128> {
        text.trim().parse::<Ipv4Addr>().ok().map(|a| u32::from(a) as i128)
    }
}

pub struct StringColumn;
impl ColumnType for StringColumn {
    fn fixed_size(&self) -> usize {
        0
    }
    fn encode(&self, dedup: &Deduplicator, text: &str) -> Result<u64> {
        dedup.insert_cstr(text.as_bytes())
    }
    fn less(&self, src: &dyn ByteSource, a: u64, b: u64) -> bool {
        if a == b {
            return false;
        }
        let sa = src.read_cstr(a);
        let sb = src.read_cstr(b);
        sa < sb
    }
    fn natural_string(&self, src: &dyn ByteSource, cell: u64) -> String {
        if cell == NULL_CELL {
            return String::new();
        }
        String::from_utf8_lossy(&src.read_cstr(cell)).into_owned()
    }
    fn numeric(&self, _src: &dyn ByteSource, _cell: u64) -> Option<i128> {
        None
    }
    fn parse_numeric(&self, _text: &str) -> Option<i128> {
        None
    }
}

/// Build the type-specific codec for a type name from a schema descriptor.
pub fn column_type_for(name: &str) -> Result<Box<dyn ColumnType>> {
    match name {
        "int" => Ok(Box::new(Int32Column)),
        "uint" => Ok(Box::new(UInt32Column)),
        "bool" => Ok(Box::new(BoolColumn)),
        "ipv4" => Ok(Box::new(Ipv4Column)),
        "string" => Ok(Box::new(StringColumn)),
        other => Err(Error::Schema(format!("unknown column type '{other}'"))),
    }
}

/// Tri-valued prefix comparison plus the number of characters of `key`
/// consumed, per `spec.md` §4.3: shorter keys compare only their own
/// length; keys at least as long as the rendered column are compared in
/// full and consume exactly the column's rendered width.
pub fn compare_prefix(
    col: &dyn ColumnType,
    src: &dyn ByteSource,
    cell: u64,
    rendered: &str,
    key: &str,
) -> (Ordering, usize) {
    let col_len = rendered.chars().count();
    if key.chars().count() < col_len {
        // Shorter key: compare against the rendered value truncated to the
        // key's own length, so an exact prefix match yields Equal (a key
        // exhausted by an earlier column matches vacuously, length 0).
        let key_len = key.chars().count();
        let rendered_prefix: String = rendered.chars().take(key_len).collect();
        let ord = case_insensitive_cmp(key, &rendered_prefix);
        (ord, key_len)
    } else {
        let key_prefix: String = key.chars().take(col_len).collect();
        let ord = match (col.numeric(src, cell), col.parse_numeric(&key_prefix)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => case_insensitive_cmp(&key_prefix, rendered),
        };
        (ord, col_len)
    }
}
