//! Row cursors over an [`Image`]. A cursor is driven by a [`Handler`] that
//! decides which address sequence it walks — the primary row table, a
//! named secondary index, or an explicit list of row addresses handed in
//! by a query — so the rest of the crate never branches on "which kind of
//! scan is this" (see `spec.md`'s Design Notes on handler-based cursors).
use crate::image::Image;
use crate::schema::Schema;
use std::cmp::Ordering;
use std::sync::Arc;

pub enum Handler {
    Primary,
    Column(usize),
    Custom(Vec<u64>),
}

/// Composite comparison of the primary-key columns against `key`, walking
/// the key left to right and handing each column only the suffix the
/// previous column didn't consume (`spec.md` §4.3).
pub fn composite_compare(schema: &Schema, image: &Image, addr: u64, cols: &[usize], key: &str) -> Ordering {
    let mut rest = key;
    for &col in cols {
        let cell = image.cell_at(addr, col);
        let (ord, consumed) = schema.columns[col].compare_prefix(image, cell, rest);
        if ord != Ordering::Equal {
            return ord;
        }
        let byte_len: usize = rest.chars().take(consumed).map(char::len_utf8).sum();
        rest = &rest[byte_len..];
    }
    Ordering::Equal
}

/// First row ordinal whose composite primary key is `>= key`, via binary
/// search over the (already sorted) row table (P3).
pub fn bisect_primary(schema: &Schema, image: &Image, key: &str) -> usize {
    let cols = schema.primary_indices();
    let mut lo = 0usize;
    let mut hi = image.row_count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let addr = image.row_addr(mid);
        if composite_compare(schema, image, addr, &cols, key) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// A cursor over one address sequence of an image. Positions before the
/// first row are represented by `pos == -1`; `advance`/`retreat` clamp at
/// the sequence's ends rather than wrapping.
pub struct RowIter {
    image: Arc<Image>,
    handler: Handler,
    pos: i64,
    len: usize,
}

impl RowIter {
    pub fn new(image: Arc<Image>, handler: Handler) -> Self {
        let len = match &handler {
            Handler::Primary => image.row_count,
            Handler::Column(col) => image.index_len(*col),
            Handler::Custom(v) => v.len(),
        };
        Self { image, handler, pos: -1, len }
    }

    fn addr_at(&self, pos: usize) -> Option<u64> {
        match &self.handler {
            Handler::Primary => {
                if pos < self.image.row_count {
                    Some(self.image.row_addr(pos))
                } else {
                    None
                }
            }
            Handler::Column(col) => self.image.index_row_addr(*col, pos),
            Handler::Custom(addrs) => addrs.get(pos).copied(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_valid(&self) -> bool {
        self.pos >= 0 && (self.pos as usize) < self.len
    }

    pub fn current_addr(&self) -> Option<u64> {
        if self.is_valid() {
            self.addr_at(self.pos as usize)
        } else {
            None
        }
    }

    /// Move to the next row, if any. Returns whether the cursor landed on
    /// a valid row.
    pub fn advance(&mut self) -> bool {
        if self.pos < self.len as i64 {
            self.pos += 1;
        }
        self.is_valid()
    }

    /// Move to the previous row, if any.
    pub fn retreat(&mut self) -> bool {
        if self.pos >= 0 {
            self.pos -= 1;
        }
        self.is_valid()
    }

    /// Position just before the first row whose primary key is `>= key`.
    /// Only meaningful for a `Primary` handler; the caller advances once
    /// to land on it, then checks [`RowIter::matches_primary_prefix`] on
    /// each subsequent row to know when the matching run ends.
    pub fn seek_primary_prefix(&mut self, schema: &Schema, key: &str) {
        let start = bisect_primary(schema, &self.image, key);
        self.pos = start as i64 - 1;
    }

    pub fn matches_primary_prefix(&self, schema: &Schema, key: &str) -> bool {
        match self.current_addr() {
            Some(addr) => {
                composite_compare(schema, &self.image, addr, &schema.primary_indices(), key) == Ordering::Equal
            }
            None => false,
        }
    }

    pub fn value(&self, schema: &Schema, col: usize) -> Option<String> {
        let addr = self.current_addr()?;
        let cell = self.image.cell_at(addr, col);
        Some(schema.columns[col].to_string(&*self.image, cell))
    }

    pub fn row_ord(&self) -> Option<usize> {
        self.current_addr().map(|a| self.image.row_ord_of(a))
    }
}
