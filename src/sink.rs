//! Response sink: the narrow interface the query dispatcher writes
//! through, decoupled from whatever serialisation the host wraps around
//! it (JSON, a templated page, a wire protocol — none of the core's
//! concern).
use std::time::SystemTime;

pub trait ResponseSink {
    fn set_last_modified(&mut self, t: SystemTime);
    fn set_count(&mut self, n: usize);
    fn set_expires(&mut self, t: SystemTime) {
        let _ = t;
    }

    /// Start a tabular response with the given ordered column names.
    fn begin(&mut self, column_names: &[String]);
    /// One cell, in column order; one call per column per row.
    fn push(&mut self, cell: &str);

    /// A single-value response (used for `row/N` style point lookups that
    /// resolve to exactly one field, or netv4 matches).
    fn set(&mut self, column_name: &str, value: &str);
}

/// In-memory sink, useful for tests and for embedding callers that want a
/// plain data structure rather than a streaming protocol.
#[derive(Default, Debug)]
pub struct VecSink {
    pub last_modified: Option<SystemTime>,
    pub expires: Option<SystemTime>,
    pub count: Option<usize>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub fields: Vec<(String, String)>,
    current_row: Vec<String>,
}

impl ResponseSink for VecSink {
    fn set_last_modified(&mut self, t: SystemTime) {
        self.last_modified = Some(t);
    }
    fn set_count(&mut self, n: usize) {
        self.count = Some(n);
    }
    fn set_expires(&mut self, t: SystemTime) {
        self.expires = Some(t);
    }
    fn begin(&mut self, column_names: &[String]) {
        self.columns = column_names.to_vec();
    }
    fn push(&mut self, cell: &str) {
        self.current_row.push(cell.to_string());
        if self.current_row.len() == self.columns.len() {
            self.rows.push(std::mem::take(&mut self.current_row));
        }
    }
    fn set(&mut self, column_name: &str, value: &str) {
        self.fields.push((column_name.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_groups_cells_into_rows() {
        let mut sink = VecSink::default();
        sink.begin(&["id".to_string(), "name".to_string()]);
        sink.push("1");
        sink.push("alice");
        sink.push("2");
        sink.push("bob");
        assert_eq!(
            sink.rows,
            vec![
                vec!["1".to_string(), "alice".to_string()],
                vec!["2".to_string(), "bob".to_string()],
            ]
        );
    }
}
