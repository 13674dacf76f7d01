use std::path::PathBuf;

/// Errors produced by the storage engine.
///
/// Query-time "no match" conditions (key not found, empty container) are
/// NOT represented here — those surface to the response sink as an empty
/// result. This type is for structural/IO failures only.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad schema descriptor: missing attribute, duplicate column, unknown
    /// type, no primary columns.
    #[error("schema error: {0}")]
    Schema(String),

    /// Underlying filesystem or mmap call failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV input (unbalanced quote, truncated row).
    #[error("parse error in {path}: {msg}")]
    Parse { path: PathBuf, msg: String },

    /// Invalid IPv4 literal, unparseable integer, etc.
    #[error("value error: {0}")]
    Value(String),

    /// The filtered set of source files was empty.
    #[error("no source files matched")]
    NoSources,

    /// Operation invalid for the current state of a blob file or container
    /// (writing to a mapped file, mapping an empty file, rebuild already in
    /// progress).
    #[error("state error: {0}")]
    State(String),

    /// Container or row lookup resolved to nothing.
    #[error("not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
