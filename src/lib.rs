//! rowstore: a read-mostly, in-memory tabular lookup engine.
//!
//! Ingests one or more delimited text files under a declarative schema —
//! column names, types, primary-key membership, secondary-index
//! membership, optional fixed-width rendering, aliases — merges and
//! deduplicates them into a compact binary image, memory-maps that image,
//! and answers point/prefix/substring/longest-prefix-match queries
//! against it without touching the source files again.
//!
//! Example program:
//! ```no_run
//! use rowstore::registry::Registry;
//! use rowstore::schema::{descriptor::SchemaDescriptor, Container, Schema};
//! use rowstore::sink::VecSink;
//! use std::path::Path;
//!
//! let descriptor = SchemaDescriptor::from_json(r#"{
//!     "name": "hosts",
//!     "sources-from": "/var/lib/rowstore/hosts",
//!     "columns": [
//!         {"name": "ip", "type": "ipv4", "primary": true},
//!         {"name": "hostname", "type": "string", "index": true}
//!     ]
//! }"#).unwrap();
//! let schema = Schema::from_descriptor(&descriptor).unwrap();
//! let container = Container::new(schema);
//! container.load(Path::new("/tmp")).unwrap();
//!
//! let registry = Registry::new();
//! registry.register(container);
//!
//! let mut sink = VecSink::default();
//! rowstore::query::handle(&registry, "/hosts/hostname/web", &mut sink).unwrap();
//! ```
//!
//! General design
//!
//! A [`blob::BlobFile`] is an append-only byte store during ingestion and
//! a memory-mapped, read-only byte store once built — [`blob::ByteSource`]
//! is the one interface column codecs need from either phase. A
//! [`dedup::Deduplicator`] sits in front of it so identical byte sequences
//! (most often repeated string values across source rows) are written
//! once and referenced by offset everywhere else.
//!
//! [`column::ColumnType`] encodes each schema column's scalar domain into
//! a single `u64` row-table cell — the value itself for fixed-width
//! types, an arena offset for strings — and knows how to compare, render,
//! and parse that domain. [`schema::Schema`] is the parsed, validated
//! column list plus source-discovery settings; [`schema::Container`]
//! pairs a schema with whatever image is currently active and swaps that
//! image atomically on [`schema::Container::load`].
//!
//! [`loader::Loader`] is the ingestion pipeline: it walks the schema's
//! source tree, parses each file's CSV dialect, merges rows by primary
//! key (last write wins on non-primary columns), sorts the result, builds
//! every secondary index, and writes the whole thing — manifest, rows,
//! indexes, directory — before patching the header as the final,
//! atomic-looking commit point. [`image::Image`] is the structured reader
//! for what the loader wrote.
//!
//! [`iter::RowIter`] is a cursor over one address sequence of an image —
//! the primary row table, one secondary index, or an explicit row list —
//! driven by a [`iter::Handler`]. [`query`] parses a request path into
//! the right handler and key, including the `netv4` longest-prefix-match
//! engine in [`query::netv4`], and drives a [`sink::ResponseSink`] with
//! the result. [`registry::Registry`] resolves a path's leading segment
//! to the container that serves it.
//!
//! Non-goals: concurrent writers, transactional updates, range queries
//! beyond prefix, joins across containers, query languages, persistence
//! across process restarts — the image is a rebuildable cache artifact.

pub mod blob;
pub mod column;
pub mod dedup;
pub mod error;
pub mod image;
pub mod iter;
pub mod loader;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sink;

pub use error::{Error, Result};
