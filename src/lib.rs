//! docket - prefixed records over a Tantivy full-text index.
//!
//! Records are built from unprefixed and prefixed text, boolean filter terms
//! and numeric slot values, then committed under a numeric id. Queries are
//! written with human-readable labels (`title:bicycle`, `colour:red`,
//! `price:10..20`) that a [`PrefixRegistry`] maps onto the prefixes and
//! slots the records were indexed with.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docket::{DocumentBuilder, PrefixRegistry, QueryExecutor};
//!
//! let path = "/var/lib/docket/index";
//!
//! DocumentBuilder::new(path)?
//!     .set_id(1)?
//!     .add_prefixed_text("red bicycle", "S")
//!     .add_boolean_term("XCred")
//!     .execute()?;
//!
//! let mut registry = PrefixRegistry::new();
//! registry
//!     .add_text_prefix("title", "S")?
//!     .add_boolean_prefix("colour", "XC")?;
//!
//! let mut executor = QueryExecutor::with_registry(path, Arc::new(registry));
//! executor.execute("title:bicycle colour:red")?;
//! while let Some(hit) = executor.get_next()? {
//!     println!("#{} {:.3}", hit.docid, hit.score);
//! }
//! # Ok::<(), docket::Error>(())
//! ```

pub mod config;
pub mod data_dir;
pub mod document;
pub mod error;
pub mod handle;
pub mod prefix;
pub mod query;
pub mod query_parser;
pub mod sortable;
pub mod stopper;
pub mod tantivy_index;

pub use data_dir::DataDir;
pub use document::DocumentBuilder;
pub use error::{Error, Result};
pub use handle::{AccessMode, IndexHandle};
pub use prefix::{PrefixRegistry, RangeProcessorKind};
pub use query::{FetchWindow, Match, MatchSet, QueryExecutor};
pub use stopper::Stopper;
pub use tantivy_index::{StemLanguage, StoredRecord};
