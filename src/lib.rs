//! An immutable, columnar in-memory collection with a pushdown query engine.
//!
//! User records are converted once into a columnar record batch using the
//! Apache Arrow in-memory layout; queries are evaluated directly on columns
//! (predicate pushdown, zone-map skip-scanning, selectivity-based predicate
//! reordering, streaming short-circuit evaluation), producing object
//! instances only for rows that survive the selection.
//!
//! Record ingestion, Arrow IPC, a query surface syntax and source-generated
//! record accessors are all out of scope: this crate consumes a finished
//! [`arrow::record_batch::RecordBatch`], a `field_name -> column_index` map,
//! and a `materialize(row_index) -> T` callback.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::use_self,
    clippy::str_to_string,
    clippy::string_to_string
)]
#![allow(dead_code, clippy::too_many_arguments)]

mod aggregate;
mod batch;
mod bitmap;
mod cache;
pub mod column;
mod config;
mod error;
mod executor;
mod materialize;
mod plan;
mod predicate;
mod value;
mod zonemap;

pub use batch::{new_collection, Collection};
pub use cache::CacheStats;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use executor::{CancellationToken, QueryResult};
pub use plan::{
    AggregateOp, AggregateRequest, Analyzer, GroupBySpec, LogicalPredicate, LogicalQuery, Plan,
    ResolvedTerminal, Terminal,
};
pub use predicate::{ColumnPredicate, PredicateKind};
pub use value::{Decimal, LogicalType, Scalar};
pub use zonemap::ZoneMap;

pub use column::cmp::Operator;
pub use column::kernel::StringOp;
pub use column::Column;

/// Internal parts of the crate exposed for benchmarking and whitebox tests.
///
/// Should not be imported outside of this crate's own benches/tests.
pub mod benchmarks {
    pub use crate::aggregate::{self, AggregateResult, GroupByRequest};
    pub use crate::bitmap::{BufferPool, Initial, SelectionBitmap};
    pub use crate::materialize;
}
