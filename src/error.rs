//! The crate-wide error taxonomy, one `snafu` variant per kind.
//!
//! Every query either produces a complete result or returns exactly one of
//! these variants; the engine never partially recovers from an error and
//! never swallows one internally.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("column \"{column_name}\" does not exist in the collection's schema"))]
    SchemaMismatch { column_name: String },

    #[snafu(display("column \"{column_name}\" has logical type {column_type} but the predicate expects {expected}"))]
    SchemaTypeMismatch {
        column_name: String,
        column_type: String,
        expected: String,
    },

    #[snafu(display("plan shape is not supported in strict mode: {reason}"))]
    NotSupported { reason: String },

    #[snafu(display("operation requires at least one selected row but none were selected"))]
    EmptySequence,

    #[snafu(display("integer sum overflowed the destination type"))]
    SumOverflow,

    #[snafu(display("query was cancelled"))]
    Cancelled,

    #[snafu(display("could not allocate a selection bitmap for {n} rows: {reason}"))]
    CapacityExceeded { n: i64, reason: String },

    #[snafu(display("internal invariant violated: {detail}"))]
    Internal { detail: String },
}
