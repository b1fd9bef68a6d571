//! A thin logical-typing layer over Arrow array slices.
//!
//! `Column` tells the rest of the engine what logical type a physical Arrow
//! array represents, and exposes the handful of typed accessors the kernels
//! and aggregator need, without forcing every caller to match on Arrow's
//! physical array types directly.

pub mod cmp;
pub mod kernel;

use std::sync::Arc;

use arrow::array::{
    Array, BinaryArray, BooleanArray, Decimal128Array, DictionaryArray, Float64Array, Int64Array,
    StringArray, TimestampMillisecondArray, UInt64Array,
};
use arrow::datatypes::Int32Type;

use crate::value::LogicalType;

/// A single column's data for the whole batch (not sliced per chunk —
/// kernels and the zone map index into it with absolute row ids and
/// `[start_row, end_row)` half-open ranges).
#[derive(Clone)]
pub enum Column {
    Int64(Int64Array),
    UInt64(UInt64Array),
    Float64(Float64Array),
    /// Fixed-scale decimal; `scale` is the number of digits after the point.
    Decimal128 { values: Decimal128Array, scale: u8 },
    Boolean(BooleanArray),
    /// UTC timestamp in milliseconds since the epoch.
    Timestamp(TimestampMillisecondArray),
    Utf8(StringArray),
    Binary(BinaryArray),
    /// A dictionary-encoded string column: integer codes plus a distinct
    /// values dictionary.
    Utf8Dict(DictionaryArray<Int32Type>),
}

impl Column {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Self::Int64(_) => LogicalType::Int64,
            Self::UInt64(_) => LogicalType::UInt64,
            Self::Float64(_) => LogicalType::Float64,
            Self::Decimal128 { .. } => LogicalType::Decimal,
            Self::Boolean(_) => LogicalType::Boolean,
            Self::Timestamp(_) => LogicalType::Timestamp,
            Self::Utf8(_) => LogicalType::Utf8,
            Self::Binary(_) => LogicalType::Binary,
            Self::Utf8Dict(_) => LogicalType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int64(a) => a.len(),
            Self::UInt64(a) => a.len(),
            Self::Float64(a) => a.len(),
            Self::Decimal128 { values, .. } => values.len(),
            Self::Boolean(a) => a.len(),
            Self::Timestamp(a) => a.len(),
            Self::Utf8(a) => a.len(),
            Self::Binary(a) => a.len(),
            Self::Utf8Dict(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            Self::Int64(a) => a.null_count(),
            Self::UInt64(a) => a.null_count(),
            Self::Float64(a) => a.null_count(),
            Self::Decimal128 { values, .. } => values.null_count(),
            Self::Boolean(a) => a.null_count(),
            Self::Timestamp(a) => a.null_count(),
            Self::Utf8(a) => a.null_count(),
            Self::Binary(a) => a.null_count(),
            Self::Utf8Dict(a) => a.null_count(),
        }
    }

    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Int64(a) => a.is_null(row),
            Self::UInt64(a) => a.is_null(row),
            Self::Float64(a) => a.is_null(row),
            Self::Decimal128 { values, .. } => values.is_null(row),
            Self::Boolean(a) => a.is_null(row),
            Self::Timestamp(a) => a.is_null(row),
            Self::Utf8(a) => a.is_null(row),
            Self::Binary(a) => a.is_null(row),
            Self::Utf8Dict(a) => a.is_null(row),
        }
    }

    /// The Arrow validity bitmap backing this column, in the LSB-first
    /// `bit i of byte i/8, 1 = valid` format, or `None` if the column has
    /// no nulls at all.
    pub fn validity_bytes(&self) -> Option<&[u8]> {
        if self.null_count() == 0 {
            return None;
        }
        let data = match self {
            Self::Int64(a) => a.data(),
            Self::UInt64(a) => a.data(),
            Self::Float64(a) => a.data(),
            Self::Decimal128 { values, .. } => values.data(),
            Self::Boolean(a) => a.data(),
            Self::Timestamp(a) => a.data(),
            Self::Utf8(a) => a.data(),
            Self::Binary(a) => a.data(),
            Self::Utf8Dict(a) => a.data(),
        };
        data.null_buffer().map(|b| b.as_slice())
    }

    #[inline]
    pub fn value_i64(&self, row: usize) -> i64 {
        match self {
            Self::Int64(a) => a.value(row),
            Self::Timestamp(a) => a.value(row),
            _ => panic!("value_i64 called on non-integer column"),
        }
    }

    #[inline]
    pub fn value_u64(&self, row: usize) -> u64 {
        match self {
            Self::UInt64(a) => a.value(row),
            _ => panic!("value_u64 called on non-unsigned column"),
        }
    }

    #[inline]
    pub fn value_f64(&self, row: usize) -> f64 {
        match self {
            Self::Float64(a) => a.value(row),
            _ => panic!("value_f64 called on non-float column"),
        }
    }

    #[inline]
    pub fn value_decimal(&self, row: usize) -> (i128, u8) {
        match self {
            Self::Decimal128 { values, scale } => (values.value(row), *scale),
            _ => panic!("value_decimal called on non-decimal column"),
        }
    }

    #[inline]
    pub fn value_bool(&self, row: usize) -> bool {
        match self {
            Self::Boolean(a) => a.value(row),
            _ => panic!("value_bool called on non-boolean column"),
        }
    }

    /// The packed (LSB-first) boolean values buffer, for block-at-a-time
    /// AND/AND-complement against the selection bitmap.
    pub fn boolean_values_bytes(&self) -> &[u8] {
        match self {
            Self::Boolean(a) => a.values().as_slice(),
            _ => panic!("boolean_values_bytes called on non-boolean column"),
        }
    }

    #[inline]
    pub fn value_str(&self, row: usize) -> &str {
        match self {
            Self::Utf8(a) => a.value(row),
            Self::Utf8Dict(a) => {
                let values: &StringArray = a
                    .values()
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .expect("dictionary values must be Utf8");
                let code = a.keys().value(row);
                values.value(code as usize)
            }
            _ => panic!("value_str called on non-string column"),
        }
    }

    #[inline]
    pub fn value_bytes(&self, row: usize) -> &[u8] {
        match self {
            Self::Binary(a) => a.value(row),
            _ => panic!("value_bytes called on non-binary column"),
        }
    }

    /// Returns `(code, dictionary)` for a dictionary-encoded string column,
    /// where `dictionary` is the distinct values array (indexed by code).
    pub fn dictionary(&self) -> Option<(&DictionaryArray<Int32Type>, Arc<StringArray>)> {
        match self {
            Self::Utf8Dict(a) => {
                let values = a
                    .values()
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .expect("dictionary values must be Utf8")
                    .clone();
                Some((a, Arc::new(values)))
            }
            _ => None,
        }
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, Self::Utf8Dict(_))
    }

    /// Whether this column participates in zone-map range skipping
    /// (numeric, float, decimal, timestamp).
    pub fn zone_map_eligible(&self) -> bool {
        matches!(
            self,
            Self::Int64(_)
                | Self::UInt64(_)
                | Self::Float64(_)
                | Self::Decimal128 { .. }
                | Self::Timestamp(_)
        )
    }
}
