//! Typed predicate kernels: one function per (logical type,
//! operator) pair, dispatched once per chunk and AND-updating a
//! [`SelectionBitmap`] over `[start_row, end_row)`.
//!
//! Every kernel here follows the same shape: optionally pre-apply the
//! column's validity bitmap in bulk, then walk the range clearing bits for
//! rows that fail the predicate. None of them touch bits outside the given
//! range.

use crate::bitmap::SelectionBitmap;
use crate::column::cmp::Operator;
use crate::column::Column;
use crate::value::{Decimal, Scalar};

/// Rows in a chunk at or above this count make bulk validity pre-application
/// worthwhile.
pub const SMALL_THRESHOLD: usize = 1024;

/// Applies the column's validity bitmap to the selection over
/// `[start_row, end_row)` when doing so is worthwhile, returning whether it
/// did. When it returns `true`, kernels may skip per-row null checks — rows
/// that were null are already cleared.
fn maybe_pre_apply_nulls(
    column: &Column,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) -> bool {
    let rows_in_chunk = end_row - start_row;
    if column.null_count() == 0 {
        return true; // no nulls at all: equivalent to having pre-applied them
    }
    if rows_in_chunk < SMALL_THRESHOLD {
        return false;
    }
    if let Some(bytes) = column.validity_bytes() {
        selection.and_with_arrow_bitmap(bytes, (start_row, end_row));
        true
    } else {
        false
    }
}

#[inline]
fn float_satisfies(op: Operator, a: f64, b: f64) -> bool {
    // NaN compares false to every operator, including `!=`.
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        Operator::LT => a < b,
        Operator::LTE => a <= b,
        Operator::GT => a > b,
        Operator::GTE => a >= b,
        Operator::Equal => a == b,
        Operator::NotEqual => a != b,
    }
}

#[inline]
fn int_satisfies<T: PartialOrd>(op: Operator, a: T, b: T) -> bool {
    match op {
        Operator::LT => a < b,
        Operator::LTE => a <= b,
        Operator::GT => a > b,
        Operator::GTE => a >= b,
        Operator::Equal => a == b,
        Operator::NotEqual => a != b,
    }
}

/// Evaluates a numeric comparison kernel (int64, uint64, float64, decimal or
/// timestamp) against `literal`, over `[start_row, end_row)`.
pub fn numeric_compare(
    column: &Column,
    op: Operator,
    literal: &Scalar,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    let nulls_pre_applied = maybe_pre_apply_nulls(column, selection, start_row, end_row);

    for row in start_row..end_row {
        if !selection.get(row) {
            continue;
        }
        if !nulls_pre_applied && column.is_null(row) {
            selection.clear(row);
            continue;
        }
        let satisfies = match (column, literal) {
            (Column::Int64(_), Scalar::I64(lit)) => int_satisfies(op, column.value_i64(row), *lit),
            (Column::UInt64(_), Scalar::U64(lit)) => {
                int_satisfies(op, column.value_u64(row), *lit)
            }
            (Column::Float64(_), Scalar::F64(lit)) => {
                float_satisfies(op, column.value_f64(row), *lit)
            }
            (Column::Decimal128 { .. }, Scalar::Decimal(lit)) => {
                let (unscaled, scale) = column.value_decimal(row);
                let value = Decimal::new(unscaled, scale);
                int_satisfies(op, value, *lit)
            }
            (Column::Timestamp(_), Scalar::Timestamp(lit)) => {
                int_satisfies(op, column.value_i64(row), *lit)
            }
            _ => unreachable!("numeric_compare called with mismatched column/literal types"),
        };
        if !satisfies {
            selection.clear(row);
        }
    }
}

/// Plain (non-dictionary) string equality, scanning per row.
pub fn string_equals(
    column: &Column,
    literal: &str,
    negate: bool,
    case_insensitive: bool,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    let nulls_pre_applied = maybe_pre_apply_nulls(column, selection, start_row, end_row);

    if let Some((dict, values)) = column.dictionary() {
        // Resolve the constant to a code once, then the per-row test is an
        // integer compare against the code array.
        let matching_codes: Vec<i32> = (0..values.len() as i32)
            .filter(|&code| {
                let candidate = values.value(code as usize);
                if case_insensitive {
                    candidate.eq_ignore_ascii_case(literal)
                } else {
                    candidate == literal
                }
            })
            .collect();

        for row in start_row..end_row {
            if !selection.get(row) {
                continue;
            }
            if !nulls_pre_applied && column.is_null(row) {
                selection.clear(row);
                continue;
            }
            let code = dict.keys().value(row);
            let is_match = matching_codes.contains(&code);
            if is_match == negate {
                selection.clear(row);
            }
        }
        return;
    }

    for row in start_row..end_row {
        if !selection.get(row) {
            continue;
        }
        if !nulls_pre_applied && column.is_null(row) {
            selection.clear(row);
            continue;
        }
        let value = column.value_str(row);
        let is_match = if case_insensitive {
            value.eq_ignore_ascii_case(literal)
        } else {
            value == literal
        };
        if is_match == negate {
            selection.clear(row);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[inline]
fn string_op_matches(op: StringOp, value: &str, literal: &str) -> bool {
    match op {
        StringOp::Contains => value.contains(literal),
        StringOp::StartsWith => value.starts_with(literal),
        StringOp::EndsWith => value.ends_with(literal),
    }
}

/// `contains` / `starts_with` / `ends_with`. On a dictionary-encoded column a
/// `code → bool` table is precomputed once and the per-row test becomes an
/// indexed lookup; on a plain column each row is scanned directly.
pub fn string_op(
    column: &Column,
    op: StringOp,
    literal: &str,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    let nulls_pre_applied = maybe_pre_apply_nulls(column, selection, start_row, end_row);

    if let Some((dict, values)) = column.dictionary() {
        let code_matches: Vec<bool> = (0..values.len())
            .map(|i| string_op_matches(op, values.value(i), literal))
            .collect();

        for row in start_row..end_row {
            if !selection.get(row) {
                continue;
            }
            if !nulls_pre_applied && column.is_null(row) {
                selection.clear(row);
                continue;
            }
            let code = dict.keys().value(row) as usize;
            if !code_matches[code] {
                selection.clear(row);
            }
        }
        return;
    }

    for row in start_row..end_row {
        if !selection.get(row) {
            continue;
        }
        if !nulls_pre_applied && column.is_null(row) {
            selection.clear(row);
            continue;
        }
        if !string_op_matches(op, column.value_str(row), literal) {
            selection.clear(row);
        }
    }
}

/// Boolean equality. Reads Arrow's packed values bitmap as 64-bit blocks and
/// ANDs (for `true`) or AND-with-complements (for `false`) block by block
/// against the selection — the one kernel that operates at block rather than
/// row granularity.
pub fn boolean_equals(
    column: &Column,
    expected: bool,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    let nulls_pre_applied = maybe_pre_apply_nulls(column, selection, start_row, end_row);
    let values_bytes = column.boolean_values_bytes();

    let first_block = start_row / 64;
    let last_block = if end_row == 0 { 0 } else { (end_row - 1) / 64 };

    for block_index in first_block..=last_block {
        let byte_base = block_index * 8;
        let mut value_block = 0u64;
        for (i, byte_slot) in value_block_bytes_mut(&mut value_block).iter_mut().enumerate() {
            *byte_slot = values_bytes.get(byte_base + i).copied().unwrap_or(0);
        }
        if expected {
            selection.and_block(block_index, value_block);
        } else {
            selection.and_block(block_index, !value_block);
        }
    }

    if !nulls_pre_applied {
        for row in start_row..end_row {
            if selection.get(row) && column.is_null(row) {
                selection.clear(row);
            }
        }
    }
}

#[inline]
fn value_block_bytes_mut(block: &mut u64) -> &mut [u8; 8] {
    // SAFETY: u64 and [u8; 8] have identical size and alignment requirements
    // met by a mutable u64 reference; this only ever writes through it.
    unsafe { &mut *(block as *mut u64 as *mut [u8; 8]) }
}

/// `is_null` / `is_not_null`.
pub fn null_check(
    column: &Column,
    want_null: bool,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    for row in start_row..end_row {
        if !selection.get(row) {
            continue;
        }
        let is_null = column.is_null(row);
        if is_null != want_null {
            selection.clear(row);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::{BufferPool, Initial};
    use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};
    use std::sync::Arc;

    fn pool() -> Arc<BufferPool> {
        BufferPool::new()
    }

    #[test]
    fn numeric_compare_clears_non_matching_rows() {
        let column = Column::Int64(Int64Array::from(vec![1, 5, 10, 15, 20]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 5, Initial::AllSet).unwrap();
        numeric_compare(&column, Operator::GT, &Scalar::I64(9), &mut bm, 0, 5);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn numeric_compare_handles_nulls() {
        let column = Column::Int64(Int64Array::from(vec![Some(1), None, Some(10)]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        numeric_compare(&column, Operator::GTE, &Scalar::I64(0), &mut bm, 0, 3);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn float_nan_never_matches_including_not_equal() {
        let column = Column::Float64(Float64Array::from(vec![f64::NAN, 1.0, 2.0]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        numeric_compare(&column, Operator::NotEqual, &Scalar::F64(5.0), &mut bm, 0, 3);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn string_equals_plain() {
        let column = Column::Utf8(StringArray::from(vec!["a", "b", "a"]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        string_equals(&column, "a", false, false, &mut bm, 0, 3);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn string_op_contains() {
        let column = Column::Utf8(StringArray::from(vec!["hello world", "goodbye", "well hi"]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        string_op(&column, StringOp::Contains, "hel", &mut bm, 0, 3);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn boolean_equals_true_and_false() {
        let column = Column::Boolean(BooleanArray::from(vec![true, false, true, false, true]));
        let pool = pool();
        let mut bm_true = SelectionBitmap::create(&pool, 5, Initial::AllSet).unwrap();
        boolean_equals(&column, true, &mut bm_true, 0, 5);
        assert_eq!(bm_true.iter_set_indices().collect::<Vec<_>>(), vec![0, 2, 4]);

        let mut bm_false = SelectionBitmap::create(&pool, 5, Initial::AllSet).unwrap();
        boolean_equals(&column, false, &mut bm_false, 0, 5);
        assert_eq!(bm_false.iter_set_indices().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn null_check_is_null_and_is_not_null() {
        let column = Column::Int64(Int64Array::from(vec![Some(1), None, Some(3)]));
        let pool = pool();
        let mut bm = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        null_check(&column, true, &mut bm, 0, 3);
        assert_eq!(bm.iter_set_indices().collect::<Vec<_>>(), vec![1]);

        let mut bm2 = SelectionBitmap::create(&pool, 3, Initial::AllSet).unwrap();
        null_check(&column, false, &mut bm2, 0, 3);
        assert_eq!(bm2.iter_set_indices().collect::<Vec<_>>(), vec![0, 2]);
    }
}
