//! The predicate model and selectivity-based reorderer.

use crate::column::cmp::Operator;
use crate::column::kernel::StringOp;
use crate::column::Column;
use crate::value::{Decimal, Scalar};
use crate::zonemap::ZoneMap;

/// One predicate kind. `column_index` is resolved during analysis and is
/// never `None` on a predicate the executor sees.
#[derive(Debug, Clone)]
pub enum PredicateKind {
    Numeric { op: Operator, literal: Scalar },
    StringEquality { literal: String, negate: bool, case_insensitive: bool },
    StringOp { op: StringOp, literal: String },
    BooleanEquals { expected: bool },
    IsNull,
    IsNotNull,
}

/// A predicate together with its resolved column index.
#[derive(Debug, Clone)]
pub struct ColumnPredicate {
    pub column_index: usize,
    pub kind: PredicateKind,
}

impl ColumnPredicate {
    pub fn new(column_index: usize, kind: PredicateKind) -> Self {
        Self { column_index, kind }
    }

    /// Whether this is a numeric comparison eligible for zone-map skipping
    /// and global-range-based selectivity estimation.
    pub fn as_numeric(&self) -> Option<(Operator, &Scalar)> {
        match &self.kind {
            PredicateKind::Numeric { op, literal } => Some((*op, literal)),
            _ => None,
        }
    }

    /// A coarse "kind" tag used by the reorder gate, which only reorders
    /// when the predicate list has at least 2 predicates of *different*
    /// kinds.
    fn kind_tag(&self) -> u8 {
        match &self.kind {
            PredicateKind::Numeric { op, .. } => match op {
                Operator::Equal => 1,
                Operator::NotEqual => 2,
                _ => 0, // range comparisons share a tag
            },
            PredicateKind::StringEquality { .. } => 3,
            PredicateKind::StringOp { op, .. } => match op {
                StringOp::Contains => 4,
                StringOp::StartsWith | StringOp::EndsWith => 5,
            },
            PredicateKind::BooleanEquals { .. } => 6,
            PredicateKind::IsNull | PredicateKind::IsNotNull => 7,
        }
    }
}

#[inline]
fn float_row_satisfies(op: Operator, a: f64, b: f64) -> bool {
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
fn ord_row_satisfies<T: PartialOrd>(op: Operator, a: T, b: T) -> bool {
    match op {
        Operator::LT => a < b,
        Operator::LTE => a <= b,
        Operator::GT => a > b,
        Operator::GTE => a >= b,
        Operator::Equal => a == b,
        Operator::NotEqual => a != b,
    }
}

/// Evaluates `predicate.kind` against a single row, for streaming-mode
/// short-circuit scans. Unlike the bulk kernels in [`crate::column::kernel`],
/// this checks one row at a time and never touches a selection bitmap.
pub fn row_matches(column: &Column, kind: &PredicateKind, row: usize) -> bool {
    match kind {
        PredicateKind::Numeric { op, literal } => {
            if column.is_null(row) {
                return false;
            }
            match (column, literal) {
                (Column::Int64(_), Scalar::I64(lit)) => {
                    ord_row_satisfies(*op, column.value_i64(row), *lit)
                }
                (Column::UInt64(_), Scalar::U64(lit)) => {
                    ord_row_satisfies(*op, column.value_u64(row), *lit)
                }
                (Column::Float64(_), Scalar::F64(lit)) => {
                    float_row_satisfies(*op, column.value_f64(row), *lit)
                }
                (Column::Decimal128 { .. }, Scalar::Decimal(lit)) => {
                    let (unscaled, scale) = column.value_decimal(row);
                    ord_row_satisfies(*op, Decimal::new(unscaled, scale), *lit)
                }
                (Column::Timestamp(_), Scalar::Timestamp(lit)) => {
                    ord_row_satisfies(*op, column.value_i64(row), *lit)
                }
                _ => unreachable!("row_matches called with mismatched column/literal types"),
            }
        }
        PredicateKind::StringEquality { literal, negate, case_insensitive } => {
            if column.is_null(row) {
                return false;
            }
            let value = column.value_str(row);
            let is_match = if *case_insensitive {
                value.eq_ignore_ascii_case(literal)
            } else {
                value == literal
            };
            is_match != *negate
        }
        PredicateKind::StringOp { op, literal } => {
            if column.is_null(row) {
                return false;
            }
            let value = column.value_str(row);
            match op {
                StringOp::Contains => value.contains(literal.as_str()),
                StringOp::StartsWith => value.starts_with(literal.as_str()),
                StringOp::EndsWith => value.ends_with(literal.as_str()),
            }
        }
        PredicateKind::BooleanEquals { expected } => {
            if column.is_null(row) {
                return false;
            }
            column.value_bool(row) == *expected
        }
        PredicateKind::IsNull => column.is_null(row),
        PredicateKind::IsNotNull => !column.is_null(row),
    }
}

/// Estimates a predicate's selectivity (probability a row passes) in O(1)
/// using the zone map's cached global ranges.
pub fn estimate_selectivity(predicate: &ColumnPredicate, zone_map: &ZoneMap, n: usize) -> f64 {
    match &predicate.kind {
        PredicateKind::Numeric { op, literal } => match op {
            Operator::Equal => 0.01,
            Operator::NotEqual => 0.99,
            Operator::LT | Operator::LTE | Operator::GT | Operator::GTE => {
                let Some(zone) = zone_map.column(predicate.column_index) else {
                    return 0.5;
                };
                let (Some(min), Some(max)) = (&zone.global_min, &zone.global_max) else {
                    return 0.5;
                };
                let (Some(min), Some(max), Some(v)) =
                    (min.as_f64(), max.as_f64(), literal.as_f64())
                else {
                    return 0.5;
                };
                if max <= min {
                    return 0.5;
                }
                let fraction_below = ((v - min) / (max - min)).clamp(0.0, 1.0);
                let estimate = match op {
                    Operator::LT | Operator::LTE => fraction_below,
                    Operator::GT | Operator::GTE => 1.0 - fraction_below,
                    _ => unreachable!(),
                };
                estimate.clamp(0.01, 0.99)
            }
        },
        PredicateKind::StringEquality { .. } => 0.10,
        PredicateKind::StringOp { op, .. } => match op {
            StringOp::Contains => 0.25,
            StringOp::StartsWith | StringOp::EndsWith => 0.15,
        },
        PredicateKind::BooleanEquals { .. } => 0.50,
        PredicateKind::IsNull => {
            if n == 0 {
                0.05
            } else {
                // Global null_count isn't tracked outside the zone map's
                // eligible columns; fall back to the documented default.
                0.05
            }
        }
        PredicateKind::IsNotNull => 0.95,
    }
}

/// Reorders `predicates` by ascending estimated selectivity (most selective
/// first) when at least two predicates have different kind tags and the
/// spread between the highest and lowest estimate exceeds `0.20`. Stable
/// otherwise. Used for conjunctive (`AND`) evaluation order.
pub fn reorder_for_conjunction(
    predicates: &mut [ColumnPredicate],
    zone_map: &ZoneMap,
    n: usize,
) {
    reorder(predicates, zone_map, n, Direction::Ascending);
}

/// Reorders by *descending* estimated selectivity (least selective first),
/// for `all` (universal) short-circuit operations that want to exit sooner
/// on a non-match.
pub fn reorder_for_universal(predicates: &mut [ColumnPredicate], zone_map: &ZoneMap, n: usize) {
    reorder(predicates, zone_map, n, Direction::Descending);
}

enum Direction {
    Ascending,
    Descending,
}

fn reorder(predicates: &mut [ColumnPredicate], zone_map: &ZoneMap, n: usize, direction: Direction) {
    if predicates.len() < 2 {
        return;
    }

    let distinct_kinds = {
        let first_tag = predicates[0].kind_tag();
        predicates.iter().any(|p| p.kind_tag() != first_tag)
    };
    if !distinct_kinds {
        return;
    }

    let estimates: Vec<f64> = predicates
        .iter()
        .map(|p| estimate_selectivity(p, zone_map, n))
        .collect();
    let min = estimates.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = estimates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max - min <= 0.20 {
        return;
    }

    let mut indexed: Vec<(usize, f64)> = estimates.into_iter().enumerate().collect();
    match direction {
        Direction::Ascending => {
            indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        }
        Direction::Descending => {
            indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        }
    }
    // Stable sort on the indices keeps ties in original order.
    indexed.sort_by(|a, b| {
        let cmp = match direction {
            Direction::Ascending => a.1.partial_cmp(&b.1),
            Direction::Descending => b.1.partial_cmp(&a.1),
        };
        cmp.unwrap_or(std::cmp::Ordering::Equal)
    });

    let reordered: Vec<ColumnPredicate> =
        indexed.into_iter().map(|(i, _)| predicates[i].clone()).collect();
    predicates.clone_from_slice(&reordered);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::Column;

    fn zone_map_for(min: i64, max: i64) -> ZoneMap {
        use arrow::array::Int64Array;
        let column = Column::Int64(Int64Array::from(vec![min, max]));
        ZoneMap::build(&[column], 2, 16384)
    }

    #[test]
    fn selectivity_equal_and_not_equal() {
        let zone = zone_map_for(0, 100);
        let eq = ColumnPredicate::new(
            0,
            PredicateKind::Numeric { op: Operator::Equal, literal: Scalar::I64(50) },
        );
        assert_eq!(estimate_selectivity(&eq, &zone, 10), 0.01);
        let ne = ColumnPredicate::new(
            0,
            PredicateKind::Numeric { op: Operator::NotEqual, literal: Scalar::I64(50) },
        );
        assert_eq!(estimate_selectivity(&ne, &zone, 10), 0.99);
    }

    #[test]
    fn selectivity_range_interpolates_and_clamps() {
        let zone = zone_map_for(0, 100);
        let gt = ColumnPredicate::new(
            0,
            PredicateKind::Numeric { op: Operator::GT, literal: Scalar::I64(90) },
        );
        let estimate = estimate_selectivity(&gt, &zone, 10);
        assert!((estimate - 0.10).abs() < 1e-9);
    }

    #[test]
    fn reorder_skips_when_same_kind() {
        let zone = zone_map_for(0, 100);
        let mut predicates = vec![
            ColumnPredicate::new(
                0,
                PredicateKind::Numeric { op: Operator::GT, literal: Scalar::I64(10) },
            ),
            ColumnPredicate::new(
                0,
                PredicateKind::Numeric { op: Operator::LT, literal: Scalar::I64(90) },
            ),
        ];
        let before: Vec<_> = predicates.iter().map(|p| p.kind_tag()).collect();
        reorder_for_conjunction(&mut predicates, &zone, 10);
        let after: Vec<_> = predicates.iter().map(|p| p.kind_tag()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reorder_sorts_ascending_when_gate_passes() {
        let zone = zone_map_for(0, 100);
        let mut predicates = vec![
            ColumnPredicate::new(
                0,
                PredicateKind::Numeric { op: Operator::NotEqual, literal: Scalar::I64(50) },
            ),
            ColumnPredicate::new(0, PredicateKind::BooleanEquals { expected: true }),
            ColumnPredicate::new(
                0,
                PredicateKind::Numeric { op: Operator::Equal, literal: Scalar::I64(50) },
            ),
        ];
        reorder_for_conjunction(&mut predicates, &zone, 10);
        // most selective (Equal, 0.01) first, least selective (NotEqual, 0.99) last
        assert!(matches!(
            predicates[0].kind,
            PredicateKind::Numeric { op: Operator::Equal, .. }
        ));
        assert!(matches!(
            predicates[2].kind,
            PredicateKind::Numeric { op: Operator::NotEqual, .. }
        ));
    }
}
