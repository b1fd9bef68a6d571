//! Per-chunk min/max statistics, built once at collection construction
//! and immutable thereafter.
//!
//! Only zone-map-eligible columns (integers, floats, decimal, timestamp —
//! see [`Column::zone_map_eligible`]) get an entry; everything else is
//! treated as "cannot skip" by [`ZoneMap::may_match`].

use std::collections::HashMap;

use crate::column::cmp::Operator;
use crate::column::Column;
use crate::value::Scalar;

/// Statistics for one column over one chunk.
#[derive(Debug, Clone)]
pub struct ChunkStats {
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
    pub all_null: bool,
}

/// Per-chunk and global min/max for one zone-map-eligible column.
#[derive(Debug, Clone)]
pub struct ColumnZoneMap {
    pub chunks: Vec<ChunkStats>,
    pub global_min: Option<Scalar>,
    pub global_max: Option<Scalar>,
}

/// The zone map for an entire collection: one [`ColumnZoneMap`] per eligible
/// column index.
#[derive(Debug, Default)]
pub struct ZoneMap {
    by_column: HashMap<usize, ColumnZoneMap>,
    chunk_size: usize,
}

fn scalar_at(column: &Column, row: usize) -> Scalar {
    match column {
        Column::Int64(_) => Scalar::I64(column.value_i64(row)),
        Column::UInt64(_) => Scalar::U64(column.value_u64(row)),
        Column::Float64(_) => Scalar::F64(column.value_f64(row)),
        Column::Decimal128 { .. } => {
            let (unscaled, scale) = column.value_decimal(row);
            Scalar::Decimal(crate::value::Decimal::new(unscaled, scale))
        }
        Column::Timestamp(_) => Scalar::Timestamp(column.value_i64(row)),
        _ => unreachable!("scalar_at called on a non-zone-map-eligible column"),
    }
}

impl ZoneMap {
    /// Builds zone-map statistics for every eligible column in `columns`,
    /// over `n` rows divided into chunks of `chunk_size`.
    pub fn build(columns: &[Column], n: usize, chunk_size: usize) -> Self {
        let mut by_column = HashMap::new();

        for (column_index, column) in columns.iter().enumerate() {
            if !column.zone_map_eligible() {
                continue;
            }

            let mut chunks = Vec::with_capacity((n + chunk_size - 1) / chunk_size.max(1));
            let mut global_min: Option<Scalar> = None;
            let mut global_max: Option<Scalar> = None;

            let mut start = 0;
            while start < n || n == 0 {
                let end = (start + chunk_size).min(n);
                let mut chunk_min: Option<Scalar> = None;
                let mut chunk_max: Option<Scalar> = None;
                let mut all_null = true;

                for row in start..end {
                    if column.is_null(row) {
                        continue;
                    }
                    all_null = false;
                    let value = scalar_at(column, row);
                    chunk_min = Some(match chunk_min {
                        Some(existing) => existing.min_of(value.clone()),
                        None => value.clone(),
                    });
                    chunk_max = Some(match chunk_max {
                        Some(existing) => existing.max_of(value.clone()),
                        None => value,
                    });
                }

                if let Some(v) = &chunk_min {
                    global_min = Some(match global_min {
                        Some(existing) => existing.min_of(v.clone()),
                        None => v.clone(),
                    });
                }
                if let Some(v) = &chunk_max {
                    global_max = Some(match global_max {
                        Some(existing) => existing.max_of(v.clone()),
                        None => v.clone(),
                    });
                }

                chunks.push(ChunkStats {
                    min: chunk_min,
                    max: chunk_max,
                    all_null,
                });

                if n == 0 {
                    break;
                }
                start = end;
            }

            by_column.insert(
                column_index,
                ColumnZoneMap {
                    chunks,
                    global_min,
                    global_max,
                },
            );
        }

        Self { by_column, chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn column(&self, column_index: usize) -> Option<&ColumnZoneMap> {
        self.by_column.get(&column_index)
    }

    /// Whether chunk `chunk_index` of `column_index` can be excluded
    /// entirely given a numeric comparison operator and constant. Returns
    /// `false` (cannot skip) for columns with no zone map, i.e. non-numeric
    /// predicates.
    pub fn may_skip_chunk(
        &self,
        column_index: usize,
        chunk_index: usize,
        op: Operator,
        literal: &Scalar,
    ) -> bool {
        let Some(zone) = self.by_column.get(&column_index) else {
            return false;
        };
        let Some(stats) = zone.chunks.get(chunk_index) else {
            return false;
        };
        if stats.all_null {
            return true;
        }
        let (Some(min), Some(max)) = (&stats.min, &stats.max) else {
            return false;
        };
        let Some(v) = literal.as_f64() else {
            return false;
        };
        let (Some(min), Some(max)) = (min.as_f64(), max.as_f64()) else {
            return false;
        };

        match op {
            Operator::GT => max <= v,
            Operator::GTE => max < v,
            Operator::LT => min >= v,
            Operator::LTE => min > v,
            Operator::Equal => v < min || v > max,
            Operator::NotEqual => min == max && min == v,
        }
    }

    /// `true` ⇔ the chunk can be excluded because *any* predicate in the
    /// composite says it can be skipped: a conjunction of predicates may
    /// skip a chunk as soon as one of them does.
    pub fn may_skip_chunk_for_any(
        &self,
        chunk_index: usize,
        numeric_predicates: &[(usize, Operator, &Scalar)],
    ) -> bool {
        numeric_predicates
            .iter()
            .any(|&(column_index, op, literal)| {
                self.may_skip_chunk(column_index, chunk_index, op, literal)
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use arrow::array::Int64Array;

    fn test_zonemap() -> ZoneMap {
        // ten rows, chunk size 4: chunks [0,4), [4,8), [8,10)
        let column = Column::Int64(Int64Array::from(vec![
            -3, 0, 7, 12, 18, 25, 30, 55, 80, 100,
        ]));
        ZoneMap::build(&[column], 10, 4)
    }

    #[test]
    fn build_computes_chunk_and_global_ranges() {
        let zone = test_zonemap();
        let col = zone.column(0).unwrap();
        assert_eq!(col.chunks.len(), 3);
        assert_eq!(col.global_min, Some(Scalar::I64(-3)));
        assert_eq!(col.global_max, Some(Scalar::I64(100)));
    }

    #[test]
    fn may_skip_chunk_gt() {
        let zone = test_zonemap();
        // chunk 0 is [-3, 0, 7, 12], max 12
        assert!(zone.may_skip_chunk(0, 0, Operator::GT, &Scalar::I64(20)));
        assert!(!zone.may_skip_chunk(0, 0, Operator::GT, &Scalar::I64(5)));
    }

    #[test]
    fn may_skip_chunk_equal() {
        let zone = test_zonemap();
        // chunk 2 is [80, 100]
        assert!(zone.may_skip_chunk(0, 2, Operator::Equal, &Scalar::I64(50)));
        assert!(!zone.may_skip_chunk(0, 2, Operator::Equal, &Scalar::I64(90)));
    }

    #[test]
    fn all_null_chunk_always_skips() {
        let column = Column::Int64(Int64Array::from(vec![None, None, None, None]));
        let zone = ZoneMap::build(&[column], 4, 4);
        assert!(zone.may_skip_chunk(0, 0, Operator::GT, &Scalar::I64(0)));
        assert!(zone.may_skip_chunk(0, 0, Operator::NotEqual, &Scalar::I64(0)));
    }

    #[test]
    fn non_numeric_predicate_never_skips() {
        let zone = test_zonemap();
        assert!(!zone.may_skip_chunk(1, 0, Operator::Equal, &Scalar::I64(5)));
    }
}
