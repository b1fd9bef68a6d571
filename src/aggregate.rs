//! Ungrouped and grouped aggregate computation over a bitmap and column.

use hashbrown::HashMap;

use crate::bitmap::SelectionBitmap;
use crate::column::Column;
use crate::error::{EmptySequenceSnafu, Result, SumOverflowSnafu};
use crate::plan::AggregateOp;
use crate::value::{Decimal, Scalar};

/// Walks `selection`'s set bits, dense-block-at-a-time: a block equal to
/// `u64::MAX` is scanned with a plain loop over all 64 positions (the "SIMD
/// hot loop" in spec terms — without actual intrinsics here, but the same
/// branch-free shape); a sparse block is drained via `trailing_zeros` /
/// `block &= block - 1`, visiting only set bits.
fn for_each_selected(selection: &SelectionBitmap, mut f: impl FnMut(usize)) {
    let n = selection.len();
    for block_index in 0..selection.num_blocks() {
        let mut block = selection.load_block(block_index);
        if block == u64::MAX {
            let base = block_index * 64;
            for offset in 0..64 {
                let row = base + offset;
                if row >= n {
                    break;
                }
                f(row);
            }
            continue;
        }
        let base = block_index * 64;
        while block != 0 {
            let offset = block.trailing_zeros() as usize;
            f(base + offset);
            block &= block - 1;
        }
    }
}

/// The result of an ungrouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    Scalar(Scalar),
    Count(i64),
}

fn count_selected(column: &Column, selection: &SelectionBitmap) -> i64 {
    let mut count = 0i64;
    for_each_selected(selection, |row| {
        if !column.is_null(row) {
            count += 1;
        }
    });
    count
}

fn sum_i64(column: &Column, selection: &SelectionBitmap) -> Result<i64> {
    let mut sum: i64 = 0;
    let mut overflowed = false;
    for_each_selected(selection, |row| {
        if column.is_null(row) || overflowed {
            return;
        }
        match sum.checked_add(column.value_i64(row)) {
            Some(next) => sum = next,
            None => overflowed = true,
        }
    });
    if overflowed {
        return SumOverflowSnafu.fail();
    }
    Ok(sum)
}

fn sum_u64(column: &Column, selection: &SelectionBitmap) -> Result<u64> {
    let mut sum: u64 = 0;
    let mut overflowed = false;
    for_each_selected(selection, |row| {
        if column.is_null(row) || overflowed {
            return;
        }
        match sum.checked_add(column.value_u64(row)) {
            Some(next) => sum = next,
            None => overflowed = true,
        }
    });
    if overflowed {
        return SumOverflowSnafu.fail();
    }
    Ok(sum)
}

fn sum_f64(column: &Column, selection: &SelectionBitmap) -> f64 {
    // Naive accumulation, no Kahan summation.
    let mut sum = 0.0;
    for_each_selected(selection, |row| {
        if !column.is_null(row) {
            sum += column.value_f64(row);
        }
    });
    sum
}

fn sum_decimal(column: &Column, selection: &SelectionBitmap) -> Decimal {
    let mut unscaled_sum: i128 = 0;
    let mut scale = 0u8;
    for_each_selected(selection, |row| {
        if !column.is_null(row) {
            let (value, column_scale) = column.value_decimal(row);
            scale = column_scale;
            unscaled_sum += value;
        }
    });
    Decimal::new(unscaled_sum, scale)
}

fn min_max(column: &Column, selection: &SelectionBitmap, want_min: bool) -> Result<Scalar> {
    let mut result: Option<Scalar> = None;
    for_each_selected(selection, |row| {
        if column.is_null(row) {
            return;
        }
        let value = row_scalar(column, row);
        result = Some(match result.take() {
            Some(existing) => {
                if want_min {
                    existing.min_of(value)
                } else {
                    existing.max_of(value)
                }
            }
            None => value,
        });
    });
    result.ok_or_else(|| EmptySequenceSnafu.build())
}

fn row_scalar(column: &Column, row: usize) -> Scalar {
    match column {
        Column::Int64(_) => Scalar::I64(column.value_i64(row)),
        Column::UInt64(_) => Scalar::U64(column.value_u64(row)),
        Column::Float64(_) => Scalar::F64(column.value_f64(row)),
        Column::Decimal128 { .. } => {
            let (unscaled, scale) = column.value_decimal(row);
            Scalar::Decimal(Decimal::new(unscaled, scale))
        }
        Column::Timestamp(_) => Scalar::Timestamp(column.value_i64(row)),
        Column::Boolean(_) => Scalar::Bool(column.value_bool(row)),
        Column::Utf8(_) | Column::Utf8Dict(_) => Scalar::Utf8(column.value_str(row).to_owned()),
        Column::Binary(_) => panic!("min/max not supported on binary columns"),
    }
}

/// Computes one ungrouped aggregate over `column` restricted to
/// `selection`'s set bits.
pub fn aggregate(op: AggregateOp, column: &Column, selection: &SelectionBitmap) -> Result<AggregateResult> {
    match op {
        AggregateOp::Count => Ok(AggregateResult::Count(count_selected(column, selection))),
        AggregateOp::Sum => Ok(AggregateResult::Scalar(sum_scalar(column, selection)?)),
        AggregateOp::Avg => {
            let count = count_selected(column, selection);
            if count == 0 {
                return EmptySequenceSnafu.fail();
            }
            let sum = sum_scalar(column, selection)?;
            Ok(AggregateResult::Scalar(avg_from_sum(sum, count)))
        }
        AggregateOp::Min => Ok(AggregateResult::Scalar(min_max(column, selection, true)?)),
        AggregateOp::Max => Ok(AggregateResult::Scalar(min_max(column, selection, false)?)),
    }
}

fn sum_scalar(column: &Column, selection: &SelectionBitmap) -> Result<Scalar> {
    Ok(match column {
        Column::Int64(_) | Column::Timestamp(_) => Scalar::I64(sum_i64(column, selection)?),
        Column::UInt64(_) => Scalar::U64(sum_u64(column, selection)?),
        Column::Float64(_) => Scalar::F64(sum_f64(column, selection)),
        Column::Decimal128 { .. } => Scalar::Decimal(sum_decimal(column, selection)),
        _ => panic!("sum not supported on this column type"),
    })
}

/// `avg` as `sum / count`: floating division for floats, truncated
/// per-scale division for decimals, integer division (widened through f64)
/// otherwise — the integer-avg representation is left open by design; this
/// one reports a float result as the portable common case for numeric `avg`.
fn avg_from_sum(sum: Scalar, count: i64) -> Scalar {
    match sum {
        Scalar::Decimal(d) => {
            let divisor = count as i128;
            Scalar::Decimal(Decimal::new(d.unscaled / divisor, d.scale))
        }
        other => {
            let value = other.as_f64().expect("sum_scalar always yields a numeric scalar");
            Scalar::F64(value / count as f64)
        }
    }
}

/// A grouped aggregation result: one accumulator set per distinct key value.
#[derive(Debug, Clone)]
pub struct GroupedAccumulator {
    pub count: i64,
    pub sums: HashMap<usize, SumAccumulator>,
    pub mins: HashMap<usize, Scalar>,
    pub maxes: HashMap<usize, Scalar>,
}

#[derive(Debug, Clone)]
pub enum SumAccumulator {
    I64(i64),
    U64(u64),
    F64(f64),
    Decimal(Decimal),
}

impl SumAccumulator {
    fn seed_for(column: &Column) -> Self {
        match column {
            Column::Int64(_) | Column::Timestamp(_) => Self::I64(0),
            Column::UInt64(_) => Self::U64(0),
            Column::Float64(_) => Self::F64(0.0),
            Column::Decimal128 { scale, .. } => Self::Decimal(Decimal::new(0, *scale)),
            _ => panic!("sum accumulator not supported on this column type"),
        }
    }

    fn add(&mut self, column: &Column, row: usize) -> Result<()> {
        match self {
            Self::I64(acc) => {
                *acc = acc
                    .checked_add(column.value_i64(row))
                    .ok_or_else(|| SumOverflowSnafu.build())?;
            }
            Self::U64(acc) => {
                *acc = acc
                    .checked_add(column.value_u64(row))
                    .ok_or_else(|| SumOverflowSnafu.build())?;
            }
            Self::F64(acc) => *acc += column.value_f64(row),
            Self::Decimal(acc) => {
                let (unscaled, _) = column.value_decimal(row);
                acc.unscaled += unscaled;
            }
        }
        Ok(())
    }

    pub fn into_scalar(self) -> Scalar {
        match self {
            Self::I64(v) => Scalar::I64(v),
            Self::U64(v) => Scalar::U64(v),
            Self::F64(v) => Scalar::F64(v),
            Self::Decimal(v) => Scalar::Decimal(v),
        }
    }
}

/// Dispatch target for one requested output of a grouped aggregation.
pub struct GroupByRequest<'a> {
    pub op: AggregateOp,
    pub column: &'a Column,
    pub result_name: &'a str,
}

/// Result of a grouped aggregation: key (as a hashable discriminant string
/// plus the original scalar) → named result → scalar.
pub struct GroupByResult {
    pub groups: Vec<(Scalar, Vec<(String, AggregateResult)>)>,
}

/// Groups `selection`'s rows by `key_column`'s value and computes each
/// requested aggregate per group in a single pass. Nulls in the key column
/// drop the row from every group (an explicitly-resolved open question —
/// see DESIGN.md).
///
/// Dictionary-encoded key columns with cardinality at or below
/// `small_cardinality_threshold` use array-indexed accumulators (no
/// hashing); everything else groups by the decoded scalar in a hash map.
pub fn group_by(
    key_column: &Column,
    requests: &[GroupByRequest<'_>],
    selection: &SelectionBitmap,
    small_cardinality_threshold: usize,
) -> Result<GroupByResult> {
    if let Some((dict, values)) = key_column.dictionary() {
        if values.len() <= small_cardinality_threshold {
            return group_by_array_indexed(key_column, dict, values.len(), requests, selection);
        }
    }
    group_by_hash(key_column, requests, selection)
}

struct PerGroupState {
    count: i64,
    sums: Vec<Option<SumAccumulator>>,
    // Non-null row count per request, used by `Avg` instead of `count` so
    // that nulls in the value column are excluded from the divisor (§4.8).
    non_null_counts: Vec<i64>,
    mins: Vec<Option<Scalar>>,
    maxes: Vec<Option<Scalar>>,
}

impl PerGroupState {
    fn new(requests: &[GroupByRequest<'_>]) -> Self {
        Self {
            count: 0,
            sums: requests.iter().map(|_| None).collect(),
            non_null_counts: requests.iter().map(|_| 0).collect(),
            mins: requests.iter().map(|_| None).collect(),
            maxes: requests.iter().map(|_| None).collect(),
        }
    }

    fn update(&mut self, requests: &[GroupByRequest<'_>], row: usize) -> Result<()> {
        self.count += 1;
        for (i, request) in requests.iter().enumerate() {
            if request.column.is_null(row) {
                continue;
            }
            self.non_null_counts[i] += 1;
            match request.op {
                AggregateOp::Count => {}
                AggregateOp::Sum | AggregateOp::Avg => {
                    let acc = self.sums[i]
                        .get_or_insert_with(|| SumAccumulator::seed_for(request.column));
                    acc.add(request.column, row)?;
                }
                AggregateOp::Min => {
                    let value = row_scalar(request.column, row);
                    self.mins[i] = Some(match self.mins[i].take() {
                        Some(existing) => existing.min_of(value),
                        None => value,
                    });
                }
                AggregateOp::Max => {
                    let value = row_scalar(request.column, row);
                    self.maxes[i] = Some(match self.maxes[i].take() {
                        Some(existing) => existing.max_of(value),
                        None => value,
                    });
                }
            }
        }
        Ok(())
    }

    fn finish(self, requests: &[GroupByRequest<'_>]) -> Result<Vec<(String, AggregateResult)>> {
        let mut out = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let result = match request.op {
                AggregateOp::Count => AggregateResult::Count(self.count),
                AggregateOp::Sum => AggregateResult::Scalar(
                    self.sums[i].clone().map(SumAccumulator::into_scalar).unwrap_or(Scalar::I64(0)),
                ),
                AggregateOp::Avg => {
                    let non_null_count = self.non_null_counts[i];
                    if non_null_count == 0 {
                        return EmptySequenceSnafu.fail();
                    }
                    let sum = self.sums[i]
                        .clone()
                        .map(SumAccumulator::into_scalar)
                        .ok_or_else(|| EmptySequenceSnafu.build())?;
                    AggregateResult::Scalar(avg_from_sum(sum, non_null_count))
                }
                AggregateOp::Min => AggregateResult::Scalar(
                    self.mins[i].clone().ok_or_else(|| EmptySequenceSnafu.build())?,
                ),
                AggregateOp::Max => AggregateResult::Scalar(
                    self.maxes[i].clone().ok_or_else(|| EmptySequenceSnafu.build())?,
                ),
            };
            out.push((request.result_name.to_owned(), result));
        }
        Ok(out)
    }
}

fn group_by_array_indexed(
    key_column: &Column,
    dict: &arrow::array::DictionaryArray<arrow::datatypes::Int32Type>,
    cardinality: usize,
    requests: &[GroupByRequest<'_>],
    selection: &SelectionBitmap,
) -> Result<GroupByResult> {
    let mut states: Vec<Option<PerGroupState>> = (0..cardinality).map(|_| None).collect();
    // First survivor row index at which each code's group is created, so the
    // emitted order matches ascending row-index order of survivors (§5)
    // instead of dictionary-code order.
    let mut first_row: Vec<usize> = (0..cardinality).map(|_| 0).collect();
    let mut error = None;

    for_each_selected(selection, |row| {
        if error.is_some() || key_column.is_null(row) {
            return;
        }
        let code = dict.keys().value(row) as usize;
        let is_new = states[code].is_none();
        let state = states[code].get_or_insert_with(|| PerGroupState::new(requests));
        if is_new {
            first_row[code] = row;
        }
        if let Err(e) = state.update(requests, row) {
            error = Some(e);
        }
    });
    if let Some(e) = error {
        return Err(e);
    }

    let (_, values) = key_column.dictionary().expect("checked by caller");
    let mut groups = Vec::new();
    for (code, state) in states.into_iter().enumerate() {
        if let Some(state) = state {
            let key = Scalar::Utf8(values.value(code).to_owned());
            groups.push((first_row[code], key, state.finish(requests)?));
        }
    }
    groups.sort_by_key(|(row, _, _)| *row);
    Ok(GroupByResult { groups: groups.into_iter().map(|(_, key, v)| (key, v)).collect() })
}

fn group_by_hash(
    key_column: &Column,
    requests: &[GroupByRequest<'_>],
    selection: &SelectionBitmap,
) -> Result<GroupByResult> {
    let mut states: HashMap<GroupKey, PerGroupState> = HashMap::new();
    // First survivor row index at which each key's group is created, so the
    // emitted order matches ascending row-index order of survivors (§5)
    // instead of hashbrown's iteration order.
    let mut first_row: HashMap<GroupKey, usize> = HashMap::new();
    let mut error = None;

    for_each_selected(selection, |row| {
        if error.is_some() || key_column.is_null(row) {
            return;
        }
        let key = GroupKey::from_column(key_column, row);
        first_row.entry(key.clone()).or_insert(row);
        let state = states.entry(key).or_insert_with(|| PerGroupState::new(requests));
        if let Err(e) = state.update(requests, row) {
            error = Some(e);
        }
    });
    if let Some(e) = error {
        return Err(e);
    }

    let mut groups = Vec::new();
    for (key, state) in states {
        let row = first_row[&key];
        groups.push((row, key.into_scalar(), state.finish(requests)?));
    }
    groups.sort_by_key(|(row, _, _)| *row);
    Ok(GroupByResult { groups: groups.into_iter().map(|(_, key, v)| (key, v)).collect() })
}

/// A hashable stand-in for a [`Scalar`] key (floats aren't `Eq`/`Hash`, so
/// they're bit-reinterpreted; everything else maps straightforwardly).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    I64(i64),
    U64(u64),
    F64Bits(u64),
    Bool(bool),
    Utf8(String),
}

impl GroupKey {
    fn from_column(column: &Column, row: usize) -> Self {
        match column {
            Column::Int64(_) | Column::Timestamp(_) => Self::I64(column.value_i64(row)),
            Column::UInt64(_) => Self::U64(column.value_u64(row)),
            Column::Float64(_) => Self::F64Bits(column.value_f64(row).to_bits()),
            Column::Boolean(_) => Self::Bool(column.value_bool(row)),
            Column::Utf8(_) | Column::Utf8Dict(_) => Self::Utf8(column.value_str(row).to_owned()),
            Column::Decimal128 { .. } => {
                let (unscaled, _) = column.value_decimal(row);
                Self::I64(unscaled as i64)
            }
            Column::Binary(_) => panic!("group_by key column must not be binary"),
        }
    }

    fn into_scalar(self) -> Scalar {
        match self {
            Self::I64(v) => Scalar::I64(v),
            Self::U64(v) => Scalar::U64(v),
            Self::F64Bits(bits) => Scalar::F64(f64::from_bits(bits)),
            Self::Bool(v) => Scalar::Bool(v),
            Self::Utf8(v) => Scalar::Utf8(v),
        }
    }
}
